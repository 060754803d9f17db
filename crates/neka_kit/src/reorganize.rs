//! Kit reorganization: document in, folder tree out.
//!
//! The [`KitReorganizer`] turns a [`KitDocument`] into the on-disk layout read by the kit
//! editor.
//!
//! # Algorithm
//!
//! 1. Resolve every toning into its ordered [`ColorVariant`]s.
//! 2. Derive the render layers (one per part, plus one per addon layer) and rank them into
//!    `{X}-{Y}` folders. See [`plan_render_layers`].
//! 3. Detect the canvas size from the first layer carrying `crop.ow/oh`.
//! 4. Process the render layers, in parallel on a rayon pool:
//!    - copy the part cover to `nav.png` and each item's thumbnail to `thumb_{n}.png`;
//!    - for each colour variant, write item `n`'s asset to `{n}.png` in the folder root
//!      (`default` variant) or in the `{code}` subfolder, recoloured through the variant's
//!      gradient. An item with several assets in one render layer is composited first;
//!    - record folders of items with more than one drawable asset in
//!      `separated_layers.json`.
//! 5. Flush the side index and return a [`ReorganizeSummary`].
//!
//! Every output file is existence-checked before it is produced, so a run can be
//! interrupted and resumed, and re-running over a finished tree writes nothing. Failed
//! fetches, undecodable images and files that cannot be written are logged and counted;
//! they leave a gap instead of failing the run.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;

use crate::cache::{BlobCache, HttpBlobSource, RetryPolicy};
use crate::compose::{composite, PlacedLayer};
use crate::document::{CanvasSize, FormatIssue, KitDocument, DEFAULT_CANVAS};
use crate::error::{Error, FetchError, Result};
use crate::gradient::GradientLut;
use crate::plan::{plan_render_layers, plan_slots, Asset, RenderLayer};
use crate::recolor::{apply_gradient, recolor_file, RecolorOutcome};
use crate::separated::SeparatedLayers;
use crate::toning::{ColorVariant, ToningTable};
use crate::utils::{copy_atomic, write_png_atomic};

/// Default asset host.
pub const DEFAULT_IMAGE_HOST: &str = "img2.neka.cc";

/// Library configuration for a reorganization run.
#[derive(Debug, Clone)]
pub struct ReorganizeOptions {
    /// Host serving raw blobs as `https://{image_host}/{blob}`.
    pub image_host: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one.
    pub retry_backoff: Duration,
    /// Worker threads. `0` uses rayon's default, `1` runs sequentially.
    pub workers: usize,
    /// Canvas used when no layer carries `crop.ow/oh`.
    pub fallback_canvas: CanvasSize,
}

impl Default for ReorganizeOptions {
    fn default() -> Self {
        Self {
            image_host: DEFAULT_IMAGE_HOST.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            workers: 0,
            fallback_canvas: DEFAULT_CANVAS,
        }
    }
}

impl ReorganizeOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
        }
    }
}

/// Progress information emitted while reorganizing.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorganizeProgress {
    pub stage: ReorganizeStage,
    /// Folder just finished (set during `Processing`).
    pub current_folder: Option<String>,
    /// Render layers finished so far.
    pub current: u32,
    pub total: u32,
}

/// Emitted in order: `Planning` -> `Processing` (once per render layer) -> `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReorganizeStage {
    Planning,
    Processing,
    Complete,
}

/// What a run did.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorganizeSummary {
    pub kit_root: Utf8PathBuf,
    pub render_layers: usize,
    /// Files produced by this run (assets, thumbnails and covers).
    pub files_written: usize,
    /// Files left alone because they already existed.
    pub files_existing: usize,
    /// Assets that could not be decoded: copied as-is, or left out of a composite.
    pub undecodable: usize,
    /// Blob ids that could not be fetched, sorted.
    pub failed_blobs: Vec<String>,
    /// Output paths that could not be produced, sorted.
    pub failed_writes: Vec<Utf8PathBuf>,
    /// Document nodes skipped during normalization.
    pub issues: Vec<FormatIssue>,
    /// Folders listed in `separated_layers.json`.
    pub separated: Vec<String>,
    pub canvas: CanvasSize,
    #[serde(skip)]
    pub elapsed: Duration,
}

pub type ProgressCallback = Arc<dyn Fn(ReorganizeProgress) + Send + Sync>;

#[derive(Default)]
struct Tally {
    written: AtomicUsize,
    existing: AtomicUsize,
    undecodable: AtomicUsize,
    failed: Mutex<BTreeSet<String>>,
    failed_writes: Mutex<BTreeSet<Utf8PathBuf>>,
}

impl Tally {
    fn fail(&self, blob: &str, error: &FetchError) {
        tracing::warn!("Skipping blob {}: {}", blob, error);
        self.failed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(blob.to_string());
    }

    fn write_failed(&self, path: &Utf8Path, error: &dyn std::fmt::Display) {
        tracing::warn!("Cannot write {}: {}", path, error);
        self.failed_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_path_buf());
    }

    fn written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared, read-only state of one run.
struct RunContext<'a> {
    doc: &'a KitDocument,
    tonings: ToningTable,
    canvas: CanvasSize,
    separated: SeparatedLayers,
    tally: Tally,
}

/// Orchestrates a reorganization run.
///
/// Create one with [`new`](Self::new) (HTTP source) or [`with_cache`](Self::with_cache),
/// optionally attach [`with_progress`](Self::with_progress), then call [`run`](Self::run).
pub struct KitReorganizer {
    kit_root: Utf8PathBuf,
    cache: Arc<BlobCache>,
    options: ReorganizeOptions,
    progress_callback: Option<ProgressCallback>,
}

impl KitReorganizer {
    /// Reorganizer fetching from `options.image_host`, caching under
    /// `{cache_root}/cache_blobs`.
    pub fn new(
        kit_root: Utf8PathBuf,
        cache_root: &Utf8Path,
        options: ReorganizeOptions,
    ) -> Result<Self> {
        let source = HttpBlobSource::new(options.image_host.clone(), options.timeout)?;
        let cache = BlobCache::new(cache_root, Arc::new(source), options.retry_policy());
        Ok(Self::with_cache(kit_root, Arc::new(cache), options))
    }

    pub fn with_cache(
        kit_root: Utf8PathBuf,
        cache: Arc<BlobCache>,
        options: ReorganizeOptions,
    ) -> Self {
        Self {
            kit_root,
            cache,
            options,
            progress_callback: None,
        }
    }

    /// Register a progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ReorganizeProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    pub(crate) fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    pub fn kit_root(&self) -> &Utf8Path {
        &self.kit_root
    }

    /// Reorganize `doc` into the kit root. See the module docs for the algorithm.
    pub fn run(&self, doc: &KitDocument) -> Result<ReorganizeSummary> {
        let start_time = Instant::now();
        tracing::info!(
            "Reorganizing kit into {} (blob cache {})",
            self.kit_root,
            self.cache.dir()
        );

        self.emit_progress(ReorganizeProgress {
            stage: ReorganizeStage::Planning,
            current_folder: None,
            current: 0,
            total: 0,
        });

        std::fs::create_dir_all(self.kit_root.as_std_path())?;
        let layers = plan_render_layers(doc);
        let ctx = RunContext {
            doc,
            tonings: ToningTable::build(&doc.tonings),
            canvas: doc.canvas_size(self.options.fallback_canvas),
            separated: SeparatedLayers::open(&self.kit_root)?,
            tally: Tally::default(),
        };
        tracing::info!(
            "Planned {} render layers over {} parts, canvas {}x{}",
            layers.len(),
            doc.parts.len(),
            ctx.canvas.width,
            ctx.canvas.height
        );

        let total = layers.len() as u32;
        let done = AtomicU32::new(0);
        let process = |layer: &RenderLayer| -> Result<()> {
            self.process_layer(&ctx, layer)?;
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            self.emit_progress(ReorganizeProgress {
                stage: ReorganizeStage::Processing,
                current_folder: Some(layer.folder_name()),
                current,
                total,
            });
            Ok(())
        };

        if self.options.workers == 1 {
            layers.iter().try_for_each(process)?;
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.workers)
                .build()
                .map_err(|e| Error::Other(format!("cannot start worker pool: {e}")))?;
            pool.install(|| layers.par_iter().try_for_each(process))?;
        }

        ctx.separated.finish()?;

        let summary = ReorganizeSummary {
            kit_root: self.kit_root.clone(),
            render_layers: layers.len(),
            files_written: ctx.tally.written.load(Ordering::Relaxed),
            files_existing: ctx.tally.existing.load(Ordering::Relaxed),
            undecodable: ctx.tally.undecodable.load(Ordering::Relaxed),
            failed_blobs: ctx
                .tally
                .failed
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .into_iter()
                .collect(),
            failed_writes: ctx
                .tally
                .failed_writes
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .into_iter()
                .collect(),
            issues: doc.issues.clone(),
            separated: ctx.separated.folders(),
            canvas: ctx.canvas,
            elapsed: start_time.elapsed(),
        };

        tracing::info!(
            "Reorganized {} render layers: {} written, {} existing, {} failed blobs in {:.2?}",
            summary.render_layers,
            summary.files_written,
            summary.files_existing,
            summary.failed_blobs.len(),
            summary.elapsed
        );

        self.emit_progress(ReorganizeProgress {
            stage: ReorganizeStage::Complete,
            current_folder: None,
            current: total,
            total,
        });

        Ok(summary)
    }

    fn process_layer(&self, ctx: &RunContext<'_>, layer: &RenderLayer) -> Result<()> {
        let part = &ctx.doc.parts[layer.part];
        let folder = self.kit_root.join(layer.folder_name());
        if let Err(e) = std::fs::create_dir_all(folder.as_std_path()) {
            ctx.tally.write_failed(&folder, &e);
            return Ok(());
        }
        tracing::debug!("Processing {} ({})", folder, part.name);

        if let Some(cover) = part.cover.as_deref() {
            self.place_blob(ctx, cover, &folder.join("nav.png"));
        }
        for (i, item) in part.items.iter().enumerate() {
            if let Some(thumb) = item.thumbnail_blob() {
                self.place_blob(ctx, thumb, &folder.join(format!("thumb_{}.png", i + 1)));
            }
        }

        let variants = ctx.tonings.resolve(layer.toning_candidates(part));
        let targets: Vec<(Utf8PathBuf, Option<GradientLut>)> = variants
            .iter()
            .filter_map(|variant| {
                let dir = variant_dir(&folder, variant);
                match std::fs::create_dir_all(dir.as_std_path()) {
                    Ok(()) => Some((dir, variant_lut(variant))),
                    Err(e) => {
                        ctx.tally.write_failed(&dir, &e);
                        None
                    }
                }
            })
            .collect();

        for slot in plan_slots(&part.items, &layer.kind) {
            if slot.assets.is_empty() {
                continue;
            }
            if slot.item.drawable_count() > 1 {
                ctx.separated.record(layer.x, layer.y())?;
            }

            let file_name = format!("{}.png", slot.number);
            let pending: Vec<(Utf8PathBuf, Option<&GradientLut>)> = targets
                .iter()
                .map(|(dir, lut)| (dir.join(&file_name), lut.as_ref()))
                .filter(|(path, _)| {
                    let exists = path.as_std_path().exists();
                    if exists {
                        ctx.tally.existing.fetch_add(1, Ordering::Relaxed);
                    }
                    !exists
                })
                .collect();
            if pending.is_empty() {
                continue;
            }

            let sources = self.fetch_assets(ctx, &slot.assets);
            match sources.as_slice() {
                [] => {}
                [(src, _)] => {
                    for (dst, lut) in &pending {
                        self.write_single(ctx, src, dst, *lut);
                    }
                }
                many => {
                    for (dst, lut) in &pending {
                        self.write_composite(ctx, many, dst, *lut);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetch every asset, dropping the ones that fail.
    fn fetch_assets<'a>(
        &self,
        ctx: &RunContext<'_>,
        assets: &[Asset<'a>],
    ) -> Vec<(Utf8PathBuf, Asset<'a>)> {
        assets
            .iter()
            .filter_map(|asset| match self.cache.get(asset.blob) {
                Ok(path) => Some((path, *asset)),
                Err(e) => {
                    ctx.tally.fail(asset.blob, &e);
                    None
                }
            })
            .collect()
    }

    /// Copy a blob as-is unless `dst` exists.
    fn place_blob(&self, ctx: &RunContext<'_>, blob: &str, dst: &Utf8Path) {
        if dst.as_std_path().exists() {
            ctx.tally.existing.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.cache.get(blob) {
            Ok(src) => match copy_atomic(&src, dst) {
                Ok(()) => ctx.tally.written(),
                Err(e) => ctx.tally.write_failed(dst, &e),
            },
            Err(e) => ctx.tally.fail(blob, &e),
        }
    }

    fn write_single(
        &self,
        ctx: &RunContext<'_>,
        src: &Utf8Path,
        dst: &Utf8Path,
        lut: Option<&GradientLut>,
    ) {
        let result = match lut {
            Some(lut) => recolor_file(src, dst, lut)
                .map(|outcome| outcome == RecolorOutcome::CopiedVerbatim),
            None => copy_atomic(src, dst).map(|()| false),
        };
        match result {
            Ok(verbatim) => {
                if verbatim {
                    ctx.tally.undecodable.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!("Wrote {}", dst);
                ctx.tally.written();
            }
            Err(e) => ctx.tally.write_failed(dst, &e),
        }
    }

    fn write_composite(
        &self,
        ctx: &RunContext<'_>,
        sources: &[(Utf8PathBuf, Asset<'_>)],
        dst: &Utf8Path,
        lut: Option<&GradientLut>,
    ) {
        let mut placed = Vec::with_capacity(sources.len());
        for (path, asset) in sources {
            let image = match image::open(path.as_std_path()) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!("Cannot decode blob {} for {}: {}", asset.blob, dst, e);
                    ctx.tally.undecodable.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            let image = match lut {
                Some(lut) => apply_gradient(&image, lut),
                None => image.to_rgba8(),
            };
            let (x, y) = asset.crop.map(|c| (c.x, c.y)).unwrap_or((0, 0));
            placed.push(PlacedLayer::new(image, x, y));
        }
        if placed.is_empty() {
            return;
        }

        let canvas = sources
            .iter()
            .filter_map(|(_, asset)| asset.crop)
            .find_map(|c| CanvasSize::checked(c.ow?, c.oh?))
            .unwrap_or(ctx.canvas);

        let written = composite(&placed, canvas).and_then(|image| write_png_atomic(dst, &image));
        match written {
            Ok(()) => {
                tracing::debug!("Wrote composite of {} layers to {}", placed.len(), dst);
                ctx.tally.written();
            }
            Err(e) => ctx.tally.write_failed(dst, &e),
        }
    }

    fn emit_progress(&self, progress: ReorganizeProgress) {
        if let Some(callback) = &self.progress_callback {
            callback(progress);
        }
    }
}

fn variant_dir(folder: &Utf8Path, variant: &ColorVariant) -> Utf8PathBuf {
    if variant.is_default() {
        folder.to_path_buf()
    } else {
        folder.join(&variant.code)
    }
}

fn variant_lut(variant: &ColorVariant) -> Option<GradientLut> {
    (!variant.stops.is_empty()).then(|| GradientLut::build(&variant.stops))
}
