//! Import entry points: raw payload in, kit folder out.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use neka_vocab::RawPayload;
use serde_json::Value;

use crate::cache::{BlobCache, BlobSource, HttpBlobSource};
use crate::document::KitDocument;
use crate::error::{Error, Result};
use crate::reorganize::{
    KitReorganizer, ProgressCallback, ReorganizeOptions, ReorganizeProgress, ReorganizeSummary,
};
use crate::utils::{sanitize_folder_name, write_if_changed};

pub const METADATA_FILE: &str = "metadata.json";

/// Folder name of a kit: `{name}_{id}`, made filesystem-safe.
pub fn kit_folder_name(doc: &KitDocument) -> String {
    let name = doc
        .name
        .as_deref()
        .map(sanitize_folder_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "kit".to_string());
    match doc.id.as_deref().map(sanitize_folder_name) {
        Some(id) if !id.is_empty() => format!("{name}_{id}"),
        _ => name,
    }
}

/// Write the decompressed document as pretty JSON, unless the file already holds it.
pub fn write_metadata(kit_root: &Utf8Path, document: &Value) -> Result<bool> {
    let bytes = serde_json::to_vec_pretty(document)?;
    write_if_changed(&kit_root.join(METADATA_FILE), &bytes)
}

/// Read and normalize a `metadata.json`.
pub fn load_metadata(path: &Utf8Path) -> Result<(Value, KitDocument)> {
    if !path.as_std_path().is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let value: Value = serde_json::from_slice(&std::fs::read(path.as_std_path())?)?;
    let doc = KitDocument::from_value(&value)?;
    Ok((value, doc))
}

/// Result of an import.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub kit_root: Utf8PathBuf,
    pub document: KitDocument,
    pub summary: ReorganizeSummary,
}

/// Imports kits into an output directory. Kits land in `{output_root}/{name}_{id}` and
/// share the blob cache at `{output_root}/cache_blobs`.
pub struct KitImporter {
    output_root: Utf8PathBuf,
    options: ReorganizeOptions,
    source: Option<Arc<dyn BlobSource>>,
    progress_callback: Option<ProgressCallback>,
}

impl KitImporter {
    pub fn new(output_root: impl Into<Utf8PathBuf>, options: ReorganizeOptions) -> Self {
        Self {
            output_root: output_root.into(),
            options,
            source: None,
            progress_callback: None,
        }
    }

    /// Fetch blobs from `source` instead of the configured image host.
    pub fn with_source(mut self, source: Arc<dyn BlobSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ReorganizeProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Decompress `payload`, write its `metadata.json` and reorganize it.
    ///
    /// Only an undecodable payload or a root that is not a kit is an error.
    pub fn import(&self, payload: &RawPayload) -> Result<ImportReport> {
        let value = payload.decompress()?;
        let doc = KitDocument::from_value(&value)?;
        let kit_root = self.output_root.join(kit_folder_name(&doc));
        tracing::info!(
            "Importing kit {:?} ({} parts) into {}",
            doc.name.as_deref().unwrap_or("unnamed"),
            doc.parts.len(),
            kit_root
        );

        std::fs::create_dir_all(kit_root.as_std_path())?;
        if write_metadata(&kit_root, &value)? {
            tracing::info!("Wrote {}", kit_root.join(METADATA_FILE));
        }
        self.reorganize(kit_root, doc, &self.output_root)
    }

    /// Re-run the reorganization of an existing kit from its `metadata.json`. The cache is
    /// looked up next to the kit folder.
    pub fn reorganize_metadata(&self, metadata: &Utf8Path) -> Result<ImportReport> {
        let (_, doc) = load_metadata(metadata)?;
        let kit_root = metadata
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."))
            .to_path_buf();
        let cache_root = kit_root
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."))
            .to_path_buf();
        self.reorganize(kit_root, doc, &cache_root)
    }

    fn reorganize(
        &self,
        kit_root: Utf8PathBuf,
        doc: KitDocument,
        cache_root: &Utf8Path,
    ) -> Result<ImportReport> {
        let source: Arc<dyn BlobSource> = match &self.source {
            Some(source) => Arc::clone(source),
            None => Arc::new(HttpBlobSource::new(
                self.options.image_host.clone(),
                self.options.timeout,
            )?),
        };
        let cache = BlobCache::new(cache_root, source, self.options.retry_policy());
        let summary =
            KitReorganizer::with_cache(kit_root.clone(), Arc::new(cache), self.options.clone())
                .with_progress_callback(self.progress_callback.clone())
                .run(&doc)?;
        Ok(ImportReport {
            kit_root,
            document: doc,
            summary,
        })
    }
}

/// Import `payload` into `output_root`, fetching from `options.image_host`.
pub fn import_kit(
    payload: &RawPayload,
    output_root: &Utf8Path,
    options: ReorganizeOptions,
) -> Result<ImportReport> {
    KitImporter::new(output_root, options).import(payload)
}

/// Reorganize the kit whose `metadata.json` is at `path`.
pub fn reorganize_metadata(path: &Utf8Path, options: ReorganizeOptions) -> Result<ImportReport> {
    KitImporter::new(".", options).reorganize_metadata(path)
}
