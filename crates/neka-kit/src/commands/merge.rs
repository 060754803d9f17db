use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::Result;
use neka_kit::import::load_metadata;
use neka_kit::plan::assets_for;
use neka_kit::{merge_files, plan_render_layers, CanvasSize, KitDocument, METADATA_FILE};

use crate::errors::CliError;
use crate::println_pad;
use crate::utils::config::load_config;

pub struct MergeLayerFilesArgs {
    pub dir: String,
    pub files: Vec<u32>,
    pub dest: Option<u32>,
}

/// The `{X}-{Y}` folder containing `dir` (itself or its parent) and its coordinates.
fn layer_folder(dir: &Utf8Path) -> Option<(&Utf8Path, usize, usize)> {
    dir.ancestors().take(2).find_map(|candidate| {
        let (x, y) = candidate.file_name()?.split_once('-')?;
        Some((candidate, x.parse().ok()?, y.parse().ok()?))
    })
}

/// Crop offsets of `files` in the render layer `(x, y)`, from the kit document.
fn offsets_for(doc: &KitDocument, x: usize, y: usize, files: &[u32]) -> Vec<(i64, i64)> {
    let layers = plan_render_layers(doc);
    let Some(layer) = layers.iter().find(|l| l.x == x && l.y() == y) else {
        tracing::warn!("No render layer {}-{} in metadata, merging without offsets", x, y);
        return Vec::new();
    };
    let items = &doc.parts[layer.part].items;
    files
        .iter()
        .map(|n| {
            (*n as usize)
                .checked_sub(1)
                .and_then(|i| items.get(i))
                .and_then(|item| assets_for(item, &layer.kind).first().and_then(|a| a.crop))
                .map(|crop| (crop.x, crop.y))
                .unwrap_or((0, 0))
        })
        .collect()
}

pub fn merge_layer_files(args: MergeLayerFilesArgs) -> Result<()> {
    let dir = Utf8PathBuf::from(&args.dir);
    if !dir.as_std_path().is_dir() {
        return Err(CliError::file_not_found(dir).into());
    }
    let Some(dest) = args.dest.or_else(|| args.files.first().copied()) else {
        return Err(miette::miette!("No files to merge"));
    };

    let fallback = load_config().reorganize_options(None).fallback_canvas;
    let (offsets, canvas): (Vec<(i64, i64)>, CanvasSize) = match layer_folder(&dir) {
        Some((folder, x, y)) => {
            let metadata = folder
                .parent()
                .map(|kit| kit.join(METADATA_FILE))
                .unwrap_or_else(|| Utf8PathBuf::from(METADATA_FILE));
            match load_metadata(&metadata) {
                Ok((_, doc)) => (offsets_for(&doc, x, y, &args.files), doc.canvas_size(fallback)),
                Err(e) => {
                    tracing::warn!("Cannot read {}: {}", metadata, e);
                    (Vec::new(), fallback)
                }
            }
        }
        None => (Vec::new(), fallback),
    };

    let merged = merge_files(&dir, &args.files, dest, &offsets, canvas)
        .map_err(CliError::kit_failed)?;
    println_pad!(
        "{} {} {}",
        "✓ Merged".bright_green().bold(),
        args.files.len().to_string().bright_white(),
        format!("files into {}", merged).dimmed()
    );
    Ok(())
}
