//! Character kit reorganization.
//!
//! Takes a decompressed kit document and lays its image layers out as a deterministic
//! folder tree:
//!
//! - **Document model**: [`KitDocument`] normalizes the loosely typed JSON once, skipping
//!   malformed nodes with a [`FormatIssue`]
//! - **Colour variants**: [`ToningTable`] resolves tonings into uniquely labelled
//!   [`ColorVariant`]s, baked into [`GradientLut`]s for [`apply_gradient`]
//! - **Layout**: [`plan_render_layers`] ranks parts and addon layers into `{X}-{Y}` folders
//! - **Blobs**: [`BlobCache`] fetches through a [`BlobSource`] with bounded retries and
//!   single-flight downloads
//! - **Orchestration**: [`KitReorganizer`] and [`KitImporter`] drive a full run and
//!   report a [`ReorganizeSummary`]
//! - **Inspection**: [`KitStructure`] reads a finished tree back
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use neka_kit::{KitImporter, ReorganizeOptions};
//! use neka_vocab::RawPayload;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let payload = RawPayload::from_slice(&std::fs::read("next_data.json")?)?;
//! let report = KitImporter::new(Utf8Path::new("downloads"), ReorganizeOptions::default())
//!     .with_progress(|p| println!("{:?} {}/{}", p.stage, p.current, p.total))
//!     .import(&payload)?;
//! println!(
//!     "{}: {} files written, {} blobs failed",
//!     report.kit_root,
//!     report.summary.files_written,
//!     report.summary.failed_blobs.len()
//! );
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod compose;
pub mod document;
pub mod error;
pub mod gradient;
pub mod import;
pub mod plan;
pub mod recolor;
pub mod reorganize;
pub mod separated;
pub mod structure;
pub mod toning;
pub mod utils;

#[cfg(test)]
mod tests;

pub use cache::{BlobCache, BlobSource, HttpBlobSource, RetryPolicy};
pub use compose::{composite, merge_files, PlacedLayer};
pub use document::{CanvasSize, FormatIssue, KitDocument, DEFAULT_CANVAS};
pub use error::{Error, FetchError, Result};
pub use gradient::GradientLut;
pub use import::{import_kit, reorganize_metadata, ImportReport, KitImporter, METADATA_FILE};
pub use plan::{plan_render_layers, RenderLayer, RenderLayerKind};
pub use recolor::{apply_gradient, recolor_file, RecolorOutcome};
pub use reorganize::{
    KitReorganizer, ReorganizeOptions, ReorganizeProgress, ReorganizeStage, ReorganizeSummary,
};
pub use separated::SEPARATED_LAYERS_FILE;
pub use structure::{FolderInfo, KitStructure};
pub use toning::{ColorVariant, ToningTable};
