mod config;
mod decompress;
mod import;
mod inspect;
mod merge;

pub use config::{reset_config, set_config_value, show_config};
pub use decompress::{decompress_payload, DecompressPayloadArgs};
pub use import::{import_kit, reorganize_kit, ImportKitArgs, ReorganizeKitArgs};
pub use inspect::{inspect_kit, InspectKitArgs};
pub use merge::{merge_layer_files, MergeLayerFilesArgs};
