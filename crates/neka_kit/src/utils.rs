//! Filesystem helpers shared by the cache and the reorganizer.
//!
//! Output files are existence-checked before they are produced, so a half-written file
//! would never be repaired by a re-run. Every write therefore goes to a temporary file in
//! the destination directory and is renamed into place.

use std::io::{Cursor, Write};

use camino::Utf8Path;
use image::{ImageFormat, RgbaImage};
use tempfile::NamedTempFile;

use crate::error::Result;

/// Write `bytes` through a temporary sibling of `dst`, then rename it into place.
pub(crate) fn persist_bytes(dst: &Utf8Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = dst
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    std::fs::create_dir_all(parent.as_std_path())?;
    let mut tmp = NamedTempFile::new_in(parent.as_std_path())?;
    tmp.write_all(bytes)?;
    tmp.persist(dst.as_std_path()).map_err(|e| e.error)?;
    Ok(())
}

/// Write `bytes` to `dst` atomically, replacing any existing file.
pub fn write_atomic(dst: &Utf8Path, bytes: &[u8]) -> Result<()> {
    Ok(persist_bytes(dst, bytes)?)
}

/// Copy `src` to `dst` atomically.
pub fn copy_atomic(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    let bytes = std::fs::read(src.as_std_path())?;
    write_atomic(dst, &bytes)
}

/// Encode an image as PNG and write it atomically.
pub fn write_png_atomic(dst: &Utf8Path, image: &RgbaImage) -> Result<()> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    write_atomic(dst, &buffer)
}

/// Write `bytes` unless `dst` already holds exactly these bytes. Returns whether a write
/// happened.
pub fn write_if_changed(dst: &Utf8Path, bytes: &[u8]) -> Result<bool> {
    if let Ok(existing) = std::fs::read(dst.as_std_path()) {
        if existing == bytes {
            return Ok(false);
        }
    }
    write_atomic(dst, bytes)?;
    Ok(true)
}

/// Make a kit name usable as a folder name: spaces become `_`, path separators `-`.
pub fn sanitize_folder_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}
