//! Grayscale-to-gradient recolouring.
//!
//! Each pixel's luminosity picks a colour from a [`GradientLut`]; alpha is carried over
//! untouched. Luminosity uses the ITU-R 601 weights (`0.299 R + 0.587 G + 0.114 B`), the
//! same conversion image editors use for an "L" channel.

use camino::Utf8Path;
use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::Result;
use crate::gradient::GradientLut;
use crate::utils::{write_atomic, write_png_atomic};

/// How a recoloured file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecolorOutcome {
    Recolored,
    /// The source could not be decoded and was copied byte for byte.
    CopiedVerbatim,
}

pub fn luminosity(pixel: Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    let weighted = r as u32 * 299 + g as u32 * 587 + b as u32 * 114;
    ((weighted + 500) / 1000) as u8
}

/// Recolour an image through `lut`, keeping its alpha channel.
pub fn apply_gradient(source: &DynamicImage, lut: &GradientLut) -> RgbaImage {
    let mut out = source.to_rgba8();
    for pixel in out.pixels_mut() {
        let alpha = pixel[3];
        let mapped = lut.get(luminosity(*pixel));
        *pixel = Rgba([mapped[0], mapped[1], mapped[2], alpha]);
    }
    out
}

/// Decode `bytes`, recolour them and write a PNG to `dst`.
///
/// Undecodable input is not an error: the raw bytes are written to `dst` instead and a
/// warning is logged. Only a failure to write anything at all is returned.
pub fn recolor_bytes_to(bytes: &[u8], lut: &GradientLut, dst: &Utf8Path) -> Result<RecolorOutcome> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            write_png_atomic(dst, &apply_gradient(&img, lut))?;
            Ok(RecolorOutcome::Recolored)
        }
        Err(e) => {
            tracing::warn!("Cannot decode image for {}, copying verbatim: {}", dst, e);
            write_atomic(dst, bytes)?;
            Ok(RecolorOutcome::CopiedVerbatim)
        }
    }
}

/// File-to-file variant of [`recolor_bytes_to`].
pub fn recolor_file(src: &Utf8Path, dst: &Utf8Path, lut: &GradientLut) -> Result<RecolorOutcome> {
    let bytes = std::fs::read(src.as_std_path())?;
    recolor_bytes_to(&bytes, lut, dst)
}
