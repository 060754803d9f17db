//! Flat alpha compositing of cropped layers.
//!
//! Assets are stored cropped to their opaque bounds, with the crop's offset inside the
//! original canvas recorded in the document. Compositing pastes each one back at that
//! offset on a transparent canvas. Nothing beyond source-over blending is done.

use camino::{Utf8Path, Utf8PathBuf};
use image::{imageops, DynamicImage, RgbaImage};

use crate::document::{CanvasSize, MAX_CANVAS_SIDE};
use crate::error::{Error, Result};
use crate::utils::write_png_atomic;

/// Longest edge of a regenerated item thumbnail.
pub const THUMBNAIL_SIZE: u32 = 200;

/// An image together with its offset inside the canvas.
#[derive(Debug, Clone)]
pub struct PlacedLayer {
    pub image: RgbaImage,
    pub x: i64,
    pub y: i64,
}

impl PlacedLayer {
    pub fn new(image: RgbaImage, x: i64, y: i64) -> Self {
        Self { image, x, y }
    }
}

/// Paste `layers` in order onto a transparent canvas.
///
/// A layer smaller than the canvas in either dimension is placed at its offset; a layer
/// at least as large as the canvas is already uncropped and goes to `(0, 0)`. The canvas
/// grows to fit layers larger than `canvas`.
///
/// `canvas` usually comes from document `crop.ow/oh`. The output is refused with
/// [`Error::InvalidDocument`] when either side would exceed [`MAX_CANVAS_SIDE`].
pub fn composite(layers: &[PlacedLayer], canvas: CanvasSize) -> Result<RgbaImage> {
    let width = layers
        .iter()
        .map(|l| l.image.width())
        .fold(canvas.width, u32::max);
    let height = layers
        .iter()
        .map(|l| l.image.height())
        .fold(canvas.height, u32::max);

    if width > MAX_CANVAS_SIDE || height > MAX_CANVAS_SIDE {
        return Err(Error::InvalidDocument(format!(
            "composite of {width}x{height} exceeds {MAX_CANVAS_SIDE} pixels per side"
        )));
    }

    let mut out = RgbaImage::new(width, height);
    for layer in layers {
        let cropped = layer.image.width() < canvas.width || layer.image.height() < canvas.height;
        let (x, y) = if cropped { (layer.x, layer.y) } else { (0, 0) };
        imageops::overlay(&mut out, &layer.image, x, y);
    }
    Ok(out)
}

/// Whether `dir` is a render-layer folder (`{X}-{Y}`) rather than a colour subfolder.
fn is_layer_root(dir: &Utf8Path) -> bool {
    dir.file_name()
        .and_then(|name| name.split_once('-'))
        .is_some_and(|(x, y)| {
            !x.is_empty()
                && !y.is_empty()
                && x.bytes().all(|b| b.is_ascii_digit())
                && y.bytes().all(|b| b.is_ascii_digit())
        })
}

/// Stack the numbered files `files` of `dir` into `{dest}.png`.
///
/// `offsets[i]` is the crop offset of `files[i]`; missing entries are `(0, 0)`. Source files
/// other than the destination are deleted afterwards. In a render-layer root folder the
/// item thumbnail `thumb_{dest}.png` is regenerated from the merged image.
pub fn merge_files(
    dir: &Utf8Path,
    files: &[u32],
    dest: u32,
    offsets: &[(i64, i64)],
    canvas: CanvasSize,
) -> Result<Utf8PathBuf> {
    if files.is_empty() {
        return Err(Error::Other("nothing to merge".to_string()));
    }

    let mut layers = Vec::with_capacity(files.len());
    for (i, number) in files.iter().enumerate() {
        let path = dir.join(format!("{number}.png"));
        if !path.as_std_path().exists() {
            return Err(Error::NotFound(path));
        }
        let image = image::open(path.as_std_path())?.to_rgba8();
        let (x, y) = offsets.get(i).copied().unwrap_or((0, 0));
        layers.push(PlacedLayer::new(image, x, y));
    }

    let merged = composite(&layers, canvas)?;
    let dest_path = dir.join(format!("{dest}.png"));
    write_png_atomic(&dest_path, &merged)?;
    tracing::info!("Merged {} files into {}", files.len(), dest_path);

    for number in files.iter().filter(|n| **n != dest) {
        let path = dir.join(format!("{number}.png"));
        std::fs::remove_file(path.as_std_path())?;
        tracing::debug!("Removed merged source {}", path);
    }

    if is_layer_root(dir) {
        let thumb = DynamicImage::ImageRgba8(merged)
            .thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
            .to_rgba8();
        write_png_atomic(&dir.join(format!("thumb_{dest}.png")), &thumb)?;
    }

    Ok(dest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(color))
    }

    const CANVAS: CanvasSize = CanvasSize {
        width: 10,
        height: 10,
    };

    #[test]
    fn cropped_layers_land_at_offset() {
        let out = composite(
            &[PlacedLayer::new(solid(2, 2, [255, 0, 0, 255]), 3, 4)],
            CANVAS,
        )
        .unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(*out.get_pixel(3, 4), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(4, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(2, 4)[3], 0);
        assert_eq!(out.get_pixel(5, 4)[3], 0);
    }

    #[test]
    fn full_size_layers_ignore_offset_and_grow_canvas() {
        let out = composite(
            &[PlacedLayer::new(solid(12, 10, [0, 0, 255, 255]), 5, 5)],
            CANVAS,
        )
        .unwrap();
        assert_eq!(out.dimensions(), (12, 10));
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn later_layers_paint_over_earlier() {
        let out = composite(
            &[
                PlacedLayer::new(solid(10, 10, [255, 0, 0, 255]), 0, 0),
                PlacedLayer::new(solid(1, 1, [0, 255, 0, 255]), 0, 0),
            ],
            CANVAS,
        )
        .unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(*out.get_pixel(1, 1), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn oversized_canvas_is_refused() {
        let huge = CanvasSize {
            width: 4_000_000_000,
            height: 4_000_000_000,
        };
        assert!(matches!(
            composite(&[PlacedLayer::new(solid(1, 1, [0, 0, 0, 255]), 0, 0)], huge),
            Err(Error::InvalidDocument(_))
        ));

        let edge = CanvasSize {
            width: MAX_CANVAS_SIDE,
            height: 1,
        };
        assert_eq!(composite(&[], edge).unwrap().dimensions(), (MAX_CANVAS_SIDE, 1));
    }

    #[test]
    fn merge_in_root_folder_regenerates_thumbnail() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let dir = root.join("3-1");
        std::fs::create_dir_all(dir.as_std_path()).unwrap();
        solid(2, 2, [255, 0, 0, 255])
            .save(dir.join("1.png").as_std_path())
            .unwrap();
        solid(2, 2, [0, 255, 0, 255])
            .save(dir.join("2.png").as_std_path())
            .unwrap();

        let merged = merge_files(&dir, &[1, 2], 1, &[(0, 0), (5, 5)], CANVAS).unwrap();
        assert_eq!(merged, dir.join("1.png"));
        assert!(!dir.join("2.png").as_std_path().exists());

        let image = image::open(merged.as_std_path()).unwrap().to_rgba8();
        assert_eq!(*image.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(5, 5), Rgba([0, 255, 0, 255]));
        assert!(dir.join("thumb_1.png").as_std_path().exists());
    }

    #[test]
    fn merge_in_colour_folder_leaves_thumbnails_alone() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let dir = root.join("3-1").join("FF0000");
        std::fs::create_dir_all(dir.as_std_path()).unwrap();
        solid(2, 2, [255, 0, 0, 255])
            .save(dir.join("4.png").as_std_path())
            .unwrap();

        merge_files(&dir, &[4], 4, &[], CANVAS).unwrap();
        assert!(dir.join("4.png").as_std_path().exists());
        assert!(!dir.join("thumb_4.png").as_std_path().exists());
    }

    #[test]
    fn merge_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        assert!(matches!(
            merge_files(&dir, &[1], 1, &[], CANVAS),
            Err(Error::NotFound(_))
        ));
    }
}
