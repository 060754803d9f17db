use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use image::{ImageFormat, Rgba, RgbaImage};
use neka_vocab::RawPayload;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::cache::mock::MemorySource;
use crate::cache::{BlobCache, RetryPolicy};
use crate::document::KitDocument;
use crate::import::{KitImporter, METADATA_FILE};
use crate::reorganize::{KitReorganizer, ReorganizeOptions, ReorganizeStage};
use crate::separated::SEPARATED_LAYERS_FILE;

fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn scratch() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    (tmp, root)
}

fn options(workers: usize) -> ReorganizeOptions {
    ReorganizeOptions {
        max_retries: 1,
        retry_backoff: Duration::ZERO,
        workers,
        ..ReorganizeOptions::default()
    }
}

fn reorganizer(root: &Utf8Path, source: Arc<MemorySource>, workers: usize) -> KitReorganizer {
    let options = options(workers);
    let cache = BlobCache::new(root, source, options.retry_policy());
    KitReorganizer::with_cache(root.join("kit"), Arc::new(cache), options)
}

/// Every file under `dir`, by relative path.
fn snapshot(dir: &Utf8Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(base: &Utf8Path, dir: &Utf8Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in dir.read_dir_utf8().unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if entry.file_type().unwrap().is_dir() {
                walk(base, path, out);
            } else {
                let rel = path.strip_prefix(base).unwrap().as_str().replace('\\', "/");
                out.insert(rel, std::fs::read(path.as_std_path()).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

fn pixel(path: &Utf8Path, x: u32, y: u32) -> Rgba<u8> {
    *image::open(path.as_std_path())
        .unwrap()
        .to_rgba8()
        .get_pixel(x, y)
}

fn separated(kit: &Utf8Path) -> Vec<String> {
    serde_json::from_slice(&std::fs::read(kit.join(SEPARATED_LAYERS_FILE).as_std_path()).unwrap())
        .unwrap()
}

fn two_colour_kit() -> KitDocument {
    KitDocument::from_value(&json!({
        "id": 1,
        "name": "two colours",
        "data": {
            "tonings": [{
                "id": "t1",
                "filters": [
                    {"gradients": [{"offset": 0, "color": "#FF0000"}]},
                    {"gradients": [{"offset": 0, "color": "#00FF00"}]}
                ]
            }],
            "parts": [{
                "name": "hair",
                "zIndex": 0,
                "toning": "t1",
                "items": [[{"blob": "abc123"}]]
            }]
        }
    }))
    .unwrap()
}

#[test]
fn single_layer_two_colours() {
    let (_tmp, root) = scratch();
    let source = Arc::new(MemorySource::new().with_blob("abc123", png(2, 2, [255, 255, 255, 200])));
    let summary = reorganizer(&root, source, 1)
        .run(&two_colour_kit())
        .unwrap();

    let kit = root.join("kit");
    let folder = kit.join("1-1");
    assert!(folder.join("thumb_1.png").as_std_path().is_file());
    assert_eq!(pixel(&folder.join("FF0000").join("1.png"), 0, 0), Rgba([255, 0, 0, 200]));
    assert_eq!(pixel(&folder.join("00FF00").join("1.png"), 1, 1), Rgba([0, 255, 0, 200]));
    assert!(!folder.join("1.png").as_std_path().exists());

    assert!(separated(&kit).is_empty());
    assert!(summary.separated.is_empty());
    assert!(summary.failed_blobs.is_empty());
    assert_eq!(summary.render_layers, 1);
    // thumbnail + two colour files
    assert_eq!(summary.files_written, 3);
}

#[test]
fn rerun_is_a_no_op() {
    let (_tmp, root) = scratch();
    let source = Arc::new(MemorySource::new().with_blob("abc123", png(2, 2, [128, 128, 128, 255])));
    let doc = two_colour_kit();

    reorganizer(&root, source.clone(), 0).run(&doc).unwrap();
    let first = snapshot(&root.join("kit"));
    let calls = source.calls();

    let summary = reorganizer(&root, source.clone(), 0).run(&doc).unwrap();
    assert_eq!(summary.files_written, 0);
    assert_eq!(summary.files_existing, 3);
    assert_eq!(source.calls(), calls);
    assert_eq!(snapshot(&root.join("kit")), first);
}

#[test]
fn interrupted_run_fills_gaps_only() {
    let (_tmp, root) = scratch();
    let source = Arc::new(MemorySource::new().with_blob("abc123", png(1, 1, [0, 0, 0, 255])));
    let doc = two_colour_kit();
    reorganizer(&root, source.clone(), 1).run(&doc).unwrap();

    let red = root.join("kit").join("1-1").join("FF0000").join("1.png");
    std::fs::write(red.as_std_path(), b"kept").unwrap();
    std::fs::remove_file(root.join("kit").join("1-1").join("00FF00").join("1.png").as_std_path())
        .unwrap();

    let summary = reorganizer(&root, source, 1).run(&doc).unwrap();
    assert_eq!(summary.files_written, 1);
    assert_eq!(std::fs::read(red.as_std_path()).unwrap(), b"kept");
}

#[test]
fn addon_layers_keep_numbering_aligned() {
    let (_tmp, root) = scratch();
    let source = Arc::new(
        MemorySource::new()
            .with_blob("m1", png(1, 1, [255, 255, 255, 255]))
            .with_blob("m2", png(1, 1, [255, 255, 255, 255]))
            .with_blob("t1", png(1, 1, [255, 255, 255, 255]))
            .with_blob("t3", png(1, 1, [255, 255, 255, 255]))
            .with_blob("cover", png(1, 1, [1, 2, 3, 255])),
    );
    let doc = KitDocument::from_value(&json!({"data": {
        "parts": [
            {"name": "body", "zIndex": 10, "items": []},
            {
                "name": "hair",
                "zIndex": 1,
                "cover": "cover",
                "addonLayers": [{"id": "a1"}],
                "items": [
                    [{"blob": "m1", "addonTextures": [{"blob": "t1", "layer": "a1"}]}],
                    [{"blob": "m2"}],
                    [{"addonTextures": [{"blob": "t3", "layer": "a1"}]}]
                ]
            }
        ]
    }}))
    .unwrap();

    let summary = reorganizer(&root, source, 0).run(&doc).unwrap();
    let kit = root.join("kit");

    // hair ranks before body; its addon layer comes right after it.
    let main = kit.join("1-2");
    let addon = kit.join("2-2");
    assert!(kit.join("3-1").as_std_path().is_dir());

    assert!(main.join("1.png").as_std_path().is_file());
    assert!(main.join("2.png").as_std_path().is_file());
    assert!(!main.join("3.png").as_std_path().exists());

    assert!(addon.join("1.png").as_std_path().is_file());
    assert!(!addon.join("2.png").as_std_path().exists());
    assert!(addon.join("3.png").as_std_path().is_file());

    for folder in [&main, &addon] {
        assert!(folder.join("nav.png").as_std_path().is_file());
        assert!(folder.join("thumb_1.png").as_std_path().is_file());
        assert!(folder.join("thumb_2.png").as_std_path().is_file());
        assert!(!folder.join("thumb_3.png").as_std_path().exists());
    }

    assert_eq!(separated(&kit), ["1-2", "2-2"]);
    assert_eq!(summary.separated, ["1-2", "2-2"]);
}

#[test]
fn multi_asset_items_are_composited() {
    let (_tmp, root) = scratch();
    let source = Arc::new(
        MemorySource::new()
            .with_blob("red", png(2, 2, [255, 0, 0, 255]))
            .with_blob("blue", png(2, 2, [0, 0, 255, 255])),
    );
    let doc = KitDocument::from_value(&json!({"data": {"parts": [{
        "name": "eyes",
        "items": [[
            {"blob": "red", "crop": {"x": 0, "y": 0, "w": 2, "h": 2, "ow": 4, "oh": 4}},
            {"blob": "blue", "crop": {"x": 2, "y": 2, "w": 2, "h": 2, "ow": 4, "oh": 4}}
        ]]
    }]}}))
    .unwrap();

    let summary = reorganizer(&root, source, 1).run(&doc).unwrap();
    let file = root.join("kit").join("1-1").join("1.png");
    let image = image::open(file.as_std_path()).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (4, 4));
    assert_eq!(*image.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    assert_eq!(*image.get_pixel(3, 3), Rgba([0, 0, 255, 255]));
    assert_eq!(image.get_pixel(0, 3)[3], 0);
    assert_eq!(summary.separated, ["1-1"]);
    assert_eq!(summary.canvas.width, 4);
}

#[test]
fn failed_blobs_leave_gaps() {
    let (_tmp, root) = scratch();
    let source = Arc::new(
        MemorySource::new()
            .with_blob("ok", png(1, 1, [9, 9, 9, 255]))
            .with_failures("ok", 1),
    );
    let doc = KitDocument::from_value(&json!({"data": {"parts": [{
        "name": "hat",
        "items": [[{"blob": "gone"}], [{"blob": "ok"}]]
    }]}}))
    .unwrap();

    let summary = reorganizer(&root, source, 1).run(&doc).unwrap();
    let folder = root.join("kit").join("1-1");
    assert!(!folder.join("1.png").as_std_path().exists());
    assert!(folder.join("2.png").as_std_path().is_file());
    assert_eq!(summary.failed_blobs, ["gone"]);
}

#[test]
fn undecodable_assets_are_copied_verbatim() {
    let (_tmp, root) = scratch();
    let source = Arc::new(MemorySource::new().with_blob("abc123", b"not a png".to_vec()));
    let summary = reorganizer(&root, source, 1)
        .run(&two_colour_kit())
        .unwrap();

    let file = root.join("kit").join("1-1").join("FF0000").join("1.png");
    assert_eq!(std::fs::read(file.as_std_path()).unwrap(), b"not a png");
    assert_eq!(summary.undecodable, 2);
}

#[test]
fn progress_is_reported_per_render_layer() {
    let (_tmp, root) = scratch();
    let source = Arc::new(MemorySource::new().with_blob("abc123", png(1, 1, [0, 0, 0, 255])));
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = stages.clone();

    reorganizer(&root, source, 1)
        .with_progress(move |p| sink.lock().unwrap().push((p.stage, p.current, p.total)))
        .run(&two_colour_kit())
        .unwrap();

    assert_eq!(
        *stages.lock().unwrap(),
        [
            (ReorganizeStage::Planning, 0, 0),
            (ReorganizeStage::Processing, 1, 1),
            (ReorganizeStage::Complete, 1, 1),
        ]
    );
}

/// `{"id": 7, "name": "Mini", "data": {"parts": [{"name": "hair", "items": [[{"blob": "abc123"}]]}]}}`
fn packed_kit() -> Value {
    json!({
        "props": {"pageProps": {"kitOnSale": [[
            "o|1|5|6|7",
            "a|2|3|4",
            "s|id",
            "s|name",
            "s|data",
            "n|7",
            "s|Mini",
            "o|8|A",
            "a|9",
            "s|parts",
            "a|B",
            "o|C|E|F",
            "a|3|D",
            "s|items",
            "s|hair",
            "a|G",
            "a|H",
            "o|I|K",
            "a|J",
            "s|blob",
            "s|abc123"
        ], "0"]}}
    })
}

#[test]
fn import_from_packed_payload() {
    let (_tmp, root) = scratch();
    let source = Arc::new(MemorySource::new().with_blob("abc123", png(1, 1, [50, 60, 70, 255])));
    let payload = RawPayload::from_json(packed_kit()).unwrap();

    let importer = KitImporter::new(root.clone(), options(1)).with_source(source.clone());
    let report = importer.import(&payload).unwrap();

    assert_eq!(report.kit_root, root.join("Mini_7"));
    assert!(root.join("cache_blobs").join("abc123.png").as_std_path().is_file());
    assert_eq!(
        std::fs::read(report.kit_root.join("1-1").join("1.png").as_std_path()).unwrap(),
        png(1, 1, [50, 60, 70, 255])
    );

    let metadata: Value = serde_json::from_slice(
        &std::fs::read(report.kit_root.join(METADATA_FILE).as_std_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["data"]["parts"][0]["name"], "hair");
    assert_eq!(metadata["id"], 7);

    // Re-running from the written metadata finds everything in place.
    let again = importer
        .reorganize_metadata(&report.kit_root.join(METADATA_FILE))
        .unwrap();
    assert_eq!(again.summary.files_written, 0);
    assert_eq!(source.calls(), 1);
}

#[test]
fn import_rejects_unknown_payload() {
    assert!(RawPayload::from_json(json!({"props": {}})).is_err());
}

#[test]
fn retry_policy_from_options() {
    let policy: RetryPolicy = ReorganizeOptions::default().retry_policy();
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.backoff, Duration::from_millis(500));
}

#[test]
fn finished_kit_needs_no_network() {
    let (_tmp, root) = scratch();
    let source = Arc::new(MemorySource::new().with_blob("abc123", png(1, 1, [50, 60, 70, 255])));
    let payload = RawPayload::from_json(packed_kit()).unwrap();
    let report = KitImporter::new(root.clone(), options(1))
        .with_source(source)
        .import(&payload)
        .unwrap();

    // The HTTP source is never reached: every output already exists.
    let again =
        crate::import::reorganize_metadata(&report.kit_root.join(METADATA_FILE), options(1))
            .unwrap();
    assert_eq!(again.summary.files_written, 0);
    assert!(again.summary.failed_blobs.is_empty());

    let reorganizer = KitReorganizer::new(report.kit_root.clone(), &root, options(1)).unwrap();
    assert_eq!(reorganizer.kit_root(), report.kit_root.as_path());
    let summary = reorganizer.run(&report.document).unwrap();
    assert_eq!(summary.files_written, 0);
}

#[test]
fn unwritable_outputs_do_not_stop_the_run() {
    let (_tmp, root) = scratch();
    let source = Arc::new(
        MemorySource::new()
            .with_blob("abc123", png(1, 1, [255, 255, 255, 255]))
            .with_blob("eye", png(1, 1, [255, 255, 255, 255])),
    );
    let value = json!({"data": {
        "tonings": [{"id": "t1", "filters": [
            {"gradients": [{"offset": 0, "color": "#FF0000"}]},
            {"gradients": [{"offset": 0, "color": "#00FF00"}]}
        ]}],
        "parts": [
            {"name": "hair", "zIndex": 0, "toning": "t1", "items": [[{"blob": "abc123"}]]},
            {"name": "eyes", "zIndex": 1, "items": [[{"blob": "eye"}]]}
        ]
    }});
    let doc = KitDocument::from_value(&value).unwrap();

    // A plain file where the red colour folder should go.
    let blocked = root.join("kit").join("1-1").join("FF0000");
    std::fs::create_dir_all(blocked.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(blocked.as_std_path(), b"in the way").unwrap();

    let summary = reorganizer(&root, source, 0).run(&doc).unwrap();

    assert_eq!(summary.failed_writes, [blocked]);
    assert!(summary.failed_blobs.is_empty());
    let kit = root.join("kit");
    assert!(kit.join("1-1").join("00FF00").join("1.png").as_std_path().is_file());
    assert!(kit.join("2-2").join("1.png").as_std_path().is_file());
}

#[test]
fn implausible_canvas_falls_back() {
    let (_tmp, root) = scratch();
    let source = Arc::new(
        MemorySource::new()
            .with_blob("a", png(1, 1, [255, 0, 0, 255]))
            .with_blob("b", png(1, 1, [0, 0, 255, 255])),
    );
    let huge = json!({"x": 0, "y": 0, "ow": 4000000000u64, "oh": 4000000000u64});
    let doc = KitDocument::from_value(&json!({"data": {"parts": [{
        "name": "hair",
        "items": [[{"blob": "a", "crop": huge}, {"blob": "b", "crop": huge}]]
    }]}}))
    .unwrap();

    let options = ReorganizeOptions {
        fallback_canvas: crate::document::CanvasSize {
            width: 4,
            height: 4,
        },
        ..options(1)
    };
    let cache = BlobCache::new(&root, source, options.retry_policy());
    let summary = KitReorganizer::with_cache(root.join("kit"), Arc::new(cache), options)
        .run(&doc)
        .unwrap();

    assert_eq!(summary.canvas.width, 4);
    assert_eq!(summary.issues.len(), 2);
    assert!(summary.failed_writes.is_empty());
    let merged = image::open(root.join("kit").join("1-1").join("1.png").as_std_path()).unwrap();
    assert_eq!((merged.width(), merged.height()), (4, 4));
}
