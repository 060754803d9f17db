//! Reading a reorganized kit tree back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;

use crate::document::{CanvasSize, KitDocument, DEFAULT_CANVAS};
use crate::error::{Error, Result};
use crate::import::METADATA_FILE;
use crate::separated::SEPARATED_LAYERS_FILE;

static FOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").expect("valid folder regex"));
static THUMB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^thumb_(\d+)\.png$").expect("valid thumbnail regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderInfo {
    pub name: String,
    /// `None` for folders not named `{X}-{Y}`.
    pub x: Option<usize>,
    pub y: Option<usize>,
    /// Highest `thumb_{n}` present.
    pub items_count: usize,
    /// Colour subfolders, sorted.
    pub colors: Vec<String>,
    pub is_separated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KitStructure {
    pub root: Utf8PathBuf,
    /// `{X}-{Y}` folders by coordinates, then other folders by name.
    pub folders: Vec<FolderInfo>,
    /// X values used by more than one folder.
    pub duplicate_x: Vec<usize>,
    /// X values in `1..=max` without a folder.
    pub missing_x: Vec<usize>,
    /// Y values in `1..=max` without a folder.
    pub missing_y: Vec<usize>,
    /// Canvas of the kit from `metadata.json`, if it could be read.
    pub canvas: Option<CanvasSize>,
}

fn parse_folder(name: &str) -> Option<(usize, usize)> {
    let caps = FOLDER_RE.captures(name)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn sorted_dir_names(dir: &Utf8Path) -> Result<(Vec<String>, Vec<String>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.file_name().to_string());
        } else {
            files.push(entry.file_name().to_string());
        }
    }
    dirs.sort();
    files.sort();
    Ok((dirs, files))
}

fn read_canvas(root: &Utf8Path) -> Option<CanvasSize> {
    let bytes = std::fs::read(root.join(METADATA_FILE).as_std_path()).ok()?;
    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Unreadable {} in {}: {}", METADATA_FILE, root, e);
            return None;
        }
    };
    let doc = KitDocument::from_value(&value).ok()?;
    Some(doc.canvas_size(DEFAULT_CANVAS))
}

fn read_separated(root: &Utf8Path) -> BTreeSet<String> {
    std::fs::read(root.join(SEPARATED_LAYERS_FILE).as_std_path())
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Vec<String>>(&bytes).ok())
        .map(|names| names.into_iter().collect())
        .unwrap_or_default()
}

impl KitStructure {
    pub fn scan(root: &Utf8Path) -> Result<Self> {
        if !root.as_std_path().is_dir() {
            return Err(Error::NotFound(root.to_path_buf()));
        }

        let separated = read_separated(root);
        let (dirs, _) = sorted_dir_names(root)?;
        let mut folders = Vec::with_capacity(dirs.len());
        for name in dirs {
            let (subdirs, files) = sorted_dir_names(&root.join(&name))?;
            let items_count = files
                .iter()
                .filter_map(|f| THUMB_RE.captures(f)?[1].parse::<usize>().ok())
                .max()
                .unwrap_or(0);
            let coords = parse_folder(&name);
            folders.push(FolderInfo {
                is_separated: separated.contains(&name),
                name,
                x: coords.map(|c| c.0),
                y: coords.map(|c| c.1),
                items_count,
                colors: subdirs,
            });
        }

        folders.sort_by(|a, b| {
            let key = |f: &FolderInfo| (f.x.is_none(), f.x, f.y);
            key(a).cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
        });

        let mut x_counts: BTreeMap<usize, usize> = BTreeMap::new();
        let mut ys = BTreeSet::new();
        for folder in &folders {
            if let (Some(x), Some(y)) = (folder.x, folder.y) {
                *x_counts.entry(x).or_default() += 1;
                ys.insert(y);
            }
        }
        let duplicate_x = x_counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(x, _)| *x)
            .collect();
        let missing_x = missing(&x_counts.keys().copied().collect());
        let missing_y = missing(&ys);

        Ok(Self {
            root: root.to_path_buf(),
            folders,
            duplicate_x,
            missing_x,
            missing_y,
            canvas: read_canvas(root),
        })
    }

    pub fn folder(&self, name: &str) -> Option<&FolderInfo> {
        self.folders.iter().find(|f| f.name == name)
    }
}

fn missing(present: &BTreeSet<usize>) -> Vec<usize> {
    let max = present.iter().next_back().copied().unwrap_or(0);
    (1..=max).filter(|v| !present.contains(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: Utf8PathBuf) {
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), b"").unwrap();
    }

    #[test]
    fn scans_tree() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();

        touch(root.join("10-1").join("thumb_2.png"));
        touch(root.join("2-3").join("thumb_1.png"));
        touch(root.join("2-3").join("thumb_12.png"));
        touch(root.join("2-3").join("FF0000").join("1.png"));
        touch(root.join("2-3").join("00FF00").join("1.png"));
        touch(root.join("2-1").join("1.png"));
        touch(root.join("scratch").join("x.png"));
        std::fs::write(
            root.join(SEPARATED_LAYERS_FILE).as_std_path(),
            r#"["2-3"]"#,
        )
        .unwrap();
        std::fs::write(
            root.join(METADATA_FILE).as_std_path(),
            r#"{"data": {"parts": [{"items": [[{"blob": "b", "crop": {"ow": 640, "oh": 480}}]]}]}}"#,
        )
        .unwrap();

        let kit = KitStructure::scan(&root).unwrap();
        let names: Vec<&str> = kit.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["2-1", "2-3", "10-1", "scratch"]);

        let folder = kit.folder("2-3").unwrap();
        assert_eq!(folder.items_count, 12);
        assert_eq!(folder.colors, ["00FF00", "FF0000"]);
        assert!(folder.is_separated);
        assert!(!kit.folder("2-1").unwrap().is_separated);

        assert_eq!(kit.duplicate_x, [2]);
        assert_eq!(kit.missing_x, [1, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(kit.missing_y, [2]);
        assert_eq!(
            kit.canvas,
            Some(CanvasSize {
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().join("nope")).unwrap();
        assert!(matches!(KitStructure::scan(&root), Err(Error::NotFound(_))));
    }
}
