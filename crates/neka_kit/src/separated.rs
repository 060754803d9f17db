//! The `separated_layers.json` side index.
//!
//! A folder is listed when one of its items needs more than one drawable asset. Entries
//! are kept sorted by `(X, Y)` and the file is rewritten as soon as a new entry arrives, so
//! an interrupted run leaves an index that matches the files already on disk.

use std::collections::BTreeSet;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::Result;
use crate::utils::write_if_changed;

pub const SEPARATED_LAYERS_FILE: &str = "separated_layers.json";

/// Sort key of a folder name: `X-Y` folders by coordinates, anything else last.
fn sort_key(name: &str) -> (usize, usize, String) {
    name.split_once('-')
        .and_then(|(x, y)| Some((x.parse().ok()?, y.parse().ok()?)))
        .map(|(x, y)| (x, y, name.to_string()))
        .unwrap_or((usize::MAX, usize::MAX, name.to_string()))
}

pub struct SeparatedLayers {
    path: Utf8PathBuf,
    folders: Mutex<BTreeSet<(usize, usize, String)>>,
}

impl SeparatedLayers {
    /// Open the index of `kit_root`, keeping entries from earlier runs.
    pub fn open(kit_root: &Utf8Path) -> Result<Self> {
        let path = kit_root.join(SEPARATED_LAYERS_FILE);
        let mut folders = BTreeSet::new();
        if path.as_std_path().is_file() {
            let bytes = std::fs::read(path.as_std_path())?;
            match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(names) => folders.extend(names.iter().map(|n| sort_key(n))),
                Err(e) => tracing::warn!("Ignoring unreadable {}: {}", path, e),
            }
        }
        Ok(Self {
            path,
            folders: Mutex::new(folders),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Record folder `{x}-{y}`. Returns whether it was new.
    pub fn record(&self, x: usize, y: usize) -> Result<bool> {
        let mut folders = self
            .folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let name = crate::plan::folder_name(x, y);
        if !folders.insert((x, y, name.clone())) {
            return Ok(false);
        }
        tracing::debug!("Marking {} as separated", name);
        // Written while holding the lock so concurrent records cannot reorder writes.
        Self::write(&self.path, &folders)?;
        Ok(true)
    }

    /// Write the index even when it is empty.
    pub fn finish(&self) -> Result<()> {
        let folders = self
            .folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::write(&self.path, &folders)
    }

    pub fn folders(&self) -> Vec<String> {
        self.folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    fn write(path: &Utf8Path, folders: &BTreeSet<(usize, usize, String)>) -> Result<()> {
        let names: Vec<&str> = folders.iter().map(|(_, _, name)| name.as_str()).collect();
        write_if_changed(path, &serde_json::to_vec_pretty(&names)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        (tmp, path)
    }

    #[test]
    fn entries_sorted_numerically_and_flushed_immediately() {
        let (_tmp, root) = root();
        let index = SeparatedLayers::open(&root).unwrap();
        assert!(index.record(10, 2).unwrap());
        assert!(index.record(2, 7).unwrap());
        assert!(!index.record(2, 7).unwrap());

        let on_disk: Vec<String> =
            serde_json::from_slice(&std::fs::read(index.path().as_std_path()).unwrap()).unwrap();
        assert_eq!(on_disk, ["2-7", "10-2"]);
    }

    #[test]
    fn reopening_keeps_entries_and_odd_names_sort_last() {
        let (_tmp, root) = root();
        std::fs::write(
            root.join(SEPARATED_LAYERS_FILE).as_std_path(),
            r#"["custom", "5-1"]"#,
        )
        .unwrap();

        let index = SeparatedLayers::open(&root).unwrap();
        index.record(1, 1).unwrap();
        assert_eq!(index.folders(), ["1-1", "5-1", "custom"]);
    }

    #[test]
    fn finish_writes_empty_index() {
        let (_tmp, root) = root();
        let index = SeparatedLayers::open(&root).unwrap();
        index.finish().unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join(SEPARATED_LAYERS_FILE).as_std_path()).unwrap(),
            "[]"
        );
    }
}
