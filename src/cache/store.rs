use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::cache::error::DecodeResult;
use crate::cache::xtea::{self, XteaKey};


/// Index ids inside the cache.
pub mod index {
    pub const CONFIGS: u8 = 2;
    pub const MAPS: u8 = 5;
    pub const MODELS: u8 = 7;
    pub const SPRITES: u8 = 8;
    pub const TEXTURES: u8 = 9;
}

/// Archive ids of the config index.
pub mod config {
    pub const UNDERLAY: u32 = 1;
    pub const OVERLAY: u32 = 4;
    pub const OBJECT: u32 = 6;
    pub const VARBIT: u32 = 14;
    pub const AREA: u32 = 35;
}

pub fn region_id(region_x: u8, region_y: u8) -> u16 {
    ((region_x as u16) << 8) | region_y as u16
}

pub fn terrain_name(region_x: u8, region_y: u8) -> String {
    format!("m{region_x}_{region_y}")
}

pub fn locations_name(region_x: u8, region_y: u8) -> String {
    format!("l{region_x}_{region_y}")
}


/// Decodes every file of a config archive. Files that fail are logged and skipped.
pub fn decode_archive<S, T, F>(store: &S, archive: u32, kind: &str, decode: F) -> HashMap<u32, T>
where
    S: AssetStore + ?Sized,
    F: Fn(u32, &[u8]) -> DecodeResult<T>,
{
    decode_files(store, index::CONFIGS, archive, kind, decode)
}

/// Decodes every file of an archive, dropping the ones that fail.
pub fn decode_files<S, T, F>(store: &S, index: u8, archive: u32, kind: &str, decode: F) -> HashMap<u32, T>
where
    S: AssetStore + ?Sized,
    F: Fn(u32, &[u8]) -> DecodeResult<T>,
{
    store.archive_files(index, archive)
        .into_iter()
        .filter_map(|(id, data)| match decode(id, &data) {
            Ok(value) => Some((id, value)),
            Err(err) => {
                debug!("skipping {kind} {id}: {err}");
                None
            }
        })
        .collect()
}


/// Source of raw cache payloads. Absent entries are `None`, not errors.
pub trait AssetStore {
    fn file(&self, index: u8, archive: u32, file: u32) -> Option<Vec<u8>>;

    /// all files of an archive ordered by file id
    fn archive_files(&self, index: u8, archive: u32) -> Vec<(u32, Vec<u8>)>;

    fn archive_ids(&self, index: u8) -> Vec<u32>;

    fn named(&self, index: u8, name: &str) -> Option<Vec<u8>>;

    /// Named payload, decrypted when a non zero key is given.
    fn region(&self, index: u8, name: &str, key: Option<&XteaKey>) -> DecodeResult<Option<Vec<u8>>> {
        let data = match self.named(index, name) {
            None => return Ok(None),
            Some(data) => data,
        };

        match key {
            Some(key) if !key.is_zero() => Ok(Some(xtea::decrypt(&data, key)?)),
            _ => Ok(Some(data)),
        }
    }
}


/// Unpacked cache on disk: `<root>/<index>/<archive>/<file>.dat`, named payloads as `<root>/<index>/<name>.dat`.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: &Path) -> Self {
        trace!("DirectoryStore::new {}", root.display());
        Self { root: root.to_path_buf() }
    }

    fn read(path: &Path) -> Option<Vec<u8>> {
        match fs::read(path) {
            Ok(data) => Some(data),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                debug!("cannot read {}: {err}", path.display());
                None
            }
        }
    }

    fn numbered_entries(dir: &Path, suffix: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let name = entry.file_name().into_string().ok()?;
                    name.strip_suffix(suffix)?.parse().ok()
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        ids.sort_unstable();
        ids
    }
}

impl AssetStore for DirectoryStore {
    fn file(&self, index: u8, archive: u32, file: u32) -> Option<Vec<u8>> {
        Self::read(&self.root.join(index.to_string()).join(archive.to_string()).join(format!("{file}.dat")))
    }

    fn archive_files(&self, index: u8, archive: u32) -> Vec<(u32, Vec<u8>)> {
        let dir = self.root.join(index.to_string()).join(archive.to_string());
        Self::numbered_entries(&dir, ".dat")
            .into_iter()
            .filter_map(|file| Self::read(&dir.join(format!("{file}.dat"))).map(|data| (file, data)))
            .collect()
    }

    fn archive_ids(&self, index: u8) -> Vec<u32> {
        Self::numbered_entries(&self.root.join(index.to_string()), "")
    }

    fn named(&self, index: u8, name: &str) -> Option<Vec<u8>> {
        Self::read(&self.root.join(index.to_string()).join(format!("{name}.dat")))
    }
}


/// In-memory store, filled through the insert methods.
#[derive(Default)]
pub struct MemoryStore {
    files: HashMap<u8, BTreeMap<u32, BTreeMap<u32, Vec<u8>>>>,
    named: HashMap<(u8, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_file(&mut self, index: u8, archive: u32, file: u32, data: Vec<u8>) {
        self.files.entry(index).or_default().entry(archive).or_default().insert(file, data);
    }

    pub fn insert_named(&mut self, index: u8, name: &str, data: Vec<u8>) {
        self.named.insert((index, name.to_string()), data);
    }
}

impl AssetStore for MemoryStore {
    fn file(&self, index: u8, archive: u32, file: u32) -> Option<Vec<u8>> {
        self.files.get(&index)?.get(&archive)?.get(&file).cloned()
    }

    fn archive_files(&self, index: u8, archive: u32) -> Vec<(u32, Vec<u8>)> {
        self.files.get(&index)
            .and_then(|archives| archives.get(&archive))
            .map(|files| files.iter().map(|(&id, data)| (id, data.clone())).collect())
            .unwrap_or_default()
    }

    fn archive_ids(&self, index: u8) -> Vec<u32> {
        self.files.get(&index)
            .map(|archives| archives.keys().copied().collect())
            .unwrap_or_default()
    }

    fn named(&self, index: u8, name: &str) -> Option<Vec<u8>> {
        self.named.get(&(index, name.to_string())).cloned()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::xtea::encrypt_region;

    #[test]
    fn region_naming() {
        assert_eq!(region_id(50, 50), 12850);
        assert_eq!(terrain_name(50, 51), "m50_51");
        assert_eq!(locations_name(50, 51), "l50_51");
    }

    #[test]
    fn memory_store_lookup() {
        let mut store = MemoryStore::new();
        store.insert_file(index::CONFIGS, config::UNDERLAY, 3, vec![1]);
        store.insert_file(index::CONFIGS, config::UNDERLAY, 1, vec![2]);
        assert_eq!(store.file(index::CONFIGS, config::UNDERLAY, 3), Some(vec![1]));
        assert_eq!(store.file(index::CONFIGS, config::OVERLAY, 3), None);
        let files = store.archive_files(index::CONFIGS, config::UNDERLAY);
        assert_eq!(files.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 3]);
        assert!(store.archive_files(index::MODELS, 0).is_empty());
    }

    #[test]
    fn region_payload_is_decrypted() {
        let key = XteaKey([5, 6, 7, 8]);
        let plain: Vec<u8> = (0..24).collect();
        let mut encrypted = plain.clone();
        encrypt_region(&mut encrypted, &key, 0, 24).unwrap();

        let mut store = MemoryStore::new();
        store.insert_named(index::MAPS, "l1_2", encrypted.clone());
        assert_eq!(store.region(index::MAPS, "l1_2", Some(&key)).unwrap(), Some(plain));
        assert_eq!(store.region(index::MAPS, "l1_2", Some(&XteaKey::default())).unwrap(), Some(encrypted));
        assert_eq!(store.region(index::MAPS, "l9_9", Some(&key)).unwrap(), None);
    }

    #[test]
    fn directory_store_layout() {
        let root = std::env::temp_dir().join(format!("landscape_store_{}", std::process::id()));
        fs::create_dir_all(root.join("2").join("4")).unwrap();
        fs::write(root.join("2").join("4").join("10.dat"), [1, 2]).unwrap();
        fs::write(root.join("2").join("4").join("2.dat"), [3]).unwrap();
        fs::create_dir_all(root.join("5")).unwrap();
        fs::write(root.join("5").join("m1_1.dat"), [9]).unwrap();

        let store = DirectoryStore::new(&root);
        assert_eq!(store.file(2, 4, 10), Some(vec![1, 2]));
        assert_eq!(store.file(2, 4, 11), None);
        assert_eq!(store.archive_files(2, 4).iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![2, 10]);
        assert_eq!(store.archive_ids(2), vec![4]);
        assert_eq!(store.named(5, "m1_1"), Some(vec![9]));

        fs::remove_dir_all(&root).unwrap();
    }
}
