//! Persistent chunked array store on top of sled.
//!
//! Layout inside the database:
//! - `groups` tree: path -> empty
//! - `arrays` tree: path -> bincode(`ArrayMeta`)
//! - `chunks` tree: path, 0x00, chunk index (big endian) -> zstd(chunk bytes)
//!
//! A chunk holds `chunks.leading` consecutive records. Chunks that were
//! never written are absent and read back as zeros.
//!
//! Record writes patch a decompressed copy of their chunk held in memory.
//! Only the `DIRTY_CHUNKS` most recently loaded chunks stay there; older ones
//! are compressed and written back, as is everything on `flush`, on a resize
//! of the array and when the store is dropped.

use crate::array::{ArrayLayout, ArrayPath, Record};
use crate::container::{check_index, check_record, ArrayInfo, ArrayStore};
use crate::core::errors::{LockstepError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, info, warn};

const ZSTD_LEVEL: i32 = 3;
const DIRTY_CHUNKS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArrayMeta {
    layout: ArrayLayout,
    len: u64,
}

type ChunkId = (ArrayPath, u64);

/// Decompressed chunks not yet written back, oldest first in `order`
#[derive(Debug, Default)]
struct ChunkCache {
    chunks: HashMap<ChunkId, Vec<u8>>,
    order: VecDeque<ChunkId>,
}

pub struct SledStore {
    db: sled::Db,
    groups: sled::Tree,
    arrays: sled::Tree,
    chunks: sled::Tree,
    /// Also serializes every metadata and chunk update
    cache: Mutex<ChunkCache>,
}

impl SledStore {
    /// Open (or create) a store in `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| LockstepError::database(format!("open {}", path.display()), e))?;
        info!(path = %path.display(), "opened sled array store");
        Self::from_db(db)
    }

    /// Store that is deleted when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| LockstepError::database("open temporary", e))?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self> {
        let groups = db.open_tree("groups")?;
        let arrays = db.open_tree("arrays")?;
        let chunks = db.open_tree("chunks")?;
        Ok(Self {
            db,
            groups,
            arrays,
            chunks,
            cache: Mutex::new(ChunkCache::default()),
        })
    }

    fn meta(&self, path: &ArrayPath) -> Result<ArrayMeta> {
        let raw = self
            .arrays
            .get(path.to_string().as_bytes())?
            .ok_or_else(|| LockstepError::UnknownArray {
                path: path.to_string(),
            })?;
        Ok(bincode::deserialize(&raw)?)
    }

    fn put_meta(&self, path: &ArrayPath, meta: &ArrayMeta) -> Result<()> {
        let raw = bincode::serialize(meta)?;
        self.arrays.insert(path.to_string().as_bytes(), raw)?;
        Ok(())
    }

    fn chunk_prefix(path: &ArrayPath) -> Vec<u8> {
        let mut key = path.to_string().into_bytes();
        key.push(0);
        key
    }

    fn chunk_key(path: &ArrayPath, chunk: u64) -> Vec<u8> {
        let mut key = Self::chunk_prefix(path);
        key.extend_from_slice(&chunk.to_be_bytes());
        key
    }

    /// Decompressed chunk as stored, or zeros if it was never written
    fn load_chunk(&self, path: &ArrayPath, chunk: u64, layout: &ArrayLayout) -> Result<Vec<u8>> {
        let size = layout.chunk_records() as usize * layout.record_bytes();
        match self.chunks.get(Self::chunk_key(path, chunk))? {
            Some(compressed) => {
                let bytes = zstd::decode_all(&compressed[..]).map_err(|e| {
                    LockstepError::io(format!("decompress chunk {} of {}", chunk, path), e)
                })?;
                if bytes.len() != size {
                    return Err(LockstepError::backend(
                        "load_chunk",
                        format!(
                            "chunk {} of {} has {} bytes, expected {}",
                            chunk,
                            path,
                            bytes.len(),
                            size
                        ),
                    ));
                }
                Ok(bytes)
            }
            None => Ok(vec![0u8; size]),
        }
    }

    fn store_chunk(&self, path: &ArrayPath, chunk: u64, bytes: &[u8]) -> Result<()> {
        let compressed = zstd::encode_all(bytes, ZSTD_LEVEL)
            .map_err(|e| LockstepError::io(format!("compress chunk {} of {}", chunk, path), e))?;
        self.chunks.insert(Self::chunk_key(path, chunk), compressed)?;
        Ok(())
    }

    /// Compress and store cached chunks, all of them or only those of `path`
    fn write_back(&self, cache: &mut ChunkCache, path: Option<&ArrayPath>) -> Result<usize> {
        let (doomed, kept): (VecDeque<ChunkId>, VecDeque<ChunkId>) = cache
            .order
            .drain(..)
            .partition(|(p, _)| path.map_or(true, |only| p == only));
        cache.order = kept;

        let mut written = 0;
        for id in doomed {
            if let Some(bytes) = cache.chunks.remove(&id) {
                self.store_chunk(&id.0, id.1, &bytes)?;
                written += 1;
            }
        }
        Ok(written)
    }

    fn check_new_node(&self, path: &ArrayPath) -> Result<()> {
        let key = path.to_string();
        if self.groups.contains_key(key.as_bytes())? || self.arrays.contains_key(key.as_bytes())? {
            return Err(LockstepError::DuplicatePath { path: key });
        }
        if let Some(parent) = path.ancestors().last() {
            if !self.groups.contains_key(parent.to_string().as_bytes())? {
                return Err(LockstepError::invalid_path(
                    key,
                    format!("parent group {} does not exist", parent),
                ));
            }
        }
        Ok(())
    }

    /// Drop whole chunks past `len` and zero the tail of the last partial one.
    /// Expects no cached chunks of `path`.
    fn truncate(&self, path: &ArrayPath, meta: &ArrayMeta, len: u64) -> Result<()> {
        let per_chunk = meta.layout.chunk_records();
        let keep_chunks = len.div_ceil(per_chunk);
        let prefix = Self::chunk_prefix(path);

        let mut doomed = Vec::new();
        for item in self.chunks.scan_prefix(&prefix) {
            let (key, _) = item?;
            // Keys of other arrays can share the prefix only with a different tail length
            let Ok(idx) = <[u8; 8]>::try_from(&key[prefix.len()..]) else {
                continue;
            };
            if u64::from_be_bytes(idx) >= keep_chunks {
                doomed.push(key);
            }
        }
        for key in &doomed {
            self.chunks.remove(key)?;
        }

        let partial = len % per_chunk;
        if partial != 0 {
            let chunk = len / per_chunk;
            if self.chunks.contains_key(Self::chunk_key(path, chunk))? {
                let mut bytes = self.load_chunk(path, chunk, &meta.layout)?;
                let cut = partial as usize * meta.layout.record_bytes();
                bytes[cut..].fill(0);
                self.store_chunk(path, chunk, &bytes)?;
            }
        }
        debug!(path = %path, len, dropped_chunks = doomed.len(), "truncated array");
        Ok(())
    }
}

impl ArrayStore for SledStore {
    fn create_group(&self, path: &ArrayPath) -> Result<()> {
        let _guard = self.cache.lock();
        self.check_new_node(path)?;
        self.groups.insert(path.to_string().as_bytes(), Vec::<u8>::new())?;
        Ok(())
    }

    fn create_array(&self, path: &ArrayPath, layout: &ArrayLayout, len: u64) -> Result<()> {
        let _guard = self.cache.lock();
        self.check_new_node(path)?;
        self.put_meta(
            path,
            &ArrayMeta {
                layout: layout.clone(),
                len,
            },
        )
    }

    fn set_len(&self, path: &ArrayPath, len: u64) -> Result<()> {
        let mut cache = self.cache.lock();
        let mut meta = self.meta(path)?;
        self.write_back(&mut cache, Some(path))?;
        if len < meta.len {
            self.truncate(path, &meta, len)?;
        }
        meta.len = len;
        self.put_meta(path, &meta)
    }

    fn len(&self, path: &ArrayPath) -> Result<u64> {
        Ok(self.meta(path)?.len)
    }

    fn layout(&self, path: &ArrayPath) -> Result<ArrayLayout> {
        Ok(self.meta(path)?.layout)
    }

    fn write_record(&self, path: &ArrayPath, index: u64, record: &Record) -> Result<()> {
        let mut guard = self.cache.lock();
        let cache = &mut *guard;
        let meta = self.meta(path)?;
        check_index(path, index, meta.len)?;
        check_record(path, &meta.layout, record)?;

        let per_chunk = meta.layout.chunk_records();
        let record_bytes = meta.layout.record_bytes();
        let start = (index % per_chunk) as usize * record_bytes;
        let id = (path.clone(), index / per_chunk);

        if !cache.chunks.contains_key(&id) {
            let bytes = self.load_chunk(path, id.1, &meta.layout)?;
            cache.chunks.insert(id.clone(), bytes);
            cache.order.push_back(id.clone());
        }
        if let Some(bytes) = cache.chunks.get_mut(&id) {
            bytes[start..start + record_bytes].copy_from_slice(&record.to_le_bytes());
        }

        while cache.order.len() > DIRTY_CHUNKS {
            let Some(oldest) = cache.order.pop_front() else {
                break;
            };
            if let Some(bytes) = cache.chunks.remove(&oldest) {
                self.store_chunk(&oldest.0, oldest.1, &bytes)?;
            }
        }
        Ok(())
    }

    fn read_record(&self, path: &ArrayPath, index: u64) -> Result<Record> {
        let cache = self.cache.lock();
        let meta = self.meta(path)?;
        check_index(path, index, meta.len)?;

        let per_chunk = meta.layout.chunk_records();
        let record_bytes = meta.layout.record_bytes();
        let start = (index % per_chunk) as usize * record_bytes;
        let chunk = index / per_chunk;
        let decode = |bytes: &[u8]| {
            Record::from_le_bytes(
                meta.layout.dtype,
                meta.layout.element_shape(),
                &bytes[start..start + record_bytes],
            )
        };
        match cache.chunks.get(&(path.clone(), chunk)) {
            Some(bytes) => decode(bytes.as_slice()),
            None => decode(self.load_chunk(path, chunk, &meta.layout)?.as_slice()),
        }
    }

    fn has_group(&self, path: &ArrayPath) -> bool {
        self.groups
            .contains_key(path.to_string().as_bytes())
            .unwrap_or(false)
    }

    fn arrays(&self) -> Result<Vec<ArrayInfo>> {
        let mut infos = Vec::new();
        for item in self.arrays.iter() {
            let (key, raw) = item?;
            let path = ArrayPath::parse(&String::from_utf8_lossy(&key))?;
            let meta: ArrayMeta = bincode::deserialize(&raw)?;
            infos.push(ArrayInfo {
                path,
                layout: meta.layout,
                len: meta.len,
            });
        }
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(infos)
    }

    fn flush(&self) -> Result<()> {
        let mut cache = self.cache.lock();
        let chunks = self.write_back(&mut cache, None)?;
        let bytes = self.db.flush()?;
        debug!(chunks, bytes, "flushed sled array store");
        Ok(())
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        let mut cache = std::mem::take(self.cache.get_mut());
        if cache.order.is_empty() {
            return;
        }
        if let Err(e) = self.write_back(&mut cache, None) {
            warn!(error = %e, "dropping unflushed chunks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayShape, ChunkGeometry, DType};
    use pretty_assertions::assert_eq;

    fn frame_layout() -> ArrayLayout {
        ArrayLayout::new(
            ArrayShape::growable(&[2, 3]).unwrap(),
            ChunkGeometry::new(4, vec![2, 3]),
            DType::I32,
        )
        .unwrap()
    }

    fn frame(v: i32) -> Record {
        Record::new(vec![2, 3], vec![v; 6]).unwrap()
    }

    #[test]
    fn test_records_span_chunks() {
        let store = SledStore::temporary().unwrap();
        let path = ArrayPath::parse("/frames").unwrap();
        store.create_array(&path, &frame_layout(), 10).unwrap();

        for i in [0u64, 3, 4, 9] {
            store.write_record(&path, i, &frame(i as i32 + 1)).unwrap();
        }
        for i in [0u64, 3, 4, 9] {
            assert_eq!(store.read_record(&path, i).unwrap(), frame(i as i32 + 1));
        }
        assert_eq!(store.read_record(&path, 5).unwrap(), frame(0));
        assert!(store.read_record(&path, 10).is_err());
    }

    #[test]
    fn test_truncate_drops_and_zeroes() {
        let store = SledStore::temporary().unwrap();
        let path = ArrayPath::parse("/frames").unwrap();
        store.create_array(&path, &frame_layout(), 12).unwrap();
        for i in 0..12u64 {
            store.write_record(&path, i, &frame(7)).unwrap();
        }

        store.set_len(&path, 5).unwrap();
        assert_eq!(store.len(&path).unwrap(), 5);
        assert_eq!(store.read_record(&path, 4).unwrap(), frame(7));

        // Growing again exposes zeros, not stale data
        store.set_len(&path, 12).unwrap();
        assert_eq!(store.read_record(&path, 5).unwrap(), frame(0));
        assert_eq!(store.read_record(&path, 11).unwrap(), frame(0));
    }

    #[test]
    fn test_metadata_listing() {
        let store = SledStore::temporary().unwrap();
        store.create_group(&ArrayPath::parse("/entry").unwrap()).unwrap();
        store
            .create_array(&ArrayPath::parse("/entry/b").unwrap(), &frame_layout(), 4)
            .unwrap();
        store
            .create_array(&ArrayPath::parse("/entry/a").unwrap(), &frame_layout(), 8)
            .unwrap();

        let infos = store.arrays().unwrap();
        let listed: Vec<(String, u64)> = infos
            .iter()
            .map(|i| (i.path.to_string(), i.len))
            .collect();
        assert_eq!(
            listed,
            vec![("/entry/a".to_string(), 8), ("/entry/b".to_string(), 4)]
        );
        assert!(store.has_group(&ArrayPath::parse("/entry").unwrap()));
    }

    #[test]
    fn test_writes_buffered_until_flush() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let path = ArrayPath::parse("/frames").unwrap();
        {
            let store = SledStore::from_db(db.clone()).unwrap();
            store.create_array(&path, &frame_layout(), 8).unwrap();
            store.write_record(&path, 1, &frame(3)).unwrap();
            assert!(store.chunks.is_empty());
            assert_eq!(store.read_record(&path, 1).unwrap(), frame(3));

            store.flush().unwrap();
            assert_eq!(store.chunks.len(), 1);
            store.write_record(&path, 6, &frame(4)).unwrap();
        }

        // Dropping the store writes back what flush did not cover
        let reopened = SledStore::from_db(db).unwrap();
        assert_eq!(reopened.read_record(&path, 1).unwrap(), frame(3));
        assert_eq!(reopened.read_record(&path, 6).unwrap(), frame(4));
    }

    #[test]
    fn test_oldest_chunks_written_back() {
        let store = SledStore::temporary().unwrap();
        let path = ArrayPath::parse("/frames").unwrap();
        let chunks = DIRTY_CHUNKS as u64 + 2;
        store.create_array(&path, &frame_layout(), chunks * 4).unwrap();
        for chunk in 0..chunks {
            store.write_record(&path, chunk * 4, &frame(chunk as i32)).unwrap();
        }

        assert_eq!(store.chunks.len(), 2);
        assert!(store
            .chunks
            .contains_key(SledStore::chunk_key(&path, 0))
            .unwrap());
        for chunk in 0..chunks {
            assert_eq!(
                store.read_record(&path, chunk * 4).unwrap(),
                frame(chunk as i32)
            );
        }
    }

    #[test]
    fn test_truncate_skips_foreign_keys() {
        let store = SledStore::temporary().unwrap();
        let path = ArrayPath::parse("/a").unwrap();
        store.create_array(&path, &frame_layout(), 8).unwrap();
        store.write_record(&path, 7, &frame(1)).unwrap();
        store.flush().unwrap();

        // Same prefix as "/a" chunks but a tail that is not a chunk index
        let mut foreign = SledStore::chunk_prefix(&path);
        foreign.extend_from_slice(b"b\x00\x00\x00\x00\x00\x00\x00\x00\x01");
        store.chunks.insert(foreign.clone(), vec![1u8]).unwrap();

        store.set_len(&path, 2).unwrap();
        assert_eq!(store.len(&path).unwrap(), 2);
        assert!(store.chunks.contains_key(&foreign).unwrap());
        assert!(!store
            .chunks
            .contains_key(SledStore::chunk_key(&path, 1))
            .unwrap());
    }
}
