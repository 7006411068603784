use crate::array::{ArrayLayout, ArrayPath, Record};
use crate::container::{check_index, check_record, ArrayInfo, ArrayStore};
use crate::core::errors::{LockstepError, Result};
use dashmap::{DashMap, DashSet};

#[derive(Debug)]
struct MemArray {
    layout: ArrayLayout,
    len: u64,
    /// `len * record_bytes` little-endian bytes
    bytes: Vec<u8>,
}

/// Array store kept entirely in memory. Unwritten slots are zero.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: DashSet<ArrayPath>,
    arrays: DashMap<ArrayPath, MemArray>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_new_node(&self, path: &ArrayPath) -> Result<()> {
        if self.groups.contains(path) || self.arrays.contains_key(path) {
            return Err(LockstepError::DuplicatePath {
                path: path.to_string(),
            });
        }
        if let Some(parent) = path.ancestors().last() {
            if !self.groups.contains(parent) {
                return Err(LockstepError::invalid_path(
                    path.to_string(),
                    format!("parent group {} does not exist", parent),
                ));
            }
        }
        Ok(())
    }

    fn unknown(path: &ArrayPath) -> LockstepError {
        LockstepError::UnknownArray {
            path: path.to_string(),
        }
    }
}

impl ArrayStore for MemoryStore {
    fn create_group(&self, path: &ArrayPath) -> Result<()> {
        self.check_new_node(path)?;
        self.groups.insert(path.clone());
        Ok(())
    }

    fn create_array(&self, path: &ArrayPath, layout: &ArrayLayout, len: u64) -> Result<()> {
        self.check_new_node(path)?;
        let bytes = vec![0u8; len as usize * layout.record_bytes()];
        self.arrays.insert(
            path.clone(),
            MemArray {
                layout: layout.clone(),
                len,
                bytes,
            },
        );
        Ok(())
    }

    fn set_len(&self, path: &ArrayPath, len: u64) -> Result<()> {
        let mut array = self.arrays.get_mut(path).ok_or_else(|| Self::unknown(path))?;
        let record_bytes = array.layout.record_bytes();
        array.bytes.resize(len as usize * record_bytes, 0);
        array.len = len;
        Ok(())
    }

    fn len(&self, path: &ArrayPath) -> Result<u64> {
        self.arrays
            .get(path)
            .map(|a| a.len)
            .ok_or_else(|| Self::unknown(path))
    }

    fn layout(&self, path: &ArrayPath) -> Result<ArrayLayout> {
        self.arrays
            .get(path)
            .map(|a| a.layout.clone())
            .ok_or_else(|| Self::unknown(path))
    }

    fn write_record(&self, path: &ArrayPath, index: u64, record: &Record) -> Result<()> {
        let mut array = self.arrays.get_mut(path).ok_or_else(|| Self::unknown(path))?;
        check_index(path, index, array.len)?;
        check_record(path, &array.layout, record)?;

        let record_bytes = array.layout.record_bytes();
        let start = index as usize * record_bytes;
        array.bytes[start..start + record_bytes].copy_from_slice(&record.to_le_bytes());
        Ok(())
    }

    fn read_record(&self, path: &ArrayPath, index: u64) -> Result<Record> {
        let array = self.arrays.get(path).ok_or_else(|| Self::unknown(path))?;
        check_index(path, index, array.len)?;

        let record_bytes = array.layout.record_bytes();
        let start = index as usize * record_bytes;
        Record::from_le_bytes(
            array.layout.dtype,
            array.layout.element_shape(),
            &array.bytes[start..start + record_bytes],
        )
    }

    fn has_group(&self, path: &ArrayPath) -> bool {
        self.groups.contains(path)
    }

    fn arrays(&self) -> Result<Vec<ArrayInfo>> {
        let mut infos: Vec<ArrayInfo> = self
            .arrays
            .iter()
            .map(|entry| ArrayInfo {
                path: entry.key().clone(),
                layout: entry.value().layout.clone(),
                len: entry.value().len,
            })
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(infos)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
