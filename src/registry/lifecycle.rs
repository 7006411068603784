use super::GrowableRegistry;
use crate::container::ArrayContainerBackend;
use crate::core::errors::{LockstepError, Result};
use crate::group::GroupContext;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Registry state. Moves forward only: Open -> Writable -> Sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// No arrays yet
    Open,
    /// At least one array; growth and writes allowed
    Writable,
    /// Finalized; no further mutation
    Sealed,
}

impl<B: ArrayContainerBackend> GrowableRegistry<B> {
    /// Trim every array to exactly `final_length` records and seal.
    ///
    /// Collective, called once after the last entry by every member with the
    /// same length.
    pub fn finalize(&mut self, final_length: u64) -> Result<()> {
        if self.state == Lifecycle::Sealed {
            return Err(LockstepError::closed("finalize"));
        }
        for array in &mut self.arrays {
            self.backend.resize(&array.path, final_length)?;
            info!(
                member = self.member.member_index(),
                path = %array.path,
                from = array.len,
                len = final_length,
                "trimmed array"
            );
            array.len = final_length;
        }
        self.state = Lifecycle::Sealed;
        Ok(())
    }

    /// Seal (without trimming, if `finalize` was not called) and close the
    /// container. Closing again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.state = Lifecycle::Sealed;
        if !self.backend_closed {
            self.backend.close()?;
            self.backend_closed = true;
            info!(member = self.member.member_index(), "closed registry");
        }
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.state == Lifecycle::Sealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayShape, ChunkGeometry, DType, Record};
    use crate::container::{MemberContainer, MemoryStore, SharedContainer};
    use crate::core::config::WriterConfig;

    fn registry() -> GrowableRegistry<MemberContainer<MemoryStore>> {
        let shared = SharedContainer::new(MemoryStore::new(), 1).unwrap();
        GrowableRegistry::for_member(shared.member(0).unwrap(), WriterConfig::new(10, 10)).unwrap()
    }

    #[test]
    fn test_finalize_from_open_seals() {
        let mut reg = registry();
        reg.finalize(0).unwrap();
        assert!(reg.is_sealed());
    }

    #[test]
    fn test_everything_fails_after_seal() {
        let mut reg = registry();
        let h = reg
            .create(
                "/x",
                ArrayShape::growable(&[]).unwrap(),
                ChunkGeometry::new(4, vec![]),
                DType::I64,
            )
            .unwrap();
        reg.write(h, 2, &Record::scalar(vec![42i64]).unwrap()).unwrap();
        reg.finalize(3).unwrap();
        assert_eq!(reg.state(), Lifecycle::Sealed);

        assert!(matches!(reg.ensure_capacity(3), Err(LockstepError::Closed { .. })));
        assert!(matches!(
            reg.write(h, 0, &Record::scalar(vec![1i64]).unwrap()),
            Err(LockstepError::Closed { .. })
        ));
        assert!(matches!(
            reg.create(
                "/y",
                ArrayShape::growable(&[]).unwrap(),
                ChunkGeometry::new(4, vec![]),
                DType::I64,
            ),
            Err(LockstepError::Closed { .. })
        ));
        assert!(matches!(reg.finalize(3), Err(LockstepError::Closed { .. })));

        // Reads still work on sealed data
        assert_eq!(reg.read(h, 2).unwrap(), Record::scalar(vec![42i64]).unwrap());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut reg = registry();
        reg.close().unwrap();
        reg.close().unwrap();
        assert!(reg.is_sealed());
    }
}
