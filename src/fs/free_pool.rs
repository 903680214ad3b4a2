use bitvec::prelude::*;
use log::{trace, warn};

use crate::error::{EfsError, Result};

use super::{BlockDevice, BlockNumber, FreeBitmap};

/// In-memory view of the free-block bitmap.
///
/// `allocate` and `release` only touch memory; `commit` is the single point
/// where the bitmap goes back to the volume.
#[derive(Debug, Default)]
pub struct FreeBlockPool {
    bitmap: FreeBitmap,
    /// blocks below this one hold metadata and are never handed out
    data_start: BlockNumber,
    next_free: Option<usize>,
    dirty: bool,
}

impl FreeBlockPool {
    pub fn new(mut bitmap: FreeBitmap, data_start: BlockNumber) -> Self {
        let reserved = (data_start as usize).min(bitmap.len());
        bitmap[..reserved].fill(true);
        let mut pool = FreeBlockPool {
            bitmap,
            data_start,
            ..Default::default()
        };
        pool.next_free = pool.next_free_block();
        pool
    }

    pub fn load<D: BlockDevice>(device: &D) -> Result<Self> {
        let bitmap = device.load_free_list()?;
        Ok(Self::new(bitmap, device.layout().data_start))
    }

    /// take a free block and mark it busy
    pub fn allocate(&mut self) -> Result<BlockNumber> {
        let index = self.next_free.ok_or(EfsError::VolumeFull)?;
        self.bitmap.set(index, true);
        self.dirty = true;
        self.next_free = self.next_free_block();
        trace!("allocated block {index}");
        Ok(index as BlockNumber)
    }

    /// mark a block free again, releasing a free block does nothing
    pub fn release(&mut self, block: BlockNumber) {
        let index = block as usize;
        if block < self.data_start || index >= self.bitmap.len() {
            warn!("refusing to release block {block} outside the data region");
            return;
        }
        if !self.bitmap[index] {
            return;
        }
        self.bitmap.set(index, false);
        self.dirty = true;
        self.next_free = Some(self.next_free.map_or(index, |next| next.min(index)));
        trace!("released block {block}");
    }

    pub fn is_free(&self, block: BlockNumber) -> bool {
        self.bitmap
            .get(block as usize)
            .map(|bit| !*bit)
            .unwrap_or(false)
    }

    pub fn has_free(&self) -> bool {
        self.next_free.is_some()
    }

    /// calculate the number of free data blocks
    pub fn free_blocks(&self) -> usize {
        self.bitmap.count_zeros()
    }

    /// persist the bitmap if anything changed since the last commit
    pub fn commit<D: BlockDevice>(&mut self, device: &mut D) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        device.store_free_list(&self.bitmap)?;
        self.dirty = false;
        Ok(())
    }

    // next free block,lowest number first
    fn next_free_block(&self) -> Option<usize> {
        self.bitmap.first_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::init_test_environment::{init_test_volume, small_geometry};

    fn pool(len: usize, data_start: BlockNumber) -> FreeBlockPool {
        FreeBlockPool::new(FreeBitmap::repeat(false, len), data_start)
    }

    #[test]
    fn test_allocate_skips_metadata() {
        let mut pool = pool(8, 3);
        assert_eq!(pool.free_blocks(), 5);
        assert_eq!(pool.allocate().unwrap(), 3);
        assert_eq!(pool.allocate().unwrap(), 4);
        assert!(!pool.is_free(3));
        assert!(pool.is_free(5));
    }

    #[test]
    fn test_allocate_until_full() {
        let mut pool = pool(4, 2);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert!(!pool.has_free());
        assert!(matches!(pool.allocate(), Err(EfsError::VolumeFull)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut pool = pool(8, 2);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.release(a);
        pool.release(a);
        assert_eq!(pool.free_blocks(), 5);
        // the lowest free block is handed out first
        assert_eq!(pool.allocate().unwrap(), a);
        assert!(!pool.is_free(b));
    }

    #[test]
    fn test_release_ignores_metadata_blocks() {
        let mut pool = pool(8, 2);
        pool.release(0);
        pool.release(1);
        pool.release(100);
        assert!(!pool.is_free(0));
        assert_eq!(pool.free_blocks(), 6);
    }

    #[test]
    fn test_commit_is_the_durability_boundary() {
        let mut volume = init_test_volume(small_geometry());
        let mut pool = FreeBlockPool::load(&volume).unwrap();
        let block = pool.allocate().unwrap();
        assert!(!volume.load_free_list().unwrap()[block as usize]);

        pool.commit(&mut volume).unwrap();
        assert!(volume.load_free_list().unwrap()[block as usize]);

        pool.release(block);
        pool.commit(&mut volume).unwrap();
        assert!(!volume.load_free_list().unwrap()[block as usize]);
    }
}
