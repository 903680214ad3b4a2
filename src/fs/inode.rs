use log::trace;

use crate::{
    error::{EfsError, Result},
    utils::fs_size_calculator,
};

use super::{BlockDevice, BlockNumber, InodeId, Layout, VolumeInfo, BLOCK_POINTER_SIZE};

/// The direct block pointers of one file, one per logical block index.
/// A `0` pointer is a hole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockList {
    pointers: Vec<BlockNumber>,
    block_size: u32,
}

impl BlockList {
    pub fn empty(info: &VolumeInfo) -> Self {
        BlockList {
            pointers: vec![0; info.num_inode_entries as usize],
            block_size: info.block_size,
        }
    }

    /// bytes addressable through the direct pointers
    pub fn max_size(&self) -> u64 {
        self.pointers.len() as u64 * self.block_size as u64
    }

    /// fail unless `[offset, offset + len)` fits inside the inode
    pub fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        let limit = self.max_size();
        match offset.checked_add(len) {
            Some(end) if end <= limit => Ok(()),
            _ => Err(EfsError::FileTooLarge {
                offset: offset.saturating_add(len),
                limit,
            }),
        }
    }

    #[inline]
    fn index(&self, offset: u64) -> Result<usize> {
        let index = offset / self.block_size as u64;
        if index >= self.pointers.len() as u64 {
            return Err(EfsError::FileTooLarge {
                offset,
                limit: self.max_size(),
            });
        }
        Ok(index as usize)
    }

    /// physical block holding `offset`, `0` if unallocated
    pub fn block_for(&self, offset: u64) -> Result<BlockNumber> {
        Ok(self.pointers[self.index(offset)?])
    }

    pub fn set_block_for(&mut self, offset: u64, block: BlockNumber) -> Result<()> {
        let index = self.index(offset)?;
        self.pointers[index] = block;
        Ok(())
    }

    /// every allocated pointer, in logical order
    pub fn allocated(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.pointers.iter().copied().filter(|block| *block != 0)
    }

    /// zero every pointer and return the blocks that were allocated
    pub fn clear(&mut self) -> Vec<BlockNumber> {
        let blocks = self.allocated().collect();
        self.pointers.fill(0);
        blocks
    }

    fn encode(&self) -> Vec<u8> {
        self.pointers.iter().flat_map(|p| p.to_le_bytes()).collect()
    }

    fn decode(bytes: &[u8], block_size: u32) -> Self {
        let pointers = bytes
            .chunks_exact(BLOCK_POINTER_SIZE as usize)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        BlockList {
            pointers,
            block_size,
        }
    }
}

/// Reads and writes inodes in the inode table. An inode may straddle a
/// block boundary, so every access goes block by block.
#[derive(Debug, Clone, Copy)]
pub struct InodeStore {
    info: VolumeInfo,
    layout: Layout,
}

impl InodeStore {
    pub fn new<D: BlockDevice>(device: &D) -> Self {
        InodeStore {
            info: device.info(),
            layout: device.layout(),
        }
    }

    pub fn load<D: BlockDevice>(&self, device: &D, id: InodeId) -> Result<BlockList> {
        let (first, skip, blocks) = self.span(id)?;
        let raw = self.read_span(device, first, blocks)?;
        let size = fs_size_calculator::inode_size(self.info.num_inode_entries) as usize;
        trace!("loaded inode {id}");
        Ok(BlockList::decode(&raw[skip..skip + size], self.info.block_size))
    }

    pub fn save<D: BlockDevice>(
        &self,
        device: &mut D,
        id: InodeId,
        list: &BlockList,
    ) -> Result<()> {
        let (first, skip, blocks) = self.span(id)?;
        let encoded = list.encode();
        let mut raw = self.read_span(device, first, blocks)?;
        raw[skip..skip + encoded.len()].copy_from_slice(&encoded);
        let block_size = self.info.block_size as usize;
        for (i, chunk) in raw.chunks_exact(block_size).enumerate() {
            device.write_block(first + i as BlockNumber, chunk)?;
        }
        trace!("saved inode {id}");
        Ok(())
    }

    /// (first block, byte offset inside it, blocks touched)
    fn span(&self, id: InodeId) -> Result<(BlockNumber, usize, u32)> {
        if id >= self.info.max_dir_entries {
            return Err(EfsError::InvalidArgument(format!(
                "inode {id} is outside the inode table"
            )));
        }
        let block_size = self.info.block_size as u64;
        let size = fs_size_calculator::inode_size(self.info.num_inode_entries);
        let start = id as u64 * size;
        let first = start / block_size;
        let last = (start + size - 1) / block_size;
        Ok((
            self.layout.inode_table_start + first as BlockNumber,
            (start % block_size) as usize,
            (last - first + 1) as u32,
        ))
    }

    fn read_span<D: BlockDevice>(
        &self,
        device: &D,
        first: BlockNumber,
        blocks: u32,
    ) -> Result<Vec<u8>> {
        let block_size = self.info.block_size as usize;
        let mut raw = vec![0u8; blocks as usize * block_size];
        for (i, chunk) in raw.chunks_exact_mut(block_size).enumerate() {
            device.read_block(first + i as BlockNumber, chunk)?;
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::init_test_environment::{init_test_volume, small_geometry};

    #[test]
    fn test_block_for_offsets() {
        let info = small_geometry();
        let mut list = BlockList::empty(&info);
        assert_eq!(list.max_size(), 256);
        assert_eq!(list.block_for(0).unwrap(), 0);

        list.set_block_for(33, 77).unwrap();
        assert_eq!(list.block_for(32).unwrap(), 77);
        assert_eq!(list.block_for(63).unwrap(), 77);
        assert_eq!(list.block_for(64).unwrap(), 0);
        assert_eq!(list.block_for(31).unwrap(), 0);
    }

    #[test]
    fn test_offset_past_last_pointer() {
        let info = small_geometry();
        let mut list = BlockList::empty(&info);
        assert!(list.block_for(255).is_ok());
        assert!(matches!(
            list.block_for(256),
            Err(EfsError::FileTooLarge { offset: 256, limit: 256 })
        ));
        assert!(list.set_block_for(1000, 5).is_err());
        assert!(list.check_range(200, 56).is_ok());
        assert!(list.check_range(200, 57).is_err());
        assert!(list.check_range(u64::MAX, 2).is_err());
    }

    #[test]
    fn test_clear_returns_allocated() {
        let info = small_geometry();
        let mut list = BlockList::empty(&info);
        list.set_block_for(0, 40).unwrap();
        list.set_block_for(96, 41).unwrap();
        assert_eq!(list.clear(), vec![40, 41]);
        assert_eq!(list.allocated().count(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let mut volume = init_test_volume(small_geometry());
        let store = InodeStore::new(&volume);
        let info = volume.info();

        let mut list = BlockList::empty(&info);
        list.set_block_for(0, 40).unwrap();
        list.set_block_for(7 * 32, 99).unwrap();
        store.save(&mut volume, 3, &list).unwrap();

        assert_eq!(store.load(&volume, 3).unwrap(), list);
        // neighbours are untouched
        assert_eq!(store.load(&volume, 2).unwrap(), BlockList::empty(&info));
        assert_eq!(store.load(&volume, 4).unwrap(), BlockList::empty(&info));
        assert!(matches!(
            store.load(&volume, 8),
            Err(EfsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_inode_straddling_blocks() {
        // 12-byte inodes in 32-byte blocks, inode 2 covers bytes 24..36
        let info = VolumeInfo {
            num_inode_entries: 3,
            ..small_geometry()
        };
        let mut volume = init_test_volume(info);
        let store = InodeStore::new(&volume);
        let mut list = BlockList::empty(&info);
        list.set_block_for(0, 60).unwrap();
        list.set_block_for(64, 61).unwrap();
        store.save(&mut volume, 2, &list).unwrap();
        assert_eq!(store.load(&volume, 2).unwrap(), list);
        assert_eq!(store.load(&volume, 1).unwrap(), BlockList::empty(&info));
        assert_eq!(store.load(&volume, 3).unwrap(), BlockList::empty(&info));
    }
}
