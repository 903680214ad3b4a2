//! This module contains functions to calculate the size of different fs components

use crate::fs::{BLOCK_POINTER_SIZE, DIGEST_SIZE, SUPERBLOCK_REGION_SIZE};

/// calculate how many blocks are reserved for the superblock
/// # Example
/// ```
/// use efs::utils::fs_size_calculator::superblock_blocks;
/// assert_eq!(superblock_blocks(512), 1);
/// assert_eq!(superblock_blocks(32), 16);
/// ```
pub const fn superblock_blocks(block_size: u32) -> u32 {
    SUPERBLOCK_REGION_SIZE.div_ceil(block_size)
}

/// calculate needed free-block bitmap size in blocks,one bit per block
/// # Example
/// ```
/// use efs::utils::fs_size_calculator::bitmap_blocks;
/// assert_eq!(bitmap_blocks(2048, 512), 1);
/// assert_eq!(bitmap_blocks(4097 * 8, 512), 9);
/// ```
pub const fn bitmap_blocks(block_count: u32, block_size: u32) -> u32 {
    block_count.div_ceil(8).div_ceil(block_size)
}

/// the largest encoded size of one directory slot
///
/// option tag + string length prefix + name bytes + attributes + length
pub const fn directory_entry_size(max_filename_length: u32) -> u64 {
    1 + 8 + max_filename_length as u64 + 1 + 8
}

/// calculate needed directory region size in blocks, `None` if it does
/// not fit a block number
/// # Example
/// ```
/// use efs::utils::fs_size_calculator::directory_blocks;
/// // 8 + 128 * 50 + 32 bytes
/// assert_eq!(directory_blocks(128, 32, 512), Some(13));
/// assert_eq!(directory_blocks(u32::MAX, u32::MAX, 512), None);
/// ```
pub const fn directory_blocks(
    max_dir_entries: u32,
    max_filename_length: u32,
    block_size: u32,
) -> Option<u32> {
    // vector length prefix, every slot, trailing digest
    let entry_size = directory_entry_size(max_filename_length);
    let slots = match (max_dir_entries as u64).checked_mul(entry_size) {
        Some(slots) => slots,
        None => return None,
    };
    match slots.checked_add(8 + DIGEST_SIZE as u64) {
        Some(bytes) => blocks_of(bytes, block_size),
        None => None,
    }
}

/// size in bytes of one inode: a flat list of direct block pointers
pub const fn inode_size(num_inode_entries: u32) -> u64 {
    num_inode_entries as u64 * BLOCK_POINTER_SIZE as u64
}

/// calculate needed inode table size in blocks, `None` if it does not fit
/// a block number
/// # Example
/// ```
/// use efs::utils::fs_size_calculator::inode_table_blocks;
/// assert_eq!(inode_table_blocks(128, 64, 512), Some(64));
/// ```
pub const fn inode_table_blocks(
    max_dir_entries: u32,
    num_inode_entries: u32,
    block_size: u32,
) -> Option<u32> {
    match (max_dir_entries as u64).checked_mul(inode_size(num_inode_entries)) {
        Some(bytes) => blocks_of(bytes, block_size),
        None => None,
    }
}

const fn blocks_of(bytes: u64, block_size: u32) -> Option<u32> {
    let blocks = bytes.div_ceil(block_size as u64);
    if blocks > u32::MAX as u64 {
        None
    } else {
        Some(blocks as u32)
    }
}

/// calculate the whole image size in bytes
pub const fn image_size(block_count: u32, block_size: u32) -> u64 {
    block_count as u64 * block_size as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_block_size() {
        assert_eq!(superblock_blocks(32), 16);
        assert_eq!(bitmap_blocks(256, 32), 1);
        assert_eq!(bitmap_blocks(257, 32), 2);
        assert_eq!(inode_size(8), 32);
        assert_eq!(inode_table_blocks(16, 8, 32), Some(16));
    }

    #[test]
    fn test_oversized_regions() {
        assert_eq!(directory_entry_size(u32::MAX), u32::MAX as u64 + 18);
        assert_eq!(directory_blocks(200_000_000, 32, 512), Some(19_531_251));
        assert_eq!(directory_blocks(u32::MAX, u32::MAX, 32), None);
        assert_eq!(inode_table_blocks(u32::MAX, u32::MAX, 32), None);
        assert_eq!(inode_size(u32::MAX), 4 * u32::MAX as u64);
    }

    #[test]
    fn test_image_size() {
        assert_eq!(image_size(2048, 512), 1 << 20);
    }
}
