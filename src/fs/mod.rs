//! a flat, block-structured filesystem: directory, inodes of direct pointers,
//! a free-block bitmap and an open file table
pub mod directory;
pub mod efs;
pub mod free_pool;
pub mod inode;
pub mod open_file;
pub mod superblock;
pub mod volume;
pub use directory::*;
pub use efs::*;
pub use free_pool::*;
pub use inode::*;
pub use open_file::*;
pub use superblock::*;
pub use volume::*;

/// physical block number, `0` inside an inode means "unallocated"
pub type BlockNumber = u32;
/// index of an inode, equal to the directory slot that owns it
pub type InodeId = u32;

const FS_MAGIC: u32 = 0x2106_0ef5;
/// bytes reserved at the start of the image for the superblock
pub const SUPERBLOCK_REGION_SIZE: u32 = 512;
/// an inode pointer is a little-endian `u32`
pub const BLOCK_POINTER_SIZE: u32 = 4;
pub const DIGEST_SIZE: u32 = 32;
