use serde::{Deserialize, Serialize};

use crate::{
    error::{EfsError, Result},
    utils::{
        digest,
        fs_size_calculator,
        time_util::{self, *},
        traits::{DigestInSelf, SerializeAndDigest},
    },
};

use super::{BlockNumber, FS_MAGIC};

const MIN_BLOCK_SIZE: u32 = 32;
const MAX_BLOCK_SIZE: u32 = 65536;

/// volume geometry, fixed when the volume is formatted
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    /// bytes per block
    pub block_size: u32,
    /// total blocks in the image, metadata included
    pub block_count: u32,
    /// capacity of the open file table
    pub max_files: u32,
    /// direct pointers per inode, i.e. max blocks per file
    pub num_inode_entries: u32,
    pub max_filename_length: u32,
    /// directory slots, one inode per slot
    pub max_dir_entries: u32,
}

impl Default for VolumeInfo {
    fn default() -> Self {
        VolumeInfo {
            block_size: 512,
            block_count: 2048,
            max_files: 16,
            num_inode_entries: 64,
            max_filename_length: 32,
            max_dir_entries: 128,
        }
    }
}

impl VolumeInfo {
    /// the largest logical size a file can reach
    pub fn max_file_size(&self) -> u64 {
        self.num_inode_entries as u64 * self.block_size as u64
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EfsError::InvalidArgument(msg));
        if !self.block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
        {
            return invalid(format!(
                "block size {} must be a power of two in [{MIN_BLOCK_SIZE}, {MAX_BLOCK_SIZE}]",
                self.block_size
            ));
        }
        if self.max_files == 0
            || self.num_inode_entries == 0
            || self.max_filename_length == 0
            || self.max_dir_entries == 0
        {
            return invalid(format!("every geometry count must be non-zero: {self:?}"));
        }
        Ok(())
    }
}

/// where every region of the volume starts, in blocks
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layout {
    pub free_list_start: BlockNumber,
    pub free_list_blocks: u32,
    pub directory_start: BlockNumber,
    pub directory_blocks: u32,
    pub inode_table_start: BlockNumber,
    pub inode_table_blocks: u32,
    /// first block handed out to file data
    pub data_start: BlockNumber,
}

impl Layout {
    /// place every region for `info`, rejecting an unusable geometry
    pub fn new(info: &VolumeInfo) -> Result<Self> {
        info.validate()?;
        let free_list_start = fs_size_calculator::superblock_blocks(info.block_size);
        let free_list_blocks = fs_size_calculator::bitmap_blocks(info.block_count, info.block_size);
        let directory_start = free_list_start + free_list_blocks;
        let oversized = || {
            EfsError::InvalidArgument(format!(
                "metadata regions of {info:?} overflow a block number"
            ))
        };
        let directory_blocks = fs_size_calculator::directory_blocks(
            info.max_dir_entries,
            info.max_filename_length,
            info.block_size,
        )
        .ok_or_else(oversized)?;
        let inode_table_start = directory_start
            .checked_add(directory_blocks)
            .ok_or_else(oversized)?;
        let inode_table_blocks = fs_size_calculator::inode_table_blocks(
            info.max_dir_entries,
            info.num_inode_entries,
            info.block_size,
        )
        .ok_or_else(oversized)?;
        let data_start = inode_table_start
            .checked_add(inode_table_blocks)
            .ok_or_else(oversized)?;
        if data_start >= info.block_count {
            return Err(EfsError::InvalidArgument(format!(
                "{} blocks leave no room for data, metadata needs {data_start}",
                info.block_count
            )));
        }
        Ok(Layout {
            free_list_start,
            free_list_blocks,
            directory_start,
            directory_blocks,
            inode_table_start,
            inode_table_blocks,
            data_start,
        })
    }
}

/// The superblock of this filesystem
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SuperBlock {
    /// magic number
    pub magic: u32,
    pub info: VolumeInfo,
    pub layout: Layout,
    /// blake3 hash of the mount password
    pub password_digest: [u8; 32],
    pub created_at: TimeDurationStruct,
    pub last_mounted_at: Option<TimeDurationStruct>,
    /// to verify the integrity of this superblock
    pub digest: [u8; 32],
}

impl SuperBlock {
    pub fn new(info: VolumeInfo, password: impl AsRef<[u8]>) -> Result<Self> {
        let layout = Layout::new(&info)?;
        let mut superblock = Self {
            magic: FS_MAGIC,
            info,
            layout,
            password_digest: digest::password_digest(password),
            created_at: time_util::now(),
            last_mounted_at: None,
            digest: [0u8; 32],
        };
        superblock.digest()?;
        Ok(superblock)
    }

    pub fn update_last_mounted_at(&mut self) {
        self.last_mounted_at = Some(time_util::now());
    }

    pub fn check_magic(&self) -> Result<()> {
        if self.magic != FS_MAGIC {
            return Err(EfsError::Corrupted(format!(
                "bad magic {:#x}, not an efs volume",
                self.magic
            )));
        }
        Ok(())
    }

    pub fn check_password(&self, password: impl AsRef<[u8]>) -> Result<()> {
        if digest::password_digest(password) != self.password_digest {
            return Err(EfsError::InvalidPassword);
        }
        Ok(())
    }
}

impl DigestInSelf for SuperBlock {
    fn digest(&mut self) -> Result<()> {
        self.digest = [0u8; 32];
        self.digest = digest::digest(self)?;
        Ok(())
    }

    fn verify_digest(&mut self) -> Result<bool> {
        // get digest from itself
        let digest = self.digest;
        // clear the digest from struct
        self.digest = [0u8; 32];
        let digest2 = digest::digest(self)?;
        self.digest = digest;
        Ok(digest == digest2)
    }
}

impl SerializeAndDigest for SuperBlock {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_default_layout() {
        let layout = Layout::new(&VolumeInfo::default()).unwrap();
        assert_eq!(layout.free_list_start, 1);
        assert_eq!(layout.free_list_blocks, 1);
        assert_eq!(layout.directory_start, 2);
        assert_eq!(layout.directory_blocks, 13);
        assert_eq!(layout.inode_table_start, 15);
        assert_eq!(layout.inode_table_blocks, 64);
        assert_eq!(layout.data_start, 79);
    }

    #[test]
    fn test_superblock_fits_its_region() {
        let mut superblock = SuperBlock::new(VolumeInfo::default(), "pw").unwrap();
        let encoded = SerializeAndDigest::serialize(&mut superblock).unwrap();
        assert!(encoded.len() <= super::super::SUPERBLOCK_REGION_SIZE as usize);
    }

    #[test]
    fn test_superblock_serialization_and_deserialization() {
        let mut superblock = SuperBlock::new(VolumeInfo::default(), "pw").unwrap();
        let mut cursor = Cursor::new(Vec::new());
        superblock.serialize_into(&mut cursor).unwrap();
        cursor.set_position(0);
        let decoded = SuperBlock::deserialize_from(&mut cursor).unwrap();
        assert_eq!(decoded, superblock);
        decoded.check_magic().unwrap();
        decoded.check_password("pw").unwrap();
        assert!(matches!(
            decoded.check_password("nope"),
            Err(EfsError::InvalidPassword)
        ));
    }

    #[test]
    fn test_tampered_superblock_is_rejected() {
        let mut superblock = SuperBlock::new(VolumeInfo::default(), "pw").unwrap();
        let mut encoded = SerializeAndDigest::serialize(&mut superblock).unwrap();
        // flip a bit inside `info.block_size`
        encoded[4] ^= 0x01;
        assert!(matches!(
            <SuperBlock as SerializeAndDigest>::deserialize(&encoded),
            Err(EfsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_invalid_geometry() {
        let info = VolumeInfo {
            block_size: 100,
            ..VolumeInfo::default()
        };
        assert!(matches!(
            SuperBlock::new(info, "pw"),
            Err(EfsError::InvalidArgument(_))
        ));
        let info = VolumeInfo {
            block_count: 10,
            ..VolumeInfo::default()
        };
        assert!(matches!(
            SuperBlock::new(info, "pw"),
            Err(EfsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_oversized_geometry_is_rejected() {
        for info in [
            VolumeInfo {
                max_dir_entries: 200_000_000,
                ..VolumeInfo::default()
            },
            VolumeInfo {
                max_filename_length: u32::MAX,
                ..VolumeInfo::default()
            },
            VolumeInfo {
                max_dir_entries: u32::MAX,
                num_inode_entries: u32::MAX,
                ..VolumeInfo::default()
            },
        ] {
            assert!(matches!(
                Layout::new(&info),
                Err(EfsError::InvalidArgument(_))
            ));
        }
    }
}
