//! the raw volume: superblock, block read/write and the low-level
//! directory and free-list persistence primitives
//!
//! it has the following layout:
//! - superblock
//! - free-block bitmap
//! - directory
//! - inode table
//! - data blocks
use std::{fs::OpenOptions, io::Cursor, ops::Range, path::Path};

use bitvec::prelude::*;
use log::{debug, info};
use memmap2::MmapMut;

use crate::{
    error::{EfsError, Result},
    utils::{fs_size_calculator, traits::SerializeAndDigest},
};

use super::{BlockNumber, Directory, Layout, SuperBlock, VolumeInfo, SUPERBLOCK_REGION_SIZE};

pub type FreeBitmap = BitVec<u8, Lsb0>;

/// What the file layer needs from a mounted volume.
pub trait BlockDevice {
    fn info(&self) -> VolumeInfo;

    fn layout(&self) -> Layout;

    /// Read one block. `buf.len()` must equal the block size.
    fn read_block(&self, block: BlockNumber, buf: &mut [u8]) -> Result<()>;

    /// Write one block. `data.len()` must equal the block size.
    fn write_block(&mut self, block: BlockNumber, data: &[u8]) -> Result<()>;

    fn load_directory(&self) -> Result<Directory>;

    fn store_directory(&mut self, directory: &mut Directory) -> Result<()>;

    /// bit `n` set means block `n` is busy
    fn load_free_list(&self) -> Result<FreeBitmap>;

    fn store_free_list(&mut self, bitmap: &FreeBitmap) -> Result<()>;

    /// persist the superblock and flush everything to stable storage
    fn unmount(&mut self) -> Result<()>;
}

/// byte storage a [Volume] can live in
pub trait Backing: AsRef<[u8]> + AsMut<[u8]> {
    fn sync(&mut self) -> std::io::Result<()>;
}

impl Backing for Vec<u8> {
    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Backing for MmapMut {
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()
    }
}

#[derive(Debug)]
pub struct Volume<S> {
    superblock: SuperBlock,
    image: S,
}

impl<S: Backing> Volume<S> {
    /// lay a fresh, empty filesystem over `image`
    pub fn format(mut image: S, info: VolumeInfo, password: impl AsRef<[u8]>) -> Result<Self> {
        let superblock = SuperBlock::new(info, password)?;
        let needed = fs_size_calculator::image_size(info.block_count, info.block_size);
        if (image.as_ref().len() as u64) < needed {
            return Err(EfsError::InvalidArgument(format!(
                "image holds {} bytes, geometry needs {needed}",
                image.as_ref().len()
            )));
        }
        let layout = superblock.layout;
        // metadata regions start zeroed, which is also an all-empty inode table
        let metadata_end = layout.data_start as usize * info.block_size as usize;
        image.as_mut()[..metadata_end].fill(0);

        let mut volume = Volume { superblock, image };
        volume.store_superblock()?;
        volume.store_directory(&mut Directory::with_capacity(info.max_dir_entries))?;
        let mut bitmap = FreeBitmap::repeat(false, info.block_count as usize);
        bitmap[..layout.data_start as usize].fill(true);
        volume.store_free_list(&bitmap)?;
        volume.image.sync()?;
        info!(
            "formatted volume: {info:?}, data blocks start at {}",
            layout.data_start
        );
        Ok(volume)
    }

    /// attach to an already formatted image
    pub fn open(image: S, password: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = image.as_ref();
        let region = bytes.len().min(SUPERBLOCK_REGION_SIZE as usize);
        let (mut superblock, _) = SuperBlock::deserialize(&bytes[..region])?;
        superblock.check_magic()?;
        superblock.check_password(password)?;
        let info = superblock.info;
        let needed = fs_size_calculator::image_size(info.block_count, info.block_size);
        if (bytes.len() as u64) < needed {
            return Err(EfsError::Corrupted(format!(
                "image is {} bytes, superblock claims {needed}",
                bytes.len()
            )));
        }
        superblock.update_last_mounted_at();
        let mut volume = Volume { superblock, image };
        volume.store_superblock()?;
        info!("mounted volume: {info:?}");
        Ok(volume)
    }

    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn into_inner(self) -> S {
        self.image
    }

    fn store_superblock(&mut self) -> Result<()> {
        let encoded = self.superblock.serialize()?;
        if encoded.len() > SUPERBLOCK_REGION_SIZE as usize {
            return Err(EfsError::Corrupted(format!(
                "superblock needs {} bytes, region holds {SUPERBLOCK_REGION_SIZE}",
                encoded.len()
            )));
        }
        self.image.as_mut()[..encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }

    /// byte range of `blocks` blocks starting at `start`
    #[inline]
    fn region(&self, start: BlockNumber, blocks: u32) -> Range<usize> {
        let block_size = self.superblock.info.block_size as usize;
        let begin = start as usize * block_size;
        begin..begin + blocks as usize * block_size
    }

    fn block_range(&self, block: BlockNumber, len: usize) -> Result<Range<usize>> {
        let info = &self.superblock.info;
        if block >= info.block_count {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("block {block} is past the end of the volume"),
            )
            .into());
        }
        if len != info.block_size as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("buffer of {len} bytes for a {} byte block", info.block_size),
            )
            .into());
        }
        Ok(self.region(block, 1))
    }
}

impl Volume<MmapMut> {
    /// map an image file and mount it
    pub fn mount<P>(image_path: P, password: impl AsRef<[u8]>) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        // open the "device" for read and write
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_path.as_ref())?;
        // Safety
        // the mapping is private to this session, nothing else in the
        // process touches the file while the volume is mounted
        let file_mmap_area = unsafe { MmapMut::map_mut(&file)? };
        Volume::open(file_mmap_area, password)
    }
}

impl<S: Backing> BlockDevice for Volume<S> {
    #[inline]
    fn info(&self) -> VolumeInfo {
        self.superblock.info
    }

    #[inline]
    fn layout(&self) -> Layout {
        self.superblock.layout
    }

    fn read_block(&self, block: BlockNumber, buf: &mut [u8]) -> Result<()> {
        let range = self.block_range(block, buf.len())?;
        buf.copy_from_slice(&self.image.as_ref()[range]);
        Ok(())
    }

    fn write_block(&mut self, block: BlockNumber, data: &[u8]) -> Result<()> {
        let range = self.block_range(block, data.len())?;
        self.image.as_mut()[range].copy_from_slice(data);
        Ok(())
    }

    fn load_directory(&self) -> Result<Directory> {
        let layout = self.superblock.layout;
        let range = self.region(layout.directory_start, layout.directory_blocks);
        let mut cursor = Cursor::new(&self.image.as_ref()[range]);
        Directory::deserialize_from(&mut cursor)
    }

    fn store_directory(&mut self, directory: &mut Directory) -> Result<()> {
        let layout = self.superblock.layout;
        let range = self.region(layout.directory_start, layout.directory_blocks);
        let encoded = directory.serialize()?;
        if encoded.len() > range.len() {
            return Err(EfsError::Corrupted(format!(
                "directory needs {} bytes, region holds {}",
                encoded.len(),
                range.len()
            )));
        }
        self.image.as_mut()[range.start..range.start + encoded.len()].copy_from_slice(&encoded);
        debug!("stored directory ({} bytes)", encoded.len());
        Ok(())
    }

    fn load_free_list(&self) -> Result<FreeBitmap> {
        let layout = self.superblock.layout;
        let range = self.region(layout.free_list_start, layout.free_list_blocks);
        let mut bitmap = FreeBitmap::from_slice(&self.image.as_ref()[range]);
        bitmap.truncate(self.superblock.info.block_count as usize);
        Ok(bitmap)
    }

    fn store_free_list(&mut self, bitmap: &FreeBitmap) -> Result<()> {
        let layout = self.superblock.layout;
        let range = self.region(layout.free_list_start, layout.free_list_blocks);
        let raw = bitmap.as_raw_slice();
        if raw.len() > range.len() {
            return Err(EfsError::Corrupted(format!(
                "free list needs {} bytes, region holds {}",
                raw.len(),
                range.len()
            )));
        }
        let region = &mut self.image.as_mut()[range];
        region.fill(0);
        region[..raw.len()].copy_from_slice(raw);
        debug!("stored free list ({} busy blocks)", bitmap.count_ones());
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        self.store_superblock()?;
        self.image.sync()?;
        info!("unmounted volume");
        Ok(())
    }
}
