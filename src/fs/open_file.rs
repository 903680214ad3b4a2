//! the open file table and the per-descriptor cursor and block buffer
use std::fmt;

use log::{debug, trace};

use crate::error::{EfsError, Result};

use super::{BlockDevice, BlockList, BlockNumber, DirectoryService, FreeBlockPool, InodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// read and write an existing file from the start
    Normal,
    /// like `Normal`, creating the file first if it is missing
    Create,
    ReadOnly,
    /// read and write an existing file, starting at its end
    ReadAppend,
}

impl OpenMode {
    pub fn writes(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

/// an opaque handle to an open file table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fd(usize);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd#{}", self.0)
    }
}

/// State of one open file.
///
/// `buffer` caches exactly one physical block, `buffered`. A chunk that
/// reaches the end of its block is written through at once; a partially
/// written tail stays `dirty` in the buffer until the next flush.
#[derive(Debug)]
pub struct OpenFile {
    pub mode: OpenMode,
    pub inode: InodeId,
    pub filename: String,
    pub blocks: BlockList,
    /// absolute logical byte offset
    pub file_ptr: u64,
    /// offset inside the current block, always `< block_size`
    pub block_cursor: u32,
    buffer: Vec<u8>,
    buffered: Option<BlockNumber>,
    dirty: bool,
}

impl OpenFile {
    pub fn new(
        mode: OpenMode,
        inode: InodeId,
        filename: &str,
        blocks: BlockList,
        block_size: u32,
        length: u64,
    ) -> Self {
        let file_ptr = match mode {
            OpenMode::ReadAppend => length,
            _ => 0,
        };
        OpenFile {
            mode,
            inode,
            filename: filename.to_string(),
            blocks,
            file_ptr,
            block_cursor: (file_ptr % block_size as u64) as u32,
            buffer: vec![0u8; block_size as usize],
            buffered: None,
            dirty: false,
        }
    }

    /// load the partially filled tail block so appends continue inside it
    pub fn preload_tail<D: BlockDevice>(&mut self, device: &D) -> Result<()> {
        if self.block_cursor == 0 {
            return Ok(());
        }
        let block = self.blocks.block_for(self.file_ptr)?;
        if block != 0 {
            device.read_block(block, &mut self.buffer)?;
            self.buffered = Some(block);
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Copy `data` into the file at `file_ptr`, allocating blocks as needed
    /// and extending the directory length in memory.
    pub fn write<D: BlockDevice>(
        &mut self,
        device: &mut D,
        pool: &mut FreeBlockPool,
        directory: &mut DirectoryService,
        data: &[u8],
    ) -> Result<()> {
        self.blocks.check_range(self.file_ptr, data.len() as u64)?;
        let block_size = self.buffer.len();
        let mut written = 0;
        while written < data.len() {
            let offset = self.file_ptr;
            let cursor = self.block_cursor as usize;
            let n = (block_size - cursor).min(data.len() - written);

            let block = self.blocks.block_for(offset)?;
            if block == 0 {
                self.write_back(device)?;
                let block = pool.allocate()?;
                self.blocks.set_block_for(offset, block)?;
                self.buffer.fill(0);
                self.buffered = Some(block);
            } else if self.buffered != Some(block) {
                self.write_back(device)?;
                // keep the bytes this chunk does not cover
                if n < block_size {
                    device.read_block(block, &mut self.buffer)?;
                }
                self.buffered = Some(block);
            }

            self.buffer[cursor..cursor + n].copy_from_slice(&data[written..written + n]);
            self.dirty = true;
            written += n;
            self.advance(n);
            if self.block_cursor == 0 {
                self.write_back(device)?;
            }

            if self.file_ptr > directory.length(&self.filename)? {
                directory.set_length(&self.filename, self.file_ptr)?;
            }
        }
        trace!("{}: wrote {} bytes, file_ptr {}", self.filename, data.len(), self.file_ptr);
        Ok(())
    }

    /// Read `count` bytes from `file_ptr`. Holes and anything at or past
    /// `length` read as zeros.
    pub fn read<D: BlockDevice>(
        &mut self,
        device: &mut D,
        length: u64,
        count: usize,
    ) -> Result<Vec<u8>> {
        self.blocks.check_range(self.file_ptr, count as u64)?;
        let start = self.file_ptr;
        let block_size = self.buffer.len();
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let cursor = self.block_cursor as usize;
            let n = (block_size - cursor).min(count - out.len());
            let block = self.blocks.block_for(self.file_ptr)?;
            if block == 0 {
                out.resize(out.len() + n, 0);
            } else {
                self.load_block(device, block)?;
                out.extend_from_slice(&self.buffer[cursor..cursor + n]);
            }
            self.advance(n);
        }
        let valid = length.saturating_sub(start).min(count as u64) as usize;
        out[valid..].fill(0);
        trace!("{}: read {count} bytes, file_ptr {}", self.filename, self.file_ptr);
        Ok(out)
    }

    /// write the buffered block back if it holds unsaved bytes
    pub fn write_back<D: BlockDevice>(&mut self, device: &mut D) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(block) = self.buffered {
            device.write_block(block, &self.buffer)?;
            trace!("{}: wrote back block {block}", self.filename);
        }
        self.dirty = false;
        Ok(())
    }

    fn load_block<D: BlockDevice>(&mut self, device: &mut D, block: BlockNumber) -> Result<()> {
        if self.buffered == Some(block) {
            return Ok(());
        }
        self.write_back(device)?;
        device.read_block(block, &mut self.buffer)?;
        self.buffered = Some(block);
        Ok(())
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.file_ptr += n as u64;
        self.block_cursor = ((self.block_cursor as usize + n) % self.buffer.len()) as u32;
    }
}

#[derive(Debug)]
pub enum Slot {
    Closed,
    Open(OpenFile),
}

/// bounded table of open files, indexed by [Fd]
#[derive(Debug)]
pub struct OpenFileTable {
    slots: Vec<Slot>,
}

impl OpenFileTable {
    pub fn new(capacity: u32) -> Self {
        OpenFileTable {
            slots: (0..capacity).map(|_| Slot::Closed).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn open_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Open(_)))
            .count()
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(|s| matches!(s, Slot::Closed))
    }

    pub fn insert(&mut self, file: OpenFile) -> Result<Fd> {
        let index = self
            .slots
            .iter()
            .position(|s| matches!(s, Slot::Closed))
            .ok_or(EfsError::TooManyOpenFiles(self.slots.len()))?;
        debug!("open {:?} as fd#{index} ({:?})", file.filename, file.mode);
        self.slots[index] = Slot::Open(file);
        Ok(Fd(index))
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        match self.slots.get(fd.0) {
            Some(Slot::Open(file)) => Ok(file),
            _ => Err(EfsError::InvalidArgument(format!("{fd} is not open"))),
        }
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        match self.slots.get_mut(fd.0) {
            Some(Slot::Open(file)) => Ok(file),
            _ => Err(EfsError::InvalidArgument(format!("{fd} is not open"))),
        }
    }

    /// mark the slot closed and hand back what it held
    pub fn remove(&mut self, fd: Fd) -> Result<OpenFile> {
        self.get(fd)?;
        match std::mem::replace(&mut self.slots[fd.0], Slot::Closed) {
            Slot::Open(file) => Ok(file),
            Slot::Closed => Err(EfsError::InvalidArgument(format!("{fd} is not open"))),
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<Fd> {
        self.slots
            .iter()
            .position(|s| matches!(s, Slot::Open(f) if f.filename == name))
            .map(Fd)
    }

    pub fn open_fds(&self) -> Vec<Fd> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Slot::Open(_)))
            .map(|(i, _)| Fd(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Attributes, Directory, VolumeInfo};
    use crate::utils::init_test_environment::{init_test_volume, small_geometry};

    fn file(mode: OpenMode, name: &str, length: u64) -> OpenFile {
        let info = small_geometry();
        OpenFile::new(mode, 0, name, BlockList::empty(&info), info.block_size, length)
    }

    #[test]
    fn test_table_capacity() {
        let mut table = OpenFileTable::new(2);
        let a = table.insert(file(OpenMode::Normal, "a", 0)).unwrap();
        let b = table.insert(file(OpenMode::Normal, "b", 0)).unwrap();
        assert_ne!(a, b);
        assert!(!table.has_free_slot());
        assert!(matches!(
            table.insert(file(OpenMode::Normal, "c", 0)),
            Err(EfsError::TooManyOpenFiles(2))
        ));
        assert_eq!(table.open_count(), 2);

        table.remove(a).unwrap();
        assert!(table.get(a).is_err());
        assert!(table.remove(a).is_err());
        assert_eq!(table.find_by_name("b"), Some(b));
        assert_eq!(table.find_by_name("a"), None);
        assert_eq!(table.open_fds(), vec![b]);
        // the freed slot is reused
        assert_eq!(table.insert(file(OpenMode::Normal, "c", 0)).unwrap(), a);
    }

    #[test]
    fn test_read_append_cursor() {
        let f = file(OpenMode::ReadAppend, "a", 70);
        assert_eq!(f.file_ptr, 70);
        assert_eq!(f.block_cursor, 6);
        let f = file(OpenMode::Normal, "a", 70);
        assert_eq!((f.file_ptr, f.block_cursor), (0, 0));
    }

    #[test]
    fn test_partial_tail_stays_buffered() {
        let info: VolumeInfo = small_geometry();
        let mut volume = init_test_volume(info);
        let mut pool = FreeBlockPool::load(&volume).unwrap();
        let mut directory = DirectoryService::new(Directory::with_capacity(8), 16);
        directory.create("a", Attributes::empty(), 0).unwrap();
        let mut f = file(OpenMode::Create, "a", 0);

        let data: Vec<u8> = (0..40).collect();
        f.write(&mut volume, &mut pool, &mut directory, &data).unwrap();
        assert_eq!(f.file_ptr, 40);
        assert_eq!(f.block_cursor, 8);
        assert_eq!(directory.length("a").unwrap(), 40);
        assert!(f.is_dirty());

        // the first block went through, the tail did not
        let first = f.blocks.block_for(0).unwrap();
        let second = f.blocks.block_for(32).unwrap();
        let mut buf = [0u8; 32];
        volume.read_block(first, &mut buf).unwrap();
        assert_eq!(&buf[..], &data[..32]);
        volume.read_block(second, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 32]);

        f.write_back(&mut volume).unwrap();
        assert!(!f.is_dirty());
        volume.read_block(second, &mut buf).unwrap();
        assert_eq!(&buf[..8], &data[32..]);
        assert_eq!(&buf[8..], &[0u8; 24]);
    }

    #[test]
    fn test_read_zero_fills_holes_and_past_length() {
        let info = small_geometry();
        let mut volume = init_test_volume(info);
        let mut blocks = BlockList::empty(&info);
        volume.write_block(60, &[9u8; 32]).unwrap();
        blocks.set_block_for(32, 60).unwrap();
        let mut f = OpenFile::new(OpenMode::ReadOnly, 0, "a", blocks, 32, 48);

        let out = f.read(&mut volume, 48, 80).unwrap();
        assert_eq!(out.len(), 80);
        assert!(out[..32].iter().all(|b| *b == 0));
        assert!(out[32..48].iter().all(|b| *b == 9));
        assert!(out[48..].iter().all(|b| *b == 0));
        assert_eq!(f.file_ptr, 80);
        assert_eq!(f.block_cursor, 16);
    }

    #[test]
    fn test_read_past_inode_range() {
        let info = small_geometry();
        let mut volume = init_test_volume(info);
        let mut f = file(OpenMode::ReadOnly, "a", 0);
        assert!(matches!(
            f.read(&mut volume, 0, 257),
            Err(EfsError::FileTooLarge { .. })
        ));
        assert_eq!(f.file_ptr, 0);
    }
}
