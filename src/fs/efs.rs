//! the file operations a mounted session exposes
use std::path::Path;

use log::{debug, info, warn};
use memmap2::MmapMut;

use crate::error::{EfsError, Result};

use super::{
    Attributes, BlockDevice, BlockList, DirEntry, DirectoryService, Fd, FreeBlockPool, InodeId,
    InodeStore, OpenFile, OpenFileTable, OpenMode, Volume, VolumeInfo,
};

/// One mounted volume and everything open on it.
///
/// The session owns the device, so a volume is driven by exactly one
/// session at a time. Call [FileSystem::close_fs] to flush open files and
/// unmount; dropping the session discards unflushed state.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    device: D,
    info: VolumeInfo,
    pool: FreeBlockPool,
    directory: DirectoryService,
    inodes: InodeStore,
    oft: OpenFileTable,
}

impl FileSystem<Volume<MmapMut>> {
    /// mount the image file at `image_path`
    pub fn mount<P>(image_path: P, password: impl AsRef<[u8]>) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::init(Volume::mount(image_path, password)?)
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// load the directory and free list of an already mounted device
    pub fn init(device: D) -> Result<Self> {
        let info = device.info();
        let pool = FreeBlockPool::load(&device)?;
        let directory = DirectoryService::load(&device)?;
        let inodes = InodeStore::new(&device);
        info!(
            "session started: {} files, {} free blocks",
            directory.entries().count(),
            pool.free_blocks()
        );
        Ok(FileSystem {
            device,
            info,
            pool,
            directory,
            inodes,
            oft: OpenFileTable::new(info.max_files),
        })
    }

    pub fn info(&self) -> VolumeInfo {
        self.info
    }

    pub fn find(&self, name: &str) -> Result<InodeId> {
        self.directory.find(name)
    }

    pub fn file_length(&self, name: &str) -> Result<u64> {
        self.directory.length(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.directory.entries().map(|(_, entry)| entry)
    }

    pub fn free_blocks(&self) -> usize {
        self.pool.free_blocks()
    }

    pub fn open_files(&self) -> usize {
        self.oft.open_count()
    }

    pub fn open_file(&mut self, name: &str, mode: OpenMode) -> Result<Fd> {
        let existing = match self.directory.find(name) {
            Ok(id) => {
                if mode.writes() && self.directory.entry(name)?.is_read_only() {
                    return Err(EfsError::AccessDenied(name.to_string()));
                }
                Some(id)
            }
            Err(EfsError::NotFound(_)) if mode == OpenMode::Create => {
                self.directory.check_name(name)?;
                if !self.pool.has_free() {
                    return Err(EfsError::VolumeFull);
                }
                if !self.directory.has_room() {
                    return Err(EfsError::DirectoryFull);
                }
                None
            }
            Err(e) => return Err(e),
        };
        if self.oft.find_by_name(name).is_some() {
            return Err(EfsError::FileBusy(name.to_string()));
        }
        if !self.oft.has_free_slot() {
            return Err(EfsError::TooManyOpenFiles(self.oft.capacity()));
        }

        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.directory.create(name, Attributes::empty(), 0)?;
                self.inodes
                    .save(&mut self.device, id, &BlockList::empty(&self.info))?;
                self.directory.commit(&mut self.device)?;
                info!("created {name:?} as inode {id}");
                id
            }
        };
        let length = self.directory.length(name)?;
        let blocks = self.inodes.load(&self.device, id)?;
        let mut file = OpenFile::new(mode, id, name, blocks, self.info.block_size, length);
        file.preload_tail(&self.device)?;
        self.oft.insert(file)
    }

    pub fn write_file(&mut self, fd: Fd, data: &[u8]) -> Result<()> {
        let Self {
            device,
            pool,
            directory,
            oft,
            ..
        } = self;
        let file = oft.get_mut(fd)?;
        if directory.entry(&file.filename)?.is_read_only() {
            return Err(EfsError::AccessDenied(file.filename.clone()));
        }
        if !file.mode.writes() {
            return Err(EfsError::ReadOnlyFile);
        }
        if data.is_empty() {
            return Err(EfsError::InvalidArgument("nothing to write".into()));
        }
        file.write(device, pool, directory, data)
    }

    pub fn read_file(&mut self, fd: Fd, count: usize) -> Result<Vec<u8>> {
        if count == 0 {
            return Err(EfsError::InvalidArgument("nothing to read".into()));
        }
        let file = self.oft.get_mut(fd)?;
        let length = self.directory.length(&file.filename)?;
        file.read(&mut self.device, length, count)
    }

    /// Make a descriptor's buffered block, inode, free list and directory
    /// durable, in that order.
    pub fn flush_file(&mut self, fd: Fd) -> Result<()> {
        if !self.oft.get(fd)?.mode.writes() {
            return Err(EfsError::ReadOnlyFile);
        }
        self.flush_slot(fd)
    }

    pub fn close_file(&mut self, fd: Fd) -> Result<()> {
        if self.oft.get(fd)?.mode.writes() {
            self.flush_slot(fd)?;
        }
        let file = self.oft.remove(fd)?;
        debug!("closed {fd} ({:?})", file.filename);
        Ok(())
    }

    pub fn del_file(&mut self, name: &str) -> Result<()> {
        let id = self.directory.find(name)?;
        if self.directory.entry(name)?.is_read_only() {
            return Err(EfsError::AccessDenied(name.to_string()));
        }
        if self.oft.find_by_name(name).is_some() {
            return Err(EfsError::FileBusy(name.to_string()));
        }
        // blocks go back to the pool before the entry disappears
        let mut blocks = self.inodes.load(&self.device, id)?;
        let released = blocks.clear();
        for block in &released {
            self.pool.release(*block);
        }
        self.inodes.save(&mut self.device, id, &blocks)?;
        self.pool.commit(&mut self.device)?;
        self.directory.remove(name)?;
        self.directory.commit(&mut self.device)?;
        info!("deleted {name:?}, released {} blocks", released.len());
        Ok(())
    }

    pub fn get_attr(&self, name: &str) -> Result<Attributes> {
        self.directory.attributes(name)
    }

    pub fn set_attr(&mut self, name: &str, attributes: Attributes) -> Result<()> {
        self.directory.set_attributes(name, attributes)?;
        self.directory.commit(&mut self.device)
    }

    /// Close every open descriptor, then unmount. The volume is unmounted
    /// even if a flush fails; the first error is returned.
    pub fn close_fs(mut self) -> Result<D> {
        let mut first_error = None;
        for fd in self.oft.open_fds() {
            if let Err(e) = self.close_file(fd) {
                warn!("closing {fd} failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.device.unmount() {
            first_error.get_or_insert(e);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(self.device),
        }
    }

    fn flush_slot(&mut self, fd: Fd) -> Result<()> {
        let file = self.oft.get_mut(fd)?;
        file.write_back(&mut self.device)?;
        self.inodes.save(&mut self.device, file.inode, &file.blocks)?;
        self.pool.commit(&mut self.device)?;
        self.directory.commit(&mut self.device)?;
        debug!("flushed {fd} ({:?})", file.filename);
        Ok(())
    }
}
