//! the flat directory: filename -> (inode id, attributes, length)
//!
//! Inode ids are directory slot indices, so a free slot is also a free inode.
use enumflags2::{bitflags, BitFlags};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EfsError, Result},
    utils::{
        self,
        traits::{DigestInSelf, SerializeAndDigest},
    },
};

use super::{BlockDevice, InodeId};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// the file may not be written or deleted
    ReadOnly = 0b0000_0100,
}

pub type Attributes = BitFlags<Attribute>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub filename: String,
    /// raw attribute bits, see [Attribute]
    pub attributes: u8,
    /// logical size in bytes
    pub length: u64,
}

impl DirEntry {
    pub fn attributes(&self) -> Attributes {
        Attributes::from_bits_truncate(self.attributes)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes().contains(Attribute::ReadOnly)
    }
}

/// the directory table as it is stored on the volume
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Directory {
    pub entries: Vec<Option<DirEntry>>,
    pub digest: [u8; 32],
}

impl Directory {
    pub fn with_capacity(slots: u32) -> Self {
        Directory {
            entries: vec![None; slots as usize],
            digest: [0u8; 32],
        }
    }
}

impl DigestInSelf for Directory {
    fn digest(&mut self) -> Result<()> {
        self.digest = [0u8; 32];
        self.digest = utils::digest::digest(self)?;
        Ok(())
    }

    fn verify_digest(&mut self) -> Result<bool> {
        let digest_to_verify = self.digest;
        self.digest = [0u8; 32];
        let ok = digest_to_verify == utils::digest::digest(&self)?;
        self.digest = digest_to_verify;
        Ok(ok)
    }
}
impl SerializeAndDigest for Directory {}

/// In-memory view of the directory. Every mutation is visible at once,
/// [DirectoryService::commit] makes it durable.
#[derive(Debug)]
pub struct DirectoryService {
    table: Directory,
    max_filename_length: u32,
}

impl DirectoryService {
    pub fn new(table: Directory, max_filename_length: u32) -> Self {
        DirectoryService {
            table,
            max_filename_length,
        }
    }

    pub fn load<D: BlockDevice>(device: &D) -> Result<Self> {
        let info = device.info();
        let table = device.load_directory()?;
        if table.entries.len() != info.max_dir_entries as usize {
            return Err(EfsError::Corrupted(format!(
                "directory has {} slots, superblock says {}",
                table.entries.len(),
                info.max_dir_entries
            )));
        }
        Ok(Self::new(table, info.max_filename_length))
    }

    pub fn find(&self, name: &str) -> Result<InodeId> {
        self.position(name)
            .map(|slot| slot as InodeId)
            .ok_or_else(|| EfsError::NotFound(name.to_string()))
    }

    pub fn entry(&self, name: &str) -> Result<&DirEntry> {
        let slot = self.find(name)?;
        self.slot(slot)
    }

    /// entries in slot order, paired with their inode id
    pub fn entries(&self) -> impl Iterator<Item = (InodeId, &DirEntry)> {
        self.table
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as InodeId, e)))
    }

    pub fn has_room(&self) -> bool {
        self.table.entries.iter().any(Option::is_none)
    }

    /// check a name against the configured bound without touching the table
    pub fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(EfsError::InvalidArgument("empty filename".into()));
        }
        if name.len() > self.max_filename_length as usize {
            return Err(EfsError::NameTooLong {
                name: name.to_string(),
                max: self.max_filename_length,
            });
        }
        Ok(())
    }

    pub fn create(&mut self, name: &str, attributes: Attributes, length: u64) -> Result<InodeId> {
        self.check_name(name)?;
        if self.position(name).is_some() {
            return Err(EfsError::AlreadyExists(name.to_string()));
        }
        let slot = self
            .table
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(EfsError::DirectoryFull)?;
        self.table.entries[slot] = Some(DirEntry {
            filename: name.to_string(),
            attributes: attributes.bits(),
            length,
        });
        debug!("directory: created {name:?} in slot {slot}");
        Ok(slot as InodeId)
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        let slot = self.find(name)?;
        self.table.entries[slot as usize] = None;
        debug!("directory: removed {name:?} from slot {slot}");
        Ok(())
    }

    pub fn length(&self, name: &str) -> Result<u64> {
        Ok(self.entry(name)?.length)
    }

    pub fn set_length(&mut self, name: &str, length: u64) -> Result<()> {
        self.entry_mut(name)?.length = length;
        Ok(())
    }

    pub fn attributes(&self, name: &str) -> Result<Attributes> {
        Ok(self.entry(name)?.attributes())
    }

    pub fn set_attributes(&mut self, name: &str, attributes: Attributes) -> Result<()> {
        self.entry_mut(name)?.attributes = attributes.bits();
        Ok(())
    }

    /// persist the whole table
    pub fn commit<D: BlockDevice>(&mut self, device: &mut D) -> Result<()> {
        device.store_directory(&mut self.table)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.table
            .entries
            .iter()
            .position(|e| matches!(e, Some(e) if e.filename == name))
    }

    fn slot(&self, slot: InodeId) -> Result<&DirEntry> {
        self.table
            .entries
            .get(slot as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| EfsError::Corrupted(format!("directory slot {slot} is empty")))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut DirEntry> {
        let slot = self.find(name)?;
        self.table.entries[slot as usize]
            .as_mut()
            .ok_or_else(|| EfsError::NotFound(name.to_string()))
    }
}
