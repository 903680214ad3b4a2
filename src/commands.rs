//! the file tools: check a host file in or out, and inspect or change
//! attributes
use anyhow::Context;
use std::path::Path;

use crate::{
    error::EfsError,
    fs::{Attribute, Attributes, BlockDevice, FileSystem, OpenMode},
};

/// Copy the host file at `host_path` into the volume as `name`.
///
/// Refuses to replace an existing file. Returns the number of bytes copied.
pub fn checkin<D: BlockDevice>(
    fs: &mut FileSystem<D>,
    host_path: &Path,
    name: &str,
) -> anyhow::Result<u64> {
    match fs.find(name) {
        Ok(_) => {
            return Err(anyhow::Error::new(EfsError::AlreadyExists(name.to_string()))
                .context("DUPLICATE FILE"))
        }
        Err(EfsError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    let data = std::fs::read(host_path)
        .with_context(|| format!("unable to open source file {}", host_path.display()))?;
    let limit = fs.info().max_file_size();
    if data.len() as u64 > limit {
        return Err(EfsError::FileTooLarge {
            offset: data.len() as u64,
            limit,
        }
        .into());
    }

    let fd = fs.open_file(name, OpenMode::Create)?;
    if !data.is_empty() {
        fs.write_file(fd, &data)?;
    }
    fs.flush_file(fd)?;
    fs.close_file(fd)?;
    Ok(data.len() as u64)
}

/// Copy `name` out of the volume into `output`, exactly its recorded length.
pub fn checkout<D: BlockDevice>(
    fs: &mut FileSystem<D>,
    name: &str,
    output: &Path,
) -> anyhow::Result<u64> {
    let length = fs.file_length(name)?;
    let fd = fs.open_file(name, OpenMode::ReadOnly)?;
    let data = match length {
        0 => Vec::new(),
        n => fs.read_file(fd, n as usize)?,
    };
    fs.close_file(fd)?;
    std::fs::write(output, &data)
        .with_context(|| format!("unable to write {}", output.display()))?;
    Ok(length)
}

/// `'R'` for a read-only file, `'W'` otherwise
pub fn getattr<D: BlockDevice>(fs: &FileSystem<D>, name: &str) -> anyhow::Result<char> {
    let attributes = fs.get_attr(name)?;
    Ok(if attributes.contains(Attribute::ReadOnly) {
        'R'
    } else {
        'W'
    })
}

pub fn attrfile<D: BlockDevice>(
    fs: &mut FileSystem<D>,
    name: &str,
    read_only: bool,
) -> anyhow::Result<Attributes> {
    let mut attributes = fs.get_attr(name)?;
    attributes.set(Attribute::ReadOnly, read_only);
    fs.set_attr(name, attributes)?;
    Ok(attributes)
}

/// one line per file: name, length, `R` or `W`
pub fn list<D: BlockDevice>(fs: &FileSystem<D>) -> Vec<String> {
    let width = fs.info().max_filename_length as usize;
    fs.entries()
        .map(|entry| {
            let flag = if entry.is_read_only() { 'R' } else { 'W' };
            format!("{:<width$} {:>10} {flag}", entry.filename, entry.length)
        })
        .collect()
}
