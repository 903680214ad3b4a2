//! mount a volume image for one session
use anyhow::Context;
use memmap2::MmapMut;
use std::path::Path;

use crate::fs::{FileSystem, Volume};

/// a session over a memory-mapped image file
pub type ImageFileSystem = FileSystem<Volume<MmapMut>>;

pub fn mount<P>(image_path: P, password: impl AsRef<[u8]>) -> anyhow::Result<ImageFileSystem>
where
    P: AsRef<Path>,
{
    let image_path = image_path.as_ref();
    FileSystem::mount(image_path, password)
        .with_context(|| format!("cannot mount {}", image_path.display()))
}

/// Mount the image, run `f` on the session, then close it.
///
/// The session is closed even when `f` fails; the error of `f` wins over
/// an error from closing.
pub fn with_session<P, T, F>(image_path: P, password: impl AsRef<[u8]>, f: F) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    F: FnOnce(&mut ImageFileSystem) -> anyhow::Result<T>,
{
    let mut fs = mount(image_path, password)?;
    let result = f(&mut fs);
    let closed = fs.close_fs();
    let value = result?;
    closed.context("unmount failed")?;
    Ok(value)
}
