//! create a volume image
use anyhow::Context;
use byte_unit::Byte;
use memmap2::MmapMut;
use std::{fs::OpenOptions, path::Path};

use crate::{
    fs::{BlockDevice, Layout, Volume, VolumeInfo},
    utils::fs_size_calculator,
};

/// create a new volume image file and format it
/// # Params
/// - `image_file_path`: the path of the image file, which must not exist yet
/// - `info`: the geometry of the new volume
/// - `password`: the password later mounts must present
///
/// # Return
/// an [anyhow::Result] type to indicate whether the operation is successful
pub fn mkfs<P>(
    image_file_path: P,
    info: VolumeInfo,
    password: impl AsRef<[u8]>,
) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    // reject a bad geometry before touching the host filesystem
    let layout = Layout::new(&info)?;
    let file_len = fs_size_calculator::image_size(info.block_count, info.block_size);

    // open image file and prepare to write fs components
    let image_file_path = image_file_path.as_ref();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(image_file_path)
        .with_context(|| format!("cannot create {}", image_file_path.display()))?;
    // all other region are set to zero using `set_len` method
    file.set_len(file_len)?;

    let file_mmap_area = unsafe { MmapMut::map_mut(&file)? };
    let mut volume = Volume::format(file_mmap_area, info, password)?;
    volume.unmount()?;

    println!(
        "created {} ({}), {} data blocks of {} bytes",
        image_file_path.display(),
        Byte::from_bytes(file_len as _).get_appropriate_unit(true),
        info.block_count - layout.data_start,
        info.block_size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{FileSystem, OpenMode},
        utils::init_test_environment::{small_geometry, TEST_PASSWORD},
        EfsError,
    };

    #[test]
    fn test_mkfs() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("part.dsk");
        let info = small_geometry();
        mkfs(&image, info, TEST_PASSWORD).unwrap();

        let len = std::fs::metadata(&image).unwrap().len();
        assert_eq!(len, fs_size_calculator::image_size(info.block_count, info.block_size));

        let mut fs = FileSystem::mount(&image, TEST_PASSWORD).unwrap();
        assert_eq!(fs.info(), info);
        assert_eq!(fs.entries().count(), 0);
        let data_start = Layout::new(&info).unwrap().data_start;
        assert_eq!(fs.free_blocks(), (info.block_count - data_start) as usize);

        let fd = fs.open_file("a.txt", OpenMode::Create).unwrap();
        fs.write_file(fd, b"persisted").unwrap();
        fs.close_fs().unwrap();

        let mut fs = FileSystem::mount(&image, TEST_PASSWORD).unwrap();
        let fd = fs.open_file("a.txt", OpenMode::ReadOnly).unwrap();
        assert_eq!(fs.read_file(fd, 9).unwrap(), b"persisted");
    }

    #[test]
    fn test_mkfs_refuses_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("part.dsk");
        mkfs(&image, small_geometry(), TEST_PASSWORD).unwrap();
        assert!(mkfs(&image, small_geometry(), TEST_PASSWORD).is_err());
    }

    #[test]
    fn test_mkfs_bad_geometry_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("part.dsk");
        let info = VolumeInfo {
            block_size: 100,
            ..small_geometry()
        };
        let err = mkfs(&image, info, TEST_PASSWORD).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EfsError>(),
            Some(EfsError::InvalidArgument(_))
        ));
        assert!(!image.exists());
    }

    #[test]
    fn test_mkfs_oversized_directory() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("part.dsk");
        let info = VolumeInfo {
            max_dir_entries: 200_000_000,
            ..VolumeInfo::default()
        };
        let err = mkfs(&image, info, TEST_PASSWORD).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EfsError>(),
            Some(EfsError::InvalidArgument(_))
        ));
        assert!(!image.exists());
    }

    #[test]
    fn test_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("part.dsk");
        mkfs(&image, small_geometry(), TEST_PASSWORD).unwrap();
        assert!(matches!(
            FileSystem::mount(&image, "2106s2"),
            Err(EfsError::InvalidPassword)
        ));
    }
}
