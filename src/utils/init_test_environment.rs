//! fixtures shared by the unit tests
use crate::{
    fs::{FileSystem, Volume, VolumeInfo},
    utils::fs_size_calculator,
};

pub const TEST_PASSWORD: &str = "cs2106";

/// a small geometry: 32-byte blocks, 8 pointers per inode (256-byte files)
pub fn small_geometry() -> VolumeInfo {
    VolumeInfo {
        block_size: 32,
        block_count: 256,
        max_files: 4,
        num_inode_entries: 8,
        max_filename_length: 16,
        max_dir_entries: 8,
    }
}

/// format a zeroed in-memory image with the given geometry
pub fn init_test_volume(info: VolumeInfo) -> Volume<Vec<u8>> {
    let size = fs_size_calculator::image_size(info.block_count, info.block_size);
    let image = vec![0u8; size as usize];
    Volume::format(image, info, TEST_PASSWORD).expect("format in-memory volume failed")
}

/// mount a fresh in-memory session
pub fn init_test_environment(info: VolumeInfo) -> FileSystem<Volume<Vec<u8>>> {
    FileSystem::init(init_test_volume(info)).expect("mount in-memory volume failed")
}
