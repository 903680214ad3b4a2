use clap::Parser;

use crate::fs::VolumeInfo;

/// image the tools work on when `-p` is not given
pub const DEFAULT_IMAGE_PATH: &str = "part.dsk";

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum EfsCli {
    /// create and format a new volume image
    Mkfs(MkfsArgs),
    /// copy a host file into the volume
    Checkin(CheckinArgs),
    /// copy a file out of the volume
    Checkout(CheckoutArgs),
    /// delete a file from the volume
    Delfile(FileArgs),
    /// print `R` for a read-only file, `W` otherwise
    Getattr(FileArgs),
    /// set a file read-only (`R`) or read/write (`W`)
    Attrfile(AttrfileArgs),
    /// list every file on the volume
    Ls(VolumeArgs),
}

/// the image to work on and how to unlock it
#[derive(clap::Args, Debug, PartialEq)]
pub struct VolumeArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long, default_value = DEFAULT_IMAGE_PATH)]
    pub image_file_path: String,
    /// the volume password, prompted for when omitted
    #[clap(long)]
    pub password: Option<String>,
}

///make a new fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "make a new volume image")]
pub struct MkfsArgs {
    #[command(flatten)]
    pub volume: VolumeArgs,
    /// bytes per block, a power of two
    #[clap(short, long, default_value_t = 512)]
    pub block_size: u32,
    /// total blocks in the image
    #[clap(short = 'c', long, default_value_t = 2048)]
    pub block_count: u32,
    /// how many files may be open at once
    #[clap(long, default_value_t = 16)]
    pub max_files: u32,
    /// direct block pointers per inode
    #[clap(short = 'i', long, default_value_t = 64)]
    pub num_inode_entries: u32,
    #[clap(long, default_value_t = 32)]
    pub max_filename_length: u32,
    /// directory slots
    #[clap(short = 'd', long, default_value_t = 128)]
    pub max_dir_entries: u32,
}

impl MkfsArgs {
    pub fn volume_info(&self) -> VolumeInfo {
        VolumeInfo {
            block_size: self.block_size,
            block_count: self.block_count,
            max_files: self.max_files,
            num_inode_entries: self.num_inode_entries,
            max_filename_length: self.max_filename_length,
            max_dir_entries: self.max_dir_entries,
        }
    }
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct FileArgs {
    #[command(flatten)]
    pub volume: VolumeArgs,
    /// the file name inside the volume
    pub file: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct CheckinArgs {
    #[command(flatten)]
    pub volume: VolumeArgs,
    /// the host file to copy in
    pub file: String,
    /// name inside the volume, defaults to the host file name
    #[clap(short, long)]
    pub name: Option<String>,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct CheckoutArgs {
    #[command(flatten)]
    pub volume: VolumeArgs,
    /// the file name inside the volume
    pub file: String,
    /// where to write the copy, defaults to the file name
    #[clap(short, long)]
    pub output: Option<String>,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct AttrfileArgs {
    #[command(flatten)]
    pub volume: VolumeArgs,
    pub file: String,
    pub attribute: AttrArg,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrArg {
    /// read-only
    #[value(name = "R")]
    R,
    /// read/write
    #[value(name = "W")]
    W,
}
