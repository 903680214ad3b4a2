use clap::Parser;
use efs::{
    cli_interface::{AttrArg, EfsCli, VolumeArgs},
    commands,
    mount::with_session,
    EfsError,
};
use std::path::Path;

/// A CLI over an `efs` volume image. Every subcommand except `mkfs`
/// mounts the image, runs one operation and closes the session.
///
/// Failures exit with the errno of the underlying [EfsError].
fn main() {
    env_logger::builder().format_timestamp_nanos().init();
    let args = EfsCli::parse();
    if let Err(e) = run(args) {
        eprintln!("{e:#}");
        let code = e.downcast_ref::<EfsError>().map_or(1, EfsError::to_errno);
        std::process::exit(code);
    }
}

fn run(args: EfsCli) -> anyhow::Result<()> {
    match args {
        EfsCli::Mkfs(args) => {
            let password = password(&args.volume, "Please input a password for the new volume: ")?;
            efs::mkfs::mkfs(&args.volume.image_file_path, args.volume_info(), password)?;
        }
        EfsCli::Checkin(args) => {
            let source = Path::new(&args.file);
            let name = match &args.name {
                Some(name) => name.clone(),
                None => source
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| args.file.clone()),
            };
            let size = with_volume(&args.volume, |fs| commands::checkin(fs, source, &name))?;
            println!("Checked in {name} ({size} bytes)");
        }
        EfsCli::Checkout(args) => {
            let output = args.output.as_deref().unwrap_or(&args.file);
            with_volume(&args.volume, |fs| {
                commands::checkout(fs, &args.file, Path::new(output))
            })?;
            println!("Checked Out");
        }
        EfsCli::Delfile(args) => {
            with_volume(&args.volume, |fs| Ok(fs.del_file(&args.file)?))?;
        }
        EfsCli::Getattr(args) => {
            let attr = with_volume(&args.volume, |fs| commands::getattr(fs, &args.file))?;
            println!("{attr}");
        }
        EfsCli::Attrfile(args) => {
            let read_only = args.attribute == AttrArg::R;
            let attributes = with_volume(&args.volume, |fs| {
                commands::attrfile(fs, &args.file, read_only)
            })?;
            println!("New Attribute: {}", attributes.bits());
        }
        EfsCli::Ls(args) => {
            for line in with_volume(&args, |fs| Ok(commands::list(fs)))? {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn with_volume<T>(
    args: &VolumeArgs,
    f: impl FnOnce(&mut efs::mount::ImageFileSystem) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let password = password(args, "Please input the volume password: ")?;
    with_session(&args.image_file_path, password, f)
}

fn password(args: &VolumeArgs, prompt: &str) -> anyhow::Result<String> {
    match &args.password {
        Some(password) => Ok(password.clone()),
        None => Ok(rpassword::prompt_password(prompt)?),
    }
}
