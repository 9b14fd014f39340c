//! Command-line front end for the Rock Ridge / ISO-9660 decoder: mount an
//! image read-only through FUSE, or inspect a single record without
//! mounting anything.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rockridge_core::access::Credentials;
use rockridge_core::callbacks::RockRidgeFs;
use rockridge_core::resolve::resolve;
use rockridge_core::volume::Image;
use rockridge_fuse::RockRidgeFuse;
use rockridge_io::MappedImage;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rockridge", version, about = "Read-only ISO-9660 + Rock Ridge tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount an image read-only at a directory via FUSE.
    Mount {
        /// Path to the disc image file.
        image: PathBuf,
        /// Directory to mount onto; must already exist.
        mount_point: PathBuf,
        /// Run FUSE in the foreground instead of daemonizing.
        #[arg(short, long)]
        foreground: bool,
    },
    /// Resolve a path inside the image and print its record and Rock Ridge
    /// attributes without mounting anything.
    Inspect {
        /// Path to the disc image file.
        image: PathBuf,
        /// Path inside the image, starting with `/`.
        path: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Mount {
            image,
            mount_point,
            foreground,
        } => cmd_mount(&image, &mount_point, foreground),
        Command::Inspect { image, path } => cmd_inspect(&image, &path),
    }
}

fn cmd_mount(image_path: &PathBuf, mount_point: &PathBuf, foreground: bool) -> Result<()> {
    // Mirrors the reference CLI's refusal to run as root: a read-only FUSE
    // mount has nothing to gain from root privileges and a lot to lose if
    // something in the decoder is wrong.
    // SAFETY: getuid/geteuid take no arguments and never fail.
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    if RockRidgeFs::refuses_root_mount(uid, unsafe { libc::geteuid() }) {
        bail!("running as root opens unacceptable security holes");
    }

    let mapped = MappedImage::open(image_path)
        .with_context(|| format!("opening {}", image_path.display()))?;
    let loaded = Image::load(mapped.data()).context("parsing volume descriptors")?;
    tracing::info!(volume_label = loaded.volume_label(), block_size = loaded.block_size(), "loaded image");

    let fs = RockRidgeFs::new(loaded, Credentials { uid, gid });
    let bridge = RockRidgeFuse::new(fs);

    let mut options = vec![fuser::MountOption::RO, fuser::MountOption::FSName("rockridge".to_string())];
    if foreground {
        options.push(fuser::MountOption::AllowOther);
    }

    fuser::mount2(bridge, mount_point, &options)
        .with_context(|| format!("mounting at {}", mount_point.display()))?;
    Ok(())
}

fn cmd_inspect(image_path: &PathBuf, path: &str) -> Result<()> {
    let mapped = MappedImage::open(image_path)
        .with_context(|| format!("opening {}", image_path.display()))?;
    let loaded = Image::load(mapped.data()).context("parsing volume descriptors")?;

    let resolved = resolve(&loaded, path).with_context(|| format!("resolving {path}"))?;
    let record = resolved.record;
    let rr = resolved.rock_ridge;

    println!("Basic File Information");
    println!("-------------------------");
    println!("Record Length:   0x{:02x} {} bytes", record.length, record.length);
    println!(
        "Extent Location: 0x{:08x} {} blocks",
        record.extent_location, record.extent_location
    );
    println!(
        "Extent Length:   0x{:08x} {} bytes",
        record.extent_length, record.extent_length
    );
    if let Some(ts) = record.recording_date.to_unix_timestamp() {
        println!("Date/Time: {}", format_timestamp(ts));
    }
    println!("Flags: {:02x}", record.file_flags);
    println!("Raw Filename: {}", String::from_utf8_lossy(record.filename));

    if rr.mode.is_some() || rr.name.is_some() || rr.inode.is_some() {
        println!();
        println!("Rock Ridge Extension Info");
        println!("-------------------------");
        if let Some(mode) = rr.mode {
            println!("Mode:   0{:04o}", mode);
            println!("#Links: {}", rr.nlinks.unwrap_or(1));
            println!("UID:    {}", rr.uid.unwrap_or(0));
            println!("GID:    {}", rr.gid.unwrap_or(0));
        }
        if let Some(inode) = rr.inode {
            println!("Inode:  {inode}");
        }
        if let Some(name) = &rr.name {
            println!("Filename: {}", String::from_utf8_lossy(name));
        }
        if let Some(ts) = rr.creation_time {
            println!("Creation:     {}", format_timestamp(ts));
        }
        if let Some(ts) = rr.modification_time {
            println!("Modification: {}", format_timestamp(ts));
        }
        if let Some(ts) = rr.access_time {
            println!("Access:       {}", format_timestamp(ts));
        }
    }

    Ok(())
}

fn format_timestamp(unix_time: i64) -> String {
    use chrono::{Local, TimeZone};
    match Local.timestamp_opt(unix_time, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "unknown".to_string(),
    }
}
