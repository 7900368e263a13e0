//! isoeditor CLI
//!
//! Embeds ignition configs, ramdisks and kernel arguments into CoreOS
//! installer ISOs. The source image is only ever read; results are written
//! to new files.
//!
//! # Usage
//!
//! ```bash
//! # Embed an ignition config and kernel arguments into a copy of the ISO
//! isoeditor embed rhcos.iso -o custom.iso --ignition config.ign --karg ip=dhcp
//!
//! # Same, but kernel arguments first
//! isoeditor embed rhcos.iso -o custom.iso --ignition config.ign --karg ip=dhcp --order kargs,ignition
//!
//! # Write just the file that holds the ignition area (plus metadata if it grew)
//! isoeditor ignition-extract rhcos.iso --ignition config.ign -o out/
//!
//! # Append an ignition archive to a PXE initramfs
//! isoeditor initramfs-append initrd.img --ignition config.ign -o initrd-custom.img
//!
//! # Show where an embed area lives
//! isoeditor region rhcos.iso /EFI/redhat/grub.cfg --marker
//!
//! # Build a ramdisk carrying nmstatectl
//! isoeditor nmstate-ramdisk rootfs.img -o nmstate.img
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default `warn`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use isoeditor::artifact::initramfs::{new_initramfs_append_reader_with_level, patch_initrd_addrsize};
use isoeditor::artifact::NmstateHandler;
use isoeditor::config::EditorConfig;
use isoeditor::embed::{compose_image, EmbedPlan, IgnitionContent, KernelArgument};
use isoeditor::isolate::{ignition_image_files, kargs_files_data, FileData};
use isoeditor::preflight::PreflightChecker;
use isoeditor::process::CommandExecutor;
use isoeditor::{find_marker_region, find_region, Marker};

#[derive(Parser)]
#[command(name = "isoeditor")]
#[command(author, version, about = "Virtual ISO/initramfs editor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct IgnitionArgs {
    /// Ignition config to embed
    #[arg(long)]
    ignition: Option<PathBuf>,

    /// System config for usr/lib/ignition/base.d (repeatable)
    #[arg(long = "system-config")]
    system_configs: Vec<PathBuf>,
}

impl IgnitionArgs {
    fn is_empty(&self) -> bool {
        self.ignition.is_none() && self.system_configs.is_empty()
    }

    fn load(&self) -> Result<IgnitionContent> {
        let mut content = IgnitionContent::default();
        if let Some(path) = &self.ignition {
            content.config =
                Some(fs::read(path).with_context(|| format!("reading {}", path.display()))?);
        }
        for path in &self.system_configs {
            let name = path
                .file_name()
                .with_context(|| format!("{} has no file name", path.display()))?
                .to_string_lossy()
                .into_owned();
            let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            content.system_configs.insert(name, data);
        }
        Ok(content)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LayerKind {
    Ignition,
    Ramdisk,
    Kargs,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a copy of an ISO with content embedded
    Embed {
        /// Source ISO
        image: PathBuf,

        /// Output ISO
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        ignition: IgnitionArgs,

        /// Ramdisk archive for the custom ramdisk area
        #[arg(long)]
        ramdisk: Option<PathBuf>,

        /// Kernel argument to append (repeatable)
        #[arg(long = "karg")]
        kargs: Vec<String>,

        /// Order in which layers are applied
        #[arg(long, value_enum, value_delimiter = ',', default_values_t = [LayerKind::Ignition, LayerKind::Ramdisk, LayerKind::Kargs])]
        order: Vec<LayerKind>,
    },

    /// Write the file holding the ignition area, with ignition embedded
    IgnitionExtract {
        /// Source ISO
        image: PathBuf,

        #[command(flatten)]
        ignition: IgnitionArgs,

        /// Output directory (image paths are recreated below it)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a PXE initramfs with an ignition archive appended
    InitramfsAppend {
        /// Source initramfs
        initramfs: PathBuf,

        #[command(flatten)]
        ignition: IgnitionArgs,

        /// Output initramfs
        #[arg(short, long)]
        output: PathBuf,

        /// Original initrd.addrsize to patch for the new initramfs
        #[arg(long, requires = "addrsize_output")]
        addrsize: Option<PathBuf>,

        /// Where to write the patched initrd.addrsize
        #[arg(long)]
        addrsize_output: Option<PathBuf>,
    },

    /// Write each kernel argument config file with arguments embedded
    KargsExtract {
        /// Source ISO
        image: PathBuf,

        /// Kernel argument to append (repeatable)
        #[arg(long = "karg", required = true)]
        kargs: Vec<String>,

        /// Output directory (image paths are recreated below it)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the offset and length of a file or marker region
    Region {
        /// Source ISO
        image: PathBuf,

        /// Path inside the image
        path: String,

        /// Report the kernel argument embed area inside the file
        #[arg(long)]
        marker: bool,
    },

    /// Build a ramdisk carrying nmstatectl from a rootfs image
    NmstateRamdisk {
        /// rootfs image (CPIO holding root.squashfs)
        rootfs: PathBuf,

        /// Output ramdisk
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check host prerequisites for nmstate-ramdisk
    Preflight,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = EditorConfig::from_env()
        .context("loading configuration")
        .and_then(|config| run(cli.command, &config));

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

fn run(command: Commands, config: &EditorConfig) -> Result<()> {
    match command {
        Commands::Embed {
            image,
            output,
            ignition,
            ramdisk,
            kargs,
            order,
        } => cmd_embed(&image, &output, &ignition, ramdisk.as_deref(), &kargs, &order, config),
        Commands::IgnitionExtract {
            image,
            ignition,
            output,
        } => cmd_ignition_extract(&image, &ignition, &output, config),
        Commands::InitramfsAppend {
            initramfs,
            ignition,
            output,
            addrsize,
            addrsize_output,
        } => cmd_initramfs_append(
            &initramfs,
            &ignition,
            &output,
            addrsize.as_deref().zip(addrsize_output.as_deref()),
            config,
        ),
        Commands::KargsExtract {
            image,
            kargs,
            output,
        } => cmd_kargs_extract(&image, &kargs, &output, config),
        Commands::Region {
            image,
            path,
            marker,
        } => cmd_region(&image, &path, marker),
        Commands::NmstateRamdisk { rootfs, output } => cmd_nmstate_ramdisk(&rootfs, &output, config),
        Commands::Preflight => cmd_preflight(config),
    }
}

fn to_kargs(values: &[String]) -> Vec<KernelArgument> {
    values.iter().map(KernelArgument::append).collect()
}

fn cmd_embed(
    image: &Path,
    output: &Path,
    ignition: &IgnitionArgs,
    ramdisk: Option<&Path>,
    kargs: &[String],
    order: &[LayerKind],
    config: &EditorConfig,
) -> Result<()> {
    let mut plan = EmbedPlan::new();
    for kind in order {
        plan = match kind {
            LayerKind::Ignition if !ignition.is_empty() => plan.ignition(ignition.load()?),
            LayerKind::Ramdisk => match ramdisk {
                Some(path) => plan.ramdisk(
                    fs::read(path).with_context(|| format!("reading {}", path.display()))?,
                ),
                None => plan,
            },
            LayerKind::Kargs if !kargs.is_empty() => plan.kernel_arguments(to_kargs(kargs)),
            _ => plan,
        };
    }

    if plan.is_empty() {
        anyhow::bail!("Nothing to embed: pass --ignition, --system-config, --ramdisk or --karg");
    }

    println!("Embedding {} layer(s) into {}...", plan.layers().len(), image.display());
    let mut reader = compose_image(image, &plan, config)?;
    let written = write_stream(&mut reader, output)?;
    println!("Wrote {} ({} bytes)", output.display(), written);
    Ok(())
}

fn cmd_ignition_extract(
    image: &Path,
    ignition: &IgnitionArgs,
    output: &Path,
    config: &EditorConfig,
) -> Result<()> {
    let files = ignition_image_files(image, &ignition.load()?, config)?;
    if files.len() > 1 {
        println!("Ignition area expanded; writing updated metadata");
    }
    write_files(files, output)
}

fn cmd_initramfs_append(
    initramfs: &Path,
    ignition: &IgnitionArgs,
    output: &Path,
    addrsize: Option<(&Path, &Path)>,
    config: &EditorConfig,
) -> Result<()> {
    let base = File::open(initramfs).with_context(|| format!("opening {}", initramfs.display()))?;
    let mut reader = new_initramfs_append_reader_with_level(base, &ignition.load()?, config.gzip_level)?;

    if let Some((original, patched_path)) = addrsize {
        let original_file =
            File::open(original).with_context(|| format!("opening {}", original.display()))?;
        let patched = patch_initrd_addrsize(original_file, &mut reader)?;
        fs::write(patched_path, patched)
            .with_context(|| format!("writing {}", patched_path.display()))?;
        println!("Wrote {}", patched_path.display());
    }

    let written = write_stream(&mut reader, output)?;
    println!("Wrote {} ({} bytes)", output.display(), written);
    Ok(())
}

fn cmd_kargs_extract(image: &Path, kargs: &[String], output: &Path, config: &EditorConfig) -> Result<()> {
    let files = kargs_files_data(image, &to_kargs(kargs), config)?;
    write_files(files, output)
}

fn cmd_region(image: &Path, path: &str, marker: bool) -> Result<()> {
    let region = if marker {
        find_marker_region(path, image, &Marker::karg_embed_area()?)?
    } else {
        find_region(path, image)?
    };
    println!("{} offset={} length={}", region.file_path, region.offset, region.length);
    Ok(())
}

fn cmd_nmstate_ramdisk(rootfs: &Path, output: &Path, config: &EditorConfig) -> Result<()> {
    let report = PreflightChecker::new(config.clone()).run_all();
    if !report.is_ok() {
        report.print_summary();
        anyhow::bail!("Preflight checks failed");
    }

    println!("Extracting nmstatectl from {}...", rootfs.display());
    let handler = NmstateHandler::new(CommandExecutor, config.clone());
    let archive = handler.build_nmstate_ramdisk(rootfs)?;
    fs::write(output, &archive).with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), archive.len());
    Ok(())
}

fn cmd_preflight(config: &EditorConfig) -> Result<()> {
    let report = PreflightChecker::new(config.clone()).run_all();
    report.print_summary();
    if !report.is_ok() {
        anyhow::bail!("Preflight checks failed");
    }
    Ok(())
}

fn write_stream(reader: &mut impl io::Read, output: &Path) -> Result<u64> {
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let written = io::copy(reader, &mut writer).with_context(|| format!("writing {}", output.display()))?;
    writer.flush().with_context(|| format!("flushing {}", output.display()))?;
    Ok(written)
}

fn write_files(files: Vec<FileData>, dir: &Path) -> Result<()> {
    for mut file in files {
        let dest = dir.join(file.filename.trim_start_matches('/'));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let written = write_stream(&mut file.data, &dest)?;
        println!("Wrote {} ({} bytes)", dest.display(), written);
    }
    Ok(())
}
