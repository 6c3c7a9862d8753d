//! RamLUN Binary
//!
//! Creates an in-memory LUN and drives a synthetic workload against it.

use clap::{Parser, Subcommand};
use ramlun::{IoOutcome, Lun, LunConfig, LunError, UnmapRange};
use tracing_subscriber::{fmt, EnvFilter};

/// RamLUN workload driver
#[derive(Parser, Debug)]
#[command(name = "ramlun")]
#[command(about = "In-memory block backend: ramdisk or black hole")]
#[command(version)]
struct Args {
    /// Logical block size in bytes
    #[arg(short, long, default_value = "512")]
    block_size: u32,

    /// Backing page size in bytes
    #[arg(short, long, default_value = "4096")]
    page_size: u32,

    /// Ramdisk capacity in MB (0 selects the black hole, which needs --size-mb)
    #[arg(short, long, default_value = "64")]
    capacity_mb: u64,

    /// Logical LUN size in MB (0 = same as capacity; required for the black hole)
    #[arg(short, long, default_value = "0")]
    size_mb: u64,

    /// Maximum scatter/gather segments per data move
    #[arg(long, default_value = "32")]
    max_segments: usize,

    /// Continuation worker threads
    #[arg(short, long, default_value = "4")]
    workers: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fill a block range with a byte pattern, then verify it
    Fill {
        /// First block
        #[arg(long, default_value = "0")]
        lba: u64,

        /// Number of blocks
        blocks: u64,

        /// Fill byte
        #[arg(long, default_value = "165")]
        byte: u8,
    },

    /// Write, verify and unmap rolling extents until capacity runs out
    Exercise {
        /// Blocks per extent
        #[arg(long, default_value = "256")]
        extent_blocks: u64,

        /// Number of passes over the device
        #[arg(long, default_value = "2")]
        passes: u32,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ramlun=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("RamLUN v{}", ramlun::VERSION);

    let lun = match lun_config(&args).and_then(Lun::create) {
        Ok(lun) => lun,
        Err(e) => {
            tracing::error!("Failed to create LUN: {}", e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Fill { lba, blocks, byte } => fill(&lun, lba, blocks, byte),
        Commands::Exercise { extent_blocks, passes } => exercise(&lun, extent_blocks, passes),
    };

    report(&lun);
    lun.shutdown();

    if let Err(e) = result {
        tracing::error!("Workload failed: {}", e);
        std::process::exit(1);
    }
}

/// LUN configuration from the command line flags
fn lun_config(args: &Args) -> ramlun::Result<LunConfig> {
    if args.capacity_mb == 0 && args.size_mb == 0 {
        return Err(LunError::InvalidConfig(
            "--capacity-mb 0 selects the black hole, which needs --size-mb".into(),
        ));
    }

    let builder = LunConfig::builder()
        .block_size(args.block_size)
        .page_size(args.page_size)
        .size_bytes(args.size_mb * 1024 * 1024)
        .max_segments(args.max_segments)
        .worker_threads(args.workers);
    let builder = if args.capacity_mb == 0 {
        builder.black_hole()
    } else {
        builder.ramdisk(args.capacity_mb * 1024 * 1024)
    };
    Ok(builder.build())
}

fn fill(lun: &Lun, lba: u64, blocks: u64, byte: u8) -> ramlun::Result<()> {
    let data = vec![byte; lun.geometry().bytes(blocks)];
    lun.write(lba, &data)?;

    match lun.compare(lba, &data)? {
        IoOutcome::Success => tracing::info!(lba, blocks, "Fill verified"),
        IoOutcome::Miscompare { offset } => tracing::warn!(lba, blocks, offset, "Fill miscompare"),
    }
    Ok(())
}

fn exercise(lun: &Lun, extent_blocks: u64, passes: u32) -> ramlun::Result<()> {
    let size_blocks = lun.size_blocks();
    let extent_blocks = extent_blocks.clamp(1, size_blocks);

    for pass in 0..passes {
        let mut lba = 0;
        let mut written = 0u64;
        while lba + extent_blocks <= size_blocks {
            let data = vec![(lba as u8) ^ (pass as u8); lun.geometry().bytes(extent_blocks)];
            match lun.write(lba, &data) {
                Ok(()) => written += extent_blocks,
                Err(e) if e.is_no_space() => {
                    tracing::warn!(pass, lba, "Capacity exhausted, releasing written extents");
                    break;
                }
                Err(e) => return Err(e),
            }
            if let IoOutcome::Miscompare { offset } = lun.compare(lba, &data)? {
                tracing::warn!(pass, lba, offset, "Miscompare");
            }
            lba += extent_blocks;
        }

        tracing::info!(pass, written, capacity_used = lun.capacity_used(), "Pass written");
        // A failed extent may have left pages behind, so release the whole device
        lun.unmap(&[UnmapRange::unmap(0, size_blocks)])?;
    }
    Ok(())
}

fn report(lun: &Lun) {
    let attributes = lun.attributes();
    tracing::info!(
        blocks_used = ?attributes.blocks_used,
        blocks_available = ?attributes.blocks_available,
        tree_depth = lun.tree_depth(),
        "LUN attributes"
    );
}
