//! `cdx convert`

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use cdx::resample::{convert, ConversionOptions};

#[derive(Args)]
pub struct ConvertArgs {
    /// Continuous-delay input container
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Discrete-delay output container
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Delay grid sample rate, Hz
    #[arg(short = 's', long, value_name = "HZ")]
    sample_rate: f64,

    /// Margin before the smallest delay, seconds
    #[arg(short = 'b', long, value_name = "SECONDS")]
    delay_before: f64,

    /// Margin after the largest delay, seconds
    #[arg(short = 'a', long, value_name = "SECONDS")]
    delay_after: f64,

    /// Apply the frequency-domain Hamming filter
    #[arg(short = 'e', long)]
    enable_filtering: bool,

    /// Make delays relative to each snapshot's reference delay
    #[arg(short = 'r', long)]
    subtract_reference_delay: bool,

    /// Only resample components of this category
    #[arg(short = 't', long, value_name = "TYPE")]
    component_type: Option<u16>,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<usize>,

    /// Zlib level of the output chunks (0 stores raw)
    #[arg(short = 'z', long, default_value = "0", value_parser = clap::value_parser!(i32).range(0..=9))]
    compression: i32,
}

pub fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let options = ConversionOptions {
        sample_rate: args.sample_rate,
        delay_before_min: args.delay_before,
        delay_after_max: args.delay_after,
        enable_filtering: args.enable_filtering,
        subtract_reference_delay: args.subtract_reference_delay,
        component_type: args.component_type,
        threads: args.threads,
        compression_level: args.compression,
    };

    let report = convert(&args.input, &args.output, &options).with_context(|| {
        format!(
            "failed to convert {} to {}",
            args.input.display(),
            args.output.display()
        )
    })?;

    println!("Wrote {} ({} snapshots)", args.output.display(), report.snapshot_count);
    for link in &report.links {
        println!(
            "  {}: {} bins from {:.3e} s, {} components",
            link.link, link.grid_size, link.min_delay, link.component_count
        );
    }
    Ok(())
}
