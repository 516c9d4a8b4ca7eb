//! `cdx analyze`

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use cdx::analysis::{self, PdpOptions};
use cdx::file::{probe, ContinuousDelayReader, DiscreteDelayReader};
use cdx::model::DelayRepresentation;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Statistic {
    /// Delay spread between earliest and latest echo
    Spread,
    /// Number of components
    Components,
    /// Sum of component magnitudes (coherent power for discrete containers)
    Power,
    /// Magnitude sums of line-of-sight and multipath categories
    LosMultipath,
    /// Power delay profile histogram
    Pdp,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Container to analyze
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Link name
    #[arg(short, long)]
    link: String,

    /// Statistic to compute
    #[arg(short = 'k', long, value_enum, default_value = "power")]
    statistic: Statistic,

    /// Window start, seconds
    #[arg(long, default_value = "0")]
    start: f64,

    /// Window length, seconds (0 runs to the end)
    #[arg(long, default_value = "0")]
    length: f64,
}

pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let path = &args.file;
    let repr = probe(path).with_context(|| format!("failed to open {}", path.display()))?;
    let (link, start, length) = (args.link.as_str(), args.start, args.length);

    if repr == DelayRepresentation::Discrete {
        if !matches!(args.statistic, Statistic::Power) {
            bail!("discrete-delay containers only support the power statistic");
        }
        let reader = DiscreteDelayReader::open(path)?;
        let series = analysis::discrete_channel_power(&reader, link, start, length)?;
        println!("time,power");
        for (t, p) in series.iter() {
            println!("{},{}", t, p);
        }
        return Ok(());
    }

    let reader = ContinuousDelayReader::open(path)?;
    match args.statistic {
        Statistic::Spread => {
            println!("time,spread");
            for (t, v) in analysis::multipath_spread(&reader, link, start, length)?.iter() {
                println!("{},{}", t, v);
            }
        }
        Statistic::Components => {
            println!("time,components");
            for (t, v) in analysis::component_counts(&reader, link, start, length)?.iter() {
                println!("{},{}", t, v);
            }
        }
        Statistic::Power => {
            println!("time,power");
            for (t, v) in analysis::channel_power(&reader, link, start, length)?.iter() {
                println!("{},{}", t, v);
            }
        }
        Statistic::LosMultipath => {
            println!("time,line_of_sight,multipath");
            for (t, v) in analysis::los_multipath_power(&reader, link, start, length)?.iter() {
                println!("{},{},{}", t, v.line_of_sight, v.multipath);
            }
        }
        Statistic::Pdp => {
            let pdp = analysis::power_delay_profile(&reader, link, &PdpOptions::default())?;
            println!("power_db,delay,probability");
            for (p, row) in pdp.power_axis.iter().zip(pdp.rows()) {
                for (d, v) in pdp.delay_axis.iter().zip(row) {
                    println!("{},{},{}", p, d, v);
                }
            }
        }
    }
    Ok(())
}
