//! `cdx info`

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use cdx::file::{probe, ContinuousDelayReader, DiscreteDelayReader};
use cdx::model::{ChannelParameters, DelayRepresentation};
use tracing::debug;

#[derive(Args)]
pub struct InfoArgs {
    /// Container to inspect
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

fn print_parameters(repr: DelayRepresentation, params: &ChannelParameters, snapshots: usize, duration: f64) {
    println!("Representation:        {}", repr);
    println!("Speed of light:        {} m/s", params.speed_of_light);
    println!("Snapshot rate:         {} Hz", params.snapshot_rate);
    println!("Transmitter frequency: {} Hz", params.transmitter_frequency);
    println!("Wavelength:            {:.4} m", params.wavelength());
    println!("Snapshots:             {} ({:.3} s)", snapshots, duration);
}

pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let path = &args.file;
    let repr = probe(path).with_context(|| format!("failed to open {}", path.display()))?;
    debug!("{} is {}", path.display(), repr);

    println!("Container: {}", path.display());
    match repr {
        DelayRepresentation::Continuous => {
            let reader = ContinuousDelayReader::open(path)?;
            print_parameters(repr, reader.parameters(), reader.snapshot_count(), reader.duration());
            println!();
            println!("Links: {}", reader.link_count());
            for link in reader.link_names() {
                let mut components = 0usize;
                for index in 0..reader.snapshot_count() {
                    components += reader.component_count(link, index)?;
                }
                println!("  {} ({} components)", link, components);
                for (code, name) in reader.component_types(link)? {
                    println!("    type {:>5}: {}", code, name);
                }
            }
        }
        DelayRepresentation::Discrete => {
            let reader = DiscreteDelayReader::open(path)?;
            print_parameters(repr, reader.parameters(), reader.snapshot_count(), reader.duration());
            println!("Delay sample rate:     {} Hz", reader.delay_sample_rate());
            println!();
            println!("Links: {}", reader.link_count());
            for link in reader.link_names() {
                match reader.grid(link) {
                    Ok(grid) => println!(
                        "  {}: {} bins, {:.3e}..{:.3e} s",
                        link,
                        grid.size,
                        grid.min_delay,
                        grid.max_delay()
                    ),
                    Err(_) => println!("  {}: no delay grid", link),
                }
            }
        }
    }
    Ok(())
}
