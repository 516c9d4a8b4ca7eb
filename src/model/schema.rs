//! Names of the groups, arrays and scalars that make up a channel container.
//!
//! ```text
//! /                                  speed_of_light, snapshot_rate, transmitter_frequency,
//!                                    delay_representation, [delay_sample_rate], library
//! /links/<link>/reference_delays     f64 [n]
//! /links/<link>/cirs/<index>         component [m]        (continuous)
//! /links/<link>/component_types      component_type [k]   (continuous)
//! /links/<link>/delay_axis           f64 [grid]           (discrete)
//! /links/<link>/time_axis            f64 [n]              (discrete)
//! /links/<link>/amplitude_real|imag  f64 [grid][n]        (discrete)
//! ```

pub const SPEED_OF_LIGHT: &str = "speed_of_light";
pub const SNAPSHOT_RATE: &str = "snapshot_rate";
pub const TRANSMITTER_FREQUENCY: &str = "transmitter_frequency";
pub const DELAY_REPRESENTATION: &str = "delay_representation";
pub const DELAY_SAMPLE_RATE: &str = "delay_sample_rate";
/// Library version and build date that wrote the file.
pub const LIBRARY: &str = "library";

pub const LINKS: &str = "links";
pub const REFERENCE_DELAYS: &str = "reference_delays";
pub const CIRS: &str = "cirs";
pub const COMPONENT_TYPES: &str = "component_types";
pub const DELAY_AXIS: &str = "delay_axis";
pub const TIME_AXIS: &str = "time_axis";
pub const AMPLITUDE_REAL: &str = "amplitude_real";
pub const AMPLITUDE_IMAG: &str = "amplitude_imag";

/// Path of a link group.
pub fn link_path(link: &str) -> String {
    format!("/{}/{}", LINKS, link)
}

/// Library identification stored in the root `library` scalar.
pub fn library_id() -> String {
    format!(
        "cdx {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("CDX_BUILD_DATE").unwrap_or("unknown")
    )
}
