//! Multipath components and snapshots.

use rustfft::num_complex::Complex64;

use crate::store::ComponentRecord;

/// Component categories of a link: category id -> name.
pub type ComponentTypes = std::collections::BTreeMap<u16, String>;

/// One echo of a channel impulse response.
///
/// `id` is unique only within one snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MultipathComponent {
    /// Application-defined category (line-of-sight, scatterer, ...).
    pub kind: u16,
    pub id: u64,
    /// Delay, seconds.
    pub delay: f64,
    pub amplitude: Complex64,
}

impl MultipathComponent {
    pub fn new(kind: u16, id: u64, delay: f64, amplitude: Complex64) -> Self {
        Self {
            kind,
            id,
            delay,
            amplitude,
        }
    }

    /// Magnitude of the complex amplitude.
    #[inline]
    pub fn magnitude(&self) -> f64 {
        self.amplitude.norm()
    }
}

impl From<MultipathComponent> for ComponentRecord {
    fn from(c: MultipathComponent) -> Self {
        Self {
            kind: c.kind,
            id: c.id,
            delay: c.delay,
            real: c.amplitude.re,
            imag: c.amplitude.im,
        }
    }
}

impl From<ComponentRecord> for MultipathComponent {
    fn from(r: ComponentRecord) -> Self {
        Self {
            kind: r.kind,
            id: r.id,
            delay: r.delay,
            amplitude: Complex64::new(r.real, r.imag),
        }
    }
}

/// Sparse snapshot: components with exact delays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContinuousSnapshot {
    pub components: Vec<MultipathComponent>,
    /// Straight-line propagation delay at this instant, seconds.
    pub reference_delay: f64,
}

impl ContinuousSnapshot {
    /// Smallest and largest component delay, `None` without components.
    pub fn delay_bounds(&self) -> Option<(f64, f64)> {
        self.components.iter().fold(None, |acc, c| match acc {
            None => Some((c.delay, c.delay)),
            Some((lo, hi)) => Some((lo.min(c.delay), hi.max(c.delay))),
        })
    }
}

/// Dense snapshot: amplitudes on the link's delay grid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscreteSnapshot {
    pub amplitudes: Vec<Complex64>,
    pub reference_delay: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_conversion() {
        let c = MultipathComponent::new(2, 7, 3.5e-7, Complex64::new(0.1, -0.2));
        let rec = ComponentRecord::from(c);
        assert_eq!(rec.real, 0.1);
        assert_eq!(rec.imag, -0.2);
        assert_eq!(MultipathComponent::from(rec), c);
    }

    #[test]
    fn test_delay_bounds() {
        let mut snap = ContinuousSnapshot::default();
        assert_eq!(snap.delay_bounds(), None);

        snap.components.push(MultipathComponent::new(0, 0, 2e-6, Complex64::new(1.0, 0.0)));
        snap.components.push(MultipathComponent::new(1, 1, 1e-6, Complex64::new(0.5, 0.0)));
        snap.components.push(MultipathComponent::new(1, 2, 4e-6, Complex64::new(0.2, 0.0)));
        assert_eq!(snap.delay_bounds(), Some((1e-6, 4e-6)));
    }
}
