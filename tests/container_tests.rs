//! Integration tests for writing channel containers and verifying round-trip.

use std::collections::HashMap;

use cdx::file::{probe, ContinuousDelayReader, ContinuousDelayWriter, DiscreteDelayReader, DiscreteDelayWriter, WriterOptions};
use cdx::model::{ChannelParameters, Complex64, ComponentTypes, DelayRepresentation, MultipathComponent};
use cdx::util::StoreError;
use cdx::Error;

use tempfile::NamedTempFile;

const LINKS: [&str; 2] = ["tx-rx1", "tx-rx2"];

fn categories() -> HashMap<String, ComponentTypes> {
    LINKS
        .iter()
        .map(|l| {
            let mut t = ComponentTypes::new();
            t.insert(0, "line-of-sight".to_string());
            t.insert(256, "ground reflection".to_string());
            t.insert(300, "scatterer".to_string());
            (l.to_string(), t)
        })
        .collect()
}

/// Two components per link whose values depend on link and snapshot.
fn components(link: usize, i: usize) -> Vec<MultipathComponent> {
    let t = i as f64;
    let l = link as f64;
    vec![
        MultipathComponent::new(0, 0, 1.0e-6 + l * 1e-7 + t * 1e-12, Complex64::new(1.0 - t * 1e-5, l)),
        MultipathComponent::new(256, i as u64 + 1, 2.5e-6 + t * 3e-12, Complex64::new(-0.25, 0.5 + t * 1e-6)),
    ]
}

fn reference_delay(link: usize, i: usize) -> f64 {
    0.9e-6 + link as f64 * 1e-7 + i as f64 * 1e-12
}

#[test]
fn test_roundtrip_continuous_5000_snapshots() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    let params = ChannelParameters::new(1000.0, 5.9e9);
    let count = 5000;

    {
        let mut writer = ContinuousDelayWriter::create_with_options(
            path,
            params,
            LINKS,
            &categories(),
            WriterOptions { compression_level: 1 },
        )
        .expect("Failed to create container");

        for i in 0..count {
            let comps = LINKS
                .iter()
                .enumerate()
                .map(|(l, name)| (name.to_string(), components(l, i)))
                .collect();
            let refs = LINKS
                .iter()
                .enumerate()
                .map(|(l, name)| (name.to_string(), reference_delay(l, i)))
                .collect();
            writer.append_snapshot(&comps, &refs, i).expect("Failed to append");
        }
        assert_eq!(writer.snapshot_count(), count);
        writer.close().expect("Failed to close");
    }

    assert_eq!(probe(path).unwrap(), DelayRepresentation::Continuous);
    let reader = ContinuousDelayReader::open(path).expect("Failed to open container");
    assert_eq!(reader.parameters(), &params);
    assert_eq!(reader.snapshot_count(), count);
    assert!((reader.duration() - 5.0).abs() < 1e-12);

    let mut names = reader.link_names().to_vec();
    names.sort();
    assert_eq!(names, LINKS);

    for (l, link) in LINKS.iter().enumerate() {
        assert_eq!(reader.component_types(link).unwrap(), &categories()[*link]);
        let refs = reader.reference_delays(link).unwrap();
        assert_eq!(refs.len(), count);
        for i in (0..count).step_by(7) {
            // bit-exact
            assert_eq!(refs[i], reference_delay(l, i));
            assert_eq!(reader.components(link, i).unwrap(), components(l, i));
        }
        let last = reader.snapshot(link, count - 1).unwrap();
        assert_eq!(last.components, components(l, count - 1));
    }

    assert!(matches!(reader.components("tx-rx1", count), Err(Error::Validation(_))));
}

#[test]
fn test_snapshot_count_invariant() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    let mut writer =
        ContinuousDelayWriter::create(path, ChannelParameters::default(), LINKS, &categories()).unwrap();

    let batch = |i: usize, links: &[&str]| {
        let comps: HashMap<String, Vec<MultipathComponent>> =
            links.iter().map(|l| (l.to_string(), components(0, i))).collect();
        let refs: HashMap<String, f64> = links.iter().map(|l| (l.to_string(), 1e-6)).collect();
        (comps, refs)
    };

    for i in 0..3 {
        let (comps, refs) = batch(i, &LINKS);
        writer.append_snapshot(&comps, &refs, i).unwrap();
    }

    // wrong link sets and a repeated index are rejected as a whole
    let (comps, refs) = batch(3, &["tx-rx1"]);
    assert!(writer.append_snapshot(&comps, &refs, 3).is_err());
    let (comps, refs) = batch(3, &["tx-rx1", "tx-rx2", "tx-rx3"]);
    assert!(writer.append_snapshot(&comps, &refs, 3).is_err());
    let (comps, mut refs) = batch(3, &LINKS);
    refs.remove("tx-rx2");
    assert!(writer.append_snapshot(&comps, &refs, 3).is_err());
    let (comps, refs) = batch(1, &LINKS);
    assert!(writer.append_snapshot(&comps, &refs, 1).is_err());
    assert_eq!(writer.snapshot_count(), 3);
    writer.close().unwrap();

    let reader = ContinuousDelayReader::open(path).unwrap();
    assert_eq!(reader.snapshot_count(), 3);
    for link in LINKS {
        assert_eq!(reader.reference_delays(link).unwrap().len(), 3);
        for i in 0..3 {
            assert_eq!(reader.component_count(link, i).unwrap(), 2);
        }
    }
}

#[test]
fn test_roundtrip_discrete() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    let params = ChannelParameters::new(50.0, 2.4e9);
    let fs = 100e6;

    {
        let mut writer = DiscreteDelayWriter::create(path, params, fs, LINKS).unwrap();
        let g1 = writer.configure_link("tx-rx1", 16, 1.0e-6).unwrap();
        let g2 = writer.configure_link("tx-rx2", 9, 0.5e-6).unwrap();
        assert_eq!(g1.size, 16);
        assert_eq!(g2.sample_rate, fs);

        for i in 0..25 {
            let amps = HashMap::from([
                (
                    "tx-rx1".to_string(),
                    (0..16).map(|k| Complex64::new(k as f64, i as f64)).collect::<Vec<_>>(),
                ),
                (
                    "tx-rx2".to_string(),
                    (0..9).map(|k| Complex64::new(-(k as f64), 0.5 * i as f64)).collect(),
                ),
            ]);
            let refs = HashMap::from([("tx-rx1".to_string(), i as f64 * 1e-9), ("tx-rx2".to_string(), 0.0)]);
            writer.append_snapshot(&amps, &refs, i).unwrap();
        }
        writer.close().unwrap();
    }

    assert_eq!(probe(path).unwrap(), DelayRepresentation::Discrete);
    let reader = DiscreteDelayReader::open(path).expect("Failed to open container");
    assert_eq!(reader.snapshot_count(), 25);
    assert_eq!(reader.delay_sample_rate(), fs);

    let grid = reader.grid("tx-rx1").unwrap();
    assert_eq!(grid.size, 16);
    assert_eq!(grid.min_delay, 1.0e-6);
    let axis = reader.delay_axis("tx-rx1").unwrap();
    assert_eq!(axis.len(), 16);
    assert!((axis[15] - (1.0e-6 + 15.0 / fs)).abs() < 1e-18);

    let times = reader.time_axis("tx-rx2").unwrap();
    assert_eq!(times.len(), 25);
    assert_eq!(times[10], 10.0 / 50.0);

    let snap = reader.snapshot("tx-rx1", 7).unwrap();
    assert_eq!(snap.amplitudes.len(), 16);
    assert_eq!(snap.amplitudes[3], Complex64::new(3.0, 7.0));
    assert!((snap.reference_delay - 7e-9).abs() < 1e-20);

    let range = reader.snapshot_range("tx-rx2", 20, 5).unwrap();
    assert_eq!(range.len(), 5);
    assert_eq!(range[4].amplitudes[8], Complex64::new(-8.0, 12.0));

    let window = reader.snapshot_range_for_time(0.1, 0.2).unwrap();
    assert_eq!(window, 5..15);

    // opening with the wrong variant
    assert!(matches!(ContinuousDelayReader::open(path), Err(Error::Schema(_))));
}

#[test]
fn test_unfinalized_container_rejected() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    {
        let mut writer =
            ContinuousDelayWriter::create(path, ChannelParameters::default(), LINKS, &categories()).unwrap();
        let comps = LINKS.iter().map(|l| (l.to_string(), components(0, 0))).collect();
        let refs = LINKS.iter().map(|l| (l.to_string(), 0.0)).collect();
        writer.append_snapshot(&comps, &refs, 0).unwrap();
        // dropped without close
    }

    let err = ContinuousDelayReader::open(path).unwrap_err();
    assert!(
        matches!(err, Error::Store(StoreError::NotFinalized(_))),
        "unexpected error: {}",
        err
    );
}
