//! Continuous-delay containers.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::Path;

use tracing::{debug, info};

use super::{read_parameters, schema_error, time_window, write_parameters, WriterOptions};
use crate::model::schema;
use crate::model::{
    ChannelParameters, ComponentTypes, ContinuousSnapshot, DelayRepresentation, LinkSet,
    MultipathComponent,
};
use crate::store::{
    ArrayId, ArraySpec, ComponentRecord, ComponentTypeRecord, Group, GroupId, StoreReader,
    StoreWriter,
};
use crate::util::{Error, Result};

/// Write-side state of one link.
struct ContinuousLink {
    cirs: GroupId,
    reference_delays: ArrayId,
}

/// Writer for continuous-delay containers.
///
/// ```ignore
/// let mut writer = ContinuousDelayWriter::create("run.cdx", params, ["tx-rx"], &types)?;
/// writer.append_snapshot(&components, &reference_delays, 0)?;
/// writer.close()?;
/// ```
pub struct ContinuousDelayWriter {
    store: StoreWriter,
    params: ChannelParameters,
    links: LinkSet,
    meta: Vec<ContinuousLink>,
    snapshot_count: usize,
}

impl ContinuousDelayWriter {
    /// Create a container with one category map per link.
    pub fn create<I, S>(
        path: impl AsRef<Path>,
        params: ChannelParameters,
        link_names: I,
        component_types: &HashMap<String, ComponentTypes>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::create_with_options(path, params, link_names, component_types, WriterOptions::default())
    }

    /// Create a container with explicit writer options.
    pub fn create_with_options<I, S>(
        path: impl AsRef<Path>,
        params: ChannelParameters,
        link_names: I,
        component_types: &HashMap<String, ComponentTypes>,
        options: WriterOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let links = LinkSet::new(link_names)?;
        if component_types.len() != links.len() {
            return Err(Error::validation(format!(
                "{} component type maps given for {} links",
                component_types.len(),
                links.len()
            )));
        }
        links.check_keys(component_types, "component types")?;
        params.validate()?;

        let mut store = StoreWriter::create_with_options(path.as_ref(), options.into())?;
        let links_group = write_parameters(&mut store, &params, DelayRepresentation::Continuous)?;

        let mut meta = Vec::with_capacity(links.len());
        for name in &links {
            let group = store.create_group(links_group, name)?;
            let records: Vec<ComponentTypeRecord> = component_types[name.as_str()]
                .iter()
                .map(|(&id, name)| ComponentTypeRecord {
                    id,
                    name: name.clone(),
                })
                .collect();
            store.write_array(group, schema::COMPONENT_TYPES, &records)?;
            let reference_delays = store.create_array::<f64>(
                group,
                schema::REFERENCE_DELAYS,
                ArraySpec::growable(&[0], &[0]),
            )?;
            let cirs = store.create_group(group, schema::CIRS)?;
            meta.push(ContinuousLink {
                cirs,
                reference_delays,
            });
        }

        info!(
            "created continuous-delay container {} with {} links",
            path.as_ref().display(),
            links.len()
        );
        Ok(Self {
            store,
            params,
            links,
            meta,
            snapshot_count: 0,
        })
    }

    /// Channel parameters.
    pub fn parameters(&self) -> &ChannelParameters {
        &self.params
    }

    /// Declared links.
    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    /// Number of snapshots appended so far.
    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    /// Append snapshot `snapshot_index` for every link.
    ///
    /// Both maps must hold exactly the declared links and `snapshot_index`
    /// must equal [`snapshot_count`](Self::snapshot_count). Nothing is
    /// written when validation fails.
    pub fn append_snapshot(
        &mut self,
        components: &HashMap<String, Vec<MultipathComponent>>,
        reference_delays: &HashMap<String, f64>,
        snapshot_index: usize,
    ) -> Result<()> {
        self.links.check_keys(components, "components")?;
        self.links.check_keys(reference_delays, "reference delays")?;
        if snapshot_index != self.snapshot_count {
            return Err(Error::validation(format!(
                "snapshot index {} out of order, expected {}",
                snapshot_index, self.snapshot_count
            )));
        }

        let n = self.snapshot_count as u64;
        let name = snapshot_index.to_string();
        for (link, meta) in self.links.names().iter().zip(&self.meta) {
            let failed = |e| Error::append(link, snapshot_index, e);
            let ref_delay = reference_delays[link.as_str()];
            self.store
                .extend_array(meta.reference_delays, &[n + 1])
                .map_err(failed)?;
            self.store
                .write_slice(meta.reference_delays, &[n], &[1], &[ref_delay])
                .map_err(failed)?;

            let records: Vec<ComponentRecord> = components[link.as_str()]
                .iter()
                .map(|&c| ComponentRecord::from(c))
                .collect();
            self.store
                .write_array(meta.cirs, &name, &records)
                .map_err(failed)?;
        }

        self.snapshot_count += 1;
        Ok(())
    }

    /// Finalize the container.
    pub fn close(self) -> Result<()> {
        debug!("closing continuous-delay container after {} snapshots", self.snapshot_count);
        self.store.close()?;
        Ok(())
    }
}

/// Read-side state of one link.
struct LinkEntry {
    cirs: Group,
    component_types: ComponentTypes,
    reference_delays: Vec<f64>,
}

/// Reader for continuous-delay containers.
pub struct ContinuousDelayReader {
    store: StoreReader,
    params: ChannelParameters,
    link_names: Vec<String>,
    links: HashMap<String, LinkEntry>,
    snapshot_count: usize,
}

impl fmt::Debug for ContinuousDelayReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousDelayReader")
            .field("path", &self.store.path())
            .field("links", &self.link_names)
            .field("snapshot_count", &self.snapshot_count)
            .finish()
    }
}

impl ContinuousDelayReader {
    /// Open a finalized continuous-delay container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = StoreReader::open(path)?;
        let (params, link_names) = read_parameters(&store, DelayRepresentation::Continuous)?;

        let mut links = HashMap::with_capacity(link_names.len());
        let mut counts: Vec<(String, usize)> = Vec::with_capacity(link_names.len());
        for name in &link_names {
            let group = store.group(&schema::link_path(name)).map_err(schema_error)?;
            let reference_delays: Vec<f64> = group
                .array(schema::REFERENCE_DELAYS)
                .and_then(|a| a.read_all())
                .map_err(schema_error)?;
            let component_types: ComponentTypes = group
                .array(schema::COMPONENT_TYPES)
                .and_then(|a| a.read_all::<ComponentTypeRecord>())
                .map_err(schema_error)?
                .into_iter()
                .map(|r| (r.id, r.name))
                .collect();
            let cirs = group.group(schema::CIRS).map_err(schema_error)?;

            if cirs.num_children() != reference_delays.len() {
                return Err(Error::consistency(format!(
                    "link '{}' holds {} snapshots but {} reference delays",
                    name,
                    cirs.num_children(),
                    reference_delays.len()
                )));
            }
            counts.push((name.clone(), reference_delays.len()));
            links.insert(
                name.clone(),
                LinkEntry {
                    cirs,
                    component_types,
                    reference_delays,
                },
            );
        }

        let snapshot_count = counts.first().map(|(_, c)| *c).unwrap_or(0);
        if let Some((name, count)) = counts.iter().find(|(_, c)| *c != snapshot_count) {
            return Err(Error::consistency(format!(
                "link '{}' has {} snapshots, link '{}' has {}",
                name, count, counts[0].0, snapshot_count
            )));
        }

        Ok(Self {
            store,
            params,
            link_names,
            links,
            snapshot_count,
        })
    }

    fn link(&self, name: &str) -> Result<&LinkEntry> {
        self.links
            .get(name)
            .ok_or_else(|| Error::validation(format!("unknown link '{}'", name)))
    }

    /// Underlying container path.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Channel parameters.
    pub fn parameters(&self) -> &ChannelParameters {
        &self.params
    }

    pub fn speed_of_light(&self) -> f64 {
        self.params.speed_of_light
    }

    pub fn snapshot_rate(&self) -> f64 {
        self.params.snapshot_rate
    }

    pub fn snapshot_interval(&self) -> f64 {
        self.params.snapshot_interval()
    }

    pub fn transmitter_frequency(&self) -> f64 {
        self.params.transmitter_frequency
    }

    /// Link names in stored order.
    pub fn link_names(&self) -> &[String] {
        &self.link_names
    }

    pub fn link_count(&self) -> usize {
        self.link_names.len()
    }

    /// Number of snapshots, identical for every link.
    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    /// Covered time span, seconds.
    pub fn duration(&self) -> f64 {
        self.snapshot_count as f64 / self.params.snapshot_rate
    }

    /// Category map of a link.
    pub fn component_types(&self, link: &str) -> Result<&ComponentTypes> {
        Ok(&self.link(link)?.component_types)
    }

    /// All reference delays of a link.
    pub fn reference_delays(&self, link: &str) -> Result<&[f64]> {
        Ok(&self.link(link)?.reference_delays)
    }

    pub fn reference_delay(&self, link: &str, index: usize) -> Result<f64> {
        self.check_index(link, index)?;
        Ok(self.link(link)?.reference_delays[index])
    }

    fn check_index(&self, link: &str, index: usize) -> Result<()> {
        if index >= self.snapshot_count {
            return Err(Error::validation(format!(
                "snapshot {} of link '{}' out of range ({} snapshots)",
                index, link, self.snapshot_count
            )));
        }
        Ok(())
    }

    /// Number of components in one snapshot.
    pub fn component_count(&self, link: &str, index: usize) -> Result<usize> {
        self.check_index(link, index)?;
        let array = self
            .link(link)?
            .cirs
            .array(&index.to_string())
            .map_err(schema_error)?;
        Ok(array.len())
    }

    /// Components of one snapshot.
    pub fn components(&self, link: &str, index: usize) -> Result<Vec<MultipathComponent>> {
        self.check_index(link, index)?;
        let records = self
            .link(link)?
            .cirs
            .array(&index.to_string())
            .and_then(|a| a.read_all::<ComponentRecord>())
            .map_err(schema_error)?;
        Ok(records.into_iter().map(MultipathComponent::from).collect())
    }

    /// One snapshot with its reference delay.
    pub fn snapshot(&self, link: &str, index: usize) -> Result<ContinuousSnapshot> {
        Ok(ContinuousSnapshot {
            components: self.components(link, index)?,
            reference_delay: self.reference_delay(link, index)?,
        })
    }

    /// Snapshots of a link in index order.
    pub fn snapshots(&self, link: &str, range: Range<usize>) -> Result<Vec<ContinuousSnapshot>> {
        range.map(|i| self.snapshot(link, i)).collect()
    }

    /// Snapshot index range covering a time window (`length == 0`: to the end).
    pub fn snapshot_range_for_time(&self, start_time: f64, length: f64) -> Result<Range<usize>> {
        time_window(self.snapshot_count, self.params.snapshot_rate, start_time, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Complex64;
    use tempfile::NamedTempFile;

    fn types(links: &[&str]) -> HashMap<String, ComponentTypes> {
        links
            .iter()
            .map(|l| {
                let mut t = ComponentTypes::new();
                t.insert(0, "line-of-sight".to_string());
                t.insert(256, "ground".to_string());
                (l.to_string(), t)
            })
            .collect()
    }

    fn snapshot_maps(
        links: &[&str],
        i: usize,
    ) -> (HashMap<String, Vec<MultipathComponent>>, HashMap<String, f64>) {
        let comps = links
            .iter()
            .map(|l| {
                let c = MultipathComponent::new(0, i as u64, 1e-6 + i as f64 * 1e-9, Complex64::new(1.0, 0.0));
                (l.to_string(), vec![c])
            })
            .collect();
        let refs = links.iter().map(|l| (l.to_string(), 1e-6)).collect();
        (comps, refs)
    }

    #[test]
    fn test_create_validation() {
        let temp = NamedTempFile::new().unwrap();
        let params = ChannelParameters::default();

        let result = ContinuousDelayWriter::create(temp.path(), params, ["a", "b"], &types(&["a"]));
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = ContinuousDelayWriter::create(temp.path(), params, ["a", "b"], &types(&["a", "c"]));
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = ContinuousDelayWriter::create(temp.path(), params, Vec::<String>::new(), &types(&[]));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejected_append_leaves_counts() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let links = ["a", "b"];
        let mut writer =
            ContinuousDelayWriter::create(temp.path(), ChannelParameters::default(), links, &types(&links))?;

        let (comps, refs) = snapshot_maps(&links, 0);
        writer.append_snapshot(&comps, &refs, 0)?;

        // missing link
        let (comps_a, refs_a) = snapshot_maps(&["a"], 1);
        assert!(matches!(
            writer.append_snapshot(&comps_a, &refs_a, 1),
            Err(Error::Validation(_))
        ));
        // extra link
        let (comps_x, refs_x) = snapshot_maps(&["a", "b", "c"], 1);
        assert!(matches!(
            writer.append_snapshot(&comps_x, &refs_x, 1),
            Err(Error::Validation(_))
        ));
        // skipped index
        let (comps, refs) = snapshot_maps(&links, 2);
        assert!(matches!(
            writer.append_snapshot(&comps, &refs, 2),
            Err(Error::Validation(_))
        ));
        assert_eq!(writer.snapshot_count(), 1);

        let (comps, refs) = snapshot_maps(&links, 1);
        writer.append_snapshot(&comps, &refs, 1)?;
        writer.close()?;

        let reader = ContinuousDelayReader::open(temp.path())?;
        assert_eq!(reader.snapshot_count(), 2);
        for link in links {
            assert_eq!(reader.reference_delays(link)?.len(), 2);
            assert_eq!(reader.component_count(link, 1)?, 1);
        }
        assert_eq!(reader.component_types("a")?.get(&256).map(String::as_str), Some("ground"));
        Ok(())
    }

    #[test]
    fn test_empty_snapshot_and_accessors() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let params = ChannelParameters::new(100.0, 5.2e9);
        let mut writer = ContinuousDelayWriter::create(temp.path(), params, ["a"], &types(&["a"]))?;
        for i in 0..10 {
            let mut comps = HashMap::new();
            comps.insert("a".to_string(), Vec::new());
            let mut refs = HashMap::new();
            refs.insert("a".to_string(), i as f64);
            writer.append_snapshot(&comps, &refs, i)?;
        }
        writer.close()?;

        let reader = ContinuousDelayReader::open(temp.path())?;
        assert_eq!(reader.transmitter_frequency(), 5.2e9);
        assert_eq!(reader.duration(), 0.1);
        assert_eq!(reader.snapshot("a", 9)?.reference_delay, 9.0);
        assert!(reader.snapshot("a", 9)?.components.is_empty());
        assert!(matches!(reader.snapshot("a", 10), Err(Error::Validation(_))));
        assert!(matches!(reader.snapshot("b", 0), Err(Error::Validation(_))));
        assert_eq!(reader.snapshot_range_for_time(0.05, 0.0)?, 5..10);
        assert!(format!("{:?}", reader).contains("links: [\"a\"]"));
        Ok(())
    }
}
