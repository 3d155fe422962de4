use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::codec;
use super::dataset::{Dataset, YEAR_KEY};
use super::frame::Frame;
use super::ObjectStore;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_KEY: &str = "scraped_date";
const FILE_NAME: &str = "data.parquet";

/// `{dataset_root}/{key_name}={key_value}/scraped_date={date}/data.parquet`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPath {
    pub dataset_root: String,
    pub key_name: String,
    pub key_value: String,
    pub scraped_date: String,
}

impl PartitionPath {
    pub fn new(dataset: &Dataset, key_value: &str, date: NaiveDate) -> Self {
        PartitionPath {
            dataset_root: dataset.root(),
            key_name: dataset.key_name.to_string(),
            key_value: key_value.to_string(),
            scraped_date: date.format(DATE_FORMAT).to_string(),
        }
    }

    /// Inverse of `Display`; `None` for keys that are not partition files.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts: Vec<&str> = key.split('/').collect();
        if parts.pop()? != FILE_NAME {
            return None;
        }
        let scraped_date = parts.pop()?.strip_prefix(DATE_KEY)?.strip_prefix('=')?;
        let (key_name, key_value) = parts.pop()?.split_once('=')?;
        if parts.is_empty() || key_value.is_empty() || scraped_date.is_empty() {
            return None;
        }
        Some(PartitionPath {
            dataset_root: parts.join("/"),
            key_name: key_name.to_string(),
            key_value: key_value.to_string(),
            scraped_date: scraped_date.to_string(),
        })
    }
}

impl fmt::Display for PartitionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}={}/{}={}/{}",
            self.dataset_root, self.key_name, self.key_value, DATE_KEY, self.scraped_date, FILE_NAME
        )
    }
}

/// Dated, append-only partitions of scraped frames.
pub struct PartitionStore {
    objects: Box<dyn ObjectStore>,
}

impl PartitionStore {
    pub fn new(objects: Box<dyn ObjectStore>) -> Self {
        PartitionStore { objects }
    }

    /// Store `frame` as the `date` partition for `key_value`.
    ///
    /// Returns 0 without writing when the frame is empty or lacks a required
    /// column. Storage errors are returned.
    pub fn write_partition(
        &self,
        dataset: &Dataset,
        key_value: &str,
        frame: &Frame,
        date: NaiveDate,
    ) -> Result<usize> {
        if frame.is_empty() {
            if dataset.key_name == YEAR_KEY {
                warn!("No {} data found for {}.", dataset.name, key_value);
            } else {
                debug!("No {} data to load for {}", dataset.name, key_value);
            }
            return Ok(0);
        }

        let missing = frame.missing_columns(dataset.required);
        if !missing.is_empty() {
            warn!(
                "{} data for {} is missing columns: {:?}. Got columns: {:?}",
                dataset.name,
                key_value,
                missing,
                frame.columns()
            );
            return Ok(0);
        }
        let missing_optional = frame.missing_columns(dataset.optional);
        if !missing_optional.is_empty() {
            debug!(
                "{} data for {} is missing optional columns: {:?}",
                dataset.name, key_value, missing_optional
            );
        }

        let path = PartitionPath::new(dataset, key_value, date);
        let bytes = codec::encode(frame)?;
        self.objects
            .put(&path.to_string(), &bytes)
            .with_context(|| format!("Failed to write partition {}", path))?;
        info!("Wrote {} rows to {}", frame.len(), path);
        Ok(frame.len())
    }

    fn partitions(&self, prefix: &str) -> Result<Vec<PartitionPath>> {
        Ok(self
            .objects
            .list(prefix)?
            .iter()
            .filter_map(|k| PartitionPath::parse(k))
            .collect())
    }

    pub fn partitions_for_key(&self, dataset: &Dataset, key_value: &str) -> Result<Vec<PartitionPath>> {
        let prefix = format!("{}/{}={}/", dataset.root(), dataset.key_name, key_value);
        Ok(self
            .partitions(&prefix)?
            .into_iter()
            .filter(|p| p.key_value == key_value)
            .collect())
    }

    /// Most recent partition by `scraped_date`, if the key was ever written.
    pub fn find_latest_partition(
        &self,
        dataset: &Dataset,
        key_value: &str,
    ) -> Result<Option<PartitionPath>> {
        Ok(self
            .partitions_for_key(dataset, key_value)?
            .into_iter()
            .max_by(|a, b| a.scraped_date.cmp(&b.scraped_date)))
    }

    pub fn read_partition(&self, path: &PartitionPath) -> Result<Frame> {
        let bytes = self.objects.get(&path.to_string())?;
        codec::decode(bytes).with_context(|| format!("Failed to decode {}", path))
    }

    /// Rows of several partitions, concatenated.
    pub fn read_partitions(&self, paths: &[PartitionPath]) -> Result<Frame> {
        let frames = paths
            .iter()
            .map(|p| self.read_partition(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Frame::concat(frames))
    }

    /// Every logical key with at least one partition.
    pub fn partitions_present_for(&self, dataset: &Dataset) -> Result<BTreeSet<String>> {
        let prefix = format!("{}/", dataset.root());
        Ok(self
            .partitions(&prefix)?
            .into_iter()
            .filter(|p| p.key_name == dataset.key_name)
            .map(|p| p.key_value)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::dataset::{RELEASE_ID_LOOKUP, RELEASE_METADATA, WORLDWIDE_BOX_OFFICE};
    use crate::store::FsObjectStore;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn lookup_frame(title: &str) -> Frame {
        Frame::from_records(&[vec![
            ("movie_title", Some(title.to_string())),
            ("release_group_url", Some("https://x.test/releasegroup/gr1/".into())),
            ("domestic_release_url", Some("https://x.test/release/rl1/".into())),
        ]])
    }

    fn store() -> (tempfile::TempDir, PartitionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(Box::new(FsObjectStore::new(dir.path())));
        (dir, store)
    }

    #[test]
    fn path_round_trips_through_display() {
        let p = PartitionPath::new(&RELEASE_ID_LOOKUP, "2024", date("2024-03-14"));
        let s = p.to_string();
        assert_eq!(s, "raw/release_id_lookup/release_year=2024/scraped_date=2024-03-14/data.parquet");
        assert_eq!(PartitionPath::parse(&s), Some(p));
        assert_eq!(PartitionPath::parse("raw/release_id_lookup/release_year=2024/other.txt"), None);
    }

    #[test]
    fn latest_is_greatest_date() {
        let (_dir, store) = store();
        assert_eq!(store.find_latest_partition(&RELEASE_ID_LOOKUP, "2024").unwrap(), None);

        for (d, title) in [("2024-01-01", "a"), ("2024-03-14", "b"), ("2024-02-01", "c")] {
            store
                .write_partition(&RELEASE_ID_LOOKUP, "2024", &lookup_frame(title), date(d))
                .unwrap();
        }
        let latest = store.find_latest_partition(&RELEASE_ID_LOOKUP, "2024").unwrap().unwrap();
        assert_eq!(latest.scraped_date, "2024-03-14");
        let frame = store.read_partition(&latest).unwrap();
        assert_eq!(frame.column("movie_title").unwrap(), [Some("b")]);
    }

    #[test]
    fn key_prefix_does_not_match_longer_keys() {
        let (_dir, store) = store();
        let frame = Frame::from_records(&[vec![("release_id", Some("rl10".into()))]]);
        store.write_partition(&RELEASE_METADATA, "rl10", &frame, date("2024-01-01")).unwrap();
        assert_eq!(store.find_latest_partition(&RELEASE_METADATA, "rl1").unwrap(), None);
    }

    #[test]
    fn empty_or_incomplete_frames_are_not_written() {
        let (_dir, store) = store();
        let empty = Frame::new(vec!["movie_title".into()]);
        assert_eq!(store.write_partition(&RELEASE_ID_LOOKUP, "2024", &empty, date("2024-01-01")).unwrap(), 0);

        let partial = Frame::from_records(&[vec![("Release Group", Some("Dune".into()))]]);
        assert_eq!(
            store.write_partition(&WORLDWIDE_BOX_OFFICE, "2024", &partial, date("2024-01-01")).unwrap(),
            0
        );
        assert!(store.partitions_present_for(&WORLDWIDE_BOX_OFFICE).unwrap().is_empty());
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let (_dir, store) = store();
        let frame = Frame::from_records(&[vec![("release_id", Some("rl1".into()))]]);
        assert_eq!(
            store.write_partition(&RELEASE_METADATA, "rl1", &frame, date("2024-01-01")).unwrap(),
            1
        );
    }

    #[test]
    fn present_keys_and_concatenated_reads() {
        let (_dir, store) = store();
        store.write_partition(&RELEASE_ID_LOOKUP, "2023", &lookup_frame("a"), date("2024-01-01")).unwrap();
        store.write_partition(&RELEASE_ID_LOOKUP, "2023", &lookup_frame("b"), date("2024-01-02")).unwrap();
        store.write_partition(&RELEASE_ID_LOOKUP, "2024", &lookup_frame("c"), date("2024-01-02")).unwrap();

        let present = store.partitions_present_for(&RELEASE_ID_LOOKUP).unwrap();
        assert_eq!(present.into_iter().collect::<Vec<_>>(), ["2023", "2024"]);

        let all = store.partitions_for_key(&RELEASE_ID_LOOKUP, "2023").unwrap();
        let frame = store.read_partitions(&all).unwrap();
        assert_eq!(frame.len(), 2);
    }
}
