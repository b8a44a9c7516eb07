use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::CurrawongError;

/// Sparse feature-by-sample abundance table. Rows are feature ids, columns
/// are sample ids, cells are non-negative counts. Zero cells are not stored,
/// but every row and every sample is registered so that all-zero rows and
/// columns survive filtering and collapse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AbundanceTable {
    observations: BTreeMap<String, BTreeMap<String, f64>>,
    samples: BTreeSet<String>,
}

impl AbundanceTable {
    pub fn new() -> AbundanceTable {
        AbundanceTable {
            observations: BTreeMap::new(),
            samples: BTreeSet::new(),
        }
    }

    /// Register a feature row, which may remain all-zero.
    pub fn add_observation(&mut self, feature_id: &str) {
        self.observations
            .entry(feature_id.to_string())
            .or_insert_with(BTreeMap::new);
    }

    /// Register a sample column, which may remain all-zero.
    pub fn add_sample(&mut self, sample_id: &str) {
        self.samples.insert(sample_id.to_string());
    }

    /// Accumulate a count into a cell, registering the row and column.
    pub fn add(&mut self, feature_id: &str, sample_id: &str, count: f64) {
        self.samples.insert(sample_id.to_string());
        let row = self
            .observations
            .entry(feature_id.to_string())
            .or_insert_with(BTreeMap::new);
        if count != 0.0 {
            *row.entry(sample_id.to_string()).or_insert(0.0) += count;
        }
    }

    pub fn observation_ids(&self) -> Vec<&str> {
        self.observations.keys().map(|id| id.as_str()).collect()
    }

    pub fn sample_ids(&self) -> Vec<&str> {
        self.samples.iter().map(|id| id.as_str()).collect()
    }

    pub fn contains_observation(&self, feature_id: &str) -> bool {
        self.observations.contains_key(feature_id)
    }

    pub fn get(&self, feature_id: &str, sample_id: &str) -> f64 {
        self.observations
            .get(feature_id)
            .and_then(|row| row.get(sample_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// Total count of a feature across all samples, or None if the feature
    /// is not a row of this table.
    pub fn observation_sum(&self, feature_id: &str) -> Option<f64> {
        self.observations
            .get(feature_id)
            .map(|row| row.values().sum())
    }

    /// Total count of a sample across all features.
    pub fn sample_sum(&self, sample_id: &str) -> f64 {
        self.observations
            .values()
            .filter_map(|row| row.get(sample_id))
            .sum()
    }

    pub fn total(&self) -> f64 {
        self.observations
            .values()
            .map(|row| row.values().sum::<f64>())
            .sum()
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Collapse rows into cluster rows under an explicit feature-to-cluster
    /// mapping, summing member counts per sample. The mapping must cover
    /// every row of the table. No normalisation is applied, so per-sample
    /// totals are conserved exactly.
    pub fn collapse(
        &self,
        mapping: &BTreeMap<String, String>,
    ) -> Result<AbundanceTable, CurrawongError> {
        let mut collapsed = AbundanceTable::new();
        for sample_id in &self.samples {
            collapsed.add_sample(sample_id);
        }
        for (feature_id, row) in &self.observations {
            let cluster_id = mapping
                .get(feature_id)
                .ok_or_else(|| CurrawongError::UnmappedFeature(feature_id.clone()))?;
            collapsed.add_observation(cluster_id);
            for (sample_id, count) in row {
                collapsed.add(cluster_id, sample_id, *count);
            }
        }
        Ok(collapsed)
    }

    /// Return a new table containing the rows whose ids are in `ids`, or,
    /// with `invert`, the rows whose ids are not. Samples are kept as-is.
    pub fn filter_observations(&self, ids: &BTreeSet<String>, invert: bool) -> AbundanceTable {
        let mut filtered = AbundanceTable::new();
        for sample_id in &self.samples {
            filtered.add_sample(sample_id);
        }
        for (feature_id, row) in &self.observations {
            if ids.contains(feature_id) != invert {
                filtered.add_observation(feature_id);
                for (sample_id, count) in row {
                    filtered.add(feature_id, sample_id, *count);
                }
            }
        }
        filtered
    }

    /// Row-wise union of two tables with disjoint row id sets. Any id found
    /// in both is an error, listing the colliding ids.
    pub fn merge_disjoint(&self, other: &AbundanceTable) -> Result<AbundanceTable, CurrawongError> {
        let overlapping: Vec<String> = self
            .observations
            .keys()
            .filter(|id| other.observations.contains_key(*id))
            .cloned()
            .collect();
        if !overlapping.is_empty() {
            return Err(CurrawongError::OverlappingFeatures(overlapping));
        }
        let mut merged = self.clone();
        for sample_id in &other.samples {
            merged.add_sample(sample_id);
        }
        for (feature_id, row) in &other.observations {
            merged.add_observation(feature_id);
            for (sample_id, count) in row {
                merged.add(feature_id, sample_id, *count);
            }
        }
        Ok(merged)
    }

    /// Relabel every row according to `id_map`. Each row must have a mapping
    /// and no two rows may map to the same new id.
    pub fn update_observation_ids(
        &self,
        id_map: &BTreeMap<String, String>,
    ) -> Result<AbundanceTable, CurrawongError> {
        let mut relabelled = AbundanceTable::new();
        for sample_id in &self.samples {
            relabelled.add_sample(sample_id);
        }
        for (feature_id, row) in &self.observations {
            let new_id = id_map
                .get(feature_id)
                .ok_or_else(|| CurrawongError::UnmappedFeature(feature_id.clone()))?;
            if relabelled.contains_observation(new_id) {
                return Err(CurrawongError::MalformedTable(format!(
                    "Relabelling features produced the duplicate feature id '{}'",
                    new_id
                )));
            }
            relabelled.add_observation(new_id);
            for (sample_id, count) in row {
                relabelled.add(new_id, sample_id, *count);
            }
        }
        Ok(relabelled)
    }

    /// Read a table from TSV: header row of `#OTU ID` then sample ids, one
    /// row per feature.
    pub fn read_tsv(path: &Path) -> Result<AbundanceTable, CurrawongError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = rdr.headers()?.clone();
        if headers.is_empty() {
            return Err(CurrawongError::MalformedTable(format!(
                "No header row found in {}",
                path.to_string_lossy()
            )));
        }
        let sample_ids: Vec<String> = headers.iter().skip(1).map(|s| s.to_string()).collect();

        let mut table = AbundanceTable::new();
        for sample_id in &sample_ids {
            table.add_sample(sample_id);
        }
        for record_res in rdr.records() {
            let record = record_res?;
            if record.len() != sample_ids.len() + 1 {
                return Err(CurrawongError::MalformedTable(format!(
                    "Expected {} columns but found {} in row {:?}",
                    sample_ids.len() + 1,
                    record.len(),
                    record
                )));
            }
            let feature_id = &record[0];
            if table.contains_observation(feature_id) {
                return Err(CurrawongError::MalformedTable(format!(
                    "The feature id '{}' was found multiple times",
                    feature_id
                )));
            }
            table.add_observation(feature_id);
            for (i, sample_id) in sample_ids.iter().enumerate() {
                let count: f64 = record[i + 1].parse().map_err(|_| {
                    CurrawongError::MalformedTable(format!(
                        "Failed to parse count '{}' for feature '{}'",
                        &record[i + 1],
                        feature_id
                    ))
                })?;
                if count < 0.0 {
                    return Err(CurrawongError::MalformedTable(format!(
                        "Negative count {} for feature '{}'",
                        count, feature_id
                    )));
                }
                table.add(feature_id, sample_id, count);
            }
        }
        debug!(
            "Read in a table of {} features x {} samples from {}",
            table.num_observations(),
            table.num_samples(),
            path.to_string_lossy()
        );
        Ok(table)
    }

    pub fn write_tsv(&self, path: &Path) -> Result<(), CurrawongError> {
        let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        let mut header = vec!["#OTU ID".to_string()];
        header.extend(self.samples.iter().cloned());
        wtr.write_record(&header)?;
        for (feature_id, row) in &self.observations {
            let mut record = vec![feature_id.clone()];
            for sample_id in &self.samples {
                record.push(format!("{}", row.get(sample_id).copied().unwrap_or(0.0)));
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn example_table() -> AbundanceTable {
        // feature1..feature4 x sample1..sample3
        let mut table = AbundanceTable::new();
        for (feature_id, counts) in &[
            ("feature1", [0.0, 1.0, 3.0]),
            ("feature2", [1.0, 1.0, 2.0]),
            ("feature3", [4.0, 5.0, 6.0]),
            ("feature4", [7.0, 8.0, 9.0]),
        ] {
            table.add_observation(feature_id);
            for (i, count) in counts.iter().enumerate() {
                table.add(feature_id, &format!("sample{}", i + 1), *count);
            }
        }
        table
    }

    fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(feature, cluster)| (feature.to_string(), cluster.to_string()))
            .collect()
    }

    #[test]
    fn test_collapse_sums_members() {
        init();
        let table = example_table();
        let collapsed = table
            .collapse(&mapping(&[
                ("feature1", "feature1"),
                ("feature2", "feature2"),
                ("feature3", "feature1"),
                ("feature4", "feature4"),
            ]))
            .unwrap();
        assert_eq!(
            vec!["feature1", "feature2", "feature4"],
            collapsed.observation_ids()
        );
        assert_eq!(4.0, collapsed.get("feature1", "sample1"));
        assert_eq!(6.0, collapsed.get("feature1", "sample2"));
        assert_eq!(9.0, collapsed.get("feature1", "sample3"));
        assert_eq!(1.0, collapsed.get("feature2", "sample1"));
        assert_eq!(7.0, collapsed.get("feature4", "sample1"));
    }

    #[test]
    fn test_collapse_conserves_totals() {
        init();
        let table = example_table();
        let collapsed = table
            .collapse(&mapping(&[
                ("feature1", "c1"),
                ("feature2", "c1"),
                ("feature3", "c2"),
                ("feature4", "c2"),
            ]))
            .unwrap();
        assert_eq!(table.total(), collapsed.total());
        for sample_id in table.sample_ids() {
            assert_eq!(table.sample_sum(sample_id), collapsed.sample_sum(sample_id));
        }
    }

    #[test]
    fn test_collapse_identity_mapping_is_idempotent() {
        init();
        let table = example_table();
        let identity = mapping(&[
            ("feature1", "feature1"),
            ("feature2", "feature2"),
            ("feature3", "feature3"),
            ("feature4", "feature4"),
        ]);
        assert_eq!(table, table.collapse(&identity).unwrap());
    }

    #[test]
    fn test_collapse_single_member_cluster_passes_through() {
        init();
        let table = example_table();
        let collapsed = table
            .collapse(&mapping(&[
                ("feature1", "r9"),
                ("feature2", "feature2"),
                ("feature3", "feature3"),
                ("feature4", "feature4"),
            ]))
            .unwrap();
        assert_eq!(3.0, collapsed.get("r9", "sample3"));
        assert_eq!(table.total(), collapsed.total());
    }

    #[test]
    fn test_collapse_requires_total_mapping() {
        init();
        let table = example_table();
        match table.collapse(&mapping(&[
            ("feature1", "c1"),
            ("feature2", "c1"),
            ("feature3", "c2"),
        ])) {
            Err(CurrawongError::UnmappedFeature(id)) => assert_eq!("feature4", id),
            other => panic!("Unexpected collapse result: {:?}", other),
        }
    }

    #[test]
    fn test_filter_observations() {
        init();
        let table = example_table();
        let ids: BTreeSet<String> = ["feature2", "feature3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let kept = table.filter_observations(&ids, false);
        assert_eq!(vec!["feature2", "feature3"], kept.observation_ids());
        let dropped = table.filter_observations(&ids, true);
        assert_eq!(vec!["feature1", "feature4"], dropped.observation_ids());
        assert_eq!(3, dropped.num_samples());
    }

    #[test]
    fn test_merge_disjoint() {
        init();
        let table = example_table();
        let ids: BTreeSet<String> = ["feature1", "feature2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let left = table.filter_observations(&ids, false);
        let right = table.filter_observations(&ids, true);
        let merged = left.merge_disjoint(&right).unwrap();
        assert_eq!(table, merged);
    }

    #[test]
    fn test_merge_disjoint_errors_on_overlap() {
        init();
        let table = example_table();
        match table.merge_disjoint(&table) {
            Err(CurrawongError::OverlappingFeatures(ids)) => {
                assert_eq!(4, ids.len());
                assert!(ids.contains(&"feature1".to_string()));
            }
            other => panic!("Unexpected merge result: {:?}", other),
        }
    }

    #[test]
    fn test_update_observation_ids() {
        init();
        let table = example_table();
        let id_map = mapping(&[
            ("feature1", "a"),
            ("feature2", "b"),
            ("feature3", "c"),
            ("feature4", "d"),
        ]);
        let relabelled = table.update_observation_ids(&id_map).unwrap();
        assert_eq!(vec!["a", "b", "c", "d"], relabelled.observation_ids());
        assert_eq!(table.total(), relabelled.total());
        assert_eq!(7.0, relabelled.get("d", "sample1"));
    }

    #[test]
    fn test_update_observation_ids_rejects_collisions() {
        init();
        let table = example_table();
        let id_map = mapping(&[
            ("feature1", "a"),
            ("feature2", "a"),
            ("feature3", "c"),
            ("feature4", "d"),
        ]);
        assert!(table.update_observation_ids(&id_map).is_err());
    }

    #[test]
    fn test_all_zero_rows_and_columns_survive() {
        init();
        let mut table = AbundanceTable::new();
        table.add_observation("feature1");
        table.add_sample("sample1");
        table.add("feature2", "sample2", 3.0);
        assert_eq!(2, table.num_observations());
        assert_eq!(2, table.num_samples());
        assert_eq!(Some(0.0), table.observation_sum("feature1"));
        let collapsed = table
            .collapse(&mapping(&[("feature1", "c1"), ("feature2", "c1")]))
            .unwrap();
        assert_eq!(vec!["sample1", "sample2"], collapsed.sample_ids());
        assert_eq!(3.0, collapsed.get("c1", "sample2"));
    }

    #[test]
    fn test_tsv_round_trip() {
        init();
        let table = example_table();
        let tf = tempfile::Builder::new()
            .prefix("currawong-test-table")
            .suffix(".tsv")
            .tempfile()
            .unwrap();
        table.write_tsv(tf.path()).unwrap();
        let reread = AbundanceTable::read_tsv(tf.path()).unwrap();
        assert_eq!(table, reread);
    }

    #[test]
    fn test_read_tsv_rejects_negative_counts() {
        init();
        let tf = tempfile::Builder::new()
            .prefix("currawong-test-table")
            .suffix(".tsv")
            .tempfile()
            .unwrap();
        std::fs::write(
            tf.path(),
            "#OTU ID\tsample1\tsample2\nfeature1\t1\t-2\n",
        )
        .unwrap();
        assert!(AbundanceTable::read_tsv(tf.path()).is_err());
    }

    #[test]
    fn test_read_tsv_rejects_duplicate_features() {
        init();
        let tf = tempfile::Builder::new()
            .prefix("currawong-test-table")
            .suffix(".tsv")
            .tempfile()
            .unwrap();
        std::fs::write(
            tf.path(),
            "#OTU ID\tsample1\nfeature1\t1\nfeature1\t2\n",
        )
        .unwrap();
        assert!(AbundanceTable::read_tsv(tf.path()).is_err());
    }
}
