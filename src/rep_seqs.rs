use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::abundance_table::AbundanceTable;
use crate::fasta_io::FastaRecord;
use crate::uc_parser::FeatureClusterMap;
use crate::CurrawongError;

/// Select one representative sequence per cluster: the member feature with
/// the highest total abundance, ties broken by the lexicographically
/// smallest feature id. (count descending, id ascending) is a strict total
/// order, so the selection does not depend on input ordering. The selected
/// feature's sequence is emitted under the cluster's id, sorted by cluster
/// id.
///
/// Membership records without a count are seeds; their count is looked up
/// from the abundance table. A feature referenced by a membership record but
/// absent from the sequence set means the inputs are no longer consistent,
/// which is a fatal error.
pub fn representative_sequences(
    membership: &FeatureClusterMap,
    sequences: &BTreeMap<String, String>,
    table: &AbundanceTable,
) -> Result<Vec<FastaRecord>, CurrawongError> {
    // cluster id -> (winning feature id, winning count)
    let mut best: BTreeMap<&str, (&str, f64)> = BTreeMap::new();
    for (feature_id, record) in membership.iter() {
        if !sequences.contains_key(feature_id) {
            return Err(CurrawongError::IdMismatch {
                present_in: "the clustering output",
                absent_from: "sequences",
                ids: vec![feature_id.clone()],
            });
        }
        let count = match record.count {
            Some(count) => count as f64,
            None => {
                table
                    .observation_sum(feature_id)
                    .ok_or_else(|| CurrawongError::IdMismatch {
                        present_in: "the clustering output",
                        absent_from: "table",
                        ids: vec![feature_id.clone()],
                    })?
            }
        };
        match best.entry(record.cluster_id.as_str()) {
            Entry::Vacant(vacant) => {
                vacant.insert((feature_id, count));
            }
            Entry::Occupied(mut occupied) => {
                let (incumbent_id, incumbent_count) = *occupied.get();
                if count > incumbent_count
                    || (count == incumbent_count && feature_id.as_str() < incumbent_id)
                {
                    occupied.insert((feature_id, count));
                }
            }
        }
    }

    let mut representatives = vec![];
    for (cluster_id, (feature_id, count)) in best {
        trace!(
            "Cluster {} is represented by feature {} with count {}",
            cluster_id,
            feature_id,
            count
        );
        let sequence = sequences
            .get(feature_id)
            .ok_or_else(|| CurrawongError::IdMismatch {
                present_in: "the clustering output",
                absent_from: "sequences",
                ids: vec![feature_id.to_string()],
            })?;
        representatives.push(FastaRecord {
            id: cluster_id.to_string(),
            description: None,
            sequence: sequence.clone(),
        });
    }
    Ok(representatives)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn sequences(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(id, seq)| (id.to_string(), seq.to_string()))
            .collect()
    }

    fn table(sums: &[(&str, f64)]) -> AbundanceTable {
        let mut table = AbundanceTable::new();
        for (feature_id, count) in sums {
            table.add(feature_id, "sample1", *count);
        }
        table
    }

    #[test]
    fn test_highest_count_wins() {
        init();
        let uc = "\
S\t0\t20\t*\t*\t*\t*\t*\tfeature1\t*
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature2;size=4\tfeature1
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature3;size=7\tfeature1
";
        let membership = FeatureClusterMap::from_uc_reader(uc.as_bytes()).unwrap();
        let seqs = sequences(&[
            ("feature1", "AAAA"),
            ("feature2", "CCCC"),
            ("feature3", "GGGG"),
        ]);
        let reps = representative_sequences(
            &membership,
            &seqs,
            &table(&[("feature1", 100.0), ("feature2", 4.0), ("feature3", 7.0)]),
        )
        .unwrap();
        // feature1's count comes from the table since seeds carry none
        assert_eq!(1, reps.len());
        assert_eq!("feature1", reps[0].id);
        assert_eq!("AAAA", reps[0].sequence);
    }

    #[test]
    fn test_ties_break_to_smallest_feature_id_regardless_of_order() {
        init();
        let forwards = "\
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature1;size=5\tr1
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature3;size=5\tr1
";
        let backwards = "\
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature3;size=5\tr1
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature1;size=5\tr1
";
        let seqs = sequences(&[("feature1", "AAAA"), ("feature3", "GGGG")]);
        let empty = AbundanceTable::new();
        for uc in &[forwards, backwards] {
            let membership = FeatureClusterMap::from_uc_reader(uc.as_bytes()).unwrap();
            let reps = representative_sequences(&membership, &seqs, &empty).unwrap();
            assert_eq!(1, reps.len());
            assert_eq!("r1", reps[0].id);
            assert_eq!("AAAA", reps[0].sequence);
        }
    }

    #[test]
    fn test_each_feature_its_own_cluster_returns_input_sequences() {
        init();
        let uc = "\
S\t0\t20\t*\t*\t*\t*\t*\tfeature1\t*
S\t1\t20\t*\t*\t*\t*\t*\tfeature2\t*
S\t2\t20\t*\t*\t*\t*\t*\tfeature3\t*
";
        let membership = FeatureClusterMap::from_uc_reader(uc.as_bytes()).unwrap();
        let seqs = sequences(&[
            ("feature1", "AAAA"),
            ("feature2", "CCCC"),
            ("feature3", "GGGG"),
        ]);
        let reps = representative_sequences(
            &membership,
            &seqs,
            &table(&[("feature1", 1.0), ("feature2", 2.0), ("feature3", 3.0)]),
        )
        .unwrap();
        let expected: Vec<(String, String)> = seqs
            .iter()
            .map(|(id, seq)| (id.clone(), seq.clone()))
            .collect();
        let observed: Vec<(String, String)> = reps
            .into_iter()
            .map(|rec| (rec.id, rec.sequence))
            .collect();
        assert_eq!(expected, observed);
    }

    #[test]
    fn test_cluster_keyed_by_reference_id_uses_member_sequence() {
        init();
        // reference-based clustering: the row label is the reference id while
        // the representative sequence is the best matched input feature's
        let uc = "\
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature2;size=4\tr7
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature1;size=9\tr7
";
        let membership = FeatureClusterMap::from_uc_reader(uc.as_bytes()).unwrap();
        let seqs = sequences(&[("feature1", "TTTT"), ("feature2", "CCCC")]);
        let reps =
            representative_sequences(&membership, &seqs, &AbundanceTable::new()).unwrap();
        assert_eq!(1, reps.len());
        assert_eq!("r7", reps[0].id);
        assert_eq!("TTTT", reps[0].sequence);
    }

    #[test]
    fn test_missing_sequence_is_fatal() {
        init();
        let uc = "\
S\t0\t20\t*\t*\t*\t*\t*\tfeature1\t*
H\t0\t20\t99.0\t+\t0\t0\t20M\tfeature2;size=1\tfeature1
";
        let membership = FeatureClusterMap::from_uc_reader(uc.as_bytes()).unwrap();
        let seqs = sequences(&[("feature1", "AAAA")]);
        match representative_sequences(&membership, &seqs, &table(&[("feature1", 5.0)])) {
            Err(CurrawongError::IdMismatch { ids, .. }) => {
                assert_eq!(vec!["feature2".to_string()], ids)
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
