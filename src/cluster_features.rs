use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use crate::abundance_table::AbundanceTable;
use crate::external_command_checker;
use crate::fasta_io::{self, FastaRecord};
use crate::rep_seqs;
use crate::uc_parser::FeatureClusterMap;
use crate::CurrawongError;

/// Parameters for one de novo clustering invocation. The identity threshold
/// is a fraction, forwarded verbatim to vsearch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeNovoParams {
    pub perc_identity: f32,
    pub threads: u16,
}

/// Parameters for one closed-reference clustering invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedReferenceParams {
    pub perc_identity: f32,
    pub strand: Strand,
    pub threads: u16,
}

/// Query strand(s) to search against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Plus,
    Both,
}

impl Strand {
    pub fn as_arg(self) -> &'static str {
        match self {
            Strand::Plus => "plus",
            Strand::Both => "both",
        }
    }
}

impl Default for Strand {
    fn default() -> Strand {
        Strand::Plus
    }
}

impl FromStr for Strand {
    type Err = String;

    fn from_str(s: &str) -> Result<Strand, String> {
        match s {
            "plus" => Ok(Strand::Plus),
            "both" => Ok(Strand::Both),
            _ => Err(format!("Unknown strand '{}', expected 'plus' or 'both'", s)),
        }
    }
}

pub struct ClosedReferenceOutcome {
    pub table: AbundanceTable,
    /// One sequence per matched reference cluster, keyed by reference id.
    pub matched_rep_seqs: Vec<FastaRecord>,
    /// Input features that matched nothing, ordered by abundance descending.
    pub unmatched_seqs: Vec<FastaRecord>,
}

pub struct OpenReferenceOutcome {
    pub table: AbundanceTable,
    pub rep_seqs: Vec<FastaRecord>,
    /// The original reference set plus any new de novo cluster
    /// representatives, so repeated runs converge to stable cluster ids.
    pub new_reference_seqs: Vec<FastaRecord>,
}

/// Run an external command to completion, capturing its output. A non-zero
/// exit is fatal and unretried. The command line recorded in the error
/// references temporary files that no longer exist by the time a caller
/// sees it, so it cannot be manually re-run.
pub fn run_command(cmd: &mut Command, description: &str) -> Result<(), CurrawongError> {
    info!("Running {} command: {:?}", description, cmd);
    let output = match cmd.output() {
        Ok(output) => output,
        Err(e) => {
            return Err(CurrawongError::ExternalCommand {
                command_line: format!("{:?}", cmd),
                status: format!("failed to start: {}", e),
                stderr: String::new(),
            })
        }
    };
    if output.status.success() {
        debug!(
            "{} stderr: {}",
            description,
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(())
    } else {
        Err(CurrawongError::ExternalCommand {
            command_line: format!("{:?}", cmd),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Cluster features de novo at the given identity threshold. The table and
/// sequence set must contain identical feature id sets. Returns the
/// collapsed table and one representative sequence per cluster.
pub fn cluster_features_de_novo(
    sequences_fasta: &Path,
    table: &AbundanceTable,
    params: &DeNovoParams,
) -> Result<(AbundanceTable, Vec<FastaRecord>), CurrawongError> {
    let sequences = fasta_io::read_fasta(sequences_fasta)?;

    let sized_fasta = tempfile::Builder::new()
        .prefix("currawong-sized")
        .suffix(".fasta")
        .tempfile()?;
    fasta_io::write_fasta_with_sizes(&sequences, table, sized_fasta.path())?;

    let uc = tempfile::Builder::new()
        .prefix("currawong-denovo")
        .suffix(".uc")
        .tempfile()?;

    external_command_checker::check_for_vsearch();
    let mut cmd = Command::new("vsearch");
    cmd.arg("--cluster_size")
        .arg(sized_fasta.path())
        .arg("--id")
        .arg(format!("{}", params.perc_identity))
        .arg("--uc")
        .arg(uc.path())
        .arg("--qmask")
        .arg("none") // ensures no lowercase DNA chars
        .arg("--threads")
        .arg(format!("{}", params.threads));
    run_command(&mut cmd, "vsearch --cluster_size")?;

    let membership = FeatureClusterMap::from_uc_path(uc.path())?;
    resolve_clusters(table, &sequences, &membership)
}

/// Fold a parsed membership map back into a collapsed table and one
/// representative sequence per cluster.
fn resolve_clusters(
    table: &AbundanceTable,
    sequences: &[FastaRecord],
    membership: &FeatureClusterMap,
) -> Result<(AbundanceTable, Vec<FastaRecord>), CurrawongError> {
    let sequence_map = fasta_io::sequence_map(sequences)?;
    let collapsed = table.collapse(&membership.collapse_mapping())?;
    let representatives = rep_seqs::representative_sequences(membership, &sequence_map, table)?;
    info!(
        "Collapsed {} features into {} clusters",
        membership.len(),
        collapsed.num_observations()
    );
    Ok((collapsed, representatives))
}

/// Cluster features against a fixed reference set. Every table feature must
/// have a sequence; the reverse is not required here, unlike de novo. Rows
/// of the output table are labelled with reference ids, while each
/// cluster's representative is the best matched input feature's sequence.
/// Raises the distinguished no-matches error when nothing matched, which
/// open-reference clustering catches to fall back to de novo.
pub fn cluster_features_closed_reference(
    sequences_fasta: &Path,
    table: &AbundanceTable,
    reference_sequences_fasta: &Path,
    params: &ClosedReferenceParams,
) -> Result<ClosedReferenceOutcome, CurrawongError> {
    let sequences = fasta_io::read_fasta(sequences_fasta)?;
    let sequence_ids: BTreeSet<&str> = sequences.iter().map(|r| r.id.as_str()).collect();
    let extra_table_ids: Vec<String> = table
        .observation_ids()
        .into_iter()
        .filter(|id| !sequence_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !extra_table_ids.is_empty() {
        return Err(CurrawongError::IdMismatch {
            present_in: "table",
            absent_from: "sequences",
            ids: extra_table_ids,
        });
    }

    let sized_fasta = tempfile::Builder::new()
        .prefix("currawong-sized")
        .suffix(".fasta")
        .tempfile()?;
    fasta_io::write_fasta_with_sizes(&sequences, table, sized_fasta.path())?;

    let uc = tempfile::Builder::new()
        .prefix("currawong-closedref")
        .suffix(".uc")
        .tempfile()?;
    let notmatched = tempfile::Builder::new()
        .prefix("currawong-notmatched")
        .suffix(".fasta")
        .tempfile()?;

    external_command_checker::check_for_vsearch();
    let mut cmd = Command::new("vsearch");
    cmd.arg("--usearch_global")
        .arg(sized_fasta.path())
        .arg("--id")
        .arg(format!("{}", params.perc_identity))
        .arg("--db")
        .arg(reference_sequences_fasta)
        .arg("--uc")
        .arg(uc.path())
        .arg("--strand")
        .arg(params.strand.as_arg())
        .arg("--qmask")
        .arg("none") // ensures no lowercase DNA chars
        .arg("--notmatched")
        .arg(notmatched.path())
        .arg("--threads")
        .arg(format!("{}", params.threads));
    run_command(&mut cmd, "vsearch --usearch_global")?;

    let membership = match FeatureClusterMap::from_uc_path(uc.path()) {
        Err(CurrawongError::EmptyMembership) => return Err(CurrawongError::NoMatches),
        other => other?,
    };

    // the notmatched file carries the ;size= annotations of the sized input
    let mut unmatched_sized = fasta_io::read_sized_fasta(notmatched.path())?;
    unmatched_sized.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
    let unmatched_seqs: Vec<FastaRecord> =
        unmatched_sized.into_iter().map(|(record, _)| record).collect();
    info!(
        "{} of {} features matched the reference",
        membership.len(),
        sequences.len()
    );

    let unmatched_ids: BTreeSet<String> =
        unmatched_seqs.iter().map(|r| r.id.clone()).collect();
    let matched_table = table.filter_observations(&unmatched_ids, true);

    let sequence_map = fasta_io::sequence_map(&sequences)?;
    let collapsed = matched_table.collapse(&membership.collapse_mapping())?;
    let matched_rep_seqs = rep_seqs::representative_sequences(&membership, &sequence_map, table)?;

    Ok(ClosedReferenceOutcome {
        table: collapsed,
        matched_rep_seqs,
        unmatched_seqs,
    })
}

/// Closed-reference clustering followed by de novo clustering of whatever
/// did not match. When closed-reference finds nothing at all, the entire
/// input is clustered de novo. The returned reference set is the original
/// reference plus any new de novo representatives.
pub fn cluster_features_open_reference(
    sequences_fasta: &Path,
    table: &AbundanceTable,
    reference_sequences_fasta: &Path,
    params: &ClosedReferenceParams,
) -> Result<OpenReferenceOutcome, CurrawongError> {
    let closed_ref_outcome = match cluster_features_closed_reference(
        sequences_fasta,
        table,
        reference_sequences_fasta,
        params,
    ) {
        Ok(outcome) => Some(outcome),
        Err(CurrawongError::NoMatches) => {
            info!("No features matched the reference, clustering the entire input de novo");
            None
        }
        Err(e) => return Err(e),
    };

    let skipped_closed_ref = closed_ref_outcome.is_none();
    let (closed_ref_table, closed_ref_rep_seqs, unmatched_seqs) = match closed_ref_outcome {
        Some(outcome) => (
            outcome.table,
            outcome.matched_rep_seqs,
            outcome.unmatched_seqs,
        ),
        None => (
            table.clone(),
            vec![],
            fasta_io::read_fasta(sequences_fasta)?,
        ),
    };

    let reference_seqs = fasta_io::read_fasta(reference_sequences_fasta)?;

    if unmatched_seqs.is_empty() {
        info!("Every feature matched the reference, skipping de novo clustering");
        return Ok(OpenReferenceOutcome {
            table: closed_ref_table,
            rep_seqs: closed_ref_rep_seqs,
            new_reference_seqs: reference_seqs,
        });
    }

    let unmatched_ids: BTreeSet<String> =
        unmatched_seqs.iter().map(|r| r.id.clone()).collect();
    let unmatched_table = table.filter_observations(&unmatched_ids, false);
    let unmatched_fasta = tempfile::Builder::new()
        .prefix("currawong-unmatched")
        .suffix(".fasta")
        .tempfile()?;
    fasta_io::write_fasta(&unmatched_seqs, unmatched_fasta.path())?;

    let de_novo_params = DeNovoParams {
        perc_identity: params.perc_identity,
        threads: params.threads,
    };
    let (de_novo_table, de_novo_seqs) =
        cluster_features_de_novo(unmatched_fasta.path(), &unmatched_table, &de_novo_params)?;

    let mut new_reference_seqs = reference_seqs;
    new_reference_seqs.extend(de_novo_seqs.iter().cloned());

    if skipped_closed_ref {
        Ok(OpenReferenceOutcome {
            table: de_novo_table,
            rep_seqs: de_novo_seqs,
            new_reference_seqs,
        })
    } else {
        let merged_table = closed_ref_table.merge_disjoint(&de_novo_table)?;
        let mut rep_seqs = closed_ref_rep_seqs;
        rep_seqs.extend(de_novo_seqs);
        Ok(OpenReferenceOutcome {
            table: merged_table,
            rep_seqs,
            new_reference_seqs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uc_parser::FeatureClusterMap;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn record(id: &str, sequence: &str) -> FastaRecord {
        FastaRecord {
            id: id.to_string(),
            description: None,
            sequence: sequence.to_string(),
        }
    }

    #[test]
    fn test_strand_round_trip() {
        init();
        assert_eq!(Strand::Plus, "plus".parse().unwrap());
        assert_eq!(Strand::Both, "both".parse().unwrap());
        assert_eq!("plus", Strand::Plus.as_arg());
        assert!("minus".parse::<Strand>().is_err());
    }

    #[test]
    fn test_resolve_clusters_single_cluster_scenario() {
        init();
        // four features with summed counts [100, 1, 4, 7] all joining one
        // cluster seeded by feature1
        let mut table = AbundanceTable::new();
        table.add("feature1", "sample1", 40.0);
        table.add("feature1", "sample2", 60.0);
        table.add("feature2", "sample1", 1.0);
        table.add("feature3", "sample2", 4.0);
        table.add("feature4", "sample1", 3.0);
        table.add("feature4", "sample2", 4.0);
        let sequences = vec![
            record("feature1", "AAAA"),
            record("feature2", "CCCC"),
            record("feature3", "GGGG"),
            record("feature4", "TTTT"),
        ];
        let uc = "\
S\t0\t4\t*\t*\t*\t*\t*\tfeature1;size=100\t*
H\t0\t4\t100.0\t+\t0\t0\t4M\tfeature2;size=1\tfeature1;size=100
H\t0\t4\t100.0\t+\t0\t0\t4M\tfeature3;size=4\tfeature1;size=100
H\t0\t4\t100.0\t+\t0\t0\t4M\tfeature4;size=7\tfeature1;size=100
";
        let membership = FeatureClusterMap::from_uc_reader(uc.as_bytes()).unwrap();
        let (collapsed, reps) = resolve_clusters(&table, &sequences, &membership).unwrap();
        assert_eq!(vec!["feature1"], collapsed.observation_ids());
        assert_eq!(112.0, collapsed.total());
        assert_eq!(44.0, collapsed.get("feature1", "sample1"));
        assert_eq!(68.0, collapsed.get("feature1", "sample2"));
        assert_eq!(1, reps.len());
        assert_eq!("feature1", reps[0].id);
        assert_eq!("AAAA", reps[0].sequence);
    }

    #[test]
    fn test_resolve_clusters_injective_membership_is_identity() {
        init();
        let mut table = AbundanceTable::new();
        table.add("feature1", "sample1", 2.0);
        table.add("feature2", "sample1", 5.0);
        let sequences = vec![record("feature1", "AAAA"), record("feature2", "CCCC")];
        let uc = "\
S\t0\t4\t*\t*\t*\t*\t*\tfeature1;size=2\t*
S\t1\t4\t*\t*\t*\t*\t*\tfeature2;size=5\t*
";
        let membership = FeatureClusterMap::from_uc_reader(uc.as_bytes()).unwrap();
        let (collapsed, reps) = resolve_clusters(&table, &sequences, &membership).unwrap();
        assert_eq!(table, collapsed);
        assert_eq!(sequences, reps);
    }

    #[test]
    fn test_run_command_failure_records_command_line() {
        init();
        let mut cmd = Command::new("false");
        match run_command(&mut cmd, "false") {
            Err(CurrawongError::ExternalCommand { command_line, .. }) => {
                assert!(command_line.contains("false"))
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_run_command_success() {
        init();
        let mut cmd = Command::new("true");
        run_command(&mut cmd, "true").unwrap();
    }
}
