use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::process::Command;

use crate::abundance_table::AbundanceTable;
use crate::cluster_features::run_command;
use crate::external_command_checker;
use crate::fasta_io::{self, FastaRecord};
use crate::uc_parser;
use crate::CurrawongError;

/// Which dereplication flavour to ask vsearch for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerepMode {
    FullLength,
    Prefix,
}

impl DerepMode {
    fn as_flag(self) -> &'static str {
        match self {
            DerepMode::FullLength => "--derep_fulllength",
            DerepMode::Prefix => "--derep_prefix",
        }
    }
}

/// Collapse identical (or prefix-identical) reads into unique features.
/// Input read labels must follow the `<sample>_<read number>` convention.
/// Returns a feature table of per-sample read counts and the dereplicated
/// sequences, relabelled with vsearch's sha1 ids so that identical
/// sequences get identical feature ids across runs.
pub fn dereplicate_sequences(
    sequences_fasta: &Path,
    mode: DerepMode,
) -> Result<(AbundanceTable, Vec<FastaRecord>), CurrawongError> {
    let derep_fasta = tempfile::Builder::new()
        .prefix("currawong-derep")
        .suffix(".fasta")
        .tempfile()?;
    let uc = tempfile::Builder::new()
        .prefix("currawong-derep")
        .suffix(".uc")
        .tempfile()?;

    external_command_checker::check_for_vsearch();
    let mut cmd = Command::new("vsearch");
    cmd.arg(mode.as_flag())
        .arg(sequences_fasta)
        .arg("--output")
        .arg(derep_fasta.path())
        .arg("--relabel_sha1")
        .arg("--relabel_keep")
        .arg("--uc")
        .arg(uc.path())
        .arg("--qmask")
        .arg("none") // ensures no lowercase DNA chars
        .arg("--xsize");
    run_command(&mut cmd, "vsearch dereplication")?;

    let table = uc_parser::parse_dereplication_uc(File::open(uc.path())?)?;

    let dereplicated = fasta_io::read_fasta(derep_fasta.path())?;
    let table = table.update_observation_ids(&relabel_map(&dereplicated)?)?;

    let records = dereplicated
        .into_iter()
        .map(|record| FastaRecord {
            id: record.id,
            description: None,
            sequence: record.sequence,
        })
        .collect();
    Ok((table, records))
}

/// Map each original seed label to its sha1 id. --relabel_keep leaves the
/// original label as the description of each dereplicated record.
fn relabel_map(
    dereplicated: &[FastaRecord],
) -> Result<BTreeMap<String, String>, CurrawongError> {
    let mut id_map = BTreeMap::new();
    for record in dereplicated {
        let original_label = record.description.clone().ok_or_else(|| {
            CurrawongError::MalformedFasta(format!(
                "The dereplicated record '{}' is missing its original label",
                record.id
            ))
        })?;
        id_map.insert(original_label, record.id.clone());
    }
    Ok(id_map)
}
