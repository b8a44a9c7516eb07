use std::path::Path;
use std::process::Command;

use crate::abundance_table::AbundanceTable;
use crate::cluster_features::run_command;
use crate::external_command_checker;
use crate::fasta_io;
use crate::CurrawongError;

/// Numeric knobs forwarded verbatim to vsearch's uchime implementations.
/// Scoring itself happens entirely in the external tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UchimeParams {
    pub dn: f64,
    pub min_diffs: u32,
    pub min_div: f64,
    pub min_h: f64,
    pub xn: f64,
}

impl Default for UchimeParams {
    fn default() -> UchimeParams {
        UchimeParams {
            dn: 1.4,
            min_diffs: 3,
            min_div: 0.8,
            min_h: 0.28,
            xn: 8.0,
        }
    }
}

/// Flag chimeric features de novo from abundance-sorted sequences. vsearch
/// writes the chimera, non-chimera and score files directly to the given
/// paths.
pub fn uchime_denovo(
    sequences_fasta: &Path,
    table: &AbundanceTable,
    params: &UchimeParams,
    output_chimeras: &Path,
    output_nonchimeras: &Path,
    output_stats: &Path,
) -> Result<(), CurrawongError> {
    let sequences = fasta_io::read_fasta(sequences_fasta)?;
    let sized_fasta = tempfile::Builder::new()
        .prefix("currawong-sized")
        .suffix(".fasta")
        .tempfile()?;
    fasta_io::write_fasta_with_sizes(&sequences, table, sized_fasta.path())?;

    external_command_checker::check_for_vsearch();
    let mut cmd = Command::new("vsearch");
    cmd.arg("--uchime_denovo").arg(sized_fasta.path());
    add_uchime_args(
        &mut cmd,
        params,
        output_chimeras,
        output_nonchimeras,
        output_stats,
    );
    run_command(&mut cmd, "vsearch --uchime_denovo")
}

/// Flag chimeric features against a reference set.
pub fn uchime_ref(
    sequences_fasta: &Path,
    table: &AbundanceTable,
    reference_sequences_fasta: &Path,
    params: &UchimeParams,
    threads: u16,
    output_chimeras: &Path,
    output_nonchimeras: &Path,
    output_stats: &Path,
) -> Result<(), CurrawongError> {
    let sequences = fasta_io::read_fasta(sequences_fasta)?;
    let sized_fasta = tempfile::Builder::new()
        .prefix("currawong-sized")
        .suffix(".fasta")
        .tempfile()?;
    fasta_io::write_fasta_with_sizes(&sequences, table, sized_fasta.path())?;

    external_command_checker::check_for_vsearch();
    let mut cmd = Command::new("vsearch");
    cmd.arg("--uchime_ref")
        .arg(sized_fasta.path())
        .arg("--db")
        .arg(reference_sequences_fasta)
        .arg("--threads")
        .arg(format!("{}", threads));
    add_uchime_args(
        &mut cmd,
        params,
        output_chimeras,
        output_nonchimeras,
        output_stats,
    );
    run_command(&mut cmd, "vsearch --uchime_ref")
}

fn add_uchime_args(
    cmd: &mut Command,
    params: &UchimeParams,
    output_chimeras: &Path,
    output_nonchimeras: &Path,
    output_stats: &Path,
) {
    cmd.arg("--uchimeout")
        .arg(output_stats)
        .arg("--nonchimeras")
        .arg(output_nonchimeras)
        .arg("--chimeras")
        .arg(output_chimeras)
        .arg("--dn")
        .arg(format!("{}", params.dn))
        .arg("--mindiffs")
        .arg(format!("{}", params.min_diffs))
        .arg("--mindiv")
        .arg(format!("{}", params.min_div))
        .arg("--minh")
        .arg(format!("{}", params.min_h))
        .arg("--xn")
        .arg(format!("{}", params.xn))
        .arg("--qmask")
        .arg("none") // ensures no lowercase DNA chars
        .arg("--xsize")
        .arg("--minseqlength")
        .arg("1")
        .arg("--fasta_width")
        .arg("0");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uchime_params() {
        let params = UchimeParams::default();
        assert_eq!(1.4, params.dn);
        assert_eq!(3, params.min_diffs);
        assert_eq!(0.8, params.min_div);
        assert_eq!(0.28, params.min_h);
        assert_eq!(8.0, params.xn);
    }
}
