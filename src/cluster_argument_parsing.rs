use std::path::PathBuf;
use std::process;

use clap::*;

use bird_tool_utils::clap_utils::add_clap_verbosity_flags;

use crate::abundance_table::AbundanceTable;
use crate::chimera::{self, UchimeParams};
use crate::cluster_features::{self, ClosedReferenceParams, DeNovoParams, Strand};
use crate::dereplicate::{self, DerepMode};
use crate::fasta_io;
use crate::CurrawongError;

/// Parse a clap argument as a fraction, accepting either a 0-1 fraction or
/// a 1-100 percentage.
pub fn parse_percentage(
    m: &clap::ArgMatches,
    parameter: &str,
) -> std::result::Result<Option<f32>, String> {
    match m.get_one::<String>(parameter) {
        Some(value) => {
            let mut percentage: f32 = value
                .parse()
                .map_err(|_| format!("Failed to parse --{} value '{}'", parameter, value))?;
            if (1.0..=100.0).contains(&percentage) {
                percentage /= 100.0;
            } else if !(0.0..=100.0).contains(&percentage) {
                error!("Invalid alignment percentage: '{}'", percentage);
                return Err(format!(
                    "Invalid percentage specified for --{}: '{}'",
                    parameter, percentage
                ));
            }
            debug!("Using {} {}%", parameter, percentage * 100.0);
            Ok(Some(percentage))
        }
        None => Ok(None),
    }
}

fn unwrap_or_exit<T>(result: std::result::Result<T, CurrawongError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn path_value(m: &clap::ArgMatches, parameter: &str) -> PathBuf {
    PathBuf::from(m.get_one::<String>(parameter).unwrap())
}

fn percentage_or_exit(m: &clap::ArgMatches, parameter: &str) -> f32 {
    match parse_percentage(m, parameter) {
        Ok(Some(fraction)) => fraction,
        Ok(None) => {
            error!("--{} was unexpectedly not specified", parameter);
            process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn numeric_or_exit<T: std::str::FromStr>(m: &clap::ArgMatches, parameter: &str) -> T {
    let value = m.get_one::<String>(parameter).unwrap();
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            error!("Failed to parse --{} value '{}'", parameter, value);
            process::exit(1);
        }
    }
}

fn sequences_arg() -> Arg {
    Arg::new("sequences")
        .long("sequences")
        .required(true)
        .help("FASTA file of feature sequences")
}

fn table_arg() -> Arg {
    Arg::new("table")
        .long("table")
        .required(true)
        .help("Feature table TSV: '#OTU ID' header then one sample id per column")
}

fn threads_arg() -> Arg {
    Arg::new("threads")
        .short('t')
        .long("threads")
        .default_value(crate::DEFAULT_THREADS)
        .help("Number of threads to give vsearch")
}

pub fn add_cluster_de_novo_subcommand(app: Command) -> Command {
    app.subcommand(
        add_clap_verbosity_flags(Command::new("cluster-de-novo"))
            .about("Cluster features de novo by sequence identity")
            .arg(sequences_arg())
            .arg(table_arg())
            .arg(
                Arg::new("perc-identity")
                    .long("perc-identity")
                    .required(true)
                    .help("Identity threshold for clustering, e.g. 97 or 0.97"),
            )
            .arg(threads_arg())
            .arg(
                Arg::new("output-table")
                    .long("output-table")
                    .required(true)
                    .help("Path to write the clustered feature table"),
            )
            .arg(
                Arg::new("output-rep-seqs")
                    .long("output-rep-seqs")
                    .required(true)
                    .help("Path to write one representative sequence per cluster"),
            ),
    )
}

pub fn run_cluster_de_novo_subcommand(m: &clap::ArgMatches) {
    let table = unwrap_or_exit(AbundanceTable::read_tsv(&path_value(m, "table")));
    let params = DeNovoParams {
        perc_identity: percentage_or_exit(m, "perc-identity"),
        threads: numeric_or_exit(m, "threads"),
    };
    let (collapsed, rep_seqs) = unwrap_or_exit(cluster_features::cluster_features_de_novo(
        &path_value(m, "sequences"),
        &table,
        &params,
    ));
    unwrap_or_exit(collapsed.write_tsv(&path_value(m, "output-table")));
    unwrap_or_exit(fasta_io::write_fasta(
        &rep_seqs,
        &path_value(m, "output-rep-seqs"),
    ));
    info!(
        "Wrote {} clusters over {} samples",
        collapsed.num_observations(),
        collapsed.num_samples()
    );
}

fn reference_args(subcommand: Command) -> Command {
    subcommand
        .arg(sequences_arg())
        .arg(table_arg())
        .arg(
            Arg::new("reference-sequences")
                .long("reference-sequences")
                .required(true)
                .help("FASTA file of reference sequences to cluster against"),
        )
        .arg(
            Arg::new("perc-identity")
                .long("perc-identity")
                .required(true)
                .help("Identity threshold for matching the reference, e.g. 97 or 0.97"),
        )
        .arg(
            Arg::new("strand")
                .long("strand")
                .default_value(crate::DEFAULT_STRAND)
                .value_parser(["plus", "both"])
                .help("Search the reference with the given query strand(s)"),
        )
        .arg(threads_arg())
        .arg(
            Arg::new("output-table")
                .long("output-table")
                .required(true)
                .help("Path to write the clustered feature table"),
        )
        .arg(
            Arg::new("output-rep-seqs")
                .long("output-rep-seqs")
                .required(true)
                .help("Path to write one representative sequence per cluster"),
        )
}

fn closed_reference_params(m: &clap::ArgMatches) -> ClosedReferenceParams {
    let strand: Strand = match m.get_one::<String>("strand").unwrap().parse() {
        Ok(strand) => strand,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    ClosedReferenceParams {
        perc_identity: percentage_or_exit(m, "perc-identity"),
        strand,
        threads: numeric_or_exit(m, "threads"),
    }
}

pub fn add_cluster_closed_reference_subcommand(app: Command) -> Command {
    app.subcommand(
        reference_args(
            add_clap_verbosity_flags(Command::new("cluster-closed-reference"))
                .about("Cluster features against a fixed reference sequence set"),
        )
        .arg(
            Arg::new("output-unmatched-seqs")
                .long("output-unmatched-seqs")
                .required(true)
                .help("Path to write the sequences that matched no reference"),
        ),
    )
}

pub fn run_cluster_closed_reference_subcommand(m: &clap::ArgMatches) {
    let table = unwrap_or_exit(AbundanceTable::read_tsv(&path_value(m, "table")));
    let params = closed_reference_params(m);
    let outcome = unwrap_or_exit(cluster_features::cluster_features_closed_reference(
        &path_value(m, "sequences"),
        &table,
        &path_value(m, "reference-sequences"),
        &params,
    ));
    unwrap_or_exit(outcome.table.write_tsv(&path_value(m, "output-table")));
    unwrap_or_exit(fasta_io::write_fasta(
        &outcome.matched_rep_seqs,
        &path_value(m, "output-rep-seqs"),
    ));
    unwrap_or_exit(fasta_io::write_fasta(
        &outcome.unmatched_seqs,
        &path_value(m, "output-unmatched-seqs"),
    ));
    info!(
        "Wrote {} reference clusters and {} unmatched sequences",
        outcome.table.num_observations(),
        outcome.unmatched_seqs.len()
    );
}

pub fn add_cluster_open_reference_subcommand(app: Command) -> Command {
    app.subcommand(
        reference_args(
            add_clap_verbosity_flags(Command::new("cluster-open-reference")).about(
                "Cluster features against a reference, then de novo cluster the remainder",
            ),
        )
        .arg(
            Arg::new("output-new-reference-seqs")
                .long("output-new-reference-seqs")
                .required(true)
                .help("Path to write the reference set extended with new de novo clusters"),
        ),
    )
}

pub fn run_cluster_open_reference_subcommand(m: &clap::ArgMatches) {
    let table = unwrap_or_exit(AbundanceTable::read_tsv(&path_value(m, "table")));
    let params = closed_reference_params(m);
    let outcome = unwrap_or_exit(cluster_features::cluster_features_open_reference(
        &path_value(m, "sequences"),
        &table,
        &path_value(m, "reference-sequences"),
        &params,
    ));
    unwrap_or_exit(outcome.table.write_tsv(&path_value(m, "output-table")));
    unwrap_or_exit(fasta_io::write_fasta(
        &outcome.rep_seqs,
        &path_value(m, "output-rep-seqs"),
    ));
    unwrap_or_exit(fasta_io::write_fasta(
        &outcome.new_reference_seqs,
        &path_value(m, "output-new-reference-seqs"),
    ));
    info!(
        "Wrote {} clusters over {} samples",
        outcome.table.num_observations(),
        outcome.table.num_samples()
    );
}

pub fn add_dereplicate_subcommand(app: Command) -> Command {
    app.subcommand(
        add_clap_verbosity_flags(Command::new("dereplicate"))
            .about("Collapse identical sequences into unique features")
            .arg(
                Arg::new("sequences")
                    .long("sequences")
                    .required(true)
                    .help("FASTA file of reads labelled '<sample>_<read number>'"),
            )
            .arg(
                Arg::new("derep-prefix")
                    .long("derep-prefix")
                    .action(ArgAction::SetTrue)
                    .help("Collapse prefix-identical sequences rather than requiring full-length identity"),
            )
            .arg(
                Arg::new("output-table")
                    .long("output-table")
                    .required(true)
                    .help("Path to write the per-sample feature count table"),
            )
            .arg(
                Arg::new("output-seqs")
                    .long("output-seqs")
                    .required(true)
                    .help("Path to write the dereplicated sequences"),
            ),
    )
}

pub fn run_dereplicate_subcommand(m: &clap::ArgMatches) {
    let mode = if m.get_flag("derep-prefix") {
        DerepMode::Prefix
    } else {
        DerepMode::FullLength
    };
    let (table, records) = unwrap_or_exit(dereplicate::dereplicate_sequences(
        &path_value(m, "sequences"),
        mode,
    ));
    unwrap_or_exit(table.write_tsv(&path_value(m, "output-table")));
    unwrap_or_exit(fasta_io::write_fasta(&records, &path_value(m, "output-seqs")));
    info!(
        "Dereplicated into {} unique features over {} samples",
        table.num_observations(),
        table.num_samples()
    );
}

fn uchime_args(subcommand: Command) -> Command {
    subcommand
        .arg(sequences_arg())
        .arg(table_arg())
        .arg(
            Arg::new("dn")
                .long("dn")
                .default_value(crate::DEFAULT_UCHIME_DN)
                .help("No vote pseudo-count"),
        )
        .arg(
            Arg::new("mindiffs")
                .long("mindiffs")
                .default_value(crate::DEFAULT_UCHIME_MIN_DIFFS)
                .help("Minimum number of differences per segment"),
        )
        .arg(
            Arg::new("mindiv")
                .long("mindiv")
                .default_value(crate::DEFAULT_UCHIME_MIN_DIV)
                .help("Minimum divergence from closest parent"),
        )
        .arg(
            Arg::new("minh")
                .long("minh")
                .default_value(crate::DEFAULT_UCHIME_MIN_H)
                .help("Minimum score to be flagged as chimeric"),
        )
        .arg(
            Arg::new("xn")
                .long("xn")
                .default_value(crate::DEFAULT_UCHIME_XN)
                .help("No vote weight"),
        )
        .arg(
            Arg::new("output-chimeras")
                .long("output-chimeras")
                .required(true)
                .help("Path to write the sequences flagged as chimeric"),
        )
        .arg(
            Arg::new("output-nonchimeras")
                .long("output-nonchimeras")
                .required(true)
                .help("Path to write the sequences not flagged as chimeric"),
        )
        .arg(
            Arg::new("output-stats")
                .long("output-stats")
                .required(true)
                .help("Path to write vsearch's per-sequence chimera scores"),
        )
}

fn uchime_params(m: &clap::ArgMatches) -> UchimeParams {
    UchimeParams {
        dn: numeric_or_exit(m, "dn"),
        min_diffs: numeric_or_exit(m, "mindiffs"),
        min_div: numeric_or_exit(m, "mindiv"),
        min_h: numeric_or_exit(m, "minh"),
        xn: numeric_or_exit(m, "xn"),
    }
}

pub fn add_uchime_denovo_subcommand(app: Command) -> Command {
    app.subcommand(uchime_args(
        add_clap_verbosity_flags(Command::new("uchime-denovo"))
            .about("Flag chimeric features de novo with vsearch"),
    ))
}

pub fn run_uchime_denovo_subcommand(m: &clap::ArgMatches) {
    let table = unwrap_or_exit(AbundanceTable::read_tsv(&path_value(m, "table")));
    let params = uchime_params(m);
    unwrap_or_exit(chimera::uchime_denovo(
        &path_value(m, "sequences"),
        &table,
        &params,
        &path_value(m, "output-chimeras"),
        &path_value(m, "output-nonchimeras"),
        &path_value(m, "output-stats"),
    ));
}

pub fn add_uchime_ref_subcommand(app: Command) -> Command {
    app.subcommand(
        uchime_args(
            add_clap_verbosity_flags(Command::new("uchime-ref"))
                .about("Flag chimeric features against a reference with vsearch"),
        )
        .arg(
            Arg::new("reference-sequences")
                .long("reference-sequences")
                .required(true)
                .help("FASTA file of non-chimeric reference sequences"),
        )
        .arg(threads_arg()),
    )
}

pub fn run_uchime_ref_subcommand(m: &clap::ArgMatches) {
    let table = unwrap_or_exit(AbundanceTable::read_tsv(&path_value(m, "table")));
    let params = uchime_params(m);
    unwrap_or_exit(chimera::uchime_ref(
        &path_value(m, "sequences"),
        &table,
        &path_value(m, "reference-sequences"),
        &params,
        numeric_or_exit(m, "threads"),
        &path_value(m, "output-chimeras"),
        &path_value(m, "output-nonchimeras"),
        &path_value(m, "output-stats"),
    ));
}
