pub mod abundance_table;
pub mod chimera;
pub mod cluster_argument_parsing;
pub mod cluster_features;
pub mod dereplicate;
pub mod external_command_checker;
pub mod fasta_io;
pub mod rep_seqs;
pub mod uc_parser;

#[macro_use]
extern crate log;
extern crate clap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CurrawongError {
    /// The feature id sets of the table and the sequence set do not satisfy
    /// the relationship required by the calling pipeline.
    #[error("Some feature ids are present in {present_in}, but not in {absent_from}. \
             The set of features in sequences must correspond to the set of features \
             in the table. Offending feature ids: {id_list}", id_list = .ids.join(", "))]
    IdMismatch {
        present_in: &'static str,
        absent_from: &'static str,
        ids: Vec<String>,
    },

    /// The membership file contained zero usable records.
    #[error("No sequence matches were identified by vsearch")]
    EmptyMembership,

    /// Closed-reference clustering found nothing. Open-reference clustering
    /// catches exactly this variant to fall back to de novo clustering.
    #[error(
        "No matches were identified to the reference sequences. This can happen if \
         the query sequences are not homologous to the reference sequences, or if \
         they are not in the same orientation as the reference sequences (i.e., if \
         they are reverse complemented with respect to the reference sequences). \
         Sequence orientation can be adjusted with the strand parameter."
    )]
    NoMatches,

    /// The external tool exited with a non-zero status. The recorded command
    /// line references temporary files that no longer exist, so it cannot be
    /// re-run verbatim.
    #[error("External command failed ({status}): {command_line}\nstderr was: {stderr}")]
    ExternalCommand {
        command_line: String,
        status: String,
        stderr: String,
    },

    #[error("Malformed uc membership record: {0}")]
    MalformedUc(String),

    #[error("Malformed FASTA input: {0}")]
    MalformedFasta(String),

    #[error("Malformed feature table: {0}")]
    MalformedTable(String),

    /// The collapse mapping was not total over the table's feature ids.
    #[error("Feature '{0}' in the table is not assigned to any cluster")]
    UnmappedFeature(String),

    /// Row-disjoint table merge found the same cluster id in both tables.
    #[error("Cluster ids overlap between the tables being merged: {}", .0.join(", "))]
    OverlappingFeatures(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delimited text parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("FASTA parsing error: {0}")]
    FastaParse(#[from] needletail::errors::ParseError),
}

pub const DEFAULT_STRAND: &str = "plus";
pub const DEFAULT_THREADS: &str = "1";
pub const DEFAULT_UCHIME_DN: &str = "1.4";
pub const DEFAULT_UCHIME_MIN_DIFFS: &str = "3";
pub const DEFAULT_UCHIME_MIN_DIV: &str = "0.8";
pub const DEFAULT_UCHIME_MIN_H: &str = "0.28";
pub const DEFAULT_UCHIME_XN: &str = "8.0";

pub const AUTHOR: &str =
    "Ben J. Woodcroft, Centre for Microbiome Research, Queensland University of Technology";
