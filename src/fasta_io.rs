use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use needletail::parse_fastx_file;

use crate::abundance_table::AbundanceTable;
use crate::CurrawongError;

#[derive(Debug, Clone, PartialEq)]
pub struct FastaRecord {
    pub id: String,
    /// Remainder of the header line after the id, when present.
    pub description: Option<String>,
    pub sequence: String,
}

/// Read all records from a FASTA file. The id is the first
/// whitespace-delimited token of the header. An empty file yields zero
/// records rather than an error.
pub fn read_fasta(path: &Path) -> Result<Vec<FastaRecord>, CurrawongError> {
    if std::fs::metadata(path)?.len() == 0 {
        return Ok(vec![]);
    }
    let mut reader = parse_fastx_file(path)?;
    let mut records = vec![];
    while let Some(record_res) = reader.next() {
        let record = record_res?;
        let header = String::from_utf8_lossy(record.id()).to_string();
        let mut parts = header.splitn(2, char::is_whitespace);
        let id = match parts.next() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(CurrawongError::MalformedFasta(format!(
                    "Record with an empty id in {}",
                    path.to_string_lossy()
                )))
            }
        };
        let description = parts
            .next()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let sequence = String::from_utf8_lossy(&record.seq()).to_string();
        records.push(FastaRecord {
            id,
            description,
            sequence,
        });
    }
    debug!(
        "Read in {} sequences from {}",
        records.len(),
        path.to_string_lossy()
    );
    Ok(records)
}

/// Index records by feature id, erroring on duplicates since feature ids
/// must be unique within a sequence set.
pub fn sequence_map(records: &[FastaRecord]) -> Result<BTreeMap<String, String>, CurrawongError> {
    let mut map = BTreeMap::new();
    for record in records {
        if map
            .insert(record.id.clone(), record.sequence.clone())
            .is_some()
        {
            return Err(CurrawongError::MalformedFasta(format!(
                "The feature id '{}' was found multiple times in the sequence set",
                record.id
            )));
        }
    }
    Ok(map)
}

/// Split a `;size=N` abundance annotation off a sequence label, returning
/// the bare label and the parsed size. The split is taken at the last
/// occurrence of the annotation since ids may themselves contain it. Labels
/// without a parseable annotation are returned unchanged.
pub fn split_size_annotation(label: &str) -> (&str, Option<u64>) {
    match label.rfind(";size=") {
        Some(pos) => {
            let digits = label[pos + ";size=".len()..].trim_end_matches(';');
            match digits.parse::<u64>() {
                Ok(size) => (&label[..pos], Some(size)),
                Err(_) => (label, None),
            }
        }
        None => (label, None),
    }
}

/// Read a FASTA file whose labels carry `;size=N` annotations, stripping
/// the annotation from each id and returning it alongside the record.
pub fn read_sized_fasta(
    path: &Path,
) -> Result<Vec<(FastaRecord, Option<u64>)>, CurrawongError> {
    read_fasta(path)?
        .into_iter()
        .map(|record| {
            let (bare_id, size) = split_size_annotation(&record.id);
            let bare_id = bare_id.to_string();
            Ok((
                FastaRecord {
                    id: bare_id,
                    description: record.description,
                    sequence: record.sequence,
                },
                size,
            ))
        })
        .collect()
}

pub fn write_fasta(records: &[FastaRecord], path: &Path) -> Result<(), CurrawongError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        writeln!(writer, ">{}", record.id)?;
        writeln!(writer, "{}", record.sequence)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write sequences annotated with each feature's total abundance
/// (`>id;size=N`) so that vsearch's abundance-aware processing has
/// per-feature counts. Enforces id consistency between the table and the
/// sequence set: a sequence without a table row, or a table row without a
/// sequence, is a hard validation error naming the offending ids.
pub fn write_fasta_with_sizes(
    sequences: &[FastaRecord],
    table: &AbundanceTable,
    output_path: &Path,
) -> Result<(), CurrawongError> {
    let mut writer = BufWriter::new(File::create(output_path)?);
    let mut sequence_ids = BTreeSet::new();
    for record in sequences {
        sequence_ids.insert(record.id.as_str());
        let size = table
            .observation_sum(&record.id)
            .ok_or_else(|| CurrawongError::IdMismatch {
                present_in: "sequences",
                absent_from: "table",
                ids: vec![record.id.clone()],
            })?;
        writeln!(writer, ">{};size={}", record.id, size as u64)?;
        writeln!(writer, "{}", record.sequence)?;
    }
    writer.flush()?;

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
    Ok(())
}
