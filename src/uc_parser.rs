use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::abundance_table::AbundanceTable;
use crate::fasta_io::split_size_annotation;
use crate::CurrawongError;

/// One parsed membership record: the cluster a feature joined, and the
/// feature's total abundance when the record carried a `;size=N` annotation.
/// Seed records carry no count; the caller looks the seed's own count up
/// from the abundance table when it needs one.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub cluster_id: String,
    pub count: Option<u64>,
}

/// Mapping from feature id to the cluster it was assigned to, parsed from a
/// vsearch uc-format membership file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureClusterMap {
    map: BTreeMap<String, Membership>,
}

impl FeatureClusterMap {
    pub fn from_uc_path(path: &Path) -> Result<FeatureClusterMap, CurrawongError> {
        FeatureClusterMap::from_uc_reader(File::open(path)?)
    }

    /// Parse tab-delimited uc records. Seed (S) records open a new cluster
    /// whose id is the feature's own id; hit (H) records join the feature to
    /// the centroid named in the target field. Library seed (L) records and
    /// all other markers are ignored. Fails with the empty-membership
    /// condition when zero feature ids were captured, which closed-reference
    /// clustering uses to detect that nothing matched the reference.
    pub fn from_uc_reader<R: Read>(reader: R) -> Result<FeatureClusterMap, CurrawongError> {
        let mut map: BTreeMap<String, Membership> = BTreeMap::new();
        for (line_index, line_res) in BufReader::new(reader).lines().enumerate() {
            let line = line_res?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match fields[0] {
                "S" => {
                    if fields.len() < 9 {
                        return Err(CurrawongError::MalformedUc(format!(
                            "Expected at least 9 fields in the seed record at line {}",
                            line_index + 1
                        )));
                    }
                    // the query label may carry a size annotation; the id is
                    // everything before the first ';'
                    let feature_id = fields[8].split(';').next().unwrap_or("").to_string();
                    insert_unique(
                        &mut map,
                        feature_id.clone(),
                        Membership {
                            cluster_id: feature_id,
                            count: None,
                        },
                    )?;
                }
                "H" => {
                    if fields.len() < 10 {
                        return Err(CurrawongError::MalformedUc(format!(
                            "Expected at least 10 fields in the hit record at line {}",
                            line_index + 1
                        )));
                    }
                    let cluster_id = fields[9].split(';').next().unwrap_or("").to_string();
                    let (feature_id, count) = split_size_annotation(fields[8]);
                    let count = count.ok_or_else(|| {
                        CurrawongError::MalformedUc(format!(
                            "The query label '{}' at line {} is missing its ;size= annotation",
                            fields[8],
                            line_index + 1
                        ))
                    })?;
                    insert_unique(
                        &mut map,
                        feature_id.to_string(),
                        Membership {
                            cluster_id,
                            count: Some(count),
                        },
                    )?;
                }
                _ => {}
            }
        }
        if map.is_empty() {
            return Err(CurrawongError::EmptyMembership);
        }
        debug!("Parsed membership records for {} features", map.len());
        Ok(FeatureClusterMap { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn cluster_of(&self, feature_id: &str) -> Option<&str> {
        self.map.get(feature_id).map(|m| m.cluster_id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Membership)> {
        self.map.iter()
    }

    /// The feature-to-cluster relabelling passed to the table collapse.
    pub fn collapse_mapping(&self) -> BTreeMap<String, String> {
        self.map
            .iter()
            .map(|(feature_id, membership)| (feature_id.clone(), membership.cluster_id.clone()))
            .collect()
    }
}

fn insert_unique(
    map: &mut BTreeMap<String, Membership>,
    feature_id: String,
    membership: Membership,
) -> Result<(), CurrawongError> {
    if map.insert(feature_id.clone(), membership).is_some() {
        return Err(CurrawongError::MalformedUc(format!(
            "The feature id '{}' appeared in more than one membership record",
            feature_id
        )));
    }
    Ok(())
}

/// Parse the uc output of a dereplication run into an abundance table. Each
/// seed or hit record contributes one count to (seed label, sample id),
/// where the sample id comes from the `<sample>_<read number>` query label
/// convention. The label is split at the last underscore, not the first,
/// since sample ids may themselves contain underscores.
pub fn parse_dereplication_uc<R: Read>(reader: R) -> Result<AbundanceTable, CurrawongError> {
    let mut table = AbundanceTable::new();
    for (line_index, line_res) in BufReader::new(reader).lines().enumerate() {
        let line = line_res?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let (observation_label, query_label) = match fields[0] {
            "S" => {
                if fields.len() < 9 {
                    return Err(CurrawongError::MalformedUc(format!(
                        "Expected at least 9 fields in the seed record at line {}",
                        line_index + 1
                    )));
                }
                (fields[8], fields[8])
            }
            "H" => {
                if fields.len() < 10 {
                    return Err(CurrawongError::MalformedUc(format!(
                        "Expected at least 10 fields in the hit record at line {}",
                        line_index + 1
                    )));
                }
                (fields[9], fields[8])
            }
            _ => continue,
        };
        let sample_id = match query_label.rfind('_') {
            Some(pos) => &query_label[..pos],
            None => {
                return Err(CurrawongError::MalformedUc(format!(
                    "The query label '{}' at line {} does not follow the \
                     <sample>_<read number> convention",
                    query_label,
                    line_index + 1
                )))
            }
        };
        table.add(observation_label, sample_id, 1.0);
    }
    if table.is_empty() {
        return Err(CurrawongError::EmptyMembership);
    }
    Ok(table)
}
