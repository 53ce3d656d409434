//! Re-deriving and verifying the membership index from the primary store.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ldp_index::IndexQuery;
use ldp_types::MemberType;

use crate::context::Context;
use crate::error::{RepositoryError, RepositoryResult};
use crate::store_repository::StoreRepository;

/// Outcome of a full index rebuild.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub partitions_rebuilt: usize,
    pub rows_written: usize,
    pub orphans_dropped: usize,
}

/// One way the index disagrees with the primary store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// A container has no index partition.
    MissingPartition { container: String },
    /// A partition exists for a container the store does not know.
    OrphanPartition { container: String },
    CountMismatch {
        container: String,
        primary: usize,
        index: usize,
    },
    MissingRow { container: String, member: String },
    ExtraRow { container: String, member: String },
    TypeMismatch {
        container: String,
        member: String,
        primary: MemberType,
        index: MemberType,
    },
    /// Same rows, different insertion order.
    OrderMismatch { container: String },
}

impl Divergence {
    pub fn container(&self) -> &str {
        match self {
            Divergence::MissingPartition { container }
            | Divergence::OrphanPartition { container }
            | Divergence::CountMismatch { container, .. }
            | Divergence::MissingRow { container, .. }
            | Divergence::ExtraRow { container, .. }
            | Divergence::TypeMismatch { container, .. }
            | Divergence::OrderMismatch { container } => container,
        }
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::MissingPartition { container } => {
                write!(f, "{container}: no index partition")
            }
            Divergence::OrphanPartition { container } => {
                write!(f, "{container}: index partition without container")
            }
            Divergence::CountMismatch {
                container,
                primary,
                index,
            } => write!(f, "{container}: {primary} member(s) stored, {index} indexed"),
            Divergence::MissingRow { container, member } => {
                write!(f, "{container}: member {member} not indexed")
            }
            Divergence::ExtraRow { container, member } => {
                write!(f, "{container}: indexed member {member} not stored")
            }
            Divergence::TypeMismatch {
                container,
                member,
                primary,
                index,
            } => write!(f, "{container}: member {member} stored as {primary}, indexed as {index}"),
            Divergence::OrderMismatch { container } => {
                write!(f, "{container}: index order differs from stored order")
            }
        }
    }
}

/// Result of comparing the index against the primary store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub containers_checked: usize,
    pub members_checked: usize,
    pub divergences: Vec<Divergence>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }

    /// Distinct containers whose partitions need a rebuild, sorted.
    pub fn divergent_containers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .divergences
            .iter()
            .map(|d| d.container().to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }
}

impl StoreRepository {
    pub(crate) async fn rebuild_one(&self, ctx: &Context, id: &str) -> RepositoryResult<usize> {
        let _guard = self.locks.write(ctx, id).await?;
        let (record, _) = self.load(id)?;
        ctx.check()?;
        let members = &record.container.members;
        self.index.replace_partition(id, members)?;
        info!(container = id, rows = members.len(), "index partition rebuilt");
        Ok(members.len())
    }

    pub(crate) async fn rebuild_everything(&self, ctx: &Context) -> RepositoryResult<RebuildSummary> {
        let mut summary = RebuildSummary::default();
        let ids = self.store.ids()?;
        for id in &ids {
            match self.rebuild_one(ctx, id).await {
                Ok(rows) => {
                    summary.partitions_rebuilt += 1;
                    summary.rows_written += rows;
                }
                // Deleted since the id scan.
                Err(RepositoryError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let known: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for partition in self.index.partitions()? {
            if known.contains(partition.as_str()) {
                continue;
            }
            let _guard = self.locks.write(ctx, &partition).await?;
            if self.store.exists(&partition)? {
                continue;
            }
            if self.index.drop_partition(&partition)? {
                warn!(container = %partition, "dropped orphan index partition");
                summary.orphans_dropped += 1;
            }
        }

        info!(
            partitions = summary.partitions_rebuilt,
            rows = summary.rows_written,
            orphans = summary.orphans_dropped,
            "index rebuilt"
        );
        Ok(summary)
    }

    pub(crate) async fn check_consistency(&self, ctx: &Context) -> RepositoryResult<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        let ids = self.store.ids()?;
        for id in &ids {
            let _guard = self.locks.read(ctx, id).await?;
            let Some(record) = self.store.read(id)? else {
                continue;
            };
            report.containers_checked += 1;
            let stored = &record.container.members;
            report.members_checked += stored.len();

            if !self.index.has_partition(id)? {
                report.divergences.push(Divergence::MissingPartition {
                    container: id.clone(),
                });
                continue;
            }
            let indexed = self.index.select(id, &IndexQuery::all())?;
            if indexed.len() != stored.len() {
                report.divergences.push(Divergence::CountMismatch {
                    container: id.clone(),
                    primary: stored.len(),
                    index: indexed.len(),
                });
            }

            let by_id: HashMap<&str, MemberType> = indexed
                .iter()
                .map(|e| (e.member_id.as_str(), e.member_type))
                .collect();
            let stored_ids: HashSet<&str> = stored.iter().map(|m| m.id.as_str()).collect();
            for member in stored {
                match by_id.get(member.id.as_str()) {
                    None => report.divergences.push(Divergence::MissingRow {
                        container: id.clone(),
                        member: member.id.clone(),
                    }),
                    Some(&t) if t != member.member_type => {
                        report.divergences.push(Divergence::TypeMismatch {
                            container: id.clone(),
                            member: member.id.clone(),
                            primary: member.member_type,
                            index: t,
                        })
                    }
                    Some(_) => {}
                }
            }
            for entry in &indexed {
                if !stored_ids.contains(entry.member_id.as_str()) {
                    report.divergences.push(Divergence::ExtraRow {
                        container: id.clone(),
                        member: entry.member_id.clone(),
                    });
                }
            }
            let same_set = indexed.len() == stored.len()
                && indexed.iter().all(|e| stored_ids.contains(e.member_id.as_str()));
            if same_set && !indexed.iter().zip(stored).all(|(e, m)| e.member_id == m.id) {
                report.divergences.push(Divergence::OrderMismatch {
                    container: id.clone(),
                });
            }
        }

        let known: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for partition in self.index.partitions()? {
            if !known.contains(partition.as_str()) && !self.store.exists(&partition)? {
                report.divergences.push(Divergence::OrphanPartition {
                    container: partition,
                });
            }
        }

        if !report.is_consistent() {
            warn!(divergences = report.divergences.len(), "index diverges from primary store");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_helpers() {
        let report = ConsistencyReport {
            containers_checked: 2,
            members_checked: 3,
            divergences: vec![
                Divergence::MissingRow {
                    container: "b".into(),
                    member: "m".into(),
                },
                Divergence::OrphanPartition {
                    container: "a".into(),
                },
                Divergence::CountMismatch {
                    container: "b".into(),
                    primary: 2,
                    index: 1,
                },
            ],
        };
        assert!(!report.is_consistent());
        assert_eq!(report.divergent_containers(), ["a", "b"]);
        assert_eq!(
            report.divergences[2].to_string(),
            "b: 2 member(s) stored, 1 indexed"
        );
    }
}
