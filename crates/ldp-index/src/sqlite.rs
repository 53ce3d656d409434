//! Membership index on an embedded SQLite database.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use ldp_types::{Member, MemberType, Timestamp};

use crate::entry::{IndexEntry, IndexQuery, SortOrder};
use crate::error::{IndexError, IndexResult};
use crate::traits::MembershipIndex;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS partitions (
  container_id TEXT PRIMARY KEY,
  created_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS memberships (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  container_id TEXT NOT NULL REFERENCES partitions(container_id),
  member_id TEXT NOT NULL,
  member_type TEXT NOT NULL,
  inserted_at_ms INTEGER NOT NULL,
  UNIQUE (container_id, member_id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_container_seq
  ON memberships(container_id, seq);
CREATE INDEX IF NOT EXISTS idx_memberships_container_inserted
  ON memberships(container_id, inserted_at_ms, seq);
CREATE INDEX IF NOT EXISTS idx_memberships_container_type
  ON memberships(container_id, member_type, seq);
"#;

const SCHEMA_VERSION: &str = "1";

const SELECT_COLUMNS: &str = "container_id, member_id, member_type, inserted_at_ms, seq";

/// Raw row as read from SQLite, decoded after the statement finishes.
type RawRow = (String, String, String, i64, i64);

/// Durable membership index backed by SQLite.
///
/// A single connection is shared behind a mutex; SQLite serializes writers
/// anyway and every trait method is one short statement or transaction.
/// Timestamps are stored with millisecond precision.
pub struct SqliteMembershipIndex {
    conn: Mutex<Connection>,
}

impl SqliteMembershipIndex {
    /// Open (or create) an index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexError::Backend(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let index = Self::with_connection(conn)?;
        info!(path = %path.display(), "membership index opened");
        Ok(index)
    }

    /// A private in-memory database, mostly for tests.
    pub fn open_in_memory() -> IndexResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> IndexResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
            params!["schema_version", SCHEMA_VERSION],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> IndexResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IndexError::Backend(format!("connection lock poisoned: {e}")))
    }

    fn partition_exists(conn: &Connection, container_id: &str) -> IndexResult<bool> {
        Ok(conn
            .query_row(
                "SELECT 1 FROM partitions WHERE container_id = ?1",
                params![container_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn require_partition(conn: &Connection, container_id: &str) -> IndexResult<()> {
        if Self::partition_exists(conn, container_id)? {
            Ok(())
        } else {
            Err(IndexError::PartitionNotFound(container_id.to_string()))
        }
    }

    fn insert_row(tx: &Transaction<'_>, container_id: &str, member: &Member) -> IndexResult<IndexEntry> {
        let inserted_at_ms = member.added_at.timestamp_millis();
        tx.execute(
            "INSERT INTO memberships(container_id, member_id, member_type, inserted_at_ms) \
             VALUES (?1, ?2, ?3, ?4)",
            params![container_id, member.id, member.member_type.as_str(), inserted_at_ms],
        )?;
        let seq = tx.last_insert_rowid();
        decode_row((
            container_id.to_string(),
            member.id.clone(),
            member.member_type.as_str().to_string(),
            inserted_at_ms,
            seq,
        ))
    }

    fn collect_rows<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> IndexResult<Vec<IndexEntry>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let raw: Vec<RawRow> = stmt
            .query_map(params, |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<_, _>>()?;
        raw.into_iter().map(decode_row).collect()
    }
}

fn decode_row((container_id, member_id, member_type, inserted_at_ms, seq): RawRow) -> IndexResult<IndexEntry> {
    let member_type: MemberType = member_type
        .parse()
        .map_err(|e| IndexError::Corrupt(format!("row {seq}: {e}")))?;
    let inserted_at: Timestamp = Utc
        .timestamp_millis_opt(inserted_at_ms)
        .single()
        .ok_or_else(|| IndexError::Corrupt(format!("row {seq}: bad timestamp {inserted_at_ms}")))?;
    let seq = u64::try_from(seq).map_err(|_| IndexError::Corrupt(format!("negative seq {seq}")))?;
    Ok(IndexEntry {
        container_id,
        member_id,
        member_type,
        inserted_at,
        seq,
    })
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl MembershipIndex for SqliteMembershipIndex {
    fn create_partition(&self, container_id: &str) -> IndexResult<()> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO partitions(container_id, created_at_ms) VALUES (?1, ?2)",
            params![container_id, Utc::now().timestamp_millis()],
        )?;
        if inserted == 0 {
            return Err(IndexError::PartitionExists(container_id.to_string()));
        }
        debug!(container = container_id, "partition created");
        Ok(())
    }

    fn drop_partition(&self, container_id: &str) -> IndexResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            "DELETE FROM memberships WHERE container_id = ?1",
            params![container_id],
        )?;
        let dropped = tx.execute(
            "DELETE FROM partitions WHERE container_id = ?1",
            params![container_id],
        )?;
        tx.commit()?;
        debug!(container = container_id, rows, "partition dropped");
        Ok(dropped > 0)
    }

    fn has_partition(&self, container_id: &str) -> IndexResult<bool> {
        let conn = self.conn()?;
        Self::partition_exists(&conn, container_id)
    }

    fn partitions(&self) -> IndexResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT container_id FROM partitions ORDER BY container_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn insert(&self, container_id: &str, member: &Member) -> IndexResult<IndexEntry> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::require_partition(&tx, container_id)?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM memberships WHERE container_id = ?1 AND member_id = ?2",
                params![container_id, member.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(IndexError::DuplicateEntry {
                container: container_id.to_string(),
                member: member.id.clone(),
            });
        }
        let entry = Self::insert_row(&tx, container_id, member)?;
        tx.commit()?;
        Ok(entry)
    }

    fn remove(&self, container_id: &str, member_id: &str) -> IndexResult<bool> {
        let conn = self.conn()?;
        Self::require_partition(&conn, container_id)?;
        let removed = conn.execute(
            "DELETE FROM memberships WHERE container_id = ?1 AND member_id = ?2",
            params![container_id, member_id],
        )?;
        Ok(removed > 0)
    }

    fn contains(&self, container_id: &str, member_id: &str) -> IndexResult<bool> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT 1 FROM memberships WHERE container_id = ?1 AND member_id = ?2",
                params![container_id, member_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn count(&self, container_id: &str, member_type: Option<MemberType>) -> IndexResult<u64> {
        let conn = self.conn()?;
        Self::require_partition(&conn, container_id)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memberships \
             WHERE container_id = ?1 AND (?2 IS NULL OR member_type = ?2)",
            params![container_id, member_type.map(|t| t.as_str())],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn select(&self, container_id: &str, query: &IndexQuery) -> IndexResult<Vec<IndexEntry>> {
        let conn = self.conn()?;
        Self::require_partition(&conn, container_id)?;
        let order_by = match query.sort {
            SortOrder::Insertion => "seq ASC",
            SortOrder::NewestFirst => "inserted_at_ms DESC, seq DESC",
            SortOrder::MemberId => "member_id ASC",
        };
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM memberships \
             WHERE container_id = ?1 AND (?2 IS NULL OR member_type = ?2) \
             ORDER BY {order_by} LIMIT ?3 OFFSET ?4"
        );
        // SQLite treats a negative LIMIT as "no limit".
        let limit = query.limit.map(to_sql_int).unwrap_or(-1);
        Self::collect_rows(
            &conn,
            &sql,
            params![
                container_id,
                query.member_type.map(|t| t.as_str()),
                limit,
                to_sql_int(query.offset)
            ],
        )
    }

    fn select_after(
        &self,
        container_id: &str,
        after_seq: u64,
        limit: usize,
        member_type: Option<MemberType>,
    ) -> IndexResult<Vec<IndexEntry>> {
        let conn = self.conn()?;
        Self::require_partition(&conn, container_id)?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM memberships \
             WHERE container_id = ?1 AND seq > ?2 AND (?3 IS NULL OR member_type = ?3) \
             ORDER BY seq ASC LIMIT ?4"
        );
        Self::collect_rows(
            &conn,
            &sql,
            params![
                container_id,
                to_sql_int(after_seq),
                member_type.map(|t| t.as_str()),
                to_sql_int(limit as u64)
            ],
        )
    }

    fn replace_partition(&self, container_id: &str, members: &[Member]) -> IndexResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM memberships WHERE container_id = ?1",
            params![container_id],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO partitions(container_id, created_at_ms) VALUES (?1, ?2)",
            params![container_id, Utc::now().timestamp_millis()],
        )?;
        for member in members {
            match Self::insert_row(&tx, container_id, member) {
                Ok(_) => {}
                Err(IndexError::Sqlite(rusqlite::Error::SqliteFailure(e, _)))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Dropping `tx` rolls the whole rebuild back.
                    return Err(IndexError::DuplicateEntry {
                        container: container_id.to_string(),
                        member: member.id.clone(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        tx.commit()?;
        debug!(container = container_id, rows = members.len(), "partition rebuilt");
        Ok(())
    }
}

impl std::fmt::Debug for SqliteMembershipIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMembershipIndex").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use chrono::DateTime;

    #[test]
    fn conformance_suite() {
        conformance::run_all(|| {
            Box::new(SqliteMembershipIndex::open_in_memory().expect("open in-memory index"))
        });
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("members.db");
        {
            let index = SqliteMembershipIndex::open(&path).unwrap();
            index.create_partition("c").unwrap();
            index
                .insert(
                    "c",
                    &Member::new("m1", MemberType::Binary, DateTime::<Utc>::UNIX_EPOCH),
                )
                .unwrap();
        }
        let index = SqliteMembershipIndex::open(&path).unwrap();
        assert!(index.has_partition("c").unwrap());
        assert!(index.contains("c", "m1").unwrap());
        assert_eq!(index.count("c", Some(MemberType::Binary)).unwrap(), 1);
    }

    #[test]
    fn millisecond_timestamps_roundtrip() {
        let index = SqliteMembershipIndex::open_in_memory().unwrap();
        index.create_partition("c").unwrap();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let entry = index
            .insert("c", &Member::new("m", MemberType::Resource, at))
            .unwrap();
        assert_eq!(entry.inserted_at, at);
        let read = index.select("c", &IndexQuery::all()).unwrap();
        assert_eq!(read[0].inserted_at, at);
    }
}
