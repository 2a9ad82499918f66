//! SQLite store.
//!
//! The result log is append-only with a monotonically increasing row id;
//! every "most recent" view orders by that id, never by the probe-assigned
//! timestamp (probe clocks skew). The single mutex-guarded connection makes
//! each store call atomic, which the incident open path relies on.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use thiserror::Error;

use super::models::*;
use crate::checker::{CheckKind, CheckResult};

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema error: {0}")]
    Schema(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checks (
    id               TEXT PRIMARY KEY,
    kind             TEXT NOT NULL,
    target           TEXT NOT NULL,
    webhook          TEXT NOT NULL DEFAULT '',
    interval_seconds INTEGER NOT NULL DEFAULT 30
);

CREATE TABLE IF NOT EXISTS probes (
    probe_id      TEXT PRIMARY KEY,
    version       TEXT NOT NULL,
    registered_at TEXT NOT NULL,
    last_seen_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS check_results (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    check_id   TEXT NOT NULL,
    probe_id   TEXT NOT NULL,
    kind       TEXT NOT NULL,
    target     TEXT NOT NULL,
    up         INTEGER NOT NULL,
    latency_ms INTEGER NOT NULL,
    error      TEXT NOT NULL DEFAULT '',
    timestamp  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_check_probe
    ON check_results (check_id, probe_id, id);

CREATE TABLE IF NOT EXISTS incidents (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    check_id    TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    resolved_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_one_open
    ON incidents (check_id) WHERE resolved_at IS NULL;
";

/// Thread-safe store over a single SQLite connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)
            .map_err(|e| DbError::Schema(e.to_string()))?;
        Ok(())
    }

    // --- Checks ---

    /// Insert checks that do not already exist. Existing rows (matched by id)
    /// are left unchanged, so a restart never overwrites dashboard edits.
    pub fn seed_checks(&self, checks: &[CheckSpec]) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO checks (id, kind, target, webhook, interval_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for check in checks {
            stmt.execute(params![
                check.id,
                check.kind.as_str(),
                check.target,
                check.webhook,
                check.interval_seconds,
            ])?;
        }
        Ok(())
    }

    /// All checks, ordered by id. This is what probes fetch.
    pub fn list_checks(&self) -> Result<Vec<CheckSpec>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, target, webhook, interval_seconds FROM checks ORDER BY id",
        )?;
        let checks = stmt
            .query_map([], |row| {
                Ok(CheckSpec {
                    id: row.get(0)?,
                    kind: parse_kind(1, &row.get::<_, String>(1)?)?,
                    target: row.get(2)?,
                    webhook: row.get(3)?,
                    interval_seconds: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(checks)
    }

    /// A single check by id, or `None` if it does not exist.
    pub fn get_check(&self, id: &str) -> Result<Option<CheckSpec>, DbError> {
        let conn = self.conn.lock().unwrap();
        let check = conn
            .query_row(
                "SELECT id, kind, target, webhook, interval_seconds FROM checks WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CheckSpec {
                        id: row.get(0)?,
                        kind: parse_kind(1, &row.get::<_, String>(1)?)?,
                        target: row.get(2)?,
                        webhook: row.get(3)?,
                        interval_seconds: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(check)
    }

    // --- Probes ---

    /// Insert or refresh a probe record on startup registration.
    pub fn register_probe(&self, probe_id: &str, version: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO probes (probe_id, version, registered_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (probe_id) DO UPDATE SET
             version = excluded.version,
             registered_at = excluded.registered_at,
             last_seen_at = excluded.last_seen_at",
            params![probe_id, version, now],
        )?;
        Ok(())
    }

    /// Refresh last_seen_at. Called for heartbeats and accepted results.
    pub fn touch_probe(&self, probe_id: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE probes SET last_seen_at = ?1 WHERE probe_id = ?2",
            params![Utc::now().to_rfc3339(), probe_id],
        )?;
        Ok(())
    }

    /// The full record for a registered probe, or `None` if it has never
    /// registered.
    pub fn get_probe(&self, probe_id: &str) -> Result<Option<ProbeRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let probe = conn
            .query_row(
                "SELECT probe_id, version, registered_at, last_seen_at
                 FROM probes WHERE probe_id = ?1",
                params![probe_id],
                |row| {
                    Ok(ProbeRecord {
                        probe_id: row.get(0)?,
                        version: row.get(1)?,
                        registered_at: parse_timestamp(2, &row.get::<_, String>(2)?)?,
                        last_seen_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
                    })
                },
            )
            .optional()?;
        Ok(probe)
    }

    pub fn is_probe_registered(&self, probe_id: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM probes WHERE probe_id = ?1",
            params![probe_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// last_seen_at for every registered probe.
    pub fn all_probe_statuses(&self) -> Result<Vec<ProbeStatus>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT probe_id, last_seen_at FROM probes ORDER BY probe_id")?;
        let statuses = stmt
            .query_map([], |row| {
                Ok(ProbeStatus {
                    probe_id: row.get(0)?,
                    last_seen_at: parse_timestamp(1, &row.get::<_, String>(1)?)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(statuses)
    }

    // --- Result log ---

    /// Append an observation to the result log.
    pub fn save_result(&self, result: &CheckResult) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO check_results (check_id, probe_id, kind, target, up, latency_ms, error, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.check_id,
                result.probe_id,
                result.kind.as_str(),
                result.target,
                result.up,
                result.latency_ms,
                result.error,
                result.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The quorum ballot: the most recent result for each probe that has ever
    /// reported for this check.
    pub fn latest_per_probe(&self, check_id: &str) -> Result<Vec<BallotEntry>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT probe_id, up
             FROM check_results
             WHERE id IN (
                 SELECT MAX(id)
                 FROM check_results
                 WHERE check_id = ?1
                 GROUP BY probe_id
             )",
        )?;
        let entries = stmt
            .query_map(params![check_id], |row| {
                Ok(BallotEntry {
                    probe_id: row.get(0)?,
                    up: row.get(1)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// Up/down flags of the last `n` results for a probe+check pair, newest
    /// first. Used for consecutive-failure detection.
    pub fn recent_for_probe(
        &self,
        check_id: &str,
        probe_id: &str,
        n: usize,
    ) -> Result<Vec<bool>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT up
             FROM check_results
             WHERE check_id = ?1 AND probe_id = ?2
             ORDER BY id DESC
             LIMIT ?3",
        )?;
        let ups = stmt
            .query_map(params![check_id, probe_id, n as i64], |row| row.get(0))?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(ups)
    }

    /// Delete result rows older than the cutoff. Returns the number deleted.
    pub fn evict_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM check_results WHERE timestamp < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(deleted)
    }

    // --- Status read model ---

    /// Current state of each check that has received at least one result,
    /// joined with any open incident.
    pub fn check_statuses(&self) -> Result<Vec<CheckStatus>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT cr.check_id, cr.target, cr.up, i.started_at
             FROM check_results cr
             INNER JOIN (
                 SELECT check_id, MAX(id) AS max_id
                 FROM check_results
                 GROUP BY check_id
             ) latest ON cr.id = latest.max_id
             LEFT JOIN (
                 SELECT check_id, MIN(started_at) AS started_at
                 FROM incidents
                 WHERE resolved_at IS NULL
                 GROUP BY check_id
             ) i ON cr.check_id = i.check_id
             ORDER BY cr.check_id",
        )?;
        let statuses = stmt
            .query_map([], |row| {
                let incident_since = match row.get::<_, Option<String>>(3)? {
                    Some(s) => Some(parse_timestamp(3, &s)?),
                    None => None,
                };
                Ok(CheckStatus {
                    check_id: row.get(0)?,
                    target: row.get(1)?,
                    up: row.get(2)?,
                    incident_since,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(statuses)
    }

    // --- Incidents ---

    /// Record a new incident for the check unless one is already open.
    ///
    /// Returns `true` when an incident was already open, so the caller skips
    /// the notification. The count-then-insert runs under the connection
    /// mutex, and the partial unique index on open incidents backs it up: an
    /// insert conflict is also reported as "already open", never as an error.
    pub fn open_incident(&self, check_id: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let open: i64 = conn.query_row(
            "SELECT COUNT(1) FROM incidents WHERE check_id = ?1 AND resolved_at IS NULL",
            params![check_id],
            |row| row.get(0),
        )?;
        if open > 0 {
            return Ok(true);
        }
        let inserted = conn.execute(
            "INSERT INTO incidents (check_id, started_at) VALUES (?1, ?2)",
            params![check_id, Utc::now().to_rfc3339()],
        );
        match inserted {
            Ok(_) => Ok(false),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark the open incident for the check as resolved. A no-op when no
    /// incident is open.
    pub fn resolve_incident(&self, check_id: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE incidents SET resolved_at = ?1 WHERE check_id = ?2 AND resolved_at IS NULL",
            params![Utc::now().to_rfc3339(), check_id],
        )?;
        Ok(())
    }

    /// The most recent incidents, newest first.
    pub fn list_incidents(&self, limit: usize) -> Result<Vec<Incident>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, check_id, started_at, resolved_at
             FROM incidents
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let incidents = stmt
            .query_map(params![limit as i64], |row| {
                let resolved_at = match row.get::<_, Option<String>>(3)? {
                    Some(s) => Some(parse_timestamp(3, &s)?),
                    None => None,
                };
                Ok(Incident {
                    id: row.get(0)?,
                    check_id: row.get(1)?,
                    started_at: parse_timestamp(2, &row.get::<_, String>(2)?)?,
                    resolved_at,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(incidents)
    }
}

fn parse_timestamp(idx: usize, s: &str) -> SqlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_kind(idx: usize, s: &str) -> SqlResult<CheckKind> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::NamedTempFile;

    fn test_store() -> (Store, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (store, tmp)
    }

    fn result(check_id: &str, probe_id: &str, up: bool) -> CheckResult {
        CheckResult {
            check_id: check_id.to_string(),
            probe_id: probe_id.to_string(),
            kind: CheckKind::Http,
            target: "https://example.com".to_string(),
            up,
            latency_ms: 12,
            error: if up { String::new() } else { "boom".to_string() },
            timestamp: Utc::now(),
        }
    }

    fn spec(id: &str, target: &str) -> CheckSpec {
        CheckSpec {
            id: id.to_string(),
            kind: CheckKind::Http,
            target: target.to_string(),
            webhook: String::new(),
            interval_seconds: 30,
        }
    }

    #[test]
    fn seed_checks_skips_existing() {
        let (store, _tmp) = test_store();

        store.seed_checks(&[spec("c1", "https://a.com")]).unwrap();
        // Seed again with a different target; the existing row must win.
        store.seed_checks(&[spec("c1", "https://b.com")]).unwrap();

        let check = store.get_check("c1").unwrap().unwrap();
        assert_eq!(check.target, "https://a.com");
        assert_eq!(store.list_checks().unwrap().len(), 1);
    }

    #[test]
    fn get_check_missing_is_none() {
        let (store, _tmp) = test_store();
        assert!(store.get_check("ghost").unwrap().is_none());
    }

    #[test]
    fn probe_registration_and_touch() {
        let (store, _tmp) = test_store();

        assert!(!store.is_probe_registered("probe-a").unwrap());
        assert!(store.get_probe("probe-a").unwrap().is_none());
        store.register_probe("probe-a", "0.3.1").unwrap();
        assert!(store.is_probe_registered("probe-a").unwrap());

        let probe = store.get_probe("probe-a").unwrap().unwrap();
        assert_eq!(probe.version, "0.3.1");

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.touch_probe("probe-a").unwrap();
        let touched = store.get_probe("probe-a").unwrap().unwrap();
        assert!(touched.last_seen_at > probe.last_seen_at);
        assert_eq!(touched.registered_at, probe.registered_at);

        // Re-registering upserts in place: one row, refreshed version and
        // registration time.
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.register_probe("probe-a", "0.3.2").unwrap();
        assert_eq!(store.all_probe_statuses().unwrap().len(), 1);
        let reregistered = store.get_probe("probe-a").unwrap().unwrap();
        assert_eq!(reregistered.version, "0.3.2");
        assert!(reregistered.registered_at > probe.registered_at);
    }

    #[test]
    fn latest_per_probe_is_newest_per_distinct_probe() {
        let (store, _tmp) = test_store();

        store.save_result(&result("c1", "probe-a", true)).unwrap();
        store.save_result(&result("c1", "probe-a", false)).unwrap();
        store.save_result(&result("c1", "probe-b", true)).unwrap();
        store.save_result(&result("c2", "probe-a", false)).unwrap();

        let ballot = store.latest_per_probe("c1").unwrap();
        assert_eq!(ballot.len(), 2);
        let up_of = |probe: &str| ballot.iter().find(|e| e.probe_id == probe).unwrap().up;
        assert!(!up_of("probe-a"));
        assert!(up_of("probe-b"));
    }

    #[test]
    fn recent_for_probe_orders_newest_first_and_limits() {
        let (store, _tmp) = test_store();

        store.save_result(&result("c1", "probe-a", true)).unwrap();
        store.save_result(&result("c1", "probe-a", true)).unwrap();
        store.save_result(&result("c1", "probe-a", false)).unwrap();

        let ups = store.recent_for_probe("c1", "probe-a", 2).unwrap();
        assert_eq!(ups, vec![false, true]);

        let all = store.recent_for_probe("c1", "probe-a", 10).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn open_incident_reports_already_open() {
        let (store, _tmp) = test_store();

        assert!(!store.open_incident("c1").unwrap());
        assert!(store.open_incident("c1").unwrap());
        assert_eq!(store.list_incidents(10).unwrap().len(), 1);
    }

    #[test]
    fn resolve_allows_reopening() {
        let (store, _tmp) = test_store();

        assert!(!store.open_incident("c1").unwrap());
        store.resolve_incident("c1").unwrap();
        assert!(!store.open_incident("c1").unwrap());

        let incidents = store.list_incidents(10).unwrap();
        assert_eq!(incidents.len(), 2);
        // Newest first: the reopened incident is still open.
        assert!(incidents[0].resolved_at.is_none());
        assert!(incidents[1].resolved_at.is_some());
    }

    #[test]
    fn resolve_without_open_incident_is_a_noop() {
        let (store, _tmp) = test_store();
        store.resolve_incident("c1").unwrap();
        assert!(store.list_incidents(10).unwrap().is_empty());
    }

    #[test]
    fn list_incidents_respects_limit() {
        let (store, _tmp) = test_store();
        for _ in 0..5 {
            store.open_incident("c1").unwrap();
            store.resolve_incident("c1").unwrap();
        }
        assert_eq!(store.list_incidents(3).unwrap().len(), 3);
    }

    #[test]
    fn evict_deletes_old_and_keeps_new() {
        let (store, _tmp) = test_store();

        let mut old = result("c1", "probe-a", true);
        old.timestamp = Utc::now() - Duration::days(40);
        let recent = result("c1", "probe-a", true);
        store.save_result(&old).unwrap();
        store.save_result(&recent).unwrap();

        let cutoff = Utc::now() - Duration::days(30);
        assert_eq!(store.evict_results_before(cutoff).unwrap(), 1);
        assert_eq!(store.recent_for_probe("c1", "probe-a", 10).unwrap().len(), 1);

        // Nothing further to delete.
        assert_eq!(store.evict_results_before(cutoff).unwrap(), 0);
    }

    #[test]
    fn check_statuses_joins_open_incident() {
        let (store, _tmp) = test_store();

        store.save_result(&result("c1", "probe-a", true)).unwrap();
        store.save_result(&result("c2", "probe-a", false)).unwrap();
        store.open_incident("c2").unwrap();

        let statuses = store.check_statuses().unwrap();
        assert_eq!(statuses.len(), 2);

        let c1 = statuses.iter().find(|s| s.check_id == "c1").unwrap();
        assert!(c1.up);
        assert!(c1.incident_since.is_none());

        let c2 = statuses.iter().find(|s| s.check_id == "c2").unwrap();
        assert!(!c2.up);
        assert!(c2.incident_since.is_some());
    }
}
