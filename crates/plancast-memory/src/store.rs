use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::MemoryLookup;
use plancast_core::types::NO_HISTORY;

use crate::{normalize, SEED_DOMAINS};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS domain_failures (
        domain TEXT PRIMARY KEY,
        narrative TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );";

/// SQLite-backed domain memory that survives restarts.
///
/// Seeds are inserted only when missing, so narratives edited at runtime are
/// kept across reopen.
pub struct SqliteMemory {
    conn: Mutex<Connection>,
}

impl SqliteMemory {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PlancastError::Database(format!("Failed to create db directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| PlancastError::Database(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| PlancastError::Database(e.to_string()))?;

        let store = Self::init(conn)?;
        debug!(path = %path.display(), "Domain memory opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PlancastError::Database(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| PlancastError::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        for (domain, narrative) in SEED_DOMAINS {
            conn.execute(
                "INSERT OR IGNORE INTO domain_failures (domain, narrative, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![domain, narrative, now],
            )
            .map_err(|e| PlancastError::Database(e.to_string()))?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply configured domains on top of what is stored.
    pub fn apply_domains(&self, extra: &BTreeMap<String, String>) -> Result<()> {
        for (domain, narrative) in extra {
            self.upsert(domain, narrative)?;
        }
        Ok(())
    }

    fn lookup(&self, domain: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|e| PlancastError::Database(e.to_string()))?;
        conn.query_row(
            "SELECT narrative FROM domain_failures WHERE domain = ?1",
            params![normalize(domain)],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| PlancastError::Database(e.to_string()))
    }

    fn all(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().map_err(|e| PlancastError::Database(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT domain, narrative FROM domain_failures ORDER BY domain ASC")
            .map_err(|e| PlancastError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| PlancastError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| PlancastError::Database(e.to_string()))?);
        }
        Ok(entries)
    }
}

impl MemoryLookup for SqliteMemory {
    fn query(&self, domain: &str) -> String {
        match self.lookup(domain) {
            Ok(Some(narrative)) => narrative,
            Ok(None) => NO_HISTORY.to_string(),
            Err(e) => {
                warn!(domain, error = %e, "Domain memory lookup failed");
                NO_HISTORY.to_string()
            }
        }
    }

    fn upsert(&self, domain: &str, narrative: &str) -> Result<()> {
        let key = normalize(domain);
        if key.is_empty() {
            return Err(PlancastError::Config("domain must not be empty".into()));
        }
        let conn = self.conn.lock().map_err(|e| PlancastError::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO domain_failures (domain, narrative, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(domain) DO UPDATE SET narrative = excluded.narrative,
                                               updated_at = excluded.updated_at",
            params![key, narrative, Utc::now().to_rfc3339()],
        )
        .map_err(|e| PlancastError::Database(e.to_string()))?;
        debug!(domain = %key, "Domain narrative stored");
        Ok(())
    }

    fn remove(&self, domain: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| PlancastError::Database(e.to_string()))?;
        let n = conn
            .execute(
                "DELETE FROM domain_failures WHERE domain = ?1",
                params![normalize(domain)],
            )
            .map_err(|e| PlancastError::Database(e.to_string()))?;
        Ok(n > 0)
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.all().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list domain memory");
            Vec::new()
        })
    }
}
