use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::types::{
    validate_attributes, Parameter, ParameterAttrs, ParameterKind, ParentKind, ParentRecord,
    ValidationErrors,
};

const PARAMETER_COLUMNS: &str = "id, name, value, created_at, updated_at";

/// Why a create or update did not persist.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),
    #[error("parameter no longer exists")]
    NotFound,
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// SQLite-backed storage for parents and their parameter collections.
///
/// All parameter collections share one `parameters` table, discriminated by
/// `type` and `reference_id`. Every public method takes the connection lock
/// for its whole duration, so each call is atomic with respect to the others.
#[derive(Clone)]
pub struct ParameterStore {
    conn: Arc<Mutex<Connection>>,
}

impl ParameterStore {
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(dir) = Path::new(db_path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Create DB directory: {}", dir.display()))?;
            }
        }
        let conn = Connection::open(db_path).with_context(|| format!("Open DB: {db_path}"))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Open in-memory DB")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS hosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS hostgroups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS domains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS operatingsystems (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS parameters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                reference_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (type, reference_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_parameters_owner ON parameters(type, reference_id);
            ",
        )
        .context("Create tables")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Cheap round trip used by the health check.
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Ping DB")?;
        Ok(())
    }

    // ---- parents ----

    pub fn insert_parent(&self, kind: ParentKind, name: &str) -> Result<ParentRecord> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO {} (name) VALUES (?1)", kind.table()),
            params![name],
        )
        .with_context(|| format!("Insert {kind} '{name}'"))?;

        Ok(ParentRecord {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub fn find_parent_by_id(&self, kind: ParentKind, id: i64) -> Result<Option<ParentRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT id, name FROM {} WHERE id = ?1", kind.table()),
            params![id],
            parent_from_row,
        )
        .optional()
        .with_context(|| format!("Find {kind} by id {id}"))
    }

    pub fn find_parent_by_name(&self, kind: ParentKind, name: &str) -> Result<Option<ParentRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT id, name FROM {} WHERE name = ?1", kind.table()),
            params![name],
            parent_from_row,
        )
        .optional()
        .with_context(|| format!("Find {kind} by name '{name}'"))
    }

    // ---- parameter collections ----

    pub fn count_parameters(&self, kind: ParameterKind, owner_id: i64) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM parameters WHERE type = ?1 AND reference_id = ?2",
                params![kind.type_name(), owner_id],
                |row| row.get(0),
            )
            .with_context(|| format!("Count {kind} rows for owner {owner_id}"))?;
        Ok(count.max(0) as u64)
    }

    /// One page of a collection, ordered by name.
    pub fn list_parameters(
        &self,
        kind: ParameterKind,
        owner_id: i64,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<Parameter>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARAMETER_COLUMNS} FROM parameters
             WHERE type = ?1 AND reference_id = ?2
             ORDER BY name, id
             LIMIT ?3 OFFSET ?4"
        ))?;

        let rows = stmt.query_map(
            params![kind.type_name(), owner_id, limit, offset as i64],
            parameter_from_row,
        )?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("List {kind} rows for owner {owner_id}"))
    }

    pub fn find_parameter_by_id(
        &self,
        kind: ParameterKind,
        owner_id: i64,
        id: i64,
    ) -> Result<Option<Parameter>> {
        let conn = self.lock()?;
        select_by_id(&conn, kind, owner_id, id)
            .with_context(|| format!("Find {kind} by id {id}"))
    }

    pub fn find_parameter_by_name(
        &self,
        kind: ParameterKind,
        owner_id: i64,
        name: &str,
    ) -> Result<Option<Parameter>> {
        let conn = self.lock()?;
        select_by_name(&conn, kind, owner_id, name)
            .with_context(|| format!("Find {kind} by name '{name}'"))
    }

    /// Validate and insert a new parameter. Nothing is written on failure.
    pub fn create_parameter(
        &self,
        kind: ParameterKind,
        owner_id: i64,
        attrs: &ParameterAttrs,
    ) -> Result<Parameter, SaveError> {
        let name = attrs.name.clone().unwrap_or_default();
        let value = attrs.value.clone().unwrap_or_default();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut errors = validate_attributes(&name, &value);
        if errors.get("name").is_none() && select_by_name(&tx, kind, owner_id, &name)?.is_some() {
            errors.add("name", "has already been taken");
        }
        if !errors.is_empty() {
            return Err(SaveError::Invalid(errors));
        }

        let now = Utc::now();
        tx.execute(
            "INSERT INTO parameters (type, reference_id, name, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![kind.type_name(), owner_id, name, value, now, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!("Inserted {} id={} owner={}", kind, id, owner_id);
        Ok(Parameter {
            id,
            name,
            value,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply the supplied attributes to an existing parameter. The owner and
    /// any omitted attribute keep their current values.
    pub fn update_parameter(
        &self,
        kind: ParameterKind,
        owner_id: i64,
        id: i64,
        attrs: &ParameterAttrs,
    ) -> Result<Parameter, SaveError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = select_by_id(&tx, kind, owner_id, id)?.ok_or(SaveError::NotFound)?;
        let name = attrs.name.clone().unwrap_or_else(|| current.name.clone());
        let value = attrs.value.clone().unwrap_or_else(|| current.value.clone());

        let mut errors = validate_attributes(&name, &value);
        if errors.get("name").is_none() && name != current.name {
            if let Some(other) = select_by_name(&tx, kind, owner_id, &name)? {
                if other.id != id {
                    errors.add("name", "has already been taken");
                }
            }
        }
        if !errors.is_empty() {
            return Err(SaveError::Invalid(errors));
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE parameters SET name = ?1, value = ?2, updated_at = ?3
             WHERE id = ?4 AND type = ?5 AND reference_id = ?6",
            params![name, value, now, id, kind.type_name(), owner_id],
        )?;
        tx.commit()?;

        Ok(Parameter {
            id,
            name,
            value,
            created_at: current.created_at,
            updated_at: now,
        })
    }

    /// Returns false when no such row existed.
    pub fn delete_parameter(&self, kind: ParameterKind, owner_id: i64, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM parameters WHERE id = ?1 AND type = ?2 AND reference_id = ?3",
                params![id, kind.type_name(), owner_id],
            )
            .with_context(|| format!("Delete {kind} id {id}"))?;
        Ok(deleted > 0)
    }

    /// Remove a whole collection and return what was removed.
    pub fn delete_all_parameters(&self, kind: ParameterKind, owner_id: i64) -> Result<Vec<Parameter>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let removed = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {PARAMETER_COLUMNS} FROM parameters
                 WHERE type = ?1 AND reference_id = ?2
                 ORDER BY name, id"
            ))?;
            let rows = stmt.query_map(params![kind.type_name(), owner_id], parameter_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute(
            "DELETE FROM parameters WHERE type = ?1 AND reference_id = ?2",
            params![kind.type_name(), owner_id],
        )?;
        tx.commit()
            .with_context(|| format!("Delete all {kind} rows for owner {owner_id}"))?;

        Ok(removed)
    }
}

fn select_by_id(
    conn: &Connection,
    kind: ParameterKind,
    owner_id: i64,
    id: i64,
) -> rusqlite::Result<Option<Parameter>> {
    conn.query_row(
        &format!(
            "SELECT {PARAMETER_COLUMNS} FROM parameters
             WHERE id = ?1 AND type = ?2 AND reference_id = ?3"
        ),
        params![id, kind.type_name(), owner_id],
        parameter_from_row,
    )
    .optional()
}

fn select_by_name(
    conn: &Connection,
    kind: ParameterKind,
    owner_id: i64,
    name: &str,
) -> rusqlite::Result<Option<Parameter>> {
    conn.query_row(
        &format!(
            "SELECT {PARAMETER_COLUMNS} FROM parameters
             WHERE name = ?1 AND type = ?2 AND reference_id = ?3"
        ),
        params![name, kind.type_name(), owner_id],
        parameter_from_row,
    )
    .optional()
}

fn parameter_from_row(row: &Row<'_>) -> rusqlite::Result<Parameter> {
    Ok(Parameter {
        id: row.get(0)?,
        name: row.get(1)?,
        value: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn parent_from_row(row: &Row<'_>) -> rusqlite::Result<ParentRecord> {
    Ok(ParentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}
