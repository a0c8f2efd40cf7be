//! SQLite-backed provider/binding store.
//!
//! Uses `rusqlite` in synchronous mode behind a mutex. WAL mode is enabled so
//! an admin process can write while turns read.

use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use super::errors::StoreError;
use super::store::{validate_binding, validate_provider, ProviderStore};
use super::types::{IndexBinding, ToolProvider};
use crate::transport::TransportParams;

// ─── SqliteStore ─────────────────────────────────────────────────────────────

/// SQLite handle for provider and binding records.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        tracing::debug!(path, "opened provider store");
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tool_providers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1,
                transport_kind TEXT NOT NULL,
                transport_params TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS index_bindings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id TEXT NOT NULL,
                index_pattern TEXT NOT NULL,
                provider_id TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 100,
                enabled INTEGER NOT NULL DEFAULT 1,
                auto_include INTEGER NOT NULL DEFAULT 1,
                config TEXT NOT NULL DEFAULT 'null',
                UNIQUE (connection_id, index_pattern, provider_id)
            );

            CREATE INDEX IF NOT EXISTS idx_bindings_connection
                ON index_bindings(connection_id, id);
            ",
        )?;
        Ok(())
    }

    // ─── Providers ──────────────────────────────────────────────────────

    /// Insert or replace a provider by id.
    pub fn upsert_provider(&self, provider: &ToolProvider) -> Result<(), StoreError> {
        validate_provider(provider)?;
        let params_json = serde_json::to_string(&provider.transport)?;
        self.conn().execute(
            "INSERT INTO tool_providers
             (id, name, description, enabled, transport_kind, transport_params)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                enabled = excluded.enabled,
                transport_kind = excluded.transport_kind,
                transport_params = excluded.transport_params,
                updated_at = datetime('now')",
            params![
                provider.id,
                provider.name,
                provider.description,
                provider.enabled,
                provider.kind().as_str(),
                params_json,
            ],
        )?;
        Ok(())
    }

    /// Delete a provider. Bindings referencing it are kept; resolution skips them.
    pub fn delete_provider(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn()
            .execute("DELETE FROM tool_providers WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ─── Bindings ───────────────────────────────────────────────────────

    /// Insert or update a binding keyed by (connection, pattern, provider).
    ///
    /// An update keeps the original row position, so encounter order for
    /// equal priorities is stable across edits.
    pub fn upsert_binding(&self, binding: &IndexBinding) -> Result<i64, StoreError> {
        validate_binding(binding)?;
        let config = serde_json::to_string(&binding.config)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO index_bindings
             (connection_id, index_pattern, provider_id, priority, enabled, auto_include, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(connection_id, index_pattern, provider_id) DO UPDATE SET
                priority = excluded.priority,
                enabled = excluded.enabled,
                auto_include = excluded.auto_include,
                config = excluded.config",
            params![
                binding.connection_id,
                binding.index_pattern,
                binding.provider_id,
                binding.priority,
                binding.enabled,
                binding.auto_include,
                config,
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM index_bindings
             WHERE connection_id = ?1 AND index_pattern = ?2 AND provider_id = ?3",
            params![binding.connection_id, binding.index_pattern, binding.provider_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Delete a binding by its natural key.
    pub fn delete_binding(
        &self,
        connection_id: &str,
        index_pattern: &str,
        provider_id: &str,
    ) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "DELETE FROM index_bindings
             WHERE connection_id = ?1 AND index_pattern = ?2 AND provider_id = ?3",
            params![connection_id, index_pattern, provider_id],
        )?;
        Ok(changed > 0)
    }

    /// Seed the store from configuration records (admin-side import).
    pub fn import(
        &self,
        providers: &[ToolProvider],
        bindings: &[IndexBinding],
    ) -> Result<(), StoreError> {
        for provider in providers {
            self.upsert_provider(provider)?;
        }
        for binding in bindings {
            self.upsert_binding(binding)?;
        }
        tracing::info!(
            providers = providers.len(),
            bindings = bindings.len(),
            "imported provider configuration"
        );
        Ok(())
    }
}

// ─── Row Mapping ─────────────────────────────────────────────────────────────

/// Raw provider row before the transport blob is decoded.
struct ProviderRow {
    id: String,
    name: String,
    description: String,
    enabled: bool,
    transport_params: String,
}

impl ProviderRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            enabled: row.get(3)?,
            transport_params: row.get(4)?,
        })
    }

    fn decode(self) -> Result<ToolProvider, StoreError> {
        let transport: TransportParams =
            serde_json::from_str(&self.transport_params).map_err(|e| StoreError::Serialization {
                reason: format!("provider '{}' has invalid transport params: {e}", self.id),
            })?;
        Ok(ToolProvider {
            id: self.id,
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            transport,
        })
    }
}

const PROVIDER_COLUMNS: &str = "id, name, description, enabled, transport_params";

impl ProviderStore for SqliteStore {
    fn list_providers(&self) -> Result<Vec<ToolProvider>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM tool_providers ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], ProviderRow::from_row)?;

        let mut providers = Vec::new();
        for row in rows {
            providers.push(row?.decode()?);
        }
        Ok(providers)
    }

    fn get_provider(&self, id: &str) -> Result<Option<ToolProvider>, StoreError> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {PROVIDER_COLUMNS} FROM tool_providers WHERE id = ?1"),
                params![id],
                ProviderRow::from_row,
            )
            .optional()?;
        row.map(ProviderRow::decode).transpose()
    }

    fn list_bindings(&self, connection_id: &str) -> Result<Vec<IndexBinding>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT index_pattern, provider_id, connection_id, priority,
                    enabled, auto_include, config
             FROM index_bindings
             WHERE connection_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![connection_id], |row| {
            Ok((
                IndexBinding {
                    index_pattern: row.get(0)?,
                    provider_id: row.get(1)?,
                    connection_id: row.get(2)?,
                    priority: row.get(3)?,
                    enabled: row.get(4)?,
                    auto_include: row.get(5)?,
                    config: serde_json::Value::Null,
                },
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut bindings = Vec::new();
        for row in rows {
            let (mut binding, config) = row?;
            binding.config = serde_json::from_str(&config)?;
            bindings.push(binding);
        }
        Ok(bindings)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
