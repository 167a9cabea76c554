use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use super::keyspace::DimensionStore;
use crate::error::Result;
use crate::types::Artist;

/// SQLite-backed dimension key space, persisted across runs.
pub struct SqliteDimensionStore {
    conn: Connection,
    in_transaction: bool,
}

impl SqliteDimensionStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self::with_connection(conn)?;
        info!("Opened dimension store at {}", db_path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS dim_genres (
                genre_id  INTEGER PRIMARY KEY AUTOINCREMENT,
                name      TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS dim_locations (
                location_id  INTEGER PRIMARY KEY AUTOINCREMENT,
                state_code   TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS dim_artists (
                artist_id  TEXT PRIMARY KEY,
                name       TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    pub fn count(&self, table: &str) -> Result<i64> {
        let n = match table {
            "dim_genres" => self.conn.query_row("SELECT COUNT(*) FROM dim_genres", [], |r| r.get(0))?,
            "dim_locations" => {
                self.conn.query_row("SELECT COUNT(*) FROM dim_locations", [], |r| r.get(0))?
            }
            "dim_artists" => self.conn.query_row("SELECT COUNT(*) FROM dim_artists", [], |r| r.get(0))?,
            _ => 0,
        };
        Ok(n)
    }

    pub fn artist_name(&self, artist_id: &str) -> Result<Option<String>> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM dim_artists WHERE artist_id = ?1",
                params![artist_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(name)
    }
}

impl DimensionStore for SqliteDimensionStore {
    fn genre_id(&mut self, name: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT genre_id FROM dim_genres WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO dim_genres (name) VALUES (?1)", params![name])?;
        let id = self.conn.last_insert_rowid();
        debug!(genre = name, genre_id = id, "New genre key");
        Ok(id)
    }

    fn location_id(&mut self, state_code: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT location_id FROM dim_locations WHERE state_code = ?1",
                params![state_code],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO dim_locations (state_code) VALUES (?1)",
            params![state_code],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(state_code, location_id = id, "New location key");
        Ok(id)
    }

    fn upsert_artist(&mut self, artist: &Artist) -> Result<String> {
        self.conn.execute(
            "INSERT INTO dim_artists (artist_id, name) VALUES (?1, ?2)
             ON CONFLICT(artist_id) DO UPDATE SET name=excluded.name WHERE excluded.name <> ''",
            params![artist.artist_id, artist.name],
        )?;
        let stored: String = self.conn.query_row(
            "SELECT name FROM dim_artists WHERE artist_id = ?1",
            params![artist.artist_id],
            |r| r.get(0),
        )?;
        Ok(stored)
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn.execute_batch("ROLLBACK")?;
            self.in_transaction = false;
        }
        Ok(())
    }
}
