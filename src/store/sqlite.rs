use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;

use crate::error::AppError;

const DEFAULT_PERSON_SETTING: &str = "default-person-handle";
const DB_FILE_NAME: &str = "sqlite.db";

/// Handle to one Gramps family tree stored in SQLite.
///
/// Every primary object table keeps the raw record in `json_data`; the
/// lookups here hand those records back untouched. The connection is not
/// `Sync`, so a `GrampsDb` belongs to exactly one thread.
pub struct GrampsDb {
    conn: Connection,
    path: Option<PathBuf>,
}

impl GrampsDb {
    /// Open an existing tree read-only.
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if !db_path.is_file() {
            return Err(AppError::Config(format!(
                "Unable to open database {}",
                db_path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!(path = %db_path.display(), "opened genealogy database");
        Ok(Self {
            conn,
            path: Some(db_path.to_path_buf()),
        })
    }

    /// Open (creating if needed) a writable tree and make sure the schema exists.
    pub fn create(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        init_db(&conn)?;
        Ok(Self {
            conn,
            path: Some(db_path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        let person: Option<i32> = self
            .conn
            .query_row("SELECT 1 FROM person LIMIT 1;", [], |row| row.get(0))
            .optional()?;
        Ok(person.is_none())
    }

    pub fn get_person(&self, handle: &str) -> Result<Value, AppError> {
        self.get_raw("person", handle)?
            .ok_or_else(|| AppError::NotFound(format!("Person handle '{handle}'")))
    }

    pub fn get_family(&self, handle: &str) -> Result<Value, AppError> {
        self.get_raw("family", handle)?
            .ok_or_else(|| AppError::NotFound(format!("Family handle '{handle}'")))
    }

    pub fn get_event(&self, handle: &str) -> Result<Value, AppError> {
        self.get_raw("event", handle)?
            .ok_or_else(|| AppError::NotFound(format!("Event handle '{handle}'")))
    }

    pub fn get_place(&self, handle: &str) -> Result<Value, AppError> {
        self.get_raw("place", handle)?
            .ok_or_else(|| AppError::NotFound(format!("Place handle '{handle}'")))
    }

    pub fn default_person(&self) -> Result<Option<Value>, AppError> {
        let Some(setting) = self.get_metadata(DEFAULT_PERSON_SETTING)? else {
            return Ok(None);
        };
        let Some(handle) = setting.as_str().filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        self.get_raw("person", handle)
    }

    pub fn all_people(&self) -> Result<Vec<Value>, AppError> {
        let mut stmt = self
            .conn
            .prepare("SELECT json_data FROM person ORDER BY surname, given_name, gramps_id;")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut people = Vec::new();
        for row in rows {
            people.push(serde_json::from_str(&row?)?);
        }
        Ok(people)
    }

    pub fn get_metadata(&self, setting: &str) -> Result<Option<Value>, AppError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT json_data FROM metadata WHERE setting=?1;",
                params![setting],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    pub fn set_default_person(&self, handle: &str) -> Result<(), AppError> {
        self.set_metadata(DEFAULT_PERSON_SETTING, &Value::String(handle.to_string()))
    }

    pub fn set_metadata(&self, setting: &str, value: &Value) -> Result<(), AppError> {
        self.conn.execute(
            r#"
            INSERT INTO metadata(setting, json_data) VALUES(?1, ?2)
            ON CONFLICT(setting) DO UPDATE SET json_data=excluded.json_data;
            "#,
            params![setting, serde_json::to_string(value)?],
        )?;
        Ok(())
    }

    pub fn upsert_person(&self, record: &Value) -> Result<(), AppError> {
        let handle = record_handle(record)?;
        let name = record.get("primary_name");
        let given = name
            .and_then(|n| n.get("first_name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let surname = name
            .and_then(|n| n.get("surname_list"))
            .and_then(Value::as_array)
            .and_then(|l| l.first())
            .and_then(|s| s.get("surname"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.conn.execute(
            r#"
            INSERT INTO person(handle, gramps_id, given_name, surname, json_data)
            VALUES(?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(handle) DO UPDATE SET
                gramps_id=excluded.gramps_id,
                given_name=excluded.given_name,
                surname=excluded.surname,
                json_data=excluded.json_data;
            "#,
            params![handle, gramps_id(record), given, surname, serde_json::to_string(record)?],
        )?;
        Ok(())
    }

    pub fn upsert_family(&self, record: &Value) -> Result<(), AppError> {
        self.upsert_simple("family", record)
    }

    pub fn upsert_event(&self, record: &Value) -> Result<(), AppError> {
        self.upsert_simple("event", record)
    }

    pub fn upsert_place(&self, record: &Value) -> Result<(), AppError> {
        self.upsert_simple("place", record)
    }

    fn upsert_simple(&self, table: &str, record: &Value) -> Result<(), AppError> {
        let handle = record_handle(record)?;
        let sql = format!(
            r#"
            INSERT INTO {table}(handle, gramps_id, json_data) VALUES(?1, ?2, ?3)
            ON CONFLICT(handle) DO UPDATE SET
                gramps_id=excluded.gramps_id,
                json_data=excluded.json_data;
            "#
        );
        self.conn.execute(
            &sql,
            params![handle, gramps_id(record), serde_json::to_string(record)?],
        )?;
        Ok(())
    }

    fn get_raw(&self, table: &str, handle: &str) -> Result<Option<Value>, AppError> {
        let sql = format!("SELECT json_data FROM {table} WHERE handle=?1;");
        let json: Option<String> = self
            .conn
            .query_row(&sql, params![handle], |row| row.get(0))
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }
}

fn record_handle(record: &Value) -> Result<&str, AppError> {
    record
        .get("handle")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::Message("Record is missing a handle".to_string()))
}

fn gramps_id(record: &Value) -> &str {
    record.get("gramps_id").and_then(Value::as_str).unwrap_or_default()
}

fn init_db(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys=ON;

        CREATE TABLE IF NOT EXISTS metadata (
            setting TEXT PRIMARY KEY,
            json_data TEXT
        );

        CREATE TABLE IF NOT EXISTS person (
            handle TEXT PRIMARY KEY,
            gramps_id TEXT,
            given_name TEXT,
            surname TEXT,
            json_data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS family (
            handle TEXT PRIMARY KEY,
            gramps_id TEXT,
            json_data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS event (
            handle TEXT PRIMARY KEY,
            gramps_id TEXT,
            json_data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS place (
            handle TEXT PRIMARY KEY,
            gramps_id TEXT,
            json_data TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_person_names ON person (surname, given_name);
        "#,
    )?;
    Ok(())
}

/// `<location>/<tree name>/sqlite.db`, the layout Gramps uses for its trees.
pub fn tree_db_path(location: &Path, tree_name: &str) -> PathBuf {
    location.join(tree_name).join(DB_FILE_NAME)
}

/// Names of the tree directories under `location`, sorted.
pub fn list_database_names(location: &Path) -> Result<Vec<String>, AppError> {
    if !location.is_dir() {
        return Err(AppError::Config(format!(
            "Database path does not exist: {}",
            location.display()
        )));
    }
    let entries = std::fs::read_dir(location)?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Where Gramps keeps its trees when no location is configured.
pub fn default_database_location() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let home = PathBuf::from(home);

    #[cfg(target_os = "windows")]
    {
        let base = std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("AppData").join("Roaming"));
        return base.join("gramps").join("grampsdb");
    }

    #[cfg(not(target_os = "windows"))]
    {
        let base = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local").join("share"));
        return base.join("gramps").join("grampsdb");
    }
}

pub fn expand_tilde(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy().to_string();
    if s == "~" {
        return PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()));
    }
    if let Some(rest) = s.strip_prefix("~/") {
        return PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string())).join(rest);
    }
    path
}
