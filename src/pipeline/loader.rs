//! Staging load.
//!
//! Against Redshift this issues one warehouse-native `COPY` per staging
//! table, sequential and synchronous (events, then songs). Against the local
//! SQLite backend it reads the same newline-delimited JSON files directly,
//! applying the coercions the COPY flags express: epoch-millisecond
//! timestamps and blank/empty strings stored as null.

use anyhow::{Context, Result};
use rusqlite::params;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use super::{execute_batch, Statement, StatementReport};
use crate::config::StorageSettings;
use crate::warehouse::{SqliteWarehouse, Warehouse, WarehouseError};

/// The bulk-copy instructions for a Redshift run. Events use the jsonpaths
/// mapping file and epoch-millisecond timestamps; songs rely on the
/// auto-detected JSON schema (which is why staging_songs column names match
/// the source JSON keys).
pub fn copy_statements(storage: &StorageSettings, iam_role_arn: &str) -> Vec<Statement> {
    vec![
        Statement {
            label: "copy staging_events",
            sql: format!(
                "COPY staging_events FROM '{}' \
                 CREDENTIALS 'aws_iam_role={}' \
                 REGION '{}' \
                 TIMEFORMAT AS 'epochmillisecs' \
                 TRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL \
                 JSON '{}'",
                storage.log_data, iam_role_arn, storage.region, storage.log_jsonpath
            ),
        },
        Statement {
            label: "copy staging_songs",
            sql: format!(
                "COPY staging_songs FROM '{}' \
                 CREDENTIALS 'aws_iam_role={}' \
                 REGION '{}' \
                 TRUNCATECOLUMNS BLANKSASNULL EMPTYASNULL \
                 JSON 'auto'",
                storage.song_data, iam_role_arn, storage.region
            ),
        },
    ]
}

/// Run the COPY batch against the warehouse.
pub fn load_staging(
    warehouse: &mut dyn Warehouse,
    storage: &StorageSettings,
    iam_role_arn: &str,
) -> Result<Vec<StatementReport>, WarehouseError> {
    info!("loading staging tables from object storage");
    execute_batch(warehouse, &copy_statements(storage, iam_role_arn))
}

/// One raw listening event, as serialized in the log files. Field names in
/// the files are camelCase; `userId` arrives as either a number or a
/// (possibly blank) string.
#[derive(Debug, Deserialize)]
struct EventRecord {
    artist: Option<String>,
    auth: Option<String>,
    #[serde(rename = "firstName")]
    first_name: Option<String>,
    gender: Option<String>,
    #[serde(rename = "itemInSession")]
    item_in_session: Option<i64>,
    #[serde(rename = "lastName")]
    last_name: Option<String>,
    length: Option<f64>,
    level: Option<String>,
    location: Option<String>,
    method: Option<String>,
    page: Option<String>,
    registration: Option<f64>,
    #[serde(rename = "sessionId")]
    session_id: Option<i64>,
    song: Option<String>,
    status: Option<i64>,
    ts: Option<i64>,
    #[serde(rename = "userAgent")]
    user_agent: Option<String>,
    #[serde(rename = "userId", default, deserialize_with = "lenient_user_id")]
    user_id: Option<i64>,
}

/// One song-catalog record, one JSON document per line.
#[derive(Debug, Deserialize)]
struct SongRecord {
    num_songs: Option<i64>,
    artist_id: Option<String>,
    artist_latitude: Option<f64>,
    artist_longitude: Option<f64>,
    artist_location: Option<String>,
    artist_name: Option<String>,
    song_id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    year: Option<i64>,
}

/// The local counterpart of BLANKSASNULL for identifiers: accept a number or
/// a numeric string, map blanks to null.
fn lenient_user_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        Some(serde_json::Value::Number(n)) => Ok(n.as_i64()),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed
                    .parse::<i64>()
                    .map(Some)
                    .map_err(serde::de::Error::custom)
            }
        }
        _ => Ok(None),
    }
}

/// BLANKSASNULL / EMPTYASNULL for text columns.
fn blank_to_null(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub event_rows: usize,
    pub song_rows: usize,
}

/// Loads the staging tables of a local SQLite warehouse from directories of
/// JSON files.
pub struct LocalJsonLoader {
    log_dir: PathBuf,
    song_dir: PathBuf,
}

impl LocalJsonLoader {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(log_dir: P, song_dir: Q) -> Self {
        Self {
            log_dir: log_dir.as_ref().to_path_buf(),
            song_dir: song_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, warehouse: &mut SqliteWarehouse) -> Result<LoadSummary> {
        let event_rows = self.load_events(warehouse)?;
        let song_rows = self.load_songs(warehouse)?;
        info!(event_rows, song_rows, "staging tables loaded");
        Ok(LoadSummary {
            event_rows,
            song_rows,
        })
    }

    fn load_events(&self, warehouse: &mut SqliteWarehouse) -> Result<usize> {
        let records: Vec<EventRecord> = read_json_records(&self.log_dir)?;
        let conn = warehouse.connection();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO staging_events (artist, auth, first_name, gender, \
                 item_in_session, last_name, length, level, location, method, page, \
                 registration, session_id, song, status, ts, user_agent, user_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                 ?15, ?16, ?17, ?18)",
            )?;
            for record in records {
                stmt.execute(params![
                    blank_to_null(record.artist),
                    blank_to_null(record.auth),
                    blank_to_null(record.first_name),
                    blank_to_null(record.gender),
                    record.item_in_session,
                    blank_to_null(record.last_name),
                    record.length,
                    blank_to_null(record.level),
                    blank_to_null(record.location),
                    blank_to_null(record.method),
                    blank_to_null(record.page),
                    record.registration.map(|r| r as i64),
                    record.session_id,
                    blank_to_null(record.song),
                    record.status,
                    record.ts,
                    blank_to_null(record.user_agent),
                    record.user_id,
                ])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn load_songs(&self, warehouse: &mut SqliteWarehouse) -> Result<usize> {
        let records: Vec<SongRecord> = read_json_records(&self.song_dir)?;
        let conn = warehouse.connection();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO staging_songs (num_songs, artist_id, artist_latitude, \
                 artist_longitude, artist_location, artist_name, song_id, title, \
                 duration, year) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.num_songs,
                    blank_to_null(record.artist_id),
                    record.artist_latitude,
                    record.artist_longitude,
                    blank_to_null(record.artist_location),
                    blank_to_null(record.artist_name),
                    blank_to_null(record.song_id),
                    blank_to_null(record.title),
                    record.duration,
                    record.year,
                ])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

/// Read every `.json` file under `dir` as newline-delimited JSON records.
/// Files with a single one-line document (the song files) parse the same way.
fn read_json_records<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {:?}", dir))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = std::fs::read_to_string(entry.path())
            .with_context(|| format!("failed to read {:?}", entry.path()))?;
        for (line_number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).with_context(|| {
                format!("malformed JSON at {:?}:{}", entry.path(), line_number + 1)
            })?;
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema_manager;
    use std::fs;
    use tempfile::TempDir;

    fn setup_dirs(events: &[&str], songs: &[&str]) -> (TempDir, LocalJsonLoader) {
        let tmp = TempDir::new().unwrap();
        let log_dir = tmp.path().join("log_data");
        let song_dir = tmp.path().join("song_data");
        fs::create_dir_all(&log_dir).unwrap();
        fs::create_dir_all(&song_dir).unwrap();
        fs::write(log_dir.join("2018-11-01-events.json"), events.join("\n")).unwrap();
        for (i, song) in songs.iter().enumerate() {
            fs::write(song_dir.join(format!("song_{i}.json")), song).unwrap();
        }
        let loader = LocalJsonLoader::new(&log_dir, &song_dir);
        (tmp, loader)
    }

    #[test]
    fn loads_events_and_songs_into_staging() {
        let (_tmp, loader) = setup_dirs(
            &[
                r#"{"artist":"Frumpies","auth":"Logged In","firstName":"Anabelle","gender":"F","itemInSession":0,"lastName":"Simpson","length":134.47791,"level":"free","location":"Philadelphia","method":"PUT","page":"NextSong","registration":1541044398796.0,"sessionId":256,"song":"Fuck Kitty","status":200,"ts":1541903636796,"userAgent":"Mozilla/5.0","userId":"69"}"#,
            ],
            &[
                r#"{"num_songs":1,"artist_id":"ARJIE2Y1187B994AB7","artist_latitude":null,"artist_longitude":null,"artist_location":"","artist_name":"Line Renaud","song_id":"SOUPIRU12A6D4FA1E1","title":"Der Kleine Dompfaff","duration":152.92036,"year":0}"#,
            ],
        );
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        schema_manager::create_all(&mut warehouse).unwrap();
        let summary = loader.load(&mut warehouse).unwrap();
        assert_eq!(
            summary,
            LoadSummary {
                event_rows: 1,
                song_rows: 1
            }
        );

        let (user_id, ts): (i64, i64) = warehouse
            .connection()
            .query_row("SELECT user_id, ts FROM staging_events", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(user_id, 69);
        assert_eq!(ts, 1541903636796);

        // The blank artist_location became NULL, not an empty string.
        let location: Option<String> = warehouse
            .connection()
            .query_row("SELECT artist_location FROM staging_songs", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(location, None);
    }

    #[test]
    fn blank_user_id_becomes_null() {
        let (_tmp, loader) = setup_dirs(
            &[
                r#"{"auth":"Logged Out","itemInSession":0,"level":"free","method":"GET","page":"Home","sessionId":100,"status":200,"ts":1541903636796,"userId":""}"#,
            ],
            &[],
        );
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        schema_manager::create_all(&mut warehouse).unwrap();
        loader.load(&mut warehouse).unwrap();
        let user_id: Option<i64> = warehouse
            .connection()
            .query_row("SELECT user_id FROM staging_events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(user_id, None);
    }

    #[test]
    fn copy_statements_carry_role_region_and_formats() {
        let storage = StorageSettings {
            region: "us-west-2".to_string(),
            log_data: "s3://udacity-dend/log_data".to_string(),
            log_jsonpath: "s3://udacity-dend/log_json_path.json".to_string(),
            song_data: "s3://udacity-dend/song_data".to_string(),
        };
        let statements = copy_statements(&storage, "arn:aws:iam::123:role/dwhRole");
        assert_eq!(statements.len(), 2);

        let events = &statements[0].sql;
        assert!(events.starts_with("COPY staging_events FROM 's3://udacity-dend/log_data'"));
        assert!(events.contains("aws_iam_role=arn:aws:iam::123:role/dwhRole"));
        assert!(events.contains("TIMEFORMAT AS 'epochmillisecs'"));
        assert!(events.contains("BLANKSASNULL"));
        assert!(events.contains("JSON 's3://udacity-dend/log_json_path.json'"));

        let songs = &statements[1].sql;
        assert!(songs.starts_with("COPY staging_songs FROM 's3://udacity-dend/song_data'"));
        assert!(songs.contains("JSON 'auto'"));
        assert!(songs.contains("REGION 'us-west-2'"));
    }
}
