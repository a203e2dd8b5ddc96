//! Star-schema transform: set-based `INSERT ... SELECT` statements reading
//! from the staging tables.
//!
//! Every insert reads staging only (the fact join goes against the staging
//! tables, not the already-loaded dimensions), so the only ordering
//! requirement is that the loader has finished. Each dimension is
//! deduplicated on its natural key with a window function; the latest row by
//! event timestamp wins for users, so a subscription-level change produces
//! one row with the current level rather than one row per level.

use tracing::info;

use super::{execute_batch, Statement, StatementReport};
use crate::schema::Dialect;
use crate::warehouse::{Warehouse, WarehouseError};

/// Page value marking a listening event. Everything else (Home, Login, ...)
/// is navigation noise to this pipeline.
pub const PLAY_PAGE: &str = "NextSong";

fn songs_insert() -> Statement {
    Statement {
        label: "insert songs",
        sql: "INSERT INTO songs (song_id, title, artist_id, year, duration) \
              SELECT song_id, title, artist_id, year, duration \
              FROM ( \
                  SELECT song_id, title, artist_id, year, duration, \
                         ROW_NUMBER() OVER (PARTITION BY song_id ORDER BY title) AS row_rank \
                  FROM staging_songs \
                  WHERE song_id IS NOT NULL \
              ) ranked \
              WHERE row_rank = 1"
            .to_string(),
    }
}

fn artists_insert() -> Statement {
    Statement {
        label: "insert artists",
        sql: "INSERT INTO artists (artist_id, name, location, latitude, longitude) \
              SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude \
              FROM ( \
                  SELECT artist_id, artist_name, artist_location, artist_latitude, \
                         artist_longitude, \
                         ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY artist_name) AS row_rank \
                  FROM staging_songs \
                  WHERE artist_id IS NOT NULL \
              ) ranked \
              WHERE row_rank = 1"
            .to_string(),
    }
}

/// Calendar decomposition of every distinct play timestamp. Weekday is
/// 0 = Sunday .. 6 = Saturday in both dialects (Redshift `weekday` datepart,
/// SQLite `%w`); the SQLite week-of-year is `%W` (Monday-based, 00-53).
fn time_insert(dialect: Dialect) -> Statement {
    let sql = match dialect {
        Dialect::Redshift => format!(
            "INSERT INTO time (start_time, hour, day, week, month, year, weekday) \
             SELECT DISTINCT ts, \
                    EXTRACT(hour FROM ts), \
                    EXTRACT(day FROM ts), \
                    EXTRACT(week FROM ts), \
                    EXTRACT(month FROM ts), \
                    EXTRACT(year FROM ts), \
                    EXTRACT(weekday FROM ts) \
             FROM staging_events \
             WHERE page = '{PLAY_PAGE}' AND ts IS NOT NULL"
        ),
        // Locally ts is epoch milliseconds.
        Dialect::Sqlite => format!(
            "INSERT INTO time (start_time, hour, day, week, month, year, weekday) \
             SELECT DISTINCT ts, \
                    CAST(strftime('%H', ts / 1000, 'unixepoch') AS INTEGER), \
                    CAST(strftime('%d', ts / 1000, 'unixepoch') AS INTEGER), \
                    CAST(strftime('%W', ts / 1000, 'unixepoch') AS INTEGER), \
                    CAST(strftime('%m', ts / 1000, 'unixepoch') AS INTEGER), \
                    CAST(strftime('%Y', ts / 1000, 'unixepoch') AS INTEGER), \
                    CAST(strftime('%w', ts / 1000, 'unixepoch') AS INTEGER) \
             FROM staging_events \
             WHERE page = '{PLAY_PAGE}' AND ts IS NOT NULL"
        ),
    };
    Statement {
        label: "insert time",
        sql,
    }
}

fn users_insert() -> Statement {
    Statement {
        label: "insert users",
        sql: format!(
            "INSERT INTO users (user_id, first_name, last_name, gender, level) \
             SELECT user_id, first_name, last_name, gender, level \
             FROM ( \
                 SELECT user_id, first_name, last_name, gender, level, \
                        ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY ts DESC) AS row_rank \
                 FROM staging_events \
                 WHERE page = '{PLAY_PAGE}' AND user_id IS NOT NULL \
             ) latest \
             WHERE row_rank = 1"
        ),
    }
}

/// The fact derivation: a best-effort natural-key join of events against the
/// catalog on exact (artist name, song title, duration). Plays of songs
/// absent from the catalog are dropped, not retained with a null song_id.
fn songplays_insert() -> Statement {
    Statement {
        label: "insert songplays",
        sql: format!(
            "INSERT INTO songplays (start_time, user_id, level, song_id, artist_id, \
             session_id, location, user_agent) \
             SELECT events.ts, \
                    events.user_id, \
                    events.level, \
                    songs.song_id, \
                    songs.artist_id, \
                    events.session_id, \
                    events.location, \
                    events.user_agent \
             FROM staging_events AS events \
             JOIN staging_songs AS songs \
               ON events.artist = songs.artist_name \
              AND events.song = songs.title \
              AND events.length = songs.duration \
             WHERE events.page = '{PLAY_PAGE}'"
        ),
    }
}

/// The ordered transform batch: dimensions first, fact last.
pub fn insert_statements(dialect: Dialect) -> Vec<Statement> {
    vec![
        songs_insert(),
        artists_insert(),
        time_insert(dialect),
        users_insert(),
        songplays_insert(),
    ]
}

pub fn transform(warehouse: &mut dyn Warehouse) -> Result<Vec<StatementReport>, WarehouseError> {
    info!("populating dimension and fact tables");
    let statements = insert_statements(warehouse.dialect());
    execute_batch(warehouse, &statements)
}
