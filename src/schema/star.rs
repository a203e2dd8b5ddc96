//! The staging tables and the star schema for song-play analytics.

use crate::column;
use crate::schema::{DistStyle, SqlType, Table};

/// Raw listening events as they arrive from the log files. No key
/// constraints; duplicates and nulls are expected and tolerated.
pub const STAGING_EVENTS: Table = Table {
    name: "staging_events",
    columns: &[
        column!("artist", SqlType::Text),
        column!("auth", SqlType::Text),
        column!("first_name", SqlType::Text),
        column!("gender", SqlType::Text),
        column!("item_in_session", SqlType::Integer),
        column!("last_name", SqlType::Text),
        column!("length", SqlType::Real),
        column!("level", SqlType::Text),
        column!("location", SqlType::Text),
        column!("method", SqlType::Text),
        column!("page", SqlType::Text),
        column!("registration", SqlType::BigInt),
        column!("session_id", SqlType::Integer),
        column!("song", SqlType::Text),
        column!("status", SqlType::Integer),
        column!("ts", SqlType::Timestamp),
        column!("user_agent", SqlType::Text),
        column!("user_id", SqlType::Integer),
    ],
    dist_style: DistStyle::Auto,
};

/// Raw song-catalog records. Column names match the JSON keys of the source
/// files so the warehouse's auto-detected JSON mapping can populate them.
pub const STAGING_SONGS: Table = Table {
    name: "staging_songs",
    columns: &[
        column!("num_songs", SqlType::Integer),
        column!("artist_id", SqlType::Text),
        column!("artist_latitude", SqlType::Numeric),
        column!("artist_longitude", SqlType::Numeric),
        column!("artist_location", SqlType::Text),
        column!("artist_name", SqlType::Text),
        column!("song_id", SqlType::Text),
        column!("title", SqlType::Text),
        column!("duration", SqlType::Real),
        column!("year", SqlType::Integer),
    ],
    dist_style: DistStyle::Auto,
};

/// One row per user, co-located with the fact table on user_id.
pub const USERS: Table = Table {
    name: "users",
    columns: &[
        column!("user_id", SqlType::Integer, dist_key = true, sort_key = true),
        column!("first_name", SqlType::Text),
        column!("last_name", SqlType::Text),
        column!("gender", SqlType::Text),
        column!("level", SqlType::Text),
    ],
    dist_style: DistStyle::Auto,
};

/// One row per song. Small and joined constantly, so replicated to every
/// node.
pub const SONGS: Table = Table {
    name: "songs",
    columns: &[
        column!("song_id", SqlType::Text),
        column!("title", SqlType::Text),
        column!("artist_id", SqlType::Text),
        column!("year", SqlType::Integer),
        column!("duration", SqlType::Real),
    ],
    dist_style: DistStyle::All,
};

/// One row per artist, replicated like `songs`.
pub const ARTISTS: Table = Table {
    name: "artists",
    columns: &[
        column!("artist_id", SqlType::Text),
        column!("name", SqlType::Text),
        column!("location", SqlType::Text),
        column!("latitude", SqlType::Numeric),
        column!("longitude", SqlType::Numeric),
    ],
    dist_style: DistStyle::All,
};

/// One row per distinct play timestamp, decomposed for calendar rollups.
/// Distributed by start_time for locality with the fact table.
pub const TIME: Table = Table {
    name: "time",
    columns: &[
        column!("start_time", SqlType::Timestamp, dist_key = true),
        column!("hour", SqlType::Integer),
        column!("day", SqlType::Integer),
        column!("week", SqlType::Integer),
        column!("month", SqlType::Integer),
        column!("year", SqlType::Integer),
        column!("weekday", SqlType::Integer),
    ],
    dist_style: DistStyle::Auto,
};

/// The fact table: one row per qualifying play event, with a generated
/// surrogate key.
pub const SONGPLAYS: Table = Table {
    name: "songplays",
    columns: &[
        column!("songplay_id", SqlType::Integer, identity = true),
        column!("start_time", SqlType::Timestamp),
        column!("user_id", SqlType::Integer, dist_key = true),
        column!("level", SqlType::Text),
        column!("song_id", SqlType::Text),
        column!("artist_id", SqlType::Text, sort_key = true),
        column!("session_id", SqlType::Integer),
        column!("location", SqlType::Text),
        column!("user_agent", SqlType::Text),
    ],
    dist_style: DistStyle::Auto,
};

/// Every table the pipeline owns, in creation order (staging first, then
/// dimensions, then the fact table). Drops reuse the same list; nothing
/// carries referential constraints that would force a different order.
pub const ALL_TABLES: &[&Table] = &[
    &STAGING_EVENTS,
    &STAGING_SONGS,
    &USERS,
    &SONGS,
    &ARTISTS,
    &TIME,
    &SONGPLAYS,
];
