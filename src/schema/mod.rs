//! Declarative table definitions and dialect-aware DDL rendering.
//!
//! Tables are described as static data and rendered to SQL per [`Dialect`]:
//! Redshift gets identity columns and distribution attributes, SQLite (the
//! local development backend) gets AUTOINCREMENT keys and stores timestamps
//! as epoch milliseconds.

mod star;

pub use star::{ALL_TABLES, ARTISTS, SONGPLAYS, SONGS, STAGING_EVENTS, STAGING_SONGS, TIME, USERS};

/// SQL dialect a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Redshift,
    Sqlite,
}

#[macro_export]
macro_rules! column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `dist_key = true`)
            #[allow(unused_mut)]
            let mut column = $crate::schema::Column {
                name: $name,
                sql_type: $sql_type,
                identity: false,
                dist_key: false,
                sort_key: false,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    BigInt,
    Real,
    Numeric,
    /// Rendered as TIMESTAMP on Redshift; stored as epoch milliseconds
    /// (INTEGER) on SQLite.
    Timestamp,
}

impl SqlType {
    fn render(&self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (SqlType::Text, _) => "TEXT",
            (SqlType::Integer, _) => "INTEGER",
            (SqlType::BigInt, Dialect::Redshift) => "BIGINT",
            (SqlType::BigInt, Dialect::Sqlite) => "INTEGER",
            (SqlType::Real, Dialect::Redshift) => "DOUBLE PRECISION",
            (SqlType::Real, Dialect::Sqlite) => "REAL",
            (SqlType::Numeric, Dialect::Redshift) => "NUMERIC",
            (SqlType::Numeric, Dialect::Sqlite) => "REAL",
            (SqlType::Timestamp, Dialect::Redshift) => "TIMESTAMP",
            (SqlType::Timestamp, Dialect::Sqlite) => "INTEGER",
        }
    }
}

/// How a table is distributed across Redshift compute nodes. Ignored by the
/// SQLite dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistStyle {
    /// Let the warehouse decide (or distribute by the column marked
    /// `dist_key`).
    Auto,
    /// Replicate the full table to every node. Used for the small,
    /// frequently-joined dimensions.
    All,
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    /// Auto-incrementing surrogate key. IDENTITY(0,1) on Redshift,
    /// INTEGER PRIMARY KEY AUTOINCREMENT on SQLite.
    pub identity: bool,
    pub dist_key: bool,
    pub sort_key: bool,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub dist_style: DistStyle,
}

impl Table {
    /// Render the CREATE statement for this table. `IF NOT EXISTS` makes
    /// re-running without a prior drop a per-table no-op.
    pub fn create_sql(&self, dialect: Dialect) -> String {
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column.name);
            if column.identity && dialect == Dialect::Sqlite {
                sql.push_str(" INTEGER PRIMARY KEY AUTOINCREMENT");
                continue;
            }
            sql.push(' ');
            sql.push_str(column.sql_type.render(dialect));
            if dialect == Dialect::Redshift {
                if column.identity {
                    sql.push_str(" IDENTITY(0,1)");
                }
                if column.dist_key {
                    sql.push_str(" distkey");
                }
                if column.sort_key {
                    sql.push_str(" sortkey");
                }
            }
        }
        if dialect == Dialect::Redshift {
            if let Some(identity) = self.columns.iter().find(|c| c.identity) {
                sql.push_str(&format!(", PRIMARY KEY ({})", identity.name));
            }
        }
        sql.push(')');
        if dialect == Dialect::Redshift && self.dist_style == DistStyle::All {
            sql.push_str(" DISTSTYLE ALL");
        }
        sql
    }

    /// Render the DROP statement. `IF EXISTS` makes dropping on an empty
    /// warehouse a no-op.
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }
}
