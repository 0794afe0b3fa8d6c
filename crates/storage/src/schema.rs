use rusqlite::Connection;

use crate::error::StorageError;

pub fn init_schema(conn: &Connection, prefix: &str) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(&schema_sql(prefix))?;
    Ok(())
}

/// The two tables backing a shard. `(source_id, state, position)` is the
/// primary key; `(source_id, destination_id)` is the edge identity and is
/// enforced by the named unique index (the paginated destination scans also
/// run off it).
pub fn schema_sql(prefix: &str) -> String {
    format!(
        "
CREATE TABLE IF NOT EXISTS {p}_edges (
    source_id      INTEGER NOT NULL,
    position       INTEGER NOT NULL,
    updated_at     INTEGER NOT NULL,
    destination_id INTEGER NOT NULL,
    count          INTEGER NOT NULL,
    state          INTEGER NOT NULL,
    PRIMARY KEY (source_id, state, position)
);
CREATE UNIQUE INDEX IF NOT EXISTS {p}_edges_source_dest
    ON {p}_edges (source_id, destination_id);

CREATE TABLE IF NOT EXISTS {p}_metadata (
    source_id  INTEGER NOT NULL PRIMARY KEY,
    count      INTEGER NOT NULL,
    state      INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
",
        p = prefix
    )
}
