use quiver_core::{Edge, Metadata, State};
use rusqlite::types::Type;
use rusqlite::Row;

/// Column list matching `edge_from_row`, in declared table order.
pub const EDGE_COLUMNS: &str = "source_id, position, updated_at, destination_id, count, state";

/// Column list matching `metadata_from_row`.
pub const METADATA_COLUMNS: &str = "source_id, count, state, updated_at";

fn state_at(row: &Row<'_>, index: usize) -> rusqlite::Result<State> {
    let id: i64 = row.get(index)?;
    State::from_id(id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, Box::new(e)))
}

/// Decode an edge starting at column `offset` (the paginated union queries
/// prepend a discriminator column).
pub fn edge_from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Edge> {
    Ok(Edge {
        source_id: row.get::<_, i64>(offset)? as u64,
        position: row.get(offset + 1)?,
        updated_at: row.get::<_, i64>(offset + 2)? as u32,
        destination_id: row.get::<_, i64>(offset + 3)? as u64,
        count: row.get::<_, i64>(offset + 4)? as u8,
        state: state_at(row, offset + 5)?,
    })
}

pub fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    edge_from_row_at(row, 0)
}

pub fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<Metadata> {
    Ok(Metadata {
        source_id: row.get::<_, i64>(0)? as u64,
        count: row.get::<_, i64>(1)? as i32,
        state: state_at(row, 2)?,
        updated_at: row.get::<_, i64>(3)? as u32,
    })
}
