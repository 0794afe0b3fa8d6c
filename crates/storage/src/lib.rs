pub mod error;
pub mod executor;
pub mod rows;
pub mod schema;

pub use error::StorageError;
pub use executor::{Executor, QueryClass, Txn};
pub use rows::{edge_from_row, edge_from_row_at, metadata_from_row, EDGE_COLUMNS, METADATA_COLUMNS};
