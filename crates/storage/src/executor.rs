use parking_lot::Mutex;
use rusqlite::{Connection, Params, Row, TransactionBehavior};
use tracing::trace;

use crate::error::StorageError;
use crate::schema;

/// Tag describing which replica/timeout class a query belongs to. With a
/// single embedded backend the tag only reaches trace output, but every
/// call site declares one so the routing intent survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Select,
    SelectModify,
    SelectCopy,
}

impl QueryClass {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryClass::Select => "select",
            QueryClass::SelectModify => "select_modify",
            QueryClass::SelectCopy => "select_copy",
        }
    }
}

/// The transactional executor a shard runs against: plain queries against
/// the pooled connection, plus immediate transactions whose writes commit
/// or roll back as a unit. Writers on the same store serialize at
/// transaction start; `SQLITE_BUSY` surfaces as [`StorageError::Deadlock`]
/// and is retried by the caller.
#[derive(Debug)]
pub struct Executor {
    conn: Mutex<Connection>,
}

impl Executor {
    pub fn open(path: &str, prefix: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        schema::init_schema(&conn, prefix)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory(prefix: &str) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn, prefix)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn select<T, P, F>(
        &self,
        class: QueryClass,
        sql: &str,
        params: P,
        f: F,
    ) -> Result<Vec<T>, StorageError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        run_select(&conn, class, sql, params, f)
    }

    pub fn select_one<T, P, F>(
        &self,
        class: QueryClass,
        sql: &str,
        params: P,
        f: F,
    ) -> Result<Option<T>, StorageError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        run_select_one(&conn, class, sql, params, f)
    }

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        run_execute(&conn, sql, params)
    }

    /// Run `f` inside an immediate transaction. Commits on `Ok`, rolls back
    /// on `Err`. All statements inside `f` must go through the provided
    /// [`Txn`]; re-entering the executor from inside would self-deadlock on
    /// the connection.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Txn<'_>) -> Result<T, StorageError>,
    {
        let mut conn = self.conn.lock();
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&Txn { inner: &txn });
        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = txn.rollback() {
                    trace!(error = %rollback, "rollback after failed transaction also failed");
                }
                Err(error)
            }
        }
    }
}

/// Statement surface available inside an open transaction.
pub struct Txn<'conn> {
    inner: &'conn rusqlite::Transaction<'conn>,
}

impl Txn<'_> {
    pub fn select<T, P, F>(
        &self,
        class: QueryClass,
        sql: &str,
        params: P,
        f: F,
    ) -> Result<Vec<T>, StorageError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        run_select(self.inner, class, sql, params, f)
    }

    pub fn select_one<T, P, F>(
        &self,
        class: QueryClass,
        sql: &str,
        params: P,
        f: F,
    ) -> Result<Option<T>, StorageError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        run_select_one(self.inner, class, sql, params, f)
    }

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, StorageError> {
        run_execute(self.inner, sql, params)
    }

    /// Execute a prepared statement once per row, collecting a status per
    /// row: the affected-row count, or `-1` for a row that hit an integrity
    /// violation. Integrity failures do not stop the batch; if any row
    /// failed the whole call reports [`StorageError::Batch`] carrying the
    /// statuses so the caller can partition and recover. Any other error
    /// aborts immediately.
    pub fn execute_batch<P, I>(&self, sql: &str, rows: I) -> Result<Vec<i64>, StorageError>
    where
        P: Params,
        I: IntoIterator<Item = P>,
    {
        let mut stmt = self.inner.prepare(sql)?;
        let mut statuses = Vec::new();
        let mut any_failed = false;
        for params in rows {
            match stmt.execute(params) {
                Ok(affected) => statuses.push(affected as i64),
                Err(error) => {
                    let classified = StorageError::from(error);
                    if classified.is_integrity() {
                        any_failed = true;
                        statuses.push(-1);
                    } else {
                        return Err(classified);
                    }
                }
            }
        }
        if any_failed {
            Err(StorageError::Batch { statuses })
        } else {
            Ok(statuses)
        }
    }
}

fn run_select<T, P, F>(
    conn: &Connection,
    class: QueryClass,
    sql: &str,
    params: P,
    f: F,
) -> Result<Vec<T>, StorageError>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    trace!(class = class.as_str(), sql, "select");
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, f)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn run_select_one<T, P, F>(
    conn: &Connection,
    class: QueryClass,
    sql: &str,
    params: P,
    f: F,
) -> Result<Option<T>, StorageError>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    trace!(class = class.as_str(), sql, "select_one");
    match conn.query_row(sql, params, f) {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn run_execute<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<usize, StorageError> {
    trace!(sql, "execute");
    conn.execute(sql, params).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn executor() -> Executor {
        Executor::open_in_memory("t").expect("in-memory executor")
    }

    #[test]
    fn schema_init_is_idempotent() {
        let ex = executor();
        {
            let conn = ex.conn.lock();
            schema::init_schema(&conn, "t").expect("re-init");
        }
        ex.execute(
            "INSERT INTO t_metadata (source_id, count, state, updated_at) VALUES (1, 0, 0, 0)",
            [],
        )
        .expect("insert after re-init");
    }

    #[test]
    fn select_one_returns_none_on_no_rows() {
        let ex = executor();
        let row: Option<i64> = ex
            .select_one(
                QueryClass::Select,
                "SELECT count FROM t_metadata WHERE source_id = ?1",
                params![42i64],
                |row| row.get(0),
            )
            .expect("select_one");
        assert!(row.is_none());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let ex = executor();
        let result: Result<(), StorageError> = ex.transaction(|txn| {
            txn.execute(
                "INSERT INTO t_metadata (source_id, count, state, updated_at) VALUES (7, 0, 0, 0)",
                [],
            )?;
            Err(StorageError::MissingMetadata { source_id: 7 })
        });
        assert!(result.is_err());

        let row: Option<i64> = ex
            .select_one(
                QueryClass::Select,
                "SELECT count FROM t_metadata WHERE source_id = 7",
                [],
                |row| row.get(0),
            )
            .expect("select after rollback");
        assert!(row.is_none());
    }

    #[test]
    fn transaction_commits_on_ok() {
        let ex = executor();
        ex.transaction(|txn| {
            txn.execute(
                "INSERT INTO t_metadata (source_id, count, state, updated_at) VALUES (7, 3, 0, 0)",
                [],
            )?;
            Ok(())
        })
        .expect("commit");

        let count: Option<i64> = ex
            .select_one(
                QueryClass::Select,
                "SELECT count FROM t_metadata WHERE source_id = 7",
                [],
                |row| row.get(0),
            )
            .expect("select after commit");
        assert_eq!(count, Some(3));
    }

    #[test]
    fn batch_reports_per_row_statuses() {
        let ex = executor();
        let result = ex.transaction(|txn| {
            let rows = vec![
                (1i64, 100i64, 10i64, 5i64, 1i64, 0i64),
                // same (source_id, destination_id): integrity failure
                (1i64, 200, 10, 5, 1, 0),
                (1i64, 300, 10, 6, 1, 0),
            ];
            txn.execute_batch(
                "INSERT INTO t_edges (source_id, position, updated_at, destination_id, count, state) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rows,
            )
        });
        match result {
            Err(StorageError::Batch { statuses }) => assert_eq!(statuses, vec![1, -1, 1]),
            other => panic!("expected batch failure, got {other:?}"),
        }
    }

    #[test]
    fn constraint_violation_classifies_as_integrity() {
        let ex = executor();
        ex.execute(
            "INSERT INTO t_edges (source_id, position, updated_at, destination_id, count, state) \
             VALUES (1, 100, 10, 5, 1, 0)",
            [],
        )
        .expect("first insert");
        let err = ex
            .execute(
                "INSERT INTO t_edges (source_id, position, updated_at, destination_id, count, state) \
                 VALUES (1, 200, 10, 5, 1, 0)",
                [],
            )
            .expect_err("duplicate destination");
        assert!(err.is_integrity(), "got {err:?}");
        assert!(!err.is_deadlock());
    }

    #[test]
    fn select_maps_all_rows() {
        let ex = executor();
        for destination in [5i64, 6, 7] {
            ex.execute(
                "INSERT INTO t_edges (source_id, position, updated_at, destination_id, count, state) \
                 VALUES (1, ?1, 10, ?1, 1, 0)",
                params![destination],
            )
            .expect("insert");
        }
        let destinations: Vec<i64> = ex
            .select(
                QueryClass::Select,
                "SELECT destination_id FROM t_edges WHERE source_id = 1 ORDER BY destination_id",
                [],
                |row| row.get(0),
            )
            .expect("select");
        assert_eq!(destinations, vec![5, 6, 7]);
    }
}
