use serde::Deserialize;

/// Per-shard configuration. `db_name` is the backing store (a file path, or
/// `:memory:` by convention for tests), `table_prefix` namespaces the two
/// tables, and `deadlock_retries` bounds the writer retry loops.
#[derive(Debug, Clone, Deserialize)]
pub struct ShardConfig {
    pub db_name: String,
    pub table_prefix: String,
    #[serde(default = "default_deadlock_retries")]
    pub deadlock_retries: u32,
}

fn default_deadlock_retries() -> u32 {
    3
}

impl ShardConfig {
    pub fn new(db_name: impl Into<String>, table_prefix: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            table_prefix: table_prefix.into(),
            deadlock_retries: default_deadlock_retries(),
        }
    }

    /// Identity used to tag errors crossing the shard boundary.
    pub fn shard_id(&self) -> String {
        format!("{}/{}", self.db_name, self.table_prefix)
    }
}
