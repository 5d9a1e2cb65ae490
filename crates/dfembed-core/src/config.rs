//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `DFEMBED_*` env
//! vars (`__` separates nested keys, e.g. `DFEMBED_INDEX__NUM_THREADS`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_EMBEDDING_CHUNK_SIZE: usize = 500;
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 2000;
pub const DEFAULT_DATABASE_NAME: &str = "./lance_db";
pub const DEFAULT_TABLE_NAME: &str = "embeddings";
pub const DEFAULT_VECTOR_DIM: usize = 1024;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(IndexSection::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("DFEMBED_").split("__"));

        Ok(Self { figment })
    }

    /// Wrap an already-assembled figment (used by tests and embedders of the library).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the `[index]` section.
    pub fn index_config(&self) -> Result<IndexConfig> {
        let cfg: IndexConfig = self
            .figment
            .extract_inner("index")
            .map_err(|e| Error::InvalidConfig(format!("[index]: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Serialize)]
struct IndexSection {
    index: IndexConfig,
}

/// Parameters of one indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub num_threads: usize,
    pub embedding_chunk_size: usize,
    pub write_buffer_size: usize,
    pub database_name: String,
    pub table_name: String,
    pub vector_dim: usize,
    /// Embed only this column's value instead of the whole rendered row.
    pub text_column: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            embedding_chunk_size: DEFAULT_EMBEDDING_CHUNK_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            vector_dim: DEFAULT_VECTOR_DIM,
            text_column: None,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(Error::InvalidConfig("num_threads must be >= 1".into()));
        }
        if self.embedding_chunk_size == 0 {
            return Err(Error::InvalidConfig("embedding_chunk_size must be > 0".into()));
        }
        if self.write_buffer_size == 0 {
            return Err(Error::InvalidConfig("write_buffer_size must be > 0".into()));
        }
        if self.vector_dim == 0 || i32::try_from(self.vector_dim).is_err() {
            return Err(Error::InvalidConfig(format!("vector_dim {} out of range", self.vector_dim)));
        }
        if self.database_name.trim().is_empty() {
            return Err(Error::InvalidConfig("database_name must not be empty".into()));
        }
        if self.table_name.trim().is_empty() {
            return Err(Error::InvalidConfig("table_name must not be empty".into()));
        }
        Ok(())
    }

    /// Database location with `~` and environment variables expanded.
    pub fn database_path(&self) -> PathBuf {
        expand_path(&self.database_name)
    }
}

pub fn default_num_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
