//! Runtime settings: command-line flags layered over an optional YAML file.
//!
//! Precedence is flag (or its environment variable) > file > built-in default.
//!
//! ```yaml
//! database_url: postgres://ingest@localhost/ingest
//! sequence: core_raw_tables_id_seq
//! connect_timeout_secs: 10
//! statement_timeout_ms: 30000
//! schema: ingest
//! input_encoding: utf-8
//! ```

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{cli::ConnectionArgs, io_utils};

pub const DEFAULT_SEQUENCE: &str = "core_raw_tables_id_seq";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database_url: Option<String>,
    pub sequence: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub statement_timeout_ms: Option<u64>,
    pub schema: Option<String>,
    pub input_encoding: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Zero disables the limit.
    pub statement_timeout: Duration,
    /// `search_path` for the session; the server default when `None`.
    pub schema: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub sequence: String,
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
    pub schema: Option<String>,
    pub input_encoding: Option<String>,
}

impl Settings {
    pub fn resolve(args: &ConnectionArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::layer(args, file))
    }

    fn layer(args: &ConnectionArgs, file: FileConfig) -> Self {
        Self {
            database_url: args.database_url.clone().or(file.database_url),
            sequence: args
                .sequence
                .clone()
                .or(file.sequence)
                .unwrap_or_else(|| DEFAULT_SEQUENCE.to_string()),
            connect_timeout: Duration::from_secs(
                args.connect_timeout_secs
                    .or(file.connect_timeout_secs)
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            statement_timeout: Duration::from_millis(
                args.statement_timeout_ms
                    .or(file.statement_timeout_ms)
                    .unwrap_or(DEFAULT_STATEMENT_TIMEOUT_MS),
            ),
            schema: args.schema.clone().or(file.schema),
            input_encoding: file.input_encoding,
        }
    }

    pub fn database(&self) -> Result<DatabaseConfig> {
        let url = self.database_url.clone().ok_or_else(|| {
            anyhow!("No database URL configured; pass --database-url or set DATABASE_URL")
        })?;
        Ok(DatabaseConfig {
            url,
            connect_timeout: self.connect_timeout,
            statement_timeout: self.statement_timeout,
            schema: self.schema.clone(),
        })
    }

    /// Encoding for CSV cells; a command-level flag beats the config file.
    pub fn encoding(&self, flag: Option<&str>) -> Result<&'static Encoding> {
        io_utils::resolve_encoding(flag.or(self.input_encoding.as_deref()))
    }
}
