use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import CSV files into generated PostgreSQL tables",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the upload and import-format metadata tables if they are missing
    Init,
    /// Hash, scan, provision and load one CSV file in a single transaction
    Import(ImportArgs),
    /// Print the column plan a CSV file would produce, without a database
    Probe(ProbeArgs),
    /// Print the three content hashes of a CSV file, without a database
    Hash(HashArgs),
    /// List uploads, newest first
    List(ListArgs),
    /// Print the generated table of an upload
    Show(ShowArgs),
    /// Delete an upload record and its generated table
    Delete(DeleteArgs),
    /// List import formats
    Formats(ListArgs),
    /// Assign an import format to an upload
    SetFormat(SetFormatArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// PostgreSQL connection URL
    #[arg(long = "database-url", env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,
    /// YAML configuration file with connection and import defaults
    #[arg(long = "config", env = "CSV_INGEST_CONFIG", global = true)]
    pub config: Option<PathBuf>,
    /// Sequence whose current value names the next generated table
    #[arg(long = "sequence", global = true)]
    pub sequence: Option<String>,
    /// Seconds to wait for the database connection
    #[arg(long = "connect-timeout", global = true)]
    pub connect_timeout_secs: Option<u64>,
    /// Per-statement deadline in milliseconds (0 disables it)
    #[arg(long = "statement-timeout", global = true)]
    pub statement_timeout_ms: Option<u64>,
    /// Schema holding the metadata tables and generated tables
    #[arg(long = "schema", global = true)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    /// Only meaningful for `show`; other commands fall back to a table
    Csv,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV file to import (`-` reads stdin and requires --name)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Source filename to record instead of the input's file name
    #[arg(long)]
    pub name: Option<String>,
    /// Skip the import when an upload with equivalent content already exists
    #[arg(long = "skip-duplicates")]
    pub skip_duplicates: bool,
    /// Import format id to assign to the new upload
    #[arg(long = "import-format")]
    pub import_format: Option<i32>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// CSV file to inspect (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct HashArgs {
    /// CSV file to fingerprint (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Upload id
    pub id: i32,
    /// Maximum number of rows to print
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Upload id
    pub id: i32,
    /// Keep the generated table and delete only the upload record
    #[arg(long = "keep-table")]
    pub keep_table: bool,
}

#[derive(Debug, Args)]
pub struct SetFormatArgs {
    /// Upload id
    pub upload_id: i32,
    /// Import format id
    pub format_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn import_flags_parse() {
        let cli = Cli::try_parse_from([
            "csv-ingest",
            "import",
            "-i",
            "-",
            "--name",
            "orders.csv",
            "--skip-duplicates",
            "--import-format",
            "3",
            "--format",
            "json",
        ])
        .expect("parse import");
        let Commands::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.name.as_deref(), Some("orders.csv"));
        assert!(args.skip_duplicates);
        assert_eq!(args.import_format, Some(3));
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn connection_flags_are_global() {
        let cli = Cli::try_parse_from([
            "csv-ingest",
            "list",
            "--database-url",
            "postgres://localhost/db",
            "--statement-timeout",
            "250",
        ])
        .expect("parse list");
        assert_eq!(
            cli.connection.database_url.as_deref(),
            Some("postgres://localhost/db")
        );
        assert_eq!(cli.connection.statement_timeout_ms, Some(250));
    }
}
