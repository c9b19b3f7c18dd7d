use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fakedb",
    about = "FakeDB: document and table databases on blob storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Local storage root; overrides the configured storage
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Path to a fakedb.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an INSERT or SELECT statement against a table database
    Sql(SqlArgs),
    /// Create a table with declared columns
    CreateTable(CreateTableArgs),
    /// Create a document collection
    CreateCollection(CreateCollectionArgs),
    /// Insert a JSON object, or an array of objects, into a collection or table
    Insert(InsertArgs),
    /// List the records of a collection or table
    Find(FindArgs),
    /// List namespaces and their kinds
    Namespaces(DbArgs),
    /// Show operations currently marked as in flight
    Pending(DbArgs),
    /// Clear in-flight operations left behind by a crashed writer
    Repair(DbArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct DbArgs {
    pub db: String,
}

#[derive(Args)]
pub struct SqlArgs {
    pub db: String,
    pub statement: String,
}

#[derive(Args)]
pub struct CreateTableArgs {
    pub db: String,
    pub table: String,
    /// Column as NAME:TYPE; repeat for each column
    #[arg(long = "column", value_name = "NAME:TYPE", value_parser = parse_column, required = true)]
    pub columns: Vec<(String, String)>,
}

#[derive(Args)]
pub struct CreateCollectionArgs {
    pub db: String,
    pub name: String,
}

#[derive(Args)]
pub struct InsertArgs {
    pub db: String,
    pub collection: String,
    pub json: String,
}

#[derive(Args)]
pub struct FindArgs {
    pub db: String,
    pub collection: String,
    /// Only the record with this identity
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {}

fn parse_column(spec: &str) -> Result<(String, String), String> {
    match spec.split_once(':') {
        Some((name, ty)) if !name.is_empty() && !ty.is_empty() => {
            Ok((name.to_string(), ty.to_string()))
        }
        _ => Err(format!("expected NAME:TYPE, got {spec:?}")),
    }
}
