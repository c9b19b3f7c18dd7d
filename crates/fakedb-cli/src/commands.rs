use colored::Colorize;
use fakedb_sdk::{
    DocumentDb, FakeDbConfig, FieldMapping, NamespaceDescriptor, Record, SdkError, SdkResult,
    SqlOutcome, StorageConfig, TableDb, ID_COLUMN, ID_FIELD,
};
use serde_json::Value;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Sql(args) => cmd_sql(&config, format, args).await,
        Command::CreateTable(args) => cmd_create_table(&config, args).await,
        Command::CreateCollection(args) => cmd_create_collection(&config, args).await,
        Command::Insert(args) => cmd_insert(&config, format, args).await,
        Command::Find(args) => cmd_find(&config, format, args).await,
        Command::Namespaces(args) => cmd_namespaces(&config, format, args).await,
        Command::Pending(args) => cmd_pending(&config, format, args).await,
        Command::Repair(args) => cmd_repair(&config, format, args).await,
        Command::Config(_) => cmd_config(&config, format),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<FakeDbConfig> {
    let mut config = match &cli.config {
        Some(path) => FakeDbConfig::load(path)?,
        None => FakeDbConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.storage = StorageConfig::Local { root: root.clone() };
    }
    Ok(config)
}

/// Both façades over one backend.
struct Session {
    tables: TableDb,
    documents: DocumentDb,
}

impl Session {
    async fn open(config: &FakeDbConfig, db: &str) -> anyhow::Result<Self> {
        let backend = config.open_backend().await?;
        Ok(Self {
            tables: TableDb::with_policy(backend.clone(), db, config.barrier.clone())?,
            documents: DocumentDb::with_policy(backend, db, config.barrier.clone())?,
        })
    }

    async fn descriptor(&self, namespace: &str) -> SdkResult<NamespaceDescriptor> {
        self.tables
            .coordinator()
            .descriptor(namespace)
            .await
            .map_err(SdkError::from)
    }
}

async fn cmd_sql(config: &FakeDbConfig, format: OutputFormat, args: SqlArgs) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    let outcome = session.tables.execute(&args.statement).await?;
    match (format, outcome) {
        (OutputFormat::Json, outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
        (OutputFormat::Text, SqlOutcome::Inserted(count)) => {
            println!("{} Inserted {} row(s)", "✓".green().bold(), count.to_string().bold());
        }
        (OutputFormat::Text, SqlOutcome::Rows(rows)) => print_records(format, &rows)?,
    }
    Ok(())
}

async fn cmd_create_table(config: &FakeDbConfig, args: CreateTableArgs) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    let columns: FieldMapping = args.columns.into_iter().collect();
    session.tables.create_table(&args.table, columns).await?;
    println!("{} Created table {}/{}", "✓".green().bold(), args.db, args.table.yellow());
    Ok(())
}

async fn cmd_create_collection(
    config: &FakeDbConfig,
    args: CreateCollectionArgs,
) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    session.documents.get_collection(&args.name).await?;
    println!("{} Collection {}/{} ready", "✓".green().bold(), args.db, args.name.yellow());
    Ok(())
}

async fn cmd_insert(config: &FakeDbConfig, format: OutputFormat, args: InsertArgs) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    let rows = match serde_json::from_str::<Value>(&args.json)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    let written = if session.descriptor(&args.collection).await?.is_table() {
        session.tables.insert(&args.collection, rows).await?
    } else {
        session
            .documents
            .collection(&args.collection)?
            .insert_many(rows)
            .await?
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&written)?),
        OutputFormat::Text => println!(
            "{} Inserted {} record(s) into {}",
            "✓".green().bold(),
            written.len().to_string().bold(),
            args.collection.yellow()
        ),
    }
    Ok(())
}

async fn cmd_find(config: &FakeDbConfig, format: OutputFormat, args: FindArgs) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    let (records, id_field) = if session.descriptor(&args.collection).await?.is_table() {
        (session.tables.query_all(&args.collection).await?, ID_COLUMN)
    } else {
        (
            session.documents.collection(&args.collection)?.find_all().await?,
            ID_FIELD,
        )
    };
    let records = match &args.id {
        Some(id) => records
            .into_iter()
            .filter(|record| id_matches(record, id_field, id))
            .collect(),
        None => records,
    };
    print_records(format, &records)
}

/// `raw` matches either as a JSON literal (`42`, `true`) or as a plain string.
fn id_matches(record: &Record, field: &str, raw: &str) -> bool {
    let Some(value) = record.get(field) else {
        return false;
    };
    if value.as_str() == Some(raw) {
        return true;
    }
    serde_json::from_str::<Value>(raw).is_ok_and(|parsed| &parsed == value)
}

async fn cmd_namespaces(config: &FakeDbConfig, format: OutputFormat, args: DbArgs) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    let namespaces = session.tables.coordinator().namespaces().await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&namespaces)?);
        return Ok(());
    }
    if namespaces.is_empty() {
        println!("No namespaces in {}.", args.db.bold());
    }
    for (name, descriptor) in &namespaces {
        let model = descriptor
            .model()
            .map(|m| format!(" model={}", m.cyan()))
            .unwrap_or_default();
        println!("{:<24} {}{}", name.yellow(), descriptor.kind_name(), model);
        if let Some(columns) = descriptor.columns() {
            for (column, ty) in columns {
                println!("  {} {}", column, ty.dimmed());
            }
        }
    }
    Ok(())
}

async fn cmd_pending(config: &FakeDbConfig, format: OutputFormat, args: DbArgs) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    let pending = session.tables.pending_operations().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pending)?),
        OutputFormat::Text if pending.is_empty() => println!("{} No pending operations.", "✓".green()),
        OutputFormat::Text => {
            println!("{} pending operation(s):", pending.len().to_string().yellow().bold());
            for op in &pending {
                println!("  {}", op);
            }
        }
    }
    Ok(())
}

async fn cmd_repair(config: &FakeDbConfig, format: OutputFormat, args: DbArgs) -> anyhow::Result<()> {
    let session = Session::open(config, &args.db).await?;
    let cleared = session.tables.clear_pending_operations().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cleared)?),
        OutputFormat::Text if cleared.is_empty() => println!("{} Nothing to repair.", "✓".green()),
        OutputFormat::Text => {
            println!(
                "{} Cleared {} orphaned operation(s)",
                "✓".green().bold(),
                cleared.len().to_string().bold()
            );
            for op in &cleared {
                println!("  {}", op.dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_config(config: &FakeDbConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

fn print_records(format: OutputFormat, records: &[Record]) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Text => {
            for record in records {
                println!("{}", serde_json::to_string(record)?);
            }
            println!("{}", format!("({} record(s))", records.len()).dimmed());
        }
    }
    Ok(())
}
