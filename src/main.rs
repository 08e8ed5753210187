//! clinicstore CLI - inspect and edit clinic records

use clap::{Parser, Subcommand};
use clinicstore::storage::collection::FileStore;
use clinicstore::{entity, Clinic, Config, EntitySpec, Fields, Record, Repository, Session, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clinicstore")]
#[command(about = "Dual-store persistence for clinic records", long_about = None)]
struct Cli {
    /// YAML config file (defaults to environment / built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Acting user recorded in createdBy / updatedBy
    #[arg(long, default_value = "system")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List collections present in the local store
    Collections,

    /// List every record of a collection
    List { collection: String },

    /// Show one record
    Get { collection: String, id: String },

    /// Create a record from key=value pairs
    Create {
        collection: String,
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Replace a record's fields with key=value pairs
    Update {
        collection: String,
        id: String,
        fields: Vec<String>,
    },

    /// Delete a record
    Delete { collection: String, id: String },

    /// Case-insensitive search
    Search { collection: String, term: String },

    /// Show the next display sequence number
    NextSno { collection: String },

    /// Check staff credentials
    Login { username: String, password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?.with_env()?,
        None => Config::from_env()?,
    };
    let session = Session::new(cli.actor.clone());

    match cli.command {
        Commands::Collections => list_collections(&config),
        Commands::List { collection } => {
            let clinic = Clinic::open(&config).await?;
            let records = repository(&clinic, &collection)?.read_all().await?;
            print_records(&records);
            Ok(())
        }
        Commands::Get { collection, id } => {
            let clinic = Clinic::open(&config).await?;
            match repository(&clinic, &collection)?.get(&id).await? {
                Some(record) => print_records(std::slice::from_ref(&record)),
                None => println!("Record '{}' not found.", id),
            }
            Ok(())
        }
        Commands::Create { collection, fields } => {
            let clinic = Clinic::open(&config).await?;
            let report = repository(&clinic, &collection)?
                .create(&session, parse_fields(&fields)?)
                .await?;
            println!("Created {} (remote: {:?})", report.value.id, report.remote);
            print_records(std::slice::from_ref(&report.value));
            Ok(())
        }
        Commands::Update {
            collection,
            id,
            fields,
        } => {
            let clinic = Clinic::open(&config).await?;
            let report = repository(&clinic, &collection)?
                .update(&session, &id, parse_fields(&fields)?)
                .await?;
            println!("Updated {} (remote: {:?})", report.value.id, report.remote);
            Ok(())
        }
        Commands::Delete { collection, id } => {
            let clinic = Clinic::open(&config).await?;
            let report = repository(&clinic, &collection)?.delete(&id).await?;
            println!("Deleted {} (remote: {:?})", report.value.id, report.remote);
            Ok(())
        }
        Commands::Search { collection, term } => {
            let clinic = Clinic::open(&config).await?;
            let records = repository(&clinic, &collection)?.search(&term).await?;
            print_records(&records);
            Ok(())
        }
        Commands::NextSno { collection } => {
            let clinic = Clinic::open(&config).await?;
            let next = repository(&clinic, &collection)?.next_sequence().await?;
            println!("{}", next);
            Ok(())
        }
        Commands::Login { username, password } => {
            let clinic = Clinic::open(&config).await?;
            match clinic.verify_login(&username, &password).await? {
                Some(record) => println!("Welcome, {} ({}).", username, record.id),
                None => {
                    println!("Invalid username or password.");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
    }
}

fn repository(clinic: &Clinic, collection: &str) -> anyhow::Result<Repository> {
    let spec: EntitySpec = entity::by_collection(collection).ok_or_else(|| {
        let known: Vec<_> = entity::ALL.iter().map(|s| s.collection).collect();
        anyhow::anyhow!(
            "Unknown collection '{}' (expected one of: {})",
            collection,
            known.join(", ")
        )
    })?;
    Ok(clinic.repository(spec))
}

fn list_collections(config: &Config) -> anyhow::Result<()> {
    let store = FileStore::open(&config.data_dir);
    let names = store.collections()?;

    if names.is_empty() {
        println!("No collections found.");
        return Ok(());
    }

    println!("Collections:");
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}

/// Parse `key=value` arguments; numbers and booleans keep their type
fn parse_fields(pairs: &[String]) -> anyhow::Result<Fields> {
    let mut fields = Fields::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{}'", pair))?;
        fields.insert(key.to_string(), parse_value(raw));
    }
    Ok(fields)
}

/// Strings like phone numbers ("0712...") must not lose their leading zero
fn parse_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        if i.to_string() == raw {
            return Value::Int(i);
        }
    }

    let numeric = raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-');
    if numeric && raw.contains('.') {
        if let Ok(x) = raw.parse::<f64>() {
            return Value::Float(x);
        }
    }

    match raw.parse::<bool>() {
        Ok(b) => Value::Bool(b),
        Err(_) => Value::String(raw.to_string()),
    }
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("(0 records)");
        return;
    }

    for record in records {
        match record.sno {
            Some(sno) => println!("--- {} (Sno {}) ---", record.id, sno),
            None => println!("--- {} ---", record.id),
        }
        for (key, value) in &record.fields {
            println!("  {}: {}", key, value);
        }
        println!();
    }
    println!("({} record(s))", records.len());
}
