//! CLI definition and dispatch.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::account;
use crate::domain::error::ScreenerError;
use crate::logging::{DEFAULT_FILTER, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "ema_screener", about = "EMA screener API server and admin tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the database tables
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create a user; the password is read from stdin
    CreateUser {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Issue an API key and print it once
    CreateApiKey {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        name: String,
        /// Days until the key expires; never when omitted
        #[arg(long)]
        expires_in_days: Option<u32>,
    },
    /// Load EMA records from a CSV file
    ImportRecords {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Output an argon2 hash for a password
    HashPassword,
}

pub fn run(cli: Cli) -> ExitCode {
    if !matches!(cli.command, Command::Serve { .. }) {
        init_tracing(false, "warn");
    }
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::InitDb { config } => run_init_db(&config),
        Command::CreateUser {
            config,
            username,
            email,
        } => run_create_user(&config, &username, &email),
        Command::CreateApiKey {
            config,
            name,
            expires_in_days,
        } => run_create_api_key(&config, &name, expires_in_days),
        Command::ImportRecords { config, file } => run_import_records(&config, file),
        Command::HashPassword => run_hash_password(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ScreenerError> {
    FileConfigAdapter::from_file(path)
}

fn read_line(prompt: &str) -> Result<String, ScreenerError> {
    eprintln!("{prompt}");
    let line = io::stdin().lock().lines().next().transpose()?;
    Ok(line.unwrap_or_default().trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(not(feature = "web"))]
fn feature_required(feature: &str, command: &str) -> ScreenerError {
    ScreenerError::Io(io::Error::other(format!(
        "{feature} feature is required for {command}"
    )))
}

#[cfg(feature = "sqlite")]
fn open_store(
    config_path: &Path,
) -> Result<crate::adapters::sqlite_adapter::SqliteAdapter, ScreenerError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let config = load_config(config_path)?;
    let store = SqliteAdapter::from_config(&config)?;
    store.initialize_schema()?;
    Ok(store)
}

fn run_serve(config_path: &Path) -> Result<(), ScreenerError> {
    #[cfg(feature = "web")]
    {
        use std::sync::Arc;

        use crate::adapters::broadcast_notifier::BroadcastNotifier;
        use crate::adapters::log_mailer::LogMailer;
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::adapters::web::{AppState, serve};
        use crate::domain::config_validation::ServerSettings;

        let config = load_config(config_path)?;
        let settings = ServerSettings::from_config(&config)?;
        init_tracing(settings.json_logs, DEFAULT_FILTER);
        tracing::info!(config = %config_path.display(), "configuration loaded");

        let store = Arc::new(SqliteAdapter::open(
            &settings.database_path,
            settings.pool_size,
        )?);
        store.initialize_schema()?;

        let addr = settings.listen;
        let state = AppState {
            records: store.clone(),
            currencies: store.clone(),
            accounts: store,
            notifier: Arc::new(BroadcastNotifier::new(settings.channel_capacity)),
            mailer: Arc::new(LogMailer::new()),
            settings,
        };

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(serve(state, addr))
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = (config_path, DEFAULT_FILTER);
        Err(feature_required("web", "serve"))
    }
}

fn run_init_db(config_path: &Path) -> Result<(), ScreenerError> {
    #[cfg(feature = "sqlite")]
    {
        open_store(config_path)?;
        eprintln!("Database ready");
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config_path;
        Err(feature_required("sqlite", "init-db"))
    }
}

fn run_create_user(config_path: &Path, username: &str, email: &str) -> Result<(), ScreenerError> {
    #[cfg(feature = "sqlite")]
    {
        let store = open_store(config_path)?;
        let password = read_line("Enter password for the new user:")?;
        let user = account::create_user(&store, username, email, &password, chrono::Utc::now())?;
        println!("{}", user.id);
        eprintln!("Created user {}", user.username);
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, username, email);
        Err(feature_required("sqlite", "create-user"))
    }
}

fn run_create_api_key(
    config_path: &Path,
    name: &str,
    expires_in_days: Option<u32>,
) -> Result<(), ScreenerError> {
    #[cfg(feature = "sqlite")]
    {
        let store = open_store(config_path)?;
        let now = chrono::Utc::now();
        let expiry = expires_in_days.map(|days| now + chrono::Duration::days(i64::from(days)));
        let key = account::create_api_key(&store, name, expiry, now)?;
        println!("{key}");
        eprintln!("Store this key now; it cannot be shown again");
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, name, expires_in_days);
        Err(feature_required("sqlite", "create-api-key"))
    }
}

fn run_import_records(config_path: &Path, file: PathBuf) -> Result<(), ScreenerError> {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::csv_adapter::CsvAdapter;
        use crate::ports::currency_port::CurrencyPort;
        use crate::ports::record_port::RecordPort;

        let store = open_store(config_path)?;
        let rows = CsvAdapter::new(file).read_records()?;

        let mut imported = 0usize;
        let mut skipped = 0usize;
        for row in rows {
            match store.find_currency_by_symbol(&row.currency_symbol)? {
                Some(currency) => {
                    store.insert_record(&currency, row)?;
                    imported += 1;
                }
                None => {
                    tracing::warn!(symbol = %row.currency_symbol, "unknown currency, row skipped");
                    skipped += 1;
                }
            }
        }
        eprintln!("Imported {imported} records ({skipped} skipped)");
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, file);
        Err(feature_required("sqlite", "import-records"))
    }
}

fn run_hash_password() -> Result<(), ScreenerError> {
    let password = read_line("Enter password to hash:")?;
    println!("{}", account::hash_password(&password)?);
    Ok(())
}
