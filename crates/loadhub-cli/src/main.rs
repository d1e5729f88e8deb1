//! Operator CLI: thin wrappers over the same service crates the scheduler's
//! HTTP API fronts — no logic lives here that isn't already in those crates.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "loadhub")]
#[command(about = "loadhub operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Control-plane database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Source Registry commands
    Sources {
        #[command(subcommand)]
        cmd: SourcesCmd,
    },

    /// Distributed lock inspection/recovery
    Locks {
        #[command(subcommand)]
        cmd: LocksCmd,
    },

    /// Loader inspection
    Loaders {
        #[command(subcommand)]
        cmd: LoadersCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum SourcesCmd {
    /// Reload every source descriptor and rebuild its connection pool
    Reload,
}

#[derive(Subcommand)]
enum LocksCmd {
    /// List every currently-held lock
    List,
    /// Force-release locks held longer than `--stale-seconds`
    Reap {
        #[arg(long, default_value_t = 300)]
        stale_seconds: i64,
    },
}

#[derive(Subcommand)]
enum LoadersCmd {
    /// Show the active version of one loader, including its derived state
    Show {
        loader_code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => run_db(cmd).await?,
        Commands::Sources { cmd } => run_sources(cmd).await?,
        Commands::Locks { cmd } => run_locks(cmd).await?,
        Commands::Loaders { cmd } => run_loaders(cmd).await?,
    }

    Ok(())
}

async fn run_db(cmd: DbCmd) -> Result<()> {
    let pool = loadhub_db::connect_from_env().await?;
    match cmd {
        DbCmd::Status => {
            let s = loadhub_db::status(&pool).await?;
            println!("db_ok={} has_loader_table={}", s.ok, s.has_loader_table);
        }
        DbCmd::Migrate => {
            loadhub_db::migrate(&pool).await?;
            println!("migrations_applied=true");
        }
    }
    Ok(())
}

async fn run_sources(cmd: SourcesCmd) -> Result<()> {
    let pool = loadhub_db::connect_from_env().await?;
    let encryption_key = loadhub_crypto::EncryptionKey::from_env()?;
    let registry = loadhub_sources::SourceRegistry::new(pool, encryption_key);
    match cmd {
        SourcesCmd::Reload => {
            let report = registry.reload_all().await?;
            println!("loaded={}", report.loaded.join(","));
            for (code, reason) in &report.skipped {
                println!("skipped {code}: {reason}");
            }
        }
    }
    Ok(())
}

async fn run_locks(cmd: LocksCmd) -> Result<()> {
    let pool = loadhub_db::connect_from_env().await?;
    match cmd {
        LocksCmd::List => {
            let held = loadhub_db::locks::list_stale_held(&pool, Utc::now()).await?;
            for lock in held {
                println!(
                    "{} loader={} replica={} acquired_at={}",
                    lock.lock_id, lock.loader_code, lock.replica_name, lock.acquired_at
                );
            }
        }
        LocksCmd::Reap { stale_seconds } => {
            let threshold = Utc::now() - chrono::Duration::seconds(stale_seconds);
            let stale = loadhub_db::locks::list_stale_held(&pool, threshold).await?;
            let mut reaped = 0;
            for lock in &stale {
                if loadhub_db::locks::reap(&pool, lock.lock_id).await? {
                    println!("reaped {} (loader={})", lock.lock_id, lock.loader_code);
                    reaped += 1;
                }
            }
            println!("reaped_count={reaped}");
        }
    }
    Ok(())
}

async fn run_loaders(cmd: LoadersCmd) -> Result<()> {
    let pool = loadhub_db::connect_from_env().await?;
    match cmd {
        LoadersCmd::Show { loader_code } => {
            let Some(loader) = loadhub_db::loaders::fetch_active_by_code(&pool, &loader_code).await? else {
                println!("no active version for loader '{loader_code}'");
                return Ok(());
            };
            let lock_held = loadhub_db::locks::count_held(&pool, &loader_code).await? > 0;
            let state = loadhub_schemas::LoaderState::derive(&loader, lock_held, Utc::now());
            println!("loader_code={}", loader.loader_code);
            println!("state={}", state.as_str());
            println!("enabled={}", loader.enabled);
            println!("load_status={:?}", loader.load_status);
            println!("version_number={}", loader.version_number);
            println!("last_load_timestamp={:?}", loader.last_load_timestamp);
            println!("failed_retry_count={}", loader.failed_retry_count);
        }
    }
    Ok(())
}
