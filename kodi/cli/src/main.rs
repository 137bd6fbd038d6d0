mod config;
mod db;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kodi_app::KodiApp;

use config::{Config, EnvOverride};

#[derive(Parser)]
#[clap(name = "kodi", version = env!("BUILD_VERSION"), about = "Rent ledger service")]
struct Cli {
    /// YAML config file
    #[clap(short, long, env = "KODI_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
    /// PostgreSQL connection string
    #[clap(long, env = "PG_CON", hide_env_values = true)]
    pg_con: String,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the service: keeps the daily rent generation schedule resident
    /// until interrupted.
    Run,
    /// Trigger one rent generation pass and exit.
    GenerateRent,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(
        cli.config.as_ref(),
        EnvOverride {
            pg_con: cli.pg_con.clone(),
        },
    )?;

    let pool = db::init_pool(&config.db).await?;
    let app = KodiApp::init(pool, config.app).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!("kodi running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            app.shutdown();
        }
        Command::GenerateRent => {
            let summary = app.generate_monthly_rent().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            app.shutdown();
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
