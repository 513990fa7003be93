mod cli;
mod config;
mod db;
mod error;
mod models;
mod rank;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use cli::args::{Cli, Commands};
use cli::handlers;
use config::AppConfig;

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Loading config")?;

    if let Commands::InitConfig = cli.command {
        return handlers::handle_init_config(&config);
    }

    let db_path = config.ensure_db_dir()?;
    debug!("Using database {:?}", db_path);
    // Migrations run on every startup
    let conn = db::open(&db_path, config.store.busy_timeout())?;

    match cli.command {
        Commands::Register { user, belt } => handlers::handle_register(&conn, &user, &belt)?,
        Commands::Checkin { user, times } => handlers::handle_checkin(&conn, &user, times)?,
        Commands::SetCheckins { user, count } => {
            handlers::handle_set_checkins(&conn, &user, count)?
        }
        Commands::Promote { user, belt } => handlers::handle_promote(&conn, &user, &belt)?,
        Commands::Progress { user } => handlers::handle_progress(&conn, &config, &user)?,
        Commands::Sync { user } => handlers::handle_sync(&conn, &config, &user)?,
        Commands::History { user, limit } => handlers::handle_history(&conn, &user, limit)?,
        Commands::Members => handlers::handle_members(&conn)?,
        Commands::Export { user } => handlers::handle_export(&conn, &user)?,
        Commands::InitConfig => unreachable!(),
    }

    Ok(())
}
