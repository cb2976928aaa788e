use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rouilleftp::config::Config;
use rouilleftp::core_auth::helper::hash_password;
use rouilleftp::core_cli::ServerCli;
use rouilleftp::core_log::logger::init_logger;
use rouilleftp::server;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = ServerCli::parse();

    if let Some(password) = args.hash_password {
        let hash = hash_password(&password).context("Failed to hash password")?;
        println!("{}", hash);
        return Ok(());
    }

    init_logger(args.verbose);

    // Determine the default config path based on the OS
    let default_config_path = if cfg!(target_os = "windows") {
        "C:\\rouilleftpd\\etc\\rouilleftpd.conf"
    } else {
        "/etc/rouilleftpd.conf"
    };
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(default_config_path));

    info!("Loading configuration from {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    server::run(config).await
}
