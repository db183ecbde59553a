//! Command-line arguments for `drobots-client`.

use std::path::PathBuf;

use clap::Parser;
use drobots_session::{ClientConfig, SessionError};

#[derive(Parser, Debug)]
#[command(name = "drobots-client")]
#[command(about = "Joins a drobots match as one player")]
#[command(version)]
pub struct Cli {
    /// TOML file with the client configuration
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Coordinator reference, e.g. game@ws://127.0.0.1:10000
    #[arg(long, value_name = "REF")]
    pub game_proxy: Option<String>,

    /// Local host:port for the callback endpoint
    #[arg(long, value_name = "HOST:PORT")]
    pub adapter_endpoint: Option<String>,

    /// Player name to log in with
    #[arg(long = "name", value_name = "NAME")]
    pub player_name: Option<String>,

    /// Maximum number of units to accept
    #[arg(long, value_name = "N")]
    pub max_units: Option<usize>,

    /// Bound on the login call, in milliseconds
    #[arg(long, value_name = "MS")]
    pub login_timeout_ms: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// The config file (if any) with command-line values layered on top.
    pub fn client_config(&self) -> Result<ClientConfig, SessionError> {
        let file = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        Ok(file.merge(ClientConfig {
            game_proxy: self.game_proxy.clone(),
            adapter_endpoint: self.adapter_endpoint.clone(),
            player_name: self.player_name.clone(),
            max_units: self.max_units,
            login_timeout_ms: self.login_timeout_ms,
        }))
    }
}
