pub mod config;
pub mod constants;
pub mod core_auth;
pub mod core_cli;
pub mod core_client;
pub mod core_error;
pub mod core_ftpcommand;
pub mod core_log;
pub mod core_network;
pub mod core_reply;
pub mod core_transfer;
pub mod helpers;
pub mod server;
pub mod session;

pub use config::Config;
pub use core_client::{ClientConfig, ControlSession, DataMode};
pub use core_error::{FtpError, FtpResult};
pub use core_network::{start_server, ServerHandle};
pub use session::SessionSettings;
