pub mod client;
pub mod listing;

pub use client::{ClientConfig, ControlSession, DataMode, TransferReport};
pub use listing::{EntryKind, RemoteEntry};
