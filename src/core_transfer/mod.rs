pub mod pump;

pub use pump::TransferPump;
