pub mod error;

pub use error::FtpError;

pub type FtpResult<T> = Result<T, FtpError>;
