use crate::core_error::FtpError;
use crate::helpers::ResolvedPath;
use log::error;
use std::io::{self, ErrorKind};

/// Maps a filesystem failure on `path` to the error the client is told about.
pub fn fs_failure(path: &ResolvedPath, e: io::Error) -> FtpError {
    error!("Filesystem operation on {:?} failed: {}", path.physical, e);
    let reason = match e.kind() {
        ErrorKind::NotFound => "no such file or directory",
        ErrorKind::PermissionDenied => "access denied by the server filesystem",
        ErrorKind::AlreadyExists => "already exists",
        _ => "filesystem error",
    };
    FtpError::FileUnavailable(format!("{}: {}", path.virtual_path, reason))
}

/// Quotes a path for a 257 reply, doubling embedded quotes.
pub fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\"\""))
}
