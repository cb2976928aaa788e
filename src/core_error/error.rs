// Error taxonomy shared by the client and server roles
use crate::core_auth::Permission;
use crate::core_reply::Reply;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FtpError {
    #[error("connection to {addr} refused: {source}")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("malformed reply line: {0:?}")]
    MalformedReply(String),

    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("path escapes the user root: {0}")]
    PathEscapesRoot(String),

    #[error("permission denied: {permission} on {path}")]
    PermissionDenied { permission: Permission, path: String },

    #[error("data channel setup failed: {0}")]
    DataChannelSetupFailed(String),

    #[error("data connection did not arrive in time")]
    DataChannelTimeout,

    #[error("transfer interrupted after {bytes} bytes: {source}")]
    TransferInterrupted {
        bytes: u64,
        #[source]
        source: io::Error,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: Reply },

    #[error("file unavailable: {0}")]
    FileUnavailable(String),

    #[error("local file {}: {source}", path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bad sequence of commands: {0}")]
    BadSequence(String),

    #[error("syntax error in arguments: {0}")]
    InvalidArgument(String),

    #[error("not connected")]
    NotConnected,

    #[error("control connection closed by peer")]
    ConnectionClosed,

    #[error("control connection I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FtpError {
    /// The reply line (without CRLF) a server sends for this error.
    pub fn to_ftp_response(&self) -> String {
        match self {
            FtpError::NotAuthenticated => "530 Please login with USER and PASS.".to_string(),
            FtpError::AuthenticationRejected(_) => "530 Login incorrect.".to_string(),
            FtpError::PathEscapesRoot(_) => "550 Path is outside of the allowed area.".to_string(),
            FtpError::PermissionDenied { .. } => "550 Permission denied.".to_string(),
            FtpError::FileUnavailable(reason) => {
                format!("550 Requested action not taken: {}.", reason)
            }
            FtpError::DataChannelSetupFailed(_) | FtpError::DataChannelTimeout => {
                "425 Can't open data connection.".to_string()
            }
            FtpError::TransferInterrupted { .. } => {
                "426 Connection closed; transfer aborted.".to_string()
            }
            FtpError::ProtocolViolation(_) | FtpError::MalformedReply(_) => {
                "500 Syntax error, command unrecognized.".to_string()
            }
            FtpError::InvalidArgument(_) => {
                "501 Syntax error in parameters or arguments.".to_string()
            }
            FtpError::BadSequence(_) => "503 Bad sequence of commands.".to_string(),
            _ => "451 Requested action aborted. Local error in processing.".to_string(),
        }
    }

    /// Errors that leave the control connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FtpError::Io(_) | FtpError::ConnectionClosed)
    }

    /// The server reply carried by the error, if any.
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            FtpError::UnexpectedReply { reply, .. } => Some(reply),
            _ => None,
        }
    }

    /// Bytes moved before the transfer failed.
    pub fn bytes_transferred(&self) -> Option<u64> {
        match self {
            FtpError::TransferInterrupted { bytes, .. } => Some(*bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnosable_errors_map_to_reply_codes() {
        assert!(FtpError::NotAuthenticated.to_ftp_response().starts_with("530 "));
        assert!(FtpError::PathEscapesRoot("/..".into())
            .to_ftp_response()
            .starts_with("550 "));
        let denied = FtpError::PermissionDenied {
            permission: Permission::Store,
            path: "/a".into(),
        };
        assert!(denied.to_ftp_response().starts_with("550 "));
        assert!(FtpError::DataChannelTimeout.to_ftp_response().starts_with("425 "));
        assert!(FtpError::BadSequence("PASS".into())
            .to_ftp_response()
            .starts_with("503 "));
    }

    #[test]
    fn test_only_transport_errors_are_fatal() {
        assert!(FtpError::ConnectionClosed.is_fatal());
        assert!(FtpError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!FtpError::NotAuthenticated.is_fatal());
        let interrupted = FtpError::TransferInterrupted {
            bytes: 42,
            source: io::Error::from(io::ErrorKind::ConnectionReset),
        };
        assert!(!interrupted.is_fatal());
        assert_eq!(interrupted.bytes_transferred(), Some(42));
    }
}
