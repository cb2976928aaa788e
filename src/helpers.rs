use crate::core_error::{FtpError, FtpResult};
use crate::core_reply::Reply;
use log::{trace, warn};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A client path resolved against the session's working directory and
/// confined to the user's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute path as the client sees it, rooted at `/`.
    pub virtual_path: String,
    /// Location on the server filesystem, inside the root.
    pub physical: PathBuf,
}

impl ResolvedPath {
    pub fn is_root(&self) -> bool {
        self.virtual_path == "/"
    }

    pub fn file_name(&self) -> &str {
        self.virtual_path.rsplit('/').next().unwrap_or("")
    }
}

/// Lexically resolves `arg` against `cwd` (both virtual, `/`-rooted).
///
/// A `..` that would climb above `/` is rejected rather than clamped.
pub fn normalize_virtual(cwd: &str, arg: &str) -> FtpResult<String> {
    if arg.contains('\0') {
        return Err(FtpError::InvalidArgument("path contains NUL".into()));
    }

    let is_absolute = arg.starts_with('/') || arg.starts_with('\\');
    let mut parts: Vec<&str> = if is_absolute {
        Vec::new()
    } else {
        cwd.split('/').filter(|p| !p.is_empty()).collect()
    };

    for component in arg.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    warn!("Rejected path escaping root: cwd={:?} arg={:?}", cwd, arg);
                    return Err(FtpError::PathEscapesRoot(arg.to_string()));
                }
            }
            other => parts.push(other),
        }
    }

    Ok(format!("/{}", parts.join("/")))
}

/// The filesystem root a user is jailed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathJail {
    root: PathBuf,
}

impl PathJail {
    /// Canonicalizes `root`; fails if it does not exist.
    pub fn new(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `arg` and proves the result stays under the root, following
    /// any symlinks that already exist on the way.
    pub fn resolve(&self, cwd: &str, arg: &str) -> FtpResult<ResolvedPath> {
        let virtual_path = normalize_virtual(cwd, arg)?;

        let mut physical = self.root.clone();
        for part in virtual_path.split('/').filter(|p| !p.is_empty()) {
            physical.push(part);
        }

        self.check_confined(&physical, arg)?;
        trace!("Resolved {:?} to {:?}", arg, physical);

        Ok(ResolvedPath {
            virtual_path,
            physical,
        })
    }

    fn check_confined(&self, physical: &Path, arg: &str) -> FtpResult<()> {
        for candidate in physical.ancestors() {
            if std::fs::symlink_metadata(candidate).is_err() {
                continue;
            }
            // Deepest existing ancestor decides; a dangling link cannot be proven safe.
            let confined = match std::fs::canonicalize(candidate) {
                Ok(real) => real.starts_with(&self.root),
                Err(_) => false,
            };
            if !confined {
                warn!("Rejected {:?}: {:?} resolves outside root", arg, candidate);
                return Err(FtpError::PathEscapesRoot(arg.to_string()));
            }
            return Ok(());
        }
        Err(FtpError::PathEscapesRoot(arg.to_string()))
    }
}

/// Writes a reply to a control connection.
pub async fn send_reply<W>(writer: &mut W, reply: &Reply) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(reply.to_wire().as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative_and_absolute() {
        assert_eq!(normalize_virtual("/", "a/b").unwrap(), "/a/b");
        assert_eq!(normalize_virtual("/a", "b").unwrap(), "/a/b");
        assert_eq!(normalize_virtual("/a/b", "../c").unwrap(), "/a/c");
        assert_eq!(normalize_virtual("/a/b", "/x/./y/").unwrap(), "/x/y");
        assert_eq!(normalize_virtual("/a", "..").unwrap(), "/");
        assert_eq!(normalize_virtual("/a", "b\\c").unwrap(), "/a/b/c");
    }

    #[test]
    fn test_dotdot_above_root_is_rejected() {
        for (cwd, arg) in [
            ("/", ".."),
            ("/", "../etc/passwd"),
            ("/a", "../../b"),
            ("/a/b", "/../a"),
            ("/", "a/../../b"),
            ("/", "..\\..\\windows"),
        ] {
            assert!(
                matches!(normalize_virtual(cwd, arg), Err(FtpError::PathEscapesRoot(_))),
                "{} + {} should escape",
                cwd,
                arg
            );
        }
    }

    #[test]
    fn test_jail_maps_into_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pub")).unwrap();
        let jail = PathJail::new(dir.path()).unwrap();

        let resolved = jail.resolve("/pub", "file.txt").unwrap();
        assert_eq!(resolved.virtual_path, "/pub/file.txt");
        assert_eq!(resolved.physical, jail.root().join("pub").join("file.txt"));
        assert_eq!(resolved.file_name(), "file.txt");

        let absolute = jail.resolve("/pub", "/etc/passwd").unwrap();
        assert!(absolute.physical.starts_with(jail.root()));
        assert!(jail.resolve("/", "/").unwrap().is_root());
    }

    #[test]
    fn test_jail_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let jail = PathJail::new(dir.path()).unwrap();
        assert!(matches!(
            jail.resolve("/", "../outside"),
            Err(FtpError::PathEscapesRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_jail_rejects_symlink_out_of_root() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"x").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("missing"),
            dir.path().join("dangling"),
        )
        .unwrap();
        let jail = PathJail::new(dir.path()).unwrap();

        assert!(matches!(
            jail.resolve("/", "link/secret"),
            Err(FtpError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            jail.resolve("/", "link/new-file"),
            Err(FtpError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            jail.resolve("/", "dangling"),
            Err(FtpError::PathEscapesRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_jail_allows_symlink_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();
        let jail = PathJail::new(dir.path()).unwrap();
        assert!(jail.resolve("/", "alias/file").is_ok());
    }

    #[tokio::test]
    async fn test_send_reply_writes_wire_format() {
        let mut out = Vec::new();
        send_reply(&mut out, &Reply::new(230, "User logged in, proceed."))
            .await
            .unwrap();
        assert_eq!(out, b"230 User logged in, proceed.\r\n");
    }
}
