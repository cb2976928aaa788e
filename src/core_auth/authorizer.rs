use crate::core_auth::core_auth::{CredentialRecord, Permission};
use crate::core_auth::helper::verify_secret;
use crate::core_error::{FtpError, FtpResult};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Username to credential lookup, fixed at construction.
///
/// Shared by every session of a server instance behind an `Arc`; nothing
/// mutates it afterwards so reads need no lock.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    users: HashMap<String, Arc<CredentialRecord>>,
}

impl Authorizer {
    /// Later records with a duplicate username replace earlier ones.
    pub fn new(records: impl IntoIterator<Item = CredentialRecord>) -> Self {
        let users = records
            .into_iter()
            .map(|record| (record.username.clone(), Arc::new(record)))
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn authenticate(&self, username: &str, secret: &str) -> FtpResult<Arc<CredentialRecord>> {
        match self.users.get(username) {
            Some(record) if verify_secret(secret, &record.secret) => {
                info!("User {} authenticated", username);
                Ok(Arc::clone(record))
            }
            Some(_) => {
                warn!("Wrong secret presented for user {}", username);
                Err(FtpError::AuthenticationRejected(format!(
                    "invalid credentials for {}",
                    username
                )))
            }
            None => {
                warn!("Login attempt for unknown user {}", username);
                Err(FtpError::AuthenticationRejected(format!(
                    "invalid credentials for {}",
                    username
                )))
            }
        }
    }

    /// Checks `permission` for `username` on an already resolved, absolute
    /// `target`. Path confinement is the caller's job.
    pub fn authorize(&self, username: &str, permission: Permission, target: &Path) -> FtpResult<()> {
        let record = self.users.get(username).ok_or(FtpError::NotAuthenticated)?;

        if record.permissions.contains(permission) {
            debug!("{} allowed {} on {:?}", username, permission, target);
            Ok(())
        } else {
            warn!("{} denied {} on {:?}", username, permission, target);
            Err(FtpError::PermissionDenied {
                permission,
                path: target.display().to_string(),
            })
        }
    }
}
