use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// A single operation a user may be allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    List,
    Retrieve,
    Store,
    Delete,
    Rename,
    MakeDirectory,
    RemoveDirectory,
    ChangeWorkingDirectory,
    Overwrite,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::List,
        Permission::Retrieve,
        Permission::Store,
        Permission::Delete,
        Permission::Rename,
        Permission::MakeDirectory,
        Permission::RemoveDirectory,
        Permission::ChangeWorkingDirectory,
        Permission::Overwrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::List => "list",
            Permission::Retrieve => "retrieve",
            Permission::Store => "store",
            Permission::Delete => "delete",
            Permission::Rename => "rename",
            Permission::MakeDirectory => "make-directory",
            Permission::RemoveDirectory => "remove-directory",
            Permission::ChangeWorkingDirectory => "change-working-directory",
            Permission::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn all() -> Self {
        Permission::ALL.into_iter().collect()
    }

    /// Browse and download only.
    pub fn read_only() -> Self {
        [
            Permission::List,
            Permission::Retrieve,
            Permission::ChangeWorkingDirectory,
        ]
        .into_iter()
        .collect()
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn without(mut self, permission: Permission) -> Self {
        self.0.remove(&permission);
        self
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Identity, secret, filesystem root and permissions of one user.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    /// A bcrypt hash, or a plain secret.
    pub secret: String,
    pub root: PathBuf,
    pub permissions: PermissionSet,
}

impl CredentialRecord {
    pub fn new(
        username: impl Into<String>,
        secret: impl Into<String>,
        root: impl Into<PathBuf>,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            root: root.into(),
            permissions,
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("username", &self.username)
            .field("secret", &"****")
            .field("root", &self.root)
            .field("permissions", &self.permissions)
            .finish()
    }
}
