pub mod authorizer;
pub mod core_auth;
pub mod helper;

pub use authorizer::Authorizer;
pub use core_auth::{CredentialRecord, Permission, PermissionSet};
