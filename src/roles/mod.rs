//! Role provisioning
//!
//! Role policy plumbing and the generator for column-level privilege SQL.

mod policy;
mod provisioner;

pub use policy::{Credential, Role, RolePolicy};
pub use provisioner::{PrivilegeProvisioner, SqlStatement};
