//! Domain models shared by the gates.

pub mod identity;
pub mod role;

pub use identity::{AuthContext, Identity};
pub use role::{AccessPolicy, Role, UnknownRole};
