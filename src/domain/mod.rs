//! Domain models for Authgate Core

pub mod common;
pub mod identity;
pub mod policy;
pub mod rbac;

pub use common::*;
pub use identity::*;
pub use policy::*;
pub use rbac::*;
