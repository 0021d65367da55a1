//! Business logic layer

pub mod admin;
pub mod authorization;
pub mod authz;
pub mod identity;
pub mod resolver;

pub use admin::PolicyAdminService;
pub use authorization::AuthorizationEngine;
pub use authz::{AuthzDecision, AuthzService};
pub use identity::IdentityTokenResolver;
pub use resolver::PermissionResolutionService;
