pub mod auth;

pub use auth::{AuthenticatedUser, bearer_auth};
