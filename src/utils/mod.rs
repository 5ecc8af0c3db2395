pub mod auth;
pub mod timezone;

pub use auth::{AuthError, AuthService};
pub use timezone::local_now;
