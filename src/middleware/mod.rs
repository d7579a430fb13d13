// Middleware modules for the authorization core

pub mod auth;
pub mod auth_middleware;
pub mod cors;
pub mod trace;

pub use auth::AuthenticatedUser;
pub use auth_middleware::auth_middleware;
pub use cors::dynamic_cors_middleware;
pub use trace::{trace_middleware, TraceId};
