// Temporary auth middleware for compatibility
// This will be replaced with proper Axum middleware

use serde::{Deserialize, Serialize};

/// Authenticated user information extracted from JWT. `roles` is
/// informational only - handlers that need an authorization decision call
/// the PDP (`services::rbac::authorize`), they never branch on this field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub token_id: String,
    pub email: String,
    pub roles: Vec<String>,
    pub exp: u64,
}
