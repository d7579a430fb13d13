// Services module
// Business logic layer: credentials, tokens, RBAC/PDP, 2FA, audit, rate limiting.

pub mod audit;
pub mod background_tasks;
pub mod email;
pub mod jwt;
pub mod password_reset;
pub mod rate_limit;
pub mod rbac;
pub mod two_factor;
pub mod verification;

// Re-export commonly used services
pub use background_tasks::initialize_background_tasks;
pub use email::{EmailError, EmailService};
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use password_reset::{PasswordResetService, PasswordResetTokenInfo};
pub use rate_limit::{RateLimitConfig, RateLimitError, RateLimitResult, RateLimitService};
pub use rbac::RbacService;
pub use two_factor::{PendingTwoFactor, TwoFactorService, TwoFactorSetup};
pub use verification::{VerificationError, VerificationService};
