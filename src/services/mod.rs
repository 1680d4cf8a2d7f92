pub mod cleanup;
pub mod password_reset;
pub mod tokens;

pub use cleanup::CleanupScheduler;
pub use password_reset::PasswordResetService;
pub use tokens::TokenService;
