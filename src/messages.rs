/// Keys for every user-facing message the auth core can produce. The boundary
/// renders `text()`; `key()` is stable for clients that localize themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    RequestInvalid,
    SessionInvalid,
    CredentialsInvalid,
    UserNotFound,
    EmailInvalid,
    EmailDeliveryFailed,
    ResetTokenInvalid,
    PasswordSize,
    PasswordPattern,
    Internal,
}

impl MessageKey {
    pub fn key(&self) -> &'static str {
        match self {
            MessageKey::RequestInvalid => "request.invalid",
            MessageKey::SessionInvalid => "session.invalid",
            MessageKey::CredentialsInvalid => "credentials.invalid",
            MessageKey::UserNotFound => "user.not_found",
            MessageKey::EmailInvalid => "email.invalid",
            MessageKey::EmailDeliveryFailed => "email.delivery_failed",
            MessageKey::ResetTokenInvalid => "reset.invalid_token",
            MessageKey::PasswordSize => "password.size",
            MessageKey::PasswordPattern => "password.pattern",
            MessageKey::Internal => "internal",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            MessageKey::RequestInvalid => "The request body is malformed.",
            MessageKey::SessionInvalid => "Your session is invalid or has expired. Please log in again.",
            MessageKey::CredentialsInvalid => "Invalid email or password.",
            MessageKey::UserNotFound => "No account is registered with that email address.",
            MessageKey::EmailInvalid => "Please provide a valid email address.",
            MessageKey::EmailDeliveryFailed => {
                "The password reset email could not be sent. Please try again later."
            }
            MessageKey::ResetTokenInvalid => "This password reset link is invalid or has already been used.",
            MessageKey::PasswordSize => "Password must be at least 8 characters long.",
            MessageKey::PasswordPattern => {
                "Password must contain at least one lowercase letter, one uppercase letter and one digit."
            }
            MessageKey::Internal => "Internal server error",
        }
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
