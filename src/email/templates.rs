use super::Template;

pub struct Rendered {
    pub subject: String,
    pub html: String,
}

pub fn render(to_email: &str, template: &Template) -> Rendered {
    match template {
        Template::PasswordReset { token, reset_url } => Rendered {
            subject: "Password Reset - Keyward".to_string(),
            html: render_password_reset(to_email, token, reset_url),
        },
    }
}

pub fn render_password_reset(to_email: &str, token: &str, reset_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Password Reset</h2>
    <p>A password reset was requested for the Keyward account {to_email}.</p>
    <p><a href="{reset_url}" style="display: inline-block; padding: 10px 20px; background: #0070f3; color: white; text-decoration: none; border-radius: 4px;">Reset Password</a></p>
    <p>If the button does not work, use this reset code: <code>{token}</code></p>
    <p style="color: #666; font-size: 14px;">The code works once. Requesting another reset replaces it. If you didn't request this, you can ignore it.</p>
</body>
</html>"#
    )
}
