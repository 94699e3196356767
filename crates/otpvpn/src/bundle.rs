//! Credential bundle plaintext format
//!
//! Two lines: the username, then the password followed by the literal
//! [`OTP_PLACEHOLDER`]. At staging time the placeholder is swapped for the
//! one-time code and the result is exactly what `auth-user-pass` expects.

use std::fmt;

/// Token replaced by the one-time code
pub const OTP_PLACEHOLDER: &str = "%{OTP}";

/// Non-fatal problems found while staging a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialWarning {
    /// Fewer than two lines; missing fields are left blank
    IncompleteBundle { lines: usize },
    /// More than two lines; the client only reads the first two
    ExtraLines { lines: usize },
    /// Password (placeholder excluded) shorter than the configured minimum
    WeakPassword { length: usize, minimum: usize },
    /// No placeholder, so the one-time code was not injected
    NoPlaceholder,
    /// The entered code contained no digits
    EmptyOtp,
}

impl fmt::Display for CredentialWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteBundle { lines } => write!(
                f,
                "credential bundle has {} line(s), expected 2; missing fields are blank",
                lines
            ),
            Self::ExtraLines { lines } => write!(
                f,
                "credential bundle has {} lines, only the first 2 are used",
                lines
            ),
            Self::WeakPassword { length, minimum } => write!(
                f,
                "password is only {} characters (recommended minimum {})",
                length, minimum
            ),
            Self::NoPlaceholder => write!(
                f,
                "credential bundle has no {} placeholder; one-time code not injected",
                OTP_PLACEHOLDER
            ),
            Self::EmptyOtp => write!(f, "one-time code contained no digits"),
        }
    }
}

/// Render the plaintext of a new bundle
pub fn compose(username: &str, password: &str) -> String {
    format!("{}\n{}{}\n", username, password, OTP_PLACEHOLDER)
}

/// Keep only the ASCII digits of a one-time code
pub fn sanitize_otp(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Check the bundle layout, returning warnings rather than failing
pub fn inspect(content: &str, min_password_length: usize) -> Vec<CredentialWarning> {
    let lines: Vec<&str> = content.lines().collect();
    let mut warnings = vec![];

    if lines.len() < 2 {
        warnings.push(CredentialWarning::IncompleteBundle { lines: lines.len() });
    } else if lines.len() > 2 {
        warnings.push(CredentialWarning::ExtraLines { lines: lines.len() });
    }

    let password = lines.get(1).copied().unwrap_or("").replace(OTP_PLACEHOLDER, "");
    let length = password.chars().count();
    if length < min_password_length {
        warnings.push(CredentialWarning::WeakPassword {
            length,
            minimum: min_password_length,
        });
    }

    if !content.contains(OTP_PLACEHOLDER) {
        warnings.push(CredentialWarning::NoPlaceholder);
    }

    warnings
}

/// Replace every placeholder with the digits of `otp`
pub fn inject_otp(content: &str, otp: &str) -> String {
    content.replace(OTP_PLACEHOLDER, &sanitize_otp(otp))
}
