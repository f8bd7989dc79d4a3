//! Credential types for authentication.

use std::borrow::Cow;

/// User name and optional password for password-based authentication.
#[derive(Clone)]
pub struct Credentials {
    user: Cow<'static, str>,
    password: Option<Cow<'static, str>>,
}

impl Credentials {
    /// Credentials with a password.
    pub fn new(user: impl Into<Cow<'static, str>>, password: impl Into<Cow<'static, str>>) -> Self {
        Self {
            user: user.into(),
            password: Some(password.into()),
        }
    }

    /// Credentials for trust or peer authentication.
    pub fn without_password(user: impl Into<Cow<'static, str>>) -> Self {
        Self {
            user: user.into(),
            password: None,
        }
    }

    /// The user name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The password, if one was supplied.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the password in debug output
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
