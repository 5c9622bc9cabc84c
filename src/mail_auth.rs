use keyring::Entry;
use std::error::Error;
use std::fmt;

const KEYRING_SERVICE: &str = "notion-reminder-smtp";

#[derive(Debug)]
pub enum AuthError {
    KeyringError(String),
    PasswordNotFound(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::KeyringError(msg) => write!(f, "Keyring error: {}", msg),
            AuthError::PasswordNotFound(user) => write!(
                f,
                "SMTP password for {} not found. Set `password` in reminder_config.toml or run 'notion-reminder --store-smtp-password'.",
                user
            ),
        }
    }
}

impl Error for AuthError {}

/// SMTP password kept in the OS keyring, one entry per SMTP username.
pub struct MailAuth;

impl MailAuth {
    pub fn store_password(username: &str, password: &str) -> Result<(), AuthError> {
        let entry = Entry::new(KEYRING_SERVICE, username)
            .map_err(|e| AuthError::KeyringError(e.to_string()))?;

        entry
            .set_password(password)
            .map_err(|e| AuthError::KeyringError(e.to_string()))?;

        Ok(())
    }

    pub fn get_password(username: &str) -> Result<String, AuthError> {
        let entry = Entry::new(KEYRING_SERVICE, username)
            .map_err(|e| AuthError::KeyringError(e.to_string()))?;

        entry
            .get_password()
            .map_err(|_| AuthError::PasswordNotFound(username.to_string()))
    }

    pub fn delete_password(username: &str) -> Result<(), AuthError> {
        let entry = Entry::new(KEYRING_SERVICE, username)
            .map_err(|e| AuthError::KeyringError(e.to_string()))?;

        entry
            .delete_password()
            .map_err(|e| AuthError::KeyringError(e.to_string()))?;

        Ok(())
    }

    /// The configured password, or the keyring entry when it is blank.
    pub fn resolve_password(username: &str, configured: &str) -> Result<String, AuthError> {
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        Self::get_password(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_password_wins() {
        let password = MailAuth::resolve_password("bot@example.com", "app-password").unwrap();
        assert_eq!(password, "app-password");
    }

    #[test]
    #[ignore = "needs a platform keyring"]
    fn test_password_operations() {
        let user = "notion-reminder-test@example.com";

        let _ = MailAuth::delete_password(user);

        assert!(MailAuth::store_password(user, "hunter2").is_ok());
        assert_eq!(MailAuth::resolve_password(user, "").unwrap(), "hunter2");

        assert!(MailAuth::delete_password(user).is_ok());
        assert!(MailAuth::get_password(user).is_err());
    }
}
