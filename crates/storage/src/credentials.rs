//! Password sources for remote-shell endpoints

use std::io::Write;

use sync_core::{Error, Result};

/// Supplies a password when a specification carries none
pub trait CredentialProvider: Send + Sync {
    fn password(&self, user: &str, host: &str) -> Result<String>;
}

/// Prompts on the controlling terminal with echo disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl CredentialProvider for TerminalPrompt {
    fn password(&self, user: &str, host: &str) -> Result<String> {
        let _ = std::io::stdout().flush();
        rpassword::prompt_password(format!("Enter Password for {}@{}: ", user, host)).map_err(
            |e| Error::Credential {
                backend: "sftp".to_string(),
                message: format!("Failed to read password: {}", e),
            },
        )
    }
}

/// Always returns the same password
#[derive(Debug, Clone, Default)]
pub struct StaticPassword(pub String);

impl CredentialProvider for StaticPassword {
    fn password(&self, _user: &str, _host: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Refuses to supply a password, for non-interactive runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl CredentialProvider for NoPrompt {
    fn password(&self, user: &str, host: &str) -> Result<String> {
        Err(Error::Credential {
            backend: "sftp".to_string(),
            message: format!("no password available for {}@{}", user, host),
        })
    }
}
