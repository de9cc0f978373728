use std::env;

use thiserror::Error;

/// Secret-store service name, shared with companion surfaces.
pub const KEYCHAIN_SERVICE: &str = "com.zeabur.zeal";
const KEYCHAIN_ACCOUNT: &str = "apikey";
/// Fallback token source when nothing is stored.
pub const TOKEN_ENV: &str = "ZEAL_API_KEY";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("secret store: {0}")]
    Store(String),
    #[error("keychain support not enabled, set ZEAL_API_KEY instead")]
    Unsupported,
}

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<(), CredentialError>;
    fn delete(&self) -> Result<(), CredentialError>;
}

/// Platform secret store with an environment-variable fallback.
pub struct Keychain;

fn env_token() -> Option<String> {
    env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty())
}

#[cfg(feature = "keychain")]
fn entry() -> Result<keyring::Entry, CredentialError> {
    keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT).map_err(|e| CredentialError::Store(e.to_string()))
}

impl TokenStore for Keychain {
    fn load(&self) -> Option<String> {
        #[cfg(feature = "keychain")]
        {
            if let Ok(token) = entry().and_then(|e| e.get_password().map_err(|e| CredentialError::Store(e.to_string()))) {
                return Some(token);
            }
        }
        env_token()
    }

    #[cfg(feature = "keychain")]
    fn save(&self, token: &str) -> Result<(), CredentialError> {
        entry()?
            .set_password(token)
            .map_err(|e| CredentialError::Store(e.to_string()))
    }

    #[cfg(not(feature = "keychain"))]
    fn save(&self, _token: &str) -> Result<(), CredentialError> {
        Err(CredentialError::Unsupported)
    }

    #[cfg(feature = "keychain")]
    fn delete(&self) -> Result<(), CredentialError> {
        match entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Store(e.to_string())),
        }
    }

    #[cfg(not(feature = "keychain"))]
    fn delete(&self) -> Result<(), CredentialError> {
        Err(CredentialError::Unsupported)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryTokens(pub Mutex<Option<String>>);

    impl MemoryTokens {
        pub fn with(token: &str) -> Self {
            Self(Mutex::new(Some(token.to_string())))
        }
    }

    impl TokenStore for MemoryTokens {
        fn load(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }

        fn save(&self, token: &str) -> Result<(), CredentialError> {
            *self.0.lock().unwrap() = Some(token.to_string());
            Ok(())
        }

        fn delete(&self) -> Result<(), CredentialError> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }
}
