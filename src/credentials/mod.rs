use std::path::PathBuf;

use keyring::Entry;

use crate::client::Session;
use crate::config::ConfigPaths;

const KEYRING_SERVICE: &str = "mmoney-cli";
const KEYRING_USER: &str = "monarch-token";

/// Environment switch that treats the secure store as unavailable, for
/// tests and headless machines without a keychain service.
pub const DISABLE_KEYRING_ENV: &str = "MMONEY_CLI_DISABLE_KEYRING";

/// A resolved bearer token together with the backend that supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub source: CredentialSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Keyring,
    SessionFile,
}

/// Where `persist` ended up writing a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredIn {
    Keyring,
    SessionFile,
    Nowhere,
}

/// Ordered credential storage: the OS keychain first, with the session
/// artifact in the config directory as fallback.
///
/// Every backend operation is best-effort. Backend failures degrade to
/// "absent"/"false" and never propagate, so credential storage can never
/// take a command down with it.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    paths: ConfigPaths,
}

impl CredentialStore {
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    /// Resolve a credential, preferring the keychain. The session file is
    /// only consulted when the keychain is unavailable or empty.
    pub fn resolve(&self) -> Option<Credential> {
        if let Some(token) = self.keyring_token() {
            return Some(Credential {
                token,
                source: CredentialSource::Keyring,
            });
        }
        self.session_token().map(|token| Credential {
            token,
            source: CredentialSource::SessionFile,
        })
    }

    /// Read the keychain slot; any backend error reads as absent.
    pub fn keyring_token(&self) -> Option<String> {
        let entry = keyring_entry()?;
        match entry.get_password() {
            Ok(token) if !token.trim().is_empty() => Some(token),
            Ok(_) => None,
            Err(keyring::Error::NoEntry) => None,
            Err(err) => {
                tracing::debug!("keychain read failed: {err}");
                None
            }
        }
    }

    /// Read the session artifact; missing or corrupt files read as absent.
    pub fn session_token(&self) -> Option<String> {
        Session::load(&self.paths.session_file())
            .ok()
            .map(|session| session.token)
            .filter(|token| !token.trim().is_empty())
    }

    /// Whether the session artifact exists, without deserialising it.
    pub fn session_file_present(&self) -> bool {
        self.paths.session_file().exists()
    }

    /// Location of the session artifact.
    pub fn session_file(&self) -> PathBuf {
        self.paths.session_file()
    }

    /// Store a token, preferring the keychain and falling back to the
    /// session file. Reports where the token landed; never fails.
    pub fn persist(&self, token: &str) -> StoredIn {
        if let Some(entry) = keyring_entry() {
            match entry.set_password(token) {
                Ok(()) => return StoredIn::Keyring,
                Err(err) => tracing::debug!("keychain write failed: {err}"),
            }
        }
        if self.paths.ensure_exists().is_err() {
            return StoredIn::Nowhere;
        }
        let session = Session {
            token: token.to_string(),
        };
        match session.save(&self.paths.session_file()) {
            Ok(()) => StoredIn::SessionFile,
            Err(err) => {
                tracing::debug!("session file write failed: {err}");
                StoredIn::Nowhere
            }
        }
    }

    /// Remove the credential from both backends unconditionally. Returns
    /// true if at least one backend actually held something.
    pub fn clear(&self) -> bool {
        let keyring_deleted = match keyring_entry() {
            Some(entry) => match entry.delete_password() {
                Ok(()) => true,
                Err(keyring::Error::NoEntry) => false,
                Err(err) => {
                    tracing::debug!("keychain delete failed: {err}");
                    false
                }
            },
            None => false,
        };
        let file_deleted = match std::fs::remove_file(self.paths.session_file()) {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                tracing::debug!("session file delete failed: {err}");
                false
            }
        };
        keyring_deleted || file_deleted
    }
}

fn keyring_entry() -> Option<Entry> {
    if std::env::var_os(DISABLE_KEYRING_ENV).is_some() {
        return None;
    }
    Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()
}
