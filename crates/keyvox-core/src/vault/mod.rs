//! Password-protected credential vault
//!
//! The vault turns a user-supplied master password into an AES-256-GCM key and
//! uses it to protect vendor API keys in an untrusted [`KeyValueStore`].
//!
//! Persisted layout:
//! - `encryption_salt`: base64 of the 16-byte installation salt
//! - `password_hash`: base64 of `SHA-256(password || salt)`
//! - `kdf_iterations`: PBKDF2 iteration count the current salt was used with
//! - `apikey_<provider>`: base64 of `IV || ciphertext || tag`
//!
//! A vault without `kdf_iterations` was written with
//! [`DEFAULT_KDF_ITERATIONS`]. [`VaultOptions::kdf_iterations`] only applies
//! when a salt is generated, on first initialization or on a password change.
//!
//! The master password itself is never persisted. It lives in a
//! [`VaultSession`] for as long as the caller keeps one, and the encryption key
//! is re-derived from it on every operation.

pub mod crypto;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::store::KeyValueStore;
use crate::{Error, Result};

pub use crypto::{VaultKey, DEFAULT_KDF_ITERATIONS, SALT_SIZE};

/// Store key holding the installation salt
pub const SALT_KEY: &str = "encryption_salt";

/// Store key holding the password verifier
pub const VERIFIER_KEY: &str = "password_hash";

/// Store key holding the PBKDF2 iteration count
pub const ITERATIONS_KEY: &str = "kdf_iterations";

/// Prefix of store keys holding encrypted secrets
pub const SECRET_PREFIX: &str = "apikey_";

/// Vault tuning options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultOptions {
    /// PBKDF2 iteration count for newly generated salts
    pub kdf_iterations: u32,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

impl VaultOptions {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.kdf_iterations == 0 {
            return Err("kdf_iterations cannot be zero".to_string());
        }
        Ok(())
    }
}

/// An unlocked vault session.
///
/// Holds the master password in memory; it is wiped when the session drops.
pub struct VaultSession {
    password: Zeroizing<String>,
}

impl VaultSession {
    fn new(password: &str) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
        }
    }

    /// End the session, wiping the password
    pub fn end(self) {
        drop(self);
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Store key for a provider's secret
pub fn secret_key(provider: &str) -> String {
    format!("{}{}", SECRET_PREFIX, provider)
}

fn validate_provider_id(provider: &str) -> Result<()> {
    if provider.is_empty() || provider.chars().any(char::is_whitespace) {
        return Err(Error::configuration(format!(
            "Invalid provider id '{}'",
            provider
        )));
    }
    Ok(())
}

fn decode_stored(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD.decode(value.trim()).map_err(|e| Error::Storage {
        message: format!("Stored {} is not valid base64", name),
        source: Some(e.into()),
    })
}

/// Credential vault over a key/value store
#[derive(Debug)]
pub struct CredentialVault<S> {
    store: S,
    options: VaultOptions,
}

impl<S: KeyValueStore> CredentialVault<S> {
    /// Create a vault with default options
    pub fn new(store: S) -> Self {
        Self::with_options(store, VaultOptions::default())
    }

    pub fn with_options(store: S, options: VaultOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &VaultOptions {
        &self.options
    }

    /// Whether a salt and verifier have been persisted
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.store.get(SALT_KEY)?.is_some() && self.store.get(VERIFIER_KEY)?.is_some())
    }

    fn load_salt(&self) -> Result<Vec<u8>> {
        let encoded = self.store.get(SALT_KEY)?.ok_or_else(|| {
            Error::uninitialized("no encryption salt has been stored")
        })?;
        decode_stored("encryption salt", &encoded)
    }

    /// Iteration count the stored salt was derived with
    fn load_iterations(&self) -> Result<u32> {
        match self.store.get(ITERATIONS_KEY)? {
            None => Ok(DEFAULT_KDF_ITERATIONS),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(iterations) if iterations > 0 => Ok(iterations),
                _ => Err(Error::storage(format!(
                    "Stored KDF iteration count '{}' is invalid",
                    raw
                ))),
            },
        }
    }

    async fn derive_key(
        &self,
        password: &Zeroizing<String>,
        salt: &[u8],
        iterations: u32,
    ) -> Result<VaultKey> {
        let password = password.clone();
        let salt = salt.to_vec();

        tokio::task::spawn_blocking(move || {
            crypto::derive_key(password.as_bytes(), &salt, iterations)
        })
        .await
        .map_err(|e| Error::Internal {
            message: "Key derivation task failed".to_string(),
            source: e.into(),
        })
    }

    async fn session_key(&self, session: &VaultSession) -> Result<VaultKey> {
        let salt = self.load_salt()?;
        let iterations = self.load_iterations()?;
        self.derive_key(&session.password, &salt, iterations).await
    }

    /// Unlock the vault.
    ///
    /// On first run this creates the salt and verifier and accepts `password`.
    /// Afterwards `password` must match the stored verifier, otherwise
    /// [`Error::Authentication`] is returned.
    pub async fn initialize(&self, password: &str) -> Result<VaultSession> {
        if password.is_empty() {
            return Err(Error::configuration("Master password cannot be empty"));
        }

        let salt = self.store.get(SALT_KEY)?;
        let verifier = self.store.get(VERIFIER_KEY)?;

        match (salt, verifier) {
            (None, _) => {
                let salt = crypto::generate_salt();
                let verifier = crypto::compute_verifier(password.as_bytes(), &salt);
                self.store.set_many(&[
                    (SALT_KEY.to_string(), Some(STANDARD.encode(salt))),
                    (VERIFIER_KEY.to_string(), Some(STANDARD.encode(verifier))),
                    (
                        ITERATIONS_KEY.to_string(),
                        Some(self.options.kdf_iterations.to_string()),
                    ),
                ])?;
                info!(iterations = self.options.kdf_iterations, "Initialized new credential vault");
                Ok(VaultSession::new(password))
            }
            (Some(_), None) => Err(Error::storage(
                "Vault salt is present but the password verifier is missing",
            )),
            (Some(_), Some(_)) => {
                if !self.validate_password(password)? {
                    warn!("Vault unlock rejected: password mismatch");
                    return Err(Error::Authentication);
                }
                let iterations = self.load_iterations()?;
                if iterations != self.options.kdf_iterations {
                    debug!(
                        stored = iterations,
                        configured = self.options.kdf_iterations,
                        "Using the stored KDF iteration count"
                    );
                }
                info!("Vault unlocked");
                Ok(VaultSession::new(password))
            }
        }
    }

    /// Check `password` against the stored verifier without touching any session.
    ///
    /// Returns `false` for an uninitialized vault and for the empty string.
    pub fn validate_password(&self, password: &str) -> Result<bool> {
        if password.is_empty() {
            return Ok(false);
        }

        let (Some(salt), Some(verifier)) =
            (self.store.get(SALT_KEY)?, self.store.get(VERIFIER_KEY)?)
        else {
            return Ok(false);
        };

        let salt = decode_stored("encryption salt", &salt)?;
        let expected = decode_stored("password verifier", &verifier)?;
        let actual = crypto::compute_verifier(password.as_bytes(), &salt);
        Ok(crypto::constant_time_eq(&actual, &expected))
    }

    /// Encrypt `plaintext` under the session key
    pub async fn encrypt(&self, session: &VaultSession, plaintext: &str) -> Result<String> {
        let key = self.session_key(session).await?;
        crypto::seal(&key, plaintext.as_bytes())
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt)
    pub async fn decrypt(&self, session: &VaultSession, ciphertext: &str) -> Result<String> {
        let key = self.session_key(session).await?;
        let plaintext = crypto::open(&key, ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| Error::decryption("plaintext is not valid UTF-8"))
    }

    /// Replace the master password.
    ///
    /// Every stored secret is re-encrypted under the new key and written in
    /// the same batch as the new salt and verifier. If any secret cannot be
    /// decrypted with the old password nothing is written.
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<VaultSession> {
        if !self.validate_password(old_password)? {
            return Err(Error::Authentication);
        }
        if new_password.is_empty() {
            return Err(Error::configuration("Master password cannot be empty"));
        }

        let old_salt = self.load_salt()?;
        let old_iterations = self.load_iterations()?;
        let old_key = self
            .derive_key(&Zeroizing::new(old_password.to_string()), &old_salt, old_iterations)
            .await?;

        let mut secrets = Vec::new();
        for provider in self.list_secrets()? {
            let key = secret_key(&provider);
            let Some(encoded) = self.store.get(&key)? else {
                continue;
            };
            let plaintext = Zeroizing::new(crypto::open(&old_key, &encoded).map_err(|_| {
                Error::decryption(format!(
                    "secret for '{}' cannot be read; password left unchanged",
                    provider
                ))
            })?);
            secrets.push((key, plaintext));
        }

        let new_salt = crypto::generate_salt();
        let new_iterations = self.options.kdf_iterations;
        let new_key = self
            .derive_key(&Zeroizing::new(new_password.to_string()), &new_salt, new_iterations)
            .await?;
        let verifier = crypto::compute_verifier(new_password.as_bytes(), &new_salt);

        let mut batch = vec![
            (SALT_KEY.to_string(), Some(STANDARD.encode(new_salt))),
            (VERIFIER_KEY.to_string(), Some(STANDARD.encode(verifier))),
            (ITERATIONS_KEY.to_string(), Some(new_iterations.to_string())),
        ];
        for (key, plaintext) in &secrets {
            batch.push((key.clone(), Some(crypto::seal(&new_key, plaintext)?)));
        }

        self.store.set_many(&batch)?;
        info!(secrets = secrets.len(), "Master password changed");
        Ok(VaultSession::new(new_password))
    }

    /// Encrypt and persist the secret for `provider`, replacing any previous one
    pub async fn set_secret(&self, session: &VaultSession, provider: &str, secret: &str) -> Result<()> {
        validate_provider_id(provider)?;
        if secret.is_empty() {
            return Err(Error::configuration("Secret cannot be empty"));
        }

        let encrypted = self.encrypt(session, secret).await?;
        self.store.set(&secret_key(provider), &encrypted)?;
        debug!(provider, "Stored secret");
        Ok(())
    }

    /// Read and decrypt the secret for `provider`.
    ///
    /// `Ok(None)` means nothing is stored; an unreadable value is
    /// [`Error::Decryption`].
    pub async fn get_secret(&self, session: &VaultSession, provider: &str) -> Result<Option<String>> {
        validate_provider_id(provider)?;
        match self.store.get(&secret_key(provider))? {
            Some(encoded) => self.decrypt(session, &encoded).await.map(Some),
            None => Ok(None),
        }
    }

    /// Delete the secret for `provider`; deleting a missing secret is not an error
    pub fn remove_secret(&self, provider: &str) -> Result<()> {
        validate_provider_id(provider)?;
        self.store.remove(&secret_key(provider))?;
        debug!(provider, "Removed secret");
        Ok(())
    }

    /// Provider ids that have a stored secret, sorted
    pub fn list_secrets(&self) -> Result<Vec<String>> {
        let mut providers: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(SECRET_PREFIX).map(str::to_string))
            .collect();
        providers.sort();
        Ok(providers)
    }

    pub fn has_secret(&self, provider: &str) -> Result<bool> {
        Ok(self.store.get(&secret_key(provider))?.is_some())
    }

    /// Remove the salt, the verifier and every stored secret.
    ///
    /// Secrets encrypted under the old password are unrecoverable afterwards.
    pub fn reset(&self) -> Result<()> {
        let mut batch = vec![
            (SALT_KEY.to_string(), None),
            (VERIFIER_KEY.to_string(), None),
            (ITERATIONS_KEY.to_string(), None),
        ];
        batch.extend(
            self.list_secrets()?
                .iter()
                .map(|provider| (secret_key(provider), None)),
        );
        self.store.set_many(&batch)?;
        warn!("Credential vault reset");
        Ok(())
    }
}
