//! End-to-end vault tests over the file-backed store

use std::sync::Arc;
use keyvox_core::{
    CredentialVault, Error, FileStore, KeyValueStore, MemoryStore, Provider, VaultOptions,
};
use tempfile::TempDir;

use test_support::TEST_KDF_ITERATIONS;

fn options() -> VaultOptions {
    VaultOptions {
        kdf_iterations: TEST_KDF_ITERATIONS,
    }
}

#[tokio::test]
async fn test_store_and_read_back_then_reject_wrong_password() {
    let store = Arc::new(MemoryStore::new());

    let vault = CredentialVault::with_options(store.clone(), options());
    let session = vault.initialize("correct-password1").await.unwrap();
    vault
        .set_secret(&session, Provider::ElevenLabs.id(), "sk-abc123")
        .await
        .unwrap();
    assert_eq!(
        vault
            .get_secret(&session, "elevenlabs")
            .await
            .unwrap()
            .as_deref(),
        Some("sk-abc123")
    );

    // The stored value is ciphertext, never the secret itself
    let stored = store.get("apikey_elevenlabs").unwrap().unwrap();
    assert!(!stored.contains("sk-abc123"));

    let fresh = CredentialVault::with_options(store, options());
    let error = fresh.initialize("wrong-password").await.unwrap_err();
    assert!(matches!(error, Error::Authentication));
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keyvox").join("vault.json");

    {
        let vault = CredentialVault::with_options(FileStore::open(&path).unwrap(), options());
        let session = vault.initialize("correct-password1").await.unwrap();
        vault.set_secret(&session, "openai", "sk-live-1").await.unwrap();
        vault
            .set_secret(&session, "polly", "AKIDEXAMPLE:wJalrXUtnFEMI")
            .await
            .unwrap();
    }

    let vault = CredentialVault::with_options(FileStore::open(&path).unwrap(), options());
    assert!(vault.is_initialized().unwrap());
    assert_eq!(vault.list_secrets().unwrap(), vec!["openai", "polly"]);

    let session = vault.initialize("correct-password1").await.unwrap();
    assert_eq!(
        vault.get_secret(&session, "polly").await.unwrap().as_deref(),
        Some("AKIDEXAMPLE:wJalrXUtnFEMI")
    );

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("encryption_salt"));
    assert!(raw.contains("password_hash"));
    assert!(!raw.contains("sk-live-1"));
    assert!(!raw.contains("correct-password1"));
}

#[tokio::test]
async fn test_password_change_persists_to_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.json");

    {
        let vault = CredentialVault::with_options(FileStore::open(&path).unwrap(), options());
        let session = vault.initialize("first-password").await.unwrap();
        vault.set_secret(&session, "openai", "sk-1").await.unwrap();
        vault
            .change_password("first-password", "second-password")
            .await
            .unwrap();
    }

    let vault = CredentialVault::with_options(FileStore::open(&path).unwrap(), options());
    assert!(matches!(
        vault.initialize("first-password").await,
        Err(Error::Authentication)
    ));
    let session = vault.initialize("second-password").await.unwrap();
    assert_eq!(
        vault.get_secret(&session, "openai").await.unwrap().as_deref(),
        Some("sk-1")
    );
}

#[tokio::test]
async fn test_tampered_file_yields_decryption_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.json");

    {
        let vault = CredentialVault::with_options(FileStore::open(&path).unwrap(), options());
        let session = vault.initialize("pw-123456").await.unwrap();
        vault.set_secret(&session, "openai", "sk-1").await.unwrap();
    }

    let store = FileStore::open(&path).unwrap();
    let sealed = store.get("apikey_openai").unwrap().unwrap();
    let mut chars: Vec<char> = sealed.chars().collect();
    chars[20] = if chars[20] == 'A' { 'B' } else { 'A' };
    store
        .set("apikey_openai", &chars.into_iter().collect::<String>())
        .unwrap();

    let vault = CredentialVault::with_options(store, options());
    let session = vault.initialize("pw-123456").await.unwrap();
    let error = vault.get_secret(&session, "openai").await.unwrap_err();
    assert!(matches!(error, Error::Decryption { .. }));
    assert!(error.is_credential_problem());
}
