use anyhow::{Context, Result};
use chacha20poly1305::{
    ChaCha20Poly1305, KeyInit, Nonce,
    aead::{Aead, OsRng, rand_core::RngCore},
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use zeroize::Zeroizing;

const KEY_FILE: &str = ".secret_key";
const ENC_PREFIX: &str = "ENC:";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encrypts config secrets and stored OAuth tokens with a workspace-local key.
///
/// The key is read (or generated) lazily on first use and then held for the
/// lifetime of the store, so a credential save does not hit the filesystem
/// twice.
#[derive(Clone)]
pub struct SecretStore {
    root: PathBuf,
    encrypt: bool,
    key: Arc<OnceLock<Zeroizing<Vec<u8>>>>,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("root", &self.root)
            .field("encrypt", &self.encrypt)
            .finish_non_exhaustive()
    }
}

impl SecretStore {
    pub fn new(root: &Path, encrypt: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            encrypt,
            key: Arc::new(OnceLock::new()),
        }
    }

    /// Returns `true` if the value has already been encrypted.
    #[must_use]
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENC_PREFIX)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if !self.encrypt || plaintext.is_empty() || Self::is_encrypted(plaintext) {
            return Ok(plaintext.to_string());
        }

        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(format!("{ENC_PREFIX}{}", hex::encode(combined)))
    }

    pub fn decrypt(&self, value: &str) -> Result<String> {
        let Some(hex_str) = value.strip_prefix(ENC_PREFIX) else {
            return Ok(value.to_string());
        };

        let combined = hex::decode(hex_str).context("invalid hex in encrypted value")?;
        if combined.len() < NONCE_LEN {
            anyhow::bail!("encrypted value too short");
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher()?
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("decryption failed: {e}"))?;

        String::from_utf8(plaintext).context("decrypted value is not valid UTF-8")
    }

    pub fn encrypt_option(&self, value: Option<&str>) -> Result<Option<String>> {
        value.map(|raw| self.encrypt(raw)).transpose()
    }

    pub fn decrypt_option(&self, value: Option<&str>) -> Result<Option<String>> {
        value.map(|raw| self.decrypt(raw)).transpose()
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        let key = match self.key.get() {
            Some(key) => key,
            None => {
                let loaded = Zeroizing::new(self.load_or_create_key()?);
                // A concurrent initializer may have won; both read the same file.
                let _ = self.key.set(loaded);
                self.key
                    .get()
                    .context("secret key was not initialized")?
            }
        };
        ChaCha20Poly1305::new_from_slice(key).context("invalid key length")
    }

    fn key_path(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    fn read_key_file(path: &Path) -> Result<Vec<u8>> {
        let hex_key = fs::read_to_string(path).context("failed to read key file")?;
        let key = hex::decode(hex_key.trim()).context("invalid hex in key file")?;
        if key.len() != KEY_LEN {
            anyhow::bail!("key file has invalid length (expected {KEY_LEN} bytes)");
        }
        Ok(key)
    }

    fn write_new_key_file(path: &Path, key: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create key directory")?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)
                .context("failed to create key file")?;
            file.write_all(hex::encode(key).as_bytes())
                .context("failed to write key file")?;
            file.sync_all().context("failed to sync key file")?;
        }

        #[cfg(not(unix))]
        {
            let mut file = fs::File::create_new(path).context("failed to create key file")?;
            file.write_all(hex::encode(key).as_bytes())
                .context("failed to write key file")?;
        }

        Ok(())
    }

    fn load_or_create_key(&self) -> Result<Vec<u8>> {
        let path = self.key_path();
        if path.exists() {
            return Self::read_key_file(&path);
        }

        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        match Self::write_new_key_file(&path, &key) {
            Ok(()) => Ok(key),
            Err(error) => {
                let is_already_exists = error
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == std::io::ErrorKind::AlreadyExists);
                if is_already_exists {
                    Self::read_key_file(&path)
                } else {
                    Err(error)
                }
            }
        }
    }
}
