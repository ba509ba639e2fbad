use crate::errors::KeyError;
use crate::ports::SecretCodec;

use base64::{URL_SAFE_NO_PAD, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

pub fn generate_vapid_credentials() -> Result<VapidCredentials, web_push::WebPushError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<VapidCredentials, web_push::WebPushError> {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)?
            .get_public_key();
    let public_key = encode_config(public_key, URL_SAFE_NO_PAD);

    Ok(VapidCredentials {
        private_key,
        public_key,
    })
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

/// On-disk record: public half cleartext, private half sealed by the codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKeyPair {
    public_key: String,
    private_key: String,
}

#[derive(Debug)]
enum KeyState {
    Unloaded,
    Ready(StoredKeyPair),
    Failed,
}

/// Process-wide VAPID keypair. Generated lazily on first use, at most once per
/// data directory; regeneration is unsupported since it would invalidate every
/// outstanding client subscription. Generation failure is sticky for the
/// process and surfaces as `KeyError::Generation` on every later call.
pub struct KeyManager {
    path: PathBuf,
    codec: Arc<dyn SecretCodec>,
    state: Mutex<KeyState>,
}

impl KeyManager {
    pub fn open(path: impl Into<PathBuf>, codec: Arc<dyn SecretCodec>) -> Self {
        Self {
            path: path.into(),
            codec,
            state: Mutex::new(KeyState::Unloaded),
        }
    }

    /// Base64url public key for client distribution; triggers the lazy
    /// generation path when no keypair exists yet.
    pub fn public_key_string(&self) -> Result<String, KeyError> {
        self.with_keys(|keys| keys.public_key.clone())
    }

    /// Base64url private key, unsealed on each retrieval; the cleartext is
    /// never cached beyond the call.
    pub fn private_key_string(&self) -> Result<String, KeyError> {
        let sealed = self.with_keys(|keys| keys.private_key.clone())?;
        Ok(self.codec.open(&sealed)?)
    }

    fn with_keys<T>(&self, read: impl FnOnce(&StoredKeyPair) -> T) -> Result<T, KeyError> {
        let mut state = self.state.lock().expect("vapid key state lock");
        match &*state {
            KeyState::Ready(keys) => Ok(read(keys)),
            KeyState::Failed => Err(KeyError::Generation(
                "a previous generation attempt failed".to_string(),
            )),
            KeyState::Unloaded => match self.load_or_generate() {
                Ok(keys) => {
                    let value = read(&keys);
                    *state = KeyState::Ready(keys);
                    Ok(value)
                }
                Err(err) => {
                    // Transient storage reads may recover; anything else won't
                    // until the environment is fixed.
                    if !matches!(err, KeyError::Storage(_)) {
                        *state = KeyState::Failed;
                    }
                    tracing::warn!(
                        error = %err,
                        "VAPID key generation failed, push delivery disabled until resolved"
                    );
                    Err(err)
                }
            },
        }
    }

    fn load_or_generate(&self) -> Result<StoredKeyPair, KeyError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let credentials = generate_vapid_credentials()
                    .map_err(|err| KeyError::Generation(err.to_string()))?;
                let keys = StoredKeyPair {
                    public_key: credentials.public_key,
                    private_key: self.codec.seal(&credentials.private_key)?,
                };
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, serde_json::to_vec_pretty(&keys)?)?;
                tracing::info!(path = %self.path.display(), "generated new VAPID keypair");
                Ok(keys)
            }
            Err(err) => Err(err.into()),
        }
    }
}
