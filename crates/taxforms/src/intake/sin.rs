//! Social Insurance Number handling at the persistence boundary.
//!
//! The plaintext [`SinNumber`] only exists on the domain side. Records handed to an
//! [`IntakeRepository`](super::repository::IntakeRepository) carry a [`SealedSin`] produced by a
//! [`SinCodec`], so a store never sees the number itself.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Applicant SIN as typed. Format is checked by the validators, not on construction.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SinNumber(String);

impl SinNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty SIN field means the applicant left it out.
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SinNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SinNumber").field(&"<redacted>").finish()
    }
}

/// Ciphertext form of a SIN: base64 of `nonce || ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedSin(pub String);

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encryption key must be base64 encoded: {0}")]
    KeyEncoding(String),
    #[error("encryption key must be {expected} bytes, found {found}")]
    KeyLength { expected: usize, found: usize },
    #[error("failed to seal value: {0}")]
    Seal(String),
    #[error("failed to open sealed value: {0}")]
    Open(String),
}

/// Encrypting/decrypting codec applied to the SIN column.
pub trait SinCodec: Send + Sync {
    fn seal(&self, sin: &SinNumber) -> Result<SealedSin, CodecError>;
    fn open(&self, sealed: &SealedSin) -> Result<SinNumber, CodecError>;
}

/// AES-256-GCM with a random nonce per value.
#[derive(Clone)]
pub struct AesGcmSinCodec {
    key: [u8; KEY_LEN],
}

impl AesGcmSinCodec {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn from_base64_key(encoded: &str) -> Result<Self, CodecError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|err| CodecError::KeyEncoding(err.to_string()))?;
        let key: [u8; KEY_LEN] =
            raw.as_slice()
                .try_into()
                .map_err(|_| CodecError::KeyLength {
                    expected: KEY_LEN,
                    found: raw.len(),
                })?;
        Ok(Self::new(key))
    }

    /// Codec with a throwaway key; sealed values do not survive a restart.
    pub fn ephemeral() -> Self {
        Self::new(generate_key())
    }

    fn cipher(&self) -> Result<Aes256Gcm, String> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|err| err.to_string())
    }
}

impl fmt::Debug for AesGcmSinCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmSinCodec").finish_non_exhaustive()
    }
}

impl SinCodec for AesGcmSinCodec {
    fn seal(&self, sin: &SinNumber) -> Result<SealedSin, CodecError> {
        let cipher = self.cipher().map_err(CodecError::Seal)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, sin.as_str().as_bytes())
            .map_err(|err| CodecError::Seal(err.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(SealedSin(STANDARD.encode(&combined)))
    }

    fn open(&self, sealed: &SealedSin) -> Result<SinNumber, CodecError> {
        let combined = STANDARD
            .decode(&sealed.0)
            .map_err(|err| CodecError::Open(err.to_string()))?;

        if combined.len() <= NONCE_LEN {
            return Err(CodecError::Open("ciphertext too short".to_string()));
        }

        let (nonce_bytes, encrypted) = combined.split_at(NONCE_LEN);
        let cipher = self.cipher().map_err(CodecError::Open)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|err| CodecError::Open(err.to_string()))?;

        String::from_utf8(plaintext)
            .map(SinNumber)
            .map_err(|err| CodecError::Open(err.to_string()))
    }
}

pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Fresh key in the format `FIELD_ENCRYPTION_KEY` expects.
pub fn generate_key_base64() -> String {
    STANDARD.encode(generate_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_value_hides_plaintext_and_opens() {
        let codec = AesGcmSinCodec::ephemeral();
        let sin = SinNumber::new("123456789");

        let sealed = codec.seal(&sin).expect("seals");
        assert!(!sealed.0.contains("123456789"));

        let opened = codec.open(&sealed).expect("opens");
        assert_eq!(opened, sin);
    }

    #[test]
    fn sealing_twice_uses_fresh_nonces() {
        let codec = AesGcmSinCodec::ephemeral();
        let sin = SinNumber::new("123456789");
        let first = codec.seal(&sin).expect("seals");
        let second = codec.seal(&sin).expect("seals");
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_key_cannot_open() {
        let sealed = AesGcmSinCodec::ephemeral()
            .seal(&SinNumber::new("046454286"))
            .expect("seals");
        let other = AesGcmSinCodec::ephemeral();
        assert!(matches!(other.open(&sealed), Err(CodecError::Open(_))));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let codec = AesGcmSinCodec::ephemeral();
        let sealed = codec.seal(&SinNumber::new("046454286")).expect("seals");
        let mut bytes = STANDARD.decode(&sealed.0).expect("base64");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        let tampered = SealedSin(STANDARD.encode(&bytes));
        assert!(codec.open(&tampered).is_err());
        assert!(codec.open(&SealedSin("!!!".to_string())).is_err());
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(AesGcmSinCodec::from_base64_key(&generate_key_base64()).is_ok());
        match AesGcmSinCodec::from_base64_key(&STANDARD.encode([7u8; 16])) {
            Err(CodecError::KeyLength { expected, found }) => {
                assert_eq!((expected, found), (32, 16));
            }
            other => panic!("expected key length error, got {other:?}"),
        }
        assert!(matches!(
            AesGcmSinCodec::from_base64_key("not base64!"),
            Err(CodecError::KeyEncoding(_))
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let sin = SinNumber::new("123456789");
        assert!(!format!("{sin:?}").contains("123"));
    }
}
