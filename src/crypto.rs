/*!
Crypto things
*/
use ring::aead::BoundKey;

use crate::{Error, Result};

/// ring requires an implementor of `NonceSequence`,
/// which if a wrapping trait around `ring::aead::Nonce`.
/// We have to make a wrapper that can pass ownership
/// of the nonce exactly once.
struct OneNonceSequence {
    inner: Option<ring::aead::Nonce>,
}
impl OneNonceSequence {
    fn new(inner: ring::aead::Nonce) -> Self {
        Self { inner: Some(inner) }
    }
}

impl ring::aead::NonceSequence for OneNonceSequence {
    fn advance(&mut self) -> std::result::Result<ring::aead::Nonce, ring::error::Unspecified> {
        self.inner.take().ok_or(ring::error::Unspecified)
    }
}

/// An encrypted value and the nonce it was sealed with, both hex encoded.
#[derive(Debug, Clone)]
pub struct Enc {
    pub value: String,
    pub nonce: String,
}

/// Return a `Vec` of secure random bytes of size `n`
pub fn rand_bytes(n: usize) -> Result<Vec<u8>> {
    use ring::rand::SecureRandom;
    let mut buf = vec![0; n];
    let sysrand = ring::rand::SystemRandom::new();
    sysrand
        .fill(&mut buf)
        .map_err(|_| Error::Internal("error getting random bytes".into()))?;
    Ok(buf)
}

pub fn new_nonce() -> Result<Vec<u8>> {
    rand_bytes(12)
}

pub fn hmac_sign(s: &str, key: &str) -> String {
    // using a 32 byte key
    let s_key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key.as_bytes());
    let tag = ring::hmac::sign(&s_key, s.as_bytes());
    hex::encode(&tag)
}

/// Encrypt `bytes` with the given `nonce` and `pass`
///
/// `bytes` are encrypted using AES_256_GCM, `nonce` is expected to be
/// 12-bytes, and `pass` 32-bytes
fn encrypt_bytes(bytes: &[u8], nonce: &[u8], pass: &[u8]) -> Result<Vec<u8>> {
    let alg = &ring::aead::AES_256_GCM;
    let nonce = ring::aead::Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| Error::Internal("encryption nonce not unique".into()))?;
    let nonce = OneNonceSequence::new(nonce);
    let key = ring::aead::UnboundKey::new(alg, pass)
        .map_err(|_| Error::Internal("error building sealing key".into()))?;
    let mut key = ring::aead::SealingKey::new(key, nonce);
    let mut in_out = bytes.to_vec();
    key.seal_in_place_append_tag(ring::aead::Aad::empty(), &mut in_out)
        .map_err(|_| Error::Internal("failed encrypting bytes".into()))?;
    Ok(in_out)
}

/// Decrypt `bytes` with the given `nonce` and `pass`
fn decrypt_bytes<'a>(bytes: &'a mut [u8], nonce: &[u8], pass: &[u8]) -> Result<&'a [u8]> {
    let alg = &ring::aead::AES_256_GCM;
    let nonce = ring::aead::Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| Error::Internal("decryption nonce not unique".into()))?;
    let nonce = OneNonceSequence::new(nonce);
    let key = ring::aead::UnboundKey::new(alg, pass)
        .map_err(|_| Error::Internal("error building opening key".into()))?;
    let mut key = ring::aead::OpeningKey::new(key, nonce);
    let out_slice = key
        .open_in_place(ring::aead::Aad::empty(), bytes)
        .map_err(|_| Error::Internal("failed decrypting bytes".into()))?;
    Ok(out_slice)
}

/// Encrypt a string with a fresh nonce, returning both hex encoded.
pub fn encrypt(s: &str, key: &str) -> Result<Enc> {
    let nonce = new_nonce()?;
    let b = encrypt_bytes(s.as_bytes(), &nonce, key.as_bytes())?;
    Ok(Enc {
        value: hex::encode(&b),
        nonce: hex::encode(&nonce),
    })
}

pub fn decrypt(enc: &Enc, key: &str) -> Result<String> {
    let nonce =
        hex::decode(&enc.nonce).map_err(|e| Error::Internal(format!("nonce hex decode error {}", e)))?;
    let mut value =
        hex::decode(&enc.value).map_err(|e| Error::Internal(format!("value hex decode error {}", e)))?;
    let bytes = decrypt_bytes(value.as_mut_slice(), &nonce, key.as_bytes())?;
    String::from_utf8(bytes.to_owned()).map_err(|e| Error::Internal(format!("utf8 error {}", e)))
}
