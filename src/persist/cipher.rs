use crate::errors::ConformalError;

/// Symmetric encryption applied to every blob of a bundle.
///
/// The crate ships no implementation; callers inject the cipher of their
/// choice. Decryption with a wrong key may either fail or return garbage, the
/// checksums recorded at save time catch the latter.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, ConformalError>;

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, ConformalError>;
}

/// A cipher together with the key to use it with.
#[derive(Clone, Copy)]
pub struct Encryption<'a> {
    pub cipher: &'a dyn Cipher,
    pub key: &'a [u8],
}

impl<'a> Encryption<'a> {
    pub fn new(cipher: &'a dyn Cipher, key: &'a [u8]) -> Self {
        Encryption { cipher, key }
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ConformalError> {
        self.cipher.encrypt(plaintext, self.key)
    }

    /// Any decryption failure is reported as a key mismatch.
    pub(crate) fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, ConformalError> {
        self.cipher.decrypt(ciphertext, self.key).map_err(|_| ConformalError::KeyMismatch)
    }
}
