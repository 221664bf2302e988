/// Decrypts secrets held in the configuration store.
///
/// The host platform owns the keys and the cipher,
/// this crate only ever asks for plaintext.
/// An undecryptable value decrypts to an empty string.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> String;
}

impl<F> Decryptor for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn decrypt(&self, ciphertext: &str) -> String {
        self(ciphertext)
    }
}
