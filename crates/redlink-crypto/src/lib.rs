//! Ticket authentication for the SPICE client protocol.
//!
//! The link reply carries a DER-encoded RSA public key; the client proves
//! knowledge of the password by sending it (NUL-terminated) encrypted
//! under that key with OAEP/SHA-1 padding. The ciphertext is always
//! exactly the modulus size, which is what the server reads.

use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use thiserror::Error;
use zeroize::Zeroizing;

/// Ticket encryption failures.
///
/// Both variants are fatal for the channel performing the handshake; the
/// client maps them onto its auth-error kind.
#[derive(Debug, Error)]
pub enum TicketError {
    /// The server-supplied public key did not parse as DER
    /// SubjectPublicKeyInfo.
    #[error("invalid server public key: {0}")]
    InvalidKey(rsa::pkcs8::spki::Error),

    /// RSA-OAEP encryption failed (password too long for the modulus).
    #[error("ticket encryption failed: {0}")]
    Encrypt(rsa::Error),
}

/// Encrypt `password` under the server's DER-encoded RSA public key.
///
/// The plaintext is the password bytes plus a terminating NUL, exactly as
/// the server expects to recover it. The returned ciphertext length
/// equals the RSA modulus size.
pub fn encrypt_ticket(pub_key_der: &[u8], password: &str) -> Result<Vec<u8>, TicketError> {
    let key = RsaPublicKey::from_public_key_der(pub_key_der).map_err(TicketError::InvalidKey)?;

    let mut plaintext = Zeroizing::new(Vec::with_capacity(password.len() + 1));
    plaintext.extend_from_slice(password.as_bytes());
    plaintext.push(0);

    key.encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), &plaintext)
        .map_err(TicketError::Encrypt)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rsa::pkcs8::EncodePublicKey;
    use rsa::{Oaep, RsaPrivateKey};
    use sha1::Sha1;

    use super::{TicketError, encrypt_ticket};

    fn test_key() -> (RsaPrivateKey, Vec<u8>) {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let der = key.to_public_key().to_public_key_der().unwrap().as_bytes().to_vec();
        (key, der)
    }

    #[test]
    fn spki_der_is_the_fixed_link_size() {
        // the link reply reserves exactly 162 bytes for a 1024-bit key
        let (_, der) = test_key();
        assert_eq!(der.len(), 162);
    }

    #[test]
    fn ticket_is_modulus_sized_and_decrypts() {
        let (key, der) = test_key();
        let ticket = encrypt_ticket(&der, "s3cret").unwrap();
        assert_eq!(ticket.len(), 128);

        let plaintext = key.decrypt(Oaep::new::<Sha1>(), &ticket).unwrap();
        assert_eq!(plaintext, b"s3cret\0");
    }

    #[test]
    fn empty_password_still_carries_the_nul() {
        let (key, der) = test_key();
        let ticket = encrypt_ticket(&der, "").unwrap();
        let plaintext = key.decrypt(Oaep::new::<Sha1>(), &ticket).unwrap();
        assert_eq!(plaintext, b"\0");
    }

    #[test]
    fn garbage_key_is_rejected() {
        let result = encrypt_ticket(&[0u8; 162], "pw");
        assert!(matches!(result, Err(TicketError::InvalidKey(_))));
    }

    #[test]
    fn oversized_password_is_rejected() {
        // OAEP-SHA1 over a 1024-bit modulus caps the plaintext at 86 bytes
        let (_, der) = test_key();
        let long = "x".repeat(200);
        assert!(matches!(encrypt_ticket(&der, &long), Err(TicketError::Encrypt(_))));
    }
}
