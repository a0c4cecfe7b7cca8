use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;

use super::KeyError;

pub(super) fn generate() -> (Vec<u8>, Vec<u8>) {
    let key = SigningKey::generate(&mut OsRng);
    (
        key.to_bytes().to_vec(),
        key.verifying_key().to_bytes().to_vec(),
    )
}

fn signing_key(private_key: &[u8]) -> Result<SigningKey, KeyError> {
    let bytes: [u8; SECRET_KEY_LENGTH] = private_key.try_into().map_err(|_| {
        KeyError::InvalidKeyMaterial(format!(
            "Ed25519 private key must be {SECRET_KEY_LENGTH} bytes, found {}",
            private_key.len()
        ))
    })?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub(super) fn from_private(private_key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    let key = signing_key(private_key)?;
    Ok((
        key.to_bytes().to_vec(),
        key.verifying_key().to_bytes().to_vec(),
    ))
}

pub(super) fn normalize_public(public_key: &[u8]) -> Result<Vec<u8>, KeyError> {
    let bytes: [u8; PUBLIC_KEY_LENGTH] = public_key.try_into().map_err(|_| {
        KeyError::InvalidKeyMaterial(format!(
            "Ed25519 public key must be {PUBLIC_KEY_LENGTH} bytes, found {}",
            public_key.len()
        ))
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| KeyError::InvalidKeyMaterial(format!("invalid Ed25519 public key: {e}")))?;
    Ok(bytes.to_vec())
}

pub(super) fn sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, KeyError> {
    Ok(signing_key(private_key)?.sign(message).to_bytes().to_vec())
}

pub(super) fn verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let Ok(bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}
