use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use rand::rngs::OsRng;

use super::KeyError;

const SCALAR_LENGTH: usize = 32;

fn compressed(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

pub(super) fn generate() -> (Vec<u8>, Vec<u8>) {
    let key = SigningKey::random(&mut OsRng);
    (key.to_bytes().to_vec(), compressed(key.verifying_key()))
}

fn signing_key(private_key: &[u8]) -> Result<SigningKey, KeyError> {
    // Some encoders emit a leading zero byte for scalars with the high bit set.
    let private_key = match private_key {
        [0, rest @ ..] if rest.len() == SCALAR_LENGTH => rest,
        other => other,
    };
    if private_key.len() != SCALAR_LENGTH {
        return Err(KeyError::InvalidKeyMaterial(format!(
            "P-256 private key must be {SCALAR_LENGTH} bytes, found {}",
            private_key.len()
        )));
    }
    SigningKey::from_slice(private_key)
        .map_err(|e| KeyError::InvalidKeyMaterial(format!("invalid P-256 private key: {e}")))
}

pub(super) fn from_private(private_key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    let key = signing_key(private_key)?;
    Ok((key.to_bytes().to_vec(), compressed(key.verifying_key())))
}

/// Accepts compressed or uncompressed SEC1 points, or a bare 64 byte `x || y`.
pub(super) fn normalize_public(public_key: &[u8]) -> Result<Vec<u8>, KeyError> {
    let key = if public_key.len() == 2 * SCALAR_LENGTH {
        VerifyingKey::from_sec1_bytes(&[&[0x04], public_key].concat())
    } else {
        VerifyingKey::from_sec1_bytes(public_key)
    }
    .map_err(|e| KeyError::InvalidKeyMaterial(format!("invalid P-256 public key: {e}")))?;
    Ok(compressed(&key))
}

pub(super) fn sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, KeyError> {
    let signature: Signature = signing_key(private_key)?.sign(message);
    Ok(signature.to_vec())
}

pub(super) fn verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// The affine `x` and `y` coordinates of a compressed public key.
pub(super) fn coordinates(public_key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let key = VerifyingKey::from_sec1_bytes(public_key).ok()?;
    let point = key.to_encoded_point(false);
    Some((point.x()?.to_vec(), point.y()?.to_vec()))
}
