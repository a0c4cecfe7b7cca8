use base64::prelude::*;
use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};

use super::{secp256r1, KeyAlgorithm, KeyError};

pub(super) fn to_jwk(algorithm: KeyAlgorithm, public_key: &[u8]) -> Json {
    match algorithm {
        KeyAlgorithm::Ed25519 => json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": BASE64_URL_SAFE_NO_PAD.encode(public_key),
        }),
        KeyAlgorithm::Secp256r1 => {
            // Stored keys are always valid compressed points.
            let (x, y) = secp256r1::coordinates(public_key).unwrap_or_default();
            json!({
                "kty": "EC",
                "crv": "P-256",
                "x": BASE64_URL_SAFE_NO_PAD.encode(x),
                "y": BASE64_URL_SAFE_NO_PAD.encode(y),
            })
        }
    }
}

fn member<'a>(jwk: &'a Json, name: &str) -> Result<&'a str, KeyError> {
    jwk.get(name)
        .and_then(Json::as_str)
        .ok_or_else(|| KeyError::InvalidKeyMaterial(format!("JWK is missing '{name}'")))
}

fn coordinate(jwk: &Json, name: &str) -> Result<Vec<u8>, KeyError> {
    BASE64_URL_SAFE_NO_PAD
        .decode(member(jwk, name)?)
        .map_err(|e| KeyError::InvalidKeyMaterial(format!("JWK '{name}' is not base64url: {e}")))
}

pub(super) fn from_jwk(jwk: &Json) -> Result<(KeyAlgorithm, Vec<u8>), KeyError> {
    let kty = member(jwk, "kty")?;
    let crv = member(jwk, "crv")?;
    match (kty, crv) {
        ("OKP", "Ed25519") => Ok((KeyAlgorithm::Ed25519, coordinate(jwk, "x")?)),
        ("EC", "P-256") => {
            let x = coordinate(jwk, "x")?;
            let y = coordinate(jwk, "y")?;
            Ok((KeyAlgorithm::Secp256r1, [&[0x04][..], &x, &y].concat()))
        }
        (kty, crv) => Err(KeyError::UnsupportedPublicKeyType(format!(
            "JWK with kty '{kty}' and crv '{crv}'"
        ))),
    }
}

/// RFC 7638 JWK thumbprint: base64url SHA-256 of the required members in lexicographic order.
pub fn jwk_thumbprint(jwk: &Json) -> Result<String, KeyError> {
    let kty = member(jwk, "kty")?;
    let members: &[&str] = match kty {
        "EC" => &["crv", "kty", "x", "y"],
        "OKP" => &["crv", "kty", "x"],
        other => {
            return Err(KeyError::UnsupportedPublicKeyType(format!(
                "cannot compute thumbprint of kty '{other}'"
            )))
        }
    };
    let canonical = members
        .iter()
        .map(|name| {
            member(jwk, name).map(|value| format!("{}:{}", Json::from(*name), Json::from(value)))
        })
        .collect::<Result<Vec<_>, _>>()?
        .join(",");
    let digest = Sha256::digest(format!("{{{canonical}}}").as_bytes());
    Ok(BASE64_URL_SAFE_NO_PAD.encode(digest))
}
