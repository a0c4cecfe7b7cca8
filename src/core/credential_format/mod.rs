use core::fmt;
use std::{borrow::Cow, collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VP: &str = "jwt_vp";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_JWT_VP_JSON: &str = "jwt_vp_json";
const FORMAT_VC_JWT: &str = "vc+jwt";
const FORMAT_DC_SD_JWT: &str = "dc+sd-jwt";
const FORMAT_VC_SD_JWT: &str = "vc+sd-jwt";

/// A Json object of claim formats, as used in `vp_formats` client metadata and in
/// presentation definitions.
pub type ClaimFormatMap = BTreeMap<ClaimFormatDesignation, Json>;

/// How tokens of a format are verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatFamily {
    /// JWT-secured W3C credentials and presentations.
    Vcdm,
    /// Selective disclosure JWTs with key binding.
    SdJwt,
}

/// The claim format designation of a requested or presented credential.
///
/// Registry of claim format type: https://identity.foundation/claim-format-registry/#registry
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClaimFormatDesignation {
    JwtVc,
    JwtVp,
    /// W3C Verifiable Credential secured as a JWT, per OID4VP appendix B.
    JwtVcJson,
    JwtVpJson,
    /// VCDM 2.0 credential secured with JOSE.
    VcJwt,
    /// SD-JWT based digital credential.
    DcSdJwt,
    /// Pre-1.0 media type of [ClaimFormatDesignation::DcSdJwt].
    VcSdJwt,
    /// Other claim format designations not covered by the above.
    ///
    /// The value of this variant is the name of the claim format designation.
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VP => Self::JwtVp,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_JWT_VP_JSON => Self::JwtVpJson,
            FORMAT_VC_JWT => Self::VcJwt,
            FORMAT_DC_SD_JWT => Self::DcSdJwt,
            FORMAT_VC_SD_JWT => Self::VcSdJwt,
            _ => Self::Other(name.into_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVp => FORMAT_JWT_VP,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::JwtVpJson => FORMAT_JWT_VP_JSON,
            Self::VcJwt => FORMAT_VC_JWT,
            Self::DcSdJwt => FORMAT_DC_SD_JWT,
            Self::VcSdJwt => FORMAT_VC_SD_JWT,
            Self::Other(other) => other,
        }
    }

    /// The verification family, or `None` for formats this verifier cannot process.
    pub fn family(&self) -> Option<FormatFamily> {
        match self {
            Self::JwtVc | Self::JwtVp | Self::JwtVcJson | Self::JwtVpJson | Self::VcJwt => {
                Some(FormatFamily::Vcdm)
            }
            Self::DcSdJwt | Self::VcSdJwt => Some(FormatFamily::SdJwt),
            Self::Other(_) => None,
        }
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for ClaimFormatDesignation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<ClaimFormatDesignation> for String {
    fn from(format: ClaimFormatDesignation) -> Self {
        format.name().to_owned()
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormatDesignation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormatDesignation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}

/// The formats and algorithms a verifier accepts, advertised as `vp_formats`.
pub fn supported_vp_formats(algorithms: &[&str]) -> ClaimFormatMap {
    let alg = json!({ "alg": algorithms });
    BTreeMap::from([
        (ClaimFormatDesignation::JwtVc, alg.clone()),
        (ClaimFormatDesignation::JwtVp, alg.clone()),
        (ClaimFormatDesignation::JwtVcJson, alg.clone()),
        (ClaimFormatDesignation::JwtVpJson, alg.clone()),
        (ClaimFormatDesignation::VcJwt, alg.clone()),
        (
            ClaimFormatDesignation::DcSdJwt,
            json!({
                "sd-jwt_alg_values": algorithms,
                "kb-jwt_alg_values": algorithms,
            }),
        ),
    ])
}
