use crate::{
    core::{credential_format::ClaimFormatDesignation, object::TypedParameter},
    utils::NonEmptyVec,
};
use anyhow::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A Digital Credentials Query.
/// See: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6>
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlQuery {
    credentials: NonEmptyVec<DcqlCredentialQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credential_sets: Option<NonEmptyVec<DcqlCredentialSetQuery>>,
}

impl DcqlQuery {
    pub fn new(credentials: NonEmptyVec<DcqlCredentialQuery>) -> Self {
        Self {
            credentials,
            credential_sets: None,
        }
    }

    pub fn credential(&self, id: &str) -> Option<&DcqlCredentialQuery> {
        self.credentials.iter().find(|c| c.id() == id)
    }

    /// Credential query ids the wallet must answer.
    ///
    /// Without `credential_sets` every credential query is required. Otherwise each required
    /// set that is not satisfied by one of its options contributes the ids of its first option
    /// that are absent from `presented`.
    pub fn missing_credentials<'a>(&'a self, presented: &[&str]) -> Vec<&'a str> {
        let Some(sets) = &self.credential_sets else {
            return self
                .credentials
                .iter()
                .map(DcqlCredentialQuery::id)
                .filter(|id| !presented.contains(id))
                .collect();
        };

        let mut missing: Vec<&str> = vec![];
        for set in sets.iter().filter(|set| set.is_required()) {
            let satisfied = set
                .options()
                .iter()
                .any(|option| option.iter().all(|id| presented.contains(&id.as_str())));
            if satisfied {
                continue;
            }
            for id in set.options()[0].iter() {
                if !presented.contains(&id.as_str()) && !missing.contains(&id.as_str()) {
                    missing.push(id);
                }
            }
        }
        missing
    }
}

impl TypedParameter for DcqlQuery {
    const KEY: &'static str = "dcql_query";
}

impl TryFrom<Json> for DcqlQuery {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value)?)
    }
}

impl TryFrom<DcqlQuery> for Json {
    type Error = serde_json::Error;

    fn try_from(value: DcqlQuery) -> Result<Self, Self::Error> {
        serde_json::to_value(value)
    }
}

/// A Credential Query object
/// See: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6.1>
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlCredentialQuery {
    /// REQUIRED. A string identifying the Credential in the response.
    /// The value MUST be unique within a DCQL query.
    id: String,

    /// REQUIRED. A string that specifies the requested format for the Credential.
    format: ClaimFormatDesignation,

    /// Format specific constraints, e.g. `vct_values` for SD-JWT VC.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    meta: serde_json::Map<String, Json>,

    /// OPTIONAL. An array of objects that specifies claims in the Credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    claims: Option<NonEmptyVec<DcqlCredentialClaimsQuery>>,

    /// OPTIONAL. An array of claim set identifiers for alternative claim combinations.
    #[serde(skip_serializing_if = "Option::is_none")]
    claim_sets: Option<NonEmptyVec<Vec<String>>>,

    /// OPTIONAL. Defaults to `true` if not present.
    #[serde(skip_serializing_if = "Option::is_none")]
    require_cryptographic_holder_binding: Option<bool>,

    /// OPTIONAL. Boolean indicating if the Wallet may return multiple Credentials
    /// matching this query. Defaults to `false` if not present.
    #[serde(skip_serializing_if = "Option::is_none")]
    multiple: Option<bool>,
}

impl DcqlCredentialQuery {
    pub fn new(id: String, format: ClaimFormatDesignation) -> Self {
        Self {
            id,
            format,
            meta: serde_json::Map::new(),
            claims: None,
            claim_sets: None,
            require_cryptographic_holder_binding: None,
            multiple: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> &ClaimFormatDesignation {
        &self.format
    }

    /// Returns `true` if multiple Credentials may be returned for this query.
    pub fn multiple(&self) -> bool {
        self.multiple.unwrap_or(false)
    }
}

/// A Credential Set Query object
/// See: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6.2>
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlCredentialSetQuery {
    /// REQUIRED. Each value is a list of Credential Query identifiers representing one set of
    /// Credentials that satisfies the use case.
    options: NonEmptyVec<Vec<String>>,
    /// OPTIONAL. Defaults to `true` if not explicitly set.
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<bool>,
}

impl DcqlCredentialSetQuery {
    pub fn options(&self) -> &NonEmptyVec<Vec<String>> {
        &self.options
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(true)
    }
}

/// A Claims Query object
/// See: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6.3>
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlCredentialClaimsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    /// REQUIRED. A claims path pointer into the Credential.
    path: NonEmptyVec<DcqlCredentialClaimsQueryPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<NonEmptyVec<DcqlCredentialClaimsQueryValue>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DcqlCredentialClaimsQueryValue {
    String(String),
    Integer(isize),
    Boolean(bool),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DcqlCredentialClaimsQueryPath {
    String(String),
    Null,
    Integer(usize),
}
