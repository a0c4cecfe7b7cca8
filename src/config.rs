use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value as Json;
use url::Url;

use crate::{
    core::{dcql_query::DcqlQuery, presentation_definition::PresentationDefinition},
    verifier::rp::PresentationQuery,
};

/// Configuration of a verifier deployment, loaded by the embedding application.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub base: BaseUrl,
    #[serde(default)]
    pub verifiers: Vec<VerifierOptions>,
    #[serde(default)]
    pub presentations: Vec<PresentationRecord>,
    /// Lifetime of cached status lists, one hour when unset.
    #[serde(default)]
    pub status_list_ttl_seconds: Option<u64>,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid configuration")?;
        for (i, verifier) in config.verifiers.iter().enumerate() {
            if config.verifiers[..i].iter().any(|v| v.name == verifier.name) {
                bail!("duplicate verifier name '{}'", verifier.name)
            }
        }
        Ok(config)
    }

    pub fn verifier(&self, name: &str) -> Option<&VerifierOptions> {
        self.verifiers.iter().find(|v| v.name == name)
    }

    pub fn presentation(&self, id: &str) -> Option<&PresentationRecord> {
        self.presentations.iter().find(|p| p.id == id)
    }
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl std::str::FromStr for BaseUrl {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_owned().try_into()
    }
}

/// One verifier tenant: the DID it signs requests as and the presentations it may request.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifierOptions {
    pub name: String,
    pub did: String,
    #[serde(default)]
    pub admin_token: Option<String>,
    /// Path below the base url the verifier's endpoints live at, the name when unset.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub presentations: Vec<String>,
    /// Reference of the signing key within the DID, the first key when unset.
    #[serde(default)]
    pub key_id: Option<String>,
    /// Send the client id as `decentralized_identifier:<did>` in DCQL requests.
    #[serde(default)]
    pub client_id_prefix: bool,
}

impl VerifierOptions {
    pub fn new(name: impl Into<String>, did: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            did: did.into(),
            admin_token: None,
            path: None,
            presentations: vec![],
            key_id: None,
            client_id_prefix: false,
        }
    }

    pub fn with_presentation(mut self, id: impl Into<String>) -> Self {
        self.presentations.push(id.into());
        self
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    pub fn allows_presentation(&self, id: &str) -> bool {
        self.presentations.iter().any(|p| p == id)
    }
}

/// A stored presentation request: either a DCQL query or Presentation Exchange input
/// descriptors.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresentationRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub query: Option<DcqlQuery>,
    #[serde(default)]
    pub input_descriptors: Option<Vec<Json>>,
}

impl PresentationRecord {
    pub fn dcql(id: impl Into<String>, query: DcqlQuery) -> Self {
        Self {
            id: id.into(),
            name: None,
            purpose: None,
            query: Some(query),
            input_descriptors: None,
        }
    }

    pub fn presentation_exchange(id: impl Into<String>, input_descriptors: Vec<Json>) -> Self {
        Self {
            id: id.into(),
            name: None,
            purpose: None,
            query: None,
            input_descriptors: Some(input_descriptors),
        }
    }

    /// The query a wallet is sent. A DCQL query takes precedence over input descriptors.
    pub fn query(&self) -> Result<PresentationQuery> {
        if let Some(query) = &self.query {
            return Ok(PresentationQuery::Dcql(query.clone()));
        }
        let Some(input_descriptors) = &self.input_descriptors else {
            bail!("presentation '{}' has neither a query nor input descriptors", self.id)
        };
        let definition = PresentationDefinition::from_descriptors(self.id.clone(), input_descriptors)?
            .set_name(self.name.clone())
            .set_purpose(self.purpose.clone());
        Ok(PresentationQuery::PresentationExchange(definition))
    }
}
