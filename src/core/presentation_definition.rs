use super::credential_format::ClaimFormatMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A presentation definition is a JSON object that describes the information a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// Only the parts needed to serve the definition and to match a submission against it are
/// modelled; input descriptor constraints are carried through untouched.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<ClaimFormatMap>,
}

impl PresentationDefinition {
    /// A definition must request at least one input, and input descriptor ids must be unique.
    pub fn new(id: String, input_descriptors: Vec<InputDescriptor>) -> Result<Self> {
        if input_descriptors.is_empty() {
            bail!("presentation definition '{id}' has no input descriptors")
        }
        for (i, descriptor) in input_descriptors.iter().enumerate() {
            if input_descriptors[..i].iter().any(|d| d.id == descriptor.id) {
                bail!("duplicate input descriptor id '{}'", descriptor.id)
            }
        }
        Ok(Self {
            id,
            input_descriptors,
            ..Default::default()
        })
    }

    /// Build a definition from raw input descriptor objects.
    pub fn from_descriptors(id: String, input_descriptors: &[Json]) -> Result<Self> {
        let descriptors = input_descriptors
            .iter()
            .map(|d| serde_json::from_value(d.clone()))
            .collect::<Result<Vec<InputDescriptor>, _>>()
            .context("invalid input descriptor")?;
        Self::new(id, descriptors)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input_descriptors(&self) -> &[InputDescriptor] {
        &self.input_descriptors
    }

    pub fn input_descriptor(&self, id: &str) -> Option<&InputDescriptor> {
        self.input_descriptors.iter().find(|d| d.id == id)
    }

    pub fn set_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_purpose(mut self, purpose: Option<String>) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = Some(format);
        self
    }

    pub fn format(&self) -> Option<&ClaimFormatMap> {
        self.format.as_ref()
    }
}

/// Input Descriptors describe one input a verifier requires.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InputDescriptor {
    pub id: String,
    #[serde(default)]
    pub constraints: Map<String, Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    pub format: ClaimFormatMap,
}
