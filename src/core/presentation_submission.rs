use std::collections::HashMap;

use super::{credential_format::ClaimFormatDesignation, object::TypedParameter};
use anyhow::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions describe how the presentations in a `vp_token` satisfy the input
/// descriptors of a [PresentationDefinition](super::presentation_definition::PresentationDefinition).
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: String,
    definition_id: String,
    descriptor_map: Vec<DescriptorMap>,
}

impl TypedParameter for PresentationSubmission {
    const KEY: &'static str = "presentation_submission";
}

impl PresentationSubmission {
    pub fn new(id: String, definition_id: String, descriptor_map: Vec<DescriptorMap>) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The id of the presentation definition this submission answers.
    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn descriptor_map(&self) -> &[DescriptorMap] {
        &self.descriptor_map
    }

    /// Returns the descriptor map as a mapping of descriptor map id to descriptor map.
    ///
    /// The descriptor map id is expected to match the id of the input descriptor.
    pub fn descriptor_map_by_id(&self) -> HashMap<&str, &DescriptorMap> {
        self.descriptor_map
            .iter()
            .map(|descriptor_map| (descriptor_map.id.as_str(), descriptor_map))
            .collect()
    }
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(raw).map_err(Into::into)
    }
}

impl TryFrom<PresentationSubmission> for Json {
    type Error = serde_json::Error;

    fn try_from(value: PresentationSubmission) -> Result<Self, Self::Error> {
        serde_json::to_value(value)
    }
}

/// Describes where in the `vp_token` the input for one input descriptor is found.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: ClaimFormatDesignation,
    pub path: JsonPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    pub fn new(id: impl Into<String>, format: ClaimFormatDesignation, path: JsonPath) -> Self {
        Self {
            id: id.into(),
            format,
            path,
            path_nested: None,
        }
    }

    /// The values `path` selects in `vp_token`.
    pub fn select<'a>(&self, vp_token: &'a Json) -> Vec<&'a Json> {
        self.path.query(vp_token).all()
    }
}
