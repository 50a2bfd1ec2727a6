//! ARM wire types.

use serde::Deserialize;

use crate::paging::Page;

/// Standard ARM list envelope: `{ "value": [...], "nextLink": "..." }`.
#[derive(Debug, Deserialize)]
pub struct ArmList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

impl<T> From<ArmList<T>> for Page<T> {
    fn from(list: ArmList<T>) -> Self {
        Page {
            items: list.value,
            continuation: list.next_link,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArmSubscription {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

/// Resource groups and leaf resources share this shape.
#[derive(Debug, Deserialize)]
pub struct ArmResource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArmErrorEnvelope {
    pub error: ArmErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ArmErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ArmProvider {
    pub namespace: String,
    #[serde(rename = "resourceTypes", default)]
    pub resource_types: Vec<ArmProviderResourceType>,
}

#[derive(Debug, Deserialize)]
pub struct ArmProviderResourceType {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "apiVersions", default)]
    pub api_versions: Vec<String>,
}
