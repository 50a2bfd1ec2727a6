//! Alert rules: a signal bound to a target resource and a run cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VigilError;
use crate::resource::ResourceIdentifier;

/// A binding of a signal to a target resource and a run cadence.
///
/// Rules are immutable once stored; an edit replaces the whole rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub signal_id: String,
    pub resource_id: ResourceIdentifier,
    /// Minimum time between successful runs.
    #[serde(with = "cadence_serde")]
    pub cadence: Duration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AlertRule {
    /// Reject rules that cannot be scheduled.
    pub fn validate(&self) -> Result<(), VigilError> {
        let malformed = |reason: &str| VigilError::MalformedRule {
            rule_id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(malformed("rule id is empty"));
        }
        if self.signal_id.trim().is_empty() {
            return Err(malformed("signal id is empty"));
        }
        if self.cadence.is_zero() {
            return Err(malformed("cadence must be positive"));
        }
        if self.email_recipients.iter().any(|r| !r.contains('@')) {
            return Err(malformed("email recipient without '@'"));
        }
        Ok(())
    }
}

mod cadence_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&crate::cadence::format_cadence(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        crate::cadence::parse_cadence(&raw).map_err(serde::de::Error::custom)
    }
}
