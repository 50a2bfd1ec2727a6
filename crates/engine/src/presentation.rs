//! Conversion of raw result items into publishable presentations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use vigil_core::{AlertRule, ResourceIdentifier};
use vigil_telemetry::QueryRunInfo;

use crate::signal::ResultItem;

/// A result item ready for publishing and notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItemPresentation {
    pub rule_id: String,
    pub signal_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub resource_id: ResourceIdentifier,
    /// Display strings for each raw property.
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_run_info: Option<QueryRunInfo>,
    /// Stable fingerprint for downstream deduplication.
    pub correlation_hash: String,
    pub analysis_time: DateTime<Utc>,
}

impl ResultItemPresentation {
    pub fn from_item(
        rule: &AlertRule,
        item: ResultItem,
        query_run_info: Option<QueryRunInfo>,
        analysis_time: DateTime<Utc>,
    ) -> Self {
        let resource_id = item.resource_id.unwrap_or_else(|| rule.resource_id.clone());
        let properties: BTreeMap<String, String> = item
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), display_value(v)))
            .collect();
        let correlation_hash = correlation_hash(&rule.signal_id, &resource_id, &item.title, &properties);
        Self {
            rule_id: rule.id.clone(),
            signal_id: rule.signal_id.clone(),
            title: item.title,
            summary: item.summary,
            resource_id,
            properties,
            query_run_info,
            correlation_hash,
            analysis_time,
        }
    }
}

/// Strings print bare, nulls print empty, everything else as compact JSON.
pub fn display_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SHA-256 over the signal id, canonical resource id, title and sorted
/// properties. Time and rule id are excluded so repeated findings collide.
pub fn correlation_hash(
    signal_id: &str,
    resource_id: &ResourceIdentifier,
    title: &str,
    properties: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    let mut field = |s: &str| {
        hasher.update((s.len() as u64).to_le_bytes());
        hasher.update(s.as_bytes());
    };
    field(&signal_id.to_lowercase());
    field(&resource_id.to_string().to_lowercase());
    field(title);
    for (k, v) in properties {
        field(k);
        field(v);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn rule() -> AlertRule {
        AlertRule {
            id: "r1".into(),
            signal_id: "disk-full".into(),
            resource_id: "/subscriptions/s1/resourceGroups/rg".parse().unwrap(),
            cadence: Duration::from_secs(300),
            email_recipients: vec![],
            description: None,
        }
    }

    fn item() -> ResultItem {
        ResultItem::new("Disk almost full")
            .with_property("percent", 97.5)
            .with_property("drive", "C:")
            .with_property("note", serde_json::Value::Null)
    }

    #[test]
    fn defaults_resource_to_rule_target_and_resolves_display_values() {
        let p = ResultItemPresentation::from_item(&rule(), item(), None, Utc::now());
        assert_eq!(p.resource_id, rule().resource_id);
        assert_eq!(p.properties["percent"], "97.5");
        assert_eq!(p.properties["drive"], "C:");
        assert_eq!(p.properties["note"], "");
        assert_eq!(p.correlation_hash.len(), 64);
    }

    #[test]
    fn hash_is_stable_across_time_and_property_order() {
        let earlier = ResultItemPresentation::from_item(&rule(), item(), None, Utc::now());
        let mut reordered = ResultItem::new("Disk almost full");
        reordered.properties.insert("note".into(), json!(null));
        reordered.properties.insert("drive".into(), json!("C:"));
        reordered.properties.insert("percent".into(), json!(97.5));
        let later = ResultItemPresentation::from_item(
            &rule(),
            reordered,
            None,
            Utc::now() + chrono::Duration::hours(1),
        );
        assert_eq!(earlier.correlation_hash, later.correlation_hash);
    }

    #[test]
    fn hash_changes_with_content() {
        let a = ResultItemPresentation::from_item(&rule(), item(), None, Utc::now());
        let b = ResultItemPresentation::from_item(
            &rule(),
            item().with_property("drive", "D:"),
            None,
            Utc::now(),
        );
        assert_ne!(a.correlation_hash, b.correlation_hash);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let res: ResourceIdentifier = "/subscriptions/s1".parse().unwrap();
        let mut p1 = BTreeMap::new();
        p1.insert("ab".to_string(), "c".to_string());
        let mut p2 = BTreeMap::new();
        p2.insert("a".to_string(), "bc".to_string());
        assert_ne!(
            correlation_hash("sig", &res, "t", &p1),
            correlation_hash("sig", &res, "t", &p2)
        );
    }
}
