//! Typed, hierarchical cloud resource identifiers.
//!
//! A [`ResourceIdentifier`] is one of three granularities: a subscription, a
//! resource group, or a typed leaf resource. Fields below the identifier's
//! granularity are always empty. The canonical string form
//! (`/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`)
//! converts both ways without loss; a string that does not survive the round
//! trip is rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VigilError;

// ── Resource type ───────────────────────────────────────────────────

/// Granularity and (for leaves) the concrete kind of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Subscription,
    ResourceGroup,
    VirtualMachine,
    VirtualMachineScaleSet,
    ApplicationInsights,
    LogAnalyticsWorkspace,
    KubernetesCluster,
    WebSite,
    SqlServer,
}

/// Leaf types with their ARM provider namespace and type name.
const LEAF_TYPES: &[(ResourceType, &str, &str)] = &[
    (ResourceType::VirtualMachine, "Microsoft.Compute", "virtualMachines"),
    (ResourceType::VirtualMachineScaleSet, "Microsoft.Compute", "virtualMachineScaleSets"),
    (ResourceType::ApplicationInsights, "Microsoft.Insights", "components"),
    (ResourceType::LogAnalyticsWorkspace, "Microsoft.OperationalInsights", "workspaces"),
    (ResourceType::KubernetesCluster, "Microsoft.ContainerService", "managedClusters"),
    (ResourceType::WebSite, "Microsoft.Web", "sites"),
    (ResourceType::SqlServer, "Microsoft.Sql", "servers"),
];

impl ResourceType {
    /// Every leaf type known to the system.
    pub fn leaf_types() -> impl Iterator<Item = ResourceType> {
        LEAF_TYPES.iter().map(|(t, _, _)| *t)
    }

    pub fn is_leaf(self) -> bool {
        !matches!(self, ResourceType::Subscription | ResourceType::ResourceGroup)
    }

    /// ARM provider namespace and type name, `None` for subscriptions and groups.
    pub fn provider_type(self) -> Option<(&'static str, &'static str)> {
        LEAF_TYPES
            .iter()
            .find(|(t, _, _)| *t == self)
            .map(|(_, ns, ty)| (*ns, *ty))
    }

    /// `"{namespace}/{type}"` as used in ARM `$filter` clauses.
    pub fn arm_type_name(self) -> Option<String> {
        self.provider_type().map(|(ns, ty)| format!("{}/{}", ns, ty))
    }

    /// Look up a leaf type by provider namespace and type name (case-insensitive).
    pub fn from_provider_type(namespace: &str, type_name: &str) -> Option<ResourceType> {
        LEAF_TYPES
            .iter()
            .find(|(_, ns, ty)| ns.eq_ignore_ascii_case(namespace) && ty.eq_ignore_ascii_case(type_name))
            .map(|(t, _, _)| *t)
    }

    /// Hierarchical compatibility: can a signal declared for `self` analyze `target`?
    ///
    /// - `Subscription` accepts subscriptions, groups, and any leaf.
    /// - `ResourceGroup` accepts groups and any leaf.
    /// - A leaf type accepts exactly itself.
    pub fn accepts(self, target: ResourceType) -> bool {
        match self {
            ResourceType::Subscription => true,
            ResourceType::ResourceGroup => target != ResourceType::Subscription,
            leaf => leaf == target,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ResourceType {
    type Err = VigilError;

    /// Accepts either the variant name (`VirtualMachine`) or the ARM type name
    /// (`Microsoft.Compute/virtualMachines`), both case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("Subscription") {
            return Ok(ResourceType::Subscription);
        }
        if trimmed.eq_ignore_ascii_case("ResourceGroup") {
            return Ok(ResourceType::ResourceGroup);
        }
        if let Some((ns, ty)) = trimmed.split_once('/') {
            return ResourceType::from_provider_type(ns, ty)
                .ok_or_else(|| VigilError::UnknownResourceType(s.to_string()));
        }
        ResourceType::leaf_types()
            .find(|t| t.to_string().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| VigilError::UnknownResourceType(s.to_string()))
    }
}

// ── Resource identifier ─────────────────────────────────────────────

/// A typed reference to a subscription, resource group, or leaf resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceIdentifier {
    resource_type: ResourceType,
    subscription_id: String,
    resource_group_name: String,
    resource_name: String,
}

impl ResourceIdentifier {
    pub fn subscription(subscription_id: impl Into<String>) -> Result<Self, VigilError> {
        Self::build(ResourceType::Subscription, subscription_id.into(), String::new(), String::new())
    }

    pub fn resource_group(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
    ) -> Result<Self, VigilError> {
        Self::build(
            ResourceType::ResourceGroup,
            subscription_id.into(),
            resource_group_name.into(),
            String::new(),
        )
    }

    pub fn resource(
        resource_type: ResourceType,
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Result<Self, VigilError> {
        Self::build(
            resource_type,
            subscription_id.into(),
            resource_group_name.into(),
            resource_name.into(),
        )
    }

    fn build(
        resource_type: ResourceType,
        subscription_id: String,
        resource_group_name: String,
        resource_name: String,
    ) -> Result<Self, VigilError> {
        let id = Self {
            resource_type,
            subscription_id,
            resource_group_name,
            resource_name,
        };
        id.check_fields()?;
        Ok(id)
    }

    /// Required fields are non-empty and segment-safe; fields below the
    /// granularity are empty.
    fn check_fields(&self) -> Result<(), VigilError> {
        let shown = self.to_string();
        let segment_ok = |s: &str| !s.is_empty() && !s.contains('/');

        if !segment_ok(&self.subscription_id) {
            return Err(VigilError::invalid_id(&shown, "subscription id is empty or contains '/'"));
        }
        match self.resource_type {
            ResourceType::Subscription => {
                if !self.resource_group_name.is_empty() || !self.resource_name.is_empty() {
                    return Err(VigilError::invalid_id(&shown, "subscription must not carry a group or name"));
                }
            }
            ResourceType::ResourceGroup => {
                if !segment_ok(&self.resource_group_name) {
                    return Err(VigilError::invalid_id(&shown, "resource group name is empty or contains '/'"));
                }
                if !self.resource_name.is_empty() {
                    return Err(VigilError::invalid_id(&shown, "resource group must not carry a resource name"));
                }
            }
            _ => {
                if !segment_ok(&self.resource_group_name) || !segment_ok(&self.resource_name) {
                    return Err(VigilError::invalid_id(&shown, "leaf resource needs a group and a name"));
                }
            }
        }
        Ok(())
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Empty for subscriptions.
    pub fn resource_group_name(&self) -> &str {
        &self.resource_group_name
    }

    /// Empty for subscriptions and resource groups.
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// The subscription this identifier lives under.
    pub fn subscription_scope(&self) -> ResourceIdentifier {
        ResourceIdentifier {
            resource_type: ResourceType::Subscription,
            subscription_id: self.subscription_id.clone(),
            resource_group_name: String::new(),
            resource_name: String::new(),
        }
    }

    /// Canonical string form.
    pub fn to_canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;
        if self.resource_type == ResourceType::Subscription {
            return Ok(());
        }
        write!(f, "/resourceGroups/{}", self.resource_group_name)?;
        if let Some((ns, ty)) = self.resource_type.provider_type() {
            write!(f, "/providers/{}/{}/{}", ns, ty, self.resource_name)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceIdentifier {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.first() != Some(&"") {
            return Err(VigilError::invalid_id(s, "must start with '/'"));
        }
        let parts = &parts[1..];

        let keyword = |idx: usize, expected: &str| {
            parts
                .get(idx)
                .map(|p| p.eq_ignore_ascii_case(expected))
                .unwrap_or(false)
        };

        let id = match parts.len() {
            2 if keyword(0, "subscriptions") => Self::subscription(parts[1])?,
            4 if keyword(0, "subscriptions") && keyword(2, "resourceGroups") => {
                Self::resource_group(parts[1], parts[3])?
            }
            8 if keyword(0, "subscriptions") && keyword(2, "resourceGroups") && keyword(4, "providers") => {
                let resource_type = ResourceType::from_provider_type(parts[5], parts[6])
                    .ok_or_else(|| VigilError::UnknownResourceType(format!("{}/{}", parts[5], parts[6])))?;
                Self::resource(resource_type, parts[1], parts[3], parts[7])?
            }
            _ => return Err(VigilError::invalid_id(s, "unrecognized structure")),
        };

        // Keywords and provider names are matched case-insensitively; anything
        // else that changed on the way back means the input was not canonical.
        if !id.to_string().eq_ignore_ascii_case(s) {
            return Err(VigilError::invalid_id(s, "does not round-trip through its canonical form"));
        }
        Ok(id)
    }
}

impl TryFrom<String> for ResourceIdentifier {
    type Error = VigilError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceIdentifier> for String {
    fn from(id: ResourceIdentifier) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUB: &str = "7904b7bd-5e6b-4415-99a8-355657b7da19";

    #[test]
    fn canonical_round_trip_for_each_type() {
        let mut inputs = vec![
            format!("/subscriptions/{SUB}"),
            format!("/subscriptions/{SUB}/resourceGroups/prod-rg"),
        ];
        for t in ResourceType::leaf_types() {
            let (ns, ty) = t.provider_type().unwrap();
            inputs.push(format!("/subscriptions/{SUB}/resourceGroups/prod-rg/providers/{ns}/{ty}/item-1"));
        }

        for input in inputs {
            let id: ResourceIdentifier = input.parse().unwrap();
            assert_eq!(id.to_string(), input);
        }
    }

    #[test]
    fn parse_is_case_insensitive_on_keywords() {
        let id: ResourceIdentifier = format!(
            "/SUBSCRIPTIONS/{SUB}/resourcegroups/rg/PROVIDERS/microsoft.compute/VIRTUALMACHINES/vm1"
        )
        .parse()
        .unwrap();
        assert_eq!(id.resource_type(), ResourceType::VirtualMachine);
        assert_eq!(
            id.to_string(),
            format!("/subscriptions/{SUB}/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1")
        );
    }

    #[test]
    fn fields_below_granularity_are_empty() {
        let sub = ResourceIdentifier::subscription(SUB).unwrap();
        assert_eq!(sub.resource_group_name(), "");
        assert_eq!(sub.resource_name(), "");

        let rg = ResourceIdentifier::resource_group(SUB, "rg").unwrap();
        assert_eq!(rg.resource_name(), "");
        assert_eq!(rg.subscription_scope(), sub);
    }

    #[test]
    fn rejects_malformed_identifiers() {
        for bad in [
            "",
            "subscriptions/abc",
            "/subscriptions/",
            "/subscriptions/abc/",
            "/subscriptions/abc/resourceGroups",
            "/subscriptions/abc/resourceGroups/rg/providers/Microsoft.Unknown/things/x",
            "/subscriptions/abc/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/",
        ] {
            assert!(bad.parse::<ResourceIdentifier>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn constructors_validate_required_fields() {
        assert!(ResourceIdentifier::resource_group(SUB, "").is_err());
        assert!(ResourceIdentifier::resource(ResourceType::VirtualMachine, SUB, "rg", "").is_err());
        assert!(ResourceIdentifier::resource(ResourceType::VirtualMachine, SUB, "rg", "a/b").is_err());
    }

    #[test]
    fn compatibility_is_hierarchical() {
        use ResourceType::*;
        assert!(Subscription.accepts(VirtualMachine));
        assert!(Subscription.accepts(ResourceGroup));
        assert!(Subscription.accepts(Subscription));
        assert!(ResourceGroup.accepts(WebSite));
        assert!(!ResourceGroup.accepts(Subscription));
        assert!(VirtualMachine.accepts(VirtualMachine));
        assert!(!VirtualMachine.accepts(ResourceGroup));
        assert!(!VirtualMachine.accepts(VirtualMachineScaleSet));
    }

    #[test]
    fn resource_type_from_str_accepts_both_spellings() {
        assert_eq!("VirtualMachine".parse::<ResourceType>().unwrap(), ResourceType::VirtualMachine);
        assert_eq!(
            "microsoft.insights/components".parse::<ResourceType>().unwrap(),
            ResourceType::ApplicationInsights
        );
        assert_eq!("resourcegroup".parse::<ResourceType>().unwrap(), ResourceType::ResourceGroup);
        assert!("Spaceship".parse::<ResourceType>().is_err());
    }

    #[test]
    fn serde_uses_canonical_string() {
        let id = ResourceIdentifier::resource_group(SUB, "rg").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"/subscriptions/{SUB}/resourceGroups/rg\""));
        let back: ResourceIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
