//! Externalized configuration: groups, snapshots and the label context.
//!
//! A [`Snapshot`] is an immutable set of named [`ConfigGroup`]s fetched under
//! one label. The [`ConfigStore`] holds the current snapshot behind an `Arc`
//! and replaces it wholesale on reload, so readers never see a half-built one.

mod source;
mod store;

pub use source::{fold_properties, ConfigServerSource, ConfigSource, FileSource, PropertySource};
pub use store::ConfigStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group holding the rule maps.
pub const RULES_GROUP: &str = "rules";
/// Group holding system-of-record code lists.
pub const SOR_CODES_GROUP: &str = "sorCodes";
/// Group holding greeting text and other free-form values.
pub const EXAMPLE_GROUP: &str = "example";

/// Every group the store knows about, with the property prefix it is bound from.
pub const KNOWN_GROUPS: &[(&str, &str)] = &[
    (RULES_GROUP, "rules"),
    (SOR_CODES_GROUP, "sor-codes"),
    (EXAMPLE_GROUP, "example"),
];

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl ConfigValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Named values under one group.
pub type ConfigGroup = BTreeMap<String, ConfigValue>;

/// Identifies which configuration snapshot should be active.
///
/// Replaced wholesale whenever the label changes; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigContext {
    pub application: String,
    pub profile: String,
    pub label: String,
}

impl ConfigContext {
    pub fn new(
        application: impl Into<String>,
        profile: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            profile: profile.into(),
            label: label.into(),
        }
    }

    /// Same application and profile, different label.
    pub fn with_label(&self, label: impl Into<String>) -> Self {
        Self {
            application: self.application.clone(),
            profile: self.profile.clone(),
            label: label.into(),
        }
    }
}

/// An immutable, fully-formed set of configuration groups.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    /// Label the groups were fetched under; `None` before the first load.
    pub label: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub groups: BTreeMap<String, ConfigGroup>,
}

impl Snapshot {
    pub fn group(&self, name: &str) -> Option<&ConfigGroup> {
        self.groups.get(name)
    }

    /// Text value of `key` inside `group`, if present and textual.
    pub fn text(&self, group: &str, key: &str) -> Option<&str> {
        self.group(group)?.get(key)?.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_serializes_untagged() {
        let mut group = ConfigGroup::new();
        group.insert("greeting".into(), ConfigValue::Text("hi".into()));
        group.insert(
            "Acct".into(),
            ConfigValue::List(vec!["A1".into(), "A2".into()]),
        );
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Acct": ["A1", "A2"], "greeting": "hi"})
        );
    }

    #[test]
    fn test_snapshot_text_lookup() {
        let mut snapshot = Snapshot::default();
        let mut example = ConfigGroup::new();
        example.insert("greeting".into(), ConfigValue::Text("Hello".into()));
        example.insert("codes".into(), ConfigValue::List(vec!["x".into()]));
        snapshot.groups.insert(EXAMPLE_GROUP.into(), example);

        assert_eq!(snapshot.text(EXAMPLE_GROUP, "greeting"), Some("Hello"));
        assert_eq!(snapshot.text(EXAMPLE_GROUP, "codes"), None);
        assert_eq!(snapshot.text("missing", "greeting"), None);
    }

    #[test]
    fn test_context_with_label_keeps_app() {
        let ctx = ConfigContext::new("app", "default", "main");
        let next = ctx.with_label("release-1");
        assert_eq!(next.application, "app");
        assert_eq!(next.label, "release-1");
        assert_eq!(ctx.label, "main");
    }
}
