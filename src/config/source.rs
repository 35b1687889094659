//! Configuration sources addressed by label.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::{ConfigContext, ConfigGroup, ConfigValue, KNOWN_GROUPS, SOR_CODES_GROUP};
use crate::error::{OnboardError, Result};

/// Something that can produce every configuration group for a given context.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch all groups available under `ctx.label`.
    ///
    /// Implementations return either the complete set or an error; they never
    /// return a partially read result.
    async fn fetch(&self, ctx: &ConfigContext) -> Result<BTreeMap<String, ConfigGroup>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// One entry of a configuration server's `propertySources` array.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertySource {
    pub name: String,
    #[serde(default)]
    pub source: serde_json::Map<String, Value>,
}

/// Configuration server response for `/{application}/{profile}/{label}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Environment {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    property_sources: Vec<PropertySource>,
}

/// Client for a label-addressable configuration server.
pub struct ConfigServerSource {
    base_url: String,
    client: reqwest::Client,
}

impl ConfigServerSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OnboardError::internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn environment_url(&self, ctx: &ConfigContext) -> String {
        // The server expects '/' inside a label to be written as "(_)".
        let label = ctx.label.replace('/', "(_)");
        format!(
            "{}/{}/{}/{}",
            self.base_url, ctx.application, ctx.profile, label
        )
    }
}

#[async_trait]
impl ConfigSource for ConfigServerSource {
    async fn fetch(&self, ctx: &ConfigContext) -> Result<BTreeMap<String, ConfigGroup>> {
        let url = self.environment_url(ctx);
        debug!(%url, "fetching configuration");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OnboardError::transport(format!(
                "configuration server has no label '{}'",
                ctx.label
            )));
        }
        let environment: Environment = response.error_for_status()?.json().await?;

        if let Some(served) = environment.label.as_deref() {
            if served != ctx.label {
                debug!(
                    requested = %ctx.label,
                    served,
                    "configuration server resolved a different label"
                );
            }
        }

        Ok(fold_properties(&environment.property_sources))
    }

    fn describe(&self) -> String {
        format!("config server {}", self.base_url)
    }
}

/// Reads `{directory}/{label}.toml`, whose top-level tables are the groups.
pub struct FileSource {
    directory: PathBuf,
}

impl FileSource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn label_path(&self, label: &str) -> Result<PathBuf> {
        if label.contains(['/', '\\']) || label.contains("..") {
            return Err(OnboardError::validation(format!(
                "label '{label}' is not a valid file name"
            )));
        }
        Ok(self.directory.join(format!("{label}.toml")))
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn fetch(&self, ctx: &ConfigContext) -> Result<BTreeMap<String, ConfigGroup>> {
        let path = self.label_path(&ctx.label)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OnboardError::not_found(format!(
                    "configuration for label '{}'",
                    ctx.label
                )));
            },
            Err(e) => {
                return Err(OnboardError::transport(format!(
                    "reading {}: {e}",
                    path.display()
                )));
            },
        };
        let table: toml::Table = toml::from_str(&content).map_err(|e| {
            OnboardError::transport(format!(
                "malformed configuration in {}: {e}",
                path.display()
            ))
        })?;
        Ok(groups_from_table(table))
    }

    fn describe(&self) -> String {
        format!("directory {}", self.directory.display())
    }
}

/// Top-level tables become groups. Scalars are kept as text, arrays as
/// lists and inline tables as maps, matching what the server source folds.
fn groups_from_table(table: toml::Table) -> BTreeMap<String, ConfigGroup> {
    let mut groups = BTreeMap::new();
    for (name, value) in table {
        let toml::Value::Table(entries) = value else {
            debug!(key = %name, "ignoring top-level value outside any group");
            continue;
        };
        let group = entries
            .into_iter()
            .map(|(key, value)| (key, toml_to_config_value(value)))
            .collect();
        groups.insert(name, group);
    }
    groups
}

fn toml_to_config_value(value: toml::Value) -> ConfigValue {
    match value {
        toml::Value::Array(items) => {
            ConfigValue::List(items.iter().map(toml_scalar_to_string).collect())
        },
        toml::Value::Table(entries) => ConfigValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), toml_scalar_to_string(v)))
                .collect(),
        ),
        other => ConfigValue::Text(toml_scalar_to_string(&other)),
    }
}

fn toml_scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Values collected for one property name before its final shape is known.
#[derive(Default)]
struct PartialValue {
    text: Option<String>,
    list: BTreeMap<usize, String>,
    map: BTreeMap<String, String>,
}

impl PartialValue {
    fn finish(self, group: &str) -> ConfigValue {
        if !self.map.is_empty() {
            ConfigValue::Map(self.map)
        } else if !self.list.is_empty() {
            ConfigValue::List(self.list.into_values().collect())
        } else {
            let text = self.text.unwrap_or_default();
            if group == SOR_CODES_GROUP {
                ConfigValue::List(
                    text.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            } else {
                ConfigValue::Text(text)
            }
        }
    }
}

/// Fold flat `prefix.name[.key|[i]]` properties into the known groups.
///
/// Earlier property sources take precedence over later ones, key by key.
/// Properties outside every known prefix are ignored.
pub fn fold_properties(sources: &[PropertySource]) -> BTreeMap<String, ConfigGroup> {
    let mut flat: BTreeMap<&str, String> = BTreeMap::new();
    for source in sources {
        for (key, value) in &source.source {
            flat.entry(key.as_str()).or_insert_with(|| scalar_to_string(value));
        }
    }

    let mut partial: BTreeMap<&str, BTreeMap<String, PartialValue>> = BTreeMap::new();
    for (key, value) in flat {
        let Some((group, rest)) = match_group(key) else {
            continue;
        };
        let entries = partial.entry(group).or_default();

        if let Some((name, index)) = parse_indexed(rest) {
            entries
                .entry(name.to_string())
                .or_default()
                .list
                .insert(index, value);
        } else if let Some((name, sub)) = rest.split_once('.') {
            entries
                .entry(name.to_string())
                .or_default()
                .map
                .insert(sub.to_string(), value);
        } else {
            entries.entry(rest.to_string()).or_default().text = Some(value);
        }
    }

    partial
        .into_iter()
        .map(|(group, entries)| {
            let values = entries
                .into_iter()
                .map(|(name, value)| (name, value.finish(group)))
                .collect();
            (group.to_string(), values)
        })
        .collect()
}

fn match_group(key: &str) -> Option<(&'static str, &str)> {
    KNOWN_GROUPS.iter().find_map(|(group, prefix)| {
        key.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|rest| !rest.is_empty())
            .map(|rest| (*group, rest))
    })
}

/// `name[3]` → `("name", 3)`.
fn parse_indexed(rest: &str) -> Option<(&str, usize)> {
    let open = rest.find('[')?;
    let close = rest[open..].find(']')? + open;
    if close + 1 != rest.len() {
        return None;
    }
    let index = rest[open + 1..close].parse().ok()?;
    Some((&rest[..open], index))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EXAMPLE_GROUP, RULES_GROUP};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn source(name: &str, props: Value) -> PropertySource {
        PropertySource {
            name: name.to_string(),
            source: props.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_fold_shapes() {
        let sources = vec![source(
            "app.yml",
            json!({
                "rules.Inv_ref_id_rccRule.PRIME": "R1",
                "rules.Inv_ref_id_rccRule.SUB": "R2",
                "sor-codes.Acct[1]": "B",
                "sor-codes.Acct[0]": "A",
                "sor-codes.DEAL": "D1, D2",
                "example.greeting": "Hello from config",
                "server.port": 8081
            }),
        )];

        let groups = fold_properties(&sources);
        assert_eq!(groups.len(), 3);

        let rules = &groups[RULES_GROUP];
        let mut expected = BTreeMap::new();
        expected.insert("PRIME".to_string(), "R1".to_string());
        expected.insert("SUB".to_string(), "R2".to_string());
        assert_eq!(rules["Inv_ref_id_rccRule"], ConfigValue::Map(expected));

        let sor = &groups[SOR_CODES_GROUP];
        assert_eq!(
            sor["Acct"],
            ConfigValue::List(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(
            sor["DEAL"],
            ConfigValue::List(vec!["D1".to_string(), "D2".to_string()])
        );

        assert_eq!(
            groups[EXAMPLE_GROUP]["greeting"],
            ConfigValue::Text("Hello from config".to_string())
        );
    }

    #[test]
    fn test_earlier_source_wins() {
        let sources = vec![
            source("branch.yml", json!({"example.greeting": "branch"})),
            source("base.yml", json!({"example.greeting": "base", "example.greeting1": "one"})),
        ];
        let groups = fold_properties(&sources);
        assert_eq!(groups[EXAMPLE_GROUP]["greeting"].as_text(), Some("branch"));
        assert_eq!(groups[EXAMPLE_GROUP]["greeting1"].as_text(), Some("one"));
    }

    #[test]
    fn test_prefix_must_end_at_dot() {
        let sources = vec![source("x", json!({"rulesets.a": "1", "examples.b": "2"}))];
        assert!(fold_properties(&sources).is_empty());
    }

    #[test]
    fn test_parse_indexed() {
        assert_eq!(parse_indexed("Acct[12]"), Some(("Acct", 12)));
        assert_eq!(parse_indexed("Acct[x]"), None);
        assert_eq!(parse_indexed("Acct[1].y"), None);
        assert_eq!(parse_indexed("Acct"), None);
    }

    #[test]
    fn test_environment_url_escapes_slashes() {
        let src = ConfigServerSource::new("http://cfg:8888/", Duration::from_secs(1)).unwrap();
        let ctx = ConfigContext::new("app", "default", "feature/x");
        assert_eq!(
            src.environment_url(&ctx),
            "http://cfg:8888/app/default/feature(_)x"
        );
    }

    #[test]
    fn test_file_source_rejects_traversal() {
        let src = FileSource::new("/tmp");
        assert!(matches!(
            src.label_path("../etc/passwd"),
            Err(OnboardError::Validation { .. })
        ));
        assert!(src.label_path("main").is_ok());
    }

    #[tokio::test]
    async fn test_file_source_reads_label() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.toml"),
            r#"
[rules.Non_regulated_rccRule]
KEY = "VALUE"

[sorCodes]
Acct = ["A1", "A2"]

[example]
greeting = "Hi"
"#,
        )
        .unwrap();

        let src = FileSource::new(dir.path());
        let groups = src
            .fetch(&ConfigContext::new("app", "default", "main"))
            .await
            .unwrap();
        assert_eq!(groups[EXAMPLE_GROUP]["greeting"].as_text(), Some("Hi"));
        assert_eq!(
            groups[SOR_CODES_GROUP]["Acct"],
            ConfigValue::List(vec!["A1".to_string(), "A2".to_string()])
        );

        let missing = src
            .fetch(&ConfigContext::new("app", "default", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(missing, OnboardError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_file_source_stringifies_scalars() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.toml"),
            r#"
label_hint = "ignored"

[example]
greeting = "hi"
retries = 3
enabled = true
ratio = 0.5

[sorCodes]
Ports = [8080, 8081]

[rules.Limits]
MAX = 10
"#,
        )
        .unwrap();

        let groups = FileSource::new(dir.path())
            .fetch(&ConfigContext::new("app", "default", "main"))
            .await
            .unwrap();

        let example = &groups[EXAMPLE_GROUP];
        assert_eq!(example["greeting"], ConfigValue::Text("hi".into()));
        assert_eq!(example["retries"], ConfigValue::Text("3".into()));
        assert_eq!(example["enabled"], ConfigValue::Text("true".into()));
        assert_eq!(example["ratio"], ConfigValue::Text("0.5".into()));
        assert_eq!(
            groups[SOR_CODES_GROUP]["Ports"],
            ConfigValue::List(vec!["8080".into(), "8081".into()])
        );
        let mut limits = BTreeMap::new();
        limits.insert("MAX".to_string(), "10".to_string());
        assert_eq!(groups[RULES_GROUP]["Limits"], ConfigValue::Map(limits));
        assert!(!groups.contains_key("label_hint"));
    }
}
