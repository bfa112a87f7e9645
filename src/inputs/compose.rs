//! The parts of a docker-compose file that the build cares about. Services are kept in the order
//! they're declared, since that order determines which of two linked services is seen first.
use indexmap::IndexMap;
use serde_yaml::Value;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: IndexMap<String, ComposeService>,
    #[serde(default)]
    pub volumes: IndexMap<String, Option<ComposeVolume>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComposeService {
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub build: Option<Value>,
    #[serde(default)]
    pub volumes: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComposeVolume {
    #[serde(default)]
    pub labels: Labels,
}

/// Compose allows labels to be given either as a map or as a list of `KEY=value` strings, and
/// map values may be any yaml scalar. Both forms end up as an ordered map of strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawLabels")]
pub struct Labels(IndexMap<String, String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabels {
    Map(IndexMap<String, Value>),
    List(Vec<String>),
}

impl From<RawLabels> for Labels {
    fn from(raw: RawLabels) -> Labels {
        let labels = match raw {
            RawLabels::Map(map) => map
                .into_iter()
                .map(|(k, v)| (k, scalar_to_string(&v)))
                .collect(),
            RawLabels::List(list) => list
                .into_iter()
                .map(|entry| match entry.find('=') {
                    Some(idx) => (entry[..idx].to_owned(), entry[(idx + 1)..].to_owned()),
                    None => (entry, String::new()),
                })
                .collect(),
        };
        Labels(labels)
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_start_matches("---").trim().to_owned())
            .unwrap_or_default(),
    }
}

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Returns `Some(true)` or `Some(false)` if the label is set to a recognizable boolean
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(crate::config::parse_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> std::iter::FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Labels {
        Labels(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn labels_may_be_a_map_or_a_list() {
        let compose: ComposeFile = serde_yaml::from_str(
            r#"
services:
  nginx:
    image: nginx:latest
    labels:
      lagoon.type: nginx-php-persistent
      lagoon.persistent: /app/web/sites/default/files/
      lagoon.autogeneratedroute: false
  php:
    labels:
      - lagoon.type=nginx-php-persistent
      - lagoon.name=nginx
volumes:
  files:
    labels:
      lagoon.type: persistent
  scratch:
"#,
        )
        .expect("failed to parse compose file");

        let names: Vec<&str> = compose.services.keys().map(String::as_str).collect();
        assert_eq!(vec!["nginx", "php"], names);

        let nginx = &compose.services["nginx"];
        assert_eq!(Some("nginx-php-persistent"), nginx.labels.get("lagoon.type"));
        assert_eq!(Some(false), nginx.labels.get_bool("lagoon.autogeneratedroute"));
        assert_eq!(Some("nginx:latest"), nginx.image.as_deref());

        let php = &compose.services["php"];
        assert_eq!(Some("nginx"), php.labels.get("lagoon.name"));

        let files = compose.volumes["files"].as_ref().expect("missing volume");
        assert_eq!(Some("persistent"), files.labels.get("lagoon.type"));
        assert!(compose.volumes["scratch"].is_none());
    }

    #[test]
    fn unrecognized_boolean_labels_are_ignored() {
        let labels: Labels = vec![
            ("lagoon.autogeneratedroute", "nope"),
            ("lagoon.persistent.enabled", "Disabled"),
        ]
        .into_iter()
        .collect();
        assert_eq!(None, labels.get_bool("lagoon.autogeneratedroute"));
        assert_eq!(Some(false), labels.get_bool("lagoon.persistent.enabled"));
        assert_eq!(None, labels.get_bool("lagoon.type"));
    }
}
