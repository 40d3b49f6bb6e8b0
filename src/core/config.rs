use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::PathBuf};
use tracing::debug;

/// One entry of a person's group mapping. An entry without an `id` is the
/// fallback label for expenses in unmapped groups (and for groupless
/// expenses, which carry group id 0).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GroupRule {
    #[serde(default)]
    pub id: Option<i64>,
    pub label: String,
}

/// Validated view of a person's group rules: id lookups with a guaranteed
/// fallback. Built once at configuration load so a missing or duplicated
/// fallback fails fast instead of surfacing mid-sync.
#[derive(Debug, Clone)]
pub struct GroupMap {
    labels: HashMap<i64, String>,
    fallback: String,
}

impl GroupMap {
    pub fn from_rules(rules: &[GroupRule]) -> Result<Self> {
        let mut labels = HashMap::new();
        let mut fallback: Option<String> = None;
        for rule in rules {
            match rule.id {
                Some(id) => {
                    if labels.insert(id, rule.label.clone()).is_some() {
                        bail!("Duplicate group id {id} in group mapping");
                    }
                }
                None => {
                    if fallback.replace(rule.label.clone()).is_some() {
                        bail!("Group mapping has more than one fallback entry (without an id)");
                    }
                }
            }
        }
        let fallback =
            fallback.context("Group mapping requires exactly one fallback entry (without an id)")?;
        Ok(Self { labels, fallback })
    }

    pub fn label(&self, group_id: i64) -> &str {
        self.labels
            .get(&group_id)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Person {
    pub name: String,
    pub user_id: i64,
    pub email: String,
    pub api_key: String,
    pub reporting_currency: String,
    pub groups: Vec<GroupRule>,
}

impl Person {
    pub fn group_map(&self) -> Result<GroupMap> {
        GroupMap::from_rules(&self.groups)
            .with_context(|| format!("Invalid group mapping for {}", self.name))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SplitwiseProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrankfurterProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub splitwise: Option<SplitwiseProviderConfig>,
    pub frankfurter: Option<FrankfurterProviderConfig>,
}

impl ProvidersConfig {
    pub fn splitwise_base_url(&self) -> &str {
        self.splitwise
            .as_ref()
            .map_or("https://secure.splitwise.com/api/v3.0", |p| &p.base_url)
    }

    pub fn frankfurter_base_url(&self) -> &str {
        self.frankfurter
            .as_ref()
            .map_or("https://api.frankfurter.app", |p| &p.base_url)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            splitwise: Some(SplitwiseProviderConfig {
                base_url: "https://secure.splitwise.com/api/v3.0".to_string(),
            }),
            frankfurter: Some(FrankfurterProviderConfig {
                base_url: "https://api.frankfurter.app".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub people: Vec<Person>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "divvy")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "codito", "divvy")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Location of the embedded store within the data directory.
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.default_data_path()?.join("store"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        for person in &config.people {
            person.group_map()?;
        }
        debug!("Successfully loaded config for {} people", config.people.len());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
people:
  - name: "Ada"
    user_id: 10123
    email: "ada@example.com"
    api_key: "secret"
    reporting_currency: "GBP"
    groups:
      - id: 20311
        label: "Home"
      - id: 20415
        label: "Travel"
      - label: "Everything else"
providers:
  splitwise:
    base_url: "http://example.com/splitwise"
  frankfurter:
    base_url: "http://example.com/frankfurter"
"#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = serde_yaml::from_str(VALID_CONFIG).expect("Failed to deserialize");
        assert_eq!(config.people.len(), 1);
        let person = &config.people[0];
        assert_eq!(person.name, "Ada");
        assert_eq!(person.user_id, 10123);
        assert_eq!(person.reporting_currency, "GBP");
        assert_eq!(person.groups.len(), 3);
        assert_eq!(
            config.providers.splitwise_base_url(),
            "http://example.com/splitwise"
        );
        assert_eq!(
            config.providers.frankfurter_base_url(),
            "http://example.com/frankfurter"
        );
    }

    #[test]
    fn test_default_provider_urls() {
        let providers = ProvidersConfig {
            splitwise: None,
            frankfurter: None,
        };
        assert_eq!(
            providers.splitwise_base_url(),
            "https://secure.splitwise.com/api/v3.0"
        );
        assert_eq!(providers.frankfurter_base_url(), "https://api.frankfurter.app");
    }

    #[test]
    fn test_group_map_resolves_ids_and_fallback() {
        let config: AppConfig = serde_yaml::from_str(VALID_CONFIG).unwrap();
        let groups = config.people[0].group_map().unwrap();
        assert_eq!(groups.label(20311), "Home");
        assert_eq!(groups.label(20415), "Travel");
        assert_eq!(groups.label(0), "Everything else");
        assert_eq!(groups.label(99999), "Everything else");
    }

    #[test]
    fn test_group_map_requires_a_fallback() {
        let rules = vec![GroupRule {
            id: Some(1),
            label: "Home".to_string(),
        }];
        let err = GroupMap::from_rules(&rules).unwrap_err();
        assert!(err.to_string().contains("exactly one fallback"));
    }

    #[test]
    fn test_group_map_rejects_two_fallbacks() {
        let rules = vec![
            GroupRule {
                id: None,
                label: "One".to_string(),
            },
            GroupRule {
                id: None,
                label: "Two".to_string(),
            },
        ];
        let err = GroupMap::from_rules(&rules).unwrap_err();
        assert!(err.to_string().contains("more than one fallback"));
    }

    #[test]
    fn test_group_map_rejects_duplicate_ids() {
        let rules = vec![
            GroupRule {
                id: Some(7),
                label: "One".to_string(),
            },
            GroupRule {
                id: Some(7),
                label: "Two".to_string(),
            },
            GroupRule {
                id: None,
                label: "Rest".to_string(),
            },
        ];
        let err = GroupMap::from_rules(&rules).unwrap_err();
        assert!(err.to_string().contains("Duplicate group id"));
    }
}
