use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use vigil_core::AlertRule;

use super::{CollaboratorError, RuleStore};

/// Rules stored as one YAML file each under a directory tree.
///
/// Dotfiles and non-YAML files are ignored. Files that fail to parse or
/// validate are logged and skipped so one bad rule cannot stop the scheduler.
pub struct FileRuleStore {
    rules_dir: PathBuf,
}

impl FileRuleStore {
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: impl Into<PathBuf>) -> Self {
        let rules_dir = rules_dir.into();
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self { rules_dir }
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn get_all_rules(&self) -> Result<Vec<AlertRule>, CollaboratorError> {
        let dir = self.rules_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || load_dir(&dir))
            .await
            .map_err(|e| CollaboratorError::Other(format!("rule scan task failed: {e}")))??;
        let rules: Vec<AlertRule> = loaded.into_iter().map(|(_, r)| r).collect();
        info!(count = rules.len(), dir = %self.rules_dir.display(), "loaded rules");
        Ok(rules)
    }

    async fn upsert(&self, rule: &AlertRule) -> Result<(), CollaboratorError> {
        rule.validate()?;
        let yaml = serde_yaml::to_string(rule)?;

        let dir = self.rules_dir.clone();
        let existing = tokio::task::spawn_blocking(move || load_dir(&dir))
            .await
            .map_err(|e| CollaboratorError::Other(format!("rule scan task failed: {e}")))??
            .into_iter()
            .find(|(_, r)| r.id == rule.id)
            .map(|(path, _)| path);

        let path = existing.unwrap_or_else(|| self.rules_dir.join(format!("{}.yaml", file_stem(&rule.id))));
        tokio::fs::write(&path, yaml).await?;
        info!(rule_id = %rule.id, path = %path.display(), "rule upserted");
        Ok(())
    }
}

/// Every valid rule under `dir`, by path order. Later duplicates are dropped.
fn load_dir(dir: &Path) -> Result<Vec<(PathBuf, AlertRule)>, CollaboratorError> {
    let files = crate::yaml_dir::yaml_files(dir)?;
    let mut rules: Vec<(PathBuf, AlertRule)> = Vec::new();
    for path in files {
        match load_file(&path) {
            Ok(rule) => {
                if rules.iter().any(|(_, r)| r.id == rule.id) {
                    warn!(rule_id = %rule.id, path = %path.display(), "duplicate rule id, skipping");
                    continue;
                }
                debug!(rule_id = %rule.id, path = %path.display(), "loaded rule");
                rules.push((path, rule));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping invalid rule file");
            }
        }
    }
    Ok(rules)
}

fn load_file(path: &Path) -> Result<AlertRule, CollaboratorError> {
    let content = fs::read_to_string(path)?;
    let rule: AlertRule = serde_yaml::from_str(&content)?;
    rule.validate()?;
    Ok(rule)
}

/// Filesystem-safe stem for a rule id.
fn file_stem(rule_id: &str) -> String {
    rule_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const RULE_YAML: &str = r#"
id: vm-cpu
signal_id: cpu-spike
resource_id: /subscriptions/s1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1
cadence: 15m
email_recipients: [ops@example.com]
"#;

    fn rule(id: &str) -> AlertRule {
        AlertRule {
            id: id.into(),
            signal_id: "sig".into(),
            resource_id: "/subscriptions/s1".parse().unwrap(),
            cadence: Duration::from_secs(3_600),
            email_recipients: vec![],
            description: Some("test".into()),
        }
    }

    #[tokio::test]
    async fn loads_yaml_and_skips_bad_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("vm.yaml"), RULE_YAML).unwrap();
        fs::write(tmp.path().join("broken.yml"), "id: [").unwrap();
        fs::write(tmp.path().join("zero.yaml"), RULE_YAML.replace("15m", "0s").replace("vm-cpu", "zero")).unwrap();
        fs::write(tmp.path().join(".hidden.yaml"), RULE_YAML).unwrap();
        fs::write(tmp.path().join("notes.txt"), "hello").unwrap();

        let store = FileRuleStore::new(tmp.path());
        let rules = store.get_all_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "vm-cpu");
        assert_eq!(rules[0].cadence, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn scans_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("team-a")).unwrap();
        fs::write(tmp.path().join("team-a/vm.yaml"), RULE_YAML).unwrap();
        let rules = FileRuleStore::new(tmp.path()).get_all_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_rule_wholesale() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileRuleStore::new(tmp.path().join("rules"));

        store.upsert(&rule("team/r1")).await.unwrap();
        let mut edited = rule("team/r1");
        edited.cadence = Duration::from_secs(60);
        edited.description = None;
        store.upsert(&edited).await.unwrap();

        let rules = store.get_all_rules().await.unwrap();
        assert_eq!(rules, vec![edited]);
        assert!(tmp.path().join("rules/team_r1.yaml").exists());
    }

    #[tokio::test]
    async fn upsert_rejects_invalid_rule() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileRuleStore::new(tmp.path());
        let mut bad = rule("r1");
        bad.signal_id = String::new();
        let err = store.upsert(&bad).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidRule(_)));
        assert!(store.get_all_rules().await.unwrap().is_empty());
    }
}
