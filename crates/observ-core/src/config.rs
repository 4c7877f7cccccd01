//! Deployment configuration: YAML schema, defaults, and validation.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ObservError, Result};

/// Regions the demo stack supports. GKE Autopilot is available in all of
/// them.
pub const VALID_REGIONS: &[&str] = &[
    "us-central1",
    "us-east1",
    "us-east4",
    "us-west1",
    "us-west2",
    "europe-west1",
    "europe-west2",
    "europe-west3",
    "europe-west4",
    "asia-east1",
    "asia-northeast1",
    "asia-south1",
    "asia-southeast1",
    "australia-southeast1",
];

fn project_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][-a-z0-9]{4,28}[a-z0-9]$").unwrap())
}

fn billing_account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-F]{6}-[0-9A-F]{6}-[0-9A-F]{6}$").unwrap())
}

fn cluster_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]{0,39}$").unwrap())
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap())
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gcp: GcpConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub terraform: TerraformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    pub project_id: String,
    pub billing_account: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Defaults to `{region}-a` when omitted.
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
}

fn default_region() -> String {
    "us-central1".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    Autopilot,
    Standard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_name")]
    pub name: String,
    #[serde(default = "default_cluster_mode")]
    pub mode: ClusterMode,
    #[serde(default = "default_min_nodes")]
    pub min_nodes: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    #[serde(default = "default_machine_type")]
    pub machine_type: String,
    #[serde(default = "default_true")]
    pub enable_private_nodes: bool,
    #[serde(default = "default_true")]
    pub workload_identity: bool,
    #[serde(default = "default_true")]
    pub vertical_pod_autoscaling: bool,
}

fn default_cluster_name() -> String {
    "observ-demo-cluster".to_string()
}

fn default_cluster_mode() -> ClusterMode {
    ClusterMode::Autopilot
}

fn default_min_nodes() -> u32 {
    1
}

fn default_max_nodes() -> u32 {
    3
}

fn default_machine_type() -> String {
    "e2-small".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            mode: default_cluster_mode(),
            min_nodes: default_min_nodes(),
            max_nodes: default_max_nodes(),
            machine_type: default_machine_type(),
            enable_private_nodes: true,
            workload_identity: true,
            vertical_pod_autoscaling: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub email_notifications: Vec<String>,
    #[serde(default)]
    pub slack_webhook: Option<String>,
    #[serde(default = "default_budget_amount")]
    pub budget_amount: f64,
    /// Fractions of the budget at which alerts fire, ascending.
    #[serde(default = "default_budget_thresholds")]
    pub budget_thresholds: Vec<f64>,
}

fn default_budget_amount() -> f64 {
    100.0
}

fn default_budget_thresholds() -> Vec<f64> {
    vec![0.5, 0.75, 0.9, 1.0]
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            email_notifications: Vec::new(),
            slack_webhook: None,
            budget_amount: default_budget_amount(),
            budget_thresholds: default_budget_thresholds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_true")]
    pub deploy_opentelemetry: bool,
    #[serde(default = "default_true")]
    pub deploy_microservices: bool,
    #[serde(default = "default_true")]
    pub deploy_monitoring: bool,
    #[serde(default = "default_true")]
    pub enable_traffic_generation: bool,
    #[serde(default = "default_image_tag")]
    pub opentelemetry_image_tag: String,
    #[serde(default = "default_image_tag")]
    pub microservices_image_tag: String,
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
}

fn default_image_tag() -> String {
    "latest".to_string()
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("kubernetes")
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            deploy_opentelemetry: true,
            deploy_microservices: true,
            deploy_monitoring: true,
            enable_traffic_generation: true,
            opentelemetry_image_tag: default_image_tag(),
            microservices_image_tag: default_image_tag(),
            manifest_dir: default_manifest_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraformConfig {
    #[serde(default = "default_terraform_dir")]
    pub dir: PathBuf,
    /// Defaults to `{project_id}-terraform-state` when omitted.
    #[serde(default)]
    pub state_bucket_name: Option<String>,
    #[serde(default = "default_state_prefix")]
    pub state_prefix: String,
    #[serde(default = "default_true")]
    pub enable_versioning: bool,
    #[serde(default = "default_true")]
    pub enable_locking: bool,
}

fn default_terraform_dir() -> PathBuf {
    PathBuf::from("terraform")
}

fn default_state_prefix() -> String {
    "terraform/state".to_string()
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            dir: default_terraform_dir(),
            state_bucket_name: None,
            state_prefix: default_state_prefix(),
            enable_versioning: true,
            enable_locking: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save / validate
// ---------------------------------------------------------------------------

impl Config {
    /// Load, fill derived defaults, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ObservError::ConfigNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&raw)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = serde_yaml::to_string(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    fn apply_defaults(&mut self) {
        if self.gcp.zone.is_none() {
            self.gcp.zone = Some(format!("{}-a", self.gcp.region));
        }
        if self.terraform.state_bucket_name.is_none() {
            self.terraform.state_bucket_name =
                Some(format!("{}-terraform-state", self.gcp.project_id));
        }
        self.monitoring
            .budget_thresholds
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.monitoring.budget_thresholds.dedup();
    }

    pub fn validate(&self) -> Result<()> {
        if !project_id_re().is_match(&self.gcp.project_id) {
            return Err(ObservError::InvalidConfig(format!(
                "project_id '{}' must be 6-30 characters, lowercase letters, digits, and hyphens, starting with a letter",
                self.gcp.project_id
            )));
        }
        if !billing_account_re().is_match(&self.gcp.billing_account) {
            return Err(ObservError::InvalidConfig(format!(
                "billing_account '{}' must match XXXXXX-XXXXXX-XXXXXX (uppercase hex)",
                self.gcp.billing_account
            )));
        }
        if !VALID_REGIONS.contains(&self.gcp.region.as_str()) {
            return Err(ObservError::InvalidConfig(format!(
                "region '{}' is not a supported region",
                self.gcp.region
            )));
        }
        if !cluster_name_re().is_match(&self.cluster.name) {
            return Err(ObservError::InvalidConfig(format!(
                "cluster name '{}' must start with a lowercase letter and be at most 40 characters",
                self.cluster.name
            )));
        }
        if self.cluster.min_nodes == 0 || self.cluster.min_nodes > self.cluster.max_nodes {
            return Err(ObservError::InvalidConfig(format!(
                "node range {}..{} is invalid",
                self.cluster.min_nodes, self.cluster.max_nodes
            )));
        }
        if self.cluster.min_nodes > 10 {
            return Err(ObservError::InvalidConfig(format!(
                "min_nodes {} exceeds the maximum of 10",
                self.cluster.min_nodes
            )));
        }
        if self.cluster.max_nodes > 50 {
            return Err(ObservError::InvalidConfig(format!(
                "max_nodes {} exceeds the maximum of 50",
                self.cluster.max_nodes
            )));
        }
        for email in &self.monitoring.email_notifications {
            if !email_re().is_match(email) {
                return Err(ObservError::InvalidConfig(format!(
                    "'{email}' is not a valid email address"
                )));
            }
        }
        if let Some(webhook) = &self.monitoring.slack_webhook {
            if !webhook.starts_with("https://hooks.slack.com/") {
                return Err(ObservError::InvalidConfig(
                    "slack_webhook must start with https://hooks.slack.com/".to_string(),
                ));
            }
        }
        if self.monitoring.budget_amount < 10.0 {
            return Err(ObservError::InvalidConfig(format!(
                "budget_amount {} must be at least 10.0",
                self.monitoring.budget_amount
            )));
        }
        for threshold in &self.monitoring.budget_thresholds {
            if *threshold <= 0.0 || *threshold > 1.0 {
                return Err(ObservError::InvalidConfig(format!(
                    "budget threshold {threshold} must be greater than 0.0 and at most 1.0"
                )));
            }
        }
        Ok(())
    }

    /// Variables handed to terraform as `-var-file` JSON.
    pub fn to_terraform_vars(&self) -> serde_json::Value {
        json!({
            "project_id": self.gcp.project_id,
            "billing_account": self.gcp.billing_account,
            "region": self.gcp.region,
            "zone": self.gcp.zone,
            "org_id": self.gcp.org_id,
            "cluster_name": self.cluster.name,
            "autopilot": self.cluster.mode == ClusterMode::Autopilot,
            "min_nodes": self.cluster.min_nodes,
            "max_nodes": self.cluster.max_nodes,
            "machine_type": self.cluster.machine_type,
            "enable_private_nodes": self.cluster.enable_private_nodes,
            "workload_identity": self.cluster.workload_identity,
            "vertical_pod_autoscaling": self.cluster.vertical_pod_autoscaling,
            "notification_emails": self.monitoring.email_notifications,
            "budget_amount": self.monitoring.budget_amount,
            "budget_thresholds": self.monitoring.budget_thresholds,
            "state_bucket_name": self.terraform.state_bucket_name,
            "state_prefix": self.terraform.state_prefix,
        })
    }

    /// A starter config for `observ-demo init`.
    pub fn starter(project_id: &str, billing_account: &str, region: &str) -> Self {
        let mut config = Self {
            gcp: GcpConfig {
                project_id: project_id.to_string(),
                billing_account: billing_account.to_string(),
                region: region.to_string(),
                zone: None,
                org_id: None,
            },
            cluster: ClusterConfig::default(),
            monitoring: MonitoringConfig::default(),
            deployment: DeploymentConfig::default(),
            terraform: TerraformConfig::default(),
        };
        config.apply_defaults();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config::starter("observ-demo-proj", "012345-6789AB-CDEF01", "us-central1")
    }

    #[test]
    fn starter_config_passes_validation() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn zone_defaults_to_region_a() {
        let config = valid();
        assert_eq!(config.gcp.zone.as_deref(), Some("us-central1-a"));
    }

    #[test]
    fn state_bucket_defaults_to_project_suffix() {
        let config = valid();
        assert_eq!(
            config.terraform.state_bucket_name.as_deref(),
            Some("observ-demo-proj-terraform-state")
        );
    }

    #[test]
    fn rejects_malformed_project_id() {
        let mut config = valid();
        config.gcp.project_id = "Bad_Project".to_string();
        assert!(matches!(config.validate(), Err(ObservError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_short_project_id() {
        let mut config = valid();
        config.gcp.project_id = "abc".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_lowercase_billing_account() {
        let mut config = valid();
        config.gcp.billing_account = "012345-6789ab-cdef01".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_region() {
        let mut config = valid();
        config.gcp.region = "mars-north1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_email() {
        let mut config = valid();
        config.monitoring.email_notifications = vec!["not-an-email".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_slack_webhook() {
        let mut config = valid();
        config.monitoring.slack_webhook = Some("https://example.com/hook".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_node_range() {
        let mut config = valid();
        config.cluster.min_nodes = 5;
        config.cluster.max_nodes = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_node_counts_above_the_caps() {
        let mut config = valid();
        config.cluster.min_nodes = 11;
        config.cluster.max_nodes = 20;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.cluster.min_nodes = 5;
        config.cluster.max_nodes = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_budget_below_the_minimum() {
        let mut config = valid();
        config.monitoring.budget_amount = 5.0;
        assert!(matches!(config.validate(), Err(ObservError::InvalidConfig(_))));

        config.monitoring.budget_amount = 10.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_budget_threshold() {
        let mut config = valid();
        config.monitoring.budget_thresholds = vec![0.0, 0.5];
        assert!(matches!(config.validate(), Err(ObservError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_threshold_above_one() {
        let mut config = valid();
        config.monitoring.budget_thresholds = vec![0.5, 1.5];
        assert!(config.validate().is_err());
    }

    #[test]
    fn thresholds_are_sorted_and_deduped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observ-demo.yaml");
        std::fs::write(
            &path,
            r#"
gcp:
  project_id: observ-demo-proj
  billing_account: 012345-6789AB-CDEF01
monitoring:
  budget_thresholds: [0.9, 0.5, 0.9, 0.75]
"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.monitoring.budget_thresholds, vec![0.5, 0.75, 0.9]);
    }

    #[test]
    fn load_missing_file_reports_config_not_found() {
        let err = Config::load(Path::new("/nonexistent/observ-demo.yaml")).unwrap_err();
        assert!(matches!(err, ObservError::ConfigNotFound(_)));
    }

    #[test]
    fn minimal_yaml_gets_full_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observ-demo.yaml");
        std::fs::write(
            &path,
            "gcp:\n  project_id: observ-demo-proj\n  billing_account: 012345-6789AB-CDEF01\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.cluster.name, "observ-demo-cluster");
        assert_eq!(config.cluster.mode, ClusterMode::Autopilot);
        assert!(config.deployment.deploy_microservices);
        assert_eq!(config.terraform.state_prefix, "terraform/state");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observ-demo.yaml");
        let config = valid();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gcp.project_id, config.gcp.project_id);
        assert_eq!(loaded.cluster.name, config.cluster.name);
    }

    #[test]
    fn terraform_vars_carry_cluster_mode() {
        let vars = valid().to_terraform_vars();
        assert_eq!(vars["autopilot"], serde_json::json!(true));
        assert_eq!(vars["project_id"], serde_json::json!("observ-demo-proj"));
    }
}
