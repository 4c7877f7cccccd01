//! kubectl invocations: namespaces, manifests, readiness, endpoints.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::exec::{self, CommandSpec, ExecutionResult, KUBECTL_TIMEOUT, QUERY_TIMEOUT};
use crate::readiness::ReadinessQuery;

/// Namespaces the demo workloads live in, in teardown order.
pub const WORKLOAD_NAMESPACES: &[&str] = &["microservices", "opentelemetry", "monitoring"];

/// How a namespace-level mutation went. `AlreadySettled` covers both
/// "already exists" on create and "not found" on delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    AlreadySettled { diagnostic: String },
    Failed { diagnostic: String },
}

/// Whether a kubectl error means the world is already in the target state.
pub fn is_idempotent_conflict(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("already exists")
        || lowered.contains("alreadyexists")
        || lowered.contains("not found")
        || lowered.contains("notfound")
}

fn classify(result: &ExecutionResult) -> MutationOutcome {
    if result.success() {
        MutationOutcome::Applied
    } else if is_idempotent_conflict(result.diagnostic()) {
        MutationOutcome::AlreadySettled { diagnostic: result.diagnostic().to_string() }
    } else {
        MutationOutcome::Failed { diagnostic: result.diagnostic().to_string() }
    }
}

pub async fn current_context() -> Option<String> {
    let spec = CommandSpec::new("kubectl").args(["config", "current-context"]);
    let result = exec::run(&spec).await;
    if result.success() && !result.stdout.is_empty() {
        Some(result.stdout.trim().to_string())
    } else {
        None
    }
}

/// Confirm the configured context can reach the cluster API.
pub async fn cluster_reachable() -> ExecutionResult {
    let spec = CommandSpec::new("kubectl")
        .args(["cluster-info"])
        .timeout(QUERY_TIMEOUT);
    exec::run(&spec).await
}

/// Count ready nodes and total nodes from the node Ready conditions.
pub async fn node_readiness() -> Option<(usize, usize)> {
    let spec = CommandSpec::new("kubectl").args([
        "get",
        "nodes",
        "-o",
        "jsonpath={.items[*].status.conditions[?(@.type=='Ready')].status}",
    ]);
    let result = exec::run(&spec).await;
    if !result.success() {
        debug!(stderr = %result.stderr, "node readiness query failed");
        return None;
    }
    let tokens: Vec<&str> = result.stdout.split_whitespace().collect();
    let ready = tokens.iter().filter(|t| **t == "True").count();
    Some((ready, tokens.len()))
}

/// Create a namespace. An existing namespace is already the target state.
pub async fn ensure_namespace(namespace: &str) -> MutationOutcome {
    let spec = CommandSpec::new("kubectl")
        .args(["create", "namespace", namespace])
        .timeout(KUBECTL_TIMEOUT);
    let outcome = classify(&exec::run(&spec).await);
    if matches!(outcome, MutationOutcome::Applied) {
        info!(%namespace, "namespace created");
    }
    outcome
}

/// Apply a manifest file or directory into a namespace.
pub async fn apply_manifest(path: &Path, namespace: &str) -> MutationOutcome {
    let spec = CommandSpec::new("kubectl")
        .arg("apply")
        .arg("-f")
        .arg(path.display().to_string())
        .args(["-n", namespace])
        .timeout(KUBECTL_TIMEOUT);
    classify(&exec::run(&spec).await)
}

/// Delete a namespace. A missing namespace is already the target state, so
/// existence is checked first to avoid a pointless error path.
pub async fn delete_namespace(namespace: &str) -> MutationOutcome {
    let probe = CommandSpec::new("kubectl").args(["get", "namespace", namespace]);
    let exists = exec::run(&probe).await;
    if !exists.success() {
        return MutationOutcome::AlreadySettled {
            diagnostic: format!("namespace {namespace} not found"),
        };
    }
    let spec = CommandSpec::new("kubectl")
        .args(["delete", "namespace", namespace, "--wait=true"])
        .timeout(KUBECTL_TIMEOUT);
    classify(&exec::run(&spec).await)
}

/// The readiness query for "every pod in this namespace is Ready".
pub fn pod_readiness_query(namespace: &str) -> ReadinessQuery {
    let command = CommandSpec::new("kubectl")
        .args(["get", "pods", "-n", namespace, "-o"])
        .arg("jsonpath={.items[*].status.conditions[?(@.type=='Ready')].status}");
    ReadinessQuery::new(command)
        .poll_interval(Duration::from_secs(10))
        .timeout(Duration::from_secs(600))
}

/// Pod and service counts for one namespace, for status reporting.
#[derive(Debug, Clone, Default)]
pub struct NamespaceSummary {
    pub pods_running: usize,
    pub pods_total: usize,
    pub services: usize,
}

pub async fn namespace_summary(namespace: &str) -> Option<NamespaceSummary> {
    let pods = CommandSpec::new("kubectl").args([
        "get",
        "pods",
        "-n",
        namespace,
        "-o",
        "jsonpath={.items[*].status.phase}",
    ]);
    let result = exec::run(&pods).await;
    if !result.success() {
        return None;
    }
    let phases: Vec<&str> = result.stdout.split_whitespace().collect();
    let mut summary = NamespaceSummary {
        pods_running: phases.iter().filter(|p| **p == "Running").count(),
        pods_total: phases.len(),
        services: 0,
    };

    let services = CommandSpec::new("kubectl").args([
        "get",
        "services",
        "-n",
        namespace,
        "-o",
        "jsonpath={.items[*].metadata.name}",
    ]);
    let result = exec::run(&services).await;
    if result.success() {
        summary.services = result.stdout.split_whitespace().count();
    }
    Some(summary)
}

/// External endpoints of LoadBalancer services in a namespace, as
/// "service: ip" pairs.
pub async fn loadbalancer_endpoints(namespace: &str) -> Vec<(String, String)> {
    let spec = CommandSpec::new("kubectl")
        .args(["get", "services", "-n", namespace, "-o", "json"]);
    let result = exec::run(&spec).await;
    if !result.success() {
        return Vec::new();
    }
    parse_loadbalancer_endpoints(&result.stdout)
}

fn parse_loadbalancer_endpoints(raw: &str) -> Vec<(String, String)> {
    let parsed: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let mut endpoints = Vec::new();
    for item in parsed["items"].as_array().unwrap_or(&Vec::new()) {
        if item["spec"]["type"].as_str() != Some("LoadBalancer") {
            continue;
        }
        let name = item["metadata"]["name"].as_str().unwrap_or_default();
        for ingress in item["status"]["loadBalancer"]["ingress"]
            .as_array()
            .unwrap_or(&Vec::new())
        {
            if let Some(ip) = ingress["ip"].as_str() {
                endpoints.push((name.to_string(), ip.to_string()));
            }
        }
    }
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_detection_covers_both_directions() {
        assert!(is_idempotent_conflict("namespaces \"monitoring\" already exists"));
        assert!(is_idempotent_conflict("Error from server (AlreadyExists)"));
        assert!(is_idempotent_conflict("Error from server (NotFound): namespaces \"x\" not found"));
        assert!(!is_idempotent_conflict("connection refused"));
        assert!(!is_idempotent_conflict("forbidden"));
    }

    #[test]
    fn classify_maps_exit_code_and_stderr() {
        let ok = ExecutionResult {
            exit_code: 0,
            stdout: "namespace/monitoring created".into(),
            stderr: String::new(),
            duration: Duration::ZERO,
        };
        assert_eq!(classify(&ok), MutationOutcome::Applied);

        let conflict = ExecutionResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "already exists".into(),
            duration: Duration::ZERO,
        };
        assert!(matches!(classify(&conflict), MutationOutcome::AlreadySettled { .. }));

        let failed = ExecutionResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "forbidden".into(),
            duration: Duration::ZERO,
        };
        assert!(matches!(classify(&failed), MutationOutcome::Failed { .. }));
    }

    #[test]
    fn pod_readiness_query_targets_the_namespace() {
        let query = pod_readiness_query("microservices");
        let rendered = query.command.display();
        assert!(rendered.contains("-n microservices"));
        assert!(rendered.contains("@.type=='Ready'"));
        assert_eq!(query.poll_interval, Duration::from_secs(10));
        assert_eq!(query.timeout, Duration::from_secs(600));
    }

    #[test]
    fn parses_loadbalancer_ingress_ips() {
        let raw = r#"{
            "items": [
                {
                    "metadata": {"name": "frontend"},
                    "spec": {"type": "LoadBalancer"},
                    "status": {"loadBalancer": {"ingress": [{"ip": "35.1.2.3"}]}}
                },
                {
                    "metadata": {"name": "internal"},
                    "spec": {"type": "ClusterIP"},
                    "status": {"loadBalancer": {}}
                }
            ]
        }"#;
        let endpoints = parse_loadbalancer_endpoints(raw);
        assert_eq!(endpoints, vec![("frontend".to_string(), "35.1.2.3".to_string())]);
    }

    #[test]
    fn pending_loadbalancers_have_no_endpoint() {
        let raw = r#"{
            "items": [{
                "metadata": {"name": "frontend"},
                "spec": {"type": "LoadBalancer"},
                "status": {"loadBalancer": {}}
            }]
        }"#;
        assert!(parse_loadbalancer_endpoints(raw).is_empty());
    }
}
