//! Read-only status of a deployed stack: terraform state, cluster health,
//! workload summaries, and external endpoints.

use std::fmt;

use serde::Serialize;

use crate::config::Config;
use crate::kube::{self, NamespaceSummary, WORKLOAD_NAMESPACES};
use crate::terraform::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unreachable,
    /// State exists but could not be interpreted.
    Unknown,
    NotDeployed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unreachable => "unreachable",
            HealthStatus::Unknown => "unknown",
            HealthStatus::NotDeployed => "not deployed",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InfrastructureStatus {
    pub status: HealthStatus,
    pub resource_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub status: HealthStatus,
    pub context: Option<String>,
    pub nodes_ready: usize,
    pub nodes_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadStatus {
    pub namespace: String,
    pub status: HealthStatus,
    pub pods_running: usize,
    pub pods_total: usize,
    pub services: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackStatus {
    pub project_id: String,
    pub infrastructure: InfrastructureStatus,
    pub cluster: ClusterStatus,
    pub workloads: Vec<WorkloadStatus>,
    pub endpoints: Vec<Endpoint>,
    pub overall: HealthStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub namespace: String,
    pub service: String,
    pub ip: String,
}

/// Gather the full stack status. Every probe degrades independently, so a
/// broken cluster still yields a report.
pub async fn collect(config: &Config) -> StackStatus {
    let workspace = Workspace::new(&config.terraform.dir);
    let infrastructure = infrastructure_status(&workspace).await;
    let cluster = cluster_status().await;

    let mut workloads = Vec::new();
    let mut endpoints = Vec::new();
    if cluster.status != HealthStatus::Unreachable {
        for namespace in WORKLOAD_NAMESPACES {
            match kube::namespace_summary(namespace).await {
                Some(summary) => {
                    workloads.push(workload_status(namespace, &summary));
                    for (service, ip) in kube::loadbalancer_endpoints(namespace).await {
                        endpoints.push(Endpoint {
                            namespace: namespace.to_string(),
                            service,
                            ip,
                        });
                    }
                }
                None => workloads.push(WorkloadStatus {
                    namespace: namespace.to_string(),
                    status: HealthStatus::NotDeployed,
                    pods_running: 0,
                    pods_total: 0,
                    services: 0,
                }),
            }
        }
    }

    let overall = rollup(&infrastructure, &cluster, &workloads);
    StackStatus {
        project_id: config.gcp.project_id.clone(),
        infrastructure,
        cluster,
        workloads,
        endpoints,
        overall,
    }
}

async fn infrastructure_status(workspace: &Workspace) -> InfrastructureStatus {
    match workspace.show_state().await {
        Some(state) => match count_resources(&state) {
            Some(0) => InfrastructureStatus {
                status: HealthStatus::NotDeployed,
                resource_count: Some(0),
            },
            Some(n) => InfrastructureStatus {
                status: HealthStatus::Healthy,
                resource_count: Some(n),
            },
            None => InfrastructureStatus { status: HealthStatus::Unknown, resource_count: None },
        },
        None => InfrastructureStatus { status: HealthStatus::NotDeployed, resource_count: None },
    }
}

fn count_resources(state: &serde_json::Value) -> Option<usize> {
    // An empty state renders as {"format_version": "..."} with no values
    // key, which counts as zero resources rather than unknown.
    if state.get("values").is_none() {
        return Some(0);
    }
    let root = state["values"].get("root_module")?;
    Some(count_module_resources(root))
}

fn count_module_resources(module: &serde_json::Value) -> usize {
    let own = module["resources"].as_array().map_or(0, Vec::len);
    let children: usize = module["child_modules"]
        .as_array()
        .map_or(0, |mods| mods.iter().map(count_module_resources).sum());
    own + children
}

async fn cluster_status() -> ClusterStatus {
    let context = kube::current_context().await;
    let reachable = kube::cluster_reachable().await;
    if !reachable.success() {
        return ClusterStatus {
            status: HealthStatus::Unreachable,
            context,
            nodes_ready: 0,
            nodes_total: 0,
        };
    }
    match kube::node_readiness().await {
        Some((ready, total)) => ClusterStatus {
            status: if total > 0 && ready == total {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            context,
            nodes_ready: ready,
            nodes_total: total,
        },
        None => ClusterStatus {
            status: HealthStatus::Unknown,
            context,
            nodes_ready: 0,
            nodes_total: 0,
        },
    }
}

fn workload_status(namespace: &str, summary: &NamespaceSummary) -> WorkloadStatus {
    let status = if summary.pods_total == 0 {
        HealthStatus::NotDeployed
    } else if summary.pods_running == summary.pods_total {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };
    WorkloadStatus {
        namespace: namespace.to_string(),
        status,
        pods_running: summary.pods_running,
        pods_total: summary.pods_total,
        services: summary.services,
    }
}

fn rollup(
    infrastructure: &InfrastructureStatus,
    cluster: &ClusterStatus,
    workloads: &[WorkloadStatus],
) -> HealthStatus {
    if infrastructure.status == HealthStatus::NotDeployed {
        return HealthStatus::NotDeployed;
    }
    if cluster.status == HealthStatus::Unreachable {
        return HealthStatus::Unreachable;
    }
    let any_degraded = cluster.status == HealthStatus::Degraded
        || workloads.iter().any(|w| w.status == HealthStatus::Degraded);
    let any_unknown = infrastructure.status == HealthStatus::Unknown
        || cluster.status == HealthStatus::Unknown;
    if any_degraded {
        HealthStatus::Degraded
    } else if any_unknown {
        HealthStatus::Unknown
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn healthy_cluster() -> ClusterStatus {
        ClusterStatus {
            status: HealthStatus::Healthy,
            context: Some("gke_proj_region_cluster".into()),
            nodes_ready: 3,
            nodes_total: 3,
        }
    }

    fn deployed_infra() -> InfrastructureStatus {
        InfrastructureStatus { status: HealthStatus::Healthy, resource_count: Some(12) }
    }

    #[test]
    fn counts_resources_across_nested_modules() {
        let state = json!({
            "format_version": "1.0",
            "values": {
                "root_module": {
                    "resources": [{"address": "a"}, {"address": "b"}],
                    "child_modules": [
                        {"resources": [{"address": "c"}]},
                        {"child_modules": [{"resources": [{"address": "d"}]}]}
                    ]
                }
            }
        });
        assert_eq!(count_resources(&state), Some(4));
    }

    #[test]
    fn empty_state_counts_as_zero_resources() {
        let state = json!({"format_version": "1.0"});
        assert_eq!(count_resources(&state), Some(0));
    }

    #[test]
    fn missing_root_module_is_unknown() {
        let state = json!({"values": {}});
        assert_eq!(count_resources(&state), None);
    }

    #[test]
    fn partial_pods_degrade_the_workload() {
        let summary = NamespaceSummary { pods_running: 2, pods_total: 5, services: 1 };
        assert_eq!(workload_status("microservices", &summary).status, HealthStatus::Degraded);
    }

    #[test]
    fn empty_namespace_is_not_deployed() {
        let summary = NamespaceSummary::default();
        assert_eq!(workload_status("monitoring", &summary).status, HealthStatus::NotDeployed);
    }

    #[test]
    fn rollup_prioritizes_not_deployed() {
        let infra = InfrastructureStatus { status: HealthStatus::NotDeployed, resource_count: None };
        assert_eq!(rollup(&infra, &healthy_cluster(), &[]), HealthStatus::NotDeployed);
    }

    #[test]
    fn rollup_surfaces_unreachable_cluster() {
        let cluster = ClusterStatus {
            status: HealthStatus::Unreachable,
            context: None,
            nodes_ready: 0,
            nodes_total: 0,
        };
        assert_eq!(rollup(&deployed_infra(), &cluster, &[]), HealthStatus::Unreachable);
    }

    #[test]
    fn rollup_degrades_on_any_degraded_workload() {
        let workloads = vec![
            workload_status("microservices", &NamespaceSummary { pods_running: 3, pods_total: 3, services: 2 }),
            workload_status("monitoring", &NamespaceSummary { pods_running: 1, pods_total: 2, services: 1 }),
        ];
        assert_eq!(rollup(&deployed_infra(), &healthy_cluster(), &workloads), HealthStatus::Degraded);
    }

    #[test]
    fn rollup_is_healthy_when_everything_is() {
        let workloads = vec![workload_status(
            "microservices",
            &NamespaceSummary { pods_running: 3, pods_total: 3, services: 2 },
        )];
        assert_eq!(rollup(&deployed_infra(), &healthy_cluster(), &workloads), HealthStatus::Healthy);
    }

    #[test]
    fn status_serializes_for_json_output() {
        let status = StackStatus {
            project_id: "my-proj".into(),
            infrastructure: deployed_infra(),
            cluster: healthy_cluster(),
            workloads: vec![],
            endpoints: vec![Endpoint {
                namespace: "microservices".into(),
                service: "frontend".into(),
                ip: "35.1.2.3".into(),
            }],
            overall: HealthStatus::Healthy,
        };
        let rendered = serde_json::to_value(&status).unwrap();
        assert_eq!(rendered["overall"], json!("healthy"));
        assert_eq!(rendered["endpoints"][0]["ip"], json!("35.1.2.3"));
    }
}
