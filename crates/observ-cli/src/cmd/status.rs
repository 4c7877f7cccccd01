use std::path::Path;

use observ_core::config::Config;
use observ_core::status;

use crate::output;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let stack = runtime.block_on(status::collect(&config));

    if json {
        return output::print_json(&stack);
    }

    output::print_kv(&[
        ("Project", stack.project_id.clone()),
        ("Overall", stack.overall.to_string()),
        (
            "Infrastructure",
            match stack.infrastructure.resource_count {
                Some(n) => format!("{} ({n} resources)", stack.infrastructure.status),
                None => stack.infrastructure.status.to_string(),
            },
        ),
        (
            "Cluster",
            format!(
                "{} ({}/{} nodes ready)",
                stack.cluster.status, stack.cluster.nodes_ready, stack.cluster.nodes_total
            ),
        ),
    ]);

    if !stack.workloads.is_empty() {
        println!();
        output::print_table(
            &["NAMESPACE", "STATUS", "PODS", "SERVICES"],
            &stack
                .workloads
                .iter()
                .map(|w| {
                    vec![
                        w.namespace.clone(),
                        w.status.to_string(),
                        format!("{}/{}", w.pods_running, w.pods_total),
                        w.services.to_string(),
                    ]
                })
                .collect::<Vec<_>>(),
        );
    }

    if !stack.endpoints.is_empty() {
        println!();
        println!("Endpoints:");
        for endpoint in &stack.endpoints {
            println!(
                "  {}/{}: http://{}",
                endpoint.namespace, endpoint.service, endpoint.ip
            );
        }
    }
    Ok(())
}
