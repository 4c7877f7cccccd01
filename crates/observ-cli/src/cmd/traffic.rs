use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use observ_core::config::Config;
use observ_core::kube;
use observ_core::traffic::{self, TrafficPattern};
use tracing::warn;

pub fn run(
    config_path: &Path,
    pattern: &str,
    duration: Option<Duration>,
    target_url: Option<&str>,
    namespace: &str,
    service: &str,
) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let pattern: TrafficPattern = pattern.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let duration = duration.unwrap_or_else(|| pattern.default_duration());

    if !config.deployment.enable_traffic_generation {
        warn!("traffic generation is disabled in the configuration, running anyway");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let target = match target_url {
            Some(url) => url.to_string(),
            None => discover_frontend(namespace, service).await?,
        };

        println!(
            "Generating {pattern} traffic against {target} for {}s ({} users)",
            duration.as_secs(),
            pattern.users()
        );
        let report = traffic::run_load(&target, pattern, duration, || {
            rand::random::<f64>()
        })
        .await;

        println!(
            "Done: {} requests sent, {} failed",
            report.requests_sent, report.requests_failed
        );
        Ok(())
    })
}

/// Find the external IP of the frontend LoadBalancer service.
async fn discover_frontend(namespace: &str, service: &str) -> anyhow::Result<String> {
    let endpoints = kube::loadbalancer_endpoints(namespace).await;
    match endpoints.iter().find(|(name, _)| name == service) {
        Some((_, ip)) => Ok(format!("http://{ip}")),
        None => bail!(
            "no external endpoint found for service '{service}' in namespace '{namespace}' \
             (is the stack deployed? pass --target-url to override)"
        ),
    }
}
