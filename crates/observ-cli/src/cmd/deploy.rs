use std::path::Path;

use anyhow::{bail, Context};
use observ_core::config::Config;
use observ_core::exec;
use observ_core::kube::{self, MutationOutcome};
use observ_core::pipeline::{self, Advance, PhaseOutcome, PipelineOutcome, PipelineRun};
use observ_core::readiness::{self, all_pods_ready};
use observ_core::terraform::Workspace;
use observ_core::{gcloud, notify, preflight};
use tracing::{info, warn};

use crate::output;

pub struct DeployArgs {
    pub auto_approve: bool,
    pub notify_emails: Vec<String>,
    pub notify_slack: Option<String>,
    pub no_otel: bool,
    pub no_microservices: bool,
    pub no_monitoring: bool,
}

pub fn run(config_path: &Path, args: DeployArgs) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    apply_overrides(&mut config, &args)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        preflight::check_tools().await?;
        let account = gcloud::ensure_authenticated().await?;
        gcloud::ensure_project_accessible(&config.gcp.project_id).await?;
        match gcloud::billing_account_open(&config.gcp.billing_account).await {
            Ok(true) => {}
            Ok(false) => bail!(
                "billing account {} is closed",
                config.gcp.billing_account
            ),
            Err(e) => warn!("could not verify billing account: {e}"),
        }
        gcloud::set_default_project(&config.gcp.project_id).await?;
        info!(project = %config.gcp.project_id, %account, "preflight passed");

        let mut run = PipelineRun::deploy();
        execute(&mut run, &config, &args).await?;
        report(&run)
    })
}

fn apply_overrides(config: &mut Config, args: &DeployArgs) -> anyhow::Result<()> {
    for email in &args.notify_emails {
        if !config.monitoring.email_notifications.contains(email) {
            config.monitoring.email_notifications.push(email.clone());
        }
    }
    if let Some(webhook) = &args.notify_slack {
        config.monitoring.slack_webhook = Some(webhook.clone());
    }
    if args.no_otel {
        config.deployment.deploy_opentelemetry = false;
    }
    if args.no_microservices {
        config.deployment.deploy_microservices = false;
    }
    if args.no_monitoring {
        config.deployment.deploy_monitoring = false;
    }
    // Overrides can introduce invalid addresses or webhooks.
    config.validate().context("invalid notification override")?;
    Ok(())
}

async fn execute(run: &mut PipelineRun, config: &Config, args: &DeployArgs) -> anyhow::Result<()> {
    let workspace = Workspace::new(&config.terraform.dir);

    // infrastructure-plan
    run.begin(pipeline::PLAN)?;
    let outcome = plan_phase(&workspace, config).await;
    if crate::cmd::conclude(run, pipeline::PLAN, outcome)? == Advance::Halt {
        return Ok(());
    }

    // user-confirmation
    run.begin(pipeline::CONFIRM)?;
    let outcome = if args.auto_approve {
        PhaseOutcome::Success
    } else {
        let prompt = format!(
            "Deploy the demo stack to project '{}' in {}? Billable resources will be created",
            config.gcp.project_id, config.gcp.region
        );
        if crate::cmd::confirm(&prompt)? {
            PhaseOutcome::Success
        } else {
            PhaseOutcome::Declined
        }
    };
    if crate::cmd::conclude(run, pipeline::CONFIRM, outcome)? == Advance::Halt {
        return Ok(());
    }

    // infrastructure-apply
    run.begin(pipeline::APPLY)?;
    println!("Provisioning infrastructure (this can take 20+ minutes)...");
    let result = workspace
        .apply(|percent| println!("  progress: {percent}%"))
        .await;
    let outcome = if result.success() {
        PhaseOutcome::Success
    } else if result.stderr.contains("timed out after") {
        PhaseOutcome::TimedOut { diagnostic: result.diagnostic().to_string() }
    } else {
        PhaseOutcome::Failed {
            diagnostic: result.diagnostic().to_string(),
            retry_command: Some(workspace.apply_retry_command()),
        }
    };
    if crate::cmd::conclude(run, pipeline::APPLY, outcome)? == Advance::Halt {
        return Ok(());
    }

    // extract-outputs
    run.begin(pipeline::EXTRACT_OUTPUTS)?;
    let outputs = workspace.outputs().await?;
    // Later phases cannot run without these.
    let missing: Vec<&str> = ["cluster_name", "project_id", "region"]
        .into_iter()
        .filter(|key| !outputs.contains_key(*key))
        .collect();
    let outcome = if missing.is_empty() {
        for key in ["cluster_name", "project_id", "region"] {
            run.record_output(key, outputs[key].clone());
        }
        PhaseOutcome::Success
    } else {
        PhaseOutcome::Failed {
            diagnostic: format!("missing required stack output: {}", missing.join(", ")),
            retry_command: None,
        }
    };
    if crate::cmd::conclude(run, pipeline::EXTRACT_OUTPUTS, outcome)? == Advance::Halt {
        return Ok(());
    }
    let cluster = run.output("cluster_name").unwrap_or_default().to_string();
    let project = run.output("project_id").unwrap_or_default().to_string();
    let region = run.output("region").unwrap_or_default().to_string();

    // configure-cluster-access
    run.begin(pipeline::CONFIGURE_ACCESS)?;
    let spec = gcloud::get_credentials_command(&cluster, &region, &project);
    let result = exec::run(&spec).await;
    let outcome = if result.success() {
        PhaseOutcome::Success
    } else {
        PhaseOutcome::Failed {
            diagnostic: result.diagnostic().to_string(),
            retry_command: Some(spec.display()),
        }
    };
    if crate::cmd::conclude(run, pipeline::CONFIGURE_ACCESS, outcome)? == Advance::Halt {
        return Ok(());
    }

    // verify-cluster-access
    run.begin(pipeline::VERIFY_ACCESS)?;
    let result = kube::cluster_reachable().await;
    let outcome = if result.success() {
        PhaseOutcome::Success
    } else {
        PhaseOutcome::Failed {
            diagnostic: format!("cluster API not reachable: {}", result.diagnostic()),
            retry_command: None,
        }
    };
    if crate::cmd::conclude(run, pipeline::VERIFY_ACCESS, outcome)? == Advance::Halt {
        return Ok(());
    }

    // deploy-opentelemetry (collector plus the monitoring workloads)
    let mut deployed_namespaces = Vec::new();
    if config.deployment.deploy_opentelemetry || config.deployment.deploy_monitoring {
        run.begin(pipeline::DEPLOY_OTEL)?;
        let mut targets = Vec::new();
        if config.deployment.deploy_opentelemetry {
            targets.push("opentelemetry");
        }
        if config.deployment.deploy_monitoring {
            targets.push("monitoring");
        }
        let outcome = deploy_workloads(config, &targets, &mut deployed_namespaces).await;
        if crate::cmd::conclude(run, pipeline::DEPLOY_OTEL, outcome)? == Advance::Halt {
            return Ok(());
        }
    } else if crate::cmd::skip_phase(run, pipeline::DEPLOY_OTEL)? == Advance::Halt {
        return Ok(());
    }

    // deploy-microservices
    if config.deployment.deploy_microservices {
        run.begin(pipeline::DEPLOY_MICROSERVICES)?;
        let outcome = deploy_workloads(config, &["microservices"], &mut deployed_namespaces).await;
        if crate::cmd::conclude(run, pipeline::DEPLOY_MICROSERVICES, outcome)? == Advance::Halt {
            return Ok(());
        }
    } else if crate::cmd::skip_phase(run, pipeline::DEPLOY_MICROSERVICES)? == Advance::Halt {
        return Ok(());
    }

    // wait-ready
    run.begin(pipeline::WAIT_READY)?;
    let mut unready = Vec::new();
    for namespace in &deployed_namespaces {
        println!("Waiting for pods in {namespace} to become ready...");
        let query = kube::pod_readiness_query(namespace);
        if !readiness::wait_until_ready(&query, all_pods_ready).await {
            unready.push(namespace.clone());
        }
    }
    let outcome = if unready.is_empty() {
        PhaseOutcome::Success
    } else {
        PhaseOutcome::TimedOut {
            diagnostic: format!("pods not ready in: {}", unready.join(", ")),
        }
    };
    if crate::cmd::conclude(run, pipeline::WAIT_READY, outcome)? == Advance::Halt {
        return Ok(());
    }

    // notify
    run.begin(pipeline::NOTIFY)?;
    let channels = notify::channels(
        config.monitoring.slack_webhook.as_deref(),
        &config.monitoring.email_notifications,
    );
    let outcome = if channels.is_empty() {
        PhaseOutcome::Success
    } else {
        let message = format!(
            "Observability demo deployed: cluster '{cluster}' in {region} (project {project})"
        );
        let failures = notify::dispatch(&channels, &message).await;
        if failures.is_empty() {
            PhaseOutcome::Success
        } else {
            PhaseOutcome::Failed { diagnostic: failures.join("; "), retry_command: None }
        }
    };
    crate::cmd::conclude(run, pipeline::NOTIFY, outcome)?;
    Ok(())
}

async fn plan_phase(workspace: &Workspace, config: &Config) -> PhaseOutcome {
    let bucket = config
        .terraform
        .state_bucket_name
        .clone()
        .unwrap_or_default();
    let result = workspace.init(&bucket, &config.terraform.state_prefix).await;
    if !result.success() {
        return PhaseOutcome::Failed {
            diagnostic: format!("terraform init failed: {}", result.diagnostic()),
            retry_command: None,
        };
    }
    let result = workspace.validate().await;
    if !result.success() {
        return PhaseOutcome::Failed {
            diagnostic: format!("terraform validate failed: {}", result.diagnostic()),
            retry_command: None,
        };
    }
    let var_file = match workspace.write_var_file(&config.to_terraform_vars()) {
        Ok(path) => path,
        Err(e) => {
            return PhaseOutcome::Failed {
                diagnostic: format!("could not write terraform variables: {e}"),
                retry_command: None,
            }
        }
    };
    let result = workspace.plan(Some(&var_file)).await;
    if result.success() {
        PhaseOutcome::Success
    } else if result.stderr.contains("timed out after") {
        PhaseOutcome::TimedOut { diagnostic: result.diagnostic().to_string() }
    } else {
        PhaseOutcome::Failed {
            diagnostic: result.diagnostic().to_string(),
            retry_command: None,
        }
    }
}

/// Create each namespace and apply its manifests. Conflicts on create are
/// fine; manifest failures are not.
async fn deploy_workloads(
    config: &Config,
    namespaces: &[&str],
    deployed: &mut Vec<String>,
) -> PhaseOutcome {
    let mut conflicts = Vec::new();
    for namespace in namespaces {
        match kube::ensure_namespace(namespace).await {
            MutationOutcome::Applied => {}
            MutationOutcome::AlreadySettled { diagnostic } => conflicts.push(diagnostic),
            MutationOutcome::Failed { diagnostic } => {
                return PhaseOutcome::Failed {
                    diagnostic: format!("creating namespace {namespace}: {diagnostic}"),
                    retry_command: Some(format!("kubectl create namespace {namespace}")),
                }
            }
        }
        let manifest = config.deployment.manifest_dir.join(namespace);
        match kube::apply_manifest(&manifest, namespace).await {
            MutationOutcome::Applied | MutationOutcome::AlreadySettled { .. } => {
                deployed.push(namespace.to_string());
            }
            MutationOutcome::Failed { diagnostic } => {
                return PhaseOutcome::Failed {
                    diagnostic: format!("applying manifests for {namespace}: {diagnostic}"),
                    retry_command: Some(format!(
                        "kubectl apply -f {} -n {namespace}",
                        manifest.display()
                    )),
                }
            }
        }
    }
    if conflicts.is_empty() {
        PhaseOutcome::Success
    } else {
        PhaseOutcome::Conflict { diagnostic: conflicts.join("; ") }
    }
}

fn report(run: &PipelineRun) -> anyhow::Result<()> {
    let report = run.report();
    println!();
    output::print_table(
        &["PHASE", "STATUS", "DETAIL"],
        &report
            .phases
            .iter()
            .map(|p| {
                vec![
                    p.name.to_string(),
                    p.status.to_string(),
                    p.detail.clone().unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>(),
    );
    println!();

    match report.outcome {
        PipelineOutcome::Success => {
            println!("Deployment complete.");
            if let Some(cluster) = run.output("cluster_name") {
                println!("Cluster: {cluster}");
            }
            println!("Run 'observ-demo status' to see workload health and endpoints.");
            Ok(())
        }
        PipelineOutcome::Partial => {
            println!("Deployment finished with warnings:");
            for warning in &report.warnings {
                println!("  - {warning}");
            }
            Ok(())
        }
        PipelineOutcome::Declined => {
            println!("Deployment cancelled. Nothing was created.");
            Ok(())
        }
        PipelineOutcome::Aborted => {
            let phase = report.failed_phase.unwrap_or_default();
            let detail = report
                .phases
                .iter()
                .find(|p| p.name == phase)
                .and_then(|p| p.detail.clone())
                .unwrap_or_default();
            match report.retry_command {
                Some(retry) => bail!(
                    "deployment failed during {phase}: {detail}\nafter fixing the cause, re-run: {retry}"
                ),
                None => bail!("deployment failed during {phase}: {detail}"),
            }
        }
    }
}
