use std::path::Path;

use anyhow::bail;
use observ_core::config::Config;
use observ_core::kube::{self, MutationOutcome, WORKLOAD_NAMESPACES};
use observ_core::pipeline::{self, Advance, PhaseOutcome, PipelineOutcome, PipelineRun};
use observ_core::preflight;
use observ_core::terraform::Workspace;
use tracing::info;

use crate::output;

pub fn run(config_path: &Path, auto_approve: bool, cleanup_state: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        preflight::check_tools().await?;

        let mut run = PipelineRun::teardown();
        execute(&mut run, &config, auto_approve, cleanup_state).await?;
        report(&run)
    })
}

async fn execute(
    run: &mut PipelineRun,
    config: &Config,
    auto_approve: bool,
    cleanup_state: bool,
) -> anyhow::Result<()> {
    let workspace = Workspace::new(&config.terraform.dir);

    // delete-workload-namespaces. Failures here must not block the
    // infrastructure destroy, which removes the cluster anyway.
    run.begin(pipeline::DELETE_NAMESPACES)?;
    let mut already_gone = Vec::new();
    let mut failures = Vec::new();
    for namespace in WORKLOAD_NAMESPACES {
        println!("Deleting namespace {namespace}...");
        match kube::delete_namespace(namespace).await {
            MutationOutcome::Applied => info!(%namespace, "namespace deleted"),
            MutationOutcome::AlreadySettled { diagnostic } => already_gone.push(diagnostic),
            MutationOutcome::Failed { diagnostic } => {
                failures.push(format!("{namespace}: {diagnostic}"))
            }
        }
    }
    let outcome = if !failures.is_empty() {
        PhaseOutcome::Failed { diagnostic: failures.join("; "), retry_command: None }
    } else if !already_gone.is_empty() {
        PhaseOutcome::Conflict { diagnostic: already_gone.join("; ") }
    } else {
        PhaseOutcome::Success
    };
    if crate::cmd::conclude(run, pipeline::DELETE_NAMESPACES, outcome)? == Advance::Halt {
        return Ok(());
    }

    // user-confirmation
    run.begin(pipeline::CONFIRM)?;
    let outcome = if auto_approve {
        PhaseOutcome::Success
    } else {
        let prompt = format!(
            "Destroy ALL infrastructure for project '{}'? This cannot be undone",
            config.gcp.project_id
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

    // infrastructure-destroy
    run.begin(pipeline::DESTROY)?;
    println!("Destroying infrastructure (this can take a while)...");
    let bucket = config.terraform.state_bucket_name.clone().unwrap_or_default();
    let init = workspace.init(&bucket, &config.terraform.state_prefix).await;
    let outcome = if !init.success() {
        PhaseOutcome::Failed {
            diagnostic: format!("terraform init failed: {}", init.diagnostic()),
            retry_command: None,
        }
    } else {
        let var_file = workspace.write_var_file(&config.to_terraform_vars()).ok();
        let result = workspace.destroy(var_file.as_deref()).await;
        if result.success() {
            PhaseOutcome::Success
        } else if result.stderr.contains("timed out after") {
            PhaseOutcome::TimedOut { diagnostic: result.diagnostic().to_string() }
        } else {
            PhaseOutcome::Failed {
                diagnostic: result.diagnostic().to_string(),
                retry_command: Some(format!(
                    "cd {} && terraform destroy",
                    workspace.dir().display()
                )),
            }
        }
    };
    if crate::cmd::conclude(run, pipeline::DESTROY, outcome)? == Advance::Halt {
        return Ok(());
    }

    // state-cleanup. Preserved by default so a botched destroy can be
    // retried against the same state.
    if !cleanup_state {
        crate::cmd::skip_phase(run, pipeline::STATE_CLEANUP)?;
        return Ok(());
    }
    run.begin(pipeline::STATE_CLEANUP)?;
    let removed = workspace.clean_local_state();
    if !removed.is_empty() {
        info!(removed = removed.join(", "), "cleaned local terraform files");
    }
    crate::cmd::conclude(run, pipeline::STATE_CLEANUP, PhaseOutcome::Success)?;
    Ok(())
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
            println!("Teardown complete.");
            Ok(())
        }
        PipelineOutcome::Partial => {
            println!("Teardown finished with warnings:");
            for warning in &report.warnings {
                println!("  - {warning}");
            }
            Ok(())
        }
        PipelineOutcome::Declined => {
            println!("Teardown cancelled. Infrastructure was not touched.");
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
                    "teardown failed during {phase}: {detail}\nafter fixing the cause, re-run: {retry}"
                ),
                None => bail!("teardown failed during {phase}: {detail}"),
            }
        }
    }
}
