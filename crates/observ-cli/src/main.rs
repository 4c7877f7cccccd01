mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "observ-demo",
    about = "Deploy and tear down a GKE observability demo stack",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the deployment configuration
    #[arg(long, global = true, env = "OBSERV_CONFIG", default_value = "observ-demo.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init {
        /// GCP project ID
        #[arg(long)]
        project_id: String,

        /// Billing account in XXXXXX-XXXXXX-XXXXXX format
        #[arg(long)]
        billing_account: String,

        /// GCP region for the cluster
        #[arg(long, default_value = "us-central1")]
        region: String,

        /// Skip terraform init and validate
        #[arg(long)]
        skip_terraform: bool,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Provision infrastructure and deploy the demo workloads
    Deploy {
        /// Skip the confirmation prompt
        #[arg(long)]
        auto_approve: bool,

        /// Extra notification email (repeatable)
        #[arg(long = "notify-email")]
        notify_emails: Vec<String>,

        /// Slack webhook for the completion notification
        #[arg(long = "notify-slack")]
        notify_slack: Option<String>,

        /// Skip the OpenTelemetry workloads
        #[arg(long)]
        no_otel: bool,

        /// Skip the microservices workloads
        #[arg(long)]
        no_microservices: bool,

        /// Skip the monitoring workloads
        #[arg(long)]
        no_monitoring: bool,
    },

    /// Destroy the deployed stack
    Teardown {
        /// Skip the confirmation prompt
        #[arg(long)]
        auto_approve: bool,

        /// Also remove local terraform state and plan files
        #[arg(long)]
        cleanup_state: bool,
    },

    /// Show the health of the deployed stack
    Status {
        /// Output as JSON
        #[arg(long, short = 'j')]
        json: bool,
    },

    /// Send synthetic shop traffic at the deployed frontend
    GenerateTraffic {
        /// Traffic pattern: low, medium, high, or spike
        #[arg(long, default_value = "medium")]
        pattern: String,

        /// Duration in seconds (default depends on the pattern)
        #[arg(long)]
        duration: Option<u64>,

        /// Target URL (default: discover the frontend LoadBalancer)
        #[arg(long)]
        target_url: Option<String>,

        /// Namespace to discover the frontend in
        #[arg(long, default_value = "microservices")]
        namespace: String,

        /// Service to discover the endpoint of
        #[arg(long, default_value = "frontend")]
        service: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    // SIGINT mid-provisioning leaves child processes to die with us.
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\ninterrupted");
        std::process::exit(130);
    }) {
        eprintln!("warning: could not install interrupt handler: {e}");
    }

    let config_path = cli.config.clone();
    let result = match cli.command {
        Commands::Init {
            project_id,
            billing_account,
            region,
            skip_terraform,
            force,
        } => cmd::init::run(
            &config_path,
            &project_id,
            &billing_account,
            &region,
            skip_terraform,
            force,
        ),
        Commands::Deploy {
            auto_approve,
            notify_emails,
            notify_slack,
            no_otel,
            no_microservices,
            no_monitoring,
        } => cmd::deploy::run(
            &config_path,
            cmd::deploy::DeployArgs {
                auto_approve,
                notify_emails,
                notify_slack,
                no_otel,
                no_microservices,
                no_monitoring,
            },
        ),
        Commands::Teardown {
            auto_approve,
            cleanup_state,
        } => cmd::teardown::run(&config_path, auto_approve, cleanup_state),
        Commands::Status { json } => cmd::status::run(&config_path, json),
        Commands::GenerateTraffic {
            pattern,
            duration,
            target_url,
            namespace,
            service,
        } => cmd::traffic::run(
            &config_path,
            &pattern,
            duration.map(Duration::from_secs),
            target_url.as_deref(),
            &namespace,
            &service,
        ),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
