//! Preflight checks: required CLI tools present and new enough.

use tracing::debug;

use crate::error::{ObservError, Result};
use crate::exec::{self, CommandSpec};

#[derive(Debug, Clone, Copy)]
pub struct ToolRequirement {
    pub name: &'static str,
    pub min_version: &'static str,
    pub install_url: &'static str,
}

pub const REQUIRED_TOOLS: &[ToolRequirement] = &[
    ToolRequirement {
        name: "gcloud",
        min_version: "450.0.0",
        install_url: "https://cloud.google.com/sdk/docs/install",
    },
    ToolRequirement {
        name: "terraform",
        min_version: "1.6.0",
        install_url: "https://developer.hashicorp.com/terraform/install",
    },
    ToolRequirement {
        name: "kubectl",
        min_version: "1.28.0",
        install_url: "https://kubernetes.io/docs/tasks/tools/",
    },
];

/// Verify every required tool is on PATH and meets its minimum version.
/// Stops at the first problem so the operator fixes one thing at a time.
pub async fn check_tools() -> Result<()> {
    for tool in REQUIRED_TOOLS {
        if which::which(tool.name).is_err() {
            return Err(ObservError::ToolMissing {
                tool: tool.name.to_string(),
                install_url: tool.install_url.to_string(),
            });
        }
        let found = detect_version(tool.name).await?;
        debug!(tool = tool.name, version = %found, "tool detected");
        if compare_versions(&found, tool.min_version) == std::cmp::Ordering::Less {
            return Err(ObservError::ToolOutdated {
                tool: tool.name.to_string(),
                found,
                required: tool.min_version.to_string(),
                install_url: tool.install_url.to_string(),
            });
        }
    }
    Ok(())
}

async fn detect_version(tool: &str) -> Result<String> {
    let spec = match tool {
        "kubectl" => CommandSpec::new("kubectl").args(["version", "--client", "--output=json"]),
        _ => CommandSpec::new(tool).arg("--version"),
    };
    let result = exec::run(&spec).await;
    if !result.success() {
        return Err(ObservError::CommandFailed {
            command: spec.display(),
            stderr: result.diagnostic().to_string(),
        });
    }
    parse_version_output(tool, &result.stdout).ok_or_else(|| ObservError::CommandFailed {
        command: spec.display(),
        stderr: format!("could not parse version from: {}", result.stdout),
    })
}

fn parse_version_output(tool: &str, output: &str) -> Option<String> {
    match tool {
        // "Google Cloud SDK 456.0.0" somewhere in the banner.
        "gcloud" => output
            .lines()
            .find_map(|line| line.strip_prefix("Google Cloud SDK "))
            .map(|rest| rest.trim().to_string()),
        // "Terraform v1.7.5" on the first line.
        "terraform" => output
            .lines()
            .next()?
            .strip_prefix("Terraform v")
            .map(|rest| rest.split_whitespace().next().unwrap_or(rest).to_string()),
        // {"clientVersion": {"gitVersion": "v1.29.1", ...}}
        "kubectl" => {
            let parsed: serde_json::Value = serde_json::from_str(output).ok()?;
            parsed["clientVersion"]["gitVersion"]
                .as_str()
                .map(|v| v.trim_start_matches('v').to_string())
        }
        _ => None,
    }
}

/// Compare dotted numeric versions component by component. Missing
/// components count as zero, so "1.6" equals "1.6.0".
fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| {
                part.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}
