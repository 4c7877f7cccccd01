pub mod deploy;
pub mod init;
pub mod status;
pub mod teardown;
pub mod traffic;

use std::io::Write;

use observ_core::pipeline::{Advance, PhaseOutcome, PipelineRun};

/// Record a phase outcome and print it before the next phase starts.
pub fn conclude(
    run: &mut PipelineRun,
    phase: &str,
    outcome: PhaseOutcome,
) -> observ_core::Result<Advance> {
    let advance = run.finish(phase, outcome)?;
    if let Some(record) = run.phases().iter().find(|p| p.name == phase) {
        println!("[{phase}] {}", record.status);
    }
    Ok(advance)
}

/// Skip a toggled-off phase, printing it like any other outcome.
pub fn skip_phase(run: &mut PipelineRun, phase: &str) -> observ_core::Result<Advance> {
    let advance = run.skip(phase)?;
    println!("[{phase}] skipped");
    Ok(advance)
}

/// Prompt for a yes/no answer on stdin. Anything but an explicit yes is a
/// decline.
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N]: ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
