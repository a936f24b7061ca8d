//! `wd patrol`: supervise workers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use warden_core::cancel::CancelToken;
use warden_core::patrol::{Patrol, PatrolReport};
use warden_core::process::ProcessSpawner;

use super::Project;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct PatrolArgs {
    /// Run a single pass, wait for its escalations, and print the report.
    #[arg(long, conflicts_with = "for_secs")]
    pub once: bool,

    /// Stop after this many seconds instead of running until interrupted.
    #[arg(long, value_name = "SECS")]
    pub for_secs: Option<u64>,
}

fn write_report(report: &PatrolReport, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    writeln!(
        w,
        "checked={} ingested={} stale={} escalated={}",
        report.checked,
        report.ingested,
        report.stale.len(),
        report.escalated.len()
    )?;
    for id in &report.stale {
        writeln!(w, "stale: {id}")?;
    }
    for done in &report.finished {
        writeln!(w, "finished: {} {:?}", done.worker, done.outcome)?;
    }
    for id in &report.removed {
        writeln!(w, "removed: {id}")?;
    }
    Ok(())
}

/// Execute `wd patrol`.
///
/// # Errors
///
/// Uninitialized project, or the patrol thread could not be started.
pub fn run_patrol(args: &PatrolArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let project = Project::discover(project_root)?;
    let patrol = Arc::new(Patrol::new(
        &project.state_dir,
        &project.config,
        Arc::new(ProcessSpawner),
    ));
    let token = CancelToken::new();

    if args.once {
        let mut report = patrol.tick(&token);
        patrol.join_escalations();
        report.finished.extend(patrol.take_finished());
        return render(output, &report, write_report);
    }

    #[cfg(unix)]
    let signals = cancel_on_shutdown(&token)?;

    let launched = patrol.launch_configured();
    tracing::info!(root = %project.root.display(), launched, "configured workers started");

    let handle = patrol.spawn(token.clone())?;
    if let Some(secs) = args.for_secs {
        // Returns early only if a signal cancelled the token.
        let _ = token.wait_timeout(Duration::from_secs(secs));
        token.cancel();
    }
    let joined = handle.join();

    #[cfg(unix)]
    signals.close();

    if joined.is_err() {
        anyhow::bail!("patrol thread panicked");
    }
    Ok(())
}

/// Cancel `token` on the first SIGINT or SIGTERM. Closing the returned handle
/// stops the listener thread.
#[cfg(unix)]
fn cancel_on_shutdown(token: &CancelToken) -> std::io::Result<signal_hook::iterator::Handle> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let token = token.clone();
    std::thread::Builder::new()
        .name("warden-signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::info!(signal, "shutdown requested");
                token.cancel();
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::patrol::{EscalationOutcome, FinishedEscalation};

    #[test]
    fn report_text_lists_outcomes() {
        let report = PatrolReport {
            checked: 2,
            stale: vec!["w-1".into()],
            finished: vec![FinishedEscalation {
                worker: "w-1".into(),
                outcome: EscalationOutcome::Terminated,
            }],
            removed: vec!["w-1".into()],
            ..PatrolReport::default()
        };
        let mut buf = Vec::new();
        write_report(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("checked=2 ingested=0 stale=1 escalated=0\n"));
        assert!(text.contains("finished: w-1 Terminated\n"));
        assert!(text.contains("removed: w-1\n"));
    }
}
