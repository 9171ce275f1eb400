use crate::ProviderArgs;
use crate::runtime_context::{self, ProgressMode};
use anyhow::{Context, Result, anyhow};
use patchloop_config::CliRunOverrides;
use patchloop_core::{LogEntry, ProjectFileSet, SessionState, Status, export_dir, import_dir};
use patchloop_engine::{BoaEngine, JsEngine};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub(crate) struct RunRequest {
    pub(crate) dir: PathBuf,
    pub(crate) provider: ProviderArgs,
    pub(crate) max_retries: Option<usize>,
    pub(crate) settle_ms: Option<u64>,
    pub(crate) hint: Option<String>,
    /// Where the repaired files go, if anywhere.
    pub(crate) export: Option<PathBuf>,
    pub(crate) report: Option<PathBuf>,
}

fn load_project(dir: &Path, progress: ProgressMode) -> Result<ProjectFileSet> {
    let report = import_dir(dir).with_context(|| format!("failed loading project {}", dir.display()))?;
    for failure in &report.failures {
        progress.note(&format!(
            "warning: skipped {}: {}",
            failure.path.display(),
            failure.reason
        ));
    }
    if report.files.is_empty() {
        progress.note(&format!("warning: no files found in {}", dir.display()));
    }
    Ok(report.files)
}

fn repair(
    dir: &Path,
    provider: &ProviderArgs,
    overrides: CliRunOverrides,
) -> Result<(SessionState, ProgressMode)> {
    let resolved = runtime_context::resolve_config(provider, &overrides)?;
    let progress = runtime_context::resolved_progress_mode(resolved.progress, resolved.verbose);
    let files = load_project(dir, progress)?;

    let mut repair_loop = runtime_context::build_repair_loop(&resolved, overrides.model.clone());
    let mut session = SessionState::new(files, resolved.max_retries);
    let cancel = runtime_context::interrupt_token()?;
    let mut observer = |entry: &LogEntry| progress.report(entry);

    repair_loop
        .run(&mut session, &cancel, &mut observer)
        .context("repair run could not start")?;
    Ok((session, progress))
}

pub(crate) fn run_command(request: RunRequest) -> Result<()> {
    let overrides = runtime_context::cli_overrides(&request.provider);
    let overrides = CliRunOverrides {
        max_retries: request.max_retries,
        settle_delay_ms: request.settle_ms,
        hint: request.hint.clone(),
        ..overrides
    };

    let (session, progress) = repair(&request.dir, &request.provider, overrides)?;

    if let Some(fix) = session.last_fix() {
        progress.note(&format!("analysis: {}", fix.error_analysis));
    }

    if let Some(report) = request.report.as_deref() {
        let json = serde_json::to_string_pretty(&session).context("failed encoding session report")?;
        fs::write(report, json)
            .with_context(|| format!("failed writing session report {}", report.display()))?;
    }

    if session.status() != Status::Success {
        return Err(anyhow!(
            "repair run ended {} after {} repair cycle(s)",
            session.status(),
            session.retry_count()
        ));
    }

    if let Some(target) = request.export.as_deref() {
        let written = export_dir(session.files(), target)
            .with_context(|| format!("failed exporting project to {}", target.display()))?;
        info!(files = written.len(), target = %target.display(), "exported project");
        progress.note(&format!(
            "wrote {} file(s) to {}",
            written.len(),
            target.display()
        ));
    }
    Ok(())
}

pub(crate) fn check_command(dir: PathBuf, provider: ProviderArgs) -> Result<()> {
    let overrides = CliRunOverrides {
        max_retries: Some(0),
        ..runtime_context::cli_overrides(&provider)
    };
    let (session, _) = repair(&dir, &provider, overrides)?;
    if session.status() != Status::Success {
        return Err(anyhow!("{} failed", dir.display()));
    }
    Ok(())
}

pub(crate) fn eval_command(code: String) -> Result<()> {
    let mut engine = BoaEngine::new();
    let out = engine.eval_script(&code, "<eval>")?;
    for line in &out.console {
        println!("{line}");
    }
    if let Some(error) = out.thrown {
        return Err(anyhow!("uncaught error: {error}"));
    }
    if let Some(value) = out.value {
        println!("{value}");
    }
    Ok(())
}
