mod bootstrap;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use timerow_core::formatting::format_concentration;
use timerow_core::models::{PublishOutcome, SourceKind};
use timerow_core::secrets::Secrets;
use timerow_core::settings::{Action, Settings};
use timerow_core::time_utils::format_time;
use timerow_data::history::HistoryStore;
use timerow_data::summary::DatasetSummary;
use timerow_data::views::DailyProfileView;
use timerow_runtime::intake;
use timerow_runtime::orchestrator::{
    Credential, PublishConfig, PublishOrchestrator, COMMIT_MESSAGE,
};
use timerow_runtime::vcs::GitCli;
use timerow_runtime::watch::{Heartbeat, IntakeWatcher};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let settings = Settings::load();

    bootstrap::ensure_directories(&settings.intake_dir(), &settings.output_dir())?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("timerow v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Project: {}, intake: {}, dataset: {}",
        settings.project_dir.display(),
        settings.intake_dir().display(),
        settings.dataset_path().display()
    );

    let code = match settings.action() {
        Action::Run { no_publish, json } => run_once(&settings, None, !no_publish, json).await?,

        Action::Submit { file, json } => match intake::deliver(&file, &settings.intake_dir()) {
            Ok(target) => run_once(&settings, Some(target), true, json).await?,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },

        Action::Watch {
            interval_secs,
            heartbeat_secs,
        } => watch(&settings, interval_secs, heartbeat_secs).await?,

        Action::Summary => {
            print_summary(&settings)?;
            0
        }

        Action::Profile { kind, json } => {
            print_profile(&settings, kind, json)?;
            0
        }
    };

    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

// ── Subcommands ────────────────────────────────────────────────────────────────

/// One publish run. Returns the process exit code.
async fn run_once(
    settings: &Settings,
    raw: Option<PathBuf>,
    publish: bool,
    json: bool,
) -> Result<i32> {
    let credential = if publish {
        match load_credential(settings) {
            Some(credential) => Some(credential),
            None => return Ok(1),
        }
    } else {
        None
    };

    let mut orchestrator = build_orchestrator(settings, publish, credential);
    let outcome = tokio::task::spawn_blocking(move || orchestrator.run(raw.as_deref())).await?;

    report(&outcome, json)?;
    if !json && outcome.exit_code() == 0 {
        if let Err(e) = print_summary(settings) {
            tracing::warn!("Could not summarize dataset: {}", e);
        }
    }
    Ok(outcome.exit_code())
}

async fn watch(settings: &Settings, interval_secs: u64, heartbeat_secs: u64) -> Result<i32> {
    let Some(credential) = load_credential(settings) else {
        return Ok(1);
    };
    let orchestrator = build_orchestrator(settings, true, Some(credential));

    tracing::info!(
        "Watching {} every {}s",
        settings.intake_dir().display(),
        interval_secs
    );
    let heartbeat = Heartbeat::start(Duration::from_secs(heartbeat_secs.max(1)));
    let (mut rx, handle) =
        IntakeWatcher::new(orchestrator, Duration::from_secs(interval_secs.max(1))).start();

    loop {
        tokio::select! {
            outcome = rx.recv() => match outcome {
                Some(outcome) => report(&outcome, false)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping watcher");
                break;
            }
        }
    }

    handle.abort();
    heartbeat.abort();
    Ok(0)
}

fn print_summary(settings: &Settings) -> Result<()> {
    let series = HistoryStore::new(settings.dataset_path()).load()?;
    print!("{}", DatasetSummary::from_series(&series));
    Ok(())
}

fn print_profile(settings: &Settings, kind: SourceKind, json: bool) -> Result<()> {
    let series = HistoryStore::new(settings.dataset_path()).load()?;
    let view = DailyProfileView::from_series(&series, settings.bucket_size(), kind)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!(
        "Typical day ({}, {}-minute buckets)",
        view.kind, view.bucket_minutes
    );
    if view.points.is_empty() {
        println!("No {} readings.", view.kind);
    }
    for point in &view.points {
        println!(
            "{}  {}  ±{:.1}  (n={})",
            point.time,
            format_concentration(point.mean),
            point.std_dev,
            point.sample_count
        );
    }
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────────────

/// Load the publish credential; prints the error and returns `None` when the
/// secrets file is missing or incomplete.
fn load_credential(settings: &Settings) -> Option<Credential> {
    match Secrets::load_or_init(&settings.secrets_path()) {
        Ok(secrets) => Some(Credential::new(secrets.github_token)),
        Err(e) => {
            eprintln!("Error: {}", e);
            None
        }
    }
}

fn build_orchestrator(
    settings: &Settings,
    publish: bool,
    credential: Option<Credential>,
) -> PublishOrchestrator {
    let config = PublishConfig {
        intake_dir: settings.intake_dir(),
        dataset_path: settings.dataset_path(),
        views_path: Some(settings.views_path()),
        bucket_size: settings.bucket_size(),
        remote: settings.remote.clone(),
        branch: settings.branch.clone(),
        commit_message: COMMIT_MESSAGE.to_string(),
        publish,
        credential,
    };
    PublishOrchestrator::new(config, Box::new(GitCli::new(&settings.project_dir)))
}

fn report(outcome: &PublishOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        let stamp = chrono::Local::now().naive_local().time();
        println!("[{}] {}", format_time(&stamp), outcome.message);
    }
    Ok(())
}
