use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use learning_analytics::analytics::{
    ActivityEvent, AnalyticsConfig, AnalyticsEngine, InMemoryActivityRepository,
    InMemoryProfileRepository, JsonFileProfileRepository, ManualClock, ProfileRepository,
};
use learning_analytics::config::Config;
use learning_analytics::logging::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    // Dropped on return so buffered file logs are flushed on every exit path.
    let _log_guard = init_tracing(&config.log_level);

    let source = std::env::args().nth(1);
    match run(&config, source.as_deref()).await {
        Ok(stats) => {
            tracing::info!(
                applied = stats.applied,
                rejected = stats.rejected,
                users = stats.users,
                "replay finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "replay aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config, source: Option<&str>) -> std::io::Result<ReplayStats> {
    let analytics_config = AnalyticsConfig::from_env();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let profiles: Arc<dyn ProfileRepository> = match &config.data_dir {
        Some(dir) => {
            tracing::info!(data_dir = %dir.display(), "using file profile repository");
            Arc::new(JsonFileProfileRepository::new(dir.clone()))
        }
        None => Arc::new(InMemoryProfileRepository::new()),
    };
    let engine = AnalyticsEngine::new(
        analytics_config,
        clock.clone(),
        profiles,
        Arc::new(InMemoryActivityRepository::new()),
    );

    match source {
        Some(path) if path != "-" => {
            let file = tokio::fs::File::open(path).await.map_err(|err| {
                tracing::error!(path = %path, error = %err, "failed to open event file");
                err
            })?;
            tracing::info!(path = %path, "replaying event file");
            replay(&engine, &clock, BufReader::new(file)).await
        }
        _ => replay(&engine, &clock, BufReader::new(tokio::io::stdin())).await,
    }
}

#[derive(Debug, Default)]
struct ReplayStats {
    applied: usize,
    rejected: usize,
    users: usize,
}

async fn replay<R>(
    engine: &AnalyticsEngine,
    clock: &ManualClock,
    reader: R,
) -> std::io::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = ReplayStats::default();
    let mut users = BTreeSet::new();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(line = line_no, "interrupted, stopping replay");
                break;
            }
        };
        let Some(line) = line else { break };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event: ActivityEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                stats.rejected += 1;
                tracing::warn!(line = line_no, error = %err, "malformed event");
                println!("{}", json!({ "line": line_no, "error": err.to_string() }));
                continue;
            }
        };
        if let Some(at) = event.occurred_at {
            clock.set(at);
        }

        match engine.apply_event(&event).await {
            Ok(outcome) => {
                stats.applied += 1;
                users.insert(event.user_id.clone());
                println!("{}", json!({ "line": line_no, "result": outcome }));
            }
            Err(err) => {
                stats.rejected += 1;
                println!("{}", json!({ "line": line_no, "error": err.to_string() }));
            }
        }
    }

    for user_id in &users {
        match engine.progress_snapshot(user_id).await {
            Ok(snapshot) => println!("{}", json!({ "snapshot": snapshot })),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "failed to build progress snapshot")
            }
        }
    }

    stats.users = users.len();
    Ok(stats)
}
