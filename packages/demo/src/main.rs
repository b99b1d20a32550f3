//! Submits a batch of sleeping jobs under one queue and waits for it to drain.

use std::time::Duration;

use actors::{JobThrottle, SubmitOptions, ThrottleConfig, ThrottleError, Work};
use serde_json::json;
use throttle_core::JobResult;

const QUEUE: &str = "demo";
const JOBS: u64 = 8;

fn sleeper(index: u64) -> Work {
    let nap = Duration::from_millis(100 + 50 * (index % 4));
    Work::new(move || async move {
        tokio::time::sleep(nap).await;
        Ok(JobResult::with_output(
            format!("job {index} slept"),
            json!({ "slept_ms": nap.as_millis() as u64 }),
        ))
    })
    .with_label(format!("sleeper-{index}"))
}

#[tokio::main]
async fn main() -> Result<(), ThrottleError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = ThrottleConfig::from_env()?;
    tracing::info!(cap = %config.default_cap, "Starting throttle demo");
    let throttle = JobThrottle::new(config)?;

    let mut works: Vec<Work> = (0..JOBS).map(sleeper).collect();
    works.push(Work::new(|| async { Err("simulated failure".to_string()) }).with_label("broken"));

    let submission = throttle
        .submit_all(QUEUE, works, SubmitOptions::default().wait_for_drain())
        .await?;

    if let Some(report) = submission.drain {
        tracing::info!(
            queue = %report.queue,
            succeeded = report.succeeded(),
            total = report.outcomes.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Queue drained"
        );
        for job in report.failures() {
            tracing::warn!(
                job_id = %job.job_id,
                label = ?job.label,
                "Job failed: {}",
                job.error().map(ToString::to_string).unwrap_or_default()
            );
        }
    }

    throttle.shutdown().await;
    Ok(())
}
