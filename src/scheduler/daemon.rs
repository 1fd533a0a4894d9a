use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info};

use crate::scheduler::{cadence::DailyCadence, jobs::BatchRunner};

/// 毎日決まった UTC 時刻に週次バッチを起動する常駐タスクを生成する。
///
/// バッチ自体が「生成すべきか」をユーザーごとに判定するため、デーモンは
/// 毎日同じ時刻に起動するだけでよい。
pub fn spawn_weekly_batch_daemon(runner: BatchRunner, hour: u32, minute: u32) -> JoinHandle<()> {
    BatchDaemon::new(runner, DailyCadence::new(hour, minute)).spawn()
}

struct BatchDaemon {
    runner: BatchRunner,
    cadence: DailyCadence,
}

impl BatchDaemon {
    fn new(runner: BatchRunner, cadence: DailyCadence) -> Self {
        Self { runner, cadence }
    }

    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        loop {
            let now = Utc::now();
            let next = self.cadence.next_run_from(now);
            let wait = duration_until(next, now);
            info!(
                next_run_utc = %next.to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled automatic weekly podcast batch"
            );
            sleep(wait).await;

            match self.runner.run_weekly().await {
                Ok(outcome) => info!(
                    generated = outcome.generated,
                    skipped = outcome.skipped,
                    errors = outcome.errors,
                    "automatic weekly batch completed"
                ),
                Err(err) => error!(error = ?err, "automatic weekly batch failed"),
            }
        }
    }
}

fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
