use std::future::Future;
use std::time::Duration;

use rolegate_core::AppResult;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs `task` every `interval` until `shutdown` is cancelled.
///
/// The first run happens immediately. A failing run is logged and the
/// schedule continues; runs never overlap.
pub async fn run_periodic<F, Fut>(
    task_name: &str,
    interval: Duration,
    shutdown: CancellationToken,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<()>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        task = task_name,
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "periodic task started"
    );

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let run = tokio::select! {
            () = shutdown.cancelled() => break,
            result = task() => result,
        };

        if let Err(error) = run {
            warn!(task = task_name, error = %error, "periodic task run failed");
        }
    }

    info!(task = task_name, "periodic task stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use rolegate_core::AppError;
    use tokio_util::sync::CancellationToken;

    use super::run_periodic;

    #[tokio::test(start_paused = true)]
    async fn runs_on_every_tick_until_cancelled() {
        let runs = &AtomicU32::new(0);
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();

        let task = run_periodic("count", Duration::from_secs(60), shutdown, move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let stop = async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            stopper.cancel();
        };

        tokio::join!(task, stop);

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_runs_do_not_stop_the_schedule() {
        let runs = &AtomicU32::new(0);
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();

        let task = run_periodic("fail", Duration::from_secs(10), shutdown, move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Internal("boom".to_owned()))
        });
        let stop = async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            stopper.cancel();
        };

        tokio::join!(task, stop);

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
