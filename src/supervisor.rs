//! Process supervisor (spec §7 "Propagation policy": "Fatal errors
//! propagate to the supervisor, which restarts the task after a cooldown";
//! §5 "each long-running component runs as an independent supervised
//! task"). Each component's `run()` future is wrapped in a restart loop;
//! non-fatal return values (the loop exiting because an upstream stream
//! ended, say) are treated the same as `Fatal` for restart purposes, since
//! every component's `run()` is meant to loop forever.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

/// Cooldown before restarting a task whose `run()` returned (spec §7).
const RESTART_COOLDOWN: Duration = Duration::from_secs(5);
/// After this many consecutive restarts with no intervening healthy period,
/// stop restarting — a persistently crashing task is treated as fatal to
/// the whole process rather than spun forever.
const MAX_CONSECUTIVE_RESTARTS: u32 = 10;
/// A task that stays up at least this long resets its consecutive-restart
/// counter, so a flaky-then-fine task isn't permanently treated as crash-looping.
const HEALTHY_UPTIME_RESET: Duration = Duration::from_secs(60);

/// Spawns `make_future()` in a restart loop under `name`, logging and
/// cooling down between attempts. Returns the join handle for the
/// supervising task itself (not the underlying component task).
pub fn supervise<F, Fut>(name: &'static str, mut make_future: F) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut consecutive_restarts: u32 = 0;

        loop {
            let started_at = tokio::time::Instant::now();
            info!(component = name, "starting supervised task");

            let result = make_future().await;

            match result {
                Ok(()) => {
                    warn!(component = name, "supervised task exited cleanly; restarting");
                }
                Err(e) => {
                    error!(component = name, error = %e, "supervised task failed");
                }
            }

            if started_at.elapsed() >= HEALTHY_UPTIME_RESET {
                consecutive_restarts = 0;
            }
            consecutive_restarts += 1;

            if consecutive_restarts > MAX_CONSECUTIVE_RESTARTS {
                error!(
                    component = name,
                    consecutive_restarts, "supervised task exceeded max consecutive restarts, giving up"
                );
                return;
            }

            tokio::time::sleep(RESTART_COOLDOWN).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn restarts_after_failure_and_eventually_gives_up() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let handle = supervise("test_component", move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("simulated failure"))
            }
        });

        // Paused virtual clock: `sleep` inside the supervisor loop advances
        // instantly instead of burning 5s real-time per restart.
        tokio::time::timeout(Duration::from_secs(3600), handle).await.unwrap().unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_CONSECUTIVE_RESTARTS + 1);
    }
}
