use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;

/// Drives `tick` every `period` until `cancel` fires.
///
/// With `run_immediately` the first tick runs at start, otherwise one full
/// period after it. A tick that returns an error or panics is logged and the
/// loop carries on with the next one.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    run_immediately: bool,
    cancel: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    info!(task = name, "{name} is starting");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !run_immediately {
        ticker.tick().await; // consume immediate first tick
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match AssertUnwindSafe(tick()).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(task = name, "{name} iteration failed: {e}"),
                    Err(_) => error!(task = name, "{name} iteration panicked"),
                }
            }
        }
    }

    info!(task = name, "{name} is stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn failing_and_panicking_ticks_do_not_stop_the_loop() {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ticks);
        let handle = tokio::spawn(run_periodic(
            "flaky",
            Duration::from_secs(1),
            false,
            cancel.clone(),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err(AppError::TimeRange("boom".to_string())),
                        1 => panic!("tick panicked"),
                        _ => Ok(()),
                    }
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_first_tick_does_no_work() {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ticks);
        let handle = tokio::spawn(run_periodic(
            "idle",
            Duration::from_secs(60),
            false,
            cancel.clone(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_loop_ticks_at_start_then_every_period() {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ticks);
        let handle = tokio::spawn(run_periodic(
            "eager",
            Duration::from_secs(60),
            true,
            cancel.clone(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
