//! Bounded polling for render completion
//!
//! Charts are drawn by page scripts that give no completion signal, so the
//! pipeline polls for their output instead. `await_condition` is the
//! general primitive; `RenderWaiter` applies it to the chart containers.
//! Both run on tokio's clock and can be driven with a paused runtime.

#![allow(async_fn_in_trait)]

use crate::session::RenderSession;
use crate::CHART_CONTAINER_IDS;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest interval the poll loop will tick at
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A condition that can be checked repeatedly
pub trait Condition {
    async fn check(&mut self) -> bool;
}

/// Adapter for plain synchronous predicates
pub struct Poll<F>(pub F);

impl<F: FnMut() -> bool> Condition for Poll<F> {
    async fn check(&mut self) -> bool {
        (self.0)()
    }
}

/// How a bounded wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition held after `elapsed`
    Satisfied { elapsed: Duration },
    /// The bound was reached first
    TimedOut { elapsed: Duration },
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Satisfied { elapsed } | WaitOutcome::TimedOut { elapsed } => *elapsed,
        }
    }
}

/// Check `condition` immediately and then every `interval` until it holds or
/// `timeout` elapses. Always resolves; a timeout is an outcome, not an error.
/// A zero `interval` is treated as [`MIN_POLL_INTERVAL`].
pub async fn await_condition<C: Condition>(
    condition: &mut C,
    interval: Duration,
    timeout: Duration,
) -> WaitOutcome {
    let started = Instant::now();

    let polling = async {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if condition.check().await {
                return;
            }
        }
    };

    match tokio::time::timeout(timeout, polling).await {
        Ok(()) => WaitOutcome::Satisfied {
            elapsed: started.elapsed(),
        },
        Err(_) => WaitOutcome::TimedOut {
            elapsed: started.elapsed(),
        },
    }
}

/// Waits for a page's chart containers to be populated
#[derive(Debug, Clone)]
pub struct RenderWaiter {
    interval: Duration,
    timeout: Duration,
    container_ids: Vec<&'static str>,
}

impl Default for RenderWaiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(10_000))
    }
}

impl RenderWaiter {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            container_ids: CHART_CONTAINER_IDS.to_vec(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve once every present chart container has content, or at the
    /// timeout. Containers missing from the page are ignored.
    pub async fn wait<S: RenderSession>(&self, session: &mut S) -> WaitOutcome {
        let mut charts = ChartsRendered {
            session,
            ids: &self.container_ids,
        };
        let outcome = await_condition(&mut charts, self.interval, self.timeout).await;
        if !outcome.is_satisfied() {
            warn!(
                "Charts still rendering after {}ms; capturing current state",
                outcome.elapsed().as_millis()
            );
        }
        outcome
    }
}

struct ChartsRendered<'a, S> {
    session: &'a mut S,
    ids: &'a [&'static str],
}

impl<S: RenderSession> Condition for ChartsRendered<'_, S> {
    async fn check(&mut self) -> bool {
        match self.session.chart_containers(self.ids).await {
            Ok(containers) => {
                let pending: Vec<&str> = containers
                    .iter()
                    .filter(|c| c.present && !c.populated)
                    .map(|c| c.id.as_str())
                    .collect();
                debug!("chart poll: {} pending {:?}", pending.len(), pending);
                pending.is_empty()
            }
            Err(e) => {
                warn!("Chart container check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(500);
    const TIMEOUT: Duration = Duration::from_millis(10_000);

    #[tokio::test(start_paused = true)]
    async fn satisfied_condition_resolves_immediately() {
        let outcome = await_condition(&mut Poll(|| true), INTERVAL, TIMEOUT).await;
        assert_eq!(outcome, WaitOutcome::Satisfied { elapsed: Duration::ZERO });
    }

    #[tokio::test(start_paused = true)]
    async fn never_satisfied_condition_resolves_at_timeout() {
        let outcome = await_condition(&mut Poll(|| false), INTERVAL, TIMEOUT).await;
        assert!(!outcome.is_satisfied());
        assert!(outcome.elapsed() >= TIMEOUT);
        assert!(outcome.elapsed() <= TIMEOUT + INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn condition_is_checked_once_per_interval() {
        let mut checks = 0u32;
        let outcome = await_condition(
            &mut Poll(|| {
                checks += 1;
                checks == 4
            }),
            INTERVAL,
            TIMEOUT,
        )
        .await;
        // Checked at 0, 500, 1000 and 1500ms
        assert_eq!(outcome, WaitOutcome::Satisfied { elapsed: Duration::from_millis(1500) });
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_polls_at_the_minimum() {
        let mut checks = 0u32;
        let outcome = await_condition(
            &mut Poll(|| {
                checks += 1;
                checks == 3
            }),
            Duration::ZERO,
            TIMEOUT,
        )
        .await;
        assert_eq!(outcome, WaitOutcome::Satisfied { elapsed: MIN_POLL_INTERVAL * 2 });

        let waited = await_condition(&mut Poll(|| false), Duration::ZERO, INTERVAL).await;
        assert!(!waited.is_satisfied());
    }
}
