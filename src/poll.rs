//! Generic async polling engine with multiplicative backoff.
//!
//! Every backend stage in this crate is observed the same way: sleep, fetch a
//! status snapshot, classify it, and either stop or grow the interval and go
//! again. `PollPolicy` captures the cadence, `PollPolicy::run` drives the
//! loop, and `SessionRegistry` hands out generation tokens so a superseded
//! poll session can never apply its late results.
//!
//! **Design**: transient fetch failures (connection refused, malformed body)
//! do not abort the loop — the backend restarting mid-stage is normal. They
//! do consume an attempt, so the ceiling always terminates the session.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

// ═══════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════

/// Extra growth applied on top of the normal factor when a fetch fails,
/// so a struggling backend is polled less aggressively.
const TRANSIENT_RELAX_FACTOR: f64 = 1.25;

/// Cadence of one polling concern.
///
/// The interval starts at `initial_ms` and is multiplied by `growth_factor`
/// (rounded, clamped to `max_interval_ms`) after every pending poll. The loop
/// gives up after `max_attempts` polls.
#[derive(Debug, Clone, Serialize)]
pub struct PollPolicy {
    pub initial_ms: u64,
    pub growth_factor: f64,
    pub max_interval_ms: u64,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(initial_ms: u64, growth_factor: f64, max_interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_ms,
            growth_factor,
            max_interval_ms,
            max_attempts,
        }
    }

    /// Conversion finishes in seconds: fixed 1.2s cadence, small headroom
    /// for the relaxed-on-error interval.
    pub fn conversion() -> Self {
        Self::new(1200, 1.0, 1500, 60)
    }

    /// Enhancement is the slowest stage: 1.2s growing 1.5× up to 15s.
    pub fn suggestions() -> Self {
        Self::new(1200, 1.5, 15_000, 60)
    }

    /// Observational progress alongside enhancement: gentler growth, 8s cap.
    pub fn progress() -> Self {
        Self::new(1200, 1.2, 8_000, 60)
    }

    /// Auto-pipeline document status: 2s base, same relaxed growth as
    /// progress. OCR-heavy documents take a while, hence the 8s cap.
    pub fn status() -> Self {
        Self::new(2000, 1.2, 8_000, 60)
    }

    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    /// Next interval after a pending poll: grow, round, clamp.
    pub fn next_interval(&self, current: Duration) -> Duration {
        self.grown(current, self.growth_factor)
    }

    /// Next interval after a failed fetch: grow faster, same clamp.
    pub fn relaxed_interval(&self, current: Duration) -> Duration {
        self.grown(current, self.growth_factor * TRANSIENT_RELAX_FACTOR)
    }

    fn grown(&self, current: Duration, factor: f64) -> Duration {
        let grown = (current.as_millis() as f64 * factor).round() as u64;
        Duration::from_millis(grown.min(self.max_interval_ms))
    }

    /// Drive the poll loop: sleep, `fetch` a snapshot, classify it with
    /// `verdict`. Returns the snapshot that completed the stage, the first
    /// terminal backend failure, or `TimedOut` once the ceiling is hit.
    pub async fn run<S, E, F, Fut, V>(&self, mut fetch: F, mut verdict: V) -> Result<S, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
        V: FnMut(&S) -> PollVerdict,
        E: fmt::Display,
    {
        let mut interval = self.initial();
        for attempt in 1..=self.max_attempts {
            sleep(interval).await;
            match fetch().await {
                Ok(snapshot) => match verdict(&snapshot) {
                    PollVerdict::Complete => return Ok(snapshot),
                    PollVerdict::Failed(message) => return Err(PollError::Backend(message)),
                    PollVerdict::Pending => {
                        interval = self.next_interval(interval);
                    }
                },
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "poll fetch failed, retrying");
                    interval = self.relaxed_interval(interval);
                }
            }
        }
        Err(PollError::TimedOut {
            attempts: self.max_attempts,
        })
    }
}

/// Classification of one fetched status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// Stage still running; poll again.
    Pending,
    /// Stage finished; the snapshot is the final result.
    Complete,
    /// Backend reported a terminal failure for this stage.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The attempt ceiling was reached without a terminal snapshot.
    #[error("stage did not complete after {attempts} polls")]
    TimedOut { attempts: u32 },
    /// The backend reported a terminal failure.
    #[error("{0}")]
    Backend(String),
}

// ═══════════════════════════════════════════════════════════
// Session supersession
// ═══════════════════════════════════════════════════════════

/// A polling concern of which at most one session may be live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollConcern {
    Conversion,
    Enhancement,
    Progress,
    Status,
}

/// Proof of membership in the current session of one concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken {
    concern: PollConcern,
    generation: u64,
}

impl SessionToken {
    pub fn concern(&self) -> PollConcern {
        self.concern
    }
}

/// Generation counter per concern. `begin` invalidates every token issued
/// earlier for the same concern; results carrying a stale token must be
/// discarded by the caller.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    generations: HashMap<PollConcern, u64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, superseding any previous one for the concern.
    pub fn begin(&mut self, concern: PollConcern) -> SessionToken {
        let generation = self.generations.entry(concern).or_insert(0);
        *generation += 1;
        SessionToken {
            concern,
            generation: *generation,
        }
    }

    /// Whether the token still belongs to the live session of its concern.
    pub fn is_current(&self, token: SessionToken) -> bool {
        self.generations.get(&token.concern) == Some(&token.generation)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn ok<E>(value: u32) -> Result<u32, E> {
        Ok(value)
    }

    #[test]
    fn interval_grows_and_clamps_at_cap() {
        let policy = PollPolicy::suggestions();
        let mut interval = policy.initial();
        let mut observed = Vec::new();
        for _ in 0..10 {
            observed.push(interval.as_millis() as u64);
            interval = policy.next_interval(interval);
        }
        // 1200 × 1.5ⁿ rounded, never above 15000, and pinned there once hit.
        assert_eq!(observed[0], 1200);
        assert_eq!(observed[1], 1800);
        assert_eq!(observed[2], 2700);
        assert!(observed.iter().all(|&ms| ms <= 15_000));
        assert_eq!(*observed.last().unwrap(), 15_000);
    }

    #[test]
    fn fixed_cadence_policy_never_grows() {
        let policy = PollPolicy::conversion();
        let next = policy.next_interval(policy.initial());
        assert_eq!(next, Duration::from_millis(1200));
    }

    #[test]
    fn relaxed_interval_grows_faster_but_respects_cap() {
        let policy = PollPolicy::progress();
        let relaxed = policy.relaxed_interval(Duration::from_millis(1200));
        let normal = policy.next_interval(Duration::from_millis(1200));
        assert!(relaxed > normal);
        assert!(policy.relaxed_interval(Duration::from_millis(7900)).as_millis() <= 8000);
    }

    #[tokio::test]
    async fn run_returns_completing_snapshot() {
        let policy = PollPolicy::new(1, 1.0, 1, 10);
        let calls = AtomicU32::new(0);
        let result = policy
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { ok::<String>(n) }
                },
                |n| {
                    if *n >= 3 {
                        PollVerdict::Complete
                    } else {
                        PollVerdict::Pending
                    }
                },
            )
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_surfaces_terminal_backend_failure() {
        let policy = PollPolicy::new(1, 1.0, 1, 10);
        let result = policy
            .run(
                || async { ok::<String>(1) },
                |_| PollVerdict::Failed("conversion crashed".into()),
            )
            .await;
        match result {
            Err(PollError::Backend(message)) => assert_eq!(message, "conversion crashed"),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_times_out_exactly_at_the_ceiling() {
        let policy = PollPolicy::new(1, 1.0, 1, 5);
        let calls = AtomicU32::new(0);
        let result = policy
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { ok::<String>(0) }
                },
                |_| PollVerdict::Pending,
            )
            .await;
        match result {
            Err(PollError::TimedOut { attempts }) => assert_eq!(attempts, 5),
            other => panic!("expected timeout, got {other:?}"),
        }
        // No further polls after the ceiling.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn fetch_errors_consume_attempts() {
        let policy = PollPolicy::new(1, 1.0, 1, 4);
        let calls = AtomicU32::new(0);
        let result = policy
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u32, String>("connection refused".into()) }
                },
                |_| PollVerdict::Pending,
            )
            .await;
        assert!(matches!(result, Err(PollError::TimedOut { attempts: 4 })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn run_recovers_after_transient_fetch_error() {
        let policy = PollPolicy::new(1, 1.0, 1, 10);
        let calls = AtomicU32::new(0);
        let result = policy
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n == 1 {
                            Err("backend restarting".to_string())
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| PollVerdict::Complete,
            )
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn new_session_invalidates_previous_token() {
        let mut registry = SessionRegistry::new();
        let first = registry.begin(PollConcern::Enhancement);
        assert!(registry.is_current(first));
        let second = registry.begin(PollConcern::Enhancement);
        assert!(!registry.is_current(first));
        assert!(registry.is_current(second));
    }

    #[test]
    fn concerns_supersede_independently() {
        let mut registry = SessionRegistry::new();
        let conversion = registry.begin(PollConcern::Conversion);
        let enhancement = registry.begin(PollConcern::Enhancement);
        registry.begin(PollConcern::Enhancement);
        assert!(registry.is_current(conversion));
        assert!(!registry.is_current(enhancement));
    }
}
