//! Synthetic monitoring-session traffic
//!
//! Generates the mix a desktop monitoring client produces: frequent
//! screenshot and telemetry uploads through the `uploads` pool, and fewer
//! auth and command calls through the `api` pool. Latency and failures are
//! drawn from a seeded RNG so runs can be replayed.

use std::ops::Range;
use std::time::Duration;

use eyre::{Result, eyre};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::PoolEvent;
use crate::pool::{PoolError, PoolExecutor, PoolResult, PoolStatistics, Priority};
use crate::registry::{API_POOL, PoolRegistry, UPLOAD_POOL};

/// Chance per submission tick of a telemetry burst
const BURST_PROBABILITY: f64 = 0.03;

/// Telemetry records flushed in one burst
const BURST_SIZE: usize = 25;

/// Kind of simulated request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficKind {
    Screenshot,
    Telemetry,
    Auth,
    Command,
}

impl TrafficKind {
    pub const ALL: [TrafficKind; 4] = [Self::Screenshot, Self::Telemetry, Self::Auth, Self::Command];

    /// Pool this traffic goes through
    pub fn pool(self) -> &'static str {
        match self {
            Self::Screenshot | Self::Telemetry => UPLOAD_POOL,
            Self::Auth | Self::Command => API_POOL,
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            Self::Screenshot => Priority::Normal,
            Self::Telemetry => Priority::Low,
            Self::Auth => Priority::Critical,
            Self::Command => Priority::High,
        }
    }

    /// Simulated execution time in milliseconds
    fn latency_ms(self) -> Range<u64> {
        match self {
            Self::Screenshot => 50..400,
            Self::Telemetry => 10..80,
            Self::Auth => 30..150,
            Self::Command => 20..250,
        }
    }

    /// Relative share of the traffic mix
    fn weight(self) -> u32 {
        match self {
            Self::Screenshot => 35,
            Self::Telemetry => 35,
            Self::Auth => 10,
            Self::Command => 20,
        }
    }

    fn pick(rng: &mut StdRng) -> Self {
        let total: u32 = Self::ALL.iter().map(|kind| kind.weight()).sum();
        let mut roll = rng.random_range(0..total);
        for kind in Self::ALL {
            if roll < kind.weight() {
                return kind;
            }
            roll -= kind.weight();
        }
        Self::Screenshot
    }
}

impl std::fmt::Display for TrafficKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Screenshot => write!(f, "screenshot"),
            Self::Telemetry => write!(f, "telemetry"),
            Self::Auth => write!(f, "auth"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// Knobs for one simulation run
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub duration: Duration,
    /// Submissions per second
    pub rate: u32,
    /// Fraction of operations that fail
    pub failure_rate: f64,
    pub seed: Option<u64>,
    pub report_interval: Duration,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            rate: 40,
            failure_rate: 0.05,
            seed: None,
            report_interval: Duration::from_millis(500),
        }
    }
}

impl SimulationOptions {
    /// Time between submissions; zero when the rate is beyond nanosecond resolution
    pub fn submit_period(&self) -> Duration {
        if self.rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(1) / self.rate
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(eyre!("rate must be at least 1 submission per second"));
        }
        if self.submit_period().is_zero() {
            return Err(eyre!("rate must be at most 1000000000 submissions per second, got {}", self.rate));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(eyre!("failure-rate must be between 0.0 and 1.0, got {}", self.failure_rate));
        }
        if self.report_interval.is_zero() {
            return Err(eyre!("report interval must be non-zero"));
        }
        Ok(())
    }
}

/// How submitted requests ended, as seen by the submitter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcomes {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub timed_out: u64,
    pub disposed: u64,
}

impl Outcomes {
    fn record(&mut self, result: &PoolResult<()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(PoolError::Operation(_)) => self.failed += 1,
            Err(PoolError::Dropped { .. }) => self.dropped += 1,
            Err(PoolError::QueueTimeout { .. }) => self.timed_out += 1,
            Err(PoolError::Disposed { .. }) => self.disposed += 1,
        }
    }

    /// Requests whose handle has resolved
    pub fn resolved(&self) -> u64 {
        self.succeeded + self.failed + self.dropped + self.timed_out + self.disposed
    }
}

/// Result of a finished simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub seed: u64,
    #[serde(rename = "elapsed-ms")]
    pub elapsed_ms: u64,
    pub outcomes: Outcomes,
    pub pools: Vec<PoolStatistics>,
}

/// Progress callbacks for a running simulation
pub trait SimulationObserver {
    /// Periodic statistics of every pool
    fn on_status(&mut self, _stats: &[PoolStatistics]) {}

    /// A pool emitted an event
    fn on_event(&mut self, _event: &PoolEvent) {}
}

/// Observer that ignores everything
pub struct QuietObserver;

impl SimulationObserver for QuietObserver {}

/// Drive synthetic traffic through the registry's upload and API pools
pub async fn run(
    registry: &PoolRegistry,
    options: &SimulationOptions,
    observer: &mut dyn SimulationObserver,
) -> Result<SimulationReport> {
    options.validate()?;

    let seed = options.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    info!(seed, rate = options.rate, duration = ?options.duration, "Simulation starting");

    let uploads = registry.upload_pool()?;
    let api = registry.api_pool()?;
    let mut upload_events = uploads.subscribe();
    let mut api_events = api.subscribe();

    let mut submit_ticker = tokio::time::interval(options.submit_period());
    submit_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report_ticker = tokio::time::interval(options.report_interval);
    report_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);

    let started = Instant::now();
    let mut outcomes = Outcomes::default();
    let mut pending: JoinSet<PoolResult<()>> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut deadline => break,

            _ = submit_ticker.tick() => {
                let kind = TrafficKind::pick(&mut rng);
                let pool = if kind.pool() == UPLOAD_POOL { &uploads } else { &api };
                submit(pool, kind, &mut rng, options.failure_rate, &mut pending, &mut outcomes);

                if rng.random_bool(BURST_PROBABILITY) {
                    debug!(size = BURST_SIZE, "Telemetry burst");
                    for _ in 0..BURST_SIZE {
                        let kind = TrafficKind::Telemetry;
                        submit(&uploads, kind, &mut rng, options.failure_rate, &mut pending, &mut outcomes);
                    }
                }
            }

            _ = report_ticker.tick() => {
                observer.on_status(&registry.statistics().await);
            }

            Ok(event) = upload_events.recv() => observer.on_event(&event),

            Ok(event) = api_events.recv() => observer.on_event(&event),

            Some(joined) = pending.join_next(), if !pending.is_empty() => record(&mut outcomes, joined),
        }
    }

    info!(outstanding = pending.len(), "Traffic stopped, waiting for outstanding requests");
    while let Some(joined) = pending.join_next().await {
        record(&mut outcomes, joined);
    }
    while let Ok(event) = upload_events.try_recv() {
        observer.on_event(&event);
    }
    while let Ok(event) = api_events.try_recv() {
        observer.on_event(&event);
    }

    let pools = registry.statistics().await;
    observer.on_status(&pools);

    let report = SimulationReport {
        seed,
        elapsed_ms: started.elapsed().as_millis() as u64,
        outcomes,
        pools,
    };
    info!(
        seed,
        submitted = report.outcomes.submitted,
        succeeded = report.outcomes.succeeded,
        dropped = report.outcomes.dropped,
        "Simulation finished"
    );
    Ok(report)
}

fn submit(
    pool: &PoolExecutor,
    kind: TrafficKind,
    rng: &mut StdRng,
    failure_rate: f64,
    pending: &mut JoinSet<PoolResult<()>>,
    outcomes: &mut Outcomes,
) {
    let latency = Duration::from_millis(rng.random_range(kind.latency_ms()));
    let fails = rng.random_bool(failure_rate);
    let id = format!("{}-{}", kind, Uuid::now_v7());

    let handle = pool.submit(id, kind.priority(), move || async move {
        tokio::time::sleep(latency).await;
        if fails {
            Err(eyre!("simulated {} failure", kind))
        } else {
            Ok(())
        }
    });
    outcomes.submitted += 1;
    pending.spawn(handle);
}

fn record(outcomes: &mut Outcomes, joined: std::result::Result<PoolResult<()>, tokio::task::JoinError>) {
    match joined {
        Ok(result) => outcomes.record(&result),
        Err(e) => {
            warn!("Request waiter failed: {}", e);
            outcomes.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        status_reports: usize,
        events: Vec<PoolEvent>,
    }

    impl SimulationObserver for Recorder {
        fn on_status(&mut self, _stats: &[PoolStatistics]) {
            self.status_reports += 1;
        }

        fn on_event(&mut self, event: &PoolEvent) {
            self.events.push(event.clone());
        }
    }

    fn options(seed: u64) -> SimulationOptions {
        SimulationOptions {
            duration: Duration::from_secs(2),
            rate: 50,
            failure_rate: 0.1,
            seed: Some(seed),
            report_interval: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_traffic_routing() {
        assert_eq!(TrafficKind::Screenshot.pool(), UPLOAD_POOL);
        assert_eq!(TrafficKind::Telemetry.pool(), UPLOAD_POOL);
        assert_eq!(TrafficKind::Auth.pool(), API_POOL);
        assert_eq!(TrafficKind::Command.pool(), API_POOL);
        assert!(TrafficKind::Telemetry.priority().is_droppable());
        assert!(!TrafficKind::Auth.priority().is_droppable());
    }

    #[test]
    fn test_pick_is_reproducible() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let first: Vec<_> = (0..50).map(|_| TrafficKind::pick(&mut a)).collect();
        let second: Vec<_> = (0..50).map(|_| TrafficKind::pick(&mut b)).collect();
        assert_eq!(first, second);
        assert!(first.contains(&TrafficKind::Screenshot));
    }

    #[test]
    fn test_options_validation() {
        assert!(SimulationOptions::default().validate().is_ok());
        let bad_rate = SimulationOptions {
            rate: 0,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());
        let bad_failure = SimulationOptions {
            failure_rate: 1.5,
            ..Default::default()
        };
        assert!(bad_failure.validate().is_err());
        let too_fast = SimulationOptions {
            rate: 2_000_000_000,
            ..Default::default()
        };
        assert!(too_fast.submit_period().is_zero());
        assert!(too_fast.validate().is_err());
        let fastest = SimulationOptions {
            rate: 1_000_000_000,
            ..Default::default()
        };
        assert_eq!(fastest.submit_period(), Duration::from_nanos(1));
        assert!(fastest.validate().is_ok());
    }

    #[tokio::test]
    async fn test_excessive_rate_is_an_error() {
        let too_fast = SimulationOptions {
            rate: 2_000_000_000,
            duration: Duration::from_millis(10),
            ..options(1)
        };
        let err = run(&PoolRegistry::new(), &too_fast, &mut QuietObserver).await.unwrap_err();
        assert!(err.to_string().contains("at most"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_submission_is_accounted_for() {
        let registry = PoolRegistry::new();
        let mut recorder = Recorder::default();

        let report = run(&registry, &options(11), &mut recorder).await.unwrap();
        let outcomes = &report.outcomes;

        assert_eq!(report.seed, 11);
        assert!(outcomes.submitted >= 100);
        assert_eq!(outcomes.resolved(), outcomes.submitted);
        assert_eq!(outcomes.disposed, 0);
        assert!(recorder.status_reports >= 2);

        // Pool counters see the same requests the submitter does
        assert_eq!(report.pools.len(), 2);
        let seen: u64 = report
            .pools
            .iter()
            .map(|stats| stats.total_processed + stats.dropped_requests)
            .sum();
        assert_eq!(seen, outcomes.submitted);
        let dropped: u64 = report.pools.iter().map(|stats| stats.dropped_requests).sum();
        assert_eq!(dropped, outcomes.dropped);
        assert!(report.pools.iter().all(|stats| stats.active_requests == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_traffic() {
        let first = run(&PoolRegistry::new(), &options(3), &mut QuietObserver).await.unwrap();
        let second = run(&PoolRegistry::new(), &options(3), &mut QuietObserver).await.unwrap();
        assert_eq!(first.outcomes.submitted, second.outcomes.submitted);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let bad = SimulationOptions {
            rate: 0,
            ..options(1)
        };
        assert!(run(&PoolRegistry::new(), &bad, &mut QuietObserver).await.is_err());
    }
}
