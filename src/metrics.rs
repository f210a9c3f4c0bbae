//! Run statistics for the scoring pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Statistics collected during one batch run
pub struct RunMetrics {
    /// Time spent in each stage, in the order stages ran
    stage_times: RwLock<Vec<(String, Duration)>>,
    /// Score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Sum of all recorded scores
    score_sum: RwLock<f64>,
    /// Rows fetched from the source table
    rows_fetched: AtomicU64,
    /// Records committed to the results table
    records_written: AtomicU64,
    /// Start time of the run
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            stage_times: RwLock::new(Vec::with_capacity(4)),
            score_buckets: RwLock::new([0; 10]),
            score_sum: RwLock::new(0.0),
            rows_fetched: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record how long a stage took
    pub fn record_stage(&self, stage: &str, duration: Duration) {
        if let Ok(mut times) = self.stage_times.write() {
            times.push((stage.to_string(), duration));
        }
    }

    pub fn record_fetched(&self, rows: usize) {
        self.rows_fetched.store(rows as u64, Ordering::Relaxed);
    }

    pub fn record_written(&self, records: usize) {
        self.records_written.store(records as u64, Ordering::Relaxed);
    }

    /// Add scores to the distribution
    pub fn record_scores(&self, scores: &[f64]) {
        if let Ok(mut buckets) = self.score_buckets.write() {
            for score in scores {
                let bucket = (score * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }
        if let Ok(mut sum) = self.score_sum.write() {
            *sum += scores.iter().sum::<f64>();
        }
    }

    pub fn stage_times(&self) -> Vec<(String, Duration)> {
        self.stage_times
            .read()
            .map(|times| times.clone())
            .unwrap_or_default()
    }

    pub fn score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Mean of the recorded scores; 0.0 when nothing was scored
    pub fn mean_score(&self) -> f64 {
        let count: u64 = self.score_distribution().iter().sum();
        if count == 0 {
            return 0.0;
        }
        self.score_sum.read().map(|sum| *sum).unwrap_or(0.0) / count as f64
    }

    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let score_dist = self.score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              LEAD SCORING RUN - METRICS SUMMARY              ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Rows Fetched: {:>8}  │  Records Written: {:>8}          ║",
            self.rows_fetched(),
            self.records_written()
        );
        info!(
            "║ Elapsed: {:>8.1} ms  │  Mean Score: {:>6.3}                 ║",
            self.elapsed().as_secs_f64() * 1000.0,
            self.mean_score()
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Stage Times (ms):                                            ║");
        for (stage, duration) in self.stage_times() {
            info!("║   {:10}: {:>10.2}", stage, duration.as_secs_f64() * 1000.0);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Score Distribution:                                          ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters across scheduled runs
#[derive(Default)]
pub struct RunCounters {
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub records_written: AtomicU64,
    start: Option<Instant>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self {
            start: Some(Instant::now()),
            ..Self::default()
        }
    }

    pub fn record_success(&self, records: usize) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.records_written
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_runs(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed)
    }

    pub fn print_summary(&self) {
        let uptime = self.start.map(|s| s.elapsed()).unwrap_or_default();
        info!(
            runs = self.total_runs(),
            succeeded = self.succeeded.load(Ordering::Relaxed),
            failed = self.failed.load(Ordering::Relaxed),
            records_written = self.records_written.load(Ordering::Relaxed),
            uptime_secs = uptime.as_secs(),
            "Scheduler summary"
        );
    }
}
