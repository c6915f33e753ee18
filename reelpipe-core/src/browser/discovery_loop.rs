use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DiscoverySection;
use crate::pacing::Pacer;
use crate::post::PostId;
use crate::queue::QueueFile;

use super::error::{BrowserError, BrowserResult};
use super::feed::FeedSession;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub feed_url: String,
    pub post_pattern: String,
    pub max_consecutive_misses: usize,
    pub max_total_scrolls: usize,
    pub initial_wait_ms: (u64, u64),
    pub watch_time_ms: (u64, u64),
}

impl From<&DiscoverySection> for DiscoveryConfig {
    fn from(section: &DiscoverySection) -> Self {
        Self {
            feed_url: section.feed_url.clone(),
            post_pattern: section.post_pattern.clone(),
            max_consecutive_misses: section.max_consecutive_misses,
            max_total_scrolls: section.max_total_scrolls,
            initial_wait_ms: (section.initial_wait_ms[0], section.initial_wait_ms[1]),
            watch_time_ms: (section.watch_time_ms[0], section.watch_time_ms[1]),
        }
    }
}

/// Picks the run's target uniformly in `base ± jitter`, never below one.
pub fn randomized_target(base: usize, jitter: usize) -> usize {
    let lower = base.saturating_sub(jitter).max(1);
    let upper = base.saturating_add(jitter).max(lower);
    rand::thread_rng().gen_range(lower..=upper)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Collected,
    Duplicate,
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    Stalled,
    ScrollCeiling,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub run_id: Uuid,
    pub target: usize,
    pub collected: Vec<PostId>,
    pub duplicates: usize,
    pub misses: usize,
    pub scrolls: usize,
    pub stop_reason: StopReason,
    pub total_wait_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DiscoveryReport {
    /// Appends the collected identifiers to the queue. An empty run leaves it untouched.
    pub async fn persist(&self, queue: &QueueFile) -> BrowserResult<usize> {
        if self.collected.is_empty() {
            warn!(run_id = %self.run_id, "collection produced no identifiers, queue untouched");
            return Ok(0);
        }
        let written = queue.append(self.collected.iter()).await?;
        info!(
            run_id = %self.run_id,
            written,
            skipped = self.collected.len() - written,
            path = %queue.path().display(),
            "saved identifiers to queue"
        );
        Ok(written)
    }
}

pub struct DiscoveryLoop {
    config: DiscoveryConfig,
    pattern: Regex,
    initial_wait: Pacer,
    watch_time: Pacer,
}

impl DiscoveryLoop {
    pub fn new(config: DiscoveryConfig) -> BrowserResult<Self> {
        let pattern = Regex::new(&config.post_pattern).map_err(|err| {
            BrowserError::Configuration(format!("invalid post pattern: {err}"))
        })?;
        let initial_wait = Pacer::new(config.initial_wait_ms);
        let watch_time = Pacer::new(config.watch_time_ms);
        Ok(Self {
            config,
            pattern,
            initial_wait,
            watch_time,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Scrolls the feed until `target` identifiers are collected, the feed
    /// stalls, or the scroll ceiling is hit. Session errors abort the run.
    pub async fn run<S>(&mut self, session: &mut S, target: usize) -> BrowserResult<DiscoveryReport>
    where
        S: FeedSession + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%run_id, target, feed = %self.config.feed_url, "starting discovery");

        session.open(&self.config.feed_url).await?;
        let mut total_wait_ms = self.initial_wait.wait().await;

        let mut seen: HashSet<PostId> = HashSet::new();
        let mut collected: Vec<PostId> = Vec::new();
        let mut consecutive_misses = 0usize;
        let mut duplicates = 0usize;
        let mut misses = 0usize;
        let mut scrolls = 0usize;

        let stop_reason = loop {
            if collected.len() >= target {
                break StopReason::TargetReached;
            }
            if consecutive_misses >= self.config.max_consecutive_misses {
                break StopReason::Stalled;
            }
            if scrolls >= self.config.max_total_scrolls {
                break StopReason::ScrollCeiling;
            }

            let location = session.current_location().await?;
            let candidate = PostId::from_location(&location);
            match self.classify(&candidate, &seen) {
                ScanOutcome::Collected => {
                    seen.insert(candidate.clone());
                    collected.push(candidate.clone());
                    consecutive_misses = 0;
                    info!(found = collected.len(), id = %candidate, "collected post");
                }
                ScanOutcome::Duplicate => {
                    consecutive_misses += 1;
                    duplicates += 1;
                    debug!(id = %candidate, consecutive_misses, "duplicate post");
                }
                ScanOutcome::Miss => {
                    consecutive_misses += 1;
                    misses += 1;
                    debug!(location = %candidate, consecutive_misses, "location is not a post");
                }
            }

            session.advance().await?;
            let waited = self.watch_time.wait().await;
            total_wait_ms += waited;
            debug!(waited_ms = waited, "watched post");
            scrolls += 1;
        };

        let report = DiscoveryReport {
            run_id,
            target,
            collected,
            duplicates,
            misses,
            scrolls,
            stop_reason,
            total_wait_ms,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %run_id,
            collected = report.collected.len(),
            scrolls = report.scrolls,
            reason = ?report.stop_reason,
            duration_secs = start.elapsed().as_secs(),
            "discovery finished"
        );
        Ok(report)
    }

    pub fn classify(&self, candidate: &PostId, seen: &HashSet<PostId>) -> ScanOutcome {
        if !self.pattern.is_match(candidate.as_str()) {
            ScanOutcome::Miss
        } else if seen.contains(candidate) {
            ScanOutcome::Duplicate
        } else {
            ScanOutcome::Collected
        }
    }
}
