//! Admission control: concurrency caps and hourly rate limits.
//!
//! Two kinds of checks guard `Runner::execute`:
//! - concurrency: cluster-wide and per-agent in-flight caps, adjusted
//!   atomically under one lock;
//! - rate: sliding-window counters over the last hour, with bursts above
//!   steady state tolerated up to the burst allowance.
//!
//! The limiter is process-local; replicas do not federate their counters.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use thiserror::Error;

/// The rate window the hourly limits are evaluated over.
const RATE_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_concurrent_cluster: usize,
    pub max_concurrent_per_agent: usize,
    pub max_runs_per_hour_cluster: usize,
    pub max_runs_per_hour_per_agent: usize,
    /// Extra admissions tolerated above the steady-state hourly caps.
    pub burst_allowance: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_cluster: 10,
            max_concurrent_per_agent: 1,
            max_runs_per_hour_cluster: 120,
            max_runs_per_hour_per_agent: 12,
            burst_allowance: 3,
        }
    }
}

/// Why an acquisition was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("cluster concurrency limit reached")]
    ClusterConcurrency,
    #[error("per-agent concurrency limit reached")]
    AgentConcurrency,
    #[error("cluster hourly rate limit reached")]
    ClusterRate,
    #[error("per-agent hourly rate limit reached")]
    AgentRate,
}

#[derive(Default)]
#[derive(Debug)]
struct State {
    cluster_in_flight: usize,
    agent_in_flight: HashMap<String, usize>,
    cluster_window: VecDeque<Instant>,
    agent_windows: HashMap<String, VecDeque<Instant>>,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Arc<Mutex<State>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Arc::new(Mutex::new(State::default())),
        })
    }

    /// Admit a run for `agent`.  On success the returned token must be
    /// released when the run completes; release is idempotent and also
    /// happens on drop.
    pub fn acquire(&self, agent: &str) -> Result<RateToken, DenyReason> {
        let now = Instant::now();
        let Ok(mut state) = self.state.lock() else {
            return Err(DenyReason::ClusterConcurrency);
        };

        // Concurrency caps first — they free up on release.
        if state.cluster_in_flight >= self.config.max_concurrent_cluster {
            return Err(DenyReason::ClusterConcurrency);
        }
        let agent_count = state.agent_in_flight.get(agent).copied().unwrap_or(0);
        if agent_count >= self.config.max_concurrent_per_agent {
            return Err(DenyReason::AgentConcurrency);
        }

        // Hourly windows, with burst headroom.
        prune_window(&mut state.cluster_window, now);
        if state.cluster_window.len()
            >= self.config.max_runs_per_hour_cluster + self.config.burst_allowance
        {
            return Err(DenyReason::ClusterRate);
        }
        let agent_window = state.agent_windows.entry(agent.to_string()).or_default();
        prune_window(agent_window, now);
        if agent_window.len()
            >= self.config.max_runs_per_hour_per_agent + self.config.burst_allowance
        {
            return Err(DenyReason::AgentRate);
        }

        // Admit: bump both concurrency counters and both windows.
        agent_window.push_back(now);
        state.cluster_window.push_back(now);
        state.cluster_in_flight += 1;
        *state.agent_in_flight.entry(agent.to_string()).or_insert(0) += 1;

        Ok(RateToken {
            state: self.state.clone(),
            agent: agent.to_string(),
            released: AtomicBool::new(false),
        })
    }

    #[cfg(test)]
    fn cluster_in_flight(&self) -> usize {
        self.state.lock().map(|s| s.cluster_in_flight).unwrap_or(0)
    }
}

fn prune_window(window: &mut VecDeque<Instant>, now: Instant) {
    while window
        .front()
        .is_some_and(|t| now.duration_since(*t) >= RATE_WINDOW)
    {
        window.pop_front();
    }
}

/// Concurrency token returned by a successful acquire.
#[derive(Debug)]
pub struct RateToken {
    state: Arc<Mutex<State>>,
    agent: String,
    released: AtomicBool,
}

impl RateToken {
    /// Return the concurrency slots.  Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.cluster_in_flight = state.cluster_in_flight.saturating_sub(1);
            if let Some(count) = state.agent_in_flight.get_mut(&self.agent) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

impl Drop for RateToken {
    fn drop(&mut self) {
        self.release();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_agent: usize, cluster: usize) -> Arc<RateLimiter> {
        RateLimiter::new(RateLimiterConfig {
            max_concurrent_cluster: cluster,
            max_concurrent_per_agent: per_agent,
            max_runs_per_hour_cluster: 1000,
            max_runs_per_hour_per_agent: 1000,
            burst_allowance: 0,
        })
    }

    #[test]
    fn per_agent_concurrency_bound() {
        let limiter = limiter(1, 10);
        let first = limiter.acquire("ops/a").expect("first acquire");
        let second = limiter.acquire("ops/a");
        assert_eq!(second.unwrap_err(), DenyReason::AgentConcurrency);

        first.release();
        assert!(limiter.acquire("ops/a").is_ok());
    }

    #[test]
    fn different_agents_do_not_contend_on_agent_cap() {
        let limiter = limiter(1, 10);
        let _a = limiter.acquire("ops/a").unwrap();
        assert!(limiter.acquire("ops/b").is_ok());
    }

    #[test]
    fn cluster_concurrency_bound() {
        let limiter = limiter(5, 2);
        let _a = limiter.acquire("ops/a").unwrap();
        let _b = limiter.acquire("ops/b").unwrap();
        assert_eq!(
            limiter.acquire("ops/c").unwrap_err(),
            DenyReason::ClusterConcurrency
        );
    }

    #[test]
    fn release_is_idempotent() {
        let limiter = limiter(1, 10);
        let token = limiter.acquire("ops/a").unwrap();
        token.release();
        token.release();
        assert_eq!(limiter.cluster_in_flight(), 0);
        assert!(limiter.acquire("ops/a").is_ok());
    }

    #[test]
    fn drop_releases() {
        let limiter = limiter(1, 10);
        {
            let _token = limiter.acquire("ops/a").unwrap();
            assert_eq!(limiter.cluster_in_flight(), 1);
        }
        assert_eq!(limiter.cluster_in_flight(), 0);
    }

    #[test]
    fn hourly_rate_with_burst() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_concurrent_cluster: 100,
            max_concurrent_per_agent: 100,
            max_runs_per_hour_cluster: 1000,
            max_runs_per_hour_per_agent: 2,
            burst_allowance: 1,
        });
        // Steady state (2) plus burst (1) admissions pass; the fourth is
        // denied even though every token was released.
        for _ in 0..3 {
            limiter.acquire("ops/a").unwrap().release();
        }
        assert_eq!(limiter.acquire("ops/a").unwrap_err(), DenyReason::AgentRate);
        // Another agent is unaffected.
        assert!(limiter.acquire("ops/b").is_ok());
    }

    #[test]
    fn cluster_rate_is_shared() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_concurrent_cluster: 100,
            max_concurrent_per_agent: 100,
            max_runs_per_hour_cluster: 2,
            max_runs_per_hour_per_agent: 1000,
            burst_allowance: 0,
        });
        limiter.acquire("ops/a").unwrap().release();
        limiter.acquire("ops/b").unwrap().release();
        assert_eq!(
            limiter.acquire("ops/c").unwrap_err(),
            DenyReason::ClusterRate
        );
    }
}
