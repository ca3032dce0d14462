//! Cron-driven agent scheduling.
//!
//! A single ticker loop wakes every second, computes which agents are due
//! in their own timezones, asks the rate limiter for admission, and
//! dispatches admitted runs as detached tasks.  A denied agent is not
//! queued — its fire time stays in the past and the next tick retries.

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;

use crate::agent::{Agent, ScheduleSpec};
use crate::event_bus::{AppEvent, EventBus};
use crate::limiter::RateLimiter;
use crate::run::{RunConfig, Runner};
use crate::telemetry::metrics;

/// Scheduler tick interval.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Produces the per-run wiring (provider, tools, cleanup) for an agent.
pub type RunConfigFactory = Box<dyn Fn(&Agent) -> RunConfig + Send + Sync>;

pub struct Scheduler {
    agents: Vec<Agent>,
    limiter: Arc<RateLimiter>,
    runner: Arc<Runner>,
    factory: RunConfigFactory,
    bus: Option<Arc<dyn EventBus>>,
    /// Next fire time per agent; entries in the past are due.
    next_fire: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(
        agents: Vec<Agent>,
        limiter: Arc<RateLimiter>,
        runner: Arc<Runner>,
        factory: RunConfigFactory,
    ) -> Self {
        let next_fire = agents
            .iter()
            .filter_map(|agent| {
                let spec = agent.schedule.as_ref()?;
                let fire = compute_next_fire(spec, Utc::now())?;
                Some((agent.qualified_name(), fire))
            })
            .collect();
        Self {
            agents,
            limiter,
            runner,
            factory,
            bus: None,
            next_fire: Mutex::new(next_fire),
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Ticker loop; exits when the stop signal flips.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now());
                }
                Ok(()) = stop.changed() => {
                    if *stop.borrow() {
                        tracing::info!("scheduler: stop signal received");
                        break;
                    }
                }
            }
        }
    }

    /// One scheduling pass at `now`.
    fn tick(&self, now: DateTime<Utc>) {
        for agent in &self.agents {
            let Some(spec) = &agent.schedule else { continue };
            let name = agent.qualified_name();
            let scheduled_time = {
                let Ok(fires) = self.next_fire.lock() else { continue };
                match fires.get(&name) {
                    Some(t) if *t <= now => *t,
                    _ => continue,
                }
            };
            self.dispatch(agent, spec, scheduled_time, now);
        }
    }

    /// Ask for admission and dispatch one due agent.
    fn dispatch(
        &self,
        agent: &Agent,
        spec: &ScheduleSpec,
        scheduled_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let name = agent.qualified_name();
        let token = match self.limiter.acquire(&name) {
            Ok(token) => token,
            Err(reason) => {
                // Deferred, not queued: the fire time stays in the past so
                // the next tick retries.
                tracing::info!(agent = %name, %reason, "scheduler: run deferred");
                if let Some(bus) = &self.bus {
                    let _ = bus.publish(AppEvent::RunDeferred {
                        agent: name,
                        reason: reason.to_string(),
                    });
                }
                return;
            }
        };

        let lag = (now - scheduled_time).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::record_schedule_lag(&name, lag);

        // Reschedule before dispatch so a long run cannot double-fire.
        if let Ok(mut fires) = self.next_fire.lock() {
            match compute_next_fire(spec, now) {
                Some(next) => {
                    fires.insert(name.clone(), next);
                }
                None => {
                    tracing::warn!(agent = %name, cron = %spec.cron, "scheduler: invalid schedule, disabling");
                    fires.remove(&name);
                }
            }
        }

        let runner = self.runner.clone();
        let cfg = (self.factory)(agent);
        let agent = agent.clone();
        tokio::spawn(async move {
            if let Err(error) = runner.execute(&agent, cfg).await {
                tracing::error!(agent = %agent.qualified_name(), "scheduled run failed to persist: {error}");
            }
            token.release();
        });
    }

    #[cfg(test)]
    fn next_fire_for(&self, agent: &str) -> Option<DateTime<Utc>> {
        self.next_fire.lock().ok()?.get(agent).copied()
    }
}

/// Next cron fire time strictly after `after`, evaluated in the schedule's
/// timezone.  The `cron` crate expects six fields; five-field expressions
/// get a seconds column prepended.
pub fn compute_next_fire(spec: &ScheduleSpec, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expr = if spec.cron.split_whitespace().count() == 5 {
        format!("0 {}", spec.cron)
    } else {
        spec.cron.clone()
    };
    let schedule = cron::Schedule::from_str(&expr).ok()?;
    let tz: Tz = if spec.timezone.is_empty() {
        chrono_tz::UTC
    } else {
        spec.timezone.parse().ok()?
    };
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AutonomyLevel, Environment, Guardrails, ModelSettings, Reporting};
    use crate::ai::{
        ChatProvider, CompletionRequest, CompletionResponse, ProviderResult, StopReason,
        TokenUsage,
    };
    use crate::limiter::RateLimiterConfig;
    use crate::run::orchestrator::EnvironmentSource;
    use crate::safety::CooldownTracker;
    use crate::skills::{SkillCache, SkillLoader};
    use crate::store::MemoryRunStore;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct EchoProvider;

    #[async_trait]
    impl ChatProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, _r: CompletionRequest) -> ProviderResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: "nothing to do".to_string(),
                tool_calls: vec![],
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    fn scheduled_agent(name: &str, cron: &str) -> Agent {
        Agent {
            name: name.to_string(),
            namespace: "ops".to_string(),
            emoji: None,
            schedule: Some(ScheduleSpec {
                cron: cron.to_string(),
                timezone: String::new(),
            }),
            model: ModelSettings::default(),
            skills: vec![],
            guardrails: Guardrails {
                autonomy: AutonomyLevel::Observe,
                ..Guardrails::default()
            },
            reporting: Reporting::default(),
            environment_ref: "staging".to_string(),
        }
    }

    fn runner() -> Arc<Runner> {
        let mut envs = HashMap::new();
        envs.insert(
            "staging".to_string(),
            Environment {
                name: "staging".to_string(),
                ..Environment::default()
            },
        );
        let environments: Arc<dyn EnvironmentSource> = Arc::new(envs);
        Arc::new(Runner::new(
            Arc::new(MemoryRunStore::new()),
            Arc::new(SkillLoader::new(Arc::new(SkillCache::default()))),
            environments,
            Arc::new(CooldownTracker::new()),
        ))
    }

    fn factory() -> RunConfigFactory {
        Box::new(|_agent| RunConfig {
            provider: Arc::new(EchoProvider),
            tools: Arc::new(ToolRegistry::new()),
            trigger: crate::run::Trigger::Scheduled,
            cleanup: None,
        })
    }

    #[test]
    fn five_field_cron_is_accepted() {
        let spec = ScheduleSpec {
            cron: "*/5 * * * *".to_string(),
            timezone: String::new(),
        };
        let after = Utc.with_ymd_and_hms(2026, 8, 1, 12, 1, 0).unwrap();
        let next = compute_next_fire(&spec, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn timezone_shifts_fire_time() {
        // 09:00 in Berlin is 07:00 UTC in summer.
        let spec = ScheduleSpec {
            cron: "0 9 * * *".to_string(),
            timezone: "Europe/Berlin".to_string(),
        };
        let after = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let next = compute_next_fire(&spec, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 1, 7, 0, 0).unwrap());
    }

    #[test]
    fn invalid_cron_yields_none() {
        let spec = ScheduleSpec {
            cron: "not a cron".to_string(),
            timezone: String::new(),
        };
        assert!(compute_next_fire(&spec, Utc::now()).is_none());
    }

    #[test]
    fn invalid_timezone_yields_none() {
        let spec = ScheduleSpec {
            cron: "* * * * *".to_string(),
            timezone: "Mars/Olympus".to_string(),
        };
        assert!(compute_next_fire(&spec, Utc::now()).is_none());
    }

    #[tokio::test]
    async fn deferred_agent_keeps_past_fire_time() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_concurrent_cluster: 1,
            max_concurrent_per_agent: 1,
            ..RateLimiterConfig::default()
        });
        // Saturate the cluster slot.
        let _held = limiter.acquire("other/agent").unwrap();

        let bus: Arc<dyn EventBus> = Arc::new(crate::event_bus::TokioBroadcastBus::new());
        let mut rx = bus.subscribe();
        let scheduler = Scheduler::new(
            vec![scheduled_agent("deferred", "* * * * *")],
            limiter,
            runner(),
            factory(),
        )
        .with_event_bus(bus);

        // Force the agent due, then tick.
        let past = Utc::now() - chrono::Duration::seconds(90);
        scheduler
            .next_fire
            .lock()
            .unwrap()
            .insert("ops/deferred".to_string(), past);
        scheduler.tick(Utc::now());

        // Defer event was published and the fire time was not advanced.
        match rx.try_recv().unwrap() {
            AppEvent::RunDeferred { agent, .. } => assert_eq!(agent, "ops/deferred"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(scheduler.next_fire_for("ops/deferred"), Some(past));
    }

    #[tokio::test]
    async fn admitted_agent_is_rescheduled_and_dispatched() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let scheduler = Scheduler::new(
            vec![scheduled_agent("prompt", "* * * * *")],
            limiter,
            runner(),
            factory(),
        );

        let past = Utc::now() - chrono::Duration::seconds(61);
        scheduler
            .next_fire
            .lock()
            .unwrap()
            .insert("ops/prompt".to_string(), past);
        let now = Utc::now();
        scheduler.tick(now);

        let next = scheduler.next_fire_for("ops/prompt").unwrap();
        assert!(next > now, "fire time must advance after dispatch");
        // Let the spawned run finish.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn manual_only_agents_are_never_scheduled() {
        let mut agent = scheduled_agent("manual", "* * * * *");
        agent.schedule = None;
        let scheduler = Scheduler::new(
            vec![agent],
            RateLimiter::new(RateLimiterConfig::default()),
            runner(),
            factory(),
        );
        assert!(scheduler.next_fire_for("ops/manual").is_none());
        scheduler.tick(Utc::now());
    }
}
