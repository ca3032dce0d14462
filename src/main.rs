//! warden — control-plane entry point.
//!
//! This is the single wiring point: every subsystem is constructed here and
//! handed its collaborators explicitly.  The scheduler receives a factory
//! producing per-run configuration rather than a long-lived runner wiring,
//! which keeps the scheduler ↔ runner ↔ engine graph acyclic.

use std::{collections::HashMap, sync::Arc};

use clap::Parser;

use warden::agent::{Agent, Environment};
use warden::ai::{AnthropicProvider, ChatProvider, RetryingProvider};
use warden::config::Flags;
use warden::event_bus::{EventBus, TokioBroadcastBus};
use warden::lifecycle::{RetentionConfig, RetentionScanner, RunTracker, ShutdownManager};
use warden::limiter::{RateLimiter, RateLimiterConfig};
use warden::probes::{self, Readiness};
use warden::run::orchestrator::EnvironmentSource;
use warden::run::{RunConfig, Runner, Trigger};
use warden::safety::CooldownTracker;
use warden::scheduler::Scheduler;
use warden::skills::{SkillCache, SkillLoader};
use warden::store::MemoryRunStore;
use warden::telemetry::{self, metrics};
use warden::tools::ToolRegistry;

fn main() -> Result<(), String> {
    let flags = Flags::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    runtime.block_on(run(flags))
}

async fn run(flags: Flags) -> Result<(), String> {
    telemetry::init_tracing(Some(flags.otel_endpoint.as_str()))?;
    metrics::install_exporter(
        flags
            .metrics_bind_address
            .parse()
            .map_err(|e| format!("invalid metrics bind address: {e}"))?,
    )?;
    tracing::info!(leader_elect = flags.leader_elect, "warden starting");

    // Probes.
    let readiness = Readiness::new();
    {
        let bind = flags
            .health_probe_bind_address
            .parse()
            .map_err(|e| format!("invalid probe bind address: {e}"))?;
        let readiness = readiness.clone();
        tokio::spawn(async move {
            if let Err(error) = probes::serve(bind, readiness).await {
                tracing::error!("probe server exited: {error}");
            }
        });
    }

    // Declarations.
    let (agents, environments) = load_declarations(&flags.agents_dir).await?;
    tracing::info!(
        agents = agents.len(),
        environments = environments.len(),
        "declarations loaded"
    );

    // Shared services.
    let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
    let store = Arc::new(MemoryRunStore::new());
    let cache = Arc::new(SkillCache::default());
    let loader = Arc::new(SkillLoader::new(cache));
    let cooldowns = Arc::new(CooldownTracker::new());
    let tracker = RunTracker::new();
    let environments: Arc<dyn EnvironmentSource> = Arc::new(environments);

    let runner = Arc::new(
        Runner::new(store.clone(), loader, environments, cooldowns)
            .with_event_bus(bus.clone())
            .with_run_tracker(tracker.clone()),
    );

    // Provider + tools for scheduled runs.  Concrete tool integrations
    // register here at deployment time; the registry starts empty.
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
    let provider: Arc<dyn ChatProvider> =
        Arc::new(RetryingProvider::new(Arc::new(AnthropicProvider::new(api_key))));
    let tools = Arc::new(ToolRegistry::new());

    let limiter = RateLimiter::new(RateLimiterConfig {
        max_concurrent_cluster: flags.max_concurrent_cluster,
        max_concurrent_per_agent: flags.max_concurrent_per_agent,
        ..RateLimiterConfig::default()
    });

    let scheduler = {
        let provider = provider.clone();
        let tools = tools.clone();
        Arc::new(
            Scheduler::new(
                agents,
                limiter,
                runner,
                Box::new(move |_agent: &Agent| RunConfig {
                    provider: provider.clone(),
                    tools: tools.clone(),
                    trigger: Trigger::Scheduled,
                    cleanup: None,
                }),
            )
            .with_event_bus(bus.clone()),
        )
    };

    let shutdown = ShutdownManager::new(tracker, flags.drain_timeout).with_event_bus(bus);

    let scheduler_task = tokio::spawn(scheduler.run(shutdown.subscribe()));
    let retention_task = {
        let scanner = RetentionScanner::new(
            store,
            RetentionConfig {
                ttl: flags.retention_ttl,
                scan_interval: flags.retention_scan_interval,
                max_delete_batch: flags.retention_max_batch,
                preserve_min_per_agent: flags.retention_preserve_min,
            },
        );
        let stop = shutdown.subscribe();
        tokio::spawn(async move { scanner.run(stop).await })
    };

    // Wait for the termination signal, then drain.
    wait_for_signal().await;
    readiness.set_ready(false);
    shutdown.drain().await;
    scheduler_task.abort();
    retention_task.abort();
    tracing::info!("warden stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(error) => {
                tracing::error!("failed to install SIGTERM handler: {error}");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Load agent and environment declarations.
///
/// Layout: `<dir>/*.yaml` are agents; `<dir>/environments/*.yaml` are
/// environments.  An empty dir flag starts the process with nothing
/// scheduled (manual runs still work through the API surface).
async fn load_declarations(
    dir: &str,
) -> Result<(Vec<Agent>, HashMap<String, Environment>), String> {
    let mut agents = Vec::new();
    let mut environments = HashMap::new();
    if dir.is_empty() {
        return Ok((agents, environments));
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| format!("failed to read agents dir '{dir}': {e}"))?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            let agent: Agent = serde_yaml::from_str(&raw)
                .map_err(|e| format!("invalid agent in {}: {e}", path.display()))?;
            agent.validate()?;
            agents.push(agent);
        }
    }

    let env_dir = std::path::Path::new(dir).join("environments");
    if env_dir.is_dir() {
        let mut entries = tokio::fs::read_dir(&env_dir)
            .await
            .map_err(|e| format!("failed to read {}: {e}", env_dir.display()))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
                let environment: Environment = serde_yaml::from_str(&raw)
                    .map_err(|e| format!("invalid environment in {}: {e}", path.display()))?;
                environments.insert(environment.name.clone(), environment);
            }
        }
    }
    Ok((agents, environments))
}
