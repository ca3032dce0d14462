// End-to-end run execution through the public API with a scripted provider.
// Run with: cargo test --test run_loop

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use warden::agent::{
    Agent, AutonomyLevel, Environment, Guardrails, ModelSettings, ModelTier, Reporting, SkillRef,
};
use warden::ai::{
    ChatProvider, CompletionRequest, CompletionResponse, ProviderResult, StopReason, TokenUsage,
    ToolCall,
};
use warden::run::orchestrator::EnvironmentSource;
use warden::run::{RunConfig, RunPhase, Runner, Trigger};
use warden::safety::{ActionStatus, CooldownTracker};
use warden::skills::{SkillCache, SkillLoader};
use warden::store::{MemoryRunStore, RunStore};
use warden::tools::{Tool, ToolRegistry};

struct ScriptedProvider {
    responses: Vec<CompletionResponse>,
    index: AtomicUsize,
}

impl ScriptedProvider {
    fn new(responses: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            index: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .get(i.min(self.responses.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| text("done")))
    }
}

fn text(content: &str) -> CompletionResponse {
    CompletionResponse {
        content: content.to_string(),
        tool_calls: vec![],
        usage: TokenUsage {
            input_tokens: 50,
            output_tokens: 50,
        },
        stop_reason: StopReason::EndTurn,
    }
}

fn tool_call(name: &str, args: Value) -> CompletionResponse {
    CompletionResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: "c1".to_string(),
            name: name.to_string(),
            args,
        }],
        usage: TokenUsage {
            input_tokens: 50,
            output_tokens: 50,
        },
        stop_reason: StopReason::ToolUse,
    }
}

struct KubectlGet;

#[async_trait]
impl Tool for KubectlGet {
    fn name(&self) -> &str {
        "kubectl.get"
    }
    fn description(&self) -> &str {
        "read Kubernetes resources"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _args: Value) -> Result<String, String> {
        Ok("NAME READY STATUS\nweb-1 1/1 Running".to_string())
    }
}

fn watchman() -> Agent {
    Agent {
        name: "watchman-light".to_string(),
        namespace: "ops".to_string(),
        emoji: None,
        schedule: None,
        model: ModelSettings {
            tier: ModelTier::Light,
            token_budget: 50_000,
            timeout: Duration::from_secs(30),
        },
        skills: vec![SkillRef {
            name: "cluster-health".to_string(),
            source: "bundled".to_string(),
        }],
        guardrails: Guardrails {
            autonomy: AutonomyLevel::Safe,
            ..Guardrails::default()
        },
        reporting: Reporting::default(),
        environment_ref: "staging".to_string(),
    }
}

fn wiring(store: Arc<MemoryRunStore>) -> Runner {
    let mut envs = HashMap::new();
    envs.insert(
        "staging".to_string(),
        Environment {
            name: "staging".to_string(),
            ..Environment::default()
        },
    );
    let environments: Arc<dyn EnvironmentSource> = Arc::new(envs);
    Runner::new(
        store,
        Arc::new(SkillLoader::new(Arc::new(SkillCache::default()))),
        environments,
        Arc::new(CooldownTracker::new()),
    )
}

fn config(provider: Arc<dyn ChatProvider>) -> RunConfig {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(KubectlGet));
    RunConfig {
        provider,
        tools: Arc::new(tools),
        trigger: Trigger::Manual,
        cleanup: None,
    }
}

#[tokio::test]
async fn bundled_skill_read_run_end_to_end() {
    let provider = ScriptedProvider::new(vec![
        tool_call("kubectl.get", json!({"resource": "pods", "namespace": "backstage"})),
        text("INFO: all pods healthy"),
    ]);
    let store = Arc::new(MemoryRunStore::new());
    let run = wiring(store.clone())
        .execute(&watchman(), config(provider))
        .await
        .unwrap();

    assert_eq!(run.phase, RunPhase::Succeeded);
    assert_eq!(run.usage.iterations, 2);
    assert_eq!(run.usage.tokens_in + run.usage.tokens_out, 200);
    assert_eq!(run.actions.len(), 1);
    assert_eq!(run.actions[0].status, ActionStatus::Executed);
    assert_eq!(run.actions[0].tier.as_str(), "read");
    assert_eq!(run.findings.len(), 1);

    // The stored record matches the returned one and is terminal.
    let stored = store.get(&run.id).await.unwrap();
    assert_eq!(stored.phase, RunPhase::Succeeded);
    assert!(stored.completion_time.is_some());
}

#[tokio::test]
async fn namespace_deletion_is_blocked_and_audited() {
    let provider = ScriptedProvider::new(vec![
        tool_call(
            "kubectl.delete",
            json!({"resource": "namespace", "name": "backstage"}),
        ),
        text("the deletion was refused; no changes were made"),
    ]);
    let store = Arc::new(MemoryRunStore::new());
    let run = wiring(store)
        .execute(&watchman(), config(provider))
        .await
        .unwrap();

    assert_eq!(run.phase, RunPhase::Blocked);
    assert_eq!(run.guardrails.actions_blocked, 1);
    assert_eq!(run.guardrails.checks_performed, 1);
    let record = &run.actions[0];
    assert_eq!(record.status, ActionStatus::Blocked);
    assert_eq!(record.pre_flight_check.data_protection, "BLOCKED");
    assert_eq!(record.tier.as_str(), "data-mutation");
}

#[tokio::test]
async fn cleanup_hook_runs_after_finalize() {
    let provider = ScriptedProvider::new(vec![text("nothing to do")]);
    let store = Arc::new(MemoryRunStore::new());
    let cleaned = Arc::new(AtomicUsize::new(0));
    let flag = cleaned.clone();

    let mut cfg = config(provider);
    cfg.cleanup = Some(Box::new(move || {
        Box::pin(async move {
            flag.fetch_add(1, Ordering::SeqCst);
        })
    }));

    let run = wiring(store).execute(&watchman(), cfg).await.unwrap();
    assert_eq!(run.phase, RunPhase::Succeeded);
    assert_eq!(cleaned.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_runs_produce_disjoint_records() {
    let store = Arc::new(MemoryRunStore::new());
    let runner = Arc::new(wiring(store.clone()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let runner = runner.clone();
        let provider = ScriptedProvider::new(vec![text("ok")]);
        handles.push(tokio::spawn(async move {
            runner.execute(&watchman(), config(provider)).await.unwrap()
        }));
    }
    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let run = handle.await.unwrap();
        assert_eq!(run.phase, RunPhase::Succeeded);
        ids.insert(run.id);
    }
    assert_eq!(ids.len(), 4);
    assert_eq!(store.len(), 4);
}
