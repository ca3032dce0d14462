//! The run orchestrator: drives one agent run end to end.
//!
//! ```text
//! assemble prompt (skills + environment)
//!       │
//!       ▼
//! create Run (pending) ──► running
//!       │
//!       ▼
//! loop: LLM.complete ──► no tool calls? ──► capture report, exit
//!       │ tool calls
//!       ▼
//! for each call: extract target → SafetyEngine.evaluate
//!   blocked          → record + feed "BLOCKED: …" back to the model
//!   pendingApproval  → record + feed approval notice back
//!   skipped          → record + feed cooldown notice back
//!   allowed          → execute, record, RecordExecution on success
//!       │
//!       ▼
//! prune history; iterate until budget / iterations / deadline
//!       │
//!       ▼
//! finalize (fresh 15 s context) ──► cleanup hook (fresh 10 s context)
//! ```

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::Instrument;

use crate::agent::{Agent, Environment};
use crate::ai::{
    ChatMessage, ChatProvider, CompletionRequest, ProviderError, ToolResultBlock,
};
use crate::event_bus::{AppEvent, EventBus};
use crate::lifecycle::RunTracker;
use crate::prompt;
use crate::safety::{ActionStatus, CooldownTracker, SafetyEngine};
use crate::skills::{Skill, SkillLoader};
use crate::store::RunStore;
use crate::telemetry::metrics;
use crate::tools::{ToolRegistry, extract_target};

use super::findings::extract_findings;
use super::record::{ActionRecord, EscalationRecord, Run, RunPhase, Trigger};
use super::sanitize::sanitize_action_result;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Per-call output-token ceiling; conservative because the loop iterates.
const MAX_TOKENS_PER_CALL: u64 = 8192;

/// Exchange pairs retained after pruning (plus the task instruction).
const DEFAULT_PRUNE_PAIRS: usize = 4;

/// Budget for the terminal status write, independent of the run context.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(15);

/// Budget for the post-run cleanup hook (credential teardown).
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The opening user turn of every run.
const TASK_INSTRUCTION: &str = "execute your task now.";

/// Closing user message sent on the final iteration, with tools withheld.
const FINAL_ITERATION_NOTICE: &str =
    "This is your final iteration. Tools are no longer available. \
     Produce your final report now.";

// ─── Config & errors ─────────────────────────────────────────────────────────

/// Post-run cleanup hook (e.g. credential teardown).
pub type CleanupHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-run wiring produced by the scheduler's factory.
pub struct RunConfig {
    pub provider: Arc<dyn ChatProvider>,
    pub tools: Arc<ToolRegistry>,
    pub trigger: Trigger,
    pub cleanup: Option<CleanupHook>,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Resolves environment references for agents.
pub trait EnvironmentSource: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Environment>;
}

impl EnvironmentSource for HashMap<String, Environment> {
    fn resolve(&self, name: &str) -> Option<Environment> {
        self.get(name).cloned()
    }
}

// ─── Runner ──────────────────────────────────────────────────────────────────

pub struct Runner {
    store: Arc<dyn RunStore>,
    loader: Arc<SkillLoader>,
    environments: Arc<dyn EnvironmentSource>,
    cooldowns: Arc<CooldownTracker>,
    bus: Option<Arc<dyn EventBus>>,
    tracker: Option<Arc<RunTracker>>,
    prune_pairs: usize,
}

impl Runner {
    pub fn new(
        store: Arc<dyn RunStore>,
        loader: Arc<SkillLoader>,
        environments: Arc<dyn EnvironmentSource>,
        cooldowns: Arc<CooldownTracker>,
    ) -> Self {
        Self {
            store,
            loader,
            environments,
            cooldowns,
            bus: None,
            tracker: None,
            prune_pairs: DEFAULT_PRUNE_PAIRS,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_run_tracker(mut self, tracker: Arc<RunTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_prune_pairs(mut self, pairs: usize) -> Self {
        self.prune_pairs = pairs.max(1);
        self
    }

    /// Execute one run of `agent` and return the terminal record.
    pub async fn execute(&self, agent: &Agent, cfg: RunConfig) -> Result<Run, RunError> {
        let span = tracing::info_span!(
            "agent.run",
            agent = %agent.qualified_name(),
            trigger = cfg.trigger.as_str(),
        );
        let _guard = self.tracker.as_ref().map(|t| t.clone().track());
        metrics::active_runs_delta(1);
        let result = self.execute_inner(agent, cfg).instrument(span).await;
        metrics::active_runs_delta(-1);
        result
    }

    async fn execute_inner(&self, agent: &Agent, mut cfg: RunConfig) -> Result<Run, RunError> {
        let agent_name = agent.qualified_name();
        let model = agent.model.tier.default_model().to_string();
        let started = Instant::now();
        let deadline = started + agent.model.timeout;

        let mut run = Run::new(&agent_name, &agent.environment_ref, cfg.trigger, &model);
        self.store.create(&run).await?;

        // Assemble.  Failure synthesizes a failed run — no retries.
        let assembled = async {
            let environment = self
                .environments
                .resolve(&agent.environment_ref)
                .ok_or_else(|| format!("unknown environment '{}'", agent.environment_ref))?;
            let mut skills: Vec<Arc<Skill>> = Vec::with_capacity(agent.skills.len());
            for skill_ref in &agent.skills {
                let skill = self
                    .loader
                    .resolve(&skill_ref.name, &skill_ref.source, &agent.namespace)
                    .await
                    .map_err(|e| format!("skill '{}': {e}", skill_ref.name))?;
                skills.push(skill);
            }
            let refs: Vec<&Skill> = skills.iter().map(Arc::as_ref).collect();
            let assembled = prompt::assemble(agent, &refs, &environment, &model);
            for warning in &assembled.warnings {
                tracing::warn!(agent = %agent_name, "{warning}");
            }
            Ok::<_, String>((assembled, environment))
        }
        .instrument(tracing::info_span!("agent.assemble"))
        .await;

        let (assembled, environment) = match assembled {
            Ok(parts) => parts,
            Err(error) => {
                run.phase = RunPhase::Failed;
                run.report = format!("assembly failed: {error}");
                self.finalize(&mut run, started, &agent_name).await;
                return Ok(run);
            }
        };

        run.phase = RunPhase::Running;
        let _ = self.store.update_status(&run).await;
        self.publish(AppEvent::RunStarted {
            run_id: run.id.clone(),
            agent: agent_name.clone(),
            trigger: cfg.trigger.as_str().to_string(),
        });

        let engine = SafetyEngine::new(
            agent_name.clone(),
            agent.guardrails.clone(),
            assembled.action_registry.clone(),
            environment.data_resource_index(),
            self.cooldowns.clone(),
        )
        .with_tool_registry(cfg.tools.clone());

        let outcome = self
            .conversation_loop(
                agent,
                &cfg,
                &engine,
                &assembled.system_prompt,
                &model,
                deadline,
                &mut run,
            )
            .await;

        // Terminal-phase selection, in precedence order.
        run.phase = if run.guardrails.escalations_triggered > 0 && outcome.failure.is_none() {
            RunPhase::Escalated
        } else if !run.actions.is_empty()
            && run
                .actions
                .iter()
                .all(|a| a.status == ActionStatus::Blocked)
        {
            RunPhase::Blocked
        } else if let Some(reason) = outcome.failure {
            run.report = reason;
            RunPhase::Failed
        } else {
            RunPhase::Succeeded
        };

        self.finalize(&mut run, started, &agent_name).await;

        if let Some(cleanup) = cfg.cleanup.take() {
            if tokio::time::timeout(CLEANUP_TIMEOUT, cleanup()).await.is_err() {
                tracing::warn!(agent = %agent_name, "cleanup hook exceeded its deadline");
            }
        }

        Ok(run)
    }

    // ── Conversation loop ────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn conversation_loop(
        &self,
        agent: &Agent,
        cfg: &RunConfig,
        engine: &SafetyEngine,
        system_prompt: &str,
        model: &str,
        deadline: Instant,
        run: &mut Run,
    ) -> LoopOutcome {
        let agent_name = agent.qualified_name();
        let max_iterations = agent.guardrails.max_iterations.max(1);
        let token_budget = agent.model.token_budget;
        let mut messages = vec![ChatMessage::user(TASK_INSTRUCTION)];
        let mut total_tokens: u64 = 0;
        let mut last_turn_tokens: u64 = 0;
        let mut seq: u32 = 0;
        let mut outcome = LoopOutcome::default();
        run.guardrails.autonomy_ceiling = agent.guardrails.autonomy.as_str().to_string();

        for iteration in 1..=max_iterations {
            // Budget check: stop when spent, or when another turn of the
            // same size would overrun.
            let exhausted = total_tokens >= token_budget
                || (iteration > 1 && total_tokens + last_turn_tokens > token_budget);
            if exhausted {
                outcome.failure = Some(format!(
                    "token budget exhausted: {total_tokens}/{token_budget} used"
                ));
                break;
            }

            let final_iteration = iteration == max_iterations;
            if final_iteration {
                messages.push(ChatMessage::user(FINAL_ITERATION_NOTICE));
            }

            let request = CompletionRequest {
                system_prompt: system_prompt.to_string(),
                messages: messages.clone(),
                // Tools are withheld on the final iteration so the model
                // must write its report instead of requesting another call.
                tools: if final_iteration {
                    Vec::new()
                } else {
                    cfg.tools.definitions()
                },
                model: model.to_string(),
                max_tokens: token_budget.saturating_sub(total_tokens).min(MAX_TOKENS_PER_CALL),
            };

            let chat_span = tracing::info_span!(
                "gen_ai.chat",
                gen_ai.system = cfg.provider.name(),
                gen_ai.request.model = model,
                gen_ai.usage.input_tokens = tracing::field::Empty,
                gen_ai.usage.output_tokens = tracing::field::Empty,
                iteration,
            );
            let response = match tokio::time::timeout_at(
                deadline.into(),
                cfg.provider.complete(request).instrument(chat_span.clone()),
            )
            .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(error)) => {
                    outcome.failure = Some(match error {
                        ProviderError::Cancelled => "wall-clock timeout exceeded".to_string(),
                        other => sanitize_action_result(&format!("provider error: {other}")),
                    });
                    break;
                }
                Err(_) => {
                    outcome.failure = Some("wall-clock timeout exceeded".to_string());
                    break;
                }
            };

            run.usage.iterations = iteration;
            run.usage.tokens_in += response.usage.input_tokens;
            run.usage.tokens_out += response.usage.output_tokens;
            last_turn_tokens = response.usage.total();
            total_tokens += last_turn_tokens;
            chat_span.record("gen_ai.usage.input_tokens", response.usage.input_tokens);
            chat_span.record("gen_ai.usage.output_tokens", response.usage.output_tokens);
            metrics::record_iteration(&agent_name);
            metrics::record_tokens(&agent_name, model, last_turn_tokens);

            if response.tool_calls.is_empty() || final_iteration {
                run.report = response.content;
                break;
            }

            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let target = extract_target(&call.args);
                seq += 1;
                run.guardrails.checks_performed += 1;

                let decision = engine.evaluate_call(&call.name, &target, &call.args);
                let tool_span = tracing::info_span!(
                    "agent.tool_call",
                    tool = %call.name,
                    target = %target,
                    action_tier = decision.tier.as_str(),
                    action_status = tracing::field::Empty,
                    blocked = decision.is_blocked(),
                    block_reason = tracing::field::Empty,
                );
                if decision.is_blocked() {
                    tool_span.record("block_reason", decision.block_reason.as_str());
                }

                let (record, feedback) = async {
                    self.apply_decision(engine, cfg, run, agent, seq, call, &target, decision)
                        .await
                }
                .instrument(tool_span.clone())
                .await;

                tool_span.record("action_status", record.status.as_str());
                run.actions.push(record);
                results.push(feedback);
            }

            messages.push(ChatMessage::assistant_with_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            messages.push(ChatMessage::tool_results(results));
            prune_messages(&mut messages, self.prune_pairs);

            if deadline <= Instant::now() {
                outcome.failure = Some("wall-clock timeout exceeded".to_string());
                break;
            }
        }

        if outcome.failure.is_none() && run.report.is_empty() && run.usage.iterations == 0 {
            outcome.failure = Some("no model response".to_string());
        }
        outcome
    }

    /// Convert one decision into an action record plus the tool-result block
    /// fed back to the model.
    #[allow(clippy::too_many_arguments)]
    async fn apply_decision(
        &self,
        engine: &SafetyEngine,
        cfg: &RunConfig,
        run: &mut Run,
        agent: &Agent,
        seq: u32,
        call: &crate::ai::ToolCall,
        target: &str,
        decision: crate::safety::Decision,
    ) -> (ActionRecord, ToolResultBlock) {
        let agent_name = agent.qualified_name();
        let mut record = ActionRecord {
            seq,
            timestamp: Utc::now(),
            tool: call.name.clone(),
            target: target.to_string(),
            tier: decision.tier,
            pre_flight_check: decision.pre_flight.clone(),
            status: decision.status,
            result: String::new(),
            escalation: None,
        };

        match decision.status {
            ActionStatus::Blocked => {
                run.guardrails.actions_blocked += 1;
                metrics::record_guardrail_block(&agent_name, &call.name);
                record.result = format!("BLOCKED: {}", decision.block_reason);
                self.publish(AppEvent::ActionBlocked {
                    run_id: run.id.clone(),
                    agent: agent_name.clone(),
                    tool: call.name.clone(),
                    target: target.to_string(),
                    reason: decision.block_reason.clone(),
                });
                if let Some(escalation) = &agent.guardrails.escalation {
                    run.guardrails.escalations_triggered += 1;
                    let reason = if escalation.reason.is_empty() {
                        decision.block_reason.clone()
                    } else {
                        escalation.reason.clone()
                    };
                    record.escalation = Some(EscalationRecord {
                        notify: escalation.notify.clone(),
                        reason: reason.clone(),
                    });
                    metrics::record_escalation(&agent_name, "blocked_action");
                    self.publish(AppEvent::EscalationTriggered {
                        run_id: run.id.clone(),
                        agent: agent_name.clone(),
                        notify: escalation.notify.clone(),
                        reason,
                    });
                }
                let feedback = ToolResultBlock {
                    tool_call_id: call.id.clone(),
                    content: record.result.clone(),
                    is_error: true,
                };
                (record, feedback)
            }
            ActionStatus::PendingApproval => {
                record.result = format!("BLOCKED: pending approval: {}", decision.block_reason);
                self.publish(AppEvent::ApprovalNeeded {
                    run_id: run.id.clone(),
                    agent: agent_name.clone(),
                    tool: call.name.clone(),
                    target: target.to_string(),
                });
                let feedback = ToolResultBlock {
                    tool_call_id: call.id.clone(),
                    content: record.result.clone(),
                    is_error: true,
                };
                (record, feedback)
            }
            ActionStatus::Skipped => {
                record.result = format!("SKIPPED: {}", decision.block_reason);
                self.publish(AppEvent::ActionSkipped {
                    run_id: run.id.clone(),
                    agent: agent_name.clone(),
                    tool: call.name.clone(),
                    reason: decision.block_reason.clone(),
                });
                let feedback = ToolResultBlock {
                    tool_call_id: call.id.clone(),
                    content: record.result.clone(),
                    is_error: false,
                };
                (record, feedback)
            }
            _ => {
                // Allowed: execute through the registry (panics are caught
                // at the tool boundary).
                match cfg.tools.execute(&call.name, call.args.clone()).await {
                    Ok(output) => {
                        record.status = ActionStatus::Executed;
                        record.result = sanitize_action_result(&output);
                        if let Some(action) = &decision.matched_action {
                            engine.record_execution(&action.id, target);
                        }
                        let feedback = ToolResultBlock {
                            tool_call_id: call.id.clone(),
                            // The model receives the raw output; only the
                            // audit record is sanitized.
                            content: output,
                            is_error: false,
                        };
                        (record, feedback)
                    }
                    Err(error) => {
                        record.status = ActionStatus::Failed;
                        record.result = sanitize_action_result(&error);
                        let feedback = ToolResultBlock {
                            tool_call_id: call.id.clone(),
                            content: error,
                            is_error: true,
                        };
                        (record, feedback)
                    }
                }
            }
        }
    }

    // ── Finalization ─────────────────────────────────────────────────────────

    /// Write the terminal status under a fresh deadline so the write
    /// survives run-context cancellation.
    async fn finalize(&self, run: &mut Run, started: Instant, agent_name: &str) {
        run.completion_time = Some(Utc::now());
        run.usage.wall_clock_ms = started.elapsed().as_millis() as u64;
        run.guardrails.budget_used = run.usage.tokens_in + run.usage.tokens_out;
        if run.findings.is_empty() {
            run.findings = extract_findings(&run.report);
        }
        for finding in &run.findings {
            metrics::record_finding(agent_name, finding.severity.as_str());
        }

        let write = async {
            match self.store.update_status(run).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(run = %run.id, "terminal status already written");
                }
                Err(error) => {
                    tracing::error!(run = %run.id, "failed to write terminal status: {error}");
                }
            }
        }
        .instrument(tracing::info_span!("agent.report"));
        if tokio::time::timeout(FINALIZE_TIMEOUT, write).await.is_err() {
            tracing::error!(run = %run.id, "terminal status write exceeded its deadline");
        }

        metrics::record_run_completed(
            agent_name,
            run.phase.as_str(),
            run.usage.wall_clock_ms as f64 / 1000.0,
        );
        self.publish(AppEvent::RunCompleted {
            run_id: run.id.clone(),
            agent: agent_name.to_string(),
            phase: run.phase.as_str().to_string(),
        });
    }

    fn publish(&self, event: AppEvent) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(event);
        }
    }
}

#[derive(Default)]
struct LoopOutcome {
    /// Failure reason, when the loop ended without a clean report.
    failure: Option<String>,
}

/// Keep the task instruction plus the last `pairs` exchange pairs.
fn prune_messages(messages: &mut Vec<ChatMessage>, pairs: usize) {
    let cap = 1 + pairs * 2;
    if messages.len() <= cap {
        return;
    }
    let keep_from = messages.len() - pairs * 2;
    let mut pruned = Vec::with_capacity(cap);
    pruned.push(messages[0].clone());
    pruned.extend(messages[keep_from..].iter().cloned());
    *messages = pruned;
}

// ─── Tests ───────────────────────────────────────────────────────────────────
