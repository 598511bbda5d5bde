//! 主控循环：观察 → 决策 → 执行 → 记录 → 评分，直到决策方结束、置信度收敛或预算耗尽
//!
//! 编排器独占 Session，执行器、决策方、通知都通过 trait 注入。
//! 执行器在 launch 之后的每条退出路径上都会被 close；两种终态都会先落盘再通知。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::AppConfig;
use crate::core::{
    summary_report, DecisionContext, ExecutorError, LoopPhase, ScoutError, Termination,
};
use crate::decision::{load_system_prompt, Decision, DecisionKind, DecisionProvider};
use crate::executor::{ActionExecutor, Observation};
use crate::learning::{ConfidenceMetrics, ConfidenceModel, PatternMemory};
use crate::notify::NotificationSink;
use crate::session::{ActionRecord, Session, SessionStatus, SessionStore};

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct LearningResult {
    pub session: Session,
    pub metrics: ConfidenceMetrics,
    pub termination: Termination,
    /// 成功结束时的总结报告
    pub report: Option<String>,
}

impl LearningResult {
    pub fn success(&self) -> bool {
        !self.termination.is_failure()
    }

    pub fn message(&self) -> String {
        match &self.termination {
            Termination::Failed(e) => format!("Learning failed: {}", e),
            other => format!("Learning completed successfully ({})", other),
        }
    }
}

/// URL 的 host[:port]，作为模式记忆的域名键
pub fn domain_of(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(u) => match (u.host_str(), u.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// 编排器
pub struct Orchestrator {
    config: AppConfig,
    executor: Arc<dyn ActionExecutor>,
    decider: Arc<dyn DecisionProvider>,
    notifier: Arc<dyn NotificationSink>,
    sessions: SessionStore,
    patterns: PatternMemory,
    model: ConfidenceModel,
    system_prompt: String,
    phase: LoopPhase,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        executor: Arc<dyn ActionExecutor>,
        decider: Arc<dyn DecisionProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, ScoutError> {
        config.learning.validate().map_err(ScoutError::Config)?;
        let sessions = SessionStore::open(config.sessions_dir())?;
        let patterns = PatternMemory::open(config.patterns_dir())?;
        let model = ConfidenceModel::new(config.learning.confidence_threshold);
        Ok(Self {
            config,
            executor,
            decider,
            notifier,
            sessions,
            patterns,
            model,
            system_prompt: load_system_prompt(),
            phase: LoopPhase::Idle,
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn patterns(&self) -> &PatternMemory {
        &self.patterns
    }

    /// 对 URL 开始一次新的探索
    pub async fn learn(&mut self, url: &str) -> LearningResult {
        let session = Session::create(url);
        self.run(session).await
    }

    /// 以已保存会话的目标 URL 开始新的运行，新会话记录 resumed_from
    pub async fn resume(&mut self, session_id: &str) -> Result<LearningResult, ScoutError> {
        let previous = self.sessions.load(session_id)?;
        let mut session = Session::create(previous.target_url());
        session
            .metadata
            .insert("resumed_from".to_string(), previous.id().to_string());
        self.sessions.save(&session)?;
        tracing::info!(
            session_id = %session.id(),
            resumed_from = %previous.id(),
            previous_status = %previous.status(),
            "Resuming exploration"
        );
        Ok(self.run(session).await)
    }

    async fn run(&mut self, mut session: Session) -> LearningResult {
        let domain = domain_of(session.target_url());
        tracing::info!(
            session_id = %session.id(),
            url = %session.target_url(),
            domain = %domain,
            "Starting learning session"
        );

        let outcome = self.explore(&mut session, &domain).await;
        self.executor.close().await;
        let failed_phase = self.phase;
        self.enter(LoopPhase::Finished);
        self.record_token_usage(&mut session);

        match outcome {
            Ok((metrics, termination)) => {
                session.set_confidence_score(metrics.weighted_score());
                session
                    .metadata
                    .insert("termination".to_string(), termination.as_str().to_string());
                session.finish(SessionStatus::Completed);
                self.persist(&session);

                let report = summary_report(&session, &metrics);
                tracing::info!(
                    session_id = %session.id(),
                    termination = %termination,
                    actions = session.actions().len(),
                    confidence = metrics.weighted_score(),
                    "Learning session finished"
                );
                self.notifier.notify_complete(&session, &metrics, &report).await;

                LearningResult {
                    session,
                    metrics,
                    termination,
                    report: Some(report),
                }
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(
                    session_id = %session.id(),
                    phase = %failed_phase,
                    error = %error,
                    "Learning failed"
                );
                session.metadata.insert("error".to_string(), error.clone());
                session
                    .metadata
                    .insert("failed_phase".to_string(), failed_phase.to_string());
                session.finish(SessionStatus::Failed);
                self.persist(&session);
                self.notifier.notify_error(&session, &error).await;

                LearningResult {
                    session,
                    metrics: ConfidenceMetrics::default(),
                    termination: Termination::Failed(error),
                    report: None,
                }
            }
        }
    }

    async fn explore(
        &mut self,
        session: &mut Session,
        domain: &str,
    ) -> Result<(ConfidenceMetrics, Termination), ExecutorError> {
        self.enter(LoopPhase::Launching);
        self.executor.launch().await?;
        let mut observation = self.executor.navigate(session.target_url()).await?;
        session.observe_elements(observation.elements.len());
        session
            .metadata
            .insert("initial_title".to_string(), observation.title.clone());

        let mut explored: HashSet<String> = HashSet::new();
        let mut metrics = ConfidenceMetrics::default();
        let max_iterations = self.config.learning.max_iterations;
        let delay = Duration::from_millis(self.config.learning.action_delay_ms);

        for iteration in 0..max_iterations {
            if iteration > 0 {
                self.enter(LoopPhase::Observing);
                self.refresh_observation(session, &mut observation).await;
            }
            tracing::info!(
                session_id = %session.id(),
                iteration = iteration + 1,
                max = max_iterations,
                confidence = metrics.weighted_score(),
                "Learning iteration"
            );

            self.enter(LoopPhase::Deciding);
            let decision = self.decide(session, &observation, &explored, domain).await;
            let kind = match decision.kind {
                DecisionKind::Complete => {
                    tracing::info!(reasoning = %decision.reasoning, "Decision provider signaled completion");
                    return Ok((metrics, Termination::Voluntary));
                }
                DecisionKind::Perform(kind) => kind,
            };

            self.enter(LoopPhase::Executing);
            let result = self
                .executor
                .execute(kind, decision.selector.as_deref(), decision.value.as_deref())
                .await?;
            if !result.success {
                tracing::debug!(
                    action = %kind,
                    selector = ?decision.selector,
                    error = ?result.error,
                    "Action failed"
                );
            }

            self.enter(LoopPhase::Recording);
            session.add_action(
                ActionRecord::new(
                    kind,
                    decision.selector.clone(),
                    decision.value.clone(),
                    decision.reasoning.clone(),
                    result.success,
                    observation.url.clone(),
                )
                .with_observation_ref(observation.screenshot_ref()),
            );
            if let Some(selector) = decision.selector.as_deref() {
                explored.insert(selector.to_string());
                session.set_elements_explored(explored.len());
                let element_kind = observation.element_kind(selector).unwrap_or("unknown");
                if let Err(e) =
                    self.patterns
                        .record_outcome(domain, element_kind, selector, kind, result.success)
                {
                    tracing::warn!(selector, error = %e, "Failed to persist pattern");
                }
            }

            self.enter(LoopPhase::Scoring);
            metrics = self.model.evaluate(session);
            session.set_confidence_score(metrics.weighted_score());
            let unique_pages = session.unique_page_urls().len();
            if self.model.is_learning_complete(&metrics, unique_pages) {
                tracing::info!(unique_pages, "Confidence threshold reached, completing learning");
                return Ok((metrics, Termination::Converged));
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!(max_iterations, "Iteration budget exhausted");
        Ok((metrics, Termination::Exhausted))
    }

    /// 观察失败时沿用上一次的观察
    async fn refresh_observation(&self, session: &mut Session, observation: &mut Observation) {
        match self.executor.observe().await {
            Ok(fresh) => {
                session.observe_elements(fresh.elements.len());
                *observation = fresh;
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %observation.url, "Failed to get page state, reusing last observation");
            }
        }
    }

    /// 决策失败替换为兜底 wait
    async fn decide(
        &self,
        session: &Session,
        observation: &Observation,
        explored: &HashSet<String>,
        domain: &str,
    ) -> Decision {
        let context = {
            let patterns = self
                .patterns
                .top_patterns(domain, self.config.learning.max_context_patterns);
            DecisionContext::build(session, observation, explored, &patterns, &self.config.learning)
        };
        match self.decider.decide(&self.system_prompt, &context).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "Decision failed, falling back to wait");
                Decision::fallback(&e)
            }
        }
    }

    /// 把决策方累计的 token 用量写入会话元数据
    fn record_token_usage(&self, session: &mut Session) {
        let Some((prompt, completion, total)) = self.decider.token_usage() else {
            return;
        };
        tracing::info!(
            session_id = %session.id(),
            prompt_tokens = prompt,
            completion_tokens = completion,
            total_tokens = total,
            "LLM token usage"
        );
        session
            .metadata
            .insert("llm_tokens".to_string(), format!("{}/{}/{}", prompt, completion, total));
    }

    fn enter(&mut self, phase: LoopPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
    }

    /// 落盘失败只记日志，运行结果照常返回
    fn persist(&self, session: &Session) {
        if let Err(e) = self.sessions.save(session) {
            tracing::error!(session_id = %session.id(), error = %e, "Failed to save session");
        }
    }
}
