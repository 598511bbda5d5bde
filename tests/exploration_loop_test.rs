//! 探索循环集成测试：用内存中的假站点、脚本化决策方与记录型通知驱动编排器

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scout::config::AppConfig;
use scout::core::{
    DecisionContext, DecisionError, ExecutorError, Orchestrator, ScoutError, StoreError,
    Termination,
};
use scout::decision::{Decision, DecisionProvider};
use scout::executor::{ActionExecutor, ActionKind, ActionResult, InteractiveElement, Observation};
use scout::learning::{pattern_id, ConfidenceMetrics, PatternMemory};
use scout::notify::NotificationSink;
use scout::session::{Session, SessionStatus, SessionStore};
use tempfile::TempDir;

const PAGES: usize = 4;

/// 四个页面，每页 #e1..#e4 与 #next；点击 #next 进入下一页
#[derive(Default)]
struct FakeSite {
    page: Mutex<usize>,
    fail_launch: bool,
    fail_observe: bool,
    crash_on_execute: bool,
    launched: AtomicBool,
    closed: AtomicUsize,
}

impl FakeSite {
    fn observation(&self) -> Observation {
        let page = self.current_page();
        let mut elements: Vec<InteractiveElement> = (1..=4)
            .map(|i| InteractiveElement {
                tag: "button".into(),
                selector: format!("#e{}", i),
                text: format!("Element {}", i),
                kind: "button".into(),
            })
            .collect();
        elements.push(InteractiveElement {
            tag: "a".into(),
            selector: "#next".into(),
            text: "Next".into(),
            kind: "link".into(),
        });
        Observation::new(format!("https://site.test/p{}", page), format!("Page {}", page))
            .with_elements(elements)
            .with_dom("<main>fake</main>")
    }

    fn current_page(&self) -> usize {
        *self.page.lock().unwrap()
    }
}

#[async_trait]
impl ActionExecutor for FakeSite {
    async fn launch(&self) -> Result<(), ExecutorError> {
        if self.fail_launch {
            return Err(ExecutorError::Launch("no browser installed".into()));
        }
        self.launched.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&self, _url: &str) -> Result<Observation, ExecutorError> {
        *self.page.lock().unwrap() = 1;
        Ok(self.observation())
    }

    async fn observe(&self) -> Result<Observation, ExecutorError> {
        if self.fail_observe {
            return Err(ExecutorError::Observation("renderer busy".into()));
        }
        Ok(self.observation())
    }

    async fn execute(
        &self,
        kind: ActionKind,
        selector: Option<&str>,
        _value: Option<&str>,
    ) -> Result<ActionResult, ExecutorError> {
        if self.crash_on_execute {
            return Err(ExecutorError::Unavailable("browser disconnected".into()));
        }
        match (kind, selector) {
            (ActionKind::Click, Some("#next")) => {
                let mut page = self.page.lock().unwrap();
                *page = (*page + 1).min(PAGES);
                Ok(ActionResult::ok("clicked next")
                    .with_new_url(Some(format!("https://site.test/p{}", *page))))
            }
            (_, Some(s)) if s.starts_with("#e") => Ok(ActionResult::ok(format!("acted on {}", s))),
            (_, Some(s)) => Ok(ActionResult::failed(format!("no element {}", s))),
            (_, None) => Ok(ActionResult::ok("done")),
        }
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// 按脚本依次返回决策；脚本用完后返回 fallback
struct ScriptedDecider {
    script: Mutex<VecDeque<Result<Decision, DecisionError>>>,
    when_empty: Decision,
    contexts: Mutex<Vec<DecisionContext>>,
    tokens: Option<(u64, u64, u64)>,
}

impl ScriptedDecider {
    fn new(script: Vec<Result<Decision, DecisionError>>, when_empty: Decision) -> Self {
        Self {
            script: Mutex::new(script.into()),
            when_empty,
            contexts: Mutex::new(Vec::new()),
            tokens: None,
        }
    }

    fn with_tokens(mut self, tokens: (u64, u64, u64)) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecider {
    async fn decide(&self, _system: &str, context: &DecisionContext) -> Result<Decision, DecisionError> {
        self.contexts.lock().unwrap().push(context.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.when_empty.clone()))
    }

    fn token_usage(&self) -> Option<(u64, u64, u64)> {
        self.tokens
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify_complete(&self, session: &Session, _m: &ConfidenceMetrics, report: &str) -> bool {
        assert!(report.contains(session.id()));
        self.events.lock().unwrap().push(format!("complete:{}", session.status()));
        true
    }

    async fn notify_error(&self, session: &Session, error: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .push(format!("error:{}:{}", session.status(), error));
        true
    }
}

fn click(selector: &str) -> Result<Decision, DecisionError> {
    Ok(Decision::perform(ActionKind::Click, Some(selector), format!("explore {}", selector)))
}

fn test_config(dir: &TempDir, max_iterations: usize) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.app.data_dir = dir.path().to_path_buf();
    cfg.learning.max_iterations = max_iterations;
    cfg.learning.action_delay_ms = 0;
    cfg
}

fn orchestrator(
    cfg: AppConfig,
    site: &Arc<FakeSite>,
    decider: &Arc<ScriptedDecider>,
    notifier: &Arc<RecordingNotifier>,
) -> Orchestrator {
    Orchestrator::new(cfg, site.clone(), decider.clone(), notifier.clone())
        .unwrap()
        .with_system_prompt("test system prompt")
}

#[tokio::test]
async fn test_converges_after_visiting_four_pages() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir, 50);
    let site = Arc::new(FakeSite::default());
    let script = vec![
        click("#e1"),
        click("#next"),
        click("#e2"),
        click("#next"),
        click("#e3"),
        click("#next"),
        click("#e4"),
    ];
    let decider = Arc::new(ScriptedDecider::new(
        script,
        Decision::perform(ActionKind::Wait, None, "idle"),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(cfg.clone(), &site, &decider, &notifier);

    let result = orch.learn("https://site.test/p1").await;

    assert_eq!(result.termination, Termination::Converged);
    assert!(result.success());
    let session = &result.session;
    assert_eq!(session.actions().len(), 7);
    assert_eq!(session.unique_page_urls().len(), 4);
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.total_elements_found(), 5);
    assert_eq!(session.elements_explored(), 5);
    // coverage 1.0, success 1.0, stability 1.0, depth 0.5 + 0.25
    assert!((result.metrics.weighted_score() - 0.95).abs() < 1e-9);
    assert!((session.confidence_score() - 0.95).abs() < 1e-9);
    assert_eq!(session.metadata.get("termination").map(String::as_str), Some("converged"));
    assert_eq!(session.metadata.get("initial_title").map(String::as_str), Some("Page 1"));
    assert!(!session.metadata.contains_key("llm_tokens"));
    assert_eq!(session.actions()[2].page_url, "https://site.test/p2");
    assert!(result.report.as_deref().unwrap().contains("Unique Pages Visited: 4"));

    assert!(site.launched.load(Ordering::SeqCst));
    assert_eq!(site.closed.load(Ordering::SeqCst), 1);
    assert_eq!(*notifier.events.lock().unwrap(), vec!["complete:completed".to_string()]);

    // 第二轮上下文中 #e1 已标记为探索过
    let contexts = decider.contexts.lock().unwrap();
    assert_eq!(contexts.len(), 7);
    let second = &contexts[1];
    assert!(second.elements.iter().any(|e| e.element.selector == "#e1" && e.explored));
    assert!(second.elements.iter().any(|e| e.element.selector == "#e2" && !e.explored));

    let stored = SessionStore::open(cfg.sessions_dir()).unwrap().load(session.id()).unwrap();
    assert_eq!(&stored, session);

    let patterns = PatternMemory::open(cfg.patterns_dir()).unwrap();
    assert_eq!(patterns.len(), 5);
    let next = patterns.get(&pattern_id("site.test", "#next")).unwrap();
    assert_eq!(next.success_count, 3);
    assert_eq!(next.element_kind, "link");
}

#[tokio::test]
async fn test_voluntary_completion() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite::default());
    let decider = Arc::new(
        ScriptedDecider::new(vec![], Decision::complete("nothing to learn")).with_tokens((900, 100, 1000)),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(test_config(&dir, 10), &site, &decider, &notifier);

    let result = orch.learn("https://site.test/p1").await;

    assert_eq!(result.termination, Termination::Voluntary);
    assert_eq!(
        result.session.metadata.get("llm_tokens").map(String::as_str),
        Some("900/100/1000")
    );
    assert!(result.session.actions().is_empty());
    assert_eq!(result.session.status(), SessionStatus::Completed);
    assert!(result.report.is_some());
    assert_eq!(site.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_budget_exhausted_is_completed() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite::default());
    let decider = Arc::new(ScriptedDecider::new(
        vec![],
        Decision::perform(ActionKind::Wait, None, "waiting").with_value("0"),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(test_config(&dir, 3), &site, &decider, &notifier);

    let result = orch.learn("https://site.test/p1").await;

    assert_eq!(result.termination, Termination::Exhausted);
    assert!(result.success());
    assert_eq!(result.session.actions().len(), 3);
    assert_eq!(result.session.status(), SessionStatus::Completed);
    assert_eq!(
        result.session.metadata.get("termination").map(String::as_str),
        Some("exhausted")
    );
    // 无选择器的动作不写模式
    assert!(orch.patterns().is_empty());
}

#[tokio::test]
async fn test_decision_error_becomes_fallback_wait() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite::default());
    let decider = Arc::new(ScriptedDecider::new(
        vec![Err(DecisionError::Transport("connection reset".into()))],
        Decision::complete("done"),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(test_config(&dir, 10), &site, &decider, &notifier);

    let result = orch.learn("https://site.test/p1").await;

    assert_eq!(result.termination, Termination::Voluntary);
    let actions = result.session.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_kind, ActionKind::Wait);
    assert_eq!(actions[0].value.as_deref(), Some("1"));
    assert!(actions[0].reasoning.contains("connection reset"));
    assert!(actions[0].success);
}

#[tokio::test]
async fn test_launch_failure_is_persisted_and_reported() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir, 10);
    let site = Arc::new(FakeSite {
        fail_launch: true,
        ..Default::default()
    });
    let decider = Arc::new(ScriptedDecider::new(vec![], Decision::complete("unused")));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(cfg.clone(), &site, &decider, &notifier);

    let result = orch.learn("https://site.test/p1").await;

    assert!(!result.success());
    assert!(matches!(result.termination, Termination::Failed(ref e) if e.contains("no browser installed")));
    assert_eq!(result.session.status(), SessionStatus::Failed);
    assert!(result.report.is_none());
    assert_eq!(site.closed.load(Ordering::SeqCst), 1);
    assert!(decider.contexts.lock().unwrap().is_empty());

    let events = notifier.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("error:failed:"));

    let stored = SessionStore::open(cfg.sessions_dir())
        .unwrap()
        .load(result.session.id())
        .unwrap();
    assert_eq!(stored.status(), SessionStatus::Failed);
    assert_eq!(stored.metadata.get("failed_phase").map(String::as_str), Some("launching"));
    assert!(stored.metadata.contains_key("error"));
}

#[tokio::test]
async fn test_executor_crash_mid_run_fails() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite {
        crash_on_execute: true,
        ..Default::default()
    });
    let decider = Arc::new(ScriptedDecider::new(vec![click("#e1")], Decision::complete("done")));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(test_config(&dir, 10), &site, &decider, &notifier);

    let result = orch.learn("https://site.test/p1").await;

    assert!(matches!(result.termination, Termination::Failed(_)));
    assert!(result.session.actions().is_empty());
    assert_eq!(
        result.session.metadata.get("failed_phase").map(String::as_str),
        Some("executing")
    );
    assert_eq!(site.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_observation_failure_reuses_last_state() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite {
        fail_observe: true,
        ..Default::default()
    });
    let decider = Arc::new(ScriptedDecider::new(
        vec![click("#next"), click("#e2"), click("#missing")],
        Decision::complete("done"),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(test_config(&dir, 10), &site, &decider, &notifier);

    let result = orch.learn("https://site.test/p1").await;

    assert_eq!(result.termination, Termination::Voluntary);
    let actions = result.session.actions();
    assert_eq!(actions.len(), 3);
    // 页面已变化，但观察失败，记录的仍是上一次观察的 URL
    assert!(actions.iter().all(|a| a.page_url == "https://site.test/p1"));
    assert!(!actions[2].success);
    assert!((result.session.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(
        orch.patterns()
            .get(&pattern_id("site.test", "#missing"))
            .map(|p| (p.element_kind.as_str(), p.failure_count)),
        Some(("unknown", 1))
    );
}

#[tokio::test]
async fn test_resume_starts_linked_session() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite::default());
    let decider = Arc::new(ScriptedDecider::new(vec![], Decision::complete("done")));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut orch = orchestrator(test_config(&dir, 10), &site, &decider, &notifier);

    let first = orch.learn("https://site.test/p1").await;
    let resumed = orch.resume(first.session.id()).await.unwrap();

    assert_ne!(resumed.session.id(), first.session.id());
    assert_eq!(resumed.session.target_url(), first.session.target_url());
    assert_eq!(
        resumed.session.metadata.get("resumed_from").map(String::as_str),
        Some(first.session.id())
    );
    // 原会话保持终态
    let first_stored = orch.sessions().load(first.session.id()).unwrap();
    assert_eq!(first_stored.status(), SessionStatus::Completed);
    assert_eq!(orch.sessions().list(10).unwrap().len(), 2);

    match orch.resume("deadbeef").await {
        Err(ScoutError::Store(StoreError::NotFound(id))) => assert_eq!(id, "deadbeef"),
        other => panic!("Expected NotFound, got {:?}", other.map(|r| r.termination)),
    }
    let escaping = format!("../sessions/{}", first.session.id());
    match orch.resume(&escaping).await {
        Err(ScoutError::Store(StoreError::NotFound(id))) => assert_eq!(id, escaping),
        other => panic!("Expected NotFound, got {:?}", other.map(|r| r.termination)),
    }
}
