//! 外壳聚合：标签存储、导航控制器、操作中介、语音会话与外部协作者
//!
//! Shell 只做同步的状态迁移，并产出需要等待外部协作者的工作：提案请求、加载请求、执行计划、
//! 识别与播报任务。编排器把这些工作放进独立任务，结果再经 `*_ready` / `*_finished` 回到 Shell。
//! `send` / `confirm_and_wait` 在当前任务内直接等待，供测试与无界面场景使用。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::assistant::{
    Action, ActionKind, ActionMediator, ConversationLog, ExecutionRecord, IntentClassifier,
    Message, Proposal, RiskClassifier, RuleClassifier, TurnOutcome, TurnTicket,
};
use crate::browser::{
    ContentSurface, LoadOutcome, LoadRequest, NavigationController, TabId, TabStore,
};
use crate::config::AppConfig;
use crate::core::{SessionSupervisor, ShellError, ShellPhase, UiState};
use crate::systems::BusinessSystem;
use crate::voice::{
    AudioBuffer, AudioCapture, NoAudioInput, NoTranscriber, SilentSpeech, SpeechSynthesizer,
    Transcriber, VoiceSession, VoiceState,
};

/// 外部协作者
#[derive(Clone)]
pub struct Collaborators {
    pub surface: Arc<dyn ContentSurface>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub capture: Arc<dyn AudioCapture>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

impl Collaborators {
    /// 只指定承载面：规则意图服务、无录音设备、未配置识别、静默播报
    pub fn with_surface(surface: Arc<dyn ContentSurface>) -> Self {
        Self {
            surface,
            classifier: Arc::new(RuleClassifier::new()),
            capture: Arc::new(NoAudioInput),
            transcriber: Arc::new(NoTranscriber),
            speech: Arc::new(SilentSpeech),
        }
    }

    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn voice(
        mut self,
        capture: Arc<dyn AudioCapture>,
        transcriber: Arc<dyn Transcriber>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        self.capture = capture;
        self.transcriber = transcriber;
        self.speech = speech;
        self
    }
}

/// 外壳选项（通常来自 AppConfig）
#[derive(Clone, Debug)]
pub struct ShellOptions {
    pub max_history: usize,
    pub extra_high_kinds: Vec<String>,
    /// 单个操作（加载或页面内操作）的超时
    pub action_timeout: Duration,
    pub greeting: Option<String>,
    pub systems: Vec<BusinessSystem>,
    /// 启动时恢复的历史消息
    pub history: Vec<Message>,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ShellOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_history: cfg.app.max_history,
            extra_high_kinds: cfg.risk.extra_high_kinds.clone(),
            action_timeout: Duration::from_secs(cfg.surface.load_timeout.max(1)),
            greeting: Some(cfg.assistant.greeting.clone()).filter(|g| !g.trim().is_empty()),
            systems: Vec::new(),
            history: Vec::new(),
        }
    }
}

/// 一次等待意图服务的提案请求
pub struct ProposalRequest {
    pub ticket: TurnTicket,
    token: CancellationToken,
    classifier: Arc<dyn IntentClassifier>,
}

impl ProposalRequest {
    pub fn ticket_id(&self) -> u64 {
        self.ticket.id
    }

    /// 调用意图服务；轮次被取消时立即返回，结果交回 `Shell::proposal_ready`
    pub async fn run(self) -> (u64, Result<Proposal, ShellError>) {
        let id = self.ticket.id;
        let result = tokio::select! {
            _ = self.token.cancelled() => {
                Err(ShellError::transient(self.classifier.name(), "cancelled"))
            }
            r = self.classifier.propose(&self.ticket.history, &self.ticket.utterance) => r,
        };
        (id, result)
    }
}

enum Step {
    Load { action: Action, request: LoadRequest },
    Dispatch { action: Action, tab: TabId },
    Rejected { action: Action, reason: String },
}

/// 按提案顺序执行的一批操作
pub struct ExecutionPlan {
    pub message_id: Uuid,
    steps: Vec<Step>,
    nav: NavigationController,
    timeout: Duration,
}

/// 执行计划的结果：逐个操作的记录
#[derive(Debug)]
pub struct ExecutionReport {
    pub message_id: Uuid,
    pub records: Vec<ExecutionRecord>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 依次执行；每个加载一结束就交给 `on_load` 回写标签，每个操作输出一条 JSON 审计日志
    pub async fn run_with<F>(self, mut on_load: F) -> ExecutionReport
    where
        F: FnMut(LoadOutcome),
    {
        let mut records = Vec::with_capacity(self.steps.len());

        for step in self.steps {
            let start = Instant::now();
            let (action, tab, result) = match step {
                Step::Load { action, request } => {
                    let tab_id = request.tab_id;
                    let seq = request.seq;
                    let outcome = match timeout(self.timeout, self.nav.load(request)).await {
                        Ok(outcome) => outcome,
                        Err(_) => LoadOutcome {
                            tab_id,
                            seq,
                            result: Err("页面加载超时".to_string()),
                        },
                    };
                    let result = outcome.result.as_ref().map(|_| ()).map_err(Clone::clone);
                    on_load(outcome);
                    (action, Some(tab_id), result)
                }
                Step::Dispatch { action, tab } => {
                    let dispatch = self.nav.surface().dispatch_action(tab, &action);
                    let result = match timeout(self.timeout, dispatch).await {
                        Ok(r) => r,
                        Err(_) => Err("操作超时".to_string()),
                    };
                    (action, Some(tab), result)
                }
                Step::Rejected { action, reason } => (action, None, Err(reason)),
            };
            audit(&action, tab, &result, start.elapsed());
            records.push(ExecutionRecord { action, result });
        }

        ExecutionReport {
            message_id: self.message_id,
            records,
        }
    }
}

fn audit(action: &Action, tab: Option<TabId>, result: &Result<(), String>, elapsed: Duration) {
    let audit = serde_json::json!({
        "event": "action_audit",
        "kind": action.kind.name(),
        "target": action.target,
        "risk": action.risk_tier,
        "tab": tab.map(TabId::as_u64),
        "ok": result.is_ok(),
        "error": result.as_ref().err(),
        "duration_ms": elapsed.as_millis() as u64,
    });
    tracing::info!(audit = %audit, "action");
}

/// 录音结束后交给识别服务的工作
pub struct TranscriptionJob {
    pub audio: AudioBuffer,
    transcriber: Arc<dyn Transcriber>,
}

impl TranscriptionJob {
    pub async fn run(self) -> Result<String, ShellError> {
        self.transcriber.transcribe(self.audio).await
    }
}

/// 一次播报
pub struct SpeechJob {
    pub text: String,
    speech: Arc<dyn SpeechSynthesizer>,
}

impl SpeechJob {
    pub async fn run(self) -> Result<(), ShellError> {
        self.speech.speak(&self.text).await
    }
}

/// 外壳状态聚合
pub struct Shell {
    tabs: TabStore,
    nav: NavigationController,
    mediator: ActionMediator,
    voice: VoiceSession,
    supervisor: SessionSupervisor,
    collab: Collaborators,
    systems: Vec<BusinessSystem>,
    greeting: Option<String>,
    action_timeout: Duration,
    error_message: Option<String>,
}

impl Shell {
    pub fn new(collab: Collaborators, options: ShellOptions) -> Self {
        let log = ConversationLog::with_messages(options.max_history, options.history);
        let risk = RiskClassifier::new().with_extra_high(options.extra_high_kinds);
        let mut shell = Self {
            tabs: TabStore::new(),
            nav: NavigationController::new(Arc::clone(&collab.surface)),
            mediator: ActionMediator::new(log, risk),
            voice: VoiceSession::new(),
            supervisor: SessionSupervisor::new(),
            collab,
            systems: options.systems,
            greeting: options.greeting,
            action_timeout: options.action_timeout,
            error_message: None,
        };
        if shell.mediator.log().is_empty() {
            shell.greet();
        }
        shell
    }

    fn greet(&mut self) {
        if let Some(greeting) = self.greeting.clone() {
            self.mediator.say(greeting);
        }
    }

    pub fn tabs(&self) -> &TabStore {
        &self.tabs
    }

    pub fn mediator(&self) -> &ActionMediator {
        &self.mediator
    }

    pub fn messages(&self) -> &[Message] {
        self.mediator.log().messages()
    }

    pub fn voice_state(&self) -> VoiceState {
        self.voice.state()
    }

    pub fn systems(&self) -> &[BusinessSystem] {
        &self.systems
    }

    /// 可移入后台任务的导航控制器（加载、前进后退、关闭标签）
    pub fn navigator(&self) -> NavigationController {
        self.nav.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.supervisor.cancel_token()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// 记录面向用户的错误提示（从不终止会话）
    pub fn report(&mut self, err: &ShellError) {
        tracing::warn!(error = %err, "shell error");
        self.error_message = Some(err.to_string());
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// 投影为 UI 状态
    pub fn snapshot(&self) -> UiState {
        let thinking = self.mediator.is_busy();
        let awaiting = self.mediator.pending().is_some();
        let executing = self.mediator.is_executing();
        UiState {
            phase: ShellPhase::derive(self.voice.state(), thinking, awaiting, executing),
            systems: self.systems.clone(),
            tabs: self.tabs.list_tabs().to_vec(),
            active_tab: self.tabs.active_id(),
            history: self.messages().to_vec(),
            pending: self.mediator.pending().cloned(),
            voice: self.voice.state(),
            input_locked: thinking || awaiting || executing,
            error_message: self.error_message.clone(),
        }
    }

    // ---- 标签与导航 ----

    pub fn active_tab_id(&self) -> Result<TabId, ShellError> {
        self.tabs
            .active_id()
            .ok_or_else(|| ShellError::NotFound("no open tab".to_string()))
    }

    /// 新建标签；给出地址时立即导航
    pub fn new_tab(&mut self, url: Option<&str>) -> Result<Option<LoadRequest>, ShellError> {
        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => self.nav.open_in_new_tab(&mut self.tabs, url).map(Some),
            None => {
                self.tabs.create_tab("");
                Ok(None)
            }
        }
    }

    /// 关闭标签；针对该标签的进行中提案被中止，待确认操作作废
    pub fn close_tab(&mut self, id: TabId) -> Result<(), ShellError> {
        self.tabs.close_tab(id)?;
        if self.mediator.abort_for_tab(id) {
            self.supervisor.cancel_turn();
            tracing::info!(tab = %id, "in-flight proposal aborted by tab close");
        }
        self.mediator.void_pending_for_tab(id);
        Ok(())
    }

    pub fn select_tab(&mut self, id: TabId) -> Result<(), ShellError> {
        self.tabs.set_active(id)
    }

    /// 循环切换到相邻标签
    pub fn cycle_tab(&mut self, forward: bool) -> Result<(), ShellError> {
        let current = self.active_tab_id()?;
        let tabs = self.tabs.list_tabs();
        let pos = tabs.iter().position(|t| t.id == current).unwrap_or(0);
        let len = tabs.len();
        let next = if forward { (pos + 1) % len } else { (pos + len - 1) % len };
        let id = tabs[next].id;
        self.tabs.set_active(id)
    }

    /// 在活动标签中导航；没有标签时新建
    pub fn navigate_active(&mut self, raw: &str) -> Result<LoadRequest, ShellError> {
        match self.tabs.active_id() {
            Some(id) => self.nav.navigate(&mut self.tabs, id, raw),
            None => self.nav.open_in_new_tab(&mut self.tabs, raw),
        }
    }

    pub fn refresh_active(&mut self) -> Result<LoadRequest, ShellError> {
        let id = self.active_tab_id()?;
        self.nav.refresh(&mut self.tabs, id)
    }

    /// 侧栏选择业务系统：在新标签中打开
    pub fn open_system(&mut self, system_id: &str) -> Result<LoadRequest, ShellError> {
        let system = self
            .systems
            .iter()
            .find(|s| s.id == system_id)
            .cloned()
            .ok_or_else(|| ShellError::NotFound(format!("system {system_id}")))?;
        let request = self.nav.open_in_new_tab(&mut self.tabs, &system.url)?;
        self.tabs.set_title(request.tab_id, system.name)?;
        Ok(request)
    }

    pub fn load_finished(&mut self, outcome: LoadOutcome) -> bool {
        self.nav.complete(&mut self.tabs, outcome)
    }

    // ---- 助手 ----

    /// 开始一轮对话：校验、写入用户消息、绑定活动标签并领取本轮取消 token
    pub fn begin_send(&mut self, text: &str) -> Result<ProposalRequest, ShellError> {
        let ticket = self.mediator.begin_turn(text, self.tabs.active_id())?;
        let token = self.supervisor.begin_turn();
        self.error_message = None;
        tracing::info!(ticket = ticket.id, classifier = self.collab.classifier.name(), "proposal requested");
        Ok(ProposalRequest {
            ticket,
            token,
            classifier: Arc::clone(&self.collab.classifier),
        })
    }

    /// 接收提案；全部低风险时返回需立即执行的计划
    pub fn proposal_ready(
        &mut self,
        ticket_id: u64,
        result: Result<Proposal, ShellError>,
    ) -> (TurnOutcome, Option<ExecutionPlan>) {
        if self.mediator.in_flight_ticket() == Some(ticket_id) {
            self.supervisor.end_turn();
        }
        let outcome = self.mediator.complete_turn(ticket_id, result);
        let plan = match &outcome {
            TurnOutcome::Execute {
                message_id,
                tab,
                actions,
            } if !actions.is_empty() => Some(self.prepare(*message_id, *tab, actions.clone())),
            _ => None,
        };
        (outcome, plan)
    }

    /// 确认待执行操作：只执行这一个
    pub fn confirm(&mut self) -> Result<ExecutionPlan, ShellError> {
        let pending = self.mediator.confirm()?;
        tracing::info!(action = %pending.action.describe(), tab = ?pending.tab, "confirmed");
        Ok(self.prepare(pending.message_id, pending.tab, vec![pending.action]))
    }

    /// 取消待执行操作：整批不执行
    pub fn cancel(&mut self) -> Result<(), ShellError> {
        self.mediator.cancel()?;
        tracing::info!("pending action cancelled");
        Ok(())
    }

    /// 把操作落到发起该轮时的标签：Navigate 走导航控制器，其余派发到该标签。
    /// 发起时没有标签则由第一个 Navigate 新建，后续操作跟随新标签。
    fn prepare(&mut self, message_id: Uuid, tab: Option<TabId>, actions: Vec<Action>) -> ExecutionPlan {
        let mut target = tab;
        let mut steps = Vec::with_capacity(actions.len());
        for action in actions {
            let closed = target.is_some_and(|id| self.tabs.get(id).is_none());
            let step = match action.kind {
                _ if closed => Step::Rejected {
                    action,
                    reason: "目标页面已关闭".to_string(),
                },
                ActionKind::Navigate => {
                    let request = match target {
                        Some(id) => self.nav.navigate(&mut self.tabs, id, &action.target),
                        None => self.nav.open_in_new_tab(&mut self.tabs, &action.target),
                    };
                    match request {
                        Ok(request) => {
                            target = Some(request.tab_id);
                            Step::Load { action, request }
                        }
                        Err(e) => Step::Rejected {
                            action,
                            reason: e.to_string(),
                        },
                    }
                }
                _ => match target {
                    Some(tab) => Step::Dispatch { action, tab },
                    None => Step::Rejected {
                        action,
                        reason: "没有打开的页面".to_string(),
                    },
                },
            };
            steps.push(step);
        }
        ExecutionPlan {
            message_id,
            steps,
            nav: self.nav.clone(),
            timeout: self.action_timeout,
        }
    }

    /// 回写执行记录到助手消息（加载结果已在执行过程中逐个回写）
    pub fn execution_finished(&mut self, report: ExecutionReport) {
        if let Err(e) = self.mediator.finish_execution(report.message_id, &report.records) {
            tracing::warn!(error = %e, "execution result not recorded");
        }
    }

    /// 在当前任务内执行计划，加载结果随到随写
    async fn run_plan(&mut self, plan: ExecutionPlan) {
        let (nav, tabs) = (&self.nav, &mut self.tabs);
        let report = plan
            .run_with(|outcome| {
                nav.complete(tabs, outcome);
            })
            .await;
        self.execution_finished(report);
    }

    /// 发送并在当前任务内等待整轮完成（含低风险操作的执行）
    pub async fn send(&mut self, text: &str) -> Result<TurnOutcome, ShellError> {
        let request = self.begin_send(text)?;
        let (ticket_id, result) = request.run().await;
        let (outcome, plan) = self.proposal_ready(ticket_id, result);
        if let Some(plan) = plan {
            self.run_plan(plan).await;
        }
        Ok(outcome)
    }

    /// 确认并等待执行完成
    pub async fn confirm_and_wait(&mut self) -> Result<(), ShellError> {
        let plan = self.confirm()?;
        self.run_plan(plan).await;
        Ok(())
    }

    // ---- 语音 ----

    pub fn start_listening(&mut self) -> Result<(), ShellError> {
        self.voice.start(self.collab.capture.as_ref())
    }

    pub fn stop_listening(&mut self) -> Result<TranscriptionJob, ShellError> {
        let audio = self.voice.stop()?;
        Ok(TranscriptionJob {
            audio,
            transcriber: Arc::clone(&self.collab.transcriber),
        })
    }

    /// 识别结果：非空文本按输入处理，开始新一轮
    pub fn transcript_received(
        &mut self,
        result: Result<String, ShellError>,
    ) -> Result<Option<ProposalRequest>, ShellError> {
        match self.voice.transcript_ready(result)? {
            Some(text) => {
                tracing::info!(chars = text.chars().count(), "transcript forwarded");
                self.begin_send(&text).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn begin_speaking(&mut self, text: &str) -> Result<SpeechJob, ShellError> {
        self.voice.begin_speaking()?;
        Ok(SpeechJob {
            text: text.to_string(),
            speech: Arc::clone(&self.collab.speech),
        })
    }

    pub fn speaking_finished(&mut self, result: Result<(), ShellError>) -> Result<(), ShellError> {
        self.voice.speaking_finished(result)
    }

    /// 录音、识别、播报一整圈（测试与无界面场景）
    pub async fn listen_and_send(&mut self) -> Result<Option<TurnOutcome>, ShellError> {
        let job = self.stop_listening()?;
        let transcript = job.run().await;
        match self.transcript_received(transcript)? {
            Some(request) => {
                let (ticket_id, result) = request.run().await;
                let (outcome, plan) = self.proposal_ready(ticket_id, result);
                if let Some(plan) = plan {
                    self.run_plan(plan).await;
                }
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    // ---- 生命周期 ----

    /// 重置助手会话：中止进行中的提案、清空记录与待确认、释放录音
    pub fn reset_assistant(&mut self) {
        self.supervisor.cancel_turn();
        self.mediator.abort_in_flight();
        self.mediator.reset();
        self.voice.teardown();
        self.error_message = None;
        self.greet();
        tracing::info!("assistant session reset");
    }

    /// 外壳退出：取消所有进行中的请求并释放录音
    pub fn shutdown(&mut self) {
        self.supervisor.shutdown();
        self.mediator.abort_in_flight();
        self.voice.teardown();
        tracing::info!("shell shut down");
    }
}
