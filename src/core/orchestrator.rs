//! 外壳编排器：主控循环
//!
//! 负责：加载配置、创建承载面/意图服务/语音协作者、建立 cmd/state 两通道，
//! 并在后台任务中消费用户命令，驱动 Shell 的状态迁移并更新 UI 状态。
//! 所有状态修改都在这一个任务里串行完成；等待外部协作者的调用放进独立任务，结果以内部事件回到循环。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::assistant::{
    ConversationPersistence, FastGptClassifier, IntentClassifier, Proposal, RuleClassifier,
    TurnOutcome,
};
use crate::browser::{ContentSurface, HttpSurface, LoadOutcome, TabId};
use crate::config::{load_config, AppConfig};
use crate::core::shell::{
    Collaborators, ExecutionPlan, ExecutionReport, ProposalRequest, Shell, ShellOptions,
    SpeechJob, TranscriptionJob,
};
use crate::core::{ShellError, UiState};
use crate::systems::{load_systems, BuiltinRegistry, JsonSystemRegistry, SystemRegistry};
use crate::voice::{
    HttpTranscriber, NoAudioInput, NoTranscriber, SilentSpeech, Transcriber, VoiceState,
};

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 向助手发送一句话
    Send(String),
    /// 确认待执行的高风险操作
    Confirm,
    /// 取消待执行的高风险操作
    Cancel,
    /// 在新标签中打开业务系统（按 id）
    OpenSystem(String),
    /// 新建标签，可带地址
    NewTab(Option<String>),
    /// 关闭标签；None 表示活动标签
    CloseTab(Option<TabId>),
    SelectTab(TabId),
    NextTab,
    PrevTab,
    /// 在活动标签中导航
    Navigate(String),
    Refresh,
    Back,
    Forward,
    StartListening,
    StopListening,
    /// 播报一段文本
    Speak(String),
    /// 清空助手会话（中止进行中的提案、释放录音）
    ResetAssistant,
    /// 退出应用
    Quit,
}

/// 后台任务回报给主控循环的事件
#[derive(Debug)]
enum Event {
    Proposal {
        ticket: u64,
        result: Result<Proposal, ShellError>,
    },
    Executed(ExecutionReport),
    Loaded(LoadOutcome),
    Transcribed(Result<String, ShellError>),
    Spoke(Result<(), ShellError>),
    HistoryMoved(Result<(), ShellError>),
}

/// 编排器运行选项
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// 对话持久化；None 时不写盘
    pub persistence: Option<ConversationPersistence>,
    /// 助手回复后自动播报
    pub speak_replies: bool,
}

struct Runtime {
    shell: Shell,
    events: mpsc::UnboundedSender<Event>,
    options: RuntimeOptions,
}

impl Runtime {
    fn spawn_proposal(&self, request: ProposalRequest) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let (ticket, result) = request.run().await;
            let _ = tx.send(Event::Proposal { ticket, result });
        });
    }

    fn spawn_plan(&self, plan: ExecutionPlan) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let loads = tx.clone();
            let report = plan
                .run_with(move |outcome| {
                    let _ = loads.send(Event::Loaded(outcome));
                })
                .await;
            let _ = tx.send(Event::Executed(report));
        });
    }

    fn spawn_load(&self, request: crate::browser::LoadRequest) {
        let tx = self.events.clone();
        let nav = self.shell.navigator();
        tokio::spawn(async move {
            let outcome = nav.load(request).await;
            let _ = tx.send(Event::Loaded(outcome));
        });
    }

    fn spawn_transcription(&self, job: TranscriptionJob) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let _ = tx.send(Event::Transcribed(job.run().await));
        });
    }

    fn spawn_speech(&self, job: SpeechJob) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let _ = tx.send(Event::Spoke(job.run().await));
        });
    }

    fn spawn_history(&self, tab: TabId, forward: bool) {
        let tx = self.events.clone();
        let nav = self.shell.navigator();
        tokio::spawn(async move {
            let result = if forward {
                nav.forward(tab).await
            } else {
                nav.back(tab).await
            };
            let _ = tx.send(Event::HistoryMoved(result));
        });
    }

    fn persist(&self) {
        if let Some(store) = &self.options.persistence {
            if let Err(e) = store.save(self.shell.messages()) {
                tracing::warn!(error = %e, path = %store.path().display(), "conversation save failed");
            }
        }
    }

    /// 处理一条命令；返回 false 表示退出
    fn handle_command(&mut self, cmd: Command) -> bool {
        tracing::debug!(?cmd, "command");
        let result: Result<(), ShellError> = match cmd {
            Command::Send(text) => self.shell.begin_send(&text).map(|r| self.spawn_proposal(r)),
            Command::Confirm => self.shell.confirm().map(|p| self.spawn_plan(p)),
            Command::Cancel => self.shell.cancel().map(|()| self.persist()),
            Command::OpenSystem(id) => self.shell.open_system(&id).map(|r| self.spawn_load(r)),
            Command::NewTab(url) => self.shell.new_tab(url.as_deref()).map(|r| {
                if let Some(r) = r {
                    self.spawn_load(r);
                }
            }),
            Command::CloseTab(id) => self.close_tab(id),
            Command::SelectTab(id) => self.shell.select_tab(id),
            Command::NextTab => self.shell.cycle_tab(true),
            Command::PrevTab => self.shell.cycle_tab(false),
            Command::Navigate(raw) => self.shell.navigate_active(&raw).map(|r| self.spawn_load(r)),
            Command::Refresh => self.shell.refresh_active().map(|r| self.spawn_load(r)),
            Command::Back => self.shell.active_tab_id().map(|t| self.spawn_history(t, false)),
            Command::Forward => self.shell.active_tab_id().map(|t| self.spawn_history(t, true)),
            Command::StartListening => self.shell.start_listening(),
            Command::StopListening => self.shell.stop_listening().map(|j| self.spawn_transcription(j)),
            Command::Speak(text) => self.shell.begin_speaking(&text).map(|j| self.spawn_speech(j)),
            Command::ResetAssistant => {
                self.shell.reset_assistant();
                self.persist();
                Ok(())
            }
            Command::Quit => {
                self.shell.shutdown();
                self.persist();
                return false;
            }
        };
        if let Err(e) = result {
            self.shell.report(&e);
        }
        true
    }

    fn close_tab(&mut self, id: Option<TabId>) -> Result<(), ShellError> {
        let id = match id {
            Some(id) => id,
            None => self.shell.active_tab_id()?,
        };
        self.shell.close_tab(id)?;
        self.persist();
        let nav = self.shell.navigator();
        tokio::spawn(async move { nav.surface().close(id).await });
        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Proposal { ticket, result } => {
                let (outcome, plan) = self.shell.proposal_ready(ticket, result);
                match (&outcome, plan) {
                    (TurnOutcome::Discarded, _) => return,
                    (_, Some(plan)) => self.spawn_plan(plan),
                    (_, None) => self.persist(),
                }
                self.speak_latest_reply();
            }
            Event::Executed(report) => {
                self.shell.execution_finished(report);
                self.persist();
            }
            Event::Loaded(outcome) => {
                self.shell.load_finished(outcome);
            }
            Event::Transcribed(result) => match self.shell.transcript_received(result) {
                Ok(Some(request)) => self.spawn_proposal(request),
                Ok(None) => {}
                Err(e) => self.shell.report(&e),
            },
            Event::Spoke(result) => {
                if let Err(e) = self.shell.speaking_finished(result) {
                    self.shell.report(&e);
                }
            }
            Event::HistoryMoved(result) => {
                if let Err(e) = result {
                    self.shell.report(&e);
                }
            }
        }
    }

    fn speak_latest_reply(&mut self) {
        if !self.options.speak_replies || self.shell.voice_state() != VoiceState::Idle {
            return;
        }
        let Some(text) = self.shell.messages().last().map(|m| m.content.clone()) else {
            return;
        };
        match self.shell.begin_speaking(&text) {
            Ok(job) => self.spawn_speech(job),
            Err(e) => tracing::debug!(error = %e, "reply not spoken"),
        }
    }
}

/// 启动主控循环：返回命令发送端、状态接收端与循环任务句柄
pub fn spawn_shell(
    shell: Shell,
    options: RuntimeOptions,
) -> (
    mpsc::UnboundedSender<Command>,
    watch::Receiver<UiState>,
    JoinHandle<()>,
) {
    // 两通道：UI -> Core 命令；Core -> UI 状态快照
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(shell.snapshot());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut runtime = Runtime {
        shell,
        events: event_tx,
        options,
    };

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let keep_running = match cmd {
                        Some(cmd) => runtime.handle_command(cmd),
                        // cmd_tx 已全部关闭
                        None => {
                            runtime.shell.shutdown();
                            runtime.persist();
                            false
                        }
                    };
                    let _ = state_tx.send(runtime.shell.snapshot());
                    if !keep_running {
                        break;
                    }
                }
                Some(event) = event_rx.recv() => {
                    runtime.handle_event(event);
                    let _ = state_tx.send(runtime.shell.snapshot());
                }
            }
        }
    });

    (cmd_tx, state_rx, handle)
}

/// 根据配置选择承载面（HTTP 探测 / Headless Chrome）
pub(crate) fn create_surface_from_config(cfg: &AppConfig) -> anyhow::Result<Arc<dyn ContentSurface>> {
    let kind = cfg.surface.kind.to_lowercase();
    if kind == "chrome" {
        #[cfg(feature = "browser")]
        {
            tracing::info!("Using headless Chrome surface");
            return Ok(Arc::new(crate::browser::ChromeSurface::new()));
        }
        #[cfg(not(feature = "browser"))]
        tracing::warn!("surface.kind = chrome requires the `browser` feature; using HTTP surface");
    }
    let surface = HttpSurface::new(cfg.surface.load_timeout).map_err(anyhow::Error::msg)?;
    tracing::info!("Using HTTP surface");
    Ok(Arc::new(surface))
}

/// 根据配置与环境变量选择意图服务（FastGPT / 规则）
pub(crate) fn create_classifier_from_config(
    cfg: &AppConfig,
) -> anyhow::Result<Arc<dyn IntentClassifier>> {
    let provider = cfg.assistant.provider.to_lowercase();
    if provider == "fastgpt" {
        match cfg.assistant.api_key() {
            Some(key) => {
                let client = FastGptClassifier::new(
                    &cfg.assistant.endpoint,
                    &key,
                    cfg.assistant.request_timeout,
                )?;
                tracing::info!(endpoint = %cfg.assistant.endpoint, "Using FastGPT intent service");
                return Ok(Arc::new(client));
            }
            None => tracing::warn!(
                env = %cfg.assistant.api_key_env,
                "FastGPT selected but API key is not set, using rule classifier"
            ),
        }
    }
    Ok(Arc::new(RuleClassifier::new()))
}

fn create_transcriber_from_config(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Transcriber>> {
    match (&cfg.voice.asr_endpoint, cfg.voice.enabled) {
        (Some(endpoint), true) => Ok(Arc::new(HttpTranscriber::new(
            endpoint,
            cfg.voice.asr_api_key.clone(),
            &cfg.voice.language,
            cfg.assistant.request_timeout,
        )?)),
        _ => Ok(Arc::new(NoTranscriber)),
    }
}

/// 按配置组装外部协作者
pub fn build_collaborators(cfg: &AppConfig) -> anyhow::Result<Collaborators> {
    let surface = create_surface_from_config(cfg)?;
    let classifier = create_classifier_from_config(cfg)?;
    let transcriber = create_transcriber_from_config(cfg)?;
    Ok(Collaborators::with_surface(surface)
        .classifier(classifier)
        .voice(Arc::new(NoAudioInput), transcriber, Arc::new(SilentSpeech)))
}

/// 创建外壳运行时：返回命令发送端、状态接收端；后台任务消费命令并更新 state。
pub async fn create_shell(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(mpsc::UnboundedSender<Command>, watch::Receiver<UiState>)> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let collab = build_collaborators(&cfg)?;

    let registry: Box<dyn SystemRegistry> = match &cfg.systems.registry_path {
        Some(path) => Box::new(JsonSystemRegistry::new(path)),
        None => Box::new(BuiltinRegistry),
    };

    let persistence = cfg.app.history_path.as_ref().map(ConversationPersistence::new);
    let history = match &persistence {
        Some(store) => store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "conversation history not loaded");
            Vec::new()
        }),
        None => Vec::new(),
    };

    let mut options = ShellOptions::from_config(&cfg);
    options.systems = load_systems(registry.as_ref());
    options.history = history;

    let shell = Shell::new(collab, options);
    let (cmd_tx, state_rx, _handle) = spawn_shell(
        shell,
        RuntimeOptions {
            persistence,
            speak_replies: cfg.voice.enabled && cfg.voice.tts_enabled,
        },
    );
    Ok((cmd_tx, state_rx))
}
