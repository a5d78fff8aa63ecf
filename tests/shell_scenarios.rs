//! 外壳场景测试：标签、风险确认、取消、语音与主控循环

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use ew_agent::assistant::{
    Action, ActionKind, ConversationPersistence, MessageStatus, Proposal, Role, RuleClassifier,
    ScriptedClassifier, TurnOutcome,
};
use ew_agent::browser::{normalize, LoadState, MockSurface, SurfaceCall, TabId, TabStore};
use ew_agent::core::{
    spawn_shell, Collaborators, Command, RuntimeOptions, Shell, ShellOptions, ShellPhase, UiState,
};
use ew_agent::voice::{MockAudioCapture, RecordingSpeech, ScriptedTranscriber, VoiceState};
use ew_agent::ShellError;

fn quiet_options() -> ShellOptions {
    ShellOptions {
        greeting: None,
        ..ShellOptions::default()
    }
}

/// 已打开 RIS 页面、使用规则意图服务的外壳
async fn shell_on_ris(surface: Arc<MockSurface>) -> Shell {
    let collab = Collaborators::with_surface(surface).classifier(Arc::new(RuleClassifier::new()));
    let mut shell = Shell::new(collab, quiet_options());
    let request = shell.new_tab(Some("http://localhost:8080/ris")).unwrap().unwrap();
    let outcome = shell.navigator().load(request).await;
    assert!(shell.load_finished(outcome));
    shell
}

async fn wait_for<F>(rx: &mut watch::Receiver<UiState>, pred: F) -> UiState
where
    F: Fn(&UiState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pred(&rx.borrow()) {
                return rx.borrow().clone();
            }
            rx.changed().await.expect("orchestrator stopped");
        }
    })
    .await
    .expect("timed out waiting for state")
}

#[test]
fn test_two_tab_scenario() {
    let mut tabs = TabStore::new();
    let ris = tabs.create_tab("http://localhost:8080/ris").id;
    let pis = tabs.create_tab("pis.local").id;

    assert_eq!(tabs.len(), 2);
    assert!(tabs.get(pis).unwrap().is_active);
    assert!(!tabs.get(ris).unwrap().is_active);

    tabs.close_tab(pis).unwrap();
    assert_eq!(tabs.active_id(), Some(ris));
    assert!(tabs.check_invariant());
}

#[test]
fn test_normalize_examples() {
    assert_eq!(normalize("example.com"), "https://example.com");
    assert_eq!(normalize("https://x.y"), "https://x.y");
}

#[tokio::test]
async fn test_delete_confirm_dispatches_exactly_once() {
    let surface = Arc::new(MockSurface::new());
    let mut shell = shell_on_ris(surface.clone()).await;

    let outcome = shell.send("删除该记录").await.unwrap();
    let pending = match outcome {
        TurnOutcome::AwaitingConfirmation(p) => p,
        other => panic!("expected confirmation, got {other:?}"),
    };
    assert_eq!(pending.action.kind, ActionKind::Delete);
    assert!(surface.dispatched().is_empty());
    assert_eq!(shell.snapshot().phase, ShellPhase::AwaitingConfirmation);

    let before = shell.messages().len();
    shell.confirm_and_wait().await.unwrap();

    let dispatched = surface.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].kind, ActionKind::Delete);
    assert!(shell.mediator().pending().is_none());
    // 确认只更新原助手消息，不追加新消息
    assert_eq!(shell.messages().len(), before);
    let reply = shell.messages().last().unwrap();
    assert_eq!(reply.id, pending.message_id);
    assert_eq!(reply.status, MessageStatus::Final);
    assert!(reply.content.contains("✓"));
}

#[tokio::test]
async fn test_delete_cancel_dispatches_nothing() {
    let surface = Arc::new(MockSurface::new());
    let mut shell = shell_on_ris(surface.clone()).await;

    shell.send("删除该记录").await.unwrap();
    let before = shell.messages().len();
    shell.cancel().unwrap();

    assert!(surface.dispatched().is_empty());
    assert!(shell.mediator().pending().is_none());
    assert_eq!(shell.messages().len(), before + 1);
    let last = shell.messages().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(last.content.contains("已取消"));

    assert!(matches!(shell.cancel(), Err(ShellError::NotFound(_))));
    assert!(matches!(shell.confirm(), Err(ShellError::NotFound(_))));
}

#[tokio::test]
async fn test_low_risk_batch_executes_in_order() {
    let surface = Arc::new(MockSurface::new());
    let collab = Collaborators::with_surface(surface.clone());
    let mut shell = Shell::new(collab, quiet_options());

    let outcome = shell.send("打开 eis.local然后搜索 张三").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Execute { .. }));
    assert!(shell.mediator().pending().is_none());

    let calls = surface.calls();
    assert_eq!(calls.len(), 2);
    let tab = shell.tabs().active_id().unwrap();
    assert_eq!(
        calls[0],
        SurfaceCall::Load {
            tab,
            url: "https://eis.local".to_string()
        }
    );
    match &calls[1] {
        SurfaceCall::Dispatch { tab: t, action } => {
            assert_eq!(*t, tab);
            assert_eq!(action.kind, ActionKind::Search);
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(shell.tabs().active().unwrap().load_state, LoadState::Loaded);
    assert_eq!(shell.snapshot().phase, ShellPhase::Idle);
}

#[tokio::test]
async fn test_first_high_action_is_pending_and_nothing_runs() {
    let surface = Arc::new(MockSurface::new());
    let proposal = Proposal::reply("将搜索后提交并删除")
        .with_action(Action::search("当前页面", "张三"))
        .with_action(Action::submit("报告表单"))
        .with_action(Action::delete("旧报告"));
    let classifier = ScriptedClassifier::new().then(proposal);
    let collab = Collaborators::with_surface(surface.clone()).classifier(Arc::new(classifier));
    let mut shell = Shell::new(collab, quiet_options());
    shell.new_tab(None).unwrap();

    let outcome = shell.send("处理张三的报告").await.unwrap();
    match outcome {
        TurnOutcome::AwaitingConfirmation(p) => assert_eq!(p.action.kind, ActionKind::Submit),
        other => panic!("expected confirmation, got {other:?}"),
    }
    assert!(surface.calls().is_empty());

    // 待确认期间的新输入被拒绝
    let err = shell.send("再搜索 李四").await.unwrap_err();
    assert!(matches!(err, ShellError::ResourceConflict(_)));

    shell.confirm_and_wait().await.unwrap();
    let dispatched = surface.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].kind, ActionKind::Submit);
}

#[tokio::test]
async fn test_classifier_failure_keeps_session_usable() {
    let surface = Arc::new(MockSurface::new());
    let classifier = ScriptedClassifier::new().then_fail("connection refused");
    let collab = Collaborators::with_surface(surface).classifier(Arc::new(classifier));
    let mut shell = Shell::new(collab, quiet_options());

    let outcome = shell.send("你好").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    let reply = shell.messages().last().unwrap();
    assert!(matches!(reply.status, MessageStatus::Failed(_)));

    let outcome = shell.send("你好").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Execute { .. }));
    assert_eq!(shell.messages().last().unwrap().status, MessageStatus::Final);
}

#[tokio::test]
async fn test_failed_dispatch_recorded_per_action() {
    let surface = Arc::new(MockSurface::new().fail_kind(ActionKind::Search));
    let mut shell = shell_on_ris(surface.clone()).await;

    shell.send("搜索 张三").await.unwrap();
    let reply = shell.messages().last().unwrap();
    assert_eq!(reply.status, MessageStatus::Final);
    assert!(reply.content.contains("✗"));
    assert_eq!(shell.tabs().active().unwrap().load_state, LoadState::Loaded);
}

/// 在 RIS 之外再打开并加载 PIS，返回两者的 id
async fn open_pis(shell: &mut Shell) -> (TabId, TabId) {
    let ris = shell.tabs().active_id().unwrap();
    let request = shell.new_tab(Some("http://localhost:8080/pis")).unwrap().unwrap();
    let pis = request.tab_id;
    let outcome = shell.navigator().load(request).await;
    assert!(shell.load_finished(outcome));
    (ris, pis)
}

#[tokio::test]
async fn test_confirmed_action_runs_on_proposing_tab() {
    let surface = Arc::new(MockSurface::new());
    let mut shell = shell_on_ris(surface.clone()).await;
    let (ris, pis) = open_pis(&mut shell).await;

    let outcome = shell.send("删除该记录").await.unwrap();
    match outcome {
        TurnOutcome::AwaitingConfirmation(p) => assert_eq!(p.tab, Some(pis)),
        other => panic!("expected confirmation, got {other:?}"),
    }

    // 确认前切到 RIS，删除仍然落在 PIS
    shell.select_tab(ris).unwrap();
    shell.confirm_and_wait().await.unwrap();

    let dispatches: Vec<_> = surface
        .calls()
        .into_iter()
        .filter(|c| matches!(c, SurfaceCall::Dispatch { .. }))
        .collect();
    assert_eq!(dispatches.len(), 1);
    match &dispatches[0] {
        SurfaceCall::Dispatch { tab, action } => {
            assert_eq!(*tab, pis);
            assert_eq!(action.kind, ActionKind::Delete);
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(shell.tabs().active_id(), Some(ris));
}

#[tokio::test]
async fn test_closing_tab_voids_its_pending_action() {
    let surface = Arc::new(MockSurface::new());
    let mut shell = shell_on_ris(surface.clone()).await;
    let (ris, pis) = open_pis(&mut shell).await;

    shell.send("删除该记录").await.unwrap();
    let message_id = shell.mediator().pending().unwrap().message_id;
    let before = shell.messages().len();

    shell.close_tab(pis).unwrap();

    assert!(shell.mediator().pending().is_none());
    assert!(matches!(shell.confirm(), Err(ShellError::NotFound(_))));
    assert!(surface.dispatched().is_empty());
    assert_eq!(shell.messages().len(), before);
    let reply = shell.messages().last().unwrap();
    assert_eq!(reply.id, message_id);
    assert_eq!(reply.status, MessageStatus::Final);
    assert!(reply.content.contains("未执行"));
    assert_eq!(shell.tabs().active_id(), Some(ris));
    assert!(!shell.snapshot().input_locked);
}

#[tokio::test]
async fn test_closing_unrelated_tab_keeps_pending_action() {
    let surface = Arc::new(MockSurface::new());
    let mut shell = shell_on_ris(surface.clone()).await;
    let (ris, pis) = open_pis(&mut shell).await;

    shell.send("删除该记录").await.unwrap();
    shell.close_tab(ris).unwrap();
    assert_eq!(shell.mediator().pending().unwrap().tab, Some(pis));

    shell.confirm_and_wait().await.unwrap();
    assert_eq!(surface.dispatched().len(), 1);
}

#[tokio::test]
async fn test_double_start_listening_conflicts() {
    let mic = Arc::new(MockAudioCapture::new());
    let collab = Collaborators::with_surface(Arc::new(MockSurface::new())).voice(
        mic.clone(),
        Arc::new(ScriptedTranscriber::text("你好")),
        Arc::new(RecordingSpeech::default()),
    );
    let mut shell = Shell::new(collab, quiet_options());

    shell.start_listening().unwrap();
    let err = shell.start_listening().unwrap_err();
    assert!(matches!(err, ShellError::ResourceConflict(_)));
    assert_eq!(shell.voice_state(), VoiceState::Listening);
    assert_eq!(mic.acquired(), 1);

    shell.reset_assistant();
    assert_eq!(mic.active(), 0);
    assert_eq!(shell.voice_state(), VoiceState::Idle);
}

#[tokio::test]
async fn test_voice_transcript_feeds_mediator() {
    let mic = Arc::new(MockAudioCapture::new());
    let surface = Arc::new(MockSurface::new());
    let collab = Collaborators::with_surface(surface.clone()).voice(
        mic.clone(),
        Arc::new(ScriptedTranscriber::text("删除该记录")),
        Arc::new(RecordingSpeech::default()),
    );
    let mut shell = Shell::new(collab, quiet_options());
    shell.new_tab(None).unwrap();

    shell.start_listening().unwrap();
    let outcome = shell.listen_and_send().await.unwrap();

    assert!(matches!(outcome, Some(TurnOutcome::AwaitingConfirmation(_))));
    assert_eq!(mic.active(), 0);
    assert_eq!(shell.voice_state(), VoiceState::Idle);
    let user = shell
        .messages()
        .iter()
        .find(|m| m.role == Role::User)
        .unwrap();
    assert_eq!(user.content, "删除该记录");
    assert!(surface.dispatched().is_empty());
}

#[tokio::test]
async fn test_transcription_failure_is_reported() {
    let collab = Collaborators::with_surface(Arc::new(MockSurface::new())).voice(
        Arc::new(MockAudioCapture::new()),
        Arc::new(ScriptedTranscriber::failing("timeout")),
        Arc::new(RecordingSpeech::default()),
    );
    let mut shell = Shell::new(collab, quiet_options());

    shell.start_listening().unwrap();
    let err = shell.listen_and_send().await.unwrap_err();
    assert!(err.is_service_failure());
    assert_eq!(shell.voice_state(), VoiceState::Idle);
    assert!(shell.messages().is_empty());
}

#[tokio::test]
async fn test_orchestrator_rejects_second_send_while_thinking() {
    let classifier = ScriptedClassifier::new().with_delay(Duration::from_millis(200));
    let collab = Collaborators::with_surface(Arc::new(MockSurface::new()))
        .classifier(Arc::new(classifier));
    let shell = Shell::new(collab, quiet_options());
    let (cmd_tx, mut state_rx, handle) = spawn_shell(shell, RuntimeOptions::default());

    cmd_tx.send(Command::Send("第一句".into())).unwrap();
    cmd_tx.send(Command::Send("第二句".into())).unwrap();

    let state = wait_for(&mut state_rx, |s| s.error_message.is_some()).await;
    assert!(state.error_message.unwrap().contains("Resource conflict"));
    assert!(state.input_locked);

    let state = wait_for(&mut state_rx, |s| s.phase == ShellPhase::Idle && !s.input_locked).await;
    let users = state.history.iter().filter(|m| m.role == Role::User).count();
    assert_eq!(users, 1);
    assert_eq!(state.history.last().unwrap().content, "收到：第一句");

    cmd_tx.send(Command::Quit).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_reset_discards_late_proposal() {
    let classifier = Arc::new(
        ScriptedClassifier::new()
            .with_delay(Duration::from_millis(300))
            .then(Proposal::reply("迟到的回复").with_action(Action::navigate("late.example"))),
    );
    let surface = Arc::new(MockSurface::new());
    let collab = Collaborators::with_surface(surface.clone()).classifier(classifier.clone());
    let shell = Shell::new(collab, quiet_options());
    let (cmd_tx, mut state_rx, handle) = spawn_shell(shell, RuntimeOptions::default());

    cmd_tx.send(Command::Send("打开 late.example".into())).unwrap();
    wait_for(&mut state_rx, |s| s.phase == ShellPhase::Thinking).await;
    cmd_tx.send(Command::ResetAssistant).unwrap();
    let state = wait_for(&mut state_rx, |s| s.phase == ShellPhase::Idle).await;
    assert!(state.history.is_empty());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = state_rx.borrow().clone();
    assert!(state.history.is_empty());
    assert!(state.tabs.is_empty());
    assert!(surface.calls().is_empty());

    cmd_tx.send(Command::Quit).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_tabs_and_confirmation_flow() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");
    let surface = Arc::new(
        MockSurface::new().delay_url("http://localhost:3000/ris", Duration::from_millis(150)),
    );
    let options = ShellOptions {
        systems: ew_agent::systems::builtin_systems(),
        ..quiet_options()
    };
    let shell = Shell::new(Collaborators::with_surface(surface.clone()), options);
    let runtime = RuntimeOptions {
        persistence: Some(ConversationPersistence::new(&history_path)),
        speak_replies: false,
    };
    let (cmd_tx, mut state_rx, handle) = spawn_shell(shell, runtime);

    cmd_tx.send(Command::OpenSystem("ris".into())).unwrap();
    cmd_tx.send(Command::OpenSystem("pis".into())).unwrap();

    // 两个标签各自加载，慢的 RIS 不影响 PIS
    let state = wait_for(&mut state_rx, |s| {
        s.tabs.len() == 2 && s.tabs.iter().all(|t| t.load_state == LoadState::Loaded)
    })
    .await;
    assert_eq!(state.active().unwrap().url, "http://localhost:3000/pis");

    cmd_tx.send(Command::Send("删除该记录".into())).unwrap();
    let state = wait_for(&mut state_rx, |s| s.pending.is_some()).await;
    assert_eq!(state.phase, ShellPhase::AwaitingConfirmation);

    cmd_tx.send(Command::Confirm).unwrap();
    wait_for(&mut state_rx, |s| {
        s.pending.is_none()
            && s.history
                .last()
                .map(|m| m.status == MessageStatus::Final)
                .unwrap_or(false)
    })
    .await;
    let dispatched = surface.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].kind, ActionKind::Delete);

    cmd_tx.send(Command::CloseTab(None)).unwrap();
    let state = wait_for(&mut state_rx, |s| s.tabs.len() == 1).await;
    assert_eq!(state.active().unwrap().url, "http://localhost:3000/ris");

    cmd_tx.send(Command::Quit).unwrap();
    handle.await.unwrap();

    let saved = ConversationPersistence::new(&history_path).load().unwrap();
    assert!(saved.iter().any(|m| m.content.contains("✓")));
}

#[tokio::test]
async fn test_orchestrator_tab_close_discards_outstanding_proposal() {
    let classifier = ScriptedClassifier::new()
        .with_delay(Duration::from_millis(300))
        .then(Proposal::reply("好的").with_action(Action::search("#q", "张三")));
    let surface = Arc::new(MockSurface::new());
    let options = ShellOptions {
        systems: ew_agent::systems::builtin_systems(),
        ..quiet_options()
    };
    let collab = Collaborators::with_surface(surface.clone()).classifier(Arc::new(classifier));
    let (cmd_tx, mut state_rx, handle) = spawn_shell(Shell::new(collab, options), RuntimeOptions::default());

    cmd_tx.send(Command::OpenSystem("ris".into())).unwrap();
    cmd_tx.send(Command::OpenSystem("pis".into())).unwrap();
    wait_for(&mut state_rx, |s| {
        s.tabs.len() == 2 && s.tabs.iter().all(|t| t.load_state == LoadState::Loaded)
    })
    .await;

    cmd_tx.send(Command::Send("搜索 张三".into())).unwrap();
    wait_for(&mut state_rx, |s| s.phase == ShellPhase::Thinking).await;
    cmd_tx.send(Command::CloseTab(None)).unwrap();

    let state = wait_for(&mut state_rx, |s| s.tabs.len() == 1 && s.phase == ShellPhase::Idle).await;
    assert_eq!(state.active().unwrap().url, "http://localhost:3000/ris");
    assert_eq!(
        state.history.last().unwrap().status,
        MessageStatus::Discarded
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    let dispatched = surface
        .calls()
        .into_iter()
        .filter(|c| matches!(c, SurfaceCall::Dispatch { .. }))
        .count();
    assert_eq!(dispatched, 0);
    assert!(state_rx.borrow().pending.is_none());

    cmd_tx.send(Command::Quit).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_rejects_send_while_executing() {
    let classifier = ScriptedClassifier::new()
        .then(Proposal::reply("好的").with_action(Action::navigate("slow.local")));
    let surface = Arc::new(MockSurface::new().delay_url("https://slow.local", Duration::from_millis(400)));
    let collab = Collaborators::with_surface(surface).classifier(Arc::new(classifier));
    let (cmd_tx, mut state_rx, handle) =
        spawn_shell(Shell::new(collab, quiet_options()), RuntimeOptions::default());

    cmd_tx.send(Command::Send("打开 slow.local".into())).unwrap();
    let state = wait_for(&mut state_rx, |s| s.phase == ShellPhase::Executing).await;
    assert!(state.input_locked);

    cmd_tx.send(Command::Send("你好".into())).unwrap();
    let state = wait_for(&mut state_rx, |s| s.error_message.is_some()).await;
    assert!(state.error_message.unwrap().contains("Resource conflict"));

    let state = wait_for(&mut state_rx, |s| s.phase == ShellPhase::Idle && !s.input_locked).await;
    let users = state.history.iter().filter(|m| m.role == Role::User).count();
    assert_eq!(users, 1);
    let reply = state.history.last().unwrap();
    assert_eq!(reply.status, MessageStatus::Final);
    assert!(reply.content.contains("✓"));

    cmd_tx.send(Command::Quit).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_applies_load_before_later_steps_finish() {
    let classifier = ScriptedClassifier::new().then(
        Proposal::reply("好的")
            .with_action(Action::navigate("eis.local"))
            .with_action(Action::search("#q", "张三")),
    );
    let surface = Arc::new(MockSurface::new().delay_kind(ActionKind::Search, Duration::from_millis(500)));
    let collab = Collaborators::with_surface(surface.clone()).classifier(Arc::new(classifier));
    let (cmd_tx, mut state_rx, handle) =
        spawn_shell(Shell::new(collab, quiet_options()), RuntimeOptions::default());

    cmd_tx.send(Command::Send("打开 eis.local然后搜索 张三".into())).unwrap();

    // 搜索仍在进行时，第一步的加载结果已经写回标签
    let state = wait_for(&mut state_rx, |s| {
        s.phase == ShellPhase::Executing
            && s.tabs.len() == 1
            && s.tabs[0].load_state == LoadState::Loaded
    })
    .await;
    assert_eq!(state.tabs[0].url, "https://eis.local");

    let state = wait_for(&mut state_rx, |s| s.phase == ShellPhase::Idle).await;
    let reply = state.history.last().unwrap();
    assert_eq!(reply.content.matches('✓').count(), 2);
    assert_eq!(surface.dispatched().len(), 1);

    cmd_tx.send(Command::Quit).unwrap();
    handle.await.unwrap();
}
