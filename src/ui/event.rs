//! 事件处理
//!
//! 轮询 crossterm 键盘事件，把全局快捷键转为 Command 直接发给编排器；
//! 依赖当前状态的按键（确认/取消、语音开关、打开第 N 个系统）交给 run_app 决定，
//! 其余按键用于拼 input_buffer，Enter 时 send_input。

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::core::Command;

/// 应用事件：已发送的 Command、需要结合状态处理的动作，或原始 KeyEvent
#[derive(Debug, Clone)]
pub enum AppEvent {
    Command(Command),
    /// Ctrl+V：开始 / 停止录音
    ToggleVoice,
    /// Alt+1..9：打开侧栏第 N 个业务系统（0 起）
    OpenSystem(usize),
    Key(KeyEvent),
}

/// 事件处理器：持有 cmd_tx，poll 时读键盘并返回 AppEvent
pub struct EventHandler {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EventHandler {
    pub fn new(cmd_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub fn poll(&self) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(self.handle_key(key)));
                }
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: KeyEvent) -> AppEvent {
        match map_key(key) {
            AppEvent::Command(cmd) => {
                if cmd != Command::Quit {
                    self.send(cmd.clone());
                }
                AppEvent::Command(cmd)
            }
            other => other,
        }
    }

    pub fn send(&self, cmd: Command) {
        let _ = self.cmd_tx.send(cmd);
    }

    /// 输入框内容：以 `/` 开头的是外壳命令，其余发给助手
    pub fn send_input(&self, input: String) {
        self.send(parse_input(&input));
    }
}

/// 全局快捷键映射
pub fn map_key(key: KeyEvent) -> AppEvent {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    match key.code {
        KeyCode::Char('q') if ctrl => AppEvent::Command(Command::Quit),
        KeyCode::Char('l') if ctrl => AppEvent::Command(Command::ResetAssistant),
        KeyCode::Char('t') if ctrl => AppEvent::Command(Command::NewTab(None)),
        KeyCode::Char('w') if ctrl => AppEvent::Command(Command::CloseTab(None)),
        KeyCode::Char('v') if ctrl => AppEvent::ToggleVoice,
        KeyCode::Right if ctrl => AppEvent::Command(Command::NextTab),
        KeyCode::Left if ctrl => AppEvent::Command(Command::PrevTab),
        KeyCode::Right if alt => AppEvent::Command(Command::Forward),
        KeyCode::Left if alt => AppEvent::Command(Command::Back),
        KeyCode::Char(c @ '1'..='9') if alt => AppEvent::OpenSystem(c as usize - '1' as usize),
        KeyCode::F(5) => AppEvent::Command(Command::Refresh),
        _ => AppEvent::Key(key),
    }
}

/// 解析输入框内容
pub fn parse_input(input: &str) -> Command {
    let input = input.trim();
    let Some(rest) = input.strip_prefix('/') else {
        return Command::Send(input.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name.to_lowercase().as_str() {
        "open" | "go" => Command::Navigate(arg.to_string()),
        "new" => Command::NewTab(Some(arg.to_string()).filter(|a| !a.is_empty())),
        "close" => Command::CloseTab(None),
        "refresh" | "reload" => Command::Refresh,
        "back" => Command::Back,
        "forward" => Command::Forward,
        "system" => Command::OpenSystem(arg.to_string()),
        "say" => Command::Speak(arg.to_string()),
        "reset" | "clear" => Command::ResetAssistant,
        "quit" | "exit" => Command::Quit,
        _ => Command::Send(input.to_string()),
    }
}
