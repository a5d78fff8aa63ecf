//! 界面渲染
//!
//! 根据 UiState 绘制：左侧业务系统列表，右侧自上而下为标签栏、活动页面状态、助手对话、
//! 待确认提示（有待确认操作时）与输入框。渲染只读状态，不产生任何副作用。

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Tabs, Wrap,
    },
    Frame,
};

use crate::assistant::{MessageStatus, Role};
use crate::browser::LoadState;
use crate::core::UiState;
use crate::voice::VoiceState;

/// 单条消息在 UI 中显示的最大字符数，超过部分折叠
const MAX_DISPLAY_CHARS: usize = 600;
const SIDEBAR_WIDTH: u16 = 28;

/// 对过长内容做折叠：保留前 N 字 + 省略提示
fn truncate_for_display(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= MAX_DISPLAY_CHARS {
        return content.to_string();
    }
    let head: String = chars.iter().take(MAX_DISPLAY_CHARS).collect();
    format!("{}\n... [已省略，共 {} 字]", head, chars.len())
}

/// 将内容按宽度换行，支持 UTF-8（按字符数，避免在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn load_state_label(state: &LoadState) -> (String, Color) {
    match state {
        LoadState::Idle => ("空白页".to_string(), Color::DarkGray),
        LoadState::Loading => ("加载中…".to_string(), Color::Yellow),
        LoadState::Loaded => ("已加载".to_string(), Color::Green),
        LoadState::Failed(reason) => (format!("加载失败：{reason}"), Color::Red),
    }
}

fn voice_label(voice: VoiceState) -> &'static str {
    match voice {
        VoiceState::Idle => "🎤 空闲",
        VoiceState::Listening => "🔴 聆听中",
        VoiceState::Processing => "⏳ 识别中",
        VoiceState::Speaking => "🔊 播报中",
    }
}

/// 绘制一帧；将对话区 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(
    f: &mut Frame,
    state: &UiState,
    input_buffer: &str,
    conversation_scroll: usize,
    out: &mut (usize, usize),
) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(30)])
        .split(f.area());
    draw_sidebar(f, state, columns[0]);

    let confirm_height = if state.pending.is_some() { 4 } else { 0 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(confirm_height),
            Constraint::Length(3),
        ])
        .split(columns[1]);

    draw_tab_strip(f, state, rows[0]);
    draw_page_status(f, state, rows[1]);
    *out = draw_conversation(f, state, rows[2], conversation_scroll);
    if state.pending.is_some() {
        draw_confirmation(f, state, rows[3]);
    }
    draw_input(f, state, input_buffer, rows[4]);
}

fn draw_sidebar(f: &mut Frame, state: &UiState, area: Rect) {
    let items: Vec<ListItem> = state
        .systems
        .iter()
        .enumerate()
        .map(|(i, s)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("Alt+{} ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::raw(format!("{} {}", s.icon_or_default(), s.name)),
            ]))
        })
        .collect();
    let block = Block::default()
        .title(" 业务系统 ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    f.render_widget(List::new(items).block(block), area);
}

fn draw_tab_strip(f: &mut Frame, state: &UiState, area: Rect) {
    let titles: Vec<Line> = state
        .tabs
        .iter()
        .map(|t| {
            let label = if t.title.is_empty() {
                if t.url.is_empty() {
                    "新标签".to_string()
                } else {
                    t.url.clone()
                }
            } else {
                t.title.clone()
            };
            let label: String = label.chars().take(20).collect();
            let marker = match t.load_state {
                LoadState::Loading => "⟳ ",
                LoadState::Failed(_) => "✗ ",
                _ => "",
            };
            Line::from(format!("{marker}{label}"))
        })
        .collect();
    let selected = state
        .active_tab
        .and_then(|id| state.tabs.iter().position(|t| t.id == id))
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title(" 标签 "))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, area);
}

fn draw_page_status(f: &mut Frame, state: &UiState, area: Rect) {
    let line = match state.active() {
        Some(tab) => {
            let (label, color) = load_state_label(&tab.load_state);
            Line::from(vec![
                Span::raw(format!("{} ", tab.url)),
                Span::styled(label, Style::default().fg(color)),
            ])
        }
        None => Line::from(Span::styled(
            "没有打开的页面：从左侧选择业务系统或输入 /open <地址>",
            Style::default().fg(Color::DarkGray),
        )),
    };
    let block = Block::default().borders(Borders::ALL).title(" 页面 ");
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_conversation(
    f: &mut Frame,
    state: &UiState,
    area: Rect,
    conversation_scroll: usize,
) -> (usize, usize) {
    let content_width = area.width.saturating_sub(2).saturating_sub(1) as usize; // 边框 + 滚动条
    let title = format!(" EW 助手 │ {} │ {} ", state.phase.label(), voice_label(state.voice));
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let mut text_lines: Vec<Line> = Vec::new();
    for (idx, m) in state.history.iter().enumerate() {
        if idx > 0 {
            text_lines.push(Line::from(Span::raw("")));
        }
        let (prefix, mut color) = match m.role {
            Role::User => ("我   ", Color::Cyan),
            Role::Assistant => ("助手 ", Color::Green),
        };
        let content = match &m.status {
            MessageStatus::Pending => "正在输入…".to_string(),
            MessageStatus::Failed(_) => {
                color = Color::Red;
                m.content.clone()
            }
            MessageStatus::Discarded => {
                color = Color::DarkGray;
                m.content.clone()
            }
            _ => m.content.clone(),
        };
        let display_text = truncate_for_display(&content);
        let wrapped = wrap_text(&display_text, content_width.saturating_sub(5).max(20));
        for (i, line) in wrapped.into_iter().enumerate() {
            let pref = if i == 0 { prefix } else { "     " };
            text_lines.push(Line::from(vec![
                Span::styled(pref, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(line),
            ]));
        }
    }

    let content_height = area.height.saturating_sub(2) as usize;
    let total_lines = text_lines.len();
    let max_scroll = total_lines.saturating_sub(content_height);
    let scroll_offset = conversation_scroll.min(max_scroll);

    let paragraph = Paragraph::new(Text::from(text_lines))
        .block(block)
        .scroll((scroll_offset as u16, 0));
    f.render_widget(paragraph, area);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }

    (total_lines, content_height)
}

fn draw_confirmation(f: &mut Frame, state: &UiState, area: Rect) {
    let Some(pending) = &state.pending else {
        return;
    };
    // 标明操作落在哪个页面，避免切换标签后误确认
    let page = pending
        .tab
        .and_then(|id| state.tabs.iter().find(|t| t.id == id))
        .map(|t| if t.title.is_empty() { t.url.clone() } else { t.title.clone() })
        .unwrap_or_default();
    let summary = if page.is_empty() {
        format!("⚠ {}", pending.action.describe())
    } else {
        format!("⚠ {}  @ {}", pending.action.describe(), page)
    };
    let text = vec![
        Line::from(Span::styled(
            summary,
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "y / Enter 确认执行    n / Esc 取消",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let block = Block::default()
        .title(" 需要确认 ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    f.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), area);
}

fn draw_input(f: &mut Frame, state: &UiState, input_buffer: &str, area: Rect) {
    let input_prompt = if let Some(err) = &state.error_message {
        format!(" 错误: {} ", err.chars().take(48).collect::<String>())
    } else if state.pending.is_some() {
        " 请先确认或取消 ".to_string()
    } else if state.input_locked {
        " 等待回复… ".to_string()
    } else {
        " 输入（/open /new /close /reset） ".to_string()
    };

    let border_color = if state.error_message.is_some() {
        Color::Red
    } else {
        Color::Blue
    };

    let hint = " Enter 发送 │ Ctrl+T/W 标签 │ Ctrl+←→ 切换 │ Alt+←→ 后退/前进 │ F5 刷新 │ Ctrl+V 语音 │ Ctrl+Q 退出 ";
    let input_block = Block::default()
        .title(input_prompt)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let input = Paragraph::new(input_buffer)
        .block(input_block)
        .style(if state.input_locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });

    f.render_widget(input, area);
}
