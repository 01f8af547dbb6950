mod clipboard;
mod help;
mod state;

use crate::backend::{Backend, HttpBackend};
use crate::model::{language_name, ChatRole, ClientConfig};
use crate::notify::{escape_for_display, NoticeKind};
use crate::ocr::{ResultView, EMPTY_RESULT_HINT};
use crate::orchestrator::{self, apply_event, AppEvent, AppState, Pipeline, UiCommand};
use crate::store::FileStore;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{Flow, InputMode, UiState, TAB_OCR, TAB_VQA};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

fn push_wrapped_kv(out: &mut Vec<Line<'static>>, label: &str, value: &str, area_width: u16) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Borders take 2 columns on each side.
    let usable_width = area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };
        let take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }
        remaining = rest;
    }
}

pub async fn run(cfg: ClientConfig) -> Result<()> {
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&cfg)?);
    let store = FileStore::open(&cfg.state_dir)?;
    let app = AppState::new(Box::new(store), &cfg.language, cfg.output_dir.clone());
    tracing::info!(base_url = %cfg.base_url, "starting TUI");

    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // Terminal I/O blocks, so the UI gets its own thread and owns all state.
    let ui = UiState::new(app, cfg.base_url.clone());
    let ui_handle = std::thread::spawn(move || run_threaded(ui, event_rx, cmd_tx));

    let res = orchestrator::run_controller(backend, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

fn send_all(cmd_tx: &UnboundedSender<UiCommand>, cmds: Vec<UiCommand>) {
    for cmd in cmds {
        let _ = cmd_tx.send(cmd);
    }
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    mut event_rx: UnboundedReceiver<AppEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let _ = cmd_tx.send(UiCommand::Health);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut copies: Vec<clipboard::PendingCopy> = Vec::new();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state.app, ev);
        }
        copies.retain(|copy| match copy.poll() {
            Some(outcome) => {
                clipboard::report(&mut state.app.notes, outcome);
                false
            }
            None => true,
        });

        if last_tick.elapsed() >= tick_rate {
            state.app.notes.prune(Instant::now());
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let flow = match event::read() {
            Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => {
                state.on_key(k.modifiers, k.code)
            }
            Ok(Event::Paste(text)) => state.on_paste(&text),
            _ => continue,
        };
        match flow {
            Flow::Send(cmds) => send_all(&cmd_tx, cmds),
            Flow::Copy(text) => match clipboard::copy_to_clipboard(&text) {
                Ok(pending) => copies.push(pending),
                Err(e) => {
                    state.app.notes.error(&format!("Copy failed: {e:#}"));
                }
            },
            Flow::Quit => {
                let _ = cmd_tx.send(UiCommand::Quit);
                break Ok(());
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let tabs = Tabs::new(vec![Line::from("VQA"), Line::from("OCR"), Line::from("Help")])
        .select(state.tab)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("vision-chat @ {}", state.base_url)),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_VQA => draw_vqa(chunks[1], f, state),
        TAB_OCR => draw_ocr(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    draw_status(chunks[2], f, state);
    draw_toasts(area, f, state);
}

fn image_lines(
    out: &mut Vec<Line<'static>>,
    image: Option<&crate::intake::Intake>,
    loading: bool,
    width: u16,
) {
    match image {
        Some(img) => {
            push_wrapped_kv(out, "Image", &escape_for_display(&img.file_name), width);
            push_wrapped_kv(
                out,
                "Type",
                &format!(
                    "{}, {:.1} KB",
                    img.payload.mime_type.as_str(),
                    img.payload.size_bytes as f64 / 1024.0
                ),
                width,
            );
        }
        None => out.push(Line::from(Span::styled(
            "No image. Press o to open one, or drag a file onto the terminal.",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    if loading {
        out.push(Line::from(Span::styled(
            "Loading image...",
            Style::default().fg(Color::Yellow),
        )));
    }
}

fn draw_vqa(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let vqa = &state.app.vqa;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);

    let mut info = Vec::new();
    image_lines(
        &mut info,
        vqa.image(),
        state.app.loading.is_loading(Pipeline::Vqa),
        rows[0].width,
    );
    let session = vqa
        .session_id()
        .or(vqa.restored_session())
        .unwrap_or("none");
    push_wrapped_kv(&mut info, "Session", session, rows[0].width);
    f.render_widget(
        Paragraph::new(info).block(Block::default().borders(Borders::ALL).title("Image")),
        rows[0],
    );

    let mut lines: Vec<Line> = Vec::new();
    for msg in vqa.transcript() {
        let (who, color) = match msg.role {
            ChatRole::User => ("You", Color::Cyan),
            ChatRole::Assistant => ("Assistant", Color::Green),
            ChatRole::Error => ("Error", Color::Red),
        };
        lines.push(Line::from(Span::styled(
            format!("{who}:"),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        for text_line in escape_for_display(&msg.text).lines() {
            lines.push(Line::from(format!("  {text_line}")));
        }
    }
    if vqa.is_busy() {
        lines.push(Line::from(Span::styled(
            "Thinking...",
            Style::default().fg(Color::Yellow),
        )));
    }
    // Keep the newest turn in view; width-based wrapping makes this approximate.
    let inner_h = rows[1].height.saturating_sub(2);
    let inner_w = rows[1].width.saturating_sub(2).max(1) as usize;
    let wrapped: usize = lines
        .iter()
        .map(|l| l.width().max(1).div_ceil(inner_w))
        .sum();
    let scroll = (wrapped as u16).saturating_sub(inner_h);
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .block(Block::default().borders(Borders::ALL).title("Conversation")),
        rows[1],
    );

    let editing = state.mode == InputMode::Question;
    let mut question = escape_for_display(&vqa.question);
    if editing {
        question.push('_');
    }
    let hint = if editing {
        "Question (enter to ask, esc to leave)"
    } else if vqa.is_busy() {
        "Question (waiting for answer)"
    } else {
        "Question (i to edit, enter to ask)"
    };
    let style = if editing {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    f.render_widget(
        Paragraph::new(question)
            .style(style)
            .block(Block::default().borders(Borders::ALL).title(hint)),
        rows[2],
    );
}

fn draw_ocr(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let ocr = &state.app.ocr;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(3)])
        .split(area);

    let mut info = Vec::new();
    image_lines(
        &mut info,
        ocr.image(),
        state.app.loading.is_loading(Pipeline::Ocr),
        rows[0].width,
    );
    push_wrapped_kv(
        &mut info,
        "Language",
        &format!("{} ({})", language_name(&ocr.language), ocr.language),
        rows[0].width,
    );
    let download = if ocr.is_downloading() {
        "downloading..."
    } else if ocr.download_enabled() {
        "available (d)"
    } else {
        "unavailable"
    };
    push_wrapped_kv(&mut info, "Download", download, rows[0].width);
    f.render_widget(
        Paragraph::new(info).block(Block::default().borders(Borders::ALL).title("Image")),
        rows[0],
    );

    let (body, style) = match ocr.view() {
        ResultView::Empty => (EMPTY_RESULT_HINT.to_string(), Style::default().fg(Color::DarkGray)),
        ResultView::Pending => ("Recognizing...".to_string(), Style::default().fg(Color::Yellow)),
        ResultView::Text(t) => (escape_for_display(t), Style::default()),
        ResultView::Failed(msg) => (escape_for_display(msg), Style::default().fg(Color::Red)),
    };
    let title = match ocr.task() {
        Some(task) => format!("Result ({})", escape_for_display(&task.task_id)),
        None => "Result".to_string(),
    };
    f.render_widget(
        Paragraph::new(body)
            .style(style)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(title)),
        rows[1],
    );
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = Vec::new();
    if let InputMode::Path(_) = state.mode {
        spans.push(Span::styled("Open: ", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(format!("{}_", escape_for_display(&state.path_input))));
    } else {
        let health = state.app.health.as_deref().unwrap_or("Backend status unknown");
        spans.push(Span::styled(
            escape_for_display(health),
            Style::default().fg(Color::Gray),
        ));
        spans.push(Span::raw("  |  ? help, q quit"));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Toasts stack in the top-right corner over whatever tab is shown.
fn draw_toasts(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let width = (area.width / 2).max(30).min(area.width);
    let mut y = area.y + 1;
    for toast in state.app.notes.active().iter().rev() {
        let text_w = width.saturating_sub(2).max(1) as usize;
        let height = (toast.message.chars().count().div_ceil(text_w) as u16 + 2).min(6);
        if y + height > area.y + area.height {
            break;
        }
        let rect = Rect {
            x: area.x + area.width - width,
            y,
            width,
            height,
        };
        let (title, color) = match toast.kind {
            NoticeKind::Success => ("OK", Color::Green),
            NoticeKind::Error => ("Error", Color::Red),
        };
        f.render_widget(Clear, rect);
        f.render_widget(
            Paragraph::new(toast.message.clone())
                .wrap(Wrap { trim: true })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(color))
                        .title(title),
                ),
            rect,
        );
        y += height;
    }
}
