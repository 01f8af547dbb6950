use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

const GLOBAL_KEYS: &[(&str, &str)] = &[
    ("q / Ctrl-C", "Quit"),
    ("tab", "Switch tabs"),
    ("o", "Open an image (type a path)"),
    ("paste", "Drop an image (drag a file onto the terminal)"),
    ("h", "Check backend health"),
    ("x / esc", "Dismiss notification"),
    ("?", "Show this help"),
];

const VQA_KEYS: &[(&str, &str)] = &[
    ("i", "Edit question (enter sends, esc leaves)"),
    ("enter", "Ask; an empty question requests a description"),
    ("c", "Remove image"),
    ("s", "Clear session"),
    ("e", "Export transcript as JSON"),
];

const OCR_KEYS: &[(&str, &str)] = &[
    ("r / enter", "Recognize text"),
    ("l", "Cycle language"),
    ("d", "Download result"),
    ("y", "Copy recognized text to clipboard"),
    ("c", "Remove image"),
];

fn section(out: &mut Vec<Line<'static>>, title: &'static str, keys: &[(&'static str, &'static str)]) {
    out.push(Line::from(title));
    for (key, what) in keys {
        out.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
            Span::raw(*what),
        ]));
    }
    out.push(Line::from(""));
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = Vec::new();
    section(&mut lines, "Keybinds:", GLOBAL_KEYS);
    section(&mut lines, "VQA tab:", VQA_KEYS);
    section(&mut lines, "OCR tab:", OCR_KEYS);
    lines.push(Line::from(vec![
        Span::styled("Formats: ", Style::default().fg(Color::Gray)),
        Span::raw("JPEG, PNG, WebP up to 10MB"),
    ]));
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
