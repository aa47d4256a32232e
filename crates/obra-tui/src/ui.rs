use obra_core::{Block as TranscriptBlock, ChartAttachment, Message, Role};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::app::{App, InputMode};
use crate::markdown::markdown_lines;

fn label_line(role: Role, timestamp: Option<&str>) -> Line<'static> {
    let (label, color) = match role {
        Role::User => ("You", Color::Cyan),
        Role::Assistant => ("Obra", Color::Yellow),
    };
    let mut spans = vec![Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if let Some(timestamp) = timestamp {
        spans.push(Span::styled(
            format!("  {}", timestamp),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn message_lines(message: &Message, width: usize, lines: &mut Vec<Line<'static>>) {
    lines.push(label_line(message.role, Some(&message.timestamp)));
    match message.role {
        Role::User => {
            for line in message.content.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Role::Assistant => lines.extend(markdown_lines(&message.content, width)),
    }
    lines.push(Line::default());
}

/// Inline charts are summarized; the image itself is viewable through `obra export`.
fn chart_line(chart: &ChartAttachment) -> Line<'static> {
    let style = Style::default().fg(Color::Magenta);
    let mut spans = vec![Span::styled(format!("  ▣ {}", chart.summary()), style)];
    if chart.is_inline() {
        spans.push(Span::styled(
            "  view with `obra export`",
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn block_lines(block: &TranscriptBlock, width: usize, lines: &mut Vec<Line<'static>>) {
    match block {
        TranscriptBlock::Welcome { text } => {
            lines.push(label_line(Role::Assistant, None));
            lines.push(Line::from(text.clone()));
            lines.push(Line::default());
        }
        TranscriptBlock::Suggestions { prompts } => {
            lines.push(Line::from(Span::styled(
                "Try asking:",
                Style::default().fg(Color::DarkGray),
            )));
            for (i, prompt) in prompts.iter().enumerate() {
                lines.push(Line::from(vec![
                    Span::styled(format!(" {} ", i + 1), Style::default().bg(Color::DarkGray).fg(Color::White)),
                    Span::styled(format!(" {}", prompt), Style::default().fg(Color::Magenta)),
                ]));
            }
            lines.push(Line::default());
        }
        TranscriptBlock::Message(message) => message_lines(message, width, lines),
        TranscriptBlock::Chart(chart) => {
            lines.push(chart_line(chart));
            lines.push(Line::default());
        }
    }
}

/// Rows a line occupies once wrapped to `width` columns.
fn wrapped_rows(line: &Line<'_>, width: usize) -> u16 {
    if width == 0 {
        return 1;
    }
    let w = line.width();
    if w == 0 {
        1
    } else {
        w.div_ceil(width) as u16
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.controller.confirming_reset() {
        render_reset_prompt(frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Obra · Project Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} ", app.endpoint_label),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2) as usize;

    let mut lines: Vec<Line<'static>> = Vec::new();
    for block in app.controller.transcript().blocks() {
        block_lines(block, inner_width, &mut lines);
    }

    if app.controller.pending().is_some() {
        lines.push(label_line(Role::Assistant, None));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    app.chat_lines = lines.iter().map(|l| wrapped_rows(l, inner_width)).sum();
    if app.controller.take_scroll_request() || app.follow_latest {
        app.scroll_to_bottom();
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Conversation ");

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Ask about your projects ");

    // Calculate visible portion of input with horizontal scrolling
    let composer = app.controller.composer();
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = composer.cursor();

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = composer
        .text()
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if editing && !app.controller.confirming_reset() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" VIEW ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" ASK ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: Vec<(&str, &str)> = match app.input_mode {
        InputMode::Normal => vec![
            ("j/k", "scroll"),
            ("1-4", "suggestion"),
            ("i", "ask"),
            ("R", "reset"),
            ("q", "quit"),
        ],
        InputMode::Editing => vec![
            ("Enter", "send"),
            ("Esc", "stop typing"),
            ("Ctrl+R", "reset"),
        ],
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_reset_prompt(frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 5;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Clear conversation ");

    let text = Text::from(vec![
        Line::from("This deletes the saved conversation."),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(Color::Red).fg(Color::White)),
            Span::raw(" clear   "),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" keep"),
        ]),
    ]);

    frame.render_widget(Paragraph::new(text).block(block), popup_area);
}
