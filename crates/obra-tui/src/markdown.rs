//! Assistant markdown → ratatui lines.
//!
//! Driven by the same pulldown-cmark event stream and options the markup
//! transformer uses, so the terminal shows the same structure the HTML does:
//! headings, lists, tables, code, links, emphasis, and a gauge under every line
//! that mentions `N% complete` / `N% progress`.

use obra_core::transform::{is_safe_url, markdown_options, progress_marks, ProgressMark};
use pulldown_cmark::{Alignment, CodeBlockKind, Event, Parser, Tag, TagEnd, TextMergeStream};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

const PROGRESS_TRACK: usize = 20;

/// A gauge drawn under a line that mentions a progress percentage.
/// Values above 100 run past the end of the track.
pub fn progress_line(mark: &ProgressMark, max_width: usize) -> Line<'static> {
    let filled = ((mark.value / 100.0) * PROGRESS_TRACK as f64).round() as usize;
    let filled = filled.min(max_width.saturating_sub(8));
    let empty = PROGRESS_TRACK.saturating_sub(filled);

    Line::from(vec![
        Span::raw("  "),
        Span::styled("█".repeat(filled), Style::default().fg(Color::Green)),
        Span::styled("░".repeat(empty), Style::default().fg(Color::DarkGray)),
        Span::styled(format!(" {}%", mark.text), Style::default().fg(Color::DarkGray)),
    ])
}

/// Render assistant markdown into styled lines for a panel `width` columns wide.
pub fn markdown_lines(content: &str, width: usize) -> Vec<Line<'static>> {
    let mut view = MarkdownView::new(width);
    for event in TextMergeStream::new(Parser::new_ext(content, markdown_options())) {
        view.event(event);
    }
    view.finish()
}

#[derive(Default)]
struct TableState {
    alignments: Vec<Alignment>,
    header_rows: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

struct MarkdownView {
    width: usize,
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    gauges: Vec<ProgressMark>,

    bold: usize,
    italic: usize,
    strike: usize,
    heading: bool,
    quote: usize,
    image: usize,
    link: Option<String>,
    lists: Vec<Option<u64>>,
    code_block: bool,
    table: Option<TableState>,
}

impl MarkdownView {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            spans: Vec::new(),
            gauges: Vec::new(),
            bold: 0,
            italic: 0,
            strike: 0,
            heading: false,
            quote: 0,
            image: 0,
            link: None,
            lists: Vec::new(),
            code_block: false,
            table: None,
        }
    }

    fn style(&self) -> Style {
        let mut style = Style::default();
        if self.heading {
            style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
        }
        if self.bold > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic > 0 || self.image > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strike > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        if self.link.is_some() {
            style = style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED);
        }
        style
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.push_str(&code);
                } else {
                    self.spans.push(Span::styled(
                        code.to_string(),
                        Style::default().fg(Color::Yellow),
                    ));
                }
            }
            // Raw HTML is shown as text, the same way the markup shows it.
            Event::Html(raw) | Event::InlineHtml(raw) => self.text(&raw),
            Event::SoftBreak | Event::HardBreak => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.push(' ');
                } else {
                    self.flush();
                }
            }
            Event::Rule => {
                self.flush();
                let rule = "─".repeat(self.width.clamp(3, 40));
                self.lines
                    .push(Line::from(Span::styled(rule, Style::default().fg(Color::DarkGray))));
                self.blank();
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { .. } => {
                self.flush();
                self.heading = true;
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                self.code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.lines.push(Line::from(Span::styled(
                            lang.to_string(),
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                }
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.spans
                    .push(Span::raw(format!("{}{}", "  ".repeat(depth), marker)));
            }
            Tag::Table(alignments) => {
                self.flush();
                self.table = Some(TableState {
                    alignments,
                    ..Default::default()
                });
            }
            Tag::TableRow | Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            Tag::Image { .. } => {
                self.image += 1;
                self.spans
                    .push(Span::styled("[image: ", Style::default().fg(Color::DarkGray)));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.heading = false;
                self.blank();
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.quote = self.quote.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                self.code_block = false;
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                    table.header_rows = table.rows.len();
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.table_lines(table);
                    self.blank();
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.link.take() {
                    if is_safe_url(&url) && !url.starts_with('#') {
                        self.spans.push(Span::styled(
                            format!(" ({})", url),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                }
            }
            TagEnd::Image => {
                self.image = self.image.saturating_sub(1);
                self.spans
                    .push(Span::styled("]", Style::default().fg(Color::DarkGray)));
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(text);
            return;
        }

        if self.code_block {
            let style = Style::default().fg(Color::Green);
            for line in text.lines() {
                self.lines
                    .push(Line::from(Span::styled(format!("  {}", line), style)));
            }
            return;
        }

        // Alt text never gets a gauge, matching the markup.
        if self.image == 0 {
            self.gauges.extend(progress_marks(text));
        }
        self.spans.push(Span::styled(text.to_string(), self.style()));
    }

    /// End the current line and draw any gauges its text asked for.
    fn flush(&mut self) {
        if !self.spans.is_empty() {
            let mut spans = std::mem::take(&mut self.spans);
            if self.quote > 0 {
                spans.insert(
                    0,
                    Span::styled("│ ".repeat(self.quote), Style::default().fg(Color::DarkGray)),
                );
            }
            self.lines.push(Line::from(spans));
        }
        for mark in std::mem::take(&mut self.gauges) {
            self.lines.push(progress_line(&mark, self.width));
        }
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|line| line.width() > 0) {
            self.lines.push(Line::default());
        }
    }

    fn table_lines(&mut self, table: TableState) {
        let cols = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        if cols == 0 {
            return;
        }
        let mut widths = vec![0usize; cols];
        for row in &table.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(Span::raw(cell.as_str()).width());
            }
        }

        let border = Style::default().fg(Color::DarkGray);
        let rule = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            Line::from(Span::styled(
                format!("{}{}{}", left, segments.join(mid), right),
                border,
            ))
        };

        self.lines.push(rule("┌", "┬", "┐"));
        for (index, row) in table.rows.iter().enumerate() {
            let header = index < table.header_rows;
            let style = if header {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let mut spans = vec![Span::styled("│", border)];
            for (i, width) in widths.iter().enumerate() {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                let align = table.alignments.get(i).copied().unwrap_or(Alignment::None);
                spans.push(Span::styled(format!(" {} ", pad(cell, *width, align)), style));
                spans.push(Span::styled("│", border));
            }
            self.lines.push(Line::from(spans));

            for cell in row {
                for mark in progress_marks(cell) {
                    self.lines.push(progress_line(&mark, self.width));
                }
            }

            if header && index + 1 == table.header_rows && index + 1 < table.rows.len() {
                self.lines.push(rule("├", "┼", "┤"));
            }
        }
        self.lines.push(rule("└", "┴", "┘"));
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        while self.lines.last().is_some_and(|line| line.width() == 0) {
            self.lines.pop();
        }
        self.lines
    }
}

fn pad(cell: &str, width: usize, align: Alignment) -> String {
    let gap = width.saturating_sub(Span::raw(cell).width());
    match align {
        Alignment::Right => format!("{}{}", " ".repeat(gap), cell),
        Alignment::Center => {
            let left = gap / 2;
            format!("{}{}{}", " ".repeat(left), cell, " ".repeat(gap - left))
        }
        Alignment::Left | Alignment::None => format!("{}{}", cell, " ".repeat(gap)),
    }
}
