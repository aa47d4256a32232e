//! Assistant text → display markup.
//!
//! Pipeline over the markdown event stream: a sanitization pass (soft breaks
//! become hard breaks, raw HTML becomes text, unsafe URLs become `#`), then
//! progress-bar injection into text events, then HTML output. Attribute values
//! such as image alt text and link titles never pass through the injector.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream};
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::markup;

/// A progress percentage found in a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressMark {
    /// Numeric value as written, not clamped.
    pub value: f64,
    /// The number exactly as matched, e.g. `"42.5"`.
    pub text: String,
    /// Byte range of the whole match (`42.5% complete`).
    pub span: Range<usize>,
}

fn progress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)%\s+(?:complete|progress)").unwrap()
    })
}

/// Markdown extensions understood by every view of assistant text.
pub fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

/// Render raw assistant text into sanitized markup with progress bars.
pub fn render(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3 / 2);
    html::push_html(&mut out, with_progress_bars(sanitized_events(raw)));
    out
}

/// Markdown to markup with the sanitization pass but no progress bars.
pub fn markdown_to_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3 / 2);
    html::push_html(&mut out, sanitized_events(raw));
    out
}

/// Parsed and sanitized events, with adjacent text merged so a percentage is
/// never split across two events.
fn sanitized_events(raw: &str) -> impl Iterator<Item = Event<'_>> {
    TextMergeStream::new(Parser::new_ext(raw, markdown_options()).map(sanitize_event))
}

fn sanitize_event(event: Event<'_>) -> Event<'_> {
    match event {
        // Line breaks in the source are visual breaks.
        Event::SoftBreak => Event::HardBreak,
        // Raw HTML is shown as text, never interpreted.
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_destination(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_destination(dest_url),
            title,
            id,
        }),
        other => other,
    }
}

fn safe_destination(dest: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&dest) {
        dest
    } else {
        CowStr::Borrowed("#")
    }
}

fn normalize_url(url: &str) -> String {
    // Browsers ignore embedded whitespace and control characters when reading the
    // scheme, so `java\tscript:` must be treated as `javascript:`.
    url.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn scheme_of(normalized: &str) -> Option<&str> {
    match normalized.find(|c: char| matches!(c, ':' | '/' | '?' | '#')) {
        Some(idx) if normalized.as_bytes()[idx] == b':' => Some(&normalized[..idx]),
        _ => None,
    }
}

/// Allow relative URLs, fragments, and the `http`, `https` and `mailto` schemes.
pub fn is_safe_url(url: &str) -> bool {
    match scheme_of(&normalize_url(url)) {
        Some(scheme) => matches!(scheme, "http" | "https" | "mailto"),
        None => true,
    }
}

/// Image sources: relative URLs, `http`, `https`, and inline `data:image/*` payloads.
pub fn is_safe_image_url(url: &str) -> bool {
    let normalized = normalize_url(url);
    match scheme_of(&normalized) {
        Some("http" | "https") | None => true,
        Some("data") => normalized.starts_with("data:image/"),
        Some(_) => false,
    }
}

/// Follow every `<number>% complete|progress` in a text event with a bar.
///
/// Text inside an image is its alt attribute, so it is passed through untouched.
fn with_progress_bars<'a>(events: impl Iterator<Item = Event<'a>>) -> impl Iterator<Item = Event<'a>> {
    let mut image_depth = 0usize;
    events.flat_map(move |event| {
        match &event {
            Event::Start(Tag::Image { .. }) => image_depth += 1,
            Event::End(TagEnd::Image) => image_depth = image_depth.saturating_sub(1),
            Event::Text(text) if image_depth == 0 => {
                if let Some(split) = split_at_progress(text) {
                    return split;
                }
            }
            _ => {}
        }
        vec![event]
    })
}

fn split_at_progress(text: &str) -> Option<Vec<Event<'static>>> {
    let marks = progress_marks(text);
    if marks.is_empty() {
        return None;
    }

    let mut events = Vec::with_capacity(marks.len() * 2 + 1);
    let mut start = 0;
    for mark in &marks {
        events.push(Event::Text(CowStr::from(text[start..mark.span.end].to_string())));
        events.push(Event::InlineHtml(CowStr::from(markup::progress_bar(&mark.text))));
        start = mark.span.end;
    }
    if start < text.len() {
        events.push(Event::Text(CowStr::from(text[start..].to_string())));
    }
    Some(events)
}

/// Locate progress percentages, left to right and non-overlapping.
///
/// The same detector drives [`render`], so views that draw their own indicators
/// agree with the markup on which occurrences get one.
pub fn progress_marks(text: &str) -> Vec<ProgressMark> {
    progress_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str();
            Some(ProgressMark {
                value: number.parse().ok()?,
                text: number.to_string(),
                span: whole.range(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_progress_bar_sized_to_value() {
        let out = render("Progress: 42% complete");
        assert_eq!(
            out,
            "<p>Progress: 42% complete<span class=\"progress\"><span class=\"progress-bar\" style=\"width: 42%\"></span></span></p>\n"
        );
    }

    #[test]
    fn test_progress_case_insensitive_and_decimal() {
        let out = render("Phase 2 is 37.5% IN PROGRESS? no: 37.5% Progress");
        assert_eq!(out.matches("class=\"progress-bar\"").count(), 1);
        assert!(out.contains("style=\"width: 37.5%\""));
    }

    #[test]
    fn test_multiple_matches_each_get_a_bar() {
        let out = render("Foundation 100% complete, framing 40% in progress, roofing 10% progress");
        // "40% in progress" has a word between, so only two match
        assert_eq!(out.matches("class=\"progress-bar\"").count(), 2);
        let first = out.find("width: 100%").unwrap();
        let second = out.find("width: 10%").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_over_one_hundred_is_not_clamped() {
        let out = render("Budget use is 150% complete");
        assert!(out.contains("style=\"width: 150%\""));
    }

    #[test]
    fn test_progress_in_attributes_is_left_alone() {
        let image = render("![Framing 50% complete](https://x/c.png)");
        assert_eq!(
            image,
            "<p><img src=\"https://x/c.png\" alt=\"Framing 50% complete\" /></p>\n"
        );

        let link = render("[status](https://x/s \"Roof 30% progress\")");
        assert_eq!(
            link,
            "<p><a href=\"https://x/s\" title=\"Roof 30% progress\">status</a></p>\n"
        );
    }

    #[test]
    fn test_progress_in_link_text_gets_a_bar() {
        let out = render("[Roof 30% progress](https://x/s)");
        assert_eq!(
            out,
            "<p><a href=\"https://x/s\">Roof 30% progress<span class=\"progress\"><span class=\"progress-bar\" style=\"width: 30%\"></span></span></a></p>\n"
        );
    }

    #[test]
    fn test_progress_inside_emphasis_and_table_cells() {
        let out = render("**Site prep 80% complete**\n\n| Phase | Status |\n|---|---|\n| Framing | 40% complete |");
        assert_eq!(out.matches("class=\"progress-bar\"").count(), 2);
        assert!(out.contains("<strong>Site prep 80% complete<span class=\"progress\">"));
        assert!(out.contains("<td>40% complete<span class=\"progress\">"));
    }

    #[test]
    fn test_markdown_to_html_has_no_bars() {
        let out = markdown_to_html("Site prep 80% complete");
        assert_eq!(out, "<p>Site prep 80% complete</p>\n");
    }

    #[test]
    fn test_soft_breaks_become_line_breaks() {
        let out = render("line one\nline two");
        assert_eq!(out, "<p>line one<br />\nline two</p>\n");
    }

    #[test]
    fn test_markdown_features() {
        let out = render("# Projects\n\n- **Alpha**\n- *Beta*\n\n| Name | Phase |\n|---|---|\n| Alpha | Framing |\n\n[docs](https://example.com)");
        assert!(out.contains("<h1>Projects</h1>"));
        assert!(out.contains("<li><strong>Alpha</strong></li>"));
        assert!(out.contains("<em>Beta</em>"));
        assert!(out.contains("<table>"));
        assert!(out.contains("<td>Framing</td>"));
        assert!(out.contains("<a href=\"https://example.com\">docs</a>"));
    }

    #[test]
    fn test_raw_html_is_neutralized() {
        let out = render("hello <img src=x onerror=alert(1)> world\n\n<script>alert(1)</script>");
        assert!(!out.contains("<img"));
        assert!(!out.contains("<script"));
        assert!(out.contains("&lt;img src=x onerror=alert(1)&gt;"));
        assert!(out.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_unsafe_link_schemes_are_replaced() {
        let out = render("[click](javascript:alert(1)) and ![x](data:image/png;base64,AAAA)");
        assert!(!out.contains("javascript:"));
        assert!(!out.contains("data:"));
        assert!(out.contains("<a href=\"#\">click</a>"));
    }

    #[test]
    fn test_is_safe_url() {
        assert!(is_safe_url("https://example.com/a"));
        assert!(is_safe_url("/static/charts/a.png"));
        assert!(is_safe_url("#top"));
        assert!(is_safe_url("mailto:pm@example.com"));
        assert!(is_safe_url("reports/a:b"));
        assert!(!is_safe_url("JavaScript:alert(1)"));
        assert!(!is_safe_url("java\tscript:alert(1)"));
        assert!(!is_safe_url("vbscript:x"));
    }

    #[test]
    fn test_is_safe_image_url() {
        assert!(is_safe_image_url("data:image/png;base64,iVBORw0KGgo="));
        assert!(is_safe_image_url("https://x/c.png"));
        assert!(is_safe_image_url("/static/charts/a.png"));
        assert!(!is_safe_image_url("data:text/html;base64,PHNjcmlwdD4="));
        assert!(!is_safe_image_url("javascript:alert(1)"));
        assert!(!is_safe_image_url("mailto:pm@example.com"));
    }

    #[test]
    fn test_progress_marks() {
        let marks = progress_marks("Alpha 42% complete; Beta 7.25% progress");
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].value, 42.0);
        assert_eq!(marks[0].text, "42");
        assert_eq!(marks[0].span, 6..18);
        assert_eq!(marks[1].value, 7.25);
    }

    #[test]
    fn test_no_match_leaves_markup_untouched() {
        let out = render("Budget is 42% spent");
        assert_eq!(out, "<p>Budget is 42% spent</p>\n");
    }
}
