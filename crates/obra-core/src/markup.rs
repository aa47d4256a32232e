//! Markup fragments for every block the transcript can hold.
//!
//! All functions here are deterministic: the same block always produces the same
//! markup, which is what lets a restored transcript reproduce the persisted view.

use crate::transcript::Role;
use crate::transform::is_safe_image_url;

/// Escape text for insertion into element content or a quoted attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn role_class(role: Role) -> &'static str {
    match role {
        Role::User => "user-message",
        Role::Assistant => "bot-message",
    }
}

/// A chat bubble followed by its timestamp label.
///
/// `inner` must already be safe markup: escaped text for user messages, transformer
/// output for assistant messages.
pub fn message_block(role: Role, inner: &str, timestamp: &str) -> String {
    format!(
        "<div class=\"message {}\"><div class=\"message-content\">{}</div></div><div class=\"message-time\">{}</div>",
        role_class(role),
        inner,
        escape_html(timestamp)
    )
}

/// Standalone chart image, loaded lazily by the browser. Sources outside the
/// image allow-list are replaced with `#`.
pub fn chart_block(url: &str) -> String {
    let src = if is_safe_image_url(url) { url } else { "#" };
    format!(
        "<div class=\"chart-container\"><img src=\"{}\" alt=\"Chart\" class=\"chart-image\" loading=\"lazy\"></div>",
        escape_html(src)
    )
}

/// The seeded greeting shown on a fresh transcript.
pub fn welcome_block(text: &str) -> String {
    format!(
        "<div class=\"message bot-message welcome\"><div class=\"message-content\"><p>{}</p></div></div>",
        escape_html(text)
    )
}

/// Suggested prompts. Each button carries its prompt text so a front-end can
/// submit it exactly as if it had been typed.
pub fn suggestions_block(prompts: &[String]) -> String {
    let buttons: String = prompts
        .iter()
        .map(|p| {
            let escaped = escape_html(p);
            format!(
                "<button type=\"button\" class=\"suggestion\" data-prompt=\"{}\">{}</button>",
                escaped, escaped
            )
        })
        .collect();
    format!("<div class=\"suggestions\">{}</div>", buttons)
}

/// "Assistant reply in flight" marker. Never persisted.
pub fn loading_block(id: u64) -> String {
    format!(
        "<div class=\"message bot-message loading\" data-request=\"{}\"><div class=\"typing-indicator\"><span></span><span></span><span></span></div></div>",
        id
    )
}

/// Visual bar appended after a matched progress percentage. `value` is the
/// matched number text, used verbatim as the width.
pub fn progress_bar(value: &str) -> String {
    format!(
        "<span class=\"progress\"><span class=\"progress-bar\" style=\"width: {}%\"></span></span>",
        value
    )
}

/// Wrap transcript markup into a standalone page for export.
pub fn document(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
.progress {{ display: inline-block; width: 10em; height: 0.6em; margin-left: 0.5em; background: #e2e8f0; }}
.progress-bar {{ display: block; height: 100%; background: #10b981; }}
.message-time {{ color: #64748b; font-size: 0.8em; }}
.chart-image {{ max-width: 100%; }}
</style>
</head>
<body>
<div id="chat-messages">{body}</div>
</body>
</html>
"#,
        title = escape_html(title),
        body = body
    )
}
