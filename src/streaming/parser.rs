//! Tool-call markup parser for model responses
//!
//! The model does not use structured tool calls; it writes them inline in
//! its text, wrapped in DeepSeek-style sentinel tokens:
//!
//! ```text
//! <｜tool▁calls▁begin｜>
//!   <｜tool▁call▁begin｜>read_file<｜tool▁sep｜>{"path":"a.go"}<｜tool▁call▁end｜>
//!   <｜tool▁call▁begin｜>...<｜tool▁call▁end｜>
//! <｜tool▁calls▁end｜>
//! ```
//!
//! `ResponseParser::parse` pulls every well-formed call out of a complete
//! response and returns the text that remains for the user. Malformed spans
//! are dropped, never reported as errors.
//!
//! `ResponseParser::parse_suppressed` is used on the follow-up response that
//! narrates tool results. Tools are disabled for that request, so any markup
//! or echoed argument objects it still contains are noise and get stripped.

use crate::types::ToolCall;
use tracing::{debug, warn};

/// Start of a tool-calls block
pub const TOOL_CALLS_BEGIN: &str = "<\u{ff5c}tool\u{2581}calls\u{2581}begin\u{ff5c}>";

/// End of a tool-calls block
pub const TOOL_CALLS_END: &str = "<\u{ff5c}tool\u{2581}calls\u{2581}end\u{ff5c}>";

/// Start of a single call inside a block
pub const TOOL_CALL_BEGIN: &str = "<\u{ff5c}tool\u{2581}call\u{2581}begin\u{ff5c}>";

/// End of a single call inside a block
pub const TOOL_CALL_END: &str = "<\u{ff5c}tool\u{2581}call\u{2581}end\u{ff5c}>";

/// Separates the function name from its argument text
pub const TOOL_SEP: &str = "<\u{ff5c}tool\u{2581}sep\u{ff5c}>";

/// Minimum non-whitespace characters a suppressed response must keep
pub const MIN_VISIBLE_CHARS: usize = 20;

/// Shown instead of a suppressed response that cleaned down to nothing
pub const SUPPRESSED_PLACEHOLDER: &str =
    "I've finished running the requested tools. Let me know if you'd like more detail on the results.";

/// Keys whose presence marks a standalone JSON line as echoed tool arguments
const ARGUMENT_KEYS: &[&str] = &["\"path\"", "\"recursive\"", "\"pattern\""];

/// Echoed argument objects are small; anything with more colons is real content
const MAX_ECHO_COLONS: usize = 2;

/// Result of parsing one model response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Extracted calls in document order, IDs `call_1..call_N`
    pub tool_calls: Vec<ToolCall>,

    /// User-visible text with all markup removed, trimmed
    pub content: String,

    /// A block was opened but never closed (generation cut off)
    pub truncated: bool,
}

impl ParsedResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Sentinel-markup response parser
#[derive(Debug, Clone)]
pub struct ResponseParser {
    min_visible_chars: usize,
    placeholder: String,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            min_visible_chars: MIN_VISIBLE_CHARS,
            placeholder: SUPPRESSED_PLACEHOLDER.to_string(),
        }
    }

    /// Extract tool calls and the remaining visible text
    ///
    /// Blocks are scanned left to right. A block without an end sentinel
    /// truncates the response at its begin sentinel and ends the scan; calls
    /// found in earlier blocks are kept.
    pub fn parse(&self, text: &str) -> ParsedResponse {
        if !text.contains(TOOL_CALLS_BEGIN) {
            return ParsedResponse {
                tool_calls: Vec::new(),
                content: text.trim().to_string(),
                truncated: false,
            };
        }

        let mut tool_calls = Vec::new();
        let mut remainder = String::with_capacity(text.len());
        let mut cursor = 0;
        let mut truncated = false;

        while let Some(offset) = text[cursor..].find(TOOL_CALLS_BEGIN) {
            let begin = cursor + offset;
            remainder.push_str(&text[cursor..begin]);

            let inner_start = begin + TOOL_CALLS_BEGIN.len();
            match text[inner_start..].find(TOOL_CALLS_END) {
                Some(len) => {
                    let inner_end = inner_start + len;
                    extract_calls(&text[inner_start..inner_end], &mut tool_calls);
                    cursor = inner_end + TOOL_CALLS_END.len();
                }
                None => {
                    debug!(at = begin, "tool-calls block never closed, truncating response");
                    truncated = true;
                    cursor = text.len();
                    break;
                }
            }
        }

        if !truncated {
            remainder.push_str(&text[cursor..]);
        }

        debug!(calls = tool_calls.len(), truncated, "parsed model response");

        ParsedResponse {
            tool_calls,
            content: remainder.trim().to_string(),
            truncated,
        }
    }

    /// Clean a follow-up response produced with tools disabled
    ///
    /// Markup is stripped as in `parse` and any calls it held are discarded.
    /// Standalone JSON lines that look like echoed tool arguments are then
    /// removed. If too little text survives, the placeholder is returned.
    pub fn parse_suppressed(&self, text: &str) -> String {
        let parsed = self.parse(text);
        if parsed.has_tool_calls() {
            warn!(
                calls = parsed.tool_calls.len(),
                "follow-up response contained tool-call markup; ignoring it"
            );
        }

        let cleaned = parsed
            .content
            .lines()
            .filter(|line| !is_argument_echo(line))
            .collect::<Vec<_>>()
            .join("\n");
        let cleaned = cleaned.trim();

        let visible = cleaned.chars().filter(|c| !c.is_whitespace()).count();
        if visible < self.min_visible_chars {
            debug!(visible, "suppressed response too short, using placeholder");
            return self.placeholder.clone();
        }

        cleaned.to_string()
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect every well-formed call inside one block's inner text
fn extract_calls(block: &str, calls: &mut Vec<ToolCall>) {
    let mut rest = block;

    while let Some(start) = rest.find(TOOL_CALL_BEGIN) {
        let after = &rest[start + TOOL_CALL_BEGIN.len()..];
        let end = match after.find(TOOL_CALL_END) {
            Some(end) => end,
            None => {
                debug!("tool call never closed, dropping rest of block");
                break;
            }
        };

        match split_call(&after[..end]) {
            Some((name, arguments)) => {
                let id = ToolCall::sequential_id(calls.len() + 1);
                calls.push(ToolCall::new(id, name, arguments));
            }
            None => debug!("dropping malformed tool call span"),
        }

        rest = &after[end + TOOL_CALL_END.len()..];
    }
}

/// Split a call span into trimmed `(name, arguments)`
///
/// Also accepts the chat-template variant where the span reads
/// `function<sep>name` followed by a fenced JSON body on the next lines.
fn split_call(span: &str) -> Option<(&str, &str)> {
    let (name, arguments) = span.split_once(TOOL_SEP)?;
    let (name, arguments) = (name.trim(), arguments.trim());

    let (name, arguments) = if name == "function" {
        match arguments.split_once('\n') {
            Some((real_name, body)) if !real_name.trim().is_empty() => {
                (real_name.trim(), strip_code_fence(body))
            }
            // Template header with no body is not a call
            _ => return None,
        }
    } else {
        (name, arguments)
    };

    if name.is_empty() || arguments.is_empty() {
        return None;
    }
    Some((name, arguments))
}

/// Remove a surrounding markdown code fence (```json ... ```) if present
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Whether a line is a bare JSON object echoing tool arguments
fn is_argument_echo(line: &str) -> bool {
    let line = line.trim();
    if !(line.starts_with('{') && line.ends_with('}')) {
        return false;
    }
    if line.matches(':').count() > MAX_ECHO_COLONS {
        return false;
    }
    line == "{}" || ARGUMENT_KEYS.iter().any(|key| line.contains(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn call_span(name: &str, args: &str) -> String {
        format!("{}{}{}{}{}", TOOL_CALL_BEGIN, name, TOOL_SEP, args, TOOL_CALL_END)
    }

    fn block(calls: &[String]) -> String {
        format!("{}{}{}", TOOL_CALLS_BEGIN, calls.concat(), TOOL_CALLS_END)
    }

    #[test]
    fn test_single_call_with_preamble() {
        let text = format!(
            "Sure.\n\n{}",
            block(&[call_span("read_file", r#"{"path":"a.go"}"#)])
        );
        let parsed = ResponseParser::new().parse(&text);

        assert_eq!(parsed.tool_calls.len(), 1);
        let call = &parsed.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.kind, "function");
        assert_eq!(call.name(), "read_file");
        let args: serde_json::Value = serde_json::from_str(call.arguments()).unwrap();
        assert_eq!(args, serde_json::json!({"path": "a.go"}));
        assert_eq!(parsed.content, "Sure.");
        assert!(!parsed.truncated);
    }

    #[test]
    fn test_no_markup_returns_trimmed_text() {
        let parsed = ResponseParser::new().parse("  just prose\n");
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.content, "just prose");
    }

    #[test]
    fn test_multiple_calls_keep_document_order() {
        let text = format!(
            "a {} b {}",
            block(&[
                call_span("read_file", r#"{"path":"x"}"#),
                call_span("list_files", r#"{"path":"."}"#),
            ]),
            block(&[call_span("git_diff", "{}")])
        );
        let parsed = ResponseParser::new().parse(&text);

        let names: Vec<_> = parsed.tool_calls.iter().map(|c| c.name()).collect();
        let ids: Vec<_> = parsed.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(names, ["read_file", "list_files", "git_diff"]);
        assert_eq!(ids, ["call_1", "call_2", "call_3"]);
        assert_eq!(parsed.content, "a  b");
    }

    #[test]
    fn test_unclosed_block_truncates() {
        let text = format!(
            "Before {} after {}{} tail",
            block(&[call_span("read_file", r#"{"path":"x"}"#)]),
            TOOL_CALLS_BEGIN,
            call_span("list_files", "{}")
        );
        let parsed = ResponseParser::new().parse(&text);

        assert!(parsed.truncated);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.content, "Before  after");
    }

    #[test]
    fn test_unclosed_first_block_keeps_only_prefix() {
        let text = format!("Let me look.{}{}", TOOL_CALLS_BEGIN, TOOL_CALL_BEGIN);
        let parsed = ResponseParser::new().parse(&text);

        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.content, "Let me look.");
    }

    #[test]
    fn test_missing_separator_drops_call_but_removes_span() {
        let text = format!(
            "ok {}",
            block(&[format!("{}read_file {{}}{}", TOOL_CALL_BEGIN, TOOL_CALL_END)])
        );
        let parsed = ResponseParser::new().parse(&text);

        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.content, "ok");
    }

    #[test]
    fn test_empty_name_or_arguments_rejected() {
        let text = block(&[
            call_span("   ", "{}"),
            call_span("read_file", "   "),
            call_span("list_files", "{}"),
        ]);
        let parsed = ResponseParser::new().parse(&text);

        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name(), "list_files");
        assert_eq!(parsed.tool_calls[0].id, "call_1");
    }

    #[test]
    fn test_chat_template_variant() {
        let span = call_span("function", "read_file\n```json\n{\"path\": \"src/main.rs\"}\n```");
        let parsed = ResponseParser::new().parse(&block(&[span]));

        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name(), "read_file");
        assert_eq!(parsed.tool_calls[0].arguments(), "{\"path\": \"src/main.rs\"}");
    }

    #[test]
    fn test_chat_template_without_body_is_dropped() {
        let bare = call_span("function", "read_file");
        let empty = call_span("function", "read_file\n```json\n```");
        let parsed = ResponseParser::new().parse(&block(&[bare, empty]));

        assert!(parsed.tool_calls.is_empty());
        assert!(parsed.content.is_empty());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_suppressed_drops_empty_object_line() {
        let text = "{}\nThe file defines the main entry point and parses flags.";
        let out = ResponseParser::new().parse_suppressed(text);
        assert_eq!(out, "The file defines the main entry point and parses flags.");
    }

    #[test]
    fn test_suppressed_keeps_inline_json() {
        let text = "Added {\"path\": \"x\"} to the list of files that were changed.";
        let out = ResponseParser::new().parse_suppressed(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_suppressed_drops_argument_echo_but_not_rich_json() {
        let text = "{\"path\": \"src\", \"recursive\": true}\n\
                    Here is the summary of the directory listing.\n\
                    {\"path\": \"a\", \"b\": 1, \"c\": 2}";
        let out = ResponseParser::new().parse_suppressed(text);

        assert!(!out.contains("recursive"));
        assert!(out.contains("Here is the summary"));
        assert!(out.contains("\"c\": 2"));
    }

    #[test]
    fn test_suppressed_preserves_blank_lines() {
        let text = "First paragraph of the answer.\n\n{}\n\nSecond paragraph.";
        let out = ResponseParser::new().parse_suppressed(text);
        assert_eq!(out, "First paragraph of the answer.\n\n\nSecond paragraph.");
    }

    #[test]
    fn test_suppressed_short_result_uses_placeholder() {
        let out = ResponseParser::new().parse_suppressed("{}\nDone.");
        assert_eq!(out, SUPPRESSED_PLACEHOLDER);
    }

    #[test]
    fn test_suppressed_strips_reemitted_markup() {
        let text = format!(
            "The README describes the build steps in detail.{}",
            block(&[call_span("read_file", r#"{"path":"README.md"}"#)])
        );
        let out = ResponseParser::new().parse_suppressed(&text);
        assert_eq!(out, "The README describes the build steps in detail.");
    }

    fn sanitize(text: &str) -> String {
        text.chars().filter(|c| *c != '<').collect()
    }

    #[quickcheck]
    fn prop_n_spans_yield_n_calls(
        prefix: String,
        suffix: String,
        names: Vec<String>,
        separate_blocks: bool,
    ) -> bool {
        let prefix = sanitize(&prefix);
        let suffix = sanitize(&suffix);
        let names: Vec<String> = names
            .iter()
            .take(8)
            .map(|n| {
                let clean: String = n.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
                if clean.is_empty() { "tool".to_string() } else { clean }
            })
            .collect();

        let spans: Vec<String> = names
            .iter()
            .enumerate()
            .map(|(i, n)| call_span(n, &format!("{{\"n\": {}}}", i)))
            .collect();
        let markup = if separate_blocks {
            spans.iter().map(|s| block(std::slice::from_ref(s))).collect::<String>()
        } else {
            block(&spans)
        };

        let parsed = ResponseParser::new().parse(&format!("{}{}{}", prefix, markup, suffix));

        parsed.tool_calls.len() == names.len()
            && parsed
                .tool_calls
                .iter()
                .enumerate()
                .all(|(i, c)| c.id == format!("call_{}", i + 1) && c.name() == names[i])
            && parsed.content == format!("{}{}", prefix, suffix).trim()
    }
}
