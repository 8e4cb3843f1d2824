//! Extraction strategies, tried in order until one yields a JSON value.

use serde_json::Value;

use super::ParseError;

/// How many candidate start positions the balanced-span scan will try.
const MAX_SPAN_CANDIDATES: usize = 16;

/// One way of pulling a JSON value out of generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The whole text is JSON.
    Direct,
    /// JSON inside a markdown code fence.
    FencedBlock,
    /// The first balanced `{...}` or `[...]` span that parses.
    BalancedSpan,
    /// Fence stripping, quote normalisation, trailing-comma removal and
    /// closing of truncated brackets, then a parse.
    Repaired,
}

impl ParseStrategy {
    pub const ORDERED: [ParseStrategy; 4] = [
        ParseStrategy::Direct,
        ParseStrategy::FencedBlock,
        ParseStrategy::BalancedSpan,
        ParseStrategy::Repaired,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParseStrategy::Direct => "direct",
            ParseStrategy::FencedBlock => "fenced_block",
            ParseStrategy::BalancedSpan => "balanced_span",
            ParseStrategy::Repaired => "repaired",
        }
    }

    pub fn apply(&self, text: &str) -> Result<Value, ParseError> {
        match self {
            ParseStrategy::Direct => parse_with(self, text.trim()),
            ParseStrategy::FencedBlock => {
                let blocks = fenced_blocks(text, false);
                if blocks.is_empty() {
                    return Err(ParseError::NoJson(self.name()));
                }
                let mut last = ParseError::NoJson(self.name());
                for block in blocks {
                    if !matches!(block.language.as_deref(), None | Some("json") | Some("JSON")) {
                        continue;
                    }
                    match parse_with(self, block.code.trim()) {
                        Ok(value) => return Ok(value),
                        Err(e) => last = e,
                    }
                }
                Err(last)
            }
            ParseStrategy::BalancedSpan => {
                let mut last = ParseError::NoJson(self.name());
                for span in balanced_spans(text).into_iter().take(MAX_SPAN_CANDIDATES) {
                    match parse_with(self, span) {
                        Ok(value) => return Ok(value),
                        Err(e) => last = e,
                    }
                }
                Err(last)
            }
            ParseStrategy::Repaired => {
                let repaired = repair_json(text).ok_or(ParseError::NoJson(self.name()))?;
                parse_with(self, &repaired)
            }
        }
    }
}

fn parse_with(strategy: &ParseStrategy, text: &str) -> Result<Value, ParseError> {
    serde_json::from_str(text).map_err(|e| ParseError::InvalidJson {
        strategy: strategy.name(),
        message: e.to_string(),
    })
}

/// A markdown code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    pub language: Option<String>,
    pub code: String,
}

/// Collect fenced code blocks. With `allow_unclosed`, a final fence that never
/// closes runs to the end of the text (truncated output).
pub fn fenced_blocks(text: &str, allow_unclosed: bool) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let (header, body) = match after_open.find('\n') {
            Some(nl) => (&after_open[..nl], &after_open[nl + 1..]),
            None => (after_open, ""),
        };
        let language = Some(header.trim())
            .filter(|l| !l.is_empty() && !l.contains(char::is_whitespace))
            .map(str::to_string);

        match body.find("```") {
            Some(close) => {
                blocks.push(FencedBlock {
                    language,
                    code: body[..close].to_string(),
                });
                rest = &body[close + 3..];
            }
            None => {
                if allow_unclosed {
                    blocks.push(FencedBlock {
                        language,
                        code: body.to_string(),
                    });
                }
                break;
            }
        }
    }

    blocks
}

/// Top-level balanced `{...}` / `[...]` spans, in order. Spans nested in an
/// earlier span are not returned, and an opening bracket that never closes
/// ends the scan. String literals are respected.
pub fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut pos = 0;
    while let Some(offset) = text[pos..].find(['{', '[']) {
        let start = pos + offset;
        match scan_span(&text[start..]) {
            SpanEnd::Closed(len) => {
                spans.push(&text[start..start + len]);
                pos = start + len;
            }
            SpanEnd::Mismatched => pos = start + 1,
            SpanEnd::Unterminated => break,
        }
    }
    spans
}

enum SpanEnd {
    Closed(usize),
    Mismatched,
    Unterminated,
}

fn scan_span(text: &str) -> SpanEnd {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return SpanEnd::Mismatched;
                }
                if stack.is_empty() {
                    return SpanEnd::Closed(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    SpanEnd::Unterminated
}

/// Best-effort repair of almost-JSON. Returns `None` when there is no
/// bracket to start from.
pub fn repair_json(text: &str) -> Option<String> {
    let body = match fenced_blocks(text, true).into_iter().next() {
        Some(block) => block.code,
        None => text.to_string(),
    };
    let normalized = normalize_quotes(&body);
    let start = normalized.find(['{', '['])?;
    let closed = close_truncated(&normalized[start..]);
    Some(remove_trailing_commas(&closed))
}

fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

/// Cut anything after the outermost value closes; close whatever is still
/// open when the text ends.
fn close_truncated(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        out.push(c);
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
                if stack.is_empty() {
                    return out;
                }
            }
            _ => {}
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
