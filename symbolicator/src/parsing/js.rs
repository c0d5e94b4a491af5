use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use super::UNKNOWN_FUNCTION;

// Strategy regexes, in the order they're tried. These descend from the
// TraceKit lineage every browser-side error tracker carries around; each one
// is keyed to a browser family's stack format.

static OPERA_11: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i) line (\d+), column (\d+)\s*(?:in (?:<anonymous function: ([^>]+)>|([^)]+))\((.*)\))? in (.*):\s*$",
    )
    .unwrap()
});

// React native frames name an address inside the bundle rather than a url.
static REACT_NATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*at (.*?) ?\(address at (.+?)(?::(\d+))?(?::(\d+))?\)\s*$").unwrap()
});

static CHROME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*at (.*?) ?\(((?:file|https?|blob|chrome-extension|native|eval|webpack|<anonymous>|/).*?)(?::(\d+))?(?::(\d+))?\)?\s*$",
    )
    .unwrap()
});

// Unwraps `eval at <fn> (<url>:<line>:<col>)` nesting in chrome frames.
static CHROME_EVAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\S*)(?::(\d+))(?::(\d+))\)").unwrap());

static WINJS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*at (?:((?:\[object object\])?.+) )?\(?((?:file|ms-appx|https?|webpack|blob):.*?):(\d+)(?::(\d+))?\)?\s*$",
    )
    .unwrap()
});

static GECKO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(.*?)(?:\((.*?)\))?(?:^|@)((?:file|https?|blob|chrome|webpack|resource|\[native).*?|[^@]*bundle)(?::(\d+))?(?::(\d+))?\s*$",
    )
    .unwrap()
});

static GECKO_EVAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\S+) line (\d+)(?: > eval line \d+)* > eval").unwrap());

// Opera 9 writes locations into the exception message, one of three shapes.
static OPERA_9_LINKED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*Line (\d+) of linked script ((?:file|https?|blob)\S+)(?::\s*in\s*function\s*(\S+))?\s*$",
    )
    .unwrap()
});

static OPERA_9_INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*Line (\d+) of inline#(\d+) script in ((?:file|https?|blob)\S+)(?::\s*in\s*function\s*(\S+))?\s*$",
    )
    .unwrap()
});

static OPERA_9_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*Line (\d+) of function script\s*$").unwrap());

// Which strategy produced the frames. Tagged onto the parse result for
// diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    Stack,
    Stacktrace,
    Multiline,
    Failed,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Stack => "stack",
            ParseMode::Stacktrace => "stacktrace",
            ParseMode::Multiline => "multiline",
            ParseMode::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedJsFrame {
    pub function: String,
    pub url: String,
    pub line: Option<i64>,
    pub column: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedJsStack {
    pub exception_type: String,
    pub exception_message: String,
    pub mode: ParseMode,
    pub frames: Vec<ParsedJsFrame>,
}

// Tries each strategy in order and returns on the first that yields any
// frames; an empty frame list is treated as a non-match. The exception name
// and message are carried through verbatim, except in multiline mode where
// the message's own first line is the human-readable message.
pub fn parse_js_stack(name: &str, message: &str, stack: &str) -> ParsedJsStack {
    let frames = parse_opera_11(stack);
    if !frames.is_empty() {
        return result(name, message, ParseMode::Stacktrace, frames);
    }

    let frames = parse_stack_property(stack);
    if !frames.is_empty() {
        return result(name, message, ParseMode::Stack, frames);
    }

    let frames = parse_opera_9_lines(stack, 0, 1);
    if !frames.is_empty() {
        return result(name, message, ParseMode::Stacktrace, frames);
    }

    let frames = parse_opera_9_message(message);
    if !frames.is_empty() {
        let first_line = message.lines().next().unwrap_or(message).trim().to_string();
        return result(name, &first_line, ParseMode::Multiline, frames);
    }

    result(name, message, ParseMode::Failed, vec![])
}

fn result(name: &str, message: &str, mode: ParseMode, frames: Vec<ParsedJsFrame>) -> ParsedJsStack {
    ParsedJsStack {
        exception_type: name.to_string(),
        exception_message: message.to_string(),
        mode,
        frames,
    }
}

// Opera 11+ `stacktrace` records alternate a location line with the source
// text that threw, so only even lines are scanned.
fn parse_opera_11(stack: &str) -> Vec<ParsedJsFrame> {
    let lines: Vec<&str> = stack.lines().collect();
    let mut frames = Vec::new();
    for line in lines.iter().step_by(2) {
        if let Some(caps) = OPERA_11.captures(line) {
            let function = cap_string(&caps, 3)
                .or_else(|| cap_string(&caps, 4))
                .unwrap_or_else(|| UNKNOWN_FUNCTION.to_string());
            frames.push(ParsedJsFrame {
                function,
                url: cap_string(&caps, 6).unwrap_or_default(),
                line: cap_int(&caps, 1),
                column: cap_int(&caps, 2),
            });
        }
    }
    frames
}

// The `stack` property, one frame per line. Strategies are tried most
// specific first; lines that match nothing (the `Type: message` header, bare
// source text) are skipped.
fn parse_stack_property(stack: &str) -> Vec<ParsedJsFrame> {
    let mut frames = Vec::new();
    for line in stack.lines() {
        if let Some(frame) = parse_react_native_line(line)
            .or_else(|| parse_chrome_line(line))
            .or_else(|| parse_winjs_line(line))
            .or_else(|| parse_gecko_line(line))
        {
            frames.push(frame);
        }
    }
    frames
}

fn parse_react_native_line(line: &str) -> Option<ParsedJsFrame> {
    let caps = REACT_NATIVE.captures(line)?;
    Some(ParsedJsFrame {
        function: function_or_unknown(&caps, 1),
        url: cap_string(&caps, 2).unwrap_or_default(),
        line: cap_int(&caps, 3),
        column: cap_int(&caps, 4),
    })
}

fn parse_chrome_line(line: &str) -> Option<ParsedJsFrame> {
    let caps = CHROME.captures(line)?;
    let mut url = cap_string(&caps, 2).unwrap_or_default();
    let mut line_no = cap_int(&caps, 3);
    let mut column = cap_int(&caps, 4);

    // Eval frames nest the real location inside the url slot.
    if url.starts_with("eval") {
        if let Some(sub) = CHROME_EVAL.captures(&url) {
            line_no = cap_int(&sub, 2);
            column = cap_int(&sub, 3);
            url = cap_string(&sub, 1).unwrap_or_default();
        }
    }

    // V8 renders native frames as `(native)`, with no location to map.
    if url.starts_with("native") {
        url = "native".to_string();
        line_no = None;
        column = None;
    }

    Some(ParsedJsFrame {
        function: function_or_unknown(&caps, 1),
        url,
        line: line_no,
        column,
    })
}

fn parse_winjs_line(line: &str) -> Option<ParsedJsFrame> {
    let caps = WINJS.captures(line)?;
    Some(ParsedJsFrame {
        function: function_or_unknown(&caps, 1),
        url: cap_string(&caps, 2).unwrap_or_default(),
        line: cap_int(&caps, 3),
        column: cap_int(&caps, 4),
    })
}

fn parse_gecko_line(line: &str) -> Option<ParsedJsFrame> {
    let caps = GECKO.captures(line)?;
    let mut url = cap_string(&caps, 3).unwrap_or_default();
    let mut line_no = cap_int(&caps, 4);
    let mut column = cap_int(&caps, 5);

    // Firefox folds eval locations into the url segment.
    if url.contains(" > eval") {
        if let Some(sub) = GECKO_EVAL.captures(&url) {
            line_no = cap_int(&sub, 2);
            column = None;
            url = cap_string(&sub, 1).unwrap_or_default();
        }
    }

    Some(ParsedJsFrame {
        function: function_or_unknown(&caps, 1),
        url,
        line: line_no,
        column,
    })
}

// The Opera 9 multiline message: locations start on the third line and
// alternate with the source text that threw.
fn parse_opera_9_message(message: &str) -> Vec<ParsedJsFrame> {
    if message.lines().count() < 4 {
        return vec![];
    }
    parse_opera_9_lines(message, 2, 2)
}

fn parse_opera_9_lines(text: &str, start: usize, step: usize) -> Vec<ParsedJsFrame> {
    let lines: Vec<&str> = text.lines().collect();
    let mut frames = Vec::new();
    let mut i = start;
    while i < lines.len() {
        if let Some(caps) = OPERA_9_LINKED.captures(lines[i]) {
            frames.push(ParsedJsFrame {
                function: function_or_unknown(&caps, 3),
                url: cap_string(&caps, 2).unwrap_or_default(),
                line: cap_int(&caps, 1),
                column: None,
            });
        } else if let Some(caps) = OPERA_9_INLINE.captures(lines[i]) {
            frames.push(ParsedJsFrame {
                function: function_or_unknown(&caps, 4),
                url: cap_string(&caps, 3).unwrap_or_default(),
                line: cap_int(&caps, 1),
                column: None,
            });
        } else if let Some(caps) = OPERA_9_FUNCTION.captures(lines[i]) {
            frames.push(ParsedJsFrame {
                function: UNKNOWN_FUNCTION.to_string(),
                url: String::new(),
                line: cap_int(&caps, 1),
                column: None,
            });
        }
        i += step;
    }
    frames
}

fn cap_string(caps: &Captures, i: usize) -> Option<String> {
    caps.get(i)
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

// Non-numeric (or overflowing) components leave the field unset without
// failing the match.
fn cap_int(caps: &Captures, i: usize) -> Option<i64> {
    caps.get(i).and_then(|m| m.as_str().parse().ok())
}

fn function_or_unknown(caps: &Captures, i: usize) -> String {
    cap_string(caps, i).unwrap_or_else(|| UNKNOWN_FUNCTION.to_string())
}
