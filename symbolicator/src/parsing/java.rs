use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::StackParseError;
use crate::langs::java::{LINE_NATIVE_METHOD, LINE_UNKNOWN_SOURCE};

// `java.lang.RuntimeException: something broke` - type up to the first colon,
// everything after it is the message.
static EXCEPTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\s:]+)\s*:\s*(.*)$").unwrap());

// `\tat com.example.a.b(SourceFile:42)` - class, method, source info and an
// optional (possibly negative) line.
static FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at\s+([^\s(]+)\.([^\s.(]+)\(([^:)]+)(?::(-?\d+))?\)\s*$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedJavaFrame {
    pub class: String,
    pub method: String,
    pub source_file: String,
    pub line: i64,
}

// Cause-chain markers are carried as raw lines rather than parsed frames, so
// the processor can emit them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JavaStackElement {
    Frame(ParsedJavaFrame),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedJavaStack {
    pub exception_type: String,
    pub exception_message: String,
    pub elements: Vec<JavaStackElement>,
}

pub fn parse_java_stack(raw: &str) -> Result<ParsedJavaStack, StackParseError> {
    if raw.trim().is_empty() {
        return Err(StackParseError::EmptyStackTrace);
    }

    let mut lines = raw.lines();
    let header = lines
        .by_ref()
        .find(|line| !line.trim().is_empty())
        .ok_or(StackParseError::EmptyStackTrace)?;
    let header_caps = EXCEPTION_HEADER
        .captures(header.trim())
        .ok_or(StackParseError::InvalidStackTrace)?;

    let mut elements = Vec::new();
    let mut frame_count = 0usize;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Cause chains are preserved as a single raw element; frames below
        // them belong to a different exception, so parsing halts here.
        if trimmed.starts_with("Caused by:") || trimmed.starts_with("Suppressed:") {
            elements.push(JavaStackElement::Raw(line.to_string()));
            break;
        }
        if let Some(caps) = FRAME.captures(line) {
            let source_file = caps[3].to_string();
            let line_no = caps.get(4).and_then(|m| m.as_str().parse::<i64>().ok());
            let line_no = if source_file == "Native Method" {
                LINE_NATIVE_METHOD
            } else {
                line_no.unwrap_or(LINE_UNKNOWN_SOURCE)
            };
            elements.push(JavaStackElement::Frame(ParsedJavaFrame {
                class: caps[1].to_string(),
                method: caps[2].to_string(),
                source_file,
                line: line_no,
            }));
            frame_count += 1;
        }
        // Unrecognized lines are skipped silently.
    }

    if frame_count == 0 {
        return Err(StackParseError::NoFramesParsed);
    }

    Ok(ParsedJavaStack {
        exception_type: header_caps[1].to_string(),
        exception_message: header_caps[2].to_string(),
        elements,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn headers_split_on_the_first_colon_only() {
        let parsed = parse_java_stack(
            "foo: bar: baz\n\tat com.example.MyClass.method(MyClass.java:100)",
        )
        .unwrap();

        assert_eq!(parsed.exception_type, "foo");
        assert_eq!(parsed.exception_message, "bar: baz");
        assert_eq!(
            parsed.elements,
            vec![JavaStackElement::Frame(ParsedJavaFrame {
                class: "com.example.MyClass".to_string(),
                method: "method".to_string(),
                source_file: "MyClass.java".to_string(),
                line: 100,
            })]
        );
    }

    #[test]
    fn sentinel_sources_get_sentinel_lines() {
        let parsed = parse_java_stack(
            "java.lang.RuntimeException: boom\n\tat a.b.c.d(Native Method)\n\tat a.b.c.e(Unknown Source)\n\tat a.b.c.f(SourceFile)",
        )
        .unwrap();

        let lines: Vec<i64> = parsed
            .elements
            .iter()
            .map(|e| match e {
                JavaStackElement::Frame(f) => f.line,
                JavaStackElement::Raw(_) => panic!("expected frames"),
            })
            .collect();
        assert_eq!(lines, vec![-2, -1, -1]);
    }

    #[test]
    fn cause_chains_halt_parsing_and_keep_the_marker() {
        let parsed = parse_java_stack(
            "java.lang.RuntimeException: outer\n\tat com.example.A.run(A.java:1)\nCaused by: java.lang.IllegalStateException: inner\n\tat com.example.B.run(B.java:2)",
        )
        .unwrap();

        assert_eq!(
            parsed.elements,
            vec![
                JavaStackElement::Frame(ParsedJavaFrame {
                    class: "com.example.A".to_string(),
                    method: "run".to_string(),
                    source_file: "A.java".to_string(),
                    line: 1,
                }),
                JavaStackElement::Raw(
                    "Caused by: java.lang.IllegalStateException: inner".to_string()
                ),
            ]
        );
    }

    #[test]
    fn unrecognized_lines_are_skipped_silently() {
        let parsed = parse_java_stack(
            "java.lang.RuntimeException: boom\n\t... 12 more\n\tat com.example.A.run(A.java:1)",
        )
        .unwrap();
        assert_eq!(parsed.elements.len(), 1);
    }

    #[test]
    fn empty_input_and_bad_headers_are_distinct_errors() {
        assert_eq!(
            parse_java_stack("  \n "),
            Err(StackParseError::EmptyStackTrace)
        );
        assert_eq!(
            parse_java_stack("not a header line\n\tat a.b.c(D.java:1)"),
            Err(StackParseError::InvalidStackTrace)
        );
        assert_eq!(
            parse_java_stack("java.lang.RuntimeException: boom\nno frames here"),
            Err(StackParseError::NoFramesParsed)
        );
    }
}
