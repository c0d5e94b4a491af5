use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use symbolicator::config::Config;
use symbolicator::error::SymbolicationError;
use symbolicator::langs::js::{JsFrame, SourceMapSymbolicator, SymbolicateJs};
use symbolicator::langs::MappedFrame;
use symbolicator::pipeline::js::SourceMapProcessor;
use symbolicator::pipeline::{Pipeline, RecordProcessor, PARSING_METHOD_PROCESSOR};
use symbolicator::symbol_store::local::LocalStore;
use symbolicator::types::{
    Attributes, LogRecord, ResourceLogs, ResourceSpans, Span, SpanEvent,
};

// Wraps the real symbolicator so tests can assert how many times the
// processor actually consulted it.
struct CountingSymbolicator {
    inner: SourceMapSymbolicator,
    calls: AtomicUsize,
}

#[async_trait]
impl SymbolicateJs for CountingSymbolicator {
    async fn symbolicate(&self, frame: &JsFrame) -> Result<Vec<MappedFrame>, SymbolicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.symbolicate(frame).await
    }
}

fn counting_symbolicator() -> Arc<CountingSymbolicator> {
    Arc::new(CountingSymbolicator {
        inner: SourceMapSymbolicator::new(
            Arc::new(LocalStore::new("tests/static")),
            "",
            8,
            Duration::from_secs(1),
        ),
        calls: AtomicUsize::new(0),
    })
}

fn processor(symbolicator: Arc<CountingSymbolicator>) -> SourceMapProcessor {
    let config = Config::init_with_defaults().unwrap();
    SourceMapProcessor::new(&config, symbolicator)
}

#[tokio::test]
async fn single_structured_frame_resolves_to_the_original_position() {
    let symbolicator = counting_symbolicator();
    let processor = processor(symbolicator.clone());

    let mut attributes = Attributes::new();
    attributes.insert("exception.stacktrace", "minified");
    attributes.insert("exception.structured_stacktrace.lines", vec![0i64]);
    attributes.insert("exception.structured_stacktrace.columns", vec![34i64]);
    attributes.insert(
        "exception.structured_stacktrace.functions",
        vec!["b".to_string()],
    );
    attributes.insert(
        "exception.structured_stacktrace.urls",
        vec!["basic-mapping.js".to_string()],
    );

    assert!(
        processor
            .process_record(&mut attributes, &Attributes::new())
            .await
    );

    assert_eq!(
        attributes.get_str("exception.stacktrace"),
        Some("    at bar(basic-mapping-original.js:8:1)")
    );
    assert_eq!(
        attributes.get_bool("exception.symbolicator.failed"),
        Some(false)
    );
    assert_eq!(symbolicator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn raw_stacks_fall_back_to_the_parser() {
    let symbolicator = counting_symbolicator();
    let processor = processor(symbolicator.clone());

    let mut attributes = Attributes::new();
    attributes.insert(
        "exception.stacktrace",
        "TypeError: Cannot read property 'foo' of undefined\n    at processData (https://example.com/bundle.js:1:5000)\n    at handleClick (https://example.com/bundle.js:1:3000)",
    );

    assert!(
        processor
            .process_record(&mut attributes, &Attributes::new())
            .await
    );

    // Successful symbolications are never memoized, so both frames consulted
    // the symbolicator even though they share an artifact.
    assert_eq!(symbolicator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        attributes.get_str("exception.symbolicator.parsing_method"),
        Some(PARSING_METHOD_PROCESSOR)
    );
    assert_eq!(
        attributes.get_bool("exception.symbolicator.failed"),
        Some(false)
    );
    let stack = attributes.get_str("exception.stacktrace").unwrap();
    assert_eq!(stack.lines().count(), 2);
    assert!(stack
        .lines()
        .all(|l| l.contains("processData(app-original.js:8:1)")));
}

#[tokio::test]
async fn native_frames_are_preserved_verbatim() {
    let symbolicator = counting_symbolicator();
    let processor = processor(symbolicator.clone());

    let mut attributes = Attributes::new();
    attributes.insert(
        "exception.stacktrace",
        "Error: test\n    at Array.forEach (native)\n    at funcA (http://example.com/bundle.js:10:5)\n    at Array.map (native)",
    );

    assert!(
        processor
            .process_record(&mut attributes, &Attributes::new())
            .await
    );

    // Only funcA has a location to look up.
    assert_eq!(symbolicator.calls.load(Ordering::SeqCst), 1);
    let stack = attributes.get_str("exception.stacktrace").unwrap();
    let lines: Vec<&str> = stack.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "    at Array.forEach (native)");
    assert_eq!(lines[2], "    at Array.map (native)");
    assert!(lines[1].contains("app-original.js"));
}

#[tokio::test]
async fn missing_artifacts_fetch_once_per_record() {
    let symbolicator = counting_symbolicator();
    let processor = processor(symbolicator.clone());

    let stack = (0..10)
        .map(|i| format!("    at func{i} (https://example.com/gone.js:1:{i})"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut attributes = Attributes::new();
    attributes.insert("exception.stacktrace", format!("Error: gone\n{stack}"));

    assert!(
        processor
            .process_record(&mut attributes, &Attributes::new())
            .await
    );

    // All ten frames share the missing artifact - the per-record memo stops
    // the symbolicator from being consulted more than once.
    assert_eq!(symbolicator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        attributes.get_bool("exception.symbolicator.failed"),
        Some(true)
    );
    assert_eq!(
        attributes.get_str("exception.symbolicator.error"),
        Some("symbolication failed for some stack frames")
    );
}

#[tokio::test]
async fn pipeline_visits_spans_exception_events_and_logs() {
    let symbolicator = counting_symbolicator();
    let pipeline = Pipeline::new(processor(symbolicator));

    let stack = "Error: test\n    at funcA (http://example.com/bundle.js:1:34)";

    let mut with_stack = Attributes::new();
    with_stack.insert("exception.stacktrace", stack);

    let mut batch = vec![ResourceSpans {
        resource: Attributes::new(),
        spans: vec![Span {
            name: "request".to_string(),
            attributes: Attributes::new(),
            events: vec![
                SpanEvent {
                    name: "exception".to_string(),
                    attributes: with_stack.clone(),
                },
                SpanEvent {
                    name: "checkpoint".to_string(),
                    attributes: with_stack.clone(),
                },
            ],
        }],
    }];
    pipeline.process_traces(&mut batch).await;

    let events = &batch[0].spans[0].events;
    // The exception event was rewritten, the other event untouched.
    assert!(events[0]
        .attributes
        .get_str("exception.stacktrace")
        .unwrap()
        .contains("app-original.js"));
    assert_eq!(
        events[1].attributes.get_str("exception.stacktrace"),
        Some(stack)
    );

    let mut logs = vec![ResourceLogs {
        resource: Attributes::new(),
        records: vec![
            LogRecord {
                attributes: with_stack.clone(),
            },
            LogRecord {
                attributes: Attributes::new(),
            },
        ],
    }];
    pipeline.process_logs(&mut logs).await;

    assert!(logs[0].records[0]
        .attributes
        .get_str("exception.stacktrace")
        .unwrap()
        .contains("app-original.js"));
    assert!(logs[0].records[1].attributes.is_empty());
}
