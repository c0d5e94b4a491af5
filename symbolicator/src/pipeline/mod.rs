use std::time::Instant;

use async_trait::async_trait;

use crate::metric_consts::BATCH_SYMBOLICATION_TIME;
use crate::types::{Attributes, ResourceLogs, ResourceSpans};

pub mod java;
pub mod js;

pub const PARSING_METHOD_PROCESSOR: &str = "processor_parsed";
pub const PARSING_METHOD_STRUCTURED: &str = "structured_stacktrace_attributes";
pub const PARTIAL_FAILURE_MESSAGE: &str = "symbolication failed for some stack frames";

// OTel semantic convention - exceptions on spans live in events with this name.
const EXCEPTION_EVENT_NAME: &str = "exception";

#[async_trait]
pub trait RecordProcessor: Send + Sync {
    // Returns true when the record was actually processed - records without a
    // stack trace, or filtered out by language, pass through untouched and
    // report false.
    async fn process_record(&self, attributes: &mut Attributes, resource: &Attributes) -> bool;
}

// Drives a processor over a batch. Mutation is in place; records are never
// dropped or reordered, whatever happens inside the processor.
pub struct Pipeline<P> {
    processor: P,
}

impl<P: RecordProcessor> Pipeline<P> {
    pub fn new(processor: P) -> Self {
        Self { processor }
    }

    pub async fn process_traces(&self, batch: &mut [ResourceSpans]) {
        let start = Instant::now();
        let mut processed = 0usize;
        for resource_spans in batch.iter_mut() {
            for span in resource_spans.spans.iter_mut() {
                if self
                    .processor
                    .process_record(&mut span.attributes, &resource_spans.resource)
                    .await
                {
                    processed += 1;
                }
                for event in span.events.iter_mut() {
                    if event.name == EXCEPTION_EVENT_NAME
                        && self
                            .processor
                            .process_record(&mut event.attributes, &resource_spans.resource)
                            .await
                    {
                        processed += 1;
                    }
                }
            }
        }
        record_batch_duration(start, processed);
    }

    pub async fn process_logs(&self, batch: &mut [ResourceLogs]) {
        let start = Instant::now();
        let mut processed = 0usize;
        for resource_logs in batch.iter_mut() {
            for record in resource_logs.records.iter_mut() {
                if self
                    .processor
                    .process_record(&mut record.attributes, &resource_logs.resource)
                    .await
                {
                    processed += 1;
                }
            }
        }
        record_batch_duration(start, processed);
    }
}

// Batches where nothing carried a stack trace don't pollute the histogram.
fn record_batch_duration(start: Instant, processed: usize) {
    if processed > 0 {
        common_metrics::histogram(
            BATCH_SYMBOLICATION_TIME,
            &[],
            start.elapsed().as_millis() as f64,
        );
    }
}

pub(crate) fn language_allowed(
    attributes: &Attributes,
    language_key: &str,
    allowed: &[String],
) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(language) = attributes.get_str(language_key) else {
        return false;
    };
    allowed.iter().any(|a| a.eq_ignore_ascii_case(language))
}

pub(crate) fn original_key(key: &str) -> String {
    format!("{key}.original")
}
