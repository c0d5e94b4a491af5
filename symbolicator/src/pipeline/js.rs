use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ProcessError, StackParseError, SymbolicationError};
use crate::langs::js::{JsFrame, SymbolicateJs};
use crate::metric_consts::{
    FRAMES_FAILED, FRAMES_PROCESSED, RAW_STACKS_PARSED, RECORDS_FAILED, RECORDS_PROCESSED,
};
use crate::parsing::js::{parse_js_stack, ParsedJsFrame};
use crate::types::Attributes;

use super::{
    language_allowed, original_key, RecordProcessor, PARSING_METHOD_PROCESSOR,
    PARSING_METHOD_STRUCTURED, PARTIAL_FAILURE_MESSAGE,
};

pub const PROCESSOR_TYPE_SOURCEMAP: &str = "sourcemap";
const PROCESSOR_VERSION: &str = env!("CARGO_PKG_VERSION");

// The url the raw parser leaves on V8 native frames.
const NATIVE_URL: &str = "native";

#[derive(Clone)]
struct JsAttributeKeys {
    stack_trace: String,
    language: String,
    exception_type: String,
    exception_message: String,
    lines: String,
    columns: String,
    functions: String,
    urls: String,
    build_uuid: String,
    failed: String,
    error: String,
    parsing_method: String,
    processor_type: String,
    processor_version: String,
}

impl JsAttributeKeys {
    fn from_config(config: &Config) -> Self {
        Self {
            stack_trace: config.stack_trace_attribute.clone(),
            language: config.language_attribute.clone(),
            exception_type: config.exception_type_attribute.clone(),
            exception_message: config.exception_message_attribute.clone(),
            lines: config.lines_attribute.clone(),
            columns: config.columns_attribute.clone(),
            functions: config.functions_attribute.clone(),
            urls: config.urls_attribute.clone(),
            build_uuid: config.build_uuid_attribute.clone(),
            failed: config.symbolicator_failed_attribute.clone(),
            error: config.symbolicator_error_attribute.clone(),
            parsing_method: config.parsing_method_attribute.clone(),
            processor_type: config.processor_type_attribute.clone(),
            processor_version: config.processor_version_attribute.clone(),
        }
    }
}

struct Extracted {
    frames: Vec<ParsedJsFrame>,
    method: &'static str,
    structured: bool,
}

// Rewrites minified JS stacks using source maps. One instance is shared across
// all of the host's workers; per-record state lives on the stack of
// process_record.
pub struct SourceMapProcessor {
    keys: JsAttributeKeys,
    symbolicator: Arc<dyn SymbolicateJs>,
    preserve_stack_trace: bool,
    allowed_languages: Vec<String>,
}

impl SourceMapProcessor {
    pub fn new(config: &Config, symbolicator: Arc<dyn SymbolicateJs>) -> Self {
        Self {
            keys: JsAttributeKeys::from_config(config),
            symbolicator,
            preserve_stack_trace: config.preserve_stack_trace,
            allowed_languages: config.allowed_languages(),
        }
    }

    fn extract(&self, attributes: &Attributes) -> Result<Extracted, ProcessError> {
        if let Some(frames) = self.extract_structured(attributes)? {
            return Ok(Extracted {
                frames,
                method: PARSING_METHOD_STRUCTURED,
                structured: true,
            });
        }

        let Some(raw) = attributes.get_str(&self.keys.stack_trace) else {
            return Err(ProcessError::MissingAttribute(self.keys.stack_trace.clone()));
        };
        let name = attributes.get_str(&self.keys.exception_type).unwrap_or("");
        let message = attributes
            .get_str(&self.keys.exception_message)
            .unwrap_or("");

        let parsed = parse_js_stack(name, message, raw);
        metrics::counter!(RAW_STACKS_PARSED, "mode" => parsed.mode.as_str()).increment(1);
        if parsed.frames.is_empty() {
            return Err(ProcessError::StackUnparseable(
                StackParseError::NoFramesParsed,
            ));
        }
        Ok(Extracted {
            frames: parsed.frames,
            method: PARSING_METHOD_PROCESSOR,
            structured: false,
        })
    }

    fn extract_structured(
        &self,
        attributes: &Attributes,
    ) -> Result<Option<Vec<ParsedJsFrame>>, ProcessError> {
        let (Some(lines), Some(columns), Some(functions), Some(urls)) = (
            attributes.get_int_array(&self.keys.lines),
            attributes.get_int_array(&self.keys.columns),
            attributes.get_str_array(&self.keys.functions),
            attributes.get_str_array(&self.keys.urls),
        ) else {
            return Ok(None);
        };

        if lines.len() != columns.len()
            || lines.len() != functions.len()
            || lines.len() != urls.len()
        {
            return Err(ProcessError::MismatchedLength(format!(
                "lines={} columns={} functions={} urls={}",
                lines.len(),
                columns.len(),
                functions.len(),
                urls.len()
            )));
        }

        Ok(Some(
            (0..lines.len())
                .map(|i| ParsedJsFrame {
                    function: functions[i].clone(),
                    url: urls[i].clone(),
                    line: Some(lines[i]),
                    column: Some(columns[i]),
                })
                .collect(),
        ))
    }

    fn preserve_originals(&self, attributes: &mut Attributes) {
        let keys = [
            &self.keys.stack_trace,
            &self.keys.lines,
            &self.keys.columns,
            &self.keys.functions,
            &self.keys.urls,
        ];
        for key in keys {
            if let Some(value) = attributes.get(key).cloned() {
                attributes.insert(original_key(key), value);
            }
        }
    }

    fn fail_record(&self, attributes: &mut Attributes, err: ProcessError) {
        metrics::counter!(RECORDS_FAILED, "processor" => PROCESSOR_TYPE_SOURCEMAP).increment(1);
        if self.preserve_stack_trace {
            if let Some(value) = attributes.get(&self.keys.stack_trace).cloned() {
                attributes.insert(original_key(&self.keys.stack_trace), value);
            }
        }
        match &err {
            ProcessError::MissingAttribute(_) | ProcessError::StackUnparseable(_) => {
                attributes.insert(self.keys.stack_trace.clone(), err.to_string());
            }
            ProcessError::MismatchedLength(_) => {}
        }
        attributes.insert(self.keys.failed.clone(), true);
        attributes.insert(self.keys.error.clone(), err.to_string());
    }
}

#[async_trait]
impl RecordProcessor for SourceMapProcessor {
    async fn process_record(&self, attributes: &mut Attributes, resource: &Attributes) -> bool {
        if !attributes.contains_key(&self.keys.stack_trace) {
            return false;
        }
        if !language_allowed(attributes, &self.keys.language, &self.allowed_languages) {
            return false;
        }

        metrics::counter!(RECORDS_PROCESSED, "processor" => PROCESSOR_TYPE_SOURCEMAP).increment(1);
        attributes.insert(self.keys.processor_type.clone(), PROCESSOR_TYPE_SOURCEMAP);
        attributes.insert(self.keys.processor_version.clone(), PROCESSOR_VERSION);

        let extracted = match self.extract(attributes) {
            Ok(extracted) => extracted,
            Err(err) => {
                self.fail_record(attributes, err);
                return true;
            }
        };
        attributes.insert(self.keys.parsing_method.clone(), extracted.method);

        if self.preserve_stack_trace {
            self.preserve_originals(attributes);
        }

        let header = match (
            attributes.get_str(&self.keys.exception_type),
            attributes.get_str(&self.keys.exception_message),
        ) {
            (Some(t), Some(m)) => Some(format!("{t}: {m}")),
            _ => None,
        };
        let build_id = resource
            .get_str(&self.keys.build_uuid)
            .unwrap_or("")
            .to_string();

        let mut out_lines: Vec<String> = Vec::new();
        if let Some(header) = header {
            out_lines.push(header);
        }

        let mut rewritten = StructuredSlices::default();
        let mut memo: HashMap<String, SymbolicationError> = HashMap::new();
        let mut failed = false;

        for frame in &extracted.frames {
            metrics::counter!(FRAMES_PROCESSED, "processor" => PROCESSOR_TYPE_SOURCEMAP)
                .increment(1);

            // Frames the parser couldn't place, and native-frame markers, have
            // nothing to look up - they pass through as-is.
            let (Some(line), Some(column)) = (frame.line, frame.column) else {
                out_lines.push(passthrough_line(frame));
                rewritten.push_original(frame);
                continue;
            };
            if frame.url.is_empty() || frame.url == NATIVE_URL {
                out_lines.push(passthrough_line(frame));
                rewritten.push_original(frame);
                continue;
            }

            let input = JsFrame {
                function: frame.function.clone(),
                url: frame.url.clone(),
                build_id: build_id.clone(),
                line,
                column,
            };
            let key = input.artifact_key();

            // Within one record, a fetch failure for an artifact is shared by
            // every frame keyed to it - the symbolicator is consulted once.
            let result = match memo.get(&key) {
                Some(err) => Err(err.clone()),
                None => {
                    let result = self.symbolicator.symbolicate(&input).await;
                    if let Err(err) = &result {
                        if err.is_fetch() {
                            memo.insert(key, err.clone());
                        }
                    }
                    result
                }
            };

            match result {
                Ok(mapped) => {
                    // Source map lookups resolve to at least one frame or fail
                    // outright; there is no "loaded but found nothing" case.
                    debug_assert!(!mapped.is_empty());
                    for m in &mapped {
                        out_lines.push(format!("    at {}({}:{}:{})", m.name, m.source, m.line, m.column));
                        rewritten.push_mapped(&m.name, &m.source, m.line, m.column);
                    }
                }
                Err(err) => {
                    failed = true;
                    metrics::counter!(FRAMES_FAILED, "processor" => PROCESSOR_TYPE_SOURCEMAP)
                        .increment(1);
                    out_lines.push(format!(
                        "    Failed to symbolicate {} at {}:{}:{}: {}",
                        frame.function, frame.url, line, column, err
                    ));
                    rewritten.push_original(frame);
                }
            }
        }

        attributes.insert(self.keys.stack_trace.clone(), out_lines.join("\n"));
        if extracted.structured {
            attributes.insert(self.keys.lines.clone(), rewritten.lines);
            attributes.insert(self.keys.columns.clone(), rewritten.columns);
            attributes.insert(self.keys.functions.clone(), rewritten.functions);
            attributes.insert(self.keys.urls.clone(), rewritten.urls);
        }
        attributes.insert(self.keys.failed.clone(), failed);
        if failed {
            metrics::counter!(RECORDS_FAILED, "processor" => PROCESSOR_TYPE_SOURCEMAP)
                .increment(1);
            attributes.insert(self.keys.error.clone(), PARTIAL_FAILURE_MESSAGE);
        }
        true
    }
}

fn passthrough_line(frame: &ParsedJsFrame) -> String {
    if frame.url == NATIVE_URL {
        return format!("    at {} (native)", frame.function);
    }
    match (frame.line, frame.column) {
        (Some(line), Some(column)) => {
            format!("    at {}({}:{}:{})", frame.function, frame.url, line, column)
        }
        _ => format!("    at {}({})", frame.function, frame.url),
    }
}

#[derive(Default)]
struct StructuredSlices {
    lines: Vec<i64>,
    columns: Vec<i64>,
    functions: Vec<String>,
    urls: Vec<String>,
}

impl StructuredSlices {
    fn push_mapped(&mut self, name: &str, source: &str, line: i64, column: i64) {
        self.functions.push(name.to_string());
        self.urls.push(source.to_string());
        self.lines.push(line);
        self.columns.push(column);
    }

    fn push_original(&mut self, frame: &ParsedJsFrame) {
        self.functions.push(frame.function.clone());
        self.urls.push(frame.url.clone());
        self.lines.push(frame.line.unwrap_or(0));
        self.columns.push(frame.column.unwrap_or(0));
    }
}
