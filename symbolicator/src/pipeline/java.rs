use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ProcessError, SymbolicationError};
use crate::langs::java::{JavaFrame, SymbolicateJava, LINE_NATIVE_METHOD, LINE_UNKNOWN_SOURCE};
use crate::metric_consts::{
    FRAMES_FAILED, FRAMES_PROCESSED, RAW_STACKS_PARSED, RECORDS_FAILED, RECORDS_PROCESSED,
};
use crate::parsing::java::{parse_java_stack, JavaStackElement, ParsedJavaFrame};
use crate::types::Attributes;

use super::{
    language_allowed, original_key, RecordProcessor, PARSING_METHOD_PROCESSOR,
    PARSING_METHOD_STRUCTURED, PARTIAL_FAILURE_MESSAGE,
};

pub const PROCESSOR_TYPE_PROGUARD: &str = "proguard";
const PROCESSOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
struct JavaAttributeKeys {
    stack_trace: String,
    language: String,
    exception_type: String,
    exception_message: String,
    classes: String,
    methods: String,
    lines: String,
    source_files: String,
    proguard_uuid: String,
    failed: String,
    error: String,
    parsing_method: String,
    processor_type: String,
    processor_version: String,
}

impl JavaAttributeKeys {
    fn from_config(config: &Config) -> Self {
        Self {
            stack_trace: config.stack_trace_attribute.clone(),
            language: config.language_attribute.clone(),
            exception_type: config.exception_type_attribute.clone(),
            exception_message: config.exception_message_attribute.clone(),
            classes: config.classes_attribute.clone(),
            methods: config.methods_attribute.clone(),
            lines: config.lines_attribute.clone(),
            source_files: config.source_files_attribute.clone(),
            proguard_uuid: config.proguard_uuid_attribute.clone(),
            failed: config.symbolicator_failed_attribute.clone(),
            error: config.symbolicator_error_attribute.clone(),
            parsing_method: config.parsing_method_attribute.clone(),
            processor_type: config.processor_type_attribute.clone(),
            processor_version: config.processor_version_attribute.clone(),
        }
    }
}

struct Extracted {
    elements: Vec<JavaStackElement>,
    method: &'static str,
    structured: bool,
}

// Retraces proguard/R8-obfuscated java stacks. The shape mirrors the
// sourcemap processor; the differences are the frame model, the sentinel
// lines, and cause-chain raw elements from the fallback parser.
pub struct ProguardProcessor {
    keys: JavaAttributeKeys,
    symbolicator: Arc<dyn SymbolicateJava>,
    preserve_stack_trace: bool,
    allowed_languages: Vec<String>,
}

impl ProguardProcessor {
    pub fn new(config: &Config, symbolicator: Arc<dyn SymbolicateJava>) -> Self {
        Self {
            keys: JavaAttributeKeys::from_config(config),
            symbolicator,
            preserve_stack_trace: config.preserve_stack_trace,
            allowed_languages: config.allowed_languages(),
        }
    }

    fn extract(&self, attributes: &Attributes) -> Result<Extracted, ProcessError> {
        if let Some(elements) = self.extract_structured(attributes)? {
            return Ok(Extracted {
                elements,
                method: PARSING_METHOD_STRUCTURED,
                structured: true,
            });
        }

        let Some(raw) = attributes.get_str(&self.keys.stack_trace) else {
            return Err(ProcessError::MissingAttribute(self.keys.stack_trace.clone()));
        };
        let parsed = parse_java_stack(raw).inspect_err(|_| {
            metrics::counter!(RAW_STACKS_PARSED, "mode" => "failed").increment(1);
        })?;
        metrics::counter!(RAW_STACKS_PARSED, "mode" => "java").increment(1);
        Ok(Extracted {
            elements: parsed.elements,
            method: PARSING_METHOD_PROCESSOR,
            structured: false,
        })
    }

    fn extract_structured(
        &self,
        attributes: &Attributes,
    ) -> Result<Option<Vec<JavaStackElement>>, ProcessError> {
        let (Some(classes), Some(methods), Some(lines), Some(source_files)) = (
            attributes.get_str_array(&self.keys.classes),
            attributes.get_str_array(&self.keys.methods),
            attributes.get_int_array(&self.keys.lines),
            attributes.get_str_array(&self.keys.source_files),
        ) else {
            return Ok(None);
        };

        if classes.len() != methods.len()
            || classes.len() != lines.len()
            || classes.len() != source_files.len()
        {
            return Err(ProcessError::MismatchedLength(format!(
                "classes={} methods={} lines={} source_files={}",
                classes.len(),
                methods.len(),
                lines.len(),
                source_files.len()
            )));
        }

        Ok(Some(
            (0..classes.len())
                .map(|i| {
                    JavaStackElement::Frame(ParsedJavaFrame {
                        class: classes[i].clone(),
                        method: methods[i].clone(),
                        source_file: source_files[i].clone(),
                        line: lines[i],
                    })
                })
                .collect(),
        ))
    }

    fn preserve_originals(&self, attributes: &mut Attributes) {
        let keys = [
            &self.keys.stack_trace,
            &self.keys.classes,
            &self.keys.methods,
            &self.keys.lines,
            &self.keys.source_files,
        ];
        for key in keys {
            if let Some(value) = attributes.get(key).cloned() {
                attributes.insert(original_key(key), value);
            }
        }
    }

    fn fail_record(&self, attributes: &mut Attributes, err: ProcessError) {
        metrics::counter!(RECORDS_FAILED, "processor" => PROCESSOR_TYPE_PROGUARD).increment(1);
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
impl RecordProcessor for ProguardProcessor {
    async fn process_record(&self, attributes: &mut Attributes, _resource: &Attributes) -> bool {
        if !attributes.contains_key(&self.keys.stack_trace) {
            return false;
        }
        if !language_allowed(attributes, &self.keys.language, &self.allowed_languages) {
            return false;
        }

        metrics::counter!(RECORDS_PROCESSED, "processor" => PROCESSOR_TYPE_PROGUARD).increment(1);
        attributes.insert(self.keys.processor_type.clone(), PROCESSOR_TYPE_PROGUARD);
        attributes.insert(self.keys.processor_version.clone(), PROCESSOR_VERSION);

        // The mapping uuid travels on the record itself, stamped by the SDK.
        let Some(uuid) = attributes
            .get_str(&self.keys.proguard_uuid)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
        else {
            self.fail_record(
                attributes,
                ProcessError::MissingAttribute(self.keys.proguard_uuid.clone()),
            );
            return true;
        };

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
            (Some(t), Some(m)) => Some((t.to_string(), m.to_string())),
            _ => None,
        };

        let mut out_lines: Vec<String> = Vec::new();
        let mut rewritten = StructuredSlices::default();
        let mut memo: HashMap<String, SymbolicationError> = HashMap::new();
        let mut failed = false;
        let mut mapper_loaded = false;

        for element in &extracted.elements {
            let frame = match element {
                JavaStackElement::Raw(line) => {
                    out_lines.push(line.clone());
                    continue;
                }
                JavaStackElement::Frame(frame) => frame,
            };
            metrics::counter!(FRAMES_PROCESSED, "processor" => PROCESSOR_TYPE_PROGUARD)
                .increment(1);

            // Sentinel lines bypass symbolication entirely.
            if frame.line == LINE_UNKNOWN_SOURCE || frame.line == LINE_NATIVE_METHOD {
                out_lines.push(passthrough_line(frame));
                rewritten.push_original(frame);
                continue;
            }

            let input = JavaFrame {
                class: frame.class.clone(),
                method: frame.method.clone(),
                line: frame.line,
                source_file: frame.source_file.clone(),
                uuid: uuid.clone(),
            };
            let key = input.artifact_key();

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
                Ok(mapped) if !mapped.is_empty() => {
                    mapper_loaded = true;
                    for m in &mapped {
                        out_lines.push(format!("\tat {}({}:{})", m.name, m.source, m.line));
                        rewritten.push_mapped(&m.name, &m.source, m.line);
                    }
                }
                Ok(_) => {
                    // The mapping has no entry for this frame, which the
                    // library signals as "no remapping needed".
                    mapper_loaded = true;
                    out_lines.push(passthrough_line(frame));
                    rewritten.push_original(frame);
                }
                Err(err) => {
                    failed = true;
                    metrics::counter!(FRAMES_FAILED, "processor" => PROCESSOR_TYPE_PROGUARD)
                        .increment(1);
                    out_lines.push(format!(
                        "\tFailed to symbolicate {}.{}({}): {}",
                        frame.class, frame.method, frame.line, err
                    ));
                    rewritten.push_original(frame);
                }
            }
        }

        if let Some((exception_type, message)) = header {
            // Exception classes are obfuscated too. The remap runs only when
            // this record's own loop got a mapper result back - then it's a
            // cache hit - so a header never triggers a fetch by itself.
            // Failures leave the header as-is.
            let display_type = if mapper_loaded {
                self.symbolicator
                    .remap_class(&uuid, &exception_type)
                    .await
                    .unwrap_or(exception_type)
            } else {
                exception_type
            };
            out_lines.insert(0, format!("{display_type}: {message}"));
        }

        attributes.insert(self.keys.stack_trace.clone(), out_lines.join("\n"));
        if extracted.structured {
            attributes.insert(self.keys.classes.clone(), rewritten.classes);
            attributes.insert(self.keys.methods.clone(), rewritten.methods);
            attributes.insert(self.keys.lines.clone(), rewritten.lines);
            attributes.insert(self.keys.source_files.clone(), rewritten.source_files);
        }
        attributes.insert(self.keys.failed.clone(), failed);
        if failed {
            metrics::counter!(RECORDS_FAILED, "processor" => PROCESSOR_TYPE_PROGUARD)
                .increment(1);
            attributes.insert(self.keys.error.clone(), PARTIAL_FAILURE_MESSAGE);
        }
        true
    }
}

// Sentinels are textualized only here, at the output boundary.
fn passthrough_line(frame: &ParsedJavaFrame) -> String {
    match frame.line {
        LINE_NATIVE_METHOD => format!("\tat {}.{}(Native Method)", frame.class, frame.method),
        LINE_UNKNOWN_SOURCE => format!("\tat {}.{}(Unknown Source)", frame.class, frame.method),
        line => format!(
            "\tat {}.{}({}:{})",
            frame.class, frame.method, frame.source_file, line
        ),
    }
}

#[derive(Default)]
struct StructuredSlices {
    classes: Vec<String>,
    methods: Vec<String>,
    lines: Vec<i64>,
    source_files: Vec<String>,
}

impl StructuredSlices {
    fn push_mapped(&mut self, name: &str, source: &str, line: i64) {
        let (class, method) = name.rsplit_once('.').unwrap_or((name, ""));
        self.classes.push(class.to_string());
        self.methods.push(method.to_string());
        self.lines.push(line);
        self.source_files.push(source.to_string());
    }

    fn push_original(&mut self, frame: &ParsedJavaFrame) {
        self.classes.push(frame.class.clone());
        self.methods.push(frame.method.clone());
        self.lines.push(frame.line);
        self.source_files.push(frame.source_file.clone());
    }
}
