use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    // Which object storage backend debug artifacts are fetched from. One of
    // "file_store", "s3_store" or "gcs_store".
    #[envconfig(default = "file_store")]
    pub store_backend: String,

    // Key prefix applied to every artifact key, for all backends.
    #[envconfig(default = "")]
    pub store_prefix: String,

    #[envconfig(default = ".")]
    pub file_store_directory: String,

    #[envconfig(default = "")]
    pub s3_bucket: String,

    // Optional - when empty the region comes from the environment.
    #[envconfig(default = "")]
    pub s3_region: String,

    #[envconfig(default = "")]
    pub gcs_bucket: String,

    // Entry counts, not bytes. The negative cache is sized to match.
    #[envconfig(default = "128")]
    pub mapper_cache_size: u64,

    // How long a symbolication operation may wait for the single-flight gate
    // before it fails the frame with a fetch-classified timeout.
    #[envconfig(default = "5")]
    pub symbolication_timeout_seconds: u64,

    #[envconfig(default = "true")]
    pub preserve_stack_trace: bool,

    // Comma-separated. Empty means all languages are allowed.
    #[envconfig(default = "")]
    pub allowed_languages: String,

    #[envconfig(default = "telemetry.sdk.language")]
    pub language_attribute: String,

    #[envconfig(default = "exception.stacktrace")]
    pub stack_trace_attribute: String,

    #[envconfig(default = "exception.type")]
    pub exception_type_attribute: String,

    #[envconfig(default = "exception.message")]
    pub exception_message_attribute: String,

    #[envconfig(default = "exception.symbolicator.failed")]
    pub symbolicator_failed_attribute: String,

    #[envconfig(default = "exception.symbolicator.error")]
    pub symbolicator_error_attribute: String,

    #[envconfig(default = "exception.symbolicator.parsing_method")]
    pub parsing_method_attribute: String,

    #[envconfig(default = "exception.symbolicator.type")]
    pub processor_type_attribute: String,

    #[envconfig(default = "exception.symbolicator.version")]
    pub processor_version_attribute: String,

    #[envconfig(default = "exception.structured_stacktrace.lines")]
    pub lines_attribute: String,

    #[envconfig(default = "exception.structured_stacktrace.columns")]
    pub columns_attribute: String,

    #[envconfig(default = "exception.structured_stacktrace.functions")]
    pub functions_attribute: String,

    #[envconfig(default = "exception.structured_stacktrace.urls")]
    pub urls_attribute: String,

    // Read from resource attributes, not record attributes.
    #[envconfig(default = "app.debug.build_uuid")]
    pub build_uuid_attribute: String,

    #[envconfig(default = "exception.structured_stacktrace.classes")]
    pub classes_attribute: String,

    #[envconfig(default = "exception.structured_stacktrace.methods")]
    pub methods_attribute: String,

    #[envconfig(default = "exception.structured_stacktrace.source_files")]
    pub source_files_attribute: String,

    #[envconfig(default = "app.debug.proguard_uuid")]
    pub proguard_uuid_attribute: String,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }

    pub fn symbolication_timeout(&self) -> Duration {
        Duration::from_secs(self.symbolication_timeout_seconds)
    }

    pub fn allowed_languages(&self) -> Vec<String> {
        self.allowed_languages
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    S3,
    Gcs,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_store" => Ok(StoreBackend::File),
            "s3_store" => Ok(StoreBackend::S3),
            "gcs_store" => Ok(StoreBackend::Gcs),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}
