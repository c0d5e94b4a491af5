pub const FRAMES_PROCESSED: &str = "symbolicator_frames_processed";
pub const FRAMES_FAILED: &str = "symbolicator_frames_failed";
pub const FETCH_FAILURES: &str = "symbolicator_fetch_failures";
pub const MAPPER_CACHE_SIZE: &str = "symbolicator_mapper_cache_size";
pub const MAPPER_CACHE_HITS: &str = "symbolicator_mapper_cache_hits";
pub const MAPPER_CACHE_MISSES: &str = "symbolicator_mapper_cache_misses";
pub const NEGATIVE_CACHE_HITS: &str = "symbolicator_negative_cache_hits";
pub const GATE_TIMEOUTS: &str = "symbolicator_gate_timeouts";
pub const STORE_FETCH_TIME: &str = "symbolicator_store_fetch_time";
pub const SOURCEMAP_FETCH_TIME: &str = "symbolicator_sourcemap_fetch_time";
pub const SOURCEMAP_DIRECTIVE_FOUND: &str = "symbolicator_sourcemap_directive_found";
pub const PROGUARD_FETCH_TIME: &str = "symbolicator_proguard_fetch_time";
pub const MAPPER_PARSE_TIME: &str = "symbolicator_mapper_parse_time";
pub const RECORDS_PROCESSED: &str = "symbolicator_records_processed";
pub const RECORDS_FAILED: &str = "symbolicator_records_failed";
pub const RAW_STACKS_PARSED: &str = "symbolicator_raw_stacks_parsed";
pub const BATCH_SYMBOLICATION_TIME: &str = "symbolicator_batch_symbolication_time";
