//! Run requests.
//!
//! A request is structured data validated against a JSON Schema, then checked
//! semantically. Problems that make the whole run impossible are
//! [`RequestError`]s; problems that only make one step unrunnable are
//! [`ConfigError`]s and cause that step to be skipped.

mod parser;
mod schema;

pub use parser::{
    ConfigError, PipelineConfig, RequestError, RunRequest, StepToggles, DEFAULT_FOCUS_AREAS,
    SCENARIO_COUNT_RANGE,
};
pub use schema::{validate_request_schema, SchemaError};
