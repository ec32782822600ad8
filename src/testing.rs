//! Shared fixtures for unit tests.

use crate::schema::Schema;

pub(crate) const SAMPLE_SCHEMA: &str = include_str!("../schema/system.toml");

pub(crate) fn p(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn sample_schema() -> Schema {
    Schema::from_toml_str(SAMPLE_SCHEMA).expect("sample schema compiles")
}
