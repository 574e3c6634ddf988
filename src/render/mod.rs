//! Markdown and JSON renderers for CLI output.

pub(crate) mod json;
pub(crate) mod markdown;
