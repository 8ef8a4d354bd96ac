// src/tags/mod.rs

//! Metadata tag vocabulary used to describe a pipeline.
//!
//! Pipeline authors annotate task groups (and, for memory overrides, tasks)
//! with `nomad-pipeline/*` meta keys. Every recognized key is a variant of
//! [`Tag`]; values are expanded against the process environment before they
//! are parsed (see [`expand`]).
//!
//! Missing tags read as the zero value (`false`, `0`, `""`). A tag that is
//! present but malformed is a [`PipelineError::TagParse`].

pub mod expand;

use std::fmt;
use std::str::FromStr;

use crate::errors::{PipelineError, Result};
use crate::nomad::Meta;

pub use expand::{expand_env, expand_with};

/// Prefix shared by every pipeline tag.
pub const TAG_PREFIX: &str = "nomad-pipeline/";

/// Closed set of recognized pipeline tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// `bool`: stage is an entry point of the pipeline.
    Root,
    /// Comma list: stages activated once this stage succeeds.
    Next,
    /// Comma list: stages that must succeed before this stage's tasks start.
    Dependencies,
    /// `int`: replica fan-out used when the stage is activated.
    Count,
    /// Glob (relative to the alloc dir) of dynamic stage definition files.
    DynamicTasks,
    /// `int`: per-task memory override, read from task meta.
    DynamicMemoryMb,
    /// `bool`: finishing this stage terminates the whole pipeline.
    Leader,
    /// Internal back-reference from a dynamic stage to the stage that
    /// discovered it. Never set by pipeline authors.
    ParentTask,
}

impl Tag {
    pub const ALL: [Tag; 8] = [
        Tag::Root,
        Tag::Next,
        Tag::Dependencies,
        Tag::Count,
        Tag::DynamicTasks,
        Tag::DynamicMemoryMb,
        Tag::Leader,
        Tag::ParentTask,
    ];

    /// Full meta key for this tag.
    pub const fn key(self) -> &'static str {
        match self {
            Tag::Root => "nomad-pipeline/root",
            Tag::Next => "nomad-pipeline/next",
            Tag::Dependencies => "nomad-pipeline/dependencies",
            Tag::Count => "nomad-pipeline/count",
            Tag::DynamicTasks => "nomad-pipeline/dynamic-tasks",
            Tag::DynamicMemoryMb => "nomad-pipeline/dynamic-memory-mb",
            Tag::Leader => "nomad-pipeline/leader",
            Tag::ParentTask => "nomad-pipeline/_parent-task",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Tag {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.key() == s)
            .ok_or_else(|| PipelineError::ConfigError(format!("unrecognized pipeline tag: {s}")))
    }
}

/// Meta keys that carry the pipeline prefix but are not a known [`Tag`].
///
/// Used to warn about typos such as `nomad-pipeline/dependency`.
pub fn unrecognized_keys(meta: &Meta) -> Vec<&str> {
    meta.keys()
        .map(String::as_str)
        .filter(|k| k.starts_with(TAG_PREFIX) && k.parse::<Tag>().is_err())
        .collect()
}

/// Raw, env-expanded value of `tag`, if present.
pub fn lookup_raw(meta: &Meta, tag: Tag) -> Option<String> {
    meta.get(tag.key()).map(|v| expand_env(v))
}

/// Read a string tag. Missing tags yield `""`.
pub fn lookup_str(meta: &Meta, tag: Tag) -> String {
    lookup_raw(meta, tag).unwrap_or_default()
}

/// Read a boolean tag. Missing tags yield `false`.
pub fn lookup_bool(meta: &Meta, tag: Tag) -> Result<bool> {
    match lookup_raw(meta, tag) {
        Some(value) => parse_bool(tag, &value),
        None => Ok(false),
    }
}

/// Read an integer tag. Missing tags yield `0`.
pub fn lookup_int(meta: &Meta, tag: Tag) -> Result<i64> {
    match lookup_raw(meta, tag) {
        Some(value) => parse_int(tag, &value),
        None => Ok(0),
    }
}

/// Parse an already expanded boolean value.
///
/// Accepts the usual spellings: `1 t T TRUE true True` and
/// `0 f F FALSE false False`.
pub fn parse_bool(tag: Tag, value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(PipelineError::TagParse {
            tag: tag.key().to_string(),
            value: value.to_string(),
            expected: "a bool",
        }),
    }
}

/// Parse an already expanded integer value.
pub fn parse_int(tag: Tag, value: &str) -> Result<i64> {
    value.parse::<i64>().map_err(|_| PipelineError::TagParse {
        tag: tag.key().to_string(),
        value: value.to_string(),
        expected: "an int",
    })
}

/// Split a comma separated list, trimming whitespace around each element.
///
/// An empty input yields a single empty element; callers treat a list whose
/// elements are all empty as "no entries".
pub fn split(csv: &str) -> Vec<String> {
    csv.split(',').map(|part| part.trim().to_string()).collect()
}

/// Split a list tag, returning an empty list when the tag is missing or blank.
pub fn lookup_list(meta: &Meta, tag: Tag) -> Vec<String> {
    let value = lookup_str(meta, tag);
    if value.is_empty() {
        return Vec::new();
    }
    let parts = split(&value);
    if parts.iter().all(String::is_empty) {
        return Vec::new();
    }
    parts
}
