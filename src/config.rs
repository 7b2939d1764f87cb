//! Configuration types for the params agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Main configuration for the params agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsConfig {
    /// Parameter mappings, applied in declaration order
    #[serde(default)]
    pub params: Vec<ParamMapping>,
    /// Delete each source parameter once it has been read
    #[serde(default)]
    pub remove_after_transformed: bool,
}

/// A single parameter mapping.
///
/// Positions are kept as written so that a bad value surfaces as a request
/// rejection for that mapping instead of making the whole config unusable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamMapping {
    /// Source parameter name
    pub param_name: String,
    /// Source position: header, query or body
    pub param_position: String,
    /// Target parameter name
    pub proxy_param_name: String,
    /// Target position: header, query or body
    pub proxy_param_position: String,
    /// Reject the request if the source is missing
    #[serde(default)]
    pub required: bool,
    /// What to do when the target already holds a value
    #[serde(default)]
    pub param_conflict_solution: String,
}

/// Where a parameter lives in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Header,
    Query,
    Body,
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header" => Ok(Position::Header),
            "query" => Ok(Position::Query),
            "body" => Ok(Position::Body),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Position::Header => "header",
            Position::Query => "query",
            Position::Body => "body",
        };
        f.write_str(name)
    }
}

/// Write policy when the target already holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictSolution {
    /// First write sets, later writes append (JSON keys are overwritten)
    #[default]
    Merge,
    /// Replace whatever the target holds (`convert`)
    Overwrite,
    /// Leave an existing target untouched (`origin`)
    KeepOrigin,
    /// Reject the request (`error`)
    Error,
}

impl ConflictSolution {
    /// Parse a configured policy. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" | "merge" => Some(ConflictSolution::Merge),
            "convert" => Some(ConflictSolution::Overwrite),
            "origin" => Some(ConflictSolution::KeepOrigin),
            "error" => Some(ConflictSolution::Error),
            _ => None,
        }
    }
}
