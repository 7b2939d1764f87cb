//! Compiled parameter mappings.

use crate::config::{ConflictSolution, ParamMapping, Position};
use crate::transformer::TransformError;
use tracing::warn;

/// A parameter mapping ready to run against requests.
#[derive(Debug, Clone)]
pub struct ParamRule {
    /// Source parameter name, as configured
    pub source_name: String,
    /// Source position, or the unrecognized configured value
    source: Result<Position, String>,
    /// Target parameter name, as configured
    pub target_name: String,
    /// Target position, or the unrecognized configured value
    target: Result<Position, String>,
    /// Reject requests missing the source
    pub required: bool,
    /// Write policy for occupied targets
    pub conflict: ConflictSolution,
}

impl ParamRule {
    /// Compile a mapping from configuration.
    ///
    /// Unknown positions are kept and reported on every request that reaches
    /// this rule; unknown conflict policies fall back to merging.
    pub fn compile(mapping: &ParamMapping) -> Self {
        let source = mapping.param_position.parse::<Position>();
        let target = mapping.proxy_param_position.parse::<Position>();

        if let Err(value) = &source {
            warn!(
                param = %mapping.param_name,
                position = %value,
                "Illegal paramPosition, requests reaching this mapping will be rejected"
            );
        }
        if let Err(value) = &target {
            warn!(
                param = %mapping.param_name,
                position = %value,
                "Illegal proxyParamPosition, requests reaching this mapping will be rejected"
            );
        }

        let conflict = ConflictSolution::parse(&mapping.param_conflict_solution)
            .unwrap_or_else(|| {
                warn!(
                    param = %mapping.param_name,
                    solution = %mapping.param_conflict_solution,
                    "Unknown paramConflictSolution, falling back to merge"
                );
                ConflictSolution::Merge
            });

        Self {
            source_name: mapping.param_name.clone(),
            source,
            target_name: mapping.proxy_param_name.clone(),
            target,
            required: mapping.required,
            conflict,
        }
    }

    /// Position to read from.
    pub fn source(&self) -> Result<Position, TransformError> {
        self.source
            .clone()
            .map_err(|value| self.illegal("paramPosition", value))
    }

    /// Position to write to.
    pub fn target(&self) -> Result<Position, TransformError> {
        self.target
            .clone()
            .map_err(|value| self.illegal("proxyParamPosition", value))
    }

    fn illegal(&self, field: &'static str, value: String) -> TransformError {
        TransformError::IllegalPosition {
            name: self.source_name.clone(),
            field,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(source: &str, target: &str, solution: &str) -> ParamMapping {
        ParamMapping {
            param_name: "id".to_string(),
            param_position: source.to_string(),
            proxy_param_name: "X-Id".to_string(),
            proxy_param_position: target.to_string(),
            required: true,
            param_conflict_solution: solution.to_string(),
        }
    }

    #[test]
    fn test_compile_valid_mapping() {
        let rule = ParamRule::compile(&mapping("query", "header", "error"));
        assert_eq!(rule.source().unwrap(), Position::Query);
        assert_eq!(rule.target().unwrap(), Position::Header);
        assert_eq!(rule.conflict, ConflictSolution::Error);
        assert!(rule.required);
    }

    #[test]
    fn test_illegal_positions_are_deferred() {
        let rule = ParamRule::compile(&mapping("cookie", "path", ""));

        let err = rule.source().unwrap_err();
        assert_eq!(err.to_string(), "illegal paramPosition 'cookie' in parameter 'id'");

        let err = rule.target().unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal proxyParamPosition 'path' in parameter 'id'"
        );
    }

    #[test]
    fn test_unknown_conflict_solution_merges() {
        let rule = ParamRule::compile(&mapping("query", "header", "append-please"));
        assert_eq!(rule.conflict, ConflictSolution::Merge);
    }
}
