//! Params agent implementation.

use crate::config::ParamsConfig;
use crate::context::RequestContext;
use crate::rule::ParamRule;
use crate::transformer::{self, TransformError, WorkingSet};
use tracing::{debug, info, trace, warn};

/// Status sent back when a request is rejected.
pub const REJECT_STATUS: u16 = 400;

/// Params Agent for Zentinel.
///
/// Moves request parameters between headers, query string and body
/// according to the configured mappings. The agent is immutable once built
/// and can serve any number of requests concurrently.
#[derive(Debug, Clone)]
pub struct ParamsAgent {
    /// Configuration; `None` lets every request through untouched
    config: Option<ParamsConfig>,
    /// Compiled mappings, in declaration order
    rules: Vec<ParamRule>,
}

impl ParamsAgent {
    /// Create a new params agent from configuration.
    pub fn new(config: ParamsConfig) -> Self {
        let rules: Vec<ParamRule> = config.params.iter().map(ParamRule::compile).collect();

        info!(
            mappings = rules.len(),
            remove_after_transformed = config.remove_after_transformed,
            "Params agent initialized"
        );

        Self {
            config: Some(config),
            rules,
        }
    }

    /// An agent without configuration, which forwards requests unchanged.
    pub fn passthrough() -> Self {
        Self {
            config: None,
            rules: Vec::new(),
        }
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, AgentError> {
        if json.trim().is_empty() {
            return Err(AgentError::EmptyConfig);
        }
        let config: ParamsConfig = serde_json::from_str(json)?;
        Ok(Self::new(config))
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, AgentError> {
        if yaml.trim().is_empty() {
            return Err(AgentError::EmptyConfig);
        }
        let config: ParamsConfig = serde_yaml::from_str(yaml)?;
        Ok(Self::new(config))
    }

    /// Agent configuration, if any.
    pub fn config(&self) -> Option<&ParamsConfig> {
        self.config.as_ref()
    }

    /// Compiled mappings.
    pub fn rules(&self) -> &[ParamRule] {
        &self.rules
    }

    /// Apply all mappings to a request before it is forwarded.
    ///
    /// `Ok(())` means the request may proceed. On error the response status
    /// is set to 400 with the error message as body, and the request must not
    /// be forwarded. Changes made to the outgoing request before the failing
    /// mapping are not undone.
    pub fn access(&self, ctx: &mut dyn RequestContext) -> Result<(), TransformError> {
        let result = self.apply(ctx);

        if let Err(e) = &result {
            warn!(error = %e, "Rejecting request");
            ctx.set_status(REJECT_STATUS);
            ctx.set_body(e.to_string().into_bytes());
        }

        result
    }

    fn apply(&self, ctx: &mut dyn RequestContext) -> Result<(), TransformError> {
        let Some(config) = &self.config else {
            return Ok(());
        };

        let mut ws = WorkingSet::from_request(ctx)?;
        trace!(family = %ws.family, "Parsed request body");

        for rule in &self.rules {
            let source = rule.source()?;

            let Some(value) = transformer::extract(rule, source, &ws) else {
                if rule.required {
                    return Err(TransformError::MissingParam {
                        name: rule.source_name.clone(),
                    });
                }
                debug!(
                    param = %rule.source_name,
                    position = %source,
                    "Optional parameter missing, skipping"
                );
                continue;
            };

            if config.remove_after_transformed {
                transformer::remove_source(rule, source, &mut ws, ctx.proxy());
            }

            let target = rule.target()?;
            let value = transformer::project(value, rule, target, ws.family)?;
            let kind = value.kind();
            transformer::write(rule, target, value, &mut ws, ctx.proxy())?;

            debug!(
                param = %rule.source_name,
                from = %source,
                to = %target,
                target_name = %rule.target_name,
                kind,
                "Applied parameter mapping"
            );
        }

        ws.finalize(ctx.proxy());
        Ok(())
    }
}

/// Errors building a params agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration is empty")]
    EmptyConfig,

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
