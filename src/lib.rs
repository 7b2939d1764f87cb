//! Request Parameter Agent for Zentinel.
//!
//! This agent remaps request parameters before a request is proxied:
//!
//! - Reads values from headers, the query string or the body
//! - Understands URL-encoded form, JSON and multipart bodies
//! - Writes values to a (possibly different) header, query parameter or body field
//! - Optionally removes the source parameter once read
//! - Rejects requests missing a required parameter with `400 Bad Request`
//!
//! ## Configuration Example
//!
//! ```json
//! {
//!   "params": [
//!     {
//!       "paramName": "user_id",
//!       "paramPosition": "body",
//!       "proxyParamName": "X-User-Id",
//!       "proxyParamPosition": "header",
//!       "required": true
//!     }
//!   ],
//!   "removeAfterTransformed": true
//! }
//! ```

pub mod agent;
pub mod body;
pub mod config;
pub mod content;
pub mod context;
pub mod header;
pub mod rule;
pub mod transformer;

pub use agent::{AgentError, ParamsAgent};
pub use config::ParamsConfig;
pub use context::{HttpContext, ProxyRequest, RequestContext};
pub use transformer::TransformError;
