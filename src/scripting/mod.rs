//! Rhai expressions for breakpoint conditions, watches and scope filters
//!
//! Expressions are compiled once (and cached by source text) when a listener
//! is built, then evaluated on the pipeline thread at each stage hook.
//!
//! ## Variables
//!
//! Every expression sees the following variables:
//!
//! - `path` - Full hierarchical path of the current element (`/Flow/Branch/Display`)
//! - `name` - Last path segment (`Display`)
//! - `depth` - Nesting depth of the element (`/a` is 1)
//! - `stage` - Hook name of the current stage (`preExecute`, `postOutput`, ...)
//! - `has_token` - Whether a token is in flight at this stage
//! - `token` - The token value (bool, int, float or string; `()` when absent,
//!   the identity string for opaque payloads)
//! - `token_type` - Short type tag of the token (`"int"`, `"string"`, ...; `""` when absent)
//!
//! ## Helper Functions
//!
//! - `under(path, root)` - True when `path` is `root` or nested below it
//! - `parent(path)` - Parent path (`"/"` for top-level elements)
//!
//! ## Example Expressions
//!
//! Break on every even integer token entering `/Flow/Sink`:
//! ```rhai
//! path == "/Flow/Sink" && token_type == "int" && token % 2 == 0
//! ```
//!
//! Only consider elements below a branch:
//! ```rhai
//! under(path, "/Flow/Branch")
//! ```

mod engine;

pub use engine::{EvalContext, ExpressionEngine};

use crate::error::{FlowHookError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A compiled expression that can be evaluated repeatedly
#[derive(Clone)]
pub struct CompiledExpression {
    /// The compiled AST
    ast: AST,
    /// Source text, also the cache key
    source: String,
}

impl CompiledExpression {
    /// Get the source code of this expression
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &self.source)
            .finish()
    }
}

/// Cache of compiled expressions, keyed by source text
#[derive(Default)]
pub struct ExpressionCache {
    cache: HashMap<String, CompiledExpression>,
}

impl ExpressionCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get a cached expression or compile and cache it
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<CompiledExpression> {
        if let Some(expr) = self.cache.get(source) {
            return Ok(expr.clone());
        }

        let ast = engine
            .compile_expression(source)
            .map_err(|e| FlowHookError::from_parse_error(source, e))?;

        let expr = CompiledExpression {
            ast,
            source: source.to_string(),
        };

        self.cache.insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Thread-safe expression cache wrapper
pub type SharedExpressionCache = Arc<RwLock<ExpressionCache>>;

/// Create a new shared expression cache
pub fn create_shared_cache() -> SharedExpressionCache {
    Arc::new(RwLock::new(ExpressionCache::new()))
}
