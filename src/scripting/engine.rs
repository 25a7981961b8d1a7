//! Rhai Expression Engine Implementation
//!
//! Evaluates boolean conditions and display-only watch expressions against
//! the element and token seen at a stage hook. See the module docs of
//! [`crate::scripting`] for the variables available to expressions.

use crate::element::{PipelineElement, Token};
use crate::error::{FlowHookError, Result};
use crate::scripting::{create_shared_cache, CompiledExpression, SharedExpressionCache};
use crate::stage::Stage;
use rhai::{Dynamic, Engine, Scope};

/// What an expression is evaluated against
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub element: &'a dyn PipelineElement,
    pub stage: Stage,
    pub token: Option<&'a Token>,
}

impl<'a> EvalContext<'a> {
    pub fn new(element: &'a dyn PipelineElement, stage: Stage, token: Option<&'a Token>) -> Self {
        Self {
            element,
            stage,
            token,
        }
    }

    fn scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        scope.push_constant("path", self.element.path().to_string());
        scope.push_constant("name", self.element.name().to_string());
        scope.push_constant("depth", self.element.depth() as i64);
        scope.push_constant("stage", self.stage.hook_name().to_string());
        scope.push_constant("has_token", self.token.is_some());
        scope.push_constant("token", token_to_dynamic(self.token));
        scope.push_constant(
            "token_type",
            self.token.map(|t| t.type_name()).unwrap_or("").to_string(),
        );
        scope
    }
}

fn token_to_dynamic(token: Option<&Token>) -> Dynamic {
    match token {
        None => Dynamic::UNIT,
        Some(Token::Bool(v)) => Dynamic::from(*v),
        Some(Token::Int(v)) => Dynamic::from(*v),
        Some(Token::Float(v)) => Dynamic::from(*v),
        Some(Token::String(v)) => Dynamic::from(v.clone()),
        Some(opaque @ Token::Opaque { .. }) => Dynamic::from(opaque.identity()),
    }
}

/// Expression evaluator shared by breakpoints, watches and scope filters
pub struct ExpressionEngine {
    /// The Rhai engine instance
    engine: Engine,
    /// Cache of compiled expressions
    cache: SharedExpressionCache,
}

impl ExpressionEngine {
    /// Create a new engine with default configuration
    pub fn new() -> Self {
        Self::with_cache(create_shared_cache())
    }

    /// Create a new engine with a shared cache
    pub fn with_cache(cache: SharedExpressionCache) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self { engine, cache }
    }

    /// Configure the Rhai engine with helper functions and safety limits
    fn configure_engine(engine: &mut Engine) {
        // Hooks run on the pipeline thread, keep every evaluation bounded
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        engine.register_fn("under", |path: &str, root: &str| -> bool {
            let root = root.trim_end_matches('/');
            path == root
                || (path.starts_with(root) && path[root.len()..].starts_with('/'))
                || root.is_empty()
        });
        engine.register_fn("parent", |path: &str| -> String {
            match path.trim_end_matches('/').rfind('/') {
                Some(0) | None => "/".to_string(),
                Some(idx) => path[..idx].to_string(),
            }
        });
    }

    /// Compile an expression and cache it
    pub fn compile(&self, source: &str) -> Result<CompiledExpression> {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.get_or_compile(&self.engine, source)
    }

    /// Validate an expression without caching it
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile_expression(source)
            .map(|_| ())
            .map_err(|e| FlowHookError::from_parse_error(source, e))
    }

    /// Evaluate a compiled expression, returning whatever value it produces
    pub fn evaluate(&self, expr: &CompiledExpression, ctx: &EvalContext<'_>) -> Result<Dynamic> {
        let mut scope = ctx.scope();
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, expr.ast())
            .map_err(|e| FlowHookError::from_eval_error(ctx.element.path(), e))
    }

    /// Evaluate a compiled expression that must produce a boolean
    pub fn eval_bool(&self, expr: &CompiledExpression, ctx: &EvalContext<'_>) -> Result<bool> {
        let value = self.evaluate(expr, ctx)?;
        value.as_bool().map_err(|type_name| FlowHookError::Condition {
            element: ctx.element.path().to_string(),
            message: format!(
                "'{}' must evaluate to a boolean, got {}",
                expr.source(),
                type_name
            ),
        })
    }

    /// Evaluate an expression for display; errors become the displayed value
    pub fn eval_display(&self, expr: &CompiledExpression, ctx: &EvalContext<'_>) -> String {
        match self.evaluate(expr, ctx) {
            Ok(value) if value.is_unit() => "()".to_string(),
            Ok(value) => value.to_string(),
            Err(e) => format!("<error: {}>", e),
        }
    }

    /// Clear the expression cache
    pub fn clear_cache(&self) {
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Get a reference to the shared cache
    pub fn cache(&self) -> &SharedExpressionCache {
        &self.cache
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("cache_size", &self.cache.read().map(|c| c.len()).ok())
            .finish()
    }
}
