//! Scope restrictions limit which `(element, stage)` pairs breakpoints may
//! consider at all.
//!
//! A scope is independent of any breakpoint's own condition: a breakpoint
//! fires only when the scope permits the pair *and* the breakpoint matches.

use crate::element::PipelineElement;
use crate::error::Result;
use crate::scripting::{CompiledExpression, EvalContext, ExpressionEngine};
use crate::stage::{Stage, StageSet};
use std::fmt;
use std::sync::Arc;

pub trait ScopeRestriction: Send + Sync + fmt::Debug {
    fn permits(&self, element: &dyn PipelineElement, stage: Stage) -> Result<bool>;

    fn describe(&self) -> String;
}

/// No restriction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl ScopeRestriction for Unrestricted {
    fn permits(&self, _element: &dyn PipelineElement, _stage: Stage) -> Result<bool> {
        Ok(true)
    }

    fn describe(&self) -> String {
        "unrestricted".to_string()
    }
}

/// Elements at or below a root path.
#[derive(Debug, Clone)]
pub struct Subtree {
    root: String,
}

impl Subtree {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        if self.root.is_empty() {
            return true;
        }
        match path.strip_prefix(self.root.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl ScopeRestriction for Subtree {
    fn permits(&self, element: &dyn PipelineElement, _stage: Stage) -> Result<bool> {
        Ok(self.contains(element.path()))
    }

    fn describe(&self) -> String {
        format!("subtree {}", if self.root.is_empty() { "/" } else { &self.root })
    }
}

/// A fixed set of stages, for every element.
#[derive(Debug, Clone, Copy)]
pub struct StageScope {
    stages: StageSet,
}

impl StageScope {
    pub fn new(stages: StageSet) -> Self {
        Self { stages }
    }
}

impl ScopeRestriction for StageScope {
    fn permits(&self, _element: &dyn PipelineElement, stage: Stage) -> Result<bool> {
        Ok(self.stages.contains(stage))
    }

    fn describe(&self) -> String {
        let names: Vec<_> = self.stages.iter().map(Stage::hook_name).collect();
        format!("stages {}", names.join(","))
    }
}

/// Conjunction; evaluation stops at the first scope that refuses.
#[derive(Debug)]
pub struct AllOf {
    scopes: Vec<Box<dyn ScopeRestriction>>,
}

impl AllOf {
    pub fn new(scopes: Vec<Box<dyn ScopeRestriction>>) -> Self {
        Self { scopes }
    }
}

impl ScopeRestriction for AllOf {
    fn permits(&self, element: &dyn PipelineElement, stage: Stage) -> Result<bool> {
        for scope in &self.scopes {
            if !scope.permits(element, stage)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn describe(&self) -> String {
        let parts: Vec<_> = self.scopes.iter().map(|s| s.describe()).collect();
        format!("all of ({})", parts.join("; "))
    }
}

/// Rhai expression over `path`, `name`, `depth` and `stage`. No token is
/// visible to a scope expression.
pub struct ExpressionScope {
    expr: CompiledExpression,
    engine: Arc<ExpressionEngine>,
}

impl ExpressionScope {
    pub fn compile(engine: &Arc<ExpressionEngine>, source: &str) -> Result<Self> {
        Ok(Self {
            expr: engine.compile(source.trim())?,
            engine: Arc::clone(engine),
        })
    }
}

impl fmt::Debug for ExpressionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpressionScope({})", self.expr.source())
    }
}

impl ScopeRestriction for ExpressionScope {
    fn permits(&self, element: &dyn PipelineElement, stage: Stage) -> Result<bool> {
        self.engine
            .eval_bool(&self.expr, &EvalContext::new(element, stage, None))
    }

    fn describe(&self) -> String {
        format!("expression {}", self.expr.source())
    }
}
