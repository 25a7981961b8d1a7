//! Breakpoint conditions and watch expressions.

use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::scripting::{CompiledExpression, EvalContext, ExpressionEngine};
use crate::stage::Stage;
use std::fmt;
use std::sync::Arc;

/// Host-side predicate, for conditions that are not expressed in Rhai.
pub type ConditionFn =
    dyn Fn(&dyn PipelineElement, Option<&Token>) -> Result<bool> + Send + Sync;

/// Boolean test a breakpoint applies to `(element, token)`.
#[derive(Clone)]
pub enum Condition {
    Always,
    Never,
    Expression {
        expr: CompiledExpression,
        engine: Arc<ExpressionEngine>,
    },
    Custom {
        label: String,
        predicate: Arc<ConditionFn>,
    },
}

impl Condition {
    /// Compile a condition expression. `"true"` and `"false"` skip the engine.
    pub fn compile(engine: &Arc<ExpressionEngine>, source: &str) -> Result<Self> {
        match source.trim() {
            "" | "true" => Ok(Condition::Always),
            "false" => Ok(Condition::Never),
            trimmed => Ok(Condition::Expression {
                expr: engine.compile(trimmed)?,
                engine: Arc::clone(engine),
            }),
        }
    }

    pub fn custom<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&dyn PipelineElement, Option<&Token>) -> Result<bool> + Send + Sync + 'static,
    {
        Condition::Custom {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluation errors propagate; a failing condition is never treated as false.
    pub fn evaluate(
        &self,
        element: &dyn PipelineElement,
        stage: Stage,
        token: Option<&Token>,
    ) -> Result<bool> {
        match self {
            Condition::Always => Ok(true),
            Condition::Never => Ok(false),
            Condition::Expression { expr, engine } => {
                engine.eval_bool(expr, &EvalContext::new(element, stage, token))
            }
            Condition::Custom { predicate, .. } => predicate(element, token),
        }
    }

    /// Text shown to an operator while blocked.
    pub fn source(&self) -> &str {
        match self {
            Condition::Always => "true",
            Condition::Never => "false",
            Condition::Expression { expr, .. } => expr.source(),
            Condition::Custom { label, .. } => label,
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Always
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self.source())
    }
}

/// An expression evaluated for display while the pipeline is blocked.
#[derive(Clone)]
pub struct Watch {
    expr: CompiledExpression,
    engine: Arc<ExpressionEngine>,
}

impl Watch {
    pub fn compile(engine: &Arc<ExpressionEngine>, source: &str) -> Result<Self> {
        Ok(Self {
            expr: engine.compile(source.trim())?,
            engine: Arc::clone(engine),
        })
    }

    pub fn source(&self) -> &str {
        self.expr.source()
    }

    /// `(source, rendered value)`; evaluation errors are rendered, not returned.
    pub fn render(
        &self,
        element: &dyn PipelineElement,
        stage: Stage,
        token: Option<&Token>,
    ) -> (String, String) {
        let value = self
            .engine
            .eval_display(&self.expr, &EvalContext::new(element, stage, token));
        (self.source().to_string(), value)
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Watch({})", self.source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::NamedElement;
    use crate::error::FlowHookError;

    #[test]
    fn test_literal_shortcuts() {
        let engine = Arc::new(ExpressionEngine::new());
        assert!(matches!(Condition::compile(&engine, " true ").unwrap(), Condition::Always));
        assert!(matches!(Condition::compile(&engine, "").unwrap(), Condition::Always));
        assert!(matches!(Condition::compile(&engine, "false").unwrap(), Condition::Never));
        assert!(engine.cache().read().unwrap().is_empty());
    }

    #[test]
    fn test_expression_condition() {
        let engine = Arc::new(ExpressionEngine::new());
        let cond = Condition::compile(&engine, "has_token && token == 3").unwrap();
        let element = NamedElement::new("/a");

        assert!(cond.evaluate(&element, Stage::PreInput, Some(&Token::Int(3))).unwrap());
        assert!(!cond.evaluate(&element, Stage::PreInput, Some(&Token::Int(4))).unwrap());
        assert!(!cond.evaluate(&element, Stage::PreExecute, None).unwrap());
        assert_eq!(cond.source(), "has_token && token == 3");
    }

    #[test]
    fn test_malformed_condition() {
        let engine = Arc::new(ExpressionEngine::new());
        let err = Condition::compile(&engine, "path ==").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_custom_condition_error_propagates() {
        let cond = Condition::custom("explodes", |element, _| {
            Err(FlowHookError::Condition {
                element: element.path().to_string(),
                message: "boom".to_string(),
            })
        });
        let element = NamedElement::new("/a");
        assert!(cond.evaluate(&element, Stage::PreExecute, None).is_err());
        assert_eq!(cond.source(), "explodes");
    }

    #[test]
    fn test_watch_render() {
        let engine = Arc::new(ExpressionEngine::new());
        let watch = Watch::compile(&engine, "name").unwrap();
        let element = NamedElement::new("/Flow/Sink");
        let (label, value) = watch.render(&element, Stage::PreExecute, None);
        assert_eq!(label, "name");
        assert_eq!(value, "Sink");

        let failing = Watch::compile(&engine, "token + 1").unwrap();
        let (_, value) = failing.render(&element, Stage::PreExecute, None);
        assert!(value.starts_with("<error:"));
    }
}
