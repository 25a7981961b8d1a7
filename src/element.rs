//! Pipeline elements and the tokens flowing between them.
//!
//! Both are owned by the external pipeline engine. Listeners only ever see
//! borrowed views: an element is identified solely by its hierarchical path,
//! and a token is an opaque payload that listeners may describe or hand to a
//! condition expression, never modify.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One element (actor) of the pipeline being instrumented.
pub trait PipelineElement: Send + Sync {
    /// Stable, hierarchical path, unique within one run (e.g. `/Flow/Branch/Display`).
    fn path(&self) -> &str;

    /// Whether the element itself reports that it has been stopped.
    fn is_stopped(&self) -> bool {
        false
    }

    /// Last segment of the path.
    fn name(&self) -> &str {
        let path = self.path();
        path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path)
    }

    /// Nesting depth, `/a` is 1, `/a/b` is 2.
    fn depth(&self) -> usize {
        self.path().split('/').filter(|s| !s.is_empty()).count()
    }
}

/// Payload passed between elements at the INPUT and OUTPUT stages.
#[derive(Clone)]
pub enum Token {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Anything else; listeners can only report its type and identity.
    Opaque {
        type_name: &'static str,
        value: Arc<dyn Any + Send + Sync>,
    },
}

impl Token {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Token::Opaque {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Token::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Token::Float(v) => Some(*v),
            Token::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Token::Opaque { value, .. } => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Short type tag, used in logs and expressions.
    pub fn type_name(&self) -> &'static str {
        match self {
            Token::Bool(_) => "bool",
            Token::Int(_) => "int",
            Token::Float(_) => "float",
            Token::String(_) => "string",
            Token::Opaque { type_name, .. } => type_name,
        }
    }

    /// Human-readable identity of the payload: `type:value` for plain values,
    /// `type@address` for opaque ones.
    pub fn identity(&self) -> String {
        match self {
            Token::Bool(v) => format!("bool:{}", v),
            Token::Int(v) => format!("int:{}", v),
            Token::Float(v) => format!("float:{}", v),
            Token::String(v) => format!("string:{}", v),
            Token::Opaque { type_name, value } => {
                format!("{}@{:p}", type_name, Arc::as_ptr(value))
            }
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Opaque { type_name, .. } => write!(f, "Token::Opaque({})", type_name),
            other => write!(f, "Token({})", other.identity()),
        }
    }
}

impl From<bool> for Token {
    fn from(v: bool) -> Self {
        Token::Bool(v)
    }
}

impl From<i64> for Token {
    fn from(v: i64) -> Self {
        Token::Int(v)
    }
}

impl From<f64> for Token {
    fn from(v: f64) -> Self {
        Token::Float(v)
    }
}

impl From<&str> for Token {
    fn from(v: &str) -> Self {
        Token::String(v.to_string())
    }
}

impl From<String> for Token {
    fn from(v: String) -> Self {
        Token::String(v)
    }
}

/// Minimal element used by the scripted runner, the demo binary and tests.
#[derive(Debug)]
pub struct NamedElement {
    path: String,
    stopped: AtomicBool,
}

impl NamedElement {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Mark the element as stopped; a blocked debug session releases it.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl PipelineElement for NamedElement {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_name_and_depth() {
        let e = NamedElement::new("/Flow/Branch/Display");
        assert_eq!(e.name(), "Display");
        assert_eq!(e.depth(), 3);

        let root = NamedElement::new("/");
        assert_eq!(root.depth(), 0);
    }

    #[test]
    fn test_element_stop() {
        let e = NamedElement::new("/a");
        assert!(!e.is_stopped());
        e.stop();
        assert!(e.is_stopped());
    }

    #[test]
    fn test_token_accessors() {
        assert_eq!(Token::Bool(true).as_bool(), Some(true));
        assert_eq!(Token::Int(42).as_int(), Some(42));
        assert_eq!(Token::Int(2).as_float(), Some(2.0));
        assert_eq!(Token::from("hello").as_str(), Some("hello"));
        assert_eq!(Token::Float(1.5).as_int(), None);
    }

    #[test]
    fn test_token_identity() {
        assert_eq!(Token::Int(7).identity(), "int:7");
        assert_eq!(Token::from("x").identity(), "string:x");

        let opaque = Token::opaque(vec![1u8, 2, 3]);
        assert!(opaque.identity().contains("Vec<u8>@"));
        assert_eq!(opaque.downcast_ref::<Vec<u8>>(), Some(&vec![1u8, 2, 3]));
        assert!(opaque.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_opaque_clone_shares_identity() {
        let a = Token::opaque(String::from("model"));
        let b = a.clone();
        assert_eq!(a.identity(), b.identity());
    }
}
