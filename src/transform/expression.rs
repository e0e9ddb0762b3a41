use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use rhai::{Dynamic, Engine, Scope, AST};
use thiserror::Error;
use tracing::debug;

use super::functions::{self, FUNCTION_NAMESPACE};

/// Maximum number of compiled expressions kept in the cache.
pub const CACHE_CAPACITY: usize = 512;

/// Name of the variable holding the coerced value.
pub const VALUE_VARIABLE: &str = "val";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("failed to compile expression: {0}")]
    Compile(String),
    #[error("evaluation failed: {0}")]
    Evaluate(String),
}

/// Expression engine with strict variable checking and a bounded compiled-expression cache.
///
/// Only `val` is in scope; helper functions live in the `fmfcn` namespace.
pub struct ExpressionEngine {
    engine: Engine,
    cache: Mutex<HashMap<String, Arc<AST>>>,
}

impl ExpressionEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_strict_variables(true);
        engine.register_static_module(FUNCTION_NAMESPACE, functions::module().into());
        Self {
            engine,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide engine, built on first use.
    pub fn shared() -> &'static ExpressionEngine {
        static SHARED: OnceLock<ExpressionEngine> = OnceLock::new();
        SHARED.get_or_init(ExpressionEngine::new)
    }

    /// Evaluate `expression` with `val` bound to `value`.
    pub fn evaluate(&self, expression: &str, value: Dynamic) -> Result<Dynamic, ExpressionError> {
        let ast = self.compile(expression)?;
        let mut scope = Scope::new();
        scope.push_dynamic(VALUE_VARIABLE, value);
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| ExpressionError::Evaluate(e.to_string()))
    }

    /// Number of cached compiled expressions.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn compile(&self, expression: &str) -> Result<Arc<AST>, ExpressionError> {
        if let Some(ast) = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(expression).cloned())
        {
            return Ok(ast);
        }

        let mut scope = Scope::new();
        scope.push_dynamic(VALUE_VARIABLE, Dynamic::UNIT);
        let ast = self
            .engine
            .compile_expression_with_scope(&scope, expression)
            .map(Arc::new)
            .map_err(|e| ExpressionError::Compile(e.to_string()))?;

        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() < CACHE_CAPACITY {
                cache.insert(expression.to_string(), Arc::clone(&ast));
            } else {
                debug!(expression, "expression cache full; not caching");
            }
        }
        Ok(ast)
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("cached", &self.cached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_expressions_are_cached() {
        let engine = ExpressionEngine::new();
        assert_eq!(engine.cached(), 0);
        for v in 1..=3_i64 {
            let out = engine.evaluate("val + 1", Dynamic::from(v)).unwrap();
            assert_eq!(out.as_int().unwrap(), v + 1);
        }
        assert_eq!(engine.cached(), 1);
    }

    #[test]
    fn compile_errors_are_reported() {
        let engine = ExpressionEngine::new();
        assert!(matches!(
            engine.evaluate("val +", Dynamic::from(1_i64)),
            Err(ExpressionError::Compile(_))
        ));
        assert!(matches!(
            engine.evaluate("missing * 2", Dynamic::from(1_i64)),
            Err(ExpressionError::Compile(_))
        ));
        assert_eq!(engine.cached(), 0);
    }

    #[test]
    fn the_shared_engine_is_usable_across_threads() {
        let handles: Vec<_> = (0..4_i64)
            .map(|i| {
                std::thread::spawn(move || {
                    ExpressionEngine::shared()
                        .evaluate("val * 10", Dynamic::from(i))
                        .map(|d| d.as_int().unwrap_or_default())
                })
            })
            .collect();
        let results: Vec<i64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }
}
