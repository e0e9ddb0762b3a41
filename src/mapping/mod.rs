//! The mapping engine: path resolution, per-rule evaluation and emission.

pub mod content;
pub mod emitter;
pub mod evaluator;
pub mod path;

pub use content::has_producible_content;
pub use emitter::{run, EmitStats, Emitter, ErrorPolicy};
pub use evaluator::{Emission, Evaluation, RuleEvaluator, SourceValue};
pub use path::{resolve, resolve_str, JsonPath, PathScope, PathSyntaxError};
