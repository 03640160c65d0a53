//! Template resolution for step configuration.
//!
//! Step configuration may reference run data with `{{ .path }}` expressions.
//! Paths are dotted and resolve against a layered view of the
//! [`ExecutionContext`](crate::context::ExecutionContext):
//!
//! - `steps.<name>...` reads the recorded output of a completed step
//! - `trigger...` reads the trigger data
//! - any other first segment reads the working set, then the trigger data
//!
//! Run metadata is never visible to templates.

mod parser;
mod resolver;

pub use parser::{parse, Piece};
pub use resolver::{render, TemplateResolver};
