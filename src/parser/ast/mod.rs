//! The typed abstract syntax tree.
//!
//! Nodes are built by the parser with their resolved [`CType`](super::ctype::CType)
//! already attached; the code generator walks them read-only.
mod expression;
mod function;
mod statement;

pub use self::expression::*;
pub use self::function::*;
pub use self::statement::*;
