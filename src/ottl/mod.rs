//! Building blocks for emitting OTTL log statements.

pub mod expr;
pub mod path;
pub mod statement;
pub mod strptime;
