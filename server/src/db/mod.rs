//! Note persistence: PostgreSQL when configured, memory otherwise.

mod notes;
mod pool;

pub use notes::*;
pub use pool::*;
