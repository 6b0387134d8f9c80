//! Request handlers for the note API.

mod notes;

pub use notes::*;
