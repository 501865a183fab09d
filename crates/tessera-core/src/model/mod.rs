//! Data model
//!
//! Declarations are the raw desired state handed to the graph builder.
//! References are the typed edges extracted from attribute interpolation.

mod declaration;
mod reference;

// Re-exports
pub use declaration::*;
pub use reference::*;
