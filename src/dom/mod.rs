//! In-memory document model shared by the capture and replay engines.
//!
//! The live page handed to the recorder and the isolated surface driven by the
//! replayer both expose their tree through [`Document`]. It is an arena of
//! nodes addressed by [`NodeId`], with an HTML serializer, a tolerant HTML
//! parser, and a compiled subset of CSS selectors.

pub mod geometry;
pub mod html;
pub mod node;
pub mod scripting;
pub mod selector;

pub use geometry::{Rect, ScrollOffset, Viewport};
pub use node::{Document, ElementData, NodeId, NodeKind, POINTER_LAYER_ID};
pub use selector::{Selector, SelectorError, SelectorSet};
