//! Quire's section layout engine.
//!
//! The engine keeps a tree of layout nodes (pages, bodies, columns, footnote
//! containers, sections and flowing content) and maintains the physical
//! frames of logical document sections while their content, their geometry
//! or their column setup changes. A logical section is realized by a chain of
//! section frames: the master and its follows, one per page or column run.
//!
//! The entry point is [`Layout`]. Build the initial tree with its insertion
//! methods, then call [`Layout::run`] after every batch of edits.

pub mod diag;
pub mod geom;
pub mod model;
pub mod tree;

mod column;
mod config;
mod flow;
mod layout;
mod lock;
mod notes;
mod observer;
mod section;

pub use self::config::Settings;
pub use self::layout::Layout;
pub use self::notes::Layouter;
pub use self::observer::FlowObserver;
pub use self::section::{FindMode, MakePage};
