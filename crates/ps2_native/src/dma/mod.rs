//! DMA tag chains inside instance buffers
//!
//! - [`tag`]: decoding of individual tags
//! - [`walker`]: payload fragments and chain extent
//! - [`fixup`]: relocation of `ref` addresses

pub mod fixup;
pub mod tag;
pub mod walker;

pub use fixup::{fix, fix_in_place, unfix, FixOutcome};
pub use tag::{DmaAddress, Tag, TagCursor, TagKind};
pub use walker::{chain_extent, walk, walk_with, ChainExtent, Fragment, FragmentSource, Walk, WalkEnd};
