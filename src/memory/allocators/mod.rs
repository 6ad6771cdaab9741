//! # Heap Allocator
//!
//! First-fit free-list heap over one contiguous arena.
//!
//! ## Layout
//!
//! The arena is covered end to end by chunks. Each chunk is a 16-byte header
//! followed by its payload:
//!
//! ```text
//! | hdr | payload | hdr | payload ........ | hdr | payload |
//! ^ arena start                                  arena end ^
//! ```
//!
//! The header holds the payload size, the arena offsets of both neighbours
//! and a tag word (magic plus allocated bit). Links are offsets rather than
//! pointers, so every header is validated against the arena bounds before it
//! is followed, and `release` checks that both neighbours link back.
//!
//! ## Core Utilities
//!
//! - `AllocError`: allocation failure types
//! - Alignment helpers: `align_up`, `align_down`

mod chunk;
mod core;
mod free_list;

pub use self::core::AllocError;
pub(crate) use self::core::{align_down, align_up};
pub use chunk::{ChunkInfo, HEADER_SIZE};
pub use free_list::{Chunks, HeapStats, MemoryManager};
