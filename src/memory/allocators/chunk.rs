//! Chunk headers for the free-list heap.
//!
//! Every chunk starts with a 16-byte header holding its payload size, the
//! arena offsets of its neighbours and a tag word (magic plus allocated bit).
//! Neighbours are addressed by arena offset, never by raw pointer.

use core::mem::size_of;
use core::ptr;

use super::core::AllocError;

/// Arena offset of a chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkId(u32);

impl ChunkId {
    pub(crate) const FIRST: Self = Self(0);

    /// `None` when `offset` cannot be encoded in a header link.
    pub(crate) fn at(offset: usize) -> Option<Self> {
        u32::try_from(offset).ok().filter(|raw| *raw != NO_CHUNK).map(Self)
    }

    pub(crate) const fn offset(self) -> usize {
        self.0 as usize
    }
}

const NO_CHUNK: u32 = u32::MAX;

const HEADER_MAGIC: u32 = 0x4b48_4e42;
const ALLOCATED: u32 = 1;

/// Largest arena whose offsets and sizes fit in a header.
pub(crate) const MAX_ARENA_SIZE: usize = NO_CHUNK as usize;

#[repr(C)]
#[derive(Clone, Copy)]
struct RawHeader {
    size: u32,
    pred: u32,
    succ: u32,
    tag: u32,
}

/// Bytes of arena consumed by each chunk header.
pub const HEADER_SIZE: usize = size_of::<RawHeader>();

const _: () = assert!(HEADER_SIZE == 16);
const _: () = assert!(HEADER_MAGIC & ALLOCATED == 0);

/// Decoded header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub id: ChunkId,
    pub size: usize,
    pub allocated: bool,
    pub pred: Option<ChunkId>,
    pub succ: Option<ChunkId>,
}

/// Public view of a chunk, yielded by [`MemoryManager::chunks`](super::MemoryManager::chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Arena offset of the chunk header.
    pub offset: usize,
    /// Payload size in bytes.
    pub size: usize,
    pub allocated: bool,
}

impl Chunk {
    pub(crate) fn info(&self) -> ChunkInfo {
        ChunkInfo { offset: self.id.offset(), size: self.size, allocated: self.allocated }
    }

    /// Arena offset one past the end of the payload.
    pub(crate) fn end(&self) -> usize {
        self.id.offset() + HEADER_SIZE + self.size
    }
}

fn link(id: Option<ChunkId>) -> u32 {
    id.map_or(NO_CHUNK, |id| id.0)
}

fn unlink(raw: u32) -> Option<ChunkId> {
    (raw != NO_CHUNK).then_some(ChunkId(raw))
}

/// The arena, read and written through its chunk headers.
pub(crate) struct Arena {
    start: usize,
    size: usize,
}

impl Arena {
    pub(crate) const fn empty() -> Self {
        Self { start: 0, size: 0 }
    }

    /// # Safety
    ///
    /// `start..start + size` must be valid for reads and writes and owned by
    /// the caller for as long as the arena is used. `size` must not exceed
    /// [`MAX_ARENA_SIZE`].
    pub(crate) const unsafe fn new(start: usize, size: usize) -> Self {
        Self { start, size }
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// First payload byte of `id`.
    pub(crate) fn payload(&self, id: ChunkId) -> *mut u8 {
        (self.start + id.offset() + HEADER_SIZE) as *mut u8
    }

    /// Decodes the header at `id`. `None` unless the header carries the
    /// magic and describes a chunk that lies inside the arena.
    pub(crate) fn load(&self, id: ChunkId) -> Option<Chunk> {
        let end = id.offset().checked_add(HEADER_SIZE)?;
        if end > self.size {
            return None;
        }
        // SAFETY: bounds checked above; headers sit at arbitrary byte offsets.
        let raw = unsafe { ptr::read_unaligned((self.start + id.offset()) as *const RawHeader) };
        if raw.tag & !ALLOCATED != HEADER_MAGIC {
            return None;
        }
        let chunk = Chunk {
            id,
            size: raw.size as usize,
            allocated: raw.tag & ALLOCATED != 0,
            pred: unlink(raw.pred),
            succ: unlink(raw.succ),
        };
        (chunk.end() <= self.size).then_some(chunk)
    }

    /// Like [`load`](Self::load), for ids taken from the chain itself.
    pub(crate) fn chunk(&self, id: ChunkId) -> Result<Chunk, AllocError> {
        self.load(id).ok_or(AllocError::CorruptHeader)
    }

    pub(crate) fn store(&mut self, chunk: &Chunk) {
        debug_assert!(chunk.end() <= self.size);
        let raw = RawHeader {
            size: chunk.size as u32,
            pred: link(chunk.pred),
            succ: link(chunk.succ),
            tag: HEADER_MAGIC | if chunk.allocated { ALLOCATED } else { 0 },
        };
        // SAFETY: every stored chunk lies inside the arena.
        unsafe { ptr::write_unaligned((self.start + chunk.id.offset()) as *mut RawHeader, raw) };
    }

    /// Wipes the tag of a header that no longer starts a chunk.
    pub(crate) fn erase(&mut self, id: ChunkId) {
        if id.offset() + HEADER_SIZE <= self.size {
            let tag = (self.start + id.offset() + 3 * size_of::<u32>()) as *mut u32;
            // SAFETY: inside the arena, checked above.
            unsafe { ptr::write_unaligned(tag, 0) };
        }
    }
}
