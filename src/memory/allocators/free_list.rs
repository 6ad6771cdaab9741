//! First-fit free-list memory manager.

use core::ptr::NonNull;

use super::chunk::{Arena, Chunk, ChunkId, ChunkInfo, HEADER_SIZE, MAX_ARENA_SIZE};
use super::core::{validate_region, AllocError};

/// Totals over the chunk chain. `used + free + chunks * HEADER_SIZE` always
/// equals `arena_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub arena_size: usize,
    pub used: usize,
    pub free: usize,
    pub chunks: usize,
    pub largest_free: usize,
}

/// Carves one arena into chunks, first-fit, splitting on allocation and
/// coalescing free neighbours on release.
///
/// All bookkeeping lives in the chunk headers, so the number of chunks is
/// bounded only by the arena.
pub struct MemoryManager {
    arena: Arena,
    initialized: bool,
}

impl MemoryManager {
    /// A manager without an arena. Every allocation fails until [`init`](Self::init).
    pub const fn empty() -> Self {
        Self { arena: Arena::empty(), initialized: false }
    }

    /// Hands `size` bytes at `start` to the manager as one free chunk.
    ///
    /// A region smaller than one header, or too large to address with 32-bit
    /// offsets, is rejected and leaves the manager without an arena.
    ///
    /// # Safety
    ///
    /// `start..start + size` must be valid for reads and writes, unused by
    /// anything else, and must outlive the manager.
    pub unsafe fn init(&mut self, start: usize, size: usize) -> Result<(), AllocError> {
        self.arena = Arena::empty();
        self.initialized = false;

        validate_region(start, size, HEADER_SIZE)?;
        if size > MAX_ARENA_SIZE {
            return Err(AllocError::InvalidSize);
        }

        self.arena = Arena::new(start, size);
        self.arena.store(&Chunk {
            id: ChunkId::FIRST,
            size: size - HEADER_SIZE,
            allocated: false,
            pred: None,
            succ: None,
        });
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn arena_start(&self) -> usize {
        self.arena.start()
    }

    pub fn arena_size(&self) -> usize {
        self.arena.size()
    }

    /// Returns a payload of at least `size` bytes from the first free chunk
    /// whose size is strictly greater than `size`.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if !self.initialized {
            return Err(AllocError::Uninitialized);
        }
        let mut cursor = Some(ChunkId::FIRST);
        let mut chunk = loop {
            let id = cursor.ok_or(AllocError::OutOfMemory)?;
            let chunk = self.arena.chunk(id)?;
            if !chunk.allocated && chunk.size > size {
                break chunk;
            }
            cursor = chunk.succ;
        };

        self.split(&mut chunk, size)?;
        chunk.allocated = true;
        self.arena.store(&chunk);

        NonNull::new(self.arena.payload(chunk.id)).ok_or(AllocError::InvalidAddress)
    }

    /// Cuts a free tail off `head` so that it keeps exactly `size` payload
    /// bytes. No-op when nothing would be left for the tail.
    fn split(&mut self, head: &mut Chunk, size: usize) -> Result<(), AllocError> {
        let remainder = match size.checked_add(HEADER_SIZE).and_then(|n| head.size.checked_sub(n)) {
            Some(remainder) if remainder > 0 => remainder,
            _ => return Ok(()),
        };

        let tail_id = ChunkId::at(head.id.offset() + HEADER_SIZE + size).ok_or(AllocError::Overflow)?;
        if let Some(succ_id) = head.succ {
            let mut succ = self.arena.chunk(succ_id)?;
            succ.pred = Some(tail_id);
            self.arena.store(&succ);
        }
        self.arena.store(&Chunk {
            id: tail_id,
            size: remainder,
            allocated: false,
            pred: Some(head.id),
            succ: head.succ,
        });

        head.size = size;
        head.succ = Some(tail_id);
        Ok(())
    }

    /// Returns the chunk behind `ptr` to the free list, merging it with a
    /// free predecessor first and then with a free successor.
    pub fn release(&mut self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        let mut chunk = self.chunk_for(ptr)?;
        chunk.allocated = false;

        if let Some(pred_id) = chunk.pred {
            let pred = self.arena.chunk(pred_id)?;
            if !pred.allocated {
                chunk = self.absorb(pred, chunk)?;
            }
        }
        if let Some(succ_id) = chunk.succ {
            let succ = self.arena.chunk(succ_id)?;
            if !succ.allocated {
                chunk = self.absorb(chunk, succ)?;
            }
        }
        self.arena.store(&chunk);
        Ok(())
    }

    /// Folds `succ` (header included) into `chunk` and returns the result,
    /// which the caller still has to store.
    fn absorb(&mut self, mut chunk: Chunk, succ: Chunk) -> Result<Chunk, AllocError> {
        if let Some(next_id) = succ.succ {
            let mut next = self.arena.chunk(next_id)?;
            next.pred = Some(chunk.id);
            self.arena.store(&next);
        }
        self.arena.erase(succ.id);
        chunk.size += HEADER_SIZE + succ.size;
        chunk.succ = succ.succ;
        Ok(chunk)
    }

    /// Maps a payload pointer back to its chunk, rejecting anything that is
    /// not the payload of a currently allocated chunk linked into the chain.
    fn chunk_for(&self, ptr: NonNull<u8>) -> Result<Chunk, AllocError> {
        if !self.initialized {
            return Err(AllocError::Uninitialized);
        }
        let offset = (ptr.as_ptr() as usize)
            .checked_sub(self.arena.start() + HEADER_SIZE)
            .ok_or(AllocError::InvalidPointer)?;
        let id = ChunkId::at(offset).ok_or(AllocError::InvalidPointer)?;
        let chunk = self.arena.load(id).filter(|c| c.allocated).ok_or(AllocError::InvalidPointer)?;

        let pred_links_back = match chunk.pred {
            Some(pred) => self.arena.load(pred).is_some_and(|p| p.succ == Some(id) && p.end() == offset),
            None => id == ChunkId::FIRST,
        };
        let succ_links_back = match chunk.succ {
            Some(succ) => self.arena.load(succ).is_some_and(|s| s.pred == Some(id) && chunk.end() == succ.offset()),
            None => chunk.end() == self.arena.size(),
        };
        if pred_links_back && succ_links_back {
            Ok(chunk)
        } else {
            Err(AllocError::InvalidPointer)
        }
    }

    /// Walks the chunk chain in address order.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks { arena: &self.arena, cursor: self.initialized.then_some(ChunkId::FIRST) }
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats { arena_size: self.arena.size(), ..HeapStats::default() };
        for chunk in self.chunks() {
            stats.chunks += 1;
            if chunk.allocated {
                stats.used += chunk.size;
            } else {
                stats.free += chunk.size;
                stats.largest_free = stats.largest_free.max(chunk.size);
            }
        }
        stats
    }
}

/// Iterator over the chunk chain, see [`MemoryManager::chunks`]. Stops early
/// at a corrupted header.
pub struct Chunks<'a> {
    arena: &'a Arena,
    cursor: Option<ChunkId>,
}

impl Iterator for Chunks<'_> {
    type Item = ChunkInfo;

    fn next(&mut self) -> Option<ChunkInfo> {
        let chunk = self.arena.load(self.cursor?)?;
        self.cursor = chunk.succ.filter(|succ| succ.offset() >= chunk.end());
        Some(chunk.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::ptr;

    #[repr(C, align(16))]
    #[derive(Clone, Copy)]
    struct Block([u8; 16]);

    struct Heap {
        _backing: Vec<Block>,
        manager: MemoryManager,
    }

    fn heap(size: usize) -> Heap {
        let mut backing = vec![Block([0; 16]); size.div_ceil(16)];
        let mut manager = MemoryManager::empty();
        let start = backing.as_mut_ptr() as usize;
        unsafe { manager.init(start, size).unwrap() };
        Heap { _backing: backing, manager }
    }

    fn offset_of(manager: &MemoryManager, ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize - manager.arena_start() - HEADER_SIZE
    }

    fn layout(manager: &MemoryManager) -> Vec<(usize, usize, bool)> {
        manager.chunks().map(|c| (c.offset, c.size, c.allocated)).collect()
    }

    /// Chunks tile the arena and no two free chunks touch.
    fn assert_well_formed(manager: &MemoryManager) {
        let mut expected_offset = 0;
        let mut previous_free = false;
        for chunk in manager.chunks() {
            assert_eq!(chunk.offset, expected_offset, "chunks must be contiguous");
            assert!(!(previous_free && !chunk.allocated), "adjacent free chunks at {}", chunk.offset);
            expected_offset = chunk.offset + HEADER_SIZE + chunk.size;
            previous_free = !chunk.allocated;
        }
        assert_eq!(expected_offset, manager.arena_size(), "chunks must cover the arena");
    }

    #[test]
    fn fresh_arena_is_one_free_chunk() {
        let heap = heap(256);
        assert_eq!(layout(&heap.manager), [(0, 240, false)]);
        assert_well_formed(&heap.manager);
    }

    #[test]
    fn tight_arena_splits_and_then_runs_dry() {
        let mut heap = heap(64);
        let first = heap.manager.allocate(10).unwrap();
        assert_eq!(first.as_ptr() as usize, heap.manager.arena_start() + HEADER_SIZE);
        assert_eq!(layout(&heap.manager), [(0, 10, true), (26, 22, false)]);
        assert_eq!(heap.manager.allocate(64), Err(AllocError::OutOfMemory));
        assert_well_formed(&heap.manager);
    }

    #[test]
    fn fit_requires_strictly_larger_chunk() {
        let mut heap = heap(256);
        let a = heap.manager.allocate(32).unwrap();
        let _b = heap.manager.allocate(16).unwrap();
        heap.manager.release(a).unwrap();
        assert_eq!(layout(&heap.manager)[0], (0, 32, false));

        let c = heap.manager.allocate(32).unwrap();
        assert_ne!(c, a, "an exactly sized chunk is skipped");

        let d = heap.manager.allocate(31).unwrap();
        assert_eq!(d, a);
        assert_eq!(layout(&heap.manager)[0], (0, 32, true));
        assert_well_formed(&heap.manager);
    }

    #[test]
    fn releasing_everything_restores_one_chunk() {
        for reverse in [false, true] {
            let mut heap = heap(256);
            let a = heap.manager.allocate(32).unwrap();
            let b = heap.manager.allocate(48).unwrap();
            let c = heap.manager.allocate(8).unwrap();
            let mut order = [a, b, c];
            if reverse {
                order.reverse();
            }
            for ptr in order {
                heap.manager.release(ptr).unwrap();
                assert_well_formed(&heap.manager);
            }
            assert_eq!(layout(&heap.manager), [(0, 240, false)]);
        }
    }

    #[test]
    fn release_merges_both_neighbours() {
        let mut heap = heap(512);
        let a = heap.manager.allocate(32).unwrap();
        let b = heap.manager.allocate(32).unwrap();
        let c = heap.manager.allocate(32).unwrap();
        let _guard = heap.manager.allocate(32).unwrap();

        heap.manager.release(a).unwrap();
        heap.manager.release(c).unwrap();
        assert_eq!(heap.manager.stats().chunks, 5);

        heap.manager.release(b).unwrap();
        assert_eq!(layout(&heap.manager)[0], (0, 32 * 3 + HEADER_SIZE * 2, false));
        assert_well_formed(&heap.manager);
    }

    #[test]
    fn release_then_allocate_reuses_the_same_place() {
        let mut heap = heap(1024);
        let _a = heap.manager.allocate(100).unwrap();
        let _b = heap.manager.allocate(200).unwrap();
        let c = heap.manager.allocate(50).unwrap();
        let before = layout(&heap.manager);

        heap.manager.release(c).unwrap();
        assert_eq!(heap.manager.stats().chunks, 3);
        let again = heap.manager.allocate(50).unwrap();
        assert_eq!(again, c);
        assert_eq!(layout(&heap.manager), before);
    }

    #[test]
    fn live_payloads_never_overlap() {
        let mut heap = heap(2048);
        let sizes = [24, 1, 300, 64, 7, 128, 16];
        let ptrs: Vec<_> = sizes.iter().map(|&s| heap.manager.allocate(s).unwrap()).collect();

        let mut ranges: Vec<_> = ptrs
            .iter()
            .zip(sizes)
            .map(|(p, s)| (p.as_ptr() as usize, p.as_ptr() as usize + s))
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 + HEADER_SIZE <= pair[1].0);
        }

        for (ptr, size) in ptrs.iter().zip(sizes) {
            unsafe { ptr::write_bytes(ptr.as_ptr(), 0xAB, size) };
        }
        assert_well_formed(&heap.manager);
        for ptr in ptrs {
            heap.manager.release(ptr).unwrap();
        }
        assert_eq!(heap.manager.stats().chunks, 1);
    }

    #[test]
    fn bogus_and_double_release_are_rejected() {
        let mut heap = heap(256);
        let a = heap.manager.allocate(32).unwrap();
        let _b = heap.manager.allocate(32).unwrap();

        let inside = NonNull::new(unsafe { a.as_ptr().add(4) }).unwrap();
        assert_eq!(heap.manager.release(inside), Err(AllocError::InvalidPointer));

        let mut outside = 0u8;
        assert_eq!(heap.manager.release(NonNull::from(&mut outside)), Err(AllocError::InvalidPointer));

        heap.manager.release(a).unwrap();
        assert_eq!(heap.manager.release(a), Err(AllocError::InvalidPointer));
        assert_well_formed(&heap.manager);
    }

    #[test]
    fn thousands_of_small_chunks_still_split() {
        let mut heap = heap(256 * 1024);
        let ptrs: Vec<_> = (0..4096).map(|_| heap.manager.allocate(16).unwrap()).collect();
        let before = heap.manager.stats();
        assert_eq!(before.chunks, 4097);

        let next = heap.manager.allocate(16).unwrap();
        assert_eq!(offset_of(&heap.manager, next), 4096 * (16 + HEADER_SIZE));
        let after = heap.manager.stats();
        assert_eq!(after.used - before.used, 16);
        assert_eq!(before.free - after.free, 16 + HEADER_SIZE);
        assert!(heap.manager.allocate(16).is_ok());

        for ptr in ptrs.into_iter().rev() {
            heap.manager.release(ptr).unwrap();
        }
        assert_well_formed(&heap.manager);
    }

    #[test]
    fn overwritten_header_is_rejected() {
        let mut heap = heap(256);
        let a = heap.manager.allocate(16).unwrap();
        let b = heap.manager.allocate(16).unwrap();
        assert_eq!(offset_of(&heap.manager, b), 32);

        // Run a's payload into b's header.
        unsafe { ptr::write_bytes(a.as_ptr(), 0xFF, 16 + HEADER_SIZE) };
        assert_eq!(heap.manager.release(b), Err(AllocError::InvalidPointer));
        assert_eq!(heap.manager.allocate(300), Err(AllocError::CorruptHeader));
    }

    #[test]
    fn undersized_arena_is_unusable() {
        let mut backing = vec![Block([0; 16]); 4];
        let mut manager = MemoryManager::empty();
        let start = backing.as_mut_ptr() as usize;
        assert_eq!(unsafe { manager.init(start, 8) }, Err(AllocError::InvalidSize));
        assert!(!manager.is_initialized());
        assert_eq!(manager.allocate(1), Err(AllocError::Uninitialized));
        assert_eq!(MemoryManager::empty().allocate(1), Err(AllocError::Uninitialized));
    }

    #[test]
    fn stats_account_for_every_byte() {
        let mut heap = heap(1024);
        let _a = heap.manager.allocate(100).unwrap();
        let _b = heap.manager.allocate(60).unwrap();
        let stats = heap.manager.stats();
        assert_eq!(stats.used, 160);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.used + stats.free + stats.chunks * HEADER_SIZE, stats.arena_size);
        assert_eq!(stats.largest_free, stats.free);
    }

    #[test]
    fn churn_keeps_the_chain_well_formed() {
        let mut heap = heap(4096);
        let mut live: Vec<NonNull<u8>> = Vec::new();
        let mut seed: u32 = 0x1234_5678;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let roll = (seed >> 16) as usize;
            if roll % 3 != 0 || live.is_empty() {
                if let Ok(ptr) = heap.manager.allocate(1 + roll % 200) {
                    live.push(ptr);
                }
            } else {
                let ptr = live.swap_remove(roll % live.len());
                heap.manager.release(ptr).unwrap();
            }
            assert_well_formed(&heap.manager);
        }
        for ptr in live {
            heap.manager.release(ptr).unwrap();
        }
        assert_eq!(layout(&heap.manager), [(0, 4096 - HEADER_SIZE, false)]);
    }
}
