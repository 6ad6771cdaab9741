//! Kernel heap: a [`MemoryManager`] over a static arena, exposed as the
//! global allocator on bare metal.

use bootloader_api::info::{MemoryRegion, MemoryRegionKind};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

pub mod allocators;

pub use allocators::{AllocError, ChunkInfo, HeapStats, MemoryManager, HEADER_SIZE};

use crate::config::HEAP_SIZE;

/// Alignment of every payload handed out through [`GlobalAlloc`].
pub const HEAP_ALIGN: usize = 16;

#[repr(align(4096))]
struct HeapBuffer([u8; HEAP_SIZE]);
static mut KERNEL_HEAP_BUFFER: HeapBuffer = HeapBuffer([0; HEAP_SIZE]);

#[cfg_attr(target_os = "none", global_allocator)]
static KERNEL_ALLOCATOR: LockedHeap = LockedHeap::new();

/// Spinlocked [`MemoryManager`] usable as a `#[global_allocator]`.
///
/// Requests are rounded up to [`HEAP_ALIGN`] so every header, and therefore
/// every payload, stays 16-byte aligned. Larger alignments are refused.
pub struct LockedHeap {
    inner: spin::Mutex<MemoryManager>,
}

impl LockedHeap {
    pub const fn new() -> Self {
        Self {
            inner: spin::Mutex::new(MemoryManager::empty()),
        }
    }

    /// # Safety
    ///
    /// Same contract as [`MemoryManager::init`]; `start` must be 16-byte aligned.
    pub unsafe fn init(&self, start: usize, size: usize) -> Result<(), AllocError> {
        if start % HEAP_ALIGN != 0 {
            return Err(AllocError::InvalidAddress);
        }
        let mut manager = self.inner.lock();
        if manager.is_initialized() {
            return Err(AllocError::AlreadyInitialized);
        }
        manager.init(start, allocators::align_down(size, HEAP_ALIGN))
    }

    pub fn stats(&self) -> HeapStats {
        self.inner.lock().stats()
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGN {
            return ptr::null_mut();
        }
        let size = allocators::align_up(layout.size().max(1), HEAP_ALIGN);
        self.inner
            .lock()
            .allocate(size)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        if let Err(err) = self.inner.lock().release(ptr) {
            log::error!("heap: release of {:p} failed: {}", ptr, err);
        }
    }
}

/// Hands the static arena to the kernel allocator.
pub fn init_heap() -> Result<(), AllocError> {
    // SAFETY: the buffer is only ever reached through this pointer, and
    // `LockedHeap::init` refuses a second initialization.
    unsafe {
        let start = ptr::addr_of_mut!(KERNEL_HEAP_BUFFER) as usize;
        KERNEL_ALLOCATOR.init(start, HEAP_SIZE)
    }
}

pub fn heap_stats() -> HeapStats {
    KERNEL_ALLOCATOR.stats()
}

/// Total bytes in usable regions of the bootloader memory map.
pub fn usable_memory(regions: &[MemoryRegion]) -> u64 {
    regions
        .iter()
        .filter(|region| region.kind == MemoryRegionKind::Usable)
        .map(|region| region.end - region.start)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    #[repr(C, align(16))]
    struct Backing([u8; 2048]);

    fn locked_heap(backing: &mut Backing) -> LockedHeap {
        let heap = LockedHeap::new();
        unsafe { heap.init(backing.0.as_mut_ptr() as usize, backing.0.len()).unwrap() };
        heap
    }

    #[test]
    fn global_alloc_hands_out_aligned_blocks() {
        let mut backing = Box::new(Backing([0; 2048]));
        let heap = locked_heap(&mut backing);
        unsafe {
            let a = heap.alloc(Layout::from_size_align(3, 1).unwrap());
            let b = heap.alloc(Layout::from_size_align(40, 8).unwrap());
            assert!(!a.is_null() && !b.is_null());
            assert_eq!(a as usize % HEAP_ALIGN, 0);
            assert_eq!(b as usize % HEAP_ALIGN, 0);
            assert_eq!(b as usize - a as usize, 16 + HEADER_SIZE);

            heap.dealloc(a, Layout::from_size_align(3, 1).unwrap());
            heap.dealloc(b, Layout::from_size_align(40, 8).unwrap());
        }
        assert_eq!(heap.stats().chunks, 1);
    }

    #[test]
    fn over_aligned_and_oversized_requests_fail() {
        let mut backing = Box::new(Backing([0; 2048]));
        let heap = locked_heap(&mut backing);
        unsafe {
            assert!(heap.alloc(Layout::from_size_align(8, 64).unwrap()).is_null());
            assert!(heap.alloc(Layout::from_size_align(4096, 8).unwrap()).is_null());
        }
    }

    #[test]
    fn heap_initializes_only_once() {
        let mut backing = Box::new(Backing([0; 2048]));
        let heap = locked_heap(&mut backing);
        let start = backing.0.as_mut_ptr() as usize;
        assert_eq!(unsafe { heap.init(start, 2048) }, Err(AllocError::AlreadyInitialized));
        assert_eq!(
            unsafe { LockedHeap::new().init(start + 8, 64) },
            Err(AllocError::InvalidAddress)
        );
    }

    #[test]
    fn uninitialized_heap_returns_null() {
        let heap = LockedHeap::new();
        assert!(unsafe { heap.alloc(Layout::new::<u64>()) }.is_null());
    }

    #[test]
    fn usable_memory_sums_usable_regions() {
        let regions = [
            MemoryRegion { start: 0x1000, end: 0x9000, kind: MemoryRegionKind::Usable },
            MemoryRegion { start: 0x9000, end: 0xA000, kind: MemoryRegionKind::Bootloader },
            MemoryRegion { start: 0x10_0000, end: 0x20_0000, kind: MemoryRegionKind::Usable },
        ];
        assert_eq!(usable_memory(&regions), 0x8000 + 0x10_0000);
    }
}
