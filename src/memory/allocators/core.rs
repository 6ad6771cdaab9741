/// Core utilities and error types for the heap
use core::fmt;

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

#[inline]
pub(crate) const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[inline]
pub(crate) const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Validates that a memory region can back an arena of at least `min_size` bytes
pub(crate) fn validate_region(start: usize, size: usize, min_size: usize) -> Result<(), AllocError> {
    if start == 0 {
        return Err(AllocError::InvalidAddress);
    }
    if size < min_size {
        return Err(AllocError::InvalidSize);
    }
    start.checked_add(size).ok_or(AllocError::Overflow)?;
    Ok(())
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free chunk is strictly larger than the request.
    OutOfMemory,
    /// Arena start is null or misaligned.
    InvalidAddress,
    /// Arena too small to hold a single chunk header, or too large for the
    /// 32-bit offsets in one.
    InvalidSize,
    /// Arena end does not fit in the address space.
    Overflow,
    /// The manager has no arena.
    Uninitialized,
    /// The arena was already handed to the manager.
    AlreadyInitialized,
    /// Released pointer was never returned by `allocate`, or is already free.
    InvalidPointer,
    /// A header on the chunk chain was overwritten.
    CorruptHeader,
}

impl AllocError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocError::OutOfMemory => "out of memory",
            AllocError::InvalidAddress => "invalid arena address",
            AllocError::InvalidSize => "arena too small",
            AllocError::Overflow => "arena overflows the address space",
            AllocError::Uninitialized => "heap not initialized",
            AllocError::AlreadyInitialized => "heap already initialized",
            AllocError::InvalidPointer => "pointer not owned by the heap",
            AllocError::CorruptHeader => "heap chunk header corrupted",
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
