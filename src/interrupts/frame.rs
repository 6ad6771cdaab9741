//! Register snapshot pushed by the entry stubs.

use core::mem::size_of;
use core::ptr;

/// Full register state of an interrupted context, in the exact order the
/// entry stub leaves it on the stack (lowest address first).
///
/// The upper five words are the hardware `iretq` frame. Replacing the
/// snapshot handed back from dispatch therefore resumes a different context,
/// on a different stack.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuState {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    /// Vector number pushed by the stub.
    pub vector: u64,
    /// Hardware error code, or 0 for vectors that have none.
    pub error_code: u64,

    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Bytes between the frame pointer handed to `interrupt_entry` and the end of
/// the `iretq` frame.
pub const CPU_STATE_SIZE: usize = 22 * 8;

const _: () = assert!(size_of::<CpuState>() == CPU_STATE_SIZE);

/// Interrupt flag.
pub const RFLAGS_IF: u64 = 1 << 9;
/// Bit 1 of RFLAGS always reads as one.
pub const RFLAGS_RESERVED: u64 = 1 << 1;

impl CpuState {
    pub const fn zeroed() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            vector: 0,
            error_code: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }

    /// Copies a snapshot out of a stub-built frame.
    ///
    /// # Safety
    ///
    /// `frame` must point at a live, 8-byte aligned frame of [`CPU_STATE_SIZE`] bytes.
    pub unsafe fn read_from(frame: *const CpuState) -> Self {
        ptr::read(frame)
    }

    /// Overwrites a stub-built frame with this snapshot.
    ///
    /// # Safety
    ///
    /// Same as [`read_from`](Self::read_from), and the frame must be writable.
    pub unsafe fn write_to(&self, frame: *mut CpuState) {
        ptr::write(frame, *self);
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.rflags & RFLAGS_IF != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn layout_matches_the_entry_stub() {
        assert_eq!(offset_of!(CpuState, r15), 0);
        assert_eq!(offset_of!(CpuState, rax), 14 * 8);
        assert_eq!(offset_of!(CpuState, vector), 15 * 8);
        assert_eq!(offset_of!(CpuState, error_code), 16 * 8);
        assert_eq!(offset_of!(CpuState, rip), 17 * 8);
        assert_eq!(offset_of!(CpuState, ss), 21 * 8);
    }

    #[test]
    fn frame_words_map_to_registers() {
        let mut words: [u64; 22] = core::array::from_fn(|i| i as u64 * 0x10);
        let frame = words.as_mut_ptr().cast::<CpuState>();

        let mut state = unsafe { CpuState::read_from(frame) };
        assert_eq!(state.r15, 0x00);
        assert_eq!(state.rax, 0xE0);
        assert_eq!(state.rip, 0x110);
        assert_eq!(state.rsp, 0x140);

        state.rsp = 0xdead_b000;
        state.rflags = RFLAGS_IF | RFLAGS_RESERVED;
        unsafe { state.write_to(frame) };
        assert_eq!(words[20], 0xdead_b000);
        assert_eq!(words[19], 0x202);
    }

    #[test]
    fn interrupt_flag() {
        let mut state = CpuState::zeroed();
        assert!(!state.interrupts_enabled());
        state.rflags = 0x202;
        assert!(state.interrupts_enabled());
    }
}
