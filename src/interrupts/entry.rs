//! Assembly entry stubs.
//!
//! Every routed vector enters through its own 16-byte stub. The stub pushes
//! a dummy error code where the processor does not push one, then the vector
//! number, and jumps to a common routine that saves the general purpose
//! registers, calls [`interrupt_entry`] with a pointer to the resulting
//! [`CpuState`] and restores whatever that frame holds afterwards. A handler
//! that rewrites `rsp` in the frame therefore resumes on another stack.

use core::arch::global_asm;
use core::ptr::addr_of;

use super::frame::CpuState;
use super::idt::EntryPoints;
use super::INTERRUPTS;

/// Distance between two consecutive vector stubs.
pub const STUB_STRIDE: u64 = 16;

global_asm!(
    r#"
    .pushsection .text.tinykern_interrupts, "ax"

    .global tinykern_interrupt_ignore
    .balign 16
tinykern_interrupt_ignore:
    iretq

    .global tinykern_interrupt_ignore_error_code
    .balign 16
tinykern_interrupt_ignore_error_code:
    addq $8, %rsp
    iretq

    .global tinykern_interrupt_stubs
    .balign 16
tinykern_interrupt_stubs:
    .set tk_vector, 0
    .rept 256
    .balign 16
    .if (tk_vector == 8) || ((tk_vector >= 10) && (tk_vector <= 14)) || (tk_vector == 17)
    .else
    pushq $0
    .endif
    pushq $tk_vector
    jmp tinykern_interrupt_common
    .set tk_vector, tk_vector + 1
    .endr

    .balign 16
tinykern_interrupt_common:
    pushq %rax
    pushq %rbx
    pushq %rcx
    pushq %rdx
    pushq %rsi
    pushq %rdi
    pushq %rbp
    pushq %r8
    pushq %r9
    pushq %r10
    pushq %r11
    pushq %r12
    pushq %r13
    pushq %r14
    pushq %r15

    movq %rsp, %rdi
    cld
    call {entry}

    popq %r15
    popq %r14
    popq %r13
    popq %r12
    popq %r11
    popq %r10
    popq %r9
    popq %r8
    popq %rbp
    popq %rdi
    popq %rsi
    popq %rdx
    popq %rcx
    popq %rbx
    popq %rax

    addq $16, %rsp
    iretq

    .popsection
    "#,
    entry = sym interrupt_entry,
    options(att_syntax)
);

extern "C" {
    fn tinykern_interrupt_ignore();
    fn tinykern_interrupt_ignore_error_code();
    static tinykern_interrupt_stubs: u8;
}

/// Called by the common stub with interrupts masked.
extern "C" fn interrupt_entry(frame: *mut CpuState) {
    // SAFETY: the common stub passes its own stack frame, laid out as CpuState.
    let state = unsafe { CpuState::read_from(frame) };
    let next = INTERRUPTS.dispatch(state.vector as u8, state);
    // SAFETY: as above; the stub pops whatever we leave here.
    unsafe { next.write_to(frame) };
}

/// Addresses of the stubs assembled above.
pub struct StubEntryPoints;

impl EntryPoints for StubEntryPoints {
    fn ignore(&self) -> u64 {
        tinykern_interrupt_ignore as usize as u64
    }

    fn ignore_error_code(&self) -> u64 {
        tinykern_interrupt_ignore_error_code as usize as u64
    }

    fn stub(&self, vector: u8) -> u64 {
        // SAFETY: only the address of the symbol is taken.
        let base = unsafe { addr_of!(tinykern_interrupt_stubs) } as u64;
        base + STUB_STRIDE * u64::from(vector)
    }
}
