//! Gate table for the entry stubs, built on `x86_64`'s
//! [`InterruptDescriptorTable`].

use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::idt::{Entry, EntryOptions, InterruptDescriptorTable};
use x86_64::VirtAddr;

use super::gdt::DOUBLE_FAULT_IST_INDEX;
use super::pic::IRQ_LINES;

pub const VECTOR_COUNT: usize = 256;

/// Vectors 0x00..0x13 are the architectural exceptions that get their own
/// entry stub.
pub const EXCEPTION_COUNT: u8 = 0x14;

pub const DOUBLE_FAULT_VECTOR: u8 = 0x08;

/// First vector past the exceptions reserved by the architecture.
const FIRST_FREE_VECTOR: u8 = 0x20;

/// Where the gates of a table point to.
pub trait EntryPoints {
    /// Stub that returns straight away, for vectors nobody routes.
    fn ignore(&self) -> u64;
    /// Like [`ignore`](Self::ignore), for exceptions that push an error code.
    fn ignore_error_code(&self) -> u64;
    /// Stub that saves state and dispatches `vector`.
    fn stub(&self, vector: u8) -> u64;
}

/// Points `entry` at `handler` with `selector` as code segment.
///
/// # Safety
///
/// `handler` must be an entry stub that follows the error code convention of
/// the vector `entry` belongs to, and `selector` must be a long-mode code
/// segment.
unsafe fn route<F>(entry: &mut Entry<F>, handler: u64, selector: SegmentSelector) -> &mut EntryOptions {
    // SAFETY: forwarded to the caller.
    unsafe {
        let options = entry.set_handler_addr(VirtAddr::new(handler));
        options.set_code_selector(selector);
        options
    }
}

/// Every free vector routed to the ignore stub, then the exceptions and the
/// sixteen IRQ lines starting at `offset` routed to their entry stubs.
///
/// The reserved exception vectors (0x0F, 0x16..0x1B, 0x1F) are never raised
/// and stay not-present.
pub fn build(offset: u8, selector: u16, entries: &impl EntryPoints) -> InterruptDescriptorTable {
    let mut idt = InterruptDescriptorTable::new();
    let cs = SegmentSelector(selector);

    // SAFETY: all addresses come from `entries`; error code vectors get
    // stubs that expect one.
    unsafe {
        for vector in FIRST_FREE_VECTOR..=u8::MAX {
            route(&mut idt[vector], entries.ignore(), cs);
        }
        route(&mut idt.virtualization, entries.ignore(), cs);
        route(&mut idt.hv_injection_exception, entries.ignore(), cs);
        route(&mut idt.cp_protection_exception, entries.ignore_error_code(), cs);
        route(&mut idt.vmm_communication_exception, entries.ignore_error_code(), cs);
        route(&mut idt.security_exception, entries.ignore_error_code(), cs);

        route(&mut idt.divide_error, entries.stub(0x00), cs);
        route(&mut idt.debug, entries.stub(0x01), cs);
        route(&mut idt.non_maskable_interrupt, entries.stub(0x02), cs);
        route(&mut idt.breakpoint, entries.stub(0x03), cs);
        route(&mut idt.overflow, entries.stub(0x04), cs);
        route(&mut idt.bound_range_exceeded, entries.stub(0x05), cs);
        route(&mut idt.invalid_opcode, entries.stub(0x06), cs);
        route(&mut idt.device_not_available, entries.stub(0x07), cs);
        route(&mut idt.double_fault, entries.stub(DOUBLE_FAULT_VECTOR), cs)
            .set_stack_index(DOUBLE_FAULT_IST_INDEX);
        route(&mut idt[0x09], entries.stub(0x09), cs);
        route(&mut idt.invalid_tss, entries.stub(0x0A), cs);
        route(&mut idt.segment_not_present, entries.stub(0x0B), cs);
        route(&mut idt.stack_segment_fault, entries.stub(0x0C), cs);
        route(&mut idt.general_protection_fault, entries.stub(0x0D), cs);
        route(&mut idt.page_fault, entries.stub(0x0E), cs);
        route(&mut idt.x87_floating_point, entries.stub(0x10), cs);
        route(&mut idt.alignment_check, entries.stub(0x11), cs);
        route(&mut idt.machine_check, entries.stub(0x12), cs);
        route(&mut idt.simd_floating_point, entries.stub(0x13), cs);

        for line in 0..IRQ_LINES {
            let vector = offset + line;
            route(&mut idt[vector], entries.stub(vector), cs);
        }
    }
    idt
}

#[cfg(target_os = "none")]
static LOADED: spin::Once<InterruptDescriptorTable> = spin::Once::new();

/// Moves `table` into the static the processor reads gates from and loads
/// it. The gate table is built once; a later table is dropped and the first
/// one stays loaded.
#[cfg(target_os = "none")]
pub fn load(table: InterruptDescriptorTable) {
    if LOADED.is_completed() {
        log::warn!("gate table already loaded, keeping the first one");
    }
    LOADED.call_once(|| table).load();
}

#[cfg(test)]
mod tests {
    use super::*;
    use x86_64::structures::idt::{DivergingHandlerFuncWithErrCode, PageFaultHandlerFunc};

    struct FakeStubs;

    impl EntryPoints for FakeStubs {
        fn ignore(&self) -> u64 {
            0xffff_8000_0000_0000
        }

        fn ignore_error_code(&self) -> u64 {
            0xffff_8000_0000_0010
        }

        fn stub(&self, vector: u8) -> u64 {
            0xffff_8000_1234_0000 + u64::from(vector) * 16
        }
    }

    fn addr<F>(entry: &Entry<F>) -> u64 {
        entry.handler_addr().as_u64()
    }

    #[test]
    fn build_routes_exceptions_and_irqs() {
        let idt = build(0x20, 0x08, &FakeStubs);

        assert_eq!(addr(&idt.divide_error), FakeStubs.stub(0x00));
        assert_eq!(addr(&idt.breakpoint), FakeStubs.stub(0x03));
        assert_eq!(addr(&idt.general_protection_fault), FakeStubs.stub(0x0D));
        assert_eq!(addr(&idt.page_fault), FakeStubs.stub(0x0E));
        assert_eq!(addr(&idt.simd_floating_point), FakeStubs.stub(0x13));
        for vector in 0x20..0x30 {
            assert_eq!(addr(&idt[vector]), FakeStubs.stub(vector));
        }
        for vector in [0x30, 0x80, 0xFF] {
            assert_eq!(addr(&idt[vector]), FakeStubs.ignore());
        }
        assert_eq!(addr(&idt.virtualization), FakeStubs.ignore());
        assert_eq!(addr(&idt.security_exception), FakeStubs.ignore_error_code());
    }

    #[test]
    fn gates_carry_the_given_code_segment() {
        let idt = build(0x20, 0x08, &FakeStubs);

        let mut expected = Entry::<PageFaultHandlerFunc>::missing();
        unsafe { route(&mut expected, FakeStubs.stub(0x0E), SegmentSelector(0x08)) };
        assert_eq!(idt.page_fault, expected);

        let other = build(0x20, 0x28, &FakeStubs);
        assert_ne!(other.page_fault, expected);
    }

    #[test]
    fn double_fault_runs_on_its_own_stack() {
        let idt = build(0x20, 0x08, &FakeStubs);

        let mut plain = Entry::<DivergingHandlerFuncWithErrCode>::missing();
        unsafe { route(&mut plain, FakeStubs.stub(DOUBLE_FAULT_VECTOR), SegmentSelector(0x08)) };
        let mut on_ist = Entry::<DivergingHandlerFuncWithErrCode>::missing();
        unsafe {
            route(&mut on_ist, FakeStubs.stub(DOUBLE_FAULT_VECTOR), SegmentSelector(0x08))
                .set_stack_index(DOUBLE_FAULT_IST_INDEX);
        }

        assert_eq!(idt.double_fault, on_ist);
        assert_ne!(idt.double_fault, plain);
    }

    #[test]
    fn build_follows_the_offset() {
        let idt = build(0x40, 0x08, &FakeStubs);
        assert_eq!(addr(&idt[0x20]), FakeStubs.ignore());
        assert_eq!(addr(&idt[0x40]), FakeStubs.stub(0x40));
        assert_eq!(addr(&idt[0x4F]), FakeStubs.stub(0x4F));
        assert_eq!(addr(&idt[0x50]), FakeStubs.ignore());
    }
}
