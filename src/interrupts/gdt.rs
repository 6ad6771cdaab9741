// gdt.rs
use spin::Lazy;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

use crate::task::SegmentSelectors;

/// TSS stack slot used by the double fault gate.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 4;

static mut DOUBLE_FAULT_STACK: [u8; DOUBLE_FAULT_STACK_SIZE] = [0; DOUBLE_FAULT_STACK_SIZE];

static TSS: Lazy<TaskStateSegment> = Lazy::new(|| {
    let mut tss = TaskStateSegment::new();

    tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
        let stack_start = unsafe { core::ptr::addr_of!(DOUBLE_FAULT_STACK) as u64 };
        VirtAddr::new(stack_start + DOUBLE_FAULT_STACK_SIZE as u64)
    };

    tss
});

struct Selectors {
    code_selector: SegmentSelector,
    data_selector: SegmentSelector,
    tss_selector: SegmentSelector,
}

static GDT: Lazy<(GlobalDescriptorTable, Selectors)> = Lazy::new(|| {
    let mut gdt = GlobalDescriptorTable::new();

    let code_selector = gdt.append(Descriptor::kernel_code_segment());
    let data_selector = gdt.append(Descriptor::kernel_data_segment());
    let tss_selector = gdt.append(Descriptor::tss_segment(&TSS));

    (
        gdt,
        Selectors {
            code_selector,
            data_selector,
            tss_selector,
        },
    )
});

/// Loads the kernel GDT and TSS and reloads the segment registers.
///
/// Returns the selectors that task contexts and interrupt gates run with.
#[cfg(target_os = "none")]
pub fn init() -> SegmentSelectors {
    let (ref gdt, ref selectors) = *GDT;
    gdt.load();

    unsafe {
        use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};

        CS::set_reg(selectors.code_selector);
        DS::set_reg(selectors.data_selector);
        ES::set_reg(selectors.data_selector);
        SS::set_reg(selectors.data_selector);

        x86_64::instructions::tables::load_tss(selectors.tss_selector);
    }

    kernel_selectors()
}

/// Selectors of the kernel code and data segments, without loading anything.
pub fn kernel_selectors() -> SegmentSelectors {
    let (_, ref selectors) = *GDT;
    SegmentSelectors {
        code: selectors.code_selector.0,
        stack: selectors.data_selector.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_segments_follow_the_null_descriptor() {
        let selectors = kernel_selectors();
        assert_eq!(selectors.code, 0x08);
        assert_eq!(selectors.stack, 0x10);
    }
}
