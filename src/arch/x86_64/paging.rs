// src/arch/x86_64/paging.rs
//! Address space management
//!
//! Owns the page-translation structures. The kernel and all device memory
//! live identity-mapped in the low gigabyte; exactly one large-page entry
//! (the 2 MiB analog of a classic 4 MiB program page) exposes the fixed
//! user region, and it is retargeted to a per-process physical frame on
//! every process switch.
//!
//! The boot glue hands over with the kernel image identity-mapped, so a
//! table's physical address equals its virtual address here.

use core::cell::UnsafeCell;
use x86_64::registers::control::{Cr3, Cr3Flags};
use x86_64::structures::paging::{PageTable, PageTableFlags, PhysFrame};
use x86_64::PhysAddr;

use crate::kernel::process::MAX_PROCESSES;

/// Base of the fixed user virtual region (128 MiB)
pub const USER_REGION_BASE: u64 = 0x0800_0000;
/// Size of the user region: one 2 MiB large page per process
pub const PROCESS_FRAME_SIZE: u64 = 0x0020_0000;
/// First physical frame reserved for process images (8 MiB)
pub const PROCESS_FRAME_BASE: u64 = 0x0080_0000;
/// Offset of the program load address inside the user region
pub const USER_LOAD_OFFSET: u64 = 0x4_8000;
/// Fixed virtual load address for executable images
pub const USER_LOAD_VIRT: u64 = USER_REGION_BASE + USER_LOAD_OFFSET;
/// Initial user stack pointer (top of the user region, 16-byte aligned)
pub const USER_STACK_TOP: u64 = USER_REGION_BASE + PROCESS_FRAME_SIZE - 16;
/// Fixed user-visible virtual address of the display buffer
pub const VIDMAP_BASE: u64 = 0x0840_0000;
/// Physical address of the live text display buffer
pub const VIDEO_MEM_PHYS: u64 = 0xB8000;

/// Page-directory index of the user region large page
const USER_PD_INDEX: usize = (USER_REGION_BASE >> 21) as usize;
/// Page-directory index of the display map page table
const VIDMAP_PD_INDEX: usize = (VIDMAP_BASE >> 21) as usize;
/// Index of the display page inside its 4 KiB page table
const VIDMAP_PT_INDEX: usize = ((VIDMAP_BASE >> 12) & 0x1FF) as usize;

/// A page table in static storage.
///
/// All mutation happens with external interrupts masked on a single CPU,
/// so the cell is never aliased mid-update.
#[repr(transparent)]
struct StaticPageTable(UnsafeCell<PageTable>);

// Single CPU; mutated only inside interrupt-masked sections.
unsafe impl Sync for StaticPageTable {}

impl StaticPageTable {
    const fn new() -> Self {
        Self(UnsafeCell::new(PageTable::new()))
    }

    /// Physical address of the table (identity-mapped kernel image).
    fn phys(&self) -> PhysAddr {
        PhysAddr::new(self.0.get() as u64)
    }
}

static PML4: StaticPageTable = StaticPageTable::new();
static PDPT: StaticPageTable = StaticPageTable::new();
static PD: StaticPageTable = StaticPageTable::new();
static VIDMAP_PT: StaticPageTable = StaticPageTable::new();

/// Physical frame backing a process slot's user page.
#[must_use]
pub const fn process_frame(slot: usize) -> u64 {
    PROCESS_FRAME_BASE + (slot as u64) * PROCESS_FRAME_SIZE
}

/// Whether `[addr, addr + len)` lies inside the permitted user window.
#[must_use]
pub const fn user_window_contains(addr: u64, len: u64) -> bool {
    if addr < USER_REGION_BASE {
        return false;
    }
    match addr.checked_add(len) {
        Some(end) => end <= USER_REGION_BASE + PROCESS_FRAME_SIZE,
        None => false,
    }
}

/// Build the kernel translation structures and install them.
///
/// Identity-maps the low gigabyte with 2 MiB kernel pages, leaves the
/// user-region entry for [`map_process`], and carries over any
/// higher-half entries of the boot tables (256..512) so the handover
/// environment keeps working.
///
/// # Safety
///
/// Must be called exactly once during bring-up, before the first
/// `map_process`, with the kernel image identity-mapped.
pub unsafe fn init() {
    let pml4 = unsafe { &mut *PML4.0.get() };
    let pdpt = unsafe { &mut *PDPT.0.get() };
    let pd = unsafe { &mut *PD.0.get() };

    let kernel_flags =
        PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::HUGE_PAGE;
    for i in 0..512 {
        pd[i].set_addr(PhysAddr::new((i as u64) << 21), kernel_flags);
    }

    // Parent entries are user-accessible; protection is enforced at the
    // page-directory level (kernel identity entries stay supervisor-only).
    let branch_flags =
        PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
    pdpt[0].set_addr(PD.phys(), branch_flags);
    pml4[0].set_addr(PDPT.phys(), branch_flags);

    // Keep the boot environment's kernel-space mappings alive.
    let (boot_frame, _) = Cr3::read();
    let boot_pml4 = unsafe { &*(boot_frame.start_address().as_u64() as *const PageTable) };
    for i in 256..512 {
        pml4[i] = boot_pml4[i].clone();
    }

    let frame = PhysFrame::containing_address(PML4.phys());
    unsafe {
        Cr3::write(frame, Cr3Flags::empty());
    }
}

/// Retarget the user region at the physical frame reserved for `slot`.
///
/// Installs a present/writable/user-accessible large page and flushes
/// stale translations. Must run before any user-mode instruction of the
/// newly selected process executes. Caller guarantees slot validity.
pub fn map_process(slot: usize) {
    debug_assert!(slot < MAX_PROCESSES);
    let flags = PageTableFlags::PRESENT
        | PageTableFlags::WRITABLE
        | PageTableFlags::USER_ACCESSIBLE
        | PageTableFlags::HUGE_PAGE;
    let pd = unsafe { &mut *PD.0.get() };
    pd[USER_PD_INDEX].set_addr(PhysAddr::new(process_frame(slot)), flags);
    x86_64::instructions::tlb::flush_all();
}

/// Expose the live display buffer to user mode at [`VIDMAP_BASE`].
///
/// The active terminal owns the live buffer, so this always maps the
/// buffer the current foreground process is entitled to see. Returns the
/// fixed user virtual address. Pointer validation against the user window
/// is the caller's job ([`user_window_contains`]).
pub fn map_display_for_user() -> u64 {
    let user_flags =
        PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
    let pt = unsafe { &mut *VIDMAP_PT.0.get() };
    pt[VIDMAP_PT_INDEX].set_addr(PhysAddr::new(VIDEO_MEM_PHYS), user_flags);
    let pd = unsafe { &mut *PD.0.get() };
    pd[VIDMAP_PD_INDEX].set_addr(VIDMAP_PT.phys(), user_flags);
    x86_64::instructions::tlb::flush_all();
    VIDMAP_BASE
}
