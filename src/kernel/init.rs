// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hypervisor Initialization
//!
//! Two entry points, one on each side of the MMU switch:
//!
//! - [`arm64_boot_main`] is called by `start.S` on the physical boot stack
//!   with the MMU off. It brings up the mini UART at its physical address,
//!   runs the boot sequencer and never returns.
//! - [`hyp_main`] is entered at EL2 through the hypervisor virtual map on
//!   the virtual boot stack. It installs the logger and serves the console.
//!
//! Until the MMU is on the image runs away from its link address, so the
//! first half sticks to PC-relative code: no trait objects, no `core::fmt`,
//! no statics holding pointers.

use core::ptr::{addr_of, addr_of_mut};

use crate::err::{BootError, Result};
use crate::kernel::arch::arm64::boot::{boot_fixmap_slots, boot_ranges, BootArgs, BootSequencer};
use crate::kernel::arch::arm64::boot_mmu::{TableArena, BOOT_TABLE_COUNT};
use crate::kernel::arch::arm64::fixmap::{early_uart_virtual_address, FixmapDevice};
use crate::kernel::arch::arm64::halt;
use crate::kernel::arch::arm64::mmu::PageTable;
use crate::kernel::arch::arm64::sysreg::{Arm64Registers, SystemRegisters};
use crate::kernel::config::{ConsoleKind, BOOT_CONFIG};
use crate::kernel::debug;
use crate::kernel::dev::gpio::Gpio;
use crate::kernel::dev::uart::{EarlyConsole, MiniUart, Pl011, SerialConsole};
use crate::kernel::vm::layout::{region_of, RegionName, BOOT_STACK_VIRT_START, STACK_SIZE};
use crate::kernel::vm::PAddr;
use crate::platform::{AUX_BASE, GPIO_BASE};

// ============================================================================
// Boot Storage
// ============================================================================

// start.S sets SP from its own copy of the size
const _: () = assert!(STACK_SIZE == 0x4000);

#[repr(C, align(4096))]
pub struct BootStack([u8; STACK_SIZE as usize]);

/// Stack used from reset until the hypervisor runs; `start.S` points SP at
/// its end.
#[no_mangle]
static mut BOOT_STACK: BootStack = BootStack([0; STACK_SIZE as usize]);

const EMPTY_TABLE: PageTable = PageTable::new();

static mut BOOT_TABLES: [PageTable; BOOT_TABLE_COUNT] = [EMPTY_TABLE; BOOT_TABLE_COUNT];

// ============================================================================
// Physical Entry
// ============================================================================

/// # Safety
///
/// Only `start.S` calls this, once, on the boot core with the MMU off.
#[no_mangle]
pub unsafe extern "C" fn arm64_boot_main(boot_phys_offset: u64, fdt_paddr: u64) -> ! {
    let args = BootArgs::new(boot_phys_offset, fdt_paddr);

    let gpio = Gpio::new(GPIO_BASE as usize);
    let mut uart = MiniUart::new(AUX_BASE as usize);
    uart.init(&gpio);
    uart.puts("rustux-hyp: building boot tables\n");

    if let Err(err) = bring_up(&args) {
        halt_with(&mut uart, &err);
    }
    halt()
}

/// Runs the sequencer to the point of no return. Only comes back on error.
unsafe fn bring_up(args: &BootArgs) -> Result {
    // PC-relative, so these are physical addresses while the MMU is off
    let tables = &mut *addr_of_mut!(BOOT_TABLES);
    let stack_phys = addr_of!(BOOT_STACK) as PAddr;
    let entry = args.phys_to_virt(hyp_main as usize as PAddr);

    let mut seq = BootSequencer::new(Arm64Registers, TableArena::new(tables), &BOOT_CONFIG)?;
    seq.build_tables(&boot_ranges(args, stack_phys))?;
    seq.populate_fixmap(&boot_fixmap_slots())?;
    seq.enable_mmu()?;
    seq.enter_target_level(entry, BOOT_STACK_VIRT_START + STACK_SIZE, args)?;
    Ok(())
}

/// Print the failing check as raw hex and park the core.
fn halt_with(uart: &mut MiniUart, err: &BootError) -> ! {
    uart.puts("rustux-hyp: ");
    debug::report_failure(uart, err);
    halt()
}

// ============================================================================
// Virtual Entry
// ============================================================================

/// Runs at EL2 on the virtual boot stack with translation and caches on.
extern "C" fn hyp_main(boot_phys_offset: u64, fdt_paddr: u64) -> ! {
    let args = BootArgs::new(boot_phys_offset, fdt_paddr);

    let console = match BOOT_CONFIG.console {
        ConsoleKind::MiniUart => EarlyConsole::MiniUart(MiniUart::new(early_uart_virtual_address() as usize)),
        ConsoleKind::Pl011 => {
            let gpio = Gpio::new(FixmapDevice::Gpio.virtual_base() as usize);
            let mut uart = Pl011::new(FixmapDevice::Pl011.virtual_base() as usize);
            unsafe { uart.init(&gpio) };
            EarlyConsole::Pl011(uart)
        }
    };
    debug::init(console, BOOT_CONFIG.log_level, BOOT_CONFIG.use_colors);

    log::info!("rustux-hyp running at {:?}", Arm64Registers.current_el());
    log::info!(
        "boot_phys_offset {:#x}, fdt at {:#x}",
        args.boot_phys_offset,
        args.fdt_paddr
    );
    for name in RegionName::ALL {
        let region = region_of(name);
        log::info!("{:<10} {:#x}..{:#x}", name.as_str(), region.base, region.end());
    }

    let root = args.virt_to_phys(unsafe { addr_of!(BOOT_TABLES) } as u64);
    log::debug!("translation root {:#x}", root);
    for device in FixmapDevice::ALL {
        log::debug!(
            "fixmap slot {} {} {:#x} -> {:#x}",
            device.slot(),
            device.name(),
            device.phys_base(),
            device.virtual_base()
        );
    }

    loop {
        debug::with_console(|console| {
            if let Some(c) = console.try_getc() {
                console.putc(c);
            }
        });
    }
}
