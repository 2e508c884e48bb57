// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! BCM2837 Mini UART Driver
//!
//! The auxiliary UART1, clocked from the core clock. 8N1 at 115200 baud on
//! GPIO 14/15 (alt5). The register window is the AUX block, so the same
//! offsets apply through the physical address and through the fixmap.
//!
//! # Register Map
//!
//! | Offset | Name         | Description                 |
//! |--------|--------------|-----------------------------|
//! | 0x04   | AUX_ENABLES  | Auxiliary peripheral enable |
//! | 0x40   | AUX_MU_IO    | Data                        |
//! | 0x44   | AUX_MU_IER   | Interrupt enable            |
//! | 0x48   | AUX_MU_IIR   | Interrupt identify / FIFO   |
//! | 0x4C   | AUX_MU_LCR   | Line control                |
//! | 0x50   | AUX_MU_MCR   | Modem control               |
//! | 0x54   | AUX_MU_LSR   | Line status                 |
//! | 0x60   | AUX_MU_CNTL  | Extra control               |
//! | 0x68   | AUX_MU_BAUD  | Baud rate counter           |

use super::SerialConsole;
use crate::kernel::dev::gpio::{Gpio, PinFunction};
use crate::platform::SYSTEM_CLOCK_HZ;
use crate::reg::{read_reg32, write_reg32};

// ============================================================================
// Register Offsets
// ============================================================================

const AUX_ENABLES: usize = 0x04;
const AUX_MU_IO: usize = 0x40;
const AUX_MU_IER: usize = 0x44;
const AUX_MU_IIR: usize = 0x48;
const AUX_MU_LCR: usize = 0x4C;
const AUX_MU_MCR: usize = 0x50;
const AUX_MU_LSR: usize = 0x54;
const AUX_MU_CNTL: usize = 0x60;
const AUX_MU_BAUD: usize = 0x68;

// ============================================================================
// Register Bits
// ============================================================================

const AUX_ENABLE_MINI_UART: u32 = 1 << 0;
const LCR_8BIT: u32 = 0b11;
/// Clear both FIFOs
const IIR_FIFO_CLEAR: u32 = 0xC6;
const CNTL_TX_RX_ENABLE: u32 = 0b11;
const LSR_DATA_READY: u32 = 1 << 0;
const LSR_TX_EMPTY: u32 = 1 << 5;

pub const BAUD_RATE: u32 = 115_200;

/// AUX_MU_BAUD value for `baud` with the core running at `clock`.
pub const fn baud_divisor(clock: u32, baud: u32) -> u32 {
    clock / (baud * 8) - 1
}

pub struct MiniUart {
    base: usize,
}

impl MiniUart {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Enable UART1, 8N1 at [`BAUD_RATE`], interrupts off.
    ///
    /// # Safety
    ///
    /// Both register windows must be mapped.
    pub unsafe fn init(&mut self, gpio: &Gpio) {
        write_reg32(self.base + AUX_ENABLES, AUX_ENABLE_MINI_UART);
        write_reg32(self.base + AUX_MU_CNTL, 0);
        write_reg32(self.base + AUX_MU_LCR, LCR_8BIT);
        write_reg32(self.base + AUX_MU_MCR, 0);
        write_reg32(self.base + AUX_MU_IER, 0);
        write_reg32(self.base + AUX_MU_IIR, IIR_FIFO_CLEAR);
        write_reg32(self.base + AUX_MU_BAUD, baud_divisor(SYSTEM_CLOCK_HZ, BAUD_RATE));

        gpio.setup_uart_pins(PinFunction::Alt5);

        write_reg32(self.base + AUX_MU_CNTL, CNTL_TX_RX_ENABLE);
    }
}

impl SerialConsole for MiniUart {
    fn putc(&mut self, c: u8) {
        unsafe {
            while read_reg32(self.base + AUX_MU_LSR) & LSR_TX_EMPTY == 0 {
                core::hint::spin_loop();
            }
            write_reg32(self.base + AUX_MU_IO, c as u32);
        }
    }

    fn try_getc(&mut self) -> Option<u8> {
        unsafe {
            if read_reg32(self.base + AUX_MU_LSR) & LSR_DATA_READY != 0 {
                Some(read_reg32(self.base + AUX_MU_IO) as u8)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::dev::testing::FakeRegisters;

    #[test]
    fn test_baud_divisor() {
        assert_eq!(baud_divisor(SYSTEM_CLOCK_HZ, BAUD_RATE), 270);
    }

    #[test]
    fn test_init_programs_uart() {
        let aux = FakeRegisters::new();
        let gpio_regs = FakeRegisters::new();
        let mut uart = MiniUart::new(aux.base());
        unsafe { uart.init(&Gpio::new(gpio_regs.base())) };

        assert_eq!(aux.get(AUX_ENABLES), 1);
        assert_eq!(aux.get(AUX_MU_LCR), 3);
        assert_eq!(aux.get(AUX_MU_IIR), 0xC6);
        assert_eq!(aux.get(AUX_MU_BAUD), 270);
        assert_eq!(aux.get(AUX_MU_CNTL), 3);
        assert_eq!(gpio_regs.get(0x04), (2 << 12) | (2 << 15));
    }

    #[test]
    fn test_putc_and_getc() {
        let mut aux = FakeRegisters::new();
        let mut uart = MiniUart::new(aux.base());
        assert_eq!(uart.try_getc(), None);

        aux.set(AUX_MU_LSR, LSR_TX_EMPTY | LSR_DATA_READY);
        aux.set(AUX_MU_IO, b'k' as u32);
        assert_eq!(uart.getc(), b'k');

        uart.putc(b'!');
        assert_eq!(aux.get(AUX_MU_IO), b'!' as u32);
    }
}
