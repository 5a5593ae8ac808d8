use pic8259::ChainedPics;
use x86_64::instructions::{interrupts, port::Port};

/// Offset for the controller PIC
pub const PIC_1_OFFSET: u8 = 32;
/// Offset for the worker PIC
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Byte-wide access to I/O ports.
pub trait PortIo {
    /// read one byte from `port`
    fn inb(&mut self, port: u16) -> u8;
    /// write one byte to `port`
    fn outb(&mut self, port: u16, value: u8);
}

/// Control over the CPU interrupt flag and the interrupt controller.
pub trait InterruptControl {
    /// mask all interrupts on the CPU
    fn disable(&mut self);
    /// unmask interrupts on the CPU
    fn enable(&mut self);
    /// true while the CPU takes interrupts
    fn are_enabled(&self) -> bool;
    /// let `irq` through the interrupt controller
    fn unmask_irq(&mut self, irq: u8);
    /// stop `irq` at the interrupt controller
    fn mask_irq(&mut self, irq: u8);
    /// acknowledge `irq` at the interrupt controller
    fn end_of_interrupt(&mut self, irq: u8);

    /// Run `f` with interrupts masked, then put the interrupt flag back the way it was.
    fn without_interrupts<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        let enabled = self.are_enabled();
        if enabled {
            self.disable();
        }
        let ret = f(self);
        if enabled {
            self.enable();
        }
        ret
    }
}

/// Everything the serial driver needs from the machine.
pub trait Platform: PortIo + InterruptControl {}

impl<T: PortIo + InterruptControl> Platform for T {}

/// The real PC: x86 port instructions and a pair of chained 8259 PICs.
pub struct Pc {
    pics: ChainedPics,
}

impl Pc {
    /// Take over the machine's ports and PICs.
    ///
    /// # Safety
    /// Only one `Pc` may exist, and the PICs must be remapped to `PIC_1_OFFSET`/`PIC_2_OFFSET`.
    pub const unsafe fn new() -> Self {
        Pc {
            pics: unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) },
        }
    }

    /// remap the PICs away from the CPU exception vectors
    pub fn init_pics(&mut self) {
        unsafe { self.pics.initialize() };
    }

    fn update_masks(&mut self, irq: u8, masked: bool) {
        let [mut primary, mut secondary] = unsafe { self.pics.read_masks() };
        let (mask, bit) = if irq < 8 {
            (&mut primary, irq)
        } else {
            (&mut secondary, irq - 8)
        };
        if masked {
            *mask |= 1 << bit;
        } else {
            *mask &= !(1 << bit);
        }
        unsafe { self.pics.write_masks(primary, secondary) };
    }
}

impl PortIo for Pc {
    fn inb(&mut self, port: u16) -> u8 {
        let mut port = Port::<u8>::new(port);
        unsafe { port.read() }
    }

    fn outb(&mut self, port: u16, value: u8) {
        let mut port = Port::<u8>::new(port);
        unsafe { port.write(value) }
    }
}

impl InterruptControl for Pc {
    fn disable(&mut self) {
        interrupts::disable();
    }

    fn enable(&mut self) {
        interrupts::enable();
    }

    fn are_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    fn unmask_irq(&mut self, irq: u8) {
        self.update_masks(irq, false);
    }

    fn mask_irq(&mut self, irq: u8) {
        self.update_masks(irq, true);
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        unsafe { self.pics.notify_end_of_interrupt(PIC_1_OFFSET + irq) };
    }
}
