use lazy_static::lazy_static;
use log::{trace, warn};

/// number of lines behind the two chained PICs
pub const IRQ_LINES: usize = 16;

/// Something that services a hardware interrupt line.
pub trait InterruptHandler {
    /// service `irq` and acknowledge it at the interrupt controller
    fn handle_interrupt(&mut self, irq: u8);
}

/// Table of the handlers attached to each IRQ line.
#[derive(Debug, Clone, Copy)]
pub struct IrqTable {
    handlers: [Option<fn(u8)>; IRQ_LINES],
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqTable {
    /// every line unattached
    pub const fn new() -> Self {
        IrqTable {
            handlers: [None; IRQ_LINES],
        }
    }

    /// Attach `handler` to `irq`, returning the handler it replaced.
    pub fn register(&mut self, irq: u8, handler: fn(u8)) -> Option<fn(u8)> {
        let Some(slot) = self.handlers.get_mut(irq as usize) else {
            warn!("ignoring handler for IRQ {}, out of range", irq);
            return None;
        };
        slot.replace(handler)
    }

    /// detach whatever is attached to `irq`
    pub fn unregister(&mut self, irq: u8) -> Option<fn(u8)> {
        self.handlers.get_mut(irq as usize).and_then(Option::take)
    }

    /// the handler attached to `irq`
    pub fn get(&self, irq: u8) -> Option<fn(u8)> {
        self.handlers.get(irq as usize).copied().flatten()
    }
}

lazy_static! {
    /// handlers for IRQ 0 to 15
    pub static ref IRQ_HANDLERS: spin::Mutex<IrqTable> = spin::Mutex::new(IrqTable::new());
}

/// attach `handler` to `irq`
pub fn set_irq_handler(irq: u8, handler: fn(u8)) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        IRQ_HANDLERS.lock().register(irq, handler);
    });
}

/// Run the handler attached to `irq`. Called by the interrupt stubs with interrupts disabled.
///
/// Returns false for a line nobody claimed.
pub fn dispatch_irq(irq: u8) -> bool {
    // copy the handler out so it runs without the table locked
    let handler = IRQ_HANDLERS.lock().get(irq);
    match handler {
        Some(handler) => {
            handler(irq);
            true
        }
        None => {
            trace!("spurious IRQ {}", irq);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU8, Ordering};

    static LAST: AtomicU8 = AtomicU8::new(0);

    fn record(irq: u8) {
        LAST.store(irq, Ordering::SeqCst);
    }

    fn other(_: u8) {}

    #[test]
    fn table_register_and_replace() {
        let mut table = IrqTable::new();
        assert!(table.get(4).is_none());
        assert!(table.register(4, record).is_none());
        assert!(table.get(4).is_some());
        assert!(table.register(4, other).is_some());
        assert!(table.unregister(4).is_some());
        assert!(table.get(4).is_none());
        assert!(table.register(16, record).is_none());
        assert!(table.get(16).is_none());
    }

    #[test]
    fn dispatch_runs_attached_handler() {
        IRQ_HANDLERS.lock().register(11, record);
        assert!(dispatch_irq(11));
        assert_eq!(LAST.load(Ordering::SeqCst), 11);
        assert!(!dispatch_irq(15));
        IRQ_HANDLERS.lock().unregister(11);
    }
}
