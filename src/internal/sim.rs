//! A simulated PC for running the driver off real hardware.
//!
//! `SimPlatform` answers port reads the way a 16550 would for the registers the driver
//! uses, remembers every port write, and records interrupt-flag and PIC activity.

use alloc::{collections::{BTreeMap, VecDeque}, vec::Vec};

use super::{
    config::MAX_DEVICES,
    io::{InterruptControl, PortIo},
    uart::{Device, InterruptCause, LineControl, LineStatus, reg},
};

/// IIR bits reporting enabled FIFOs
const FIFO_BITS: u8 = 0xC0;

/// Simulated UARTs plus a simulated interrupt controller.
#[derive(Debug)]
pub struct SimPlatform {
    registers: BTreeMap<u16, u8>,
    writes: Vec<(u16, u8)>,
    rx: [VecDeque<u8>; MAX_DEVICES],
    tx: [Vec<u8>; MAX_DEVICES],
    pending: [Option<InterruptCause>; MAX_DEVICES],
    interrupts_enabled: bool,
    masked: u16,
    acknowledged: Vec<u8>,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    /// all IRQs masked, interrupts enabled, no traffic
    pub fn new() -> Self {
        SimPlatform {
            registers: BTreeMap::new(),
            writes: Vec::new(),
            rx: Default::default(),
            tx: Default::default(),
            pending: [None; MAX_DEVICES],
            interrupts_enabled: true,
            masked: 0xFFFF,
            acknowledged: Vec::new(),
        }
    }

    fn locate(port: u16) -> Option<(Device, u16)> {
        Device::ALL
            .into_iter()
            .find(|dev| (dev.base()..dev.base() + 8).contains(&port))
            .map(|dev| (dev, port - dev.base()))
    }

    fn dlab(&self, dev: Device) -> bool {
        let lcr = self.register(dev.port(reg::LCR));
        LineControl::from_bits_truncate(lcr).contains(LineControl::DLAB)
    }

    /// queue bytes on the receive side without raising an interrupt
    pub fn feed(&mut self, dev: Device, bytes: &[u8]) {
        self.rx[dev.index()].extend(bytes.iter().copied());
    }

    /// queue one received byte and report it through the IIR
    pub fn receive(&mut self, dev: Device, byte: u8) {
        self.rx[dev.index()].push_back(byte);
        self.raise(dev, InterruptCause::DataReady);
    }

    /// make the next IIR read on `dev` report `cause`
    pub fn raise(&mut self, dev: Device, cause: InterruptCause) {
        self.pending[dev.index()] = Some(cause);
    }

    /// bytes written to the transmit register of `dev`
    pub fn transmitted(&self, dev: Device) -> &[u8] {
        &self.tx[dev.index()]
    }

    /// forget what `dev` transmitted
    pub fn clear_transmitted(&mut self, dev: Device) {
        self.tx[dev.index()].clear();
    }

    /// every port write, oldest first
    pub fn writes(&self) -> &[(u16, u8)] {
        &self.writes
    }

    /// last value written to `port`
    pub fn register(&self, port: u16) -> u8 {
        self.registers.get(&port).copied().unwrap_or(0)
    }

    /// bytes still waiting on the receive side of `dev`
    pub fn unread(&self, dev: Device) -> usize {
        self.rx[dev.index()].len()
    }

    /// state of the CPU interrupt flag
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    /// true if `irq` is masked at the PIC
    pub fn is_masked(&self, irq: u8) -> bool {
        self.masked & (1 << irq) != 0
    }

    /// IRQs acknowledged so far
    pub fn acknowledged(&self) -> &[u8] {
        &self.acknowledged
    }
}

impl PortIo for SimPlatform {
    fn inb(&mut self, port: u16) -> u8 {
        let Some((dev, offset)) = Self::locate(port) else {
            return self.register(port);
        };
        match offset {
            reg::RBR if self.dlab(dev) => self.register(port),
            reg::RBR => self.rx[dev.index()].pop_front().unwrap_or(0),
            reg::IIR => match self.pending[dev.index()].take() {
                Some(cause) => FIFO_BITS | cause.code(),
                None => FIFO_BITS | 0x01,
            },
            reg::LSR => {
                let mut status = LineStatus::THR_EMPTY | LineStatus::TRANSMITTER_EMPTY;
                if !self.rx[dev.index()].is_empty() {
                    status |= LineStatus::DATA_READY;
                }
                status.bits()
            }
            _ => self.register(port),
        }
    }

    fn outb(&mut self, port: u16, value: u8) {
        self.writes.push((port, value));
        if let Some((dev, reg::THR)) = Self::locate(port) {
            if !self.dlab(dev) {
                self.tx[dev.index()].push(value);
            }
        }
        self.registers.insert(port, value);
    }
}

impl InterruptControl for SimPlatform {
    fn disable(&mut self) {
        self.interrupts_enabled = false;
    }

    fn enable(&mut self) {
        self.interrupts_enabled = true;
    }

    fn are_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    fn unmask_irq(&mut self, irq: u8) {
        self.masked &= !(1 << irq);
    }

    fn mask_irq(&mut self, irq: u8) {
        self.masked |= 1 << irq;
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        self.acknowledged.push(irq);
    }
}
