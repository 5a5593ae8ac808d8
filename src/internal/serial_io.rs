use alloc::vec::Vec;
use log::{debug, trace, warn};

use super::{
    config::{Config, MAX_DEVICES},
    interrupts::InterruptHandler,
    io::{Platform, PortIo},
    memory::{Block, MemoryAllocator},
    process::PcbHandle,
    uart::{self, Device, InterruptCause, InterruptEnable, ModemControl, SerialError, Uart, reg},
};

/// whether a device control block is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    /// not in use
    Closed,
    /// opened and receiving interrupts
    Open,
}

/// operation in progress on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// nothing in flight
    Idle,
    /// a read is waiting for input
    Read,
    /// a write is being transmitted
    Write,
}

/// A request the interrupt handlers finish on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iocb {
    /// process waiting for the request, if any
    pub process: Option<PcbHandle>,
    /// READ: bytes received by the input handler; WRITE: bytes to send
    pub data: Vec<u8>,
    /// READ: bytes still wanted; WRITE: total bytes
    pub length: usize,
    /// bytes moved so far
    pub transferred: usize,
    /// READ or WRITE
    pub operation: Operation,
}

/// a finished request, collected in process context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// the device that signalled
    pub device: Device,
    /// the request the handlers finished, `None` when it completed synchronously
    pub request: Option<Iocb>,
}

/// Per-line driver state: status, current operation, input ring and pending request.
#[derive(Debug)]
pub struct Dcb {
    device: Device,
    status: PortStatus,
    event: bool,
    operation: Operation,
    ring: Option<Block>,
    capacity: usize,
    start: usize,
    end: usize,
    buffered: usize,
    iocb: Option<Iocb>,
}

impl Dcb {
    fn closed(device: Device) -> Self {
        Dcb {
            device,
            status: PortStatus::Closed,
            event: false,
            operation: Operation::Idle,
            ring: None,
            capacity: 0,
            start: 0,
            end: 0,
            buffered: 0,
            iocb: None,
        }
    }

    /// the serial line this block drives
    pub fn device(&self) -> Device {
        self.device
    }

    /// open or closed
    pub fn status(&self) -> PortStatus {
        self.status
    }

    /// operation in progress
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// completion flag
    pub fn event(&self) -> bool {
        self.event
    }

    /// bytes waiting in the ring buffer
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// the pending request, if any
    pub fn iocb(&self) -> Option<&Iocb> {
        self.iocb.as_ref()
    }

    fn push(&mut self, byte: u8) -> bool {
        let Some(ring) = self.ring.as_mut() else {
            return false;
        };
        if self.buffered >= self.capacity {
            return false;
        }
        ring.as_mut_slice()[self.end] = byte;
        self.end = (self.end + 1) % self.capacity;
        self.buffered += 1;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        let ring = self.ring.as_ref()?;
        if self.buffered == 0 {
            return None;
        }
        let byte = ring.as_slice()[self.start];
        self.start = (self.start + 1) % self.capacity;
        self.buffered -= 1;
        Some(byte)
    }

    fn complete(&mut self) {
        self.operation = Operation::Idle;
        self.event = true;
    }

    /// A byte arrived. Outside a READ it is buffered; during a READ a carriage return is
    /// swallowed and anything else finishes the request.
    fn on_input<P: PortIo>(&mut self, ports: &mut P) {
        let byte = ports.inb(self.device.port(reg::RBR));
        if self.operation != Operation::Read {
            if !self.push(byte) {
                warn!("{:?}: ring buffer full, dropping {:#04x}", self.device, byte);
            }
            return;
        }
        if byte == b'\r' {
            return;
        }
        if let Some(iocb) = self.iocb.as_mut() {
            if iocb.data.len() < iocb.data.capacity() {
                iocb.data.push(byte);
                iocb.transferred += 1;
            }
        }
        self.complete();
    }

    /// The transmitter drained. Send the next byte of a WRITE, or finish it after the last one.
    fn on_output<P: PortIo>(&mut self, ports: &mut P) {
        if self.operation != Operation::Write {
            return;
        }
        if let Some(iocb) = self.iocb.as_mut() {
            if iocb.transferred < iocb.data.len() {
                ports.outb(self.device.port(reg::THR), iocb.data[iocb.transferred]);
                iocb.transferred += 1;
            }
            if iocb.transferred < iocb.data.len() {
                return;
            }
        }
        self.complete();
        let ier = InterruptEnable::from_bits_truncate(ports.inb(self.device.port(reg::IER)));
        ports.outb(self.device.port(reg::IER), (ier - InterruptEnable::TRANSMIT_EMPTY).bits());
    }
}

/// Interrupt-driven serial I/O over up to four lines.
pub struct SerialIo<P: Platform, A: MemoryAllocator> {
    platform: P,
    allocator: A,
    config: Config,
    uart: Uart,
    dcbs: [Dcb; MAX_DEVICES],
}

impl<P: Platform, A: MemoryAllocator> SerialIo<P, A> {
    /// driver with the kernel's default sizes
    pub fn new(platform: P, allocator: A) -> Self {
        Self::with_config(platform, allocator, Config::default())
    }

    /// driver with custom ring and write sizes
    pub fn with_config(platform: P, allocator: A, config: Config) -> Self {
        SerialIo {
            platform,
            allocator,
            config,
            uart: Uart::new(),
            dcbs: Device::ALL.map(Dcb::closed),
        }
    }

    /// the machine underneath
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// the machine underneath, mutably
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// the open control block of `dev`
    pub fn dcb(&self, dev: Device) -> Option<&Dcb> {
        self.dcbs
            .iter()
            .find(|dcb| dcb.status == PortStatus::Open && dcb.device == dev)
    }

    fn dcb_mut(&mut self, dev: Device) -> Option<&mut Dcb> {
        self.dcbs
            .iter_mut()
            .find(|dcb| dcb.status == PortStatus::Open && dcb.device == dev)
    }

    /// open or closed
    pub fn status(&self, dev: Device) -> PortStatus {
        self.dcb(dev).map_or(PortStatus::Closed, Dcb::status)
    }

    /// Open `dev` at `baud_rate` and start taking its interrupts.
    ///
    /// Re-opening an open line only reprograms the baud rate.
    pub fn open(&mut self, dev: Device, baud_rate: i32) -> Result<(), SerialError> {
        let div = uart::divisor(baud_rate)?;
        self.uart.init(&mut self.platform, dev);

        if self.dcb(dev).is_none() {
            let slot = self
                .dcbs
                .iter()
                .position(|dcb| dcb.status == PortStatus::Closed)
                .ok_or(SerialError::NoFreeSlot)?;
            let ring = self
                .allocator
                .alloc(self.config.ring_buffer_size)
                .ok_or(SerialError::AllocationFailure)?;
            let capacity = self.config.ring_capacity().min(ring.len());

            let dcb = &mut self.dcbs[slot];
            *dcb = Dcb::closed(dev);
            dcb.status = PortStatus::Open;
            dcb.ring = Some(ring);
            dcb.capacity = capacity;
        }

        uart::set_divisor(&mut self.platform, dev, div);

        self.platform.without_interrupts(|pc| pc.unmask_irq(dev.irq()));

        self.platform.outb(dev.port(reg::MCR), ModemControl::OUT2.bits());
        self.platform.outb(dev.port(reg::IER), InterruptEnable::DATA_READY.bits());
        let sources = InterruptEnable::DATA_READY | InterruptEnable::TRANSMIT_EMPTY;
        self.platform.outb(dev.port(reg::IER), sources.bits());

        debug!("opened {:?} at {} baud (divisor {})", dev, baud_rate, div);
        Ok(())
    }

    /// Close `dev`, releasing its ring buffer.
    ///
    /// A request still pending is discarded and handed back so its owner can be released.
    pub fn close(&mut self, dev: Device) -> Result<Option<Iocb>, SerialError> {
        let dcb = self.dcb_mut(dev).ok_or(SerialError::AlreadyClosed)?;
        let pending = dcb.iocb.take();
        if let Some(iocb) = &pending {
            warn!("{:?}: closing with a pending {:?}", dev, iocb.operation);
        }
        let ring = dcb.ring.take();
        *dcb = Dcb::closed(dev);
        if let Some(ring) = ring {
            self.allocator.free(ring);
        }

        let shared = self.dcbs.iter().any(|other| {
            other.status == PortStatus::Open && other.device.irq() == dev.irq()
        });
        if !shared {
            self.platform.without_interrupts(|pc| pc.mask_irq(dev.irq()));
        }

        self.platform.outb(dev.port(reg::IER), 0x00);
        self.platform.outb(dev.port(reg::MSR), 0x00);

        debug!("closed {:?}", dev);
        Ok(pending)
    }

    /// Read buffered input into `buf`.
    ///
    /// Bytes already in the ring are copied up to a newline or a NUL. If that does not
    /// finish the request, the rest is left to the input handler and `process` is recorded
    /// as its owner. Returns the bytes copied now.
    pub fn read(
        &mut self,
        dev: Device,
        buf: &mut [u8],
        process: Option<PcbHandle>,
    ) -> Result<usize, SerialError> {
        let dcb = self.dcb_mut(dev).ok_or(SerialError::DeviceNotOpen)?;
        if buf.is_empty() {
            return Err(SerialError::InvalidArgument);
        }
        if dcb.operation != Operation::Idle {
            return Err(SerialError::DeviceBusy);
        }

        dcb.operation = Operation::Read;
        dcb.event = false;

        let mut n = 0;
        let mut terminated = false;
        while n < buf.len() {
            let Some(byte) = dcb.pop() else {
                break;
            };
            if byte == 0 {
                terminated = true;
                break;
            }
            buf[n] = byte;
            n += 1;
            if byte == b'\n' {
                terminated = true;
                break;
            }
        }

        if n < buf.len() && !terminated {
            let remaining = buf.len() - n;
            trace!("{:?}: {} bytes read, {} pending", dev, n, remaining);
            dcb.iocb = Some(Iocb {
                process,
                data: Vec::with_capacity(remaining),
                length: remaining,
                transferred: n,
                operation: Operation::Read,
            });
        } else {
            dcb.complete();
        }
        Ok(n)
    }

    /// Start transmitting `bytes`: the first goes out now, the output handler sends the rest.
    pub fn write(
        &mut self,
        dev: Device,
        bytes: &[u8],
        process: Option<PcbHandle>,
    ) -> Result<(), SerialError> {
        let max = self.config.max_write_len;
        let dcb = self.dcb_mut(dev).ok_or(SerialError::DeviceNotOpen)?;
        if bytes.is_empty() {
            return Err(SerialError::InvalidArgument);
        }
        if bytes.len() > max {
            return Err(SerialError::InvalidLength);
        }
        if dcb.operation != Operation::Idle {
            return Err(SerialError::DeviceBusy);
        }

        dcb.event = false;
        dcb.operation = Operation::Write;
        dcb.iocb = Some(Iocb {
            process,
            data: bytes.to_vec(),
            length: bytes.len(),
            transferred: 1,
            operation: Operation::Write,
        });

        self.platform.outb(dev.port(reg::THR), bytes[0]);
        let ier = InterruptEnable::from_bits_truncate(self.platform.inb(dev.port(reg::IER)));
        self.platform
            .outb(dev.port(reg::IER), (ier | InterruptEnable::TRANSMIT_EMPTY).bits());
        Ok(())
    }

    /// Read and clear the completion flag of `dev`.
    pub fn take_event(&mut self, dev: Device) -> bool {
        self.dcb_mut(dev)
            .map(|dcb| core::mem::take(&mut dcb.event))
            .unwrap_or(false)
    }

    /// Collect the finished request of `dev`, clearing its completion flag.
    pub fn take_completion(&mut self, dev: Device) -> Option<Completion> {
        let dcb = self.dcb_mut(dev)?;
        if !dcb.event || dcb.operation != Operation::Idle {
            return None;
        }
        dcb.event = false;
        Some(Completion {
            device: dev,
            request: dcb.iocb.take(),
        })
    }

    /// input handler entry point for `dev`
    pub fn input_interrupt(&mut self, dev: Device) {
        let Self { platform, dcbs, .. } = self;
        let open = |d: &&mut Dcb| d.status == PortStatus::Open && d.device == dev;
        if let Some(dcb) = dcbs.iter_mut().find(open) {
            dcb.on_input(platform);
        }
    }

    /// output handler entry point for `dev`
    pub fn output_interrupt(&mut self, dev: Device) {
        let Self { platform, dcbs, .. } = self;
        let open = |d: &&mut Dcb| d.status == PortStatus::Open && d.device == dev;
        if let Some(dcb) = dcbs.iter_mut().find(open) {
            dcb.on_output(platform);
        }
    }

    /// console line input, see `Uart::poll`
    pub fn poll(&mut self, dev: Device, buf: &mut [u8]) -> Result<usize, SerialError> {
        self.uart.poll(&mut self.platform, dev, buf)
    }

    /// raw output, see `Uart::out`
    pub fn out(&mut self, dev: Device, bytes: &[u8]) -> Result<usize, SerialError> {
        self.uart.out(&mut self.platform, dev, bytes)
    }
}

impl<P: Platform, A: MemoryAllocator> InterruptHandler for SerialIo<P, A> {
    /// Service every open line that reports a pending cause, then acknowledge `irq`.
    fn handle_interrupt(&mut self, irq: u8) {
        let Self { platform, dcbs, .. } = self;
        platform.without_interrupts(|ports| {
            for dcb in dcbs.iter_mut().filter(|dcb| dcb.status == PortStatus::Open) {
                let iir = ports.inb(dcb.device.port(reg::IIR));
                match InterruptCause::decode(iir) {
                    Some(InterruptCause::TransmitEmpty) => dcb.on_output(ports),
                    Some(InterruptCause::DataReady | InterruptCause::CharacterTimeout) => {
                        dcb.on_input(ports)
                    }
                    Some(InterruptCause::LineStatus) => {
                        let _ = ports.inb(dcb.device.port(reg::LSR));
                    }
                    Some(InterruptCause::ModemStatus) => {
                        let _ = ports.inb(dcb.device.port(reg::MSR));
                    }
                    None => {}
                }
            }
            ports.end_of_interrupt(irq);
        });
    }
}
