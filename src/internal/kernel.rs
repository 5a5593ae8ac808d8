use alloc::vec::Vec;

use log::{debug, warn};

use super::{
    config::Config,
    context::Context,
    io::Platform,
    memory::MemoryAllocator,
    process::{PcbHandle, Scheduler},
    serial_io::{Completion, Iocb, Operation, SerialIo},
    syscall,
    uart::{Device, SerialError},
};

/// The scheduler and the serial driver, sharing one allocator.
pub struct Kernel<P: Platform, A: MemoryAllocator + Clone> {
    scheduler: Scheduler<A>,
    serial: SerialIo<P, A>,
    /// finished reads, held until their owner collects the bytes
    finished: Vec<Completion>,
}

fn status(result: Result<usize, SerialError>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(err) => {
            warn!("serial request failed: {}", err);
            err.as_errno()
        }
    }
}

impl<P: Platform, A: MemoryAllocator + Clone> Kernel<P, A> {
    /// kernel with the default sizes
    pub fn new(platform: P, allocator: A) -> Self {
        Self::with_config(platform, allocator, Config::default())
    }

    /// kernel with custom stack and buffer sizes
    pub fn with_config(platform: P, allocator: A, config: Config) -> Self {
        Kernel {
            scheduler: Scheduler::with_config(allocator.clone(), config),
            serial: SerialIo::with_config(platform, allocator, config),
            finished: Vec::new(),
        }
    }

    /// the process queues
    pub fn scheduler(&self) -> &Scheduler<A> {
        &self.scheduler
    }

    /// the process queues, mutably
    pub fn scheduler_mut(&mut self) -> &mut Scheduler<A> {
        &mut self.scheduler
    }

    /// the serial driver
    pub fn serial(&self) -> &SerialIo<P, A> {
        &self.serial
    }

    /// the serial driver, mutably
    pub fn serial_mut(&mut self) -> &mut SerialIo<P, A> {
        &mut self.serial
    }

    /// System-call entry: finish any I/O the interrupt handlers completed, then dispatch.
    pub fn sys_call(&mut self, ctx: Context) -> Context {
        self.complete_io();
        syscall::dispatch(&mut self.scheduler, ctx)
    }

    /// Collect completed serial requests and release the processes waiting on them.
    ///
    /// A blocked owner goes back to the ready queue; a suspended one is resumed as well.
    /// Finished reads stay with the kernel until their owner picks them up with
    /// [`Kernel::sys_collect`]. Returns the number of completions collected.
    pub fn complete_io(&mut self) -> usize {
        let mut collected = 0;
        for dev in Device::ALL {
            let Some(done) = self.serial.take_completion(dev) else {
                continue;
            };
            collected += 1;
            debug!("{:?}: request complete", dev);
            let keep = match &done.request {
                Some(iocb) => {
                    self.release(iocb);
                    iocb.operation == Operation::Read && iocb.process.is_some()
                }
                None => false,
            };
            if keep {
                self.finished.push(done);
            }
        }
        let scheduler = &self.scheduler;
        self.finished.retain(|done| {
            let owner = done.request.as_ref().and_then(|iocb| iocb.process);
            owner.is_some_and(|p| scheduler.get(p).is_some())
        });
        collected
    }

    fn release(&mut self, iocb: &Iocb) {
        let Some(owner) = iocb.process else {
            return;
        };
        if self.scheduler.get(owner).is_none() {
            warn!("completed request belongs to a process that no longer exists");
            return;
        }
        match self.scheduler.wake(owner) {
            Ok(true) => debug!("{:?} released", owner),
            Ok(false) => {}
            Err(err) => warn!("could not release waiting process: {}", err),
        }
    }

    fn owner(&self) -> Option<PcbHandle> {
        self.scheduler.current()
    }

    /// Block the running process while its request on `dev` is in flight.
    fn wait_on(&mut self, dev: Device) {
        let pending = self
            .serial
            .dcb(dev)
            .is_some_and(|dcb| dcb.operation() != Operation::Idle);
        if !pending || self.owner().is_none() {
            return;
        }
        if let Err(err) = self.scheduler.block_current() {
            warn!("could not block waiting process: {}", err);
        }
    }

    /// open the line at `port`; 0 or a negative status
    pub fn sys_open(&mut self, port: u16, baud_rate: i32) -> isize {
        let opened = Device::try_from(port).and_then(|dev| self.serial.open(dev, baud_rate));
        status(opened.map(|()| 0))
    }

    /// close the line at `port`, releasing whoever waited on it; 0 or a negative status
    pub fn sys_close(&mut self, port: u16) -> isize {
        let closed = Device::try_from(port).and_then(|dev| self.serial.close(dev));
        match closed {
            Ok(pending) => {
                if let Some(iocb) = pending {
                    self.release(&iocb);
                }
                0
            }
            Err(err) => status(Err(err)),
        }
    }

    /// Read from the line at `port`; bytes read now or a negative status.
    ///
    /// When the read cannot finish from buffered input the caller is blocked until the
    /// rest arrives, then fetches it with [`Kernel::sys_collect`].
    pub fn sys_read(&mut self, port: u16, buf: &mut [u8]) -> isize {
        let owner = self.owner();
        let read = Device::try_from(port)
            .and_then(|dev| self.serial.read(dev, buf, owner).map(|n| (dev, n)));
        match read {
            Ok((dev, n)) => {
                self.wait_on(dev);
                n as isize
            }
            Err(err) => status(Err(err)),
        }
    }

    /// Start a write on the line at `port`, blocking the caller until it drains; 0 or a
    /// negative status.
    pub fn sys_write(&mut self, port: u16, bytes: &[u8]) -> isize {
        let owner = self.owner();
        let written = Device::try_from(port)
            .and_then(|dev| self.serial.write(dev, bytes, owner).map(|()| dev));
        match written {
            Ok(dev) => {
                self.wait_on(dev);
                0
            }
            Err(err) => status(Err(err)),
        }
    }

    /// Take the finished read the running process started on `dev`, if there is one.
    pub fn take_finished(&mut self, dev: Device) -> Option<Iocb> {
        let owner = self.owner()?;
        let at = self.finished.iter().position(|done| {
            done.device == dev && done.request.as_ref().is_some_and(|i| i.process == Some(owner))
        })?;
        self.finished.remove(at).request
    }

    /// Copy the bytes a pending read on `port` received once it finished.
    ///
    /// Returns the number of bytes copied into `buf`, 0 when the running process has no
    /// finished read there, or the busy status while its read is still in flight.
    pub fn sys_collect(&mut self, port: u16, buf: &mut [u8]) -> isize {
        let dev = match Device::try_from(port) {
            Ok(dev) => dev,
            Err(err) => return status(Err(err)),
        };
        if let Some(iocb) = self.take_finished(dev) {
            let n = iocb.data.len().min(buf.len());
            buf[..n].copy_from_slice(&iocb.data[..n]);
            return n as isize;
        }
        let owner = self.owner();
        let in_flight = self.serial.dcb(dev).is_some_and(|dcb| {
            dcb.operation() == Operation::Read
                && owner.is_some()
                && dcb.iocb().is_some_and(|i| i.process == owner)
        });
        if in_flight {
            return SerialError::DeviceBusy.as_errno();
        }
        0
    }
}
