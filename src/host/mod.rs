// SPDX-License-Identifier: MIT OR Apache-2.0
//! The serial host runtime: the public adapter handle, the transceiver
//! worker thread behind it, observer registries and the network-management
//! convenience API.

mod dispatcher;
mod network;
mod observer;
mod transceiver;
mod uart;

pub use dispatcher::{CommandOutcome, Response};
pub use network::NetworkState;
pub use observer::{DongleState, EzspObserver, GpObserver, ObserverHandle, Registry};
pub use uart::open as open_uart;

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::info;

use crate::ezsp::{self, FrameId, VersionInfo, PREFERRED_PROTOCOL_VERSION};
use crate::gp::GpDevice;
use crate::link::{LinkConfig, Metrics};
use crate::Error;
use observer::SharedRegistry;
use transceiver::Transceiver;

/// Baud rate EZSP NCP firmware ships with.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Anything that can carry ASH traffic: a serial port, a PTY, or an
/// in-memory pipe in tests. Reads should block briefly when no data is
/// pending; the transceiver loop paces itself on them.
pub trait Transport: std::io::Read + std::io::Write + Send + 'static {}

impl<T: std::io::Read + std::io::Write + Send + 'static> Transport for T {}

impl<T: std::io::Write> crate::Write for T {
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        std::io::Write::write_all(self, buf).map_err(|_| Error::Write)
    }
}

impl<T: std::io::Read> crate::Read for T {
    fn read(&mut self, buf: &mut [u8]) -> Result<u32, Error> {
        match std::io::Read::read(self, buf) {
            Ok(count) => Ok(count as u32),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(_) => Err(Error::Read),
        }
    }
}

/// Adapter tuning; the defaults match stock NCP firmware.
#[derive(Debug, Clone, Copy)]
pub struct HostConfig {
    pub baud_rate: u32,
    /// Deadline for a command once it is on the wire.
    pub command_timeout: Duration,
    /// Deadline for the whole bring-up (reset handshake plus version
    /// negotiation).
    pub open_timeout: Duration,
    pub link: LinkConfig,
    /// EZSP protocol level to request in the `version` handshake.
    pub protocol_version: u8,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout: Duration::from_secs(3),
            open_timeout: Duration::from_secs(15),
            link: LinkConfig::default(),
            protocol_version: PREFERRED_PROTOCOL_VERSION,
        }
    }
}

/// What the front handle asks of the worker thread.
pub(crate) enum Request {
    Command {
        id: u64,
        frame_id: FrameId,
        parameters: Vec<u8>,
        tx: mpsc::Sender<CommandOutcome>,
    },
    Cancel {
        id: u64,
    },
    AddGpDevice(GpDevice),
    SetGpDevices(Vec<GpDevice>),
    RemoveGpDevice(u32),
    ClearGpDevices,
    Metrics(mpsc::Sender<Metrics>),
    Shutdown,
}

/// Resolves with the response to one submitted command.
pub struct CompletionHandle {
    id: u64,
    rx: mpsc::Receiver<CommandOutcome>,
    requests: mpsc::Sender<Request>,
}

impl CompletionHandle {
    /// Blocks until the command completes, times out on the wire or is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Whatever the command resolved with; `Err(Error::LinkReset)` if the
    /// driver shut down underneath it.
    pub fn wait(self) -> CommandOutcome {
        self.rx.recv().unwrap_or(Err(Error::LinkReset))
    }

    /// Like [`CompletionHandle::wait`] with a caller-side deadline; on
    /// expiry the command is cancelled.
    ///
    /// # Errors
    ///
    /// As [`CompletionHandle::wait`], plus `Err(Error::CommandTimeout)` on
    /// expiry.
    pub fn wait_timeout(self, timeout: Duration) -> CommandOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                self.cancel();
                Err(Error::CommandTimeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::LinkReset),
        }
    }

    /// Non-blocking poll.
    pub fn try_wait(&self) -> Option<CommandOutcome> {
        self.rx.try_recv().ok()
    }

    /// Requests cancellation. A queued command resolves `Cancelled` at
    /// once; one already on the wire resolves after its window slot drains.
    pub fn cancel(&self) {
        let _ = self.requests.send(Request::Cancel { id: self.id });
    }
}

/// Handle to an EZSP adapter. Cheap operations submit work to the
/// transceiver thread; dropping the handle shuts the thread down.
pub struct EzspHost {
    requests: mpsc::Sender<Request>,
    registry: Arc<Mutex<Registry>>,
    next_id: AtomicU64,
    worker: Option<JoinHandle<()>>,
    version: VersionInfo,
    command_timeout: Duration,
}

impl EzspHost {
    /// Opens the adapter on a serial device and negotiates the EZSP
    /// protocol version.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Open)` when the device cannot be opened
    /// * `Err(Error::ResetFailed)` when the NCP never answers the handshake
    /// * any command error from the version negotiation
    pub fn open(port_name: &str, config: HostConfig) -> Result<Self, Error> {
        let port = uart::open(port_name, config.baud_rate)?;
        Self::open_transport(port, config)
    }

    /// Opens the adapter over an already-connected transport.
    ///
    /// # Errors
    ///
    /// As [`EzspHost::open`], minus the device errors.
    pub fn open_transport<T: Transport>(port: T, config: HostConfig) -> Result<Self, Error> {
        let (requests, worker_rx) = mpsc::channel();
        let registry = Arc::new(Mutex::new(Registry::default()));
        let worker = Transceiver::spawn(
            port,
            config.link,
            config.command_timeout,
            worker_rx,
            SharedRegistry(Arc::clone(&registry)),
        )
        .map_err(|_| Error::Open)?;
        let mut host = Self {
            requests,
            registry,
            next_id: AtomicU64::new(1),
            worker: Some(worker),
            version: VersionInfo { protocol_version: 0, stack_type: 0, stack_version: 0 },
            command_timeout: config.command_timeout,
        };
        host.version = host.negotiate_version(config.protocol_version, config.open_timeout)?;
        Ok(host)
    }

    /// The `version` exchange must be the first command after reset; if the
    /// NCP answers with a different protocol level, the exchange is repeated
    /// once at that level.
    fn negotiate_version(&self, desired: u8, timeout: Duration) -> Result<VersionInfo, Error> {
        let response = self
            .send_command(FrameId::Version, &ezsp::version(desired))?
            .wait_timeout(timeout)?;
        let info = ezsp::parse_version(&response.parameters)?;
        if info.protocol_version == desired {
            info!("EZSP v{}, stack 0x{:04X}", info.protocol_version, info.stack_version);
            return Ok(info);
        }
        info!("NCP speaks EZSP v{} instead of v{desired}, renegotiating", info.protocol_version);
        let response = self
            .send_command(FrameId::Version, &ezsp::version(info.protocol_version))?
            .wait_timeout(timeout)?;
        ezsp::parse_version(&response.parameters)
    }

    /// Negotiated protocol and stack versions.
    #[must_use]
    pub fn version_info(&self) -> VersionInfo {
        self.version
    }

    /// Submits a command; commands go to the NCP strictly in submission
    /// order, one at a time.
    ///
    /// # Errors
    ///
    /// * `Err(Error::LinkReset)` when the driver is shutting down
    pub fn send_command(
        &self,
        frame_id: FrameId,
        parameters: &[u8],
    ) -> Result<CompletionHandle, Error> {
        let id = self.next_id.fetch_add(1, Relaxed);
        let (tx, rx) = mpsc::channel();
        self.requests
            .send(Request::Command { id, frame_id, parameters: parameters.to_vec(), tx })
            .map_err(|_| Error::LinkReset)?;
        Ok(CompletionHandle { id, rx, requests: self.requests.clone() })
    }

    /// Submits a command and blocks for its response.
    pub(crate) fn call(&self, frame_id: FrameId, parameters: &[u8]) -> Result<Response, Error> {
        // Generous caller-side bound: queueing ahead of the wire deadline.
        let bound = self.command_timeout * 4;
        self.send_command(frame_id, parameters)?.wait_timeout(bound)
    }

    pub fn register_ezsp_observer(&self, observer: Arc<dyn EzspObserver>) -> ObserverHandle {
        self.registry.lock().expect("observer registry poisoned").register_ezsp(observer)
    }

    pub fn register_gp_observer(&self, observer: Arc<dyn GpObserver>) -> ObserverHandle {
        self.registry.lock().expect("observer registry poisoned").register_gp(observer)
    }

    /// Removes an observer; returns whether the handle was still registered.
    pub fn unregister_observer(&self, handle: ObserverHandle) -> bool {
        self.registry.lock().expect("observer registry poisoned").unregister(handle)
    }

    /// Provisions a Green Power device key.
    ///
    /// # Errors
    ///
    /// * `Err(Error::LinkReset)` when the driver is shutting down
    pub fn add_gp_device(&self, device: GpDevice) -> Result<(), Error> {
        self.requests.send(Request::AddGpDevice(device)).map_err(|_| Error::LinkReset)
    }

    /// Replaces the Green Power device directory.
    ///
    /// # Errors
    ///
    /// * `Err(Error::LinkReset)` when the driver is shutting down
    pub fn set_gp_devices(&self, devices: Vec<GpDevice>) -> Result<(), Error> {
        self.requests.send(Request::SetGpDevices(devices)).map_err(|_| Error::LinkReset)
    }

    /// Forgets a Green Power device key.
    ///
    /// # Errors
    ///
    /// * `Err(Error::LinkReset)` when the driver is shutting down
    pub fn remove_gp_device(&self, source_id: u32) -> Result<(), Error> {
        self.requests.send(Request::RemoveGpDevice(source_id)).map_err(|_| Error::LinkReset)
    }

    /// Clears the Green Power device directory.
    ///
    /// # Errors
    ///
    /// * `Err(Error::LinkReset)` when the driver is shutting down
    pub fn clear_gp_devices(&self) -> Result<(), Error> {
        self.requests.send(Request::ClearGpDevices).map_err(|_| Error::LinkReset)
    }

    /// Snapshot of the link's frame counters (received, sent, dropped for
    /// bad CRC, retransmitted).
    ///
    /// # Errors
    ///
    /// * `Err(Error::LinkReset)` when the driver is shutting down
    pub fn link_metrics(&self) -> Result<Metrics, Error> {
        let (tx, rx) = mpsc::channel();
        self.requests.send(Request::Metrics(tx)).map_err(|_| Error::LinkReset)?;
        rx.recv().map_err(|_| Error::LinkReset)
    }

    /// Shuts the transceiver down and closes the port.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for EzspHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
