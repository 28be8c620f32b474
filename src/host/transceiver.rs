// SPDX-License-Identifier: MIT OR Apache-2.0
//! The transceiver worker thread. It owns the serial port, the ASH link and
//! the command dispatcher; every piece of protocol state is mutated on this
//! thread only. The public [`super::EzspHost`] talks to it through the
//! request channel and gets results back through completion channels and
//! observer callbacks.

use std::io;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{Builder, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use super::dispatcher::{Dispatcher, Handler};
use super::observer::{DongleState, SharedRegistry};
use super::{Request, Transport};
use crate::ezsp::FrameId;
use crate::gp::{authenticate, GpDeviceDb, GpFrame, GpSecurityLevel, KeyStatus};
use crate::link::{Event, Link, LinkConfig, Millis, Status};
use crate::Error;

/// Pause between reconnection attempts after the link failed.
const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

pub(crate) struct Transceiver<T: Transport> {
    port: T,
    link: Link,
    dispatcher: Dispatcher,
    gp_db: GpDeviceDb,
    requests: Receiver<Request>,
    observers: SharedRegistry,
    epoch: Instant,
}

impl<T: Transport> Transceiver<T> {
    /// Spawns the worker thread.
    pub fn spawn(
        port: T,
        link: LinkConfig,
        command_timeout: Duration,
        requests: Receiver<Request>,
        observers: SharedRegistry,
    ) -> io::Result<JoinHandle<()>> {
        Builder::new().name("ezsp-transceiver".into()).spawn(move || {
            Self {
                port,
                link: Link::new(link),
                dispatcher: Dispatcher::new(command_timeout),
                gp_db: GpDeviceDb::new(),
                requests,
                observers,
                epoch: Instant::now(),
            }
            .run();
        })
    }

    fn now(&self) -> Millis {
        self.epoch.elapsed().as_millis() as u64
    }

    fn run(mut self) {
        let mut buf = [0u8; 256];
        let mut last_connect = Instant::now();
        self.observers.notify_state(DongleState::Connecting);
        let now = self.now();
        if self.link.connect(&mut self.port, now).is_err() {
            self.on_port_error();
        }
        loop {
            loop {
                match self.requests.try_recv() {
                    Ok(Request::Shutdown) | Err(TryRecvError::Disconnected) => return,
                    Ok(request) => self.handle_request(request),
                    Err(TryRecvError::Empty) => break,
                }
            }

            // The port read doubles as the loop's pacing; transports block
            // for a few milliseconds when no data is pending.
            match io::Read::read(&mut self.port, &mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    let now = self.now();
                    if self.link.feed(&buf[..n], &mut self.port, now).is_err() {
                        self.on_port_error();
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    error!("serial port read failed: {e}");
                    self.on_port_error();
                }
            }

            while let Some(event) = self.link.poll_event() {
                self.handle_event(event);
            }

            let now = self.now();
            if self.link.poll_timeout(&mut self.port, now).is_err() {
                self.on_port_error();
            }
            self.dispatcher.on_timeout(Instant::now());

            if !self.dispatcher.is_idle() {
                let now = self.now();
                if self.dispatcher.service(&mut self.link, &mut self.port, now).is_err() {
                    self.on_port_error();
                }
            }

            if self.link.status() == Status::Failed {
                if last_connect.elapsed() >= RECONNECT_DELAY {
                    last_connect = Instant::now();
                    self.observers.notify_state(DongleState::Connecting);
                    let now = self.now();
                    if self.link.connect(&mut self.port, now).is_err() {
                        self.link.abort();
                    }
                } else {
                    // Pace the loop while the link is down; a dead port
                    // fails its reads without blocking.
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        }
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Command { id, frame_id, parameters, tx } => {
                self.dispatcher.submit(id, frame_id, parameters, tx);
            }
            Request::Cancel { id } => self.dispatcher.cancel(id),
            Request::AddGpDevice(device) => {
                if self.gp_db.insert(device).is_err() {
                    error!("GP device directory is full");
                }
            }
            Request::SetGpDevices(devices) => {
                if self.gp_db.set_all(&devices).is_err() {
                    error!("GP device list exceeds the directory size");
                }
            }
            Request::RemoveGpDevice(source_id) => {
                self.gp_db.remove(source_id);
            }
            Request::ClearGpDevices => self.gp_db.clear(),
            Request::Metrics(tx) => {
                let _ = tx.send(self.link.metrics());
            }
            Request::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected { .. } => {
                self.dispatcher.reset_sequence();
                self.observers.notify_state(DongleState::Ready);
            }
            Event::SlotFreed => {}
            Event::Received(payload) => {
                if let Some(handler) = self.dispatcher.on_frame(&payload) {
                    self.dispatch_handler(&handler);
                }
            }
            Event::Failed(Error::ResetFailed) => {
                self.dispatcher.fail_all(Error::ResetFailed);
                self.observers.notify_state(DongleState::ResetFailed);
            }
            Event::Failed(_) => {
                self.dispatcher.fail_all(Error::LinkReset);
                self.observers.notify_state(DongleState::LinkLost);
            }
        }
    }

    fn dispatch_handler(&mut self, handler: &Handler) {
        self.observers.notify_message(handler.frame_id, &handler.parameters);
        if handler.frame_id != FrameId::GpepIncomingMessageHandler {
            return;
        }
        match GpFrame::parse(&handler.parameters) {
            Ok(Some(frame)) => {
                let known = self.gp_db.contains(frame.source_id);
                let status = match frame.security {
                    GpSecurityLevel::FrameCounterMic | GpSecurityLevel::EncryptedMic => {
                        authenticate(&frame, &self.gp_db)
                    }
                    // No MIC to verify; report what the directory knows.
                    GpSecurityLevel::None | GpSecurityLevel::Reserved => {
                        if known {
                            KeyStatus::Valid
                        } else {
                            KeyStatus::Undefined
                        }
                    }
                };
                info!("{frame} [{status:?}]");
                self.observers.notify_gpd_id(frame.source_id, known, status);
                self.observers.notify_gp_frame(&frame, status);
            }
            Ok(None) => {}
            Err(_) => warn!("dropping malformed GP report"),
        }
    }

    /// The port itself failed; everything in flight is dead and the link
    /// will be reconnected once the port recovers.
    fn on_port_error(&mut self) {
        if self.link.status() == Status::Failed {
            return;
        }
        self.link.abort();
        self.dispatcher.fail_all(Error::LinkReset);
        self.observers.notify_state(DongleState::LinkLost);
    }
}
