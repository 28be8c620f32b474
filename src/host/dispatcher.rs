// SPDX-License-Identifier: MIT OR Apache-2.0
//! The command pipeline: a FIFO of submitted commands, at most one of which
//! is on the wire at a time, each completed by the response frame that
//! echoes its sequence number.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::ezsp::{EzspStatus, FrameControl, FrameId, Header};
use crate::link::{Link, Millis};
use crate::{Error, Write};

/// A completed EZSP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub frame_id: FrameId,
    pub control: FrameControl,
    pub parameters: Vec<u8>,
}

/// What a [`super::CompletionHandle`] resolves to.
pub type CommandOutcome = Result<Response, Error>;

/// An unsolicited frame to hand to observers.
pub(crate) struct Handler {
    pub frame_id: FrameId,
    pub parameters: Vec<u8>,
}

struct Pending {
    id: u64,
    frame_id: FrameId,
    parameters: Vec<u8>,
    tx: mpsc::Sender<CommandOutcome>,
    sequence: u8,
    deadline: Instant,
    cancelled: bool,
}

impl Pending {
    fn resolve(self, outcome: CommandOutcome) {
        // The caller may have dropped its handle; that is not our problem.
        let _ = self.tx.send(outcome);
    }

    fn resolve_cancelled_or(self, outcome: CommandOutcome) {
        if self.cancelled {
            self.resolve(Err(Error::Cancelled));
        } else {
            self.resolve(outcome);
        }
    }
}

/// FIFO command dispatcher over one ASH link.
pub(crate) struct Dispatcher {
    queue: VecDeque<Pending>,
    in_flight: Option<Pending>,
    next_sequence: u8,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { queue: VecDeque::new(), in_flight: None, next_sequence: 0, timeout }
    }

    /// Queues a command for transmission.
    pub fn submit(
        &mut self,
        id: u64,
        frame_id: FrameId,
        parameters: Vec<u8>,
        tx: mpsc::Sender<CommandOutcome>,
    ) {
        trace!("queueing {frame_id:?} as command {id}");
        self.queue.push_back(Pending {
            id,
            frame_id,
            parameters,
            tx,
            sequence: 0,
            deadline: Instant::now(),
            cancelled: false,
        });
    }

    /// Restarts the sequence counter; the EZSP sequence space begins anew
    /// with every RST/RSTACK exchange.
    pub fn reset_sequence(&mut self) {
        self.next_sequence = 0;
    }

    /// Cancels a command. A queued command resolves immediately; the one on
    /// the wire is only marked, and resolves once its window slot drains
    /// (response, timeout or link reset).
    pub fn cancel(&mut self, id: u64) {
        if let Some(pos) = self.queue.iter().position(|cmd| cmd.id == id) {
            if let Some(cmd) = self.queue.remove(pos) {
                debug!("cancelled queued command {id}");
                cmd.resolve(Err(Error::Cancelled));
            }
        } else if let Some(cmd) = self.in_flight.as_mut().filter(|cmd| cmd.id == id) {
            debug!("cancelling in-flight command {id}, waiting for the window to drain");
            cmd.cancelled = true;
        }
    }

    /// Puts the next queued command on the wire if the window is free.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Write)` when the write I/O fails with the serial port
    pub fn service<P>(&mut self, link: &mut Link, port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        if self.in_flight.is_some() || !link.is_ready() {
            return Ok(());
        }
        let Some(mut cmd) = self.queue.pop_front() else { return Ok(()) };
        cmd.sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let frame = match Header::encode_command(cmd.sequence, cmd.frame_id, &cmd.parameters) {
            Ok(frame) => frame,
            Err(error) => {
                cmd.resolve(Err(error));
                return Ok(());
            }
        };
        debug!("-> EZSP {:?} seq {}", cmd.frame_id, cmd.sequence);
        match link.send(&frame, port, now) {
            Ok(()) => {
                cmd.deadline = Instant::now() + self.timeout;
                self.in_flight = Some(cmd);
                Ok(())
            }
            Err(Error::Write) => {
                cmd.resolve(Err(Error::Write));
                Err(Error::Write)
            }
            Err(error) => {
                cmd.resolve(Err(error));
                Ok(())
            }
        }
    }

    /// Routes one received EZSP frame: a handler frame comes back for
    /// observer dispatch, a response resolves the in-flight command.
    pub fn on_frame(&mut self, payload: &[u8]) -> Option<Handler> {
        let (header, parameters) = match Header::decode(payload) {
            Ok(decoded) => decoded,
            Err(_) => {
                warn!("dropping EZSP frame with unknown layout or id");
                return None;
            }
        };
        if header.frame_id.is_handler() {
            return Some(Handler { frame_id: header.frame_id, parameters: parameters.to_vec() });
        }
        let Some(cmd) = self.in_flight.take() else {
            warn!("unsolicited response {:?}, dropping", header.frame_id);
            return None;
        };
        if header.sequence != cmd.sequence {
            warn!(
                "response seq {} does not match in-flight seq {}, dropping",
                header.sequence, cmd.sequence
            );
            self.in_flight = Some(cmd);
            return None;
        }
        debug!("<- EZSP {:?} seq {}", header.frame_id, header.sequence);
        if header.frame_id == FrameId::InvalidCommand {
            let status = parameters.first().map(|b| EzspStatus::from(*b));
            warn!("NCP rejected {:?}: {status:?}", cmd.frame_id);
            cmd.resolve_cancelled_or(Err(Error::MalformedFrame));
        } else if header.frame_id == cmd.frame_id {
            cmd.resolve_cancelled_or(Ok(Response {
                frame_id: header.frame_id,
                control: header.control,
                parameters: parameters.to_vec(),
            }));
        } else {
            warn!("response {:?} does not answer {:?}", header.frame_id, cmd.frame_id);
            cmd.resolve_cancelled_or(Err(Error::MalformedFrame));
        }
        None
    }

    /// Expires the in-flight command once its deadline passes. The sequence
    /// number check in [`Dispatcher::on_frame`] shields the next command
    /// from the late response, should one still arrive.
    pub fn on_timeout(&mut self, now: Instant) {
        if self.in_flight.as_ref().is_some_and(|cmd| now >= cmd.deadline) {
            if let Some(cmd) = self.in_flight.take() {
                warn!("command {:?} seq {} timed out", cmd.frame_id, cmd.sequence);
                cmd.resolve_cancelled_or(Err(Error::CommandTimeout));
            }
        }
    }

    /// Fails every pending command, queued or in flight; used on link reset.
    pub fn fail_all(&mut self, error: Error) {
        if let Some(cmd) = self.in_flight.take() {
            cmd.resolve_cancelled_or(Err(error));
        }
        for cmd in self.queue.drain(..) {
            cmd.resolve_cancelled_or(Err(error));
        }
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }
}
