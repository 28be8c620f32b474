// SPDX-License-Identifier: MIT OR Apache-2.0
//! The ASH link state machine.
//!
//! The link owns both three-bit sequence counters, the single-entry send
//! window and the adaptive acknowledgement timer. It is written sans-io:
//! received bytes are pushed in with [`Link::feed`], time is passed in as
//! milliseconds, and everything the upper layer must react to comes back out
//! of [`Link::poll_event`]. The caller is expected to invoke
//! [`Link::poll_timeout`] whenever [`Link::next_deadline`] expires.

use heapless::Deque;
use log::{debug, error, info, trace, warn};

use crate::codec::{self, Accumulator, CANCEL};
use crate::frame::{Frame, FrameBuffer, Payload, Wrap3, MAX_DATA_LENGTH, PROTOCOL_VERSION};
use crate::{crc, Error, HexSlice, Write};

/// Milliseconds of elapsed host time; the link never looks at a clock.
pub type Millis = u64;

/// Receive-ACK timeout bounds, per the ASH protocol reference.
pub const T_RX_ACK_MIN: Millis = 400;
pub const T_RX_ACK_INIT: Millis = 1600;
pub const T_RX_ACK_MAX: Millis = 3200;

/// Link tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Initial ACK timeout, also used while waiting for RSTACK.
    pub ack_timeout_init: Millis,
    /// Lower clamp for the adaptive ACK timeout.
    pub ack_timeout_min: Millis,
    /// Upper clamp for the adaptive ACK timeout.
    pub ack_timeout_max: Millis,
    /// How many times a DATA frame is re-sent before the link is declared
    /// lost.
    pub max_retransmits: u8,
    /// How many RST attempts are made before reporting `ResetFailed`.
    pub max_reset_attempts: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ack_timeout_init: T_RX_ACK_INIT,
            ack_timeout_min: T_RX_ACK_MIN,
            ack_timeout_max: T_RX_ACK_MAX,
            max_retransmits: 3,
            max_reset_attempts: 5,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No RST has been sent yet.
    Disconnected,
    /// RST is out, waiting for RSTACK.
    Connecting,
    Connected,
    /// The reset or retransmission budget ran out; a new `connect` is needed.
    Failed,
}

/// What the link hands up to its owner.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// RSTACK arrived; the link is up. Carries the NCP reset code.
    Connected { code: u8 },
    /// An in-order DATA frame was accepted and acknowledged.
    Received(Payload),
    /// The in-flight DATA frame was acknowledged; the window is free again.
    SlotFreed,
    /// The link went down (`ResetFailed` or `LinkLost`).
    Failed(Error),
}

/// Counters kept for diagnostics; dropped frames are counted, not reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct Metrics {
    pub crc_mismatches: u32,
    pub malformed_frames: u32,
    pub data_received: u32,
    pub data_sent: u32,
    pub retransmits: u32,
    pub naks_sent: u32,
}

/// The one outstanding DATA frame.
struct Slot {
    payload: Payload,
    frame_num: Wrap3,
    sent_at: Millis,
    deadline: Millis,
    retries: u8,
}

/// ASH link endpoint on the host side.
pub struct Link {
    cfg: LinkConfig,
    status: Status,
    /// Frame number expected in the next inbound DATA frame.
    ack_num: Wrap3,
    /// Frame number of the next outbound DATA frame.
    frm_num: Wrap3,
    slot: Option<Slot>,
    acc: Accumulator,
    ack_timeout: Millis,
    reset_attempts: u8,
    reset_deadline: Option<Millis>,
    /// Rejection condition: one NAK per run of out-of-sequence frames.
    reject: bool,
    metrics: Metrics,
    events: Deque<Event, 16>,
}

impl Default for Link {
    fn default() -> Self {
        Self::new(LinkConfig::default())
    }
}

impl Link {
    #[must_use]
    pub fn new(cfg: LinkConfig) -> Self {
        Self {
            cfg,
            status: Status::Disconnected,
            ack_num: Wrap3::default(),
            frm_num: Wrap3::default(),
            slot: None,
            acc: Accumulator::new(),
            ack_timeout: cfg.ack_timeout_init,
            reset_attempts: 0,
            reset_deadline: None,
            reject: false,
            metrics: Metrics::default(),
            events: Deque::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Whether a DATA frame may be sent right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == Status::Connected && self.slot.is_none()
    }

    /// Next pending event, in arrival order.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// When [`Link::poll_timeout`] next needs to run, if anything is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Millis> {
        match self.status {
            Status::Connecting => self.reset_deadline,
            Status::Connected => self.slot.as_ref().map(|s| s.deadline),
            Status::Disconnected | Status::Failed => None,
        }
    }

    /// Starts (or restarts) the reset handshake: flushes any partial NCP
    /// frame with a cancel byte, sends RST and arms the RSTACK timer.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Write)` when the write I/O fails with the serial port
    pub fn connect<P>(&mut self, port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        self.status = Status::Connecting;
        self.ack_num = Wrap3::default();
        self.frm_num = Wrap3::default();
        self.slot = None;
        self.acc = Accumulator::new();
        self.ack_timeout = self.cfg.ack_timeout_init;
        self.reset_attempts = 1;
        self.reject = false;
        self.send_rst(port, now)
    }

    fn send_rst<P>(&mut self, port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        debug!("-> RST (attempt {})", self.reset_attempts);
        port.write_byte(CANCEL)?;
        codec::write_frame(port, &Frame::Rst.encode())?;
        self.reset_deadline = Some(now + self.cfg.ack_timeout_init);
        Ok(())
    }

    /// Feeds received UART bytes through the accumulator and the state
    /// machine. ACKs and NAKs owed to the NCP are written to `port` on the
    /// spot; everything else surfaces through [`Link::poll_event`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::Write)` when the write I/O fails with the serial port
    pub fn feed<P>(&mut self, bytes: &[u8], port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        for byte in bytes {
            if let Some(raw) = self.acc.push(*byte) {
                self.handle_raw(&raw, port, now)?;
            }
        }
        Ok(())
    }

    fn handle_raw<P>(&mut self, raw: &FrameBuffer, port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        if !crc::is_valid(raw) {
            self.metrics.crc_mismatches += 1;
            trace!("dropping frame with bad CRC: {}", HexSlice(raw));
            return Ok(());
        }
        let frame = match Frame::parse(&raw[..raw.len() - 2]) {
            Ok(frame) => frame,
            Err(_) => {
                self.metrics.malformed_frames += 1;
                trace!("dropping malformed frame: {}", HexSlice(raw));
                return Ok(());
            }
        };
        debug!("<- {frame}");
        match frame {
            Frame::RstAck { version, code } => self.handle_rst_ack(version, code),
            Frame::Error { code, .. } => {
                error!("NCP entered ERROR state, code 0x{code:02X}");
                self.fail(Error::LinkLost);
            }
            Frame::Rst => warn!("ignoring unexpected RST from NCP"),
            Frame::Data { frame_num, ack_num, retransmitted, payload }
                if self.status == Status::Connected =>
            {
                self.handle_data(frame_num, ack_num, retransmitted, payload, port, now)?;
            }
            Frame::Ack { ack_num } if self.status == Status::Connected => {
                self.handle_ack(ack_num, now);
            }
            Frame::Nak { ack_num } if self.status == Status::Connected => {
                warn!("NCP rejected frame, NAK({ack_num})");
                self.retransmit(port, now)?;
            }
            other => trace!("dropping {other} in state {:?}", self.status),
        }
        Ok(())
    }

    fn handle_rst_ack(&mut self, version: u8, code: u8) {
        if self.status != Status::Connecting {
            warn!("ignoring unexpected RSTACK (v{version}, 0x{code:02X})");
            return;
        }
        if version != PROTOCOL_VERSION {
            error!("NCP speaks ASH v{version}, expected v{PROTOCOL_VERSION}");
            self.fail(Error::ResetFailed);
            return;
        }
        info!("link established, NCP reset code 0x{code:02X}");
        self.status = Status::Connected;
        self.reset_deadline = None;
        self.reset_attempts = 0;
        self.push_event(Event::Connected { code });
    }

    fn handle_data<P>(
        &mut self,
        frame_num: Wrap3,
        ack_num: Wrap3,
        retransmitted: bool,
        payload: Payload,
        port: &mut P,
        now: Millis,
    ) -> Result<(), Error>
    where
        P: Write,
    {
        self.metrics.data_received += 1;
        // The piggybacked ack number covers our in-flight frame.
        self.handle_ack(ack_num, now);
        if frame_num == self.ack_num {
            self.reject = false;
            self.ack_num = self.ack_num.next();
            let ack = Frame::Ack { ack_num: self.ack_num };
            debug!("-> {ack}");
            codec::write_frame(port, &ack.encode())?;
            self.push_event(Event::Received(payload));
        } else {
            warn!(
                "out-of-sequence DATA({frame_num}), expected {}{}",
                self.ack_num,
                if retransmitted { " (retransmission)" } else { "" }
            );
            if !self.reject {
                self.reject = true;
                self.metrics.naks_sent += 1;
                let nak = Frame::Nak { ack_num: self.ack_num };
                debug!("-> {nak}");
                codec::write_frame(port, &nak.encode())?;
            }
        }
        Ok(())
    }

    fn handle_ack(&mut self, ack_num: Wrap3, now: Millis) {
        let Some(slot) = &self.slot else { return };
        if ack_num != slot.frame_num.next() {
            trace!("ack {ack_num} does not cover in-flight frame {}", slot.frame_num);
            return;
        }
        // Karn: round trips are only sampled from frames sent exactly once.
        let sample = (slot.retries == 0).then(|| now.saturating_sub(slot.sent_at));
        self.slot = None;
        if let Some(rtt) = sample {
            self.update_ack_timeout(rtt);
        }
        self.push_event(Event::SlotFreed);
    }

    /// EWMA timeout estimate: `t' = 7/8 t + 1/8 rtt`, clamped to the
    /// protocol bounds.
    fn update_ack_timeout(&mut self, rtt: Millis) {
        let estimate = (7 * self.ack_timeout + rtt) / 8;
        self.ack_timeout = estimate.clamp(self.cfg.ack_timeout_min, self.cfg.ack_timeout_max);
    }

    /// Sends one EZSP frame as a DATA frame and occupies the send window.
    ///
    /// # Errors
    ///
    /// * `Err(Error::LinkLost)` when the link is not connected
    /// * `Err(Error::Busy)` when the window already holds a frame
    /// * `Err(Error::Capacity)` when the payload exceeds the DATA field limit
    /// * `Err(Error::Write)` when the write I/O fails with the serial port
    pub fn send<P>(&mut self, payload: &[u8], port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        if self.status != Status::Connected {
            return Err(Error::LinkLost);
        }
        if self.slot.is_some() {
            return Err(Error::Busy);
        }
        if payload.is_empty() || payload.len() > MAX_DATA_LENGTH {
            return Err(Error::Capacity);
        }
        let mut copy = Payload::new();
        copy.extend_from_slice(payload);
        let frame = Frame::Data {
            frame_num: self.frm_num,
            ack_num: self.ack_num,
            retransmitted: false,
            payload: copy.clone(),
        };
        debug!("-> {frame}");
        codec::write_frame(port, &frame.encode())?;
        self.metrics.data_sent += 1;
        self.slot = Some(Slot {
            payload: copy,
            frame_num: self.frm_num,
            sent_at: now,
            deadline: now + self.ack_timeout,
            retries: 0,
        });
        self.frm_num = self.frm_num.next();
        Ok(())
    }

    fn retransmit<P>(&mut self, port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        let Some(mut slot) = self.slot.take() else { return Ok(()) };
        if slot.retries >= self.cfg.max_retransmits {
            error!("frame {} unacknowledged after {} retransmissions", slot.frame_num, slot.retries);
            self.fail(Error::LinkLost);
            return Ok(());
        }
        slot.retries += 1;
        let frame = Frame::Data {
            frame_num: slot.frame_num,
            ack_num: self.ack_num,
            retransmitted: true,
            payload: slot.payload.clone(),
        };
        // Exponential backoff toward the upper clamp.
        self.ack_timeout = (self.ack_timeout * 2).min(self.cfg.ack_timeout_max);
        slot.deadline = now + self.ack_timeout;
        self.slot = Some(slot);
        self.metrics.retransmits += 1;
        debug!("-> {frame}");
        codec::write_frame(port, &frame.encode())
    }

    /// Drives the retransmission and reset timers; call when
    /// [`Link::next_deadline`] has passed.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Write)` when the write I/O fails with the serial port
    pub fn poll_timeout<P>(&mut self, port: &mut P, now: Millis) -> Result<(), Error>
    where
        P: Write,
    {
        match self.status {
            Status::Connecting => {
                if self.reset_deadline.is_some_and(|deadline| now >= deadline) {
                    if self.reset_attempts >= self.cfg.max_reset_attempts {
                        error!("no RSTACK after {} attempts", self.reset_attempts);
                        self.fail(Error::ResetFailed);
                    } else {
                        self.reset_attempts += 1;
                        warn!("RSTACK timeout, resending RST");
                        self.send_rst(port, now)?;
                    }
                }
            }
            Status::Connected => {
                if self.slot.as_ref().is_some_and(|slot| now >= slot.deadline) {
                    warn!("ACK timeout, retransmitting");
                    self.retransmit(port, now)?;
                }
            }
            Status::Disconnected | Status::Failed => {}
        }
        Ok(())
    }

    /// Takes the link offline without emitting an event; used when the port
    /// itself failed and the owner already knows.
    pub fn abort(&mut self) {
        self.status = Status::Failed;
        self.reset_deadline = None;
        self.slot = None;
    }

    fn fail(&mut self, error: Error) {
        self.status = Status::Failed;
        self.reset_deadline = None;
        self.slot = None;
        self.push_event(Event::Failed(error));
    }

    fn push_event(&mut self, event: Event) {
        if self.events.push_back(event).is_err() {
            // Sixteen undrained events means the owner stopped polling.
            error!("link event queue overflow");
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, status: Status, ack_num: Wrap3, frm_num: Wrap3) {
        self.status = status;
        self.ack_num = ack_num;
        self.frm_num = frm_num;
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, Link, LinkConfig, Status, T_RX_ACK_INIT, T_RX_ACK_MAX, T_RX_ACK_MIN};
    use crate::codec;
    use crate::frame::{Frame, Payload, Wrap3};
    use crate::Error;

    fn wire(frame: &Frame) -> Vec<u8> {
        let mut port = vec![];
        codec::write_frame(&mut port, &frame.encode()).unwrap();
        port
    }

    fn connected_link(port: &mut Vec<u8>) -> Link {
        let mut link = Link::default();
        link.connect(port, 0).unwrap();
        link.feed(&wire(&Frame::RstAck { version: 2, code: 0x02 }), port, 10).unwrap();
        assert_eq!(link.poll_event(), Some(Event::Connected { code: 0x02 }));
        port.clear();
        link
    }

    fn payload(bytes: &[u8]) -> Payload {
        let mut out = Payload::new();
        out.extend_from_slice(bytes);
        out
    }

    #[test]
    fn connect_writes_cancel_then_rst() {
        let mut port = vec![];
        let mut link = Link::default();
        link.connect(&mut port, 0).unwrap();
        assert_eq!(port, [0x1A, 0xC0, 0x38, 0xBC, 0x7E]);
        assert_eq!(link.status(), Status::Connecting);
        assert_eq!(link.next_deadline(), Some(T_RX_ACK_INIT));
    }

    #[test]
    fn rstack_version_two_connects() {
        let mut port = vec![];
        let mut link = Link::default();
        link.connect(&mut port, 0).unwrap();
        // CANCEL, RSTACK v2 reason 2, CRC, FLAG, byte for byte.
        link.feed(&[0x1A, 0xC1, 0x02, 0x02, 0x9B, 0x7B, 0x7E], &mut port, 5).unwrap();
        assert_eq!(link.status(), Status::Connected);
        assert_eq!(link.poll_event(), Some(Event::Connected { code: 0x02 }));
        assert_eq!(link.next_deadline(), None);
    }

    #[test]
    fn rstack_with_wrong_version_fails_reset() {
        let mut port = vec![];
        let mut link = Link::default();
        link.connect(&mut port, 0).unwrap();
        link.feed(&wire(&Frame::RstAck { version: 1, code: 0x02 }), &mut port, 5).unwrap();
        assert_eq!(link.status(), Status::Failed);
        assert_eq!(link.poll_event(), Some(Event::Failed(Error::ResetFailed)));
    }

    #[test]
    fn reset_retries_are_bounded() {
        let mut port = vec![];
        let cfg = LinkConfig { max_reset_attempts: 2, ..LinkConfig::default() };
        let mut link = Link::new(cfg);
        link.connect(&mut port, 0).unwrap();
        link.poll_timeout(&mut port, T_RX_ACK_INIT).unwrap();
        assert_eq!(link.status(), Status::Connecting);
        link.poll_timeout(&mut port, 2 * T_RX_ACK_INIT).unwrap();
        assert_eq!(link.status(), Status::Failed);
        assert_eq!(link.poll_event(), Some(Event::Failed(Error::ResetFailed)));
    }

    #[test]
    fn in_order_data_is_acked_and_delivered() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        link.force_state(Status::Connected, Wrap3::new(5), Wrap3::new(3));
        let data = Frame::Data {
            frame_num: Wrap3::new(5),
            ack_num: Wrap3::new(3),
            retransmitted: false,
            payload: payload(&[0x01, 0x80, 0x00]),
        };
        link.feed(&wire(&data), &mut port, 20).unwrap();
        // Control byte 0x53 in, ACK with control byte 0x86 out.
        assert_eq!(port, wire(&Frame::Ack { ack_num: Wrap3::new(6) }));
        assert_eq!(link.poll_event(), Some(Event::Received(payload(&[0x01, 0x80, 0x00]))));
    }

    #[test]
    fn out_of_sequence_data_is_nacked_once() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        let data = Frame::Data {
            frame_num: Wrap3::new(4),
            ack_num: Wrap3::new(0),
            retransmitted: false,
            payload: payload(&[0x00]),
        };
        link.feed(&wire(&data), &mut port, 20).unwrap();
        assert_eq!(port, wire(&Frame::Nak { ack_num: Wrap3::new(0) }));
        assert_eq!(link.poll_event(), None);
        // The rejection condition suppresses a NAK storm.
        port.clear();
        link.feed(&wire(&data), &mut port, 30).unwrap();
        assert!(port.is_empty());
        assert_eq!(link.metrics().naks_sent, 1);
    }

    #[test]
    fn ack_frees_the_send_window() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        link.send(&[0x00, 0x00, 0x00], &mut port, 100).unwrap();
        assert!(!link.is_ready());
        assert_eq!(link.send(&[0x00], &mut port, 100), Err(Error::Busy));
        link.feed(&wire(&Frame::Ack { ack_num: Wrap3::new(1) }), &mut port, 150).unwrap();
        assert_eq!(link.poll_event(), Some(Event::SlotFreed));
        assert!(link.is_ready());
    }

    #[test]
    fn stale_ack_leaves_window_occupied() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        link.send(&[0x00], &mut port, 100).unwrap();
        link.feed(&wire(&Frame::Ack { ack_num: Wrap3::new(0) }), &mut port, 150).unwrap();
        assert_eq!(link.poll_event(), None);
        assert!(!link.is_ready());
    }

    #[test]
    fn nak_triggers_retransmission_with_flag_set() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        link.send(&[0x42, 0x43], &mut port, 100).unwrap();
        port.clear();
        link.feed(&wire(&Frame::Nak { ack_num: Wrap3::new(0) }), &mut port, 200).unwrap();
        let expected = Frame::Data {
            frame_num: Wrap3::new(0),
            ack_num: Wrap3::new(0),
            retransmitted: true,
            payload: payload(&[0x42, 0x43]),
        };
        assert_eq!(port, wire(&expected));
        assert_eq!(link.metrics().retransmits, 1);
    }

    #[test]
    fn retransmission_budget_exhaustion_fails_the_link() {
        let mut port = vec![];
        let cfg = LinkConfig { max_retransmits: 2, ..LinkConfig::default() };
        let mut link = Link::new(cfg);
        link.connect(&mut port, 0).unwrap();
        link.feed(&wire(&Frame::RstAck { version: 2, code: 0x02 }), &mut port, 10).unwrap();
        let _ = link.poll_event();
        link.send(&[0x00], &mut port, 100).unwrap();
        let mut now = 100;
        for _ in 0..3 {
            now = link.next_deadline().unwrap();
            link.poll_timeout(&mut port, now).unwrap();
        }
        assert_eq!(link.status(), Status::Failed);
        assert_eq!(link.poll_event(), Some(Event::Failed(Error::LinkLost)));
    }

    #[test]
    fn piggybacked_ack_frees_window() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        link.send(&[0x07], &mut port, 100).unwrap();
        let data = Frame::Data {
            frame_num: Wrap3::new(0),
            ack_num: Wrap3::new(1),
            retransmitted: false,
            payload: payload(&[0x07, 0x80]),
        };
        link.feed(&wire(&data), &mut port, 140).unwrap();
        assert_eq!(link.poll_event(), Some(Event::SlotFreed));
        assert_eq!(link.poll_event(), Some(Event::Received(payload(&[0x07, 0x80]))));
        assert!(link.is_ready());
    }

    #[test]
    fn ack_timeout_adapts_within_bounds() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        // Fast round trips walk the estimate down toward the lower clamp.
        for i in 0u8..64 {
            let t = 1000 * u64::from(i);
            link.send(&[0x00], &mut port, t).unwrap();
            let ack = Frame::Ack { ack_num: Wrap3::new(i.wrapping_add(1)) };
            link.feed(&wire(&ack), &mut port, t + 5).unwrap();
            let _ = link.poll_event();
        }
        link.send(&[0x00], &mut port, 100_000).unwrap();
        assert_eq!(link.next_deadline(), Some(100_000 + T_RX_ACK_MIN));
    }

    #[test]
    fn backoff_caps_at_maximum() {
        let mut port = vec![];
        let cfg = LinkConfig { max_retransmits: 5, ..LinkConfig::default() };
        let mut link = Link::new(cfg);
        link.connect(&mut port, 0).unwrap();
        link.feed(&wire(&Frame::RstAck { version: 2, code: 0x02 }), &mut port, 10).unwrap();
        let _ = link.poll_event();
        link.send(&[0x00], &mut port, 0).unwrap();
        let mut now = 0;
        for _ in 0..3 {
            now = link.next_deadline().unwrap();
            link.poll_timeout(&mut port, now).unwrap();
        }
        assert_eq!(link.next_deadline(), Some(now + T_RX_ACK_MAX));
    }

    #[test]
    fn error_frame_takes_the_link_down() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        link.feed(&wire(&Frame::Error { version: 2, code: 0x51 }), &mut port, 20).unwrap();
        assert_eq!(link.status(), Status::Failed);
        assert_eq!(link.poll_event(), Some(Event::Failed(Error::LinkLost)));
    }

    #[test]
    fn corrupt_frames_are_dropped_silently() {
        let mut port = vec![];
        let mut link = connected_link(&mut port);
        let mut bytes = wire(&Frame::Ack { ack_num: Wrap3::new(1) });
        bytes[1] ^= 0x01;
        link.send(&[0x00], &mut port, 100).unwrap();
        link.feed(&bytes, &mut port, 110).unwrap();
        assert_eq!(link.poll_event(), None);
        assert_eq!(link.metrics().crc_mismatches, 1);
        assert!(!link.is_ready());
    }
}
