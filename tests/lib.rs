//! End-to-end tests driving the full host stack against a simulated NCP on
//! an in-memory duplex pipe.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ezsp_host::codec::{self, Accumulator};
use ezsp_host::ezsp::aps::EmberApsFrame;
use ezsp_host::ezsp::{FrameId, KeyData};
use ezsp_host::frame::{Frame, Payload, Wrap3};
use ezsp_host::gp::{expected_mic, GpDevice, GpFrame, GpSecurityLevel, KeyStatus};
use ezsp_host::host::{EzspHost, EzspObserver, GpObserver, HostConfig};
use ezsp_host::link::LinkConfig;
use ezsp_host::Error;

#[derive(Default)]
struct Queue {
    buf: VecDeque<u8>,
    closed: bool,
}

type Shared = Arc<(Mutex<Queue>, Condvar)>;

/// One end of an in-memory duplex byte pipe. Reads block briefly like a
/// serial port with a receive timeout; dropping an end closes both queues.
struct PortEnd {
    rx: Shared,
    tx: Shared,
}

fn duplex() -> (PortEnd, PortEnd) {
    let a: Shared = Shared::default();
    let b: Shared = Shared::default();
    (
        PortEnd { rx: Arc::clone(&a), tx: Arc::clone(&b) },
        PortEnd { rx: b, tx: a },
    )
}

impl io::Read for PortEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (lock, cv) = &*self.rx;
        let mut queue = lock.lock().unwrap();
        if queue.buf.is_empty() && !queue.closed {
            let (guard, _) = cv.wait_timeout(queue, Duration::from_millis(5)).unwrap();
            queue = guard;
        }
        if queue.buf.is_empty() {
            if queue.closed {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let mut count = 0;
        while count < buf.len() {
            match queue.buf.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl io::Write for PortEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (lock, cv) = &*self.tx;
        let mut queue = lock.lock().unwrap();
        if queue.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"));
        }
        queue.buf.extend(buf);
        cv.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PortEnd {
    fn drop(&mut self) {
        for shared in [&self.rx, &self.tx] {
            let (lock, cv) = &**shared;
            lock.lock().unwrap().closed = true;
            cv.notify_all();
        }
    }
}

/// Scripted NCP: answers RST with RSTACK, acknowledges DATA frames and
/// responds to EZSP commands from a fixed table. Handler frames can be
/// injected through the returned sender.
struct FakeNcp {
    port: PortEnd,
    acc: Accumulator,
    expected: Wrap3,
    frm: Wrap3,
    inject: Receiver<Vec<u8>>,
    /// Frame ids that never get a response.
    drop_ids: Vec<u8>,
    /// Swallow DATA frames entirely (no ACK, no response).
    mute_data: bool,
    /// Protocol version announced in the `version` response.
    protocol: u8,
}

struct FakeNcpHandle {
    inject: Sender<Vec<u8>>,
}

impl FakeNcpHandle {
    fn inject_handler(&self, ezsp_payload: Vec<u8>) {
        self.inject.send(ezsp_payload).unwrap();
    }
}

impl FakeNcp {
    fn spawn(port: PortEnd, drop_ids: Vec<u8>, mute_data: bool, protocol: u8) -> FakeNcpHandle {
        let (tx, rx) = mpsc::channel();
        let ncp = Self {
            port,
            acc: Accumulator::new(),
            expected: Wrap3::default(),
            frm: Wrap3::default(),
            inject: rx,
            drop_ids,
            mute_data,
            protocol,
        };
        thread::spawn(move || ncp.run());
        FakeNcpHandle { inject: tx }
    }

    fn run(mut self) {
        let mut buf = [0u8; 256];
        loop {
            loop {
                match self.inject.try_recv() {
                    Ok(payload) => self.send_data(&payload),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }
            match io::Read::read(&mut self.port, &mut buf) {
                Ok(0) => return,
                Ok(n) => {
                    for i in 0..n {
                        if let Some(raw) = self.acc.push(buf[i]) {
                            let frame = Frame::parse(&raw[..raw.len() - 2]).unwrap();
                            self.handle_frame(frame);
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(_) => return,
            }
        }
    }

    fn send_frame(&mut self, frame: &Frame) {
        let _ = codec::write_frame(&mut self.port, &frame.encode());
    }

    fn send_data(&mut self, ezsp_payload: &[u8]) {
        let mut payload = Payload::new();
        payload.extend_from_slice(ezsp_payload);
        let frame = Frame::Data {
            frame_num: self.frm,
            ack_num: self.expected,
            retransmitted: false,
            payload,
        };
        self.frm = self.frm.next();
        self.send_frame(&frame);
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Rst => {
                self.expected = Wrap3::default();
                self.frm = Wrap3::default();
                self.send_frame(&Frame::RstAck { version: 2, code: 0x02 });
            }
            Frame::Data { frame_num, payload, .. } => {
                if self.mute_data {
                    return;
                }
                if frame_num == self.expected {
                    self.expected = self.expected.next();
                    self.send_frame(&Frame::Ack { ack_num: self.expected });
                    self.respond(&payload);
                }
            }
            _ => {}
        }
    }

    fn respond(&mut self, command: &[u8]) {
        let sequence = command[0];
        let (id, parameters) = if command[2] == 0xFF {
            (command[4], &command[5..])
        } else {
            (command[2], &command[3..])
        };
        if self.drop_ids.contains(&id) {
            return;
        }
        let response = match id {
            // version: legacy header, echo the negotiated protocol level.
            0x00 => {
                let desired = parameters[0];
                let level = if desired == self.protocol { desired } else { self.protocol };
                vec![sequence, 0x80, 0x00, level, 0x02, 0x30, 0x74]
            }
            // getChildData: nothing in the child table.
            0x4A => vec![sequence, 0x80, 0xFF, 0x00, id, 0xB1],
            // Anything else succeeds with a bare status byte.
            _ => vec![sequence, 0x80, 0xFF, 0x00, id, 0x00],
        };
        self.send_data(&response);
    }
}

fn test_config() -> HostConfig {
    HostConfig {
        command_timeout: Duration::from_millis(500),
        open_timeout: Duration::from_secs(5),
        link: LinkConfig {
            ack_timeout_init: 200,
            ack_timeout_min: 50,
            ack_timeout_max: 400,
            ..LinkConfig::default()
        },
        ..HostConfig::default()
    }
}

fn open_host(drop_ids: Vec<u8>, mute_data: bool, protocol: u8) -> (EzspHost, FakeNcpHandle) {
    let (host_end, ncp_end) = duplex();
    let ncp = FakeNcp::spawn(ncp_end, drop_ids, mute_data, protocol);
    let host = EzspHost::open_transport(host_end, test_config()).unwrap();
    (host, ncp)
}

/// Polls a predicate until it holds or the deadline passes.
fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<(FrameId, Vec<u8>)>>,
}

impl EzspObserver for Recorder {
    fn on_ezsp_message(&self, frame_id: FrameId, parameters: &[u8]) {
        self.messages.lock().unwrap().push((frame_id, parameters.to_vec()));
    }
}

#[derive(Default)]
struct GpRecorder {
    frames: Mutex<Vec<(GpFrame, KeyStatus)>>,
    sightings: Mutex<Vec<(u32, bool, KeyStatus)>>,
}

impl GpObserver for GpRecorder {
    fn on_rx_gp_frame(&self, frame: &GpFrame, status: KeyStatus) {
        self.frames.lock().unwrap().push((frame.clone(), status));
    }

    fn on_rx_gpd_id(&self, source_id: u32, known: bool, status: KeyStatus) {
        self.sightings.lock().unwrap().push((source_id, known, status));
    }
}

/// Builds a `gpepIncomingMessageHandler` parameter block for a source-id
/// frame, per the EZSP wire layout.
fn gp_report(frame: &GpFrame) -> Vec<u8> {
    let mut block = vec![0x00, frame.link_value, frame.sequence_number];
    block.push(0x00); // application id 0
    block.extend_from_slice(&frame.source_id.to_le_bytes());
    block.extend_from_slice(&[0; 4]);
    block.push(0x00); // endpoint
    block.push(frame.security as u8);
    block.push(frame.key_type as u8);
    block.push(u8::from(frame.auto_commissioning));
    block.push(u8::from(frame.rx_after_tx));
    block.extend_from_slice(&frame.security_frame_counter.to_le_bytes());
    block.push(frame.command_id);
    block.extend_from_slice(&frame.mic.to_le_bytes());
    block.push(frame.proxy_table_entry);
    block.push(frame.payload.len() as u8);
    block.extend_from_slice(&frame.payload);
    block
}

fn gp_handler_payload(frame: &GpFrame) -> Vec<u8> {
    let mut payload = vec![0xF0, 0x90, 0xFF, 0x00, 0xC5];
    payload.extend_from_slice(&gp_report(frame));
    payload
}

#[test]
fn open_negotiates_protocol_version() {
    let (host, _ncp) = open_host(vec![], false, 0x08);
    let info = host.version_info();
    assert_eq!(info.protocol_version, 0x08);
    assert_eq!(info.stack_version, 0x7430);
    host.close();
}

#[test]
fn open_renegotiates_when_ncp_is_older() {
    let (host, _ncp) = open_host(vec![], false, 0x07);
    assert_eq!(host.version_info().protocol_version, 0x07);
}

#[test]
fn open_fails_when_ncp_never_answers() {
    let (host_end, ncp_end) = duplex();
    // No NCP thread at all; the RSTACK never comes.
    let config = HostConfig {
        open_timeout: Duration::from_secs(10),
        link: LinkConfig {
            ack_timeout_init: 30,
            ack_timeout_min: 10,
            ack_timeout_max: 60,
            max_reset_attempts: 2,
            ..LinkConfig::default()
        },
        ..test_config()
    };
    let result = EzspHost::open_transport(host_end, config);
    assert!(matches!(result.err(), Some(Error::ResetFailed)));
    drop(ncp_end);
}

#[test]
fn commands_complete_in_submission_order() {
    let (host, _ncp) = open_host(vec![], false, 0x08);
    let first = host.send_command(FrameId::NetworkState, &[]).unwrap();
    let second = host.send_command(FrameId::LeaveNetwork, &[]).unwrap();
    let first = first.wait().unwrap();
    let second = second.wait().unwrap();
    assert_eq!(first.frame_id, FrameId::NetworkState);
    assert_eq!(second.frame_id, FrameId::LeaveNetwork);
}

#[test]
fn link_metrics_count_traffic() {
    let (host, _ncp) = open_host(vec![], false, 0x08);
    host.send_command(FrameId::NetworkState, &[]).unwrap().wait().unwrap();
    let metrics = host.link_metrics().unwrap();
    // At least the version exchange and the command above.
    assert!(metrics.data_sent >= 2);
    assert!(metrics.data_received >= 2);
    assert_eq!(metrics.crc_mismatches, 0);
}

#[test]
fn network_helpers_run_against_the_command_table() {
    let (host, _ncp) = open_host(vec![], false, 0x08);
    // The scripted child table is empty from index zero.
    assert_eq!(host.children().unwrap(), vec![]);
    host.open_network(60).unwrap();
    host.close_network().unwrap();
    host.leave_network().unwrap();
    host.sink_table_init().unwrap();

    let aps = EmberApsFrame::new(0x0104, 0x0006, 1);
    host.send_unicast(0x1234, &aps, 0, &[0x10, 0x01, 0x00]).unwrap();
    host.send_broadcast(ezsp_host::ezsp::aps::BROADCAST_RX_ON_IDLE, &aps, 0, 0, &[0x00])
        .unwrap();
}

#[test]
fn unanswered_command_times_out() {
    let (host, _ncp) = open_host(vec![0x1E], false, 0x08);
    let handle = host.send_command(FrameId::FormNetwork, &[0; 20]).unwrap();
    assert_eq!(handle.wait(), Err(Error::CommandTimeout));
    // The pipeline keeps going afterwards.
    let state = host.send_command(FrameId::NetworkState, &[]).unwrap();
    assert!(state.wait().is_ok());
}

#[test]
fn cancelled_queued_command_resolves_immediately() {
    let (host, _ncp) = open_host(vec![0x1E], false, 0x08);
    let blocked = host.send_command(FrameId::FormNetwork, &[0; 20]).unwrap();
    let queued = host.send_command(FrameId::NetworkState, &[]).unwrap();
    queued.cancel();
    assert_eq!(queued.wait(), Err(Error::Cancelled));
    assert_eq!(blocked.wait(), Err(Error::CommandTimeout));
}

#[test]
fn handler_frames_reach_ezsp_observers() {
    let (host, ncp) = open_host(vec![], false, 0x08);
    let recorder = Arc::new(Recorder::default());
    host.register_ezsp_observer(recorder.clone());

    ncp.inject_handler(vec![0xE1, 0x90, 0xFF, 0x00, 0x19, 0x90]);
    assert!(wait_until(Duration::from_secs(2), || {
        recorder
            .messages
            .lock()
            .unwrap()
            .iter()
            .any(|(id, params)| *id == FrameId::StackStatusHandler && params == &[0x90])
    }));
}

#[test]
fn unregistered_observer_stops_receiving_handlers() {
    let (host, ncp) = open_host(vec![], false, 0x08);
    let recorder = Arc::new(Recorder::default());
    let handle = host.register_ezsp_observer(recorder.clone());

    ncp.inject_handler(vec![0x01, 0x90, 0xFF, 0x00, 0x19, 0x90]);
    assert!(wait_until(Duration::from_secs(2), || {
        !recorder.messages.lock().unwrap().is_empty()
    }));

    assert!(host.unregister_observer(handle));
    assert!(!host.unregister_observer(handle));
    ncp.inject_handler(vec![0x02, 0x90, 0xFF, 0x00, 0x19, 0x91]);
    // Give the second handler time to arrive; it must not be recorded.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(recorder.messages.lock().unwrap().len(), 1);
}

#[test]
fn valid_gp_frame_is_authenticated_and_delivered() {
    let (host, ncp) = open_host(vec![], false, 0x08);
    let recorder = Arc::new(GpRecorder::default());
    host.register_gp_observer(recorder.clone());

    let key = KeyData::default();
    host.add_gp_device(GpDevice::new(0x0001_A1B2, key)).unwrap();

    let mut frame = GpFrame {
        source_id: 0x0001_A1B2,
        security: GpSecurityLevel::FrameCounterMic,
        security_frame_counter: 1,
        command_id: 0x20,
        ..GpFrame::default()
    };
    frame.mic = expected_mic(&frame, &key).unwrap();
    ncp.inject_handler(gp_handler_payload(&frame));

    assert!(wait_until(Duration::from_secs(2), || {
        recorder
            .frames
            .lock()
            .unwrap()
            .iter()
            .any(|(f, status)| f.source_id == 0x0001_A1B2 && *status == KeyStatus::Valid)
    }));
    let sightings = recorder.sightings.lock().unwrap();
    assert!(sightings.contains(&(0x0001_A1B2, true, KeyStatus::Valid)));
}

#[test]
fn tampered_gp_frame_reports_invalid_mic() {
    let (host, ncp) = open_host(vec![], false, 0x08);
    let recorder = Arc::new(GpRecorder::default());
    host.register_gp_observer(recorder.clone());

    let key = KeyData::default();
    host.add_gp_device(GpDevice::new(0x0001_A1B2, key)).unwrap();

    let mut frame = GpFrame {
        source_id: 0x0001_A1B2,
        security: GpSecurityLevel::FrameCounterMic,
        security_frame_counter: 1,
        command_id: 0x20,
        ..GpFrame::default()
    };
    frame.mic = expected_mic(&frame, &key).unwrap() ^ 0x0000_0001;
    ncp.inject_handler(gp_handler_payload(&frame));

    assert!(wait_until(Duration::from_secs(2), || {
        recorder
            .sightings
            .lock()
            .unwrap()
            .contains(&(0x0001_A1B2, true, KeyStatus::Invalid))
    }));
}

#[test]
fn unknown_gp_source_reports_undefined_key() {
    let (host, ncp) = open_host(vec![], false, 0x08);
    let recorder = Arc::new(GpRecorder::default());
    host.register_gp_observer(recorder.clone());

    let frame = GpFrame {
        source_id: 0xDDDD_0001,
        security: GpSecurityLevel::FrameCounterMic,
        security_frame_counter: 9,
        command_id: 0x10,
        mic: 0x1234_5678,
        ..GpFrame::default()
    };
    ncp.inject_handler(gp_handler_payload(&frame));

    assert!(wait_until(Duration::from_secs(2), || {
        recorder
            .sightings
            .lock()
            .unwrap()
            .contains(&(0xDDDD_0001, false, KeyStatus::Undefined))
    }));
    // The parsed view is still delivered for the application to decide.
    let frames = recorder.frames.lock().unwrap();
    assert!(frames.iter().any(|(f, s)| f.source_id == 0xDDDD_0001
        && *s == KeyStatus::Undefined
        && f.security_frame_counter == 9));
}

#[test]
fn losing_the_link_fails_pending_commands() {
    let (host_end, ncp_end) = duplex();
    // This NCP connects but never acknowledges DATA frames.
    let _ncp = FakeNcp::spawn(ncp_end, vec![], true, 0x08);
    let config = HostConfig {
        command_timeout: Duration::from_secs(10),
        link: LinkConfig {
            ack_timeout_init: 30,
            ack_timeout_min: 10,
            ack_timeout_max: 60,
            max_retransmits: 1,
            ..LinkConfig::default()
        },
        ..test_config()
    };
    let result = EzspHost::open_transport(host_end, config);
    // The version command dies with the link.
    assert!(matches!(result.err(), Some(Error::LinkReset)));
}
