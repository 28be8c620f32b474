// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Arc, Mutex};

use crate::ezsp::FrameId;
use crate::gp::{GpFrame, KeyStatus};

/// Coarse adapter state reported to EZSP observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DongleState {
    /// The reset handshake is in progress.
    Connecting,
    /// The link is up and the command pipeline is running.
    Ready,
    /// The RST/RSTACK handshake failed; the driver keeps retrying.
    ResetFailed,
    /// An established link went down; pending commands were cancelled.
    LinkLost,
}

/// Receives adapter state changes and unsolicited EZSP handler frames.
/// Callbacks run on the transceiver thread and must not block.
pub trait EzspObserver: Send + Sync {
    fn on_dongle_state(&self, _state: DongleState) {}

    fn on_ezsp_message(&self, _frame_id: FrameId, _parameters: &[u8]) {}
}

/// Receives decoded Green Power traffic. Callbacks run on the transceiver
/// thread and must not block.
pub trait GpObserver: Send + Sync {
    /// A GP frame was decoded; `status` reports the MIC verdict.
    fn on_rx_gp_frame(&self, _frame: &GpFrame, _status: KeyStatus) {}

    /// Source-id sighting, with whether a key is on file and the verdict.
    fn on_rx_gpd_id(&self, _source_id: u32, _known: bool, _status: KeyStatus) {}
}

/// Token returned on registration; used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(u64);

/// One-way subscription lists. The registry owns the observers; dispatch
/// works on a snapshot so an observer may unregister (or register another)
/// from within its own callback.
#[derive(Default)]
pub struct Registry {
    next_handle: u64,
    ezsp: Vec<(u64, Arc<dyn EzspObserver>)>,
    gp: Vec<(u64, Arc<dyn GpObserver>)>,
}

impl Registry {
    pub fn register_ezsp(&mut self, observer: Arc<dyn EzspObserver>) -> ObserverHandle {
        self.next_handle += 1;
        self.ezsp.push((self.next_handle, observer));
        ObserverHandle(self.next_handle)
    }

    pub fn register_gp(&mut self, observer: Arc<dyn GpObserver>) -> ObserverHandle {
        self.next_handle += 1;
        self.gp.push((self.next_handle, observer));
        ObserverHandle(self.next_handle)
    }

    pub fn unregister(&mut self, handle: ObserverHandle) -> bool {
        let ezsp_before = self.ezsp.len();
        let gp_before = self.gp.len();
        self.ezsp.retain(|(id, _)| *id != handle.0);
        self.gp.retain(|(id, _)| *id != handle.0);
        self.ezsp.len() != ezsp_before || self.gp.len() != gp_before
    }

    fn ezsp_snapshot(&self) -> Vec<Arc<dyn EzspObserver>> {
        self.ezsp.iter().map(|(_, o)| Arc::clone(o)).collect()
    }

    fn gp_snapshot(&self) -> Vec<Arc<dyn GpObserver>> {
        self.gp.iter().map(|(_, o)| Arc::clone(o)).collect()
    }
}

/// Dispatch helpers over the shared registry.
pub(crate) struct SharedRegistry(pub Arc<Mutex<Registry>>);

impl SharedRegistry {
    fn ezsp(&self) -> Vec<Arc<dyn EzspObserver>> {
        self.0.lock().map(|r| r.ezsp_snapshot()).unwrap_or_default()
    }

    fn gp(&self) -> Vec<Arc<dyn GpObserver>> {
        self.0.lock().map(|r| r.gp_snapshot()).unwrap_or_default()
    }

    pub fn notify_state(&self, state: DongleState) {
        for observer in self.ezsp() {
            observer.on_dongle_state(state);
        }
    }

    pub fn notify_message(&self, frame_id: FrameId, parameters: &[u8]) {
        for observer in self.ezsp() {
            observer.on_ezsp_message(frame_id, parameters);
        }
    }

    pub fn notify_gp_frame(&self, frame: &GpFrame, status: KeyStatus) {
        for observer in self.gp() {
            observer.on_rx_gp_frame(frame, status);
        }
    }

    pub fn notify_gpd_id(&self, source_id: u32, known: bool, status: KeyStatus) {
        for observer in self.gp() {
            observer.on_rx_gpd_id(source_id, known, status);
        }
    }
}
