// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use log::{error, info};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::Error;

/// How long a read blocks before reporting no data; this is also the upper
/// bound on the transceiver loop's reaction time to timers and requests.
const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Opens the NCP's UART: 8 data bits, no parity, one stop bit, no flow
/// control (ASH does its own with XON/XOFF bytes reserved at the framing
/// level).
///
/// # Errors
///
/// * `Err(Error::Open)` when the device cannot be opened or configured
pub fn open(port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, Error> {
    let port = serialport::new(port_name, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| {
            error!("failed to open {port_name}: {e}");
            Error::Open
        })?;
    info!("opened {port_name} at {baud_rate} 8-N-1");
    Ok(port)
}
