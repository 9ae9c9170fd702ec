/*
    Copyright (C) 2019  John Goerzen <jgoerzen@complete.org

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <http://www.gnu.org/licenses/>.

*/


use std::io;
use std::io::{Read, Write};
use std::time::Duration;
use log::*;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

/// How long a read may block once we know bytes are waiting.
const READ_TIMEOUT_MILLIS: u64 = 100;

pub struct LoraSer {
    port: Box<dyn SerialPort>,
    pub portname: String
}

impl LoraSer {

    /// Initialize the serial system, configuring the port.
    pub fn new(portname: &str, baud: u32) -> io::Result<LoraSer> {
        let port = serialport::new(portname, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(READ_TIMEOUT_MILLIS))
            .open()?;
        debug!("{}: opened at {} baud", portname, baud);
        Ok(LoraSer {port, portname: String::from(portname)})
    }

    /// Number of received bytes sitting in the input buffer.
    pub fn bytes_waiting(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    /// Read everything currently waiting.  Empty if nothing is.
    pub fn read_waiting(&mut self) -> io::Result<Vec<u8>> {
        let waiting = self.bytes_waiting()?;
        let mut buf = vec![0u8; waiting];
        if waiting > 0 {
            self.port.read_exact(&mut buf)?;
        }
        trace!("{} SERIN: {}", self.portname, hex::encode(&buf));
        Ok(buf)
    }

    /// Transmits raw bytes.
    pub fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        trace!("{} SEROUT: {}", self.portname, hex::encode(data));
        self.port.write_all(data)?;
        self.port.flush()
    }

    /// Discard anything received but not yet read.
    pub fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
