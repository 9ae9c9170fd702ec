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


use crate::codec::{self, Header, NodeIdentity};
use crate::config::RadioSettings;
use crate::error::{ConsoleError, Result};
use crate::ser::LoraSer;
use format_escape_default::format_escape_default;
use log::*;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/** How long to wait after the first received byte shows up before
reading the packet.  At 9600 baud a full 240 byte packet needs about
250ms to cross the UART; the rest is slack.  Given in ms. */
const RX_SETTLE_MILLIS: u64 = 500;

/// How long the module gets to answer a register write.  Given in ms.
const CFG_REPLY_MILLIS: u64 = 200;

/// Extra time to let the rest of a register reply arrive.  Given in ms.
const CFG_TAIL_MILLIS: u64 = 100;

const CFG_ATTEMPTS: usize = 2;

/// Header of a register write: write command, start register, length.
const CFG_WRITE: [u8; 3] = [0xC2, 0x00, 0x09];

/// First byte of a successful register reply.
const CFG_ACK: u8 = 0xC1;

/// Asks the module for the current channel noise RSSI.
const NOISE_QUERY: [u8; 6] = [0xC0, 0xC1, 0xC2, 0xC3, 0x00, 0x02];

/// UART 9600 8N1, the rate the serial side is always run at.
const UART_9600: u8 = 0x60;

/// Enables reading channel noise via [`NOISE_QUERY`].
const NOISE_ENABLE: u8 = 0x20;

/// Enables the packet RSSI byte after each received message.
const PACKET_RSSI_ENABLE: u8 = 0x80;

/// Received fixed part: source address and source offset.
const RX_HEADER_LEN: usize = 3;

/// A frame as delivered by the module.  The module strips the destination
/// part of the header, so only the sender is known.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub source_address: u16,
    pub frequency_mhz: u16,
    pub payload: Vec<u8>,
    /// Packet RSSI in dBm, when the module reports it.
    pub rssi_dbm: Option<i16>,
    /// Channel noise RSSI in dBm, when queried.
    pub noise_dbm: Option<i16>,
}

/// What the console needs from a radio.
pub trait RadioLink {
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Never blocks waiting for traffic; `Ok(None)` if nothing came in.
    fn receive(&mut self) -> Result<Option<Frame>>;

    fn address(&self) -> u16;

    fn frequency_offset(&self) -> u8;
}

/// Locks a shared radio.  A panic on another thread while it held the
/// lock doesn't leave the serial port in a state we can't use.
pub fn lock<R>(radio: &Mutex<R>) -> MutexGuard<'_, R> {
    radio.lock().unwrap_or_else(PoisonError::into_inner)
}

fn rssi_dbm(raw: u8) -> i16 {
    -(256 - i16::from(raw))
}

/// Builds the register block written at configuration time.
pub fn register_block(identity: &NodeIdentity, settings: &RadioSettings) -> Result<[u8; 12]> {
    let offset = codec::to_offset(identity.frequency_mhz)?;
    let rssi = if settings.rssi { PACKET_RSSI_ENABLE } else { 0 };
    let addr = identity.address.to_be_bytes();
    let crypt = settings.crypt_key.to_be_bytes();

    let mut block = [0u8; 12];
    block[..3].copy_from_slice(&CFG_WRITE);
    if settings.relay {
        block[3] = 0x01;
        block[4] = 0x02;
        block[5] = 0x03;
        block[9] = 0x03 + rssi;
    } else {
        block[3] = addr[0];
        block[4] = addr[1];
        block[5] = settings.net_id;
        block[9] = 0x43 + rssi;
    }
    block[6] = UART_9600 + settings.air_speed.register_bits();
    block[7] = settings.power.register_bits() + NOISE_ENABLE;
    block[8] = offset;
    block[10] = crypt[0];
    block[11] = crypt[1];
    Ok(block)
}

/// Decodes a received packet: source address, source offset, payload and,
/// if `with_rssi`, a trailing RSSI byte.
pub fn decode_received(buf: &[u8], band_base: u16, with_rssi: bool) -> Result<Frame> {
    let trailer = if with_rssi { 1 } else { 0 };
    if buf.len() < RX_HEADER_LEN + trailer {
        return Err(ConsoleError::receive(format!(
            "short packet of {} bytes: {}", buf.len(), hex::encode(buf))));
    }
    let end = buf.len() - trailer;
    Ok(Frame {
        source_address: u16::from_be_bytes([buf[0], buf[1]]),
        frequency_mhz: band_base + u16::from(buf[2]),
        payload: buf[RX_HEADER_LEN..end].to_vec(),
        rssi_dbm: if with_rssi { Some(rssi_dbm(buf[end])) } else { None },
        noise_dbm: None,
    })
}

pub struct Sx126x {
    ser: LoraSer,
    address: u16,
    offset: u8,
    band_base: u16,
    rssi: bool,
}

impl Sx126x {
    pub fn new(ser: LoraSer, identity: &NodeIdentity, settings: &RadioSettings) -> Result<Sx126x> {
        let endpoint = identity.endpoint()?;
        Ok(Sx126x {
            ser,
            address: endpoint.address,
            offset: endpoint.offset,
            band_base: codec::band_base(identity.frequency_mhz),
            rssi: settings.rssi,
        })
    }

    /// Writes the parameter registers.  The module must already be in
    /// configuration mode.
    pub fn radiocfg(&mut self, identity: &NodeIdentity, settings: &RadioSettings) -> Result<()> {
        let block = register_block(identity, settings)?;
        debug!("Configuring radio: {}", hex::encode(block));
        self.ser.clear_input()?;

        for attempt in 1..=CFG_ATTEMPTS {
            self.ser.write_frame(&block).map_err(ConsoleError::Transmit)?;
            thread::sleep(Duration::from_millis(CFG_REPLY_MILLIS));

            if self.ser.bytes_waiting()? > 0 {
                thread::sleep(Duration::from_millis(CFG_TAIL_MILLIS));
                let reply = self.ser.read_waiting()?;
                return if reply.first() == Some(&CFG_ACK) {
                    info!("Radio parameters accepted");
                    Ok(())
                } else {
                    Err(ConsoleError::config(format!(
                        "radio rejected parameters: {}", hex::encode(&reply))))
                };
            }

            warn!("No reply to register write (attempt {}), retrying", attempt);
            self.ser.clear_input()?;
            thread::sleep(Duration::from_millis(CFG_REPLY_MILLIS));
        }
        Err(ConsoleError::config("radio did not answer the register write; is it in configuration mode?"))
    }

    /// Queries the channel noise.  None if the module gave no usable reply.
    fn noise_dbm(&mut self) -> Result<Option<i16>> {
        self.ser.write_frame(&NOISE_QUERY).map_err(ConsoleError::Transmit)?;
        thread::sleep(Duration::from_millis(RX_SETTLE_MILLIS));
        let reply = self.ser.read_waiting()?;
        if reply.len() > 3 && reply[..3] == [CFG_ACK, 0x00, 0x02] {
            Ok(Some(rssi_dbm(reply[3])))
        } else {
            debug!("Unexpected noise reply: {}", hex::encode(&reply));
            Ok(None)
        }
    }
}

impl RadioLink for Sx126x {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if let Some((header, payload)) = Header::parse(frame) {
            trace!("TX to {}/{} from {}/{}: {}", header.dest.address, header.dest.offset,
                   header.src.address, header.src.offset, format_escape_default(payload));
        }
        self.ser.write_frame(frame).map_err(ConsoleError::Transmit)
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        let waiting = self.ser.bytes_waiting()
            .map_err(|e| ConsoleError::receive(e.to_string()))?;
        if waiting == 0 {
            return Ok(None);
        }

        // Give the rest of the packet a chance to arrive.
        thread::sleep(Duration::from_millis(RX_SETTLE_MILLIS));
        let buf = self.ser.read_waiting()
            .map_err(|e| ConsoleError::receive(e.to_string()))?;
        let mut frame = decode_received(&buf, self.band_base, self.rssi)?;
        trace!("DECODED: {}", format_escape_default(&frame.payload));

        if self.rssi {
            frame.noise_dbm = match self.noise_dbm() {
                Ok(noise) => noise,
                Err(e) => {
                    warn!("Noise query failed: {}", e);
                    None
                }
            };
        }
        Ok(Some(frame))
    }

    fn address(&self) -> u16 {
        self.address
    }

    fn frequency_offset(&self) -> u8 {
        self.offset
    }
}
