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


use crate::broadcast::Broadcaster;
use crate::clock::ClockSource;
use crate::codec::{self, Endpoint, NodeIdentity};
use crate::error::Result;
use crate::input::{Key, Keyboard};
use crate::sx126x::{self, Frame, RadioLink};
use crate::terminal::{ModeSwitch, TerminalGuard};
use format_escape_default::format_escape_default;
use log::*;
use std::io::Write;
use std::mem;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Pause between idle iterations when no key was pressed.  Given in ms.
const LOOP_PAUSE_MILLIS: u64 = 20;

/// Where the console is.  `Composing` and `Broadcasting` block on the
/// keyboard, so nothing is received while in them.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    /// Waiting for a command key.
    Idle,
    /// Collecting a line to send to the peer.
    Composing(Vec<u8>),
    /// Telemetry is going out; waiting for `c`.
    Broadcasting,
    Terminated,
}

/// Drops the last character, including all bytes of a UTF-8 sequence.
/// False if there was nothing to drop.
fn erase_last(buf: &mut Vec<u8>) -> bool {
    let mut erased = false;
    while let Some(b) = buf.pop() {
        erased = true;
        if b & 0xC0 != 0x80 {
            break;
        }
    }
    erased
}

pub struct SessionController<R, K, C, W> {
    radio: Arc<Mutex<R>>,
    keyboard: K,
    broadcaster: Broadcaster<R, C>,
    out: W,
    local: Endpoint,
    peer: NodeIdentity,
    peer_endpoint: Endpoint,
    interval: Duration,
    pause: Duration,
    state: SessionState,
}

impl<R, K, C, W> SessionController<R, K, C, W>
where
    R: RadioLink + Send + 'static,
    K: Keyboard,
    C: ClockSource + 'static,
    W: Write,
{
    /// Fails if the peer's frequency has no valid offset.
    pub fn new(radio: Arc<Mutex<R>>, keyboard: K, clock: Arc<C>, out: W,
               peer: NodeIdentity, interval: Duration) -> Result<SessionController<R, K, C, W>> {
        let peer_endpoint = peer.endpoint()?;
        let local = {
            let r = sx126x::lock(&radio);
            Endpoint { address: r.address(), offset: r.frequency_offset() }
        };
        let broadcaster = Broadcaster::new(Arc::clone(&radio), clock);
        Ok(SessionController {
            radio, keyboard, broadcaster, out, local, peer, peer_endpoint, interval,
            pause: Duration::from_millis(LOOP_PAUSE_MILLIS),
            state: SessionState::Idle,
        })
    }

    #[cfg(test)]
    pub fn with_pause(mut self, pause: Duration) -> SessionController<R, K, C, W> {
        self.pause = pause;
        self
    }

    /// Overrides the broadcaster's post-send pause.
    #[cfg(test)]
    pub fn with_settle(mut self, settle: Duration) -> SessionController<R, K, C, W> {
        self.broadcaster = self.broadcaster.with_settle(settle);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Runs with the terminal in cbreak mode, restoring it on the way out
    /// however the session ends.
    pub fn run_guarded<M: ModeSwitch>(&mut self, mode: M) -> Result<()> {
        let _guard = TerminalGuard::acquire(mode)?;
        self.run()
    }

    pub fn run(&mut self) -> Result<()> {
        self.menu()?;
        while self.state != SessionState::Terminated {
            self.step()?;
        }
        info!("Session ended");
        Ok(())
    }

    /// Performs one transition.  Any error ends the session.
    pub fn step(&mut self) -> Result<()> {
        let res = match mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Idle => self.idle(),
            SessionState::Composing(buf) => self.compose(buf),
            SessionState::Broadcasting => self.broadcasting(),
            SessionState::Terminated => Ok(SessionState::Terminated),
        };
        match res {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Terminated;
                Err(e)
            }
        }
    }

    fn menu(&mut self) -> Result<()> {
        writeln!(self.out, "Press \x1b[1;32mEsc\x1b[0m to exit")?;
        writeln!(self.out, "Press \x1b[1;32mi\x1b[0m   to send a message")?;
        writeln!(self.out, "Press \x1b[1;32ms\x1b[0m   to send CPU temperature every {} seconds",
                 self.interval.as_secs_f64())?;
        self.out.flush()?;
        Ok(())
    }

    fn idle(&mut self) -> Result<SessionState> {
        let key = self.keyboard.poll()?;
        let next = match key {
            Some(Key::Esc) | Some(Key::Interrupt) => return Ok(SessionState::Terminated),
            Some(Key::Byte(b'i')) => {
                self.compose_prompt()?;
                SessionState::Composing(Vec::new())
            }
            Some(Key::Byte(b's')) => self.start_broadcast()?,
            Some(other) => {
                trace!("Ignoring {:?}", other);
                SessionState::Idle
            }
            None => SessionState::Idle,
        };
        self.out.flush()?;

        self.drain()?;
        if key.is_none() {
            thread::sleep(self.pause);
        }
        Ok(next)
    }

    fn compose_prompt(&mut self) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Enter a message such as: \x1b[1;32mHello World\x1b[0m")?;
        writeln!(self.out, "This will send 'Hello World' to a LoRa node with device address {} on frequency {} MHz.",
                 self.peer.address, self.peer.frequency_mhz)?;
        write!(self.out, "Input your message followed by Enter: ")?;
        Ok(())
    }

    /// Erases the prompt lines, leaving the cursor where they began.
    fn clear_compose_prompt(&mut self) -> Result<()> {
        write!(self.out, "\x1b[2A\r")?;
        for _ in 0..3 {
            write!(self.out, "\x1b[2K\n")?;
        }
        write!(self.out, "\x1b[3A\r")?;
        Ok(())
    }

    fn compose(&mut self, mut buf: Vec<u8>) -> Result<SessionState> {
        let next = match self.keyboard.read_blocking()? {
            Key::Enter => {
                self.clear_compose_prompt()?;
                self.send_message(&buf)?;
                SessionState::Idle
            }
            Key::Interrupt => {
                debug!("Message discarded");
                self.clear_compose_prompt()?;
                SessionState::Idle
            }
            Key::Erase => {
                if erase_last(&mut buf) {
                    write!(self.out, "\x08 \x08")?;
                }
                SessionState::Composing(buf)
            }
            Key::Esc => SessionState::Composing(buf),
            Key::Byte(b) => {
                buf.push(b);
                self.out.write_all(&[b])?;
                SessionState::Composing(buf)
            }
        };
        self.out.flush()?;
        Ok(next)
    }

    fn send_message(&mut self, msg: &[u8]) -> Result<()> {
        trace!("MSG: {}", format_escape_default(msg));
        let frame = codec::encode_to(self.peer_endpoint, self.local, msg);
        let res = sx126x::lock(&self.radio).send(&frame);
        if res.is_ok() {
            info!("Sent {} byte message to node {}", msg.len(), self.peer.address);
        }
        self.link_result(res)
    }

    fn start_broadcast(&mut self) -> Result<SessionState> {
        match self.broadcaster.start(self.interval) {
            Ok(()) => {
                writeln!(self.out, "Press \x1b[1;32mc\x1b[0m   to exit the send task")?;
                Ok(SessionState::Broadcasting)
            }
            Err(e) => {
                self.link_result(Err(e))?;
                Ok(SessionState::Idle)
            }
        }
    }

    fn broadcasting(&mut self) -> Result<SessionState> {
        match self.keyboard.read_blocking()? {
            Key::Byte(b'c') | Key::Interrupt => {
                let res = self.broadcaster.stop();
                write!(self.out, "\x1b[1A\r\x1b[2K")?;
                self.link_result(res)?;
                self.out.flush()?;
                Ok(SessionState::Idle)
            }
            _ => Ok(SessionState::Broadcasting),
        }
    }

    /// Receives at most one frame and shows it.
    fn drain(&mut self) -> Result<()> {
        let res = sx126x::lock(&self.radio).receive();
        match res {
            Ok(Some(frame)) => self.show(&frame),
            Ok(None) => Ok(()),
            Err(e) => self.link_result(Err(e)),
        }
    }

    fn show(&mut self, frame: &Frame) -> Result<()> {
        writeln!(self.out, "\rReceived from node \x1b[1;32m{}\x1b[0m on \x1b[1;32m{}.125 MHz\x1b[0m",
                 frame.source_address, frame.frequency_mhz)?;
        writeln!(self.out, "Message: {}", String::from_utf8_lossy(&frame.payload))?;
        if let Some(rssi) = frame.rssi_dbm {
            writeln!(self.out, "Packet RSSI: {} dBm", rssi)?;
        }
        if let Some(noise) = frame.noise_dbm {
            writeln!(self.out, "Channel noise RSSI: {} dBm", noise)?;
        }
        self.out.flush()?;
        Ok(())
    }

    /// Link failures are shown to the operator and swallowed; anything
    /// else is passed up.
    fn link_result(&mut self, res: Result<()>) -> Result<()> {
        match res {
            Err(e) if e.is_link_error() => {
                error!("{}", e);
                writeln!(self.out, "\r\x1b[1;31m{}\x1b[0m", e)?;
                Ok(())
            }
            other => other,
        }
    }
}
