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


//! Doubles for the radio, clock, keyboard and terminal used by the unit
//! tests.

use crate::clock::ClockSource;
use crate::error::{ConsoleError, Result};
use crate::input::{Key, Keyboard};
use crate::sx126x::{Frame, RadioLink};
use crate::terminal::ModeSwitch;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Records everything sent and hands out queued receive results.
pub struct MockRadio {
    pub address: u16,
    pub offset: u8,
    pub sent: Vec<Vec<u8>>,
    /// Which thread made each send, in order.
    pub senders: Vec<ThreadId>,
    /// How long each send holds the radio.
    pub send_delay: Duration,
    pub receives: usize,
    pub inbound: VecDeque<Result<Option<Frame>>>,
    pub fail_sends: bool,
}

impl MockRadio {
    pub fn new(address: u16, offset: u8) -> MockRadio {
        MockRadio {
            address,
            offset,
            sent: Vec::new(),
            senders: Vec::new(),
            send_delay: Duration::from_millis(0),
            receives: 0,
            inbound: VecDeque::new(),
            fail_sends: false,
        }
    }
}

impl RadioLink for MockRadio {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if self.fail_sends {
            return Err(ConsoleError::Transmit(io::Error::new(io::ErrorKind::BrokenPipe, "radio unplugged")));
        }
        thread::sleep(self.send_delay);
        self.sent.push(frame.to_vec());
        self.senders.push(thread::current().id());
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        self.receives += 1;
        self.inbound.pop_front().unwrap_or(Ok(None))
    }

    fn address(&self) -> u16 {
        self.address
    }

    fn frequency_offset(&self) -> u8 {
        self.offset
    }
}

pub struct FixedClock {
    celsius: f64,
}

impl FixedClock {
    pub fn new(celsius: f64) -> FixedClock {
        FixedClock { celsius }
    }
}

impl ClockSource for FixedClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn cpu_temperature_celsius(&self) -> io::Result<f64> {
        Ok(self.celsius)
    }
}

/// Plays back a script.  `None` entries are polls that find nothing;
/// blocking reads skip them.  Once the script runs out, polls see Esc and
/// blocking reads see end of input.
pub struct ScriptedKeyboard {
    script: VecDeque<Option<u8>>,
}

impl ScriptedKeyboard {
    pub fn new(script: Vec<Option<u8>>) -> ScriptedKeyboard {
        ScriptedKeyboard { script: script.into_iter().collect() }
    }

    /// Every byte of `text` as a ready key.
    pub fn typed(text: &[u8]) -> ScriptedKeyboard {
        ScriptedKeyboard::new(text.iter().map(|b| Some(*b)).collect())
    }
}

impl Keyboard for ScriptedKeyboard {
    fn poll(&mut self) -> io::Result<Option<Key>> {
        Ok(match self.script.pop_front() {
            Some(entry) => entry.map(Key::from),
            None => Some(Key::Esc),
        })
    }

    fn read_blocking(&mut self) -> io::Result<Key> {
        while let Some(entry) = self.script.pop_front() {
            if let Some(b) = entry {
                return Ok(Key::from(b));
            }
        }
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }
}

/// Counts enters and restores; clones share the counts.
#[derive(Clone)]
pub struct CountingMode {
    entered: Arc<AtomicUsize>,
    restored: Arc<AtomicUsize>,
    fail_enter: bool,
}

impl CountingMode {
    pub fn new() -> CountingMode {
        CountingMode {
            entered: Arc::new(AtomicUsize::new(0)),
            restored: Arc::new(AtomicUsize::new(0)),
            fail_enter: false,
        }
    }

    pub fn failing() -> CountingMode {
        CountingMode { fail_enter: true, ..CountingMode::new() }
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn restored(&self) -> usize {
        self.restored.load(Ordering::SeqCst)
    }
}

impl ModeSwitch for CountingMode {
    fn enter(&mut self) -> io::Result<()> {
        if self.fail_enter {
            return Err(io::Error::new(io::ErrorKind::Other, "not a tty"));
        }
        self.entered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        self.restored.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
