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


use crate::clock::ClockSource;
use crate::codec::{self, Endpoint};
use crate::error::{ConsoleError, Result};
use crate::sx126x::{self, RadioLink};
use crossbeam_channel::{self, RecvTimeoutError};
use log::*;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Pause after each telemetry send before the next one is armed.  Given
/// in ms.
pub const SETTLE_MILLIS: u64 = 200;

/// The text sent in each telemetry frame.
pub fn telemetry_payload(celsius: f64) -> Vec<u8> {
    // Debug keeps the ".0" on whole degrees.
    format!("CPU Temperature: {:?} C", celsius).into_bytes()
}

/// Reads the temperature and sends one telemetry frame to everybody on
/// the telemetry channel.  The header is fixed whatever the local node's
/// own address and channel.
fn send_telemetry<R: RadioLink, C: ClockSource + ?Sized>(radio: &Mutex<R>, clock: &C) -> Result<()> {
    let celsius = clock.cpu_temperature_celsius().map_err(ConsoleError::Transmit)?;
    let frame = codec::encode_to(Endpoint::TELEMETRY, Endpoint::TELEMETRY_SOURCE,
                                 &telemetry_payload(celsius));
    sx126x::lock(radio).send(&frame)
}

/// A running broadcast.  Dropping the stop sender or sending on it ends
/// the worker after its current tick.
pub struct BroadcasterHandle {
    stop: crossbeam_channel::Sender<()>,
    worker: thread::JoinHandle<()>,
    interval: Duration,
}

impl BroadcasterHandle {
    /// Stop the worker and wait for it, so no tick can follow.
    fn cancel(self) {
        let _ = self.stop.send(());
        if self.worker.join().is_err() {
            error!("Telemetry worker panicked");
        }
    }
}

pub enum BroadcastState {
    Idle,
    Running(BroadcasterHandle),
}

/// Sends telemetry on a fixed period until stopped.  Each tick arms the
/// next one after it has sent, so the period drifts by the send time.
pub struct Broadcaster<R, C> {
    radio: Arc<Mutex<R>>,
    clock: Arc<C>,
    settle: Duration,
    state: BroadcastState,
}

impl<R, C> Broadcaster<R, C>
where
    R: RadioLink + Send + 'static,
    C: ClockSource + 'static,
{
    pub fn new(radio: Arc<Mutex<R>>, clock: Arc<C>) -> Broadcaster<R, C> {
        Broadcaster {
            radio,
            clock,
            settle: Duration::from_millis(SETTLE_MILLIS),
            state: BroadcastState::Idle,
        }
    }

    /// Overrides the pause that follows each send.
    #[cfg(test)]
    pub fn with_settle(mut self, settle: Duration) -> Broadcaster<R, C> {
        self.settle = settle;
        self
    }

    pub fn is_running(&self) -> bool {
        match self.state {
            BroadcastState::Running(_) => true,
            BroadcastState::Idle => false,
        }
    }

    /// Sends one frame now and then one every `interval`.  Does nothing
    /// if already running.  If the first send fails nothing is armed.
    pub fn start(&mut self, interval: Duration) -> Result<()> {
        if self.is_running() {
            warn!("Telemetry broadcast already running; ignoring start");
            return Ok(());
        }

        send_telemetry(&self.radio, &*self.clock)?;

        let (stop, stoprx) = crossbeam_channel::bounded(1);
        let radio = Arc::clone(&self.radio);
        let clock = Arc::clone(&self.clock);
        let period = self.settle + interval;
        let worker = thread::spawn(move || tickthread(radio, clock, period, stoprx));

        info!("Telemetry broadcast started, every {:?}", interval);
        self.state = BroadcastState::Running(BroadcasterHandle { stop, worker, interval });
        Ok(())
    }

    /// Cancels the recurrence, then sends one last frame.  Does nothing if
    /// idle.  The worker is joined first, so the last frame is always the
    /// final one on the air.
    pub fn stop(&mut self) -> Result<()> {
        let handle = match std::mem::replace(&mut self.state, BroadcastState::Idle) {
            BroadcastState::Running(handle) => handle,
            BroadcastState::Idle => return Ok(()),
        };
        info!("Stopping telemetry broadcast (every {:?})", handle.interval);
        handle.cancel();

        let res = send_telemetry(&self.radio, &*self.clock);
        thread::sleep(self.settle);
        res
    }
}

impl<R, C> Drop for Broadcaster<R, C> {
    fn drop(&mut self) {
        if let BroadcastState::Running(handle) = std::mem::replace(&mut self.state, BroadcastState::Idle) {
            debug!("Cancelling telemetry broadcast on drop");
            handle.cancel();
        }
    }
}

/// Waits out each period, then sends; a stop message (or a dropped
/// sender) ends it.
fn tickthread<R: RadioLink, C: ClockSource>(radio: Arc<Mutex<R>>, clock: Arc<C>, period: Duration,
                                            stop: crossbeam_channel::Receiver<()>) {
    let started = clock.now();
    loop {
        match stop.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
        if let Err(e) = send_telemetry(&radio, &*clock) {
            error!("Telemetry tick failed: {}", e);
            eprint!("\r\nTelemetry send failed: {}\r\n", e);
        }
        trace!("Telemetry tick at +{:?}", clock.now().duration_since(started));
    }
}
