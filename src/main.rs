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


use std::fs::File;
use std::io;
use std::process::exit;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use simplelog::*;
use log::*;
use structopt::StructOpt;

mod broadcast;
mod clock;
mod codec;
mod config;
mod error;
mod input;
mod ser;
mod session;
mod sx126x;
mod terminal;
#[cfg(test)]
mod testing;

use crate::config::{NodeConfig, Opt};
use crate::error::{ConsoleError, Result};

fn loglevel(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn banner(cfg: &NodeConfig) {
    println!("Starting the SX126x LoRa console...");
    println!("Serial interface: {}", cfg.serial);
    println!("Frequency: {} MHz", cfg.local.frequency_mhz);
    println!("Node address: {}", cfg.local.address);
    println!("Power: {} dBm", cfg.radio.power.dbm());
    println!("RSSI: {}", cfg.radio.rssi);
    println!("Air speed: {} bps", cfg.radio.air_speed.bps());
    println!("================");
}

fn run(cfg: &NodeConfig) -> Result<()> {
    let loraser = ser::LoraSer::new(&cfg.serial, cfg.baud)?;
    let mut radio = sx126x::Sx126x::new(loraser, &cfg.local, &cfg.radio)?;
    if cfg.configure {
        radio.radiocfg(&cfg.local, &cfg.radio)?;
    }

    // Give it a chance to settle before the operator starts.
    thread::sleep(Duration::from_secs(1));

    let clock = Arc::new(clock::SystemClock::new(cfg.thermal_zone.clone()));
    let mut session = session::SessionController::new(
        Arc::new(Mutex::new(radio)), input::TermKeyboard::stdin(), clock, io::stdout(),
        cfg.peer, cfg.interval)?;
    session.run_guarded(terminal::Cbreak::stdin())
}

fn main() {
    let opt = Opt::from_args();

    let level = loglevel(opt.verbose);
    let logres = match &opt.log_file {
        Some(path) => match File::create(path) {
            Ok(f) => WriteLogger::init(level, Config::default(), f),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path.display(), e);
                exit(2);
            }
        },
        None => WriteLogger::init(level, Config::default(), io::stderr()),
    };
    if let Err(e) = logres {
        eprintln!("Failed to init log: {}", e);
        exit(2);
    }
    info!("loraconsole starting");

    // Nothing is opened until the configuration checks out.
    let cfg = match NodeConfig::from_opt(&opt) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            exit(2);
        }
    };
    banner(&cfg);

    if let Err(e) = run(&cfg) {
        error!("{}", e);
        eprintln!("{}", e);
        exit(match e {
            ConsoleError::Config(_) => 2,
            _ => 1,
        });
    }
}
