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


use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use structopt::StructOpt;
use crate::codec::{self, NodeIdentity};
use crate::error::{ConsoleError, Result};

/// Transmit power the module supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxPower {
    Dbm10,
    Dbm13,
    Dbm17,
    Dbm22,
}

impl TxPower {
    pub fn dbm(self) -> u8 {
        match self {
            TxPower::Dbm10 => 10,
            TxPower::Dbm13 => 13,
            TxPower::Dbm17 => 17,
            TxPower::Dbm22 => 22,
        }
    }

    /// Bits for the power field of register 04H.
    pub fn register_bits(self) -> u8 {
        match self {
            TxPower::Dbm22 => 0x00,
            TxPower::Dbm17 => 0x01,
            TxPower::Dbm13 => 0x02,
            TxPower::Dbm10 => 0x03,
        }
    }
}

impl FromStr for TxPower {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<TxPower, String> {
        match s.trim() {
            "10" => Ok(TxPower::Dbm10),
            "13" => Ok(TxPower::Dbm13),
            "17" => Ok(TxPower::Dbm17),
            "22" => Ok(TxPower::Dbm22),
            other => Err(format!("unsupported power {} dBm; use 10, 13, 17 or 22", other)),
        }
    }
}

/// Air data rate in bits per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AirSpeed {
    Bps1200,
    Bps2400,
    Bps4800,
    Bps9600,
    Bps19200,
    Bps38400,
    Bps62500,
}

const AIR_SPEEDS: [(u32, AirSpeed); 7] = [
    (1200, AirSpeed::Bps1200),
    (2400, AirSpeed::Bps2400),
    (4800, AirSpeed::Bps4800),
    (9600, AirSpeed::Bps9600),
    (19200, AirSpeed::Bps19200),
    (38400, AirSpeed::Bps38400),
    (62500, AirSpeed::Bps62500),
];

impl AirSpeed {
    pub fn bps(self) -> u32 {
        AIR_SPEEDS.iter().find(|(_, s)| *s == self).map(|(b, _)| *b).unwrap_or(0)
    }

    /// Bits for the air rate field of register 03H.
    pub fn register_bits(self) -> u8 {
        match self {
            AirSpeed::Bps1200 => 0x01,
            AirSpeed::Bps2400 => 0x02,
            AirSpeed::Bps4800 => 0x03,
            AirSpeed::Bps9600 => 0x04,
            AirSpeed::Bps19200 => 0x05,
            AirSpeed::Bps38400 => 0x06,
            AirSpeed::Bps62500 => 0x07,
        }
    }
}

impl FromStr for AirSpeed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<AirSpeed, String> {
        let bps: u32 = s.trim().parse().map_err(|_| format!("invalid air speed {}", s))?;
        AIR_SPEEDS
            .iter()
            .find(|(b, _)| *b == bps)
            .map(|(_, speed)| *speed)
            .ok_or_else(|| format!("unsupported air speed {} bps", bps))
    }
}

/// A yes/no setting that can come from the environment as true, yes or 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Switch(pub bool);

impl FromStr for Switch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Switch, String> {
        let s = s.trim().to_lowercase();
        Ok(Switch(s == "true" || s == "yes" || s == "1"))
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "loraconsole", about = "Send messages and CPU telemetry over an SX126x LoRa module")]
pub struct Opt {
    /// Serial device the module is attached to
    #[structopt(long, env = "SERIAL_INTERFACE", default_value = "/dev/ttyS0")]
    pub serial: String,

    /// Serial baud rate
    #[structopt(long, default_value = "9600")]
    pub baud: u32,

    /// Frequency in MHz, 410-493 or 850-930
    #[structopt(long, env = "FREQUENCY", default_value = "868")]
    pub frequency: u16,

    /// Local node address, 0-65535
    #[structopt(long, env = "ADDRESS", default_value = "0")]
    pub address: u16,

    /// Address messages are sent to; defaults to the local address
    #[structopt(long, env = "PEER_ADDRESS")]
    pub peer_address: Option<u16>,

    /// Frequency of the peer in MHz; defaults to the local frequency
    #[structopt(long, env = "PEER_FREQUENCY")]
    pub peer_frequency: Option<u16>,

    /// Transmit power in dBm: 10, 13, 17 or 22
    #[structopt(long, env = "POWER", default_value = "22")]
    pub power: TxPower,

    /// Report the RSSI of each received packet
    #[structopt(long, env = "RSSI", default_value = "false")]
    pub rssi: Switch,

    /// Air data rate in bps
    #[structopt(long, env = "AIR_SPEED", default_value = "2400")]
    pub air_speed: AirSpeed,

    /// Run the module as a relay
    #[structopt(long, env = "RELAY", default_value = "false")]
    pub relay: Switch,

    /// Network id written to the module
    #[structopt(long, default_value = "0")]
    pub net_id: u8,

    /// Encryption key written to the module
    #[structopt(long, default_value = "0")]
    pub crypt_key: u16,

    /// Seconds between telemetry broadcasts
    #[structopt(long, default_value = "10")]
    pub interval: f64,

    /// File holding the CPU temperature in millidegrees
    #[structopt(long, default_value = "/sys/class/thermal/thermal_zone0/temp", parse(from_os_str))]
    pub thermal_zone: PathBuf,

    /// Program the module registers at startup (module must be in configuration mode)
    #[structopt(long)]
    pub configure: bool,

    /// Write log to this file instead of stderr
    #[structopt(long, parse(from_os_str))]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: u8,
}

/// Parameters handed to the radio module.
#[derive(Clone, Debug, PartialEq)]
pub struct RadioSettings {
    pub power: TxPower,
    pub air_speed: AirSpeed,
    pub rssi: bool,
    pub relay: bool,
    pub net_id: u8,
    pub crypt_key: u16,
}

/// Validated, immutable configuration for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    pub serial: String,
    pub baud: u32,
    pub local: NodeIdentity,
    pub peer: NodeIdentity,
    pub radio: RadioSettings,
    pub interval: Duration,
    pub thermal_zone: PathBuf,
    pub configure: bool,
}

impl NodeConfig {
    /// Check the options once, before anything is opened.
    pub fn from_opt(opt: &Opt) -> Result<NodeConfig> {
        let local = NodeIdentity::new(opt.address, opt.frequency);
        let peer = NodeIdentity::new(
            opt.peer_address.unwrap_or(opt.address),
            opt.peer_frequency.unwrap_or(opt.frequency),
        );
        codec::to_offset(local.frequency_mhz)?;
        codec::to_offset(peer.frequency_mhz)?;

        if !opt.interval.is_finite() || opt.interval <= 0.0 {
            return Err(ConsoleError::config(format!(
                "telemetry interval must be a positive number of seconds, got {}",
                opt.interval
            )));
        }
        if opt.baud == 0 {
            return Err(ConsoleError::config("baud rate must be non-zero"));
        }

        Ok(NodeConfig {
            serial: opt.serial.clone(),
            baud: opt.baud,
            local,
            peer,
            radio: RadioSettings {
                power: opt.power,
                air_speed: opt.air_speed,
                rssi: opt.rssi.0,
                relay: opt.relay.0,
                net_id: opt.net_id,
                crypt_key: opt.crypt_key,
            },
            interval: Duration::from_secs_f64(opt.interval),
            thermal_zone: opt.thermal_zone.clone(),
            configure: opt.configure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(args: &[&str]) -> Opt {
        let mut argv = vec!["loraconsole"];
        argv.extend_from_slice(args);
        Opt::from_iter_safe(argv).unwrap()
    }

    #[test]
    fn peer_defaults_to_local() {
        let cfg = NodeConfig::from_opt(&opt(&["--frequency", "433", "--address", "7"])).unwrap();
        assert_eq!(cfg.local, NodeIdentity::new(7, 433));
        assert_eq!(cfg.peer, cfg.local);
        assert_eq!(cfg.interval, Duration::from_secs(10));
    }

    #[test]
    fn explicit_peer() {
        let cfg = NodeConfig::from_opt(&opt(&[
            "--frequency", "868", "--address", "1",
            "--peer-address", "65535", "--peer-frequency", "915",
        ])).unwrap();
        assert_eq!(cfg.peer, NodeIdentity::new(65535, 915));
    }

    #[test]
    fn out_of_band_frequency_is_rejected() {
        match NodeConfig::from_opt(&opt(&["--frequency", "700"])) {
            Err(ConsoleError::Config(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(NodeConfig::from_opt(&opt(&["--peer-frequency", "300"])).is_err());
    }

    #[test]
    fn bad_interval_is_rejected() {
        assert!(NodeConfig::from_opt(&opt(&["--interval", "0"])).is_err());
        assert!(NodeConfig::from_opt(&opt(&["--interval=-3"])).is_err());
    }

    #[test]
    fn enumerated_fields() {
        assert_eq!("17".parse::<TxPower>().unwrap(), TxPower::Dbm17);
        assert!("15".parse::<TxPower>().is_err());
        assert_eq!("62500".parse::<AirSpeed>().unwrap().bps(), 62500);
        assert!("1000".parse::<AirSpeed>().is_err());
        assert!(Opt::from_iter_safe(vec!["loraconsole", "--power", "5"]).is_err());
        assert!(Opt::from_iter_safe(vec!["loraconsole", "--address", "70000"]).is_err());
    }

    #[test]
    fn switches_read_like_the_environment() {
        assert_eq!("TRUE".parse::<Switch>().unwrap(), Switch(true));
        assert_eq!("yes".parse::<Switch>().unwrap(), Switch(true));
        assert_eq!("1".parse::<Switch>().unwrap(), Switch(true));
        assert_eq!("off".parse::<Switch>().unwrap(), Switch(false));
        let o = opt(&["--rssi", "yes", "--relay", "0"]);
        assert!(o.rssi.0);
        assert!(!o.relay.0);
    }
}
