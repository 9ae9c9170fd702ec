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


use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

/// Time and CPU temperature, as seen by the telemetry broadcaster.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> Instant;

    fn cpu_temperature_celsius(&self) -> io::Result<f64>;
}

/// Reads the temperature from a sysfs thermal zone, which holds
/// millidegrees Celsius.
pub struct SystemClock {
    thermal_zone: PathBuf,
}

impl SystemClock {
    pub fn new(thermal_zone: PathBuf) -> SystemClock {
        SystemClock { thermal_zone }
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn cpu_temperature_celsius(&self) -> io::Result<f64> {
        let raw = fs::read_to_string(&self.thermal_zone)?;
        let millis: f64 = raw.trim().parse().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData,
                           format!("{}: bad temperature {:?}: {}", self.thermal_zone.display(), raw.trim(), e))
        })?;
        Ok(millis / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::process;

    fn zone_file(name: &str, contents: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("loraconsole-{}-{}", process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_millidegrees() {
        let path = zone_file("ok", "48312\n");
        let clock = SystemClock::new(path.clone());
        assert!((clock.cpu_temperature_celsius().unwrap() - 48.312).abs() < 1e-9);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn garbage_is_an_error() {
        let path = zone_file("bad", "warm\n");
        let clock = SystemClock::new(path.clone());
        assert_eq!(clock.cpu_temperature_celsius().unwrap_err().kind(), io::ErrorKind::InvalidData);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_zone_is_an_error() {
        let clock = SystemClock::new(PathBuf::from("/nonexistent/thermal_zone/temp"));
        assert!(clock.cpu_temperature_celsius().is_err());
    }
}
