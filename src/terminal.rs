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


use crate::error::{ConsoleError, Result};
use log::*;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;

/// Something that can put the terminal into the console's input mode and
/// put it back.
pub trait ModeSwitch {
    fn enter(&mut self) -> io::Result<()>;
    fn restore(&mut self) -> io::Result<()>;
}

/// Cbreak mode: keys arrive one at a time, unechoed.  Signal keys are
/// turned off too, so Ctrl-C reaches the console as a byte instead of
/// killing us with the terminal still in this mode.
pub struct Cbreak {
    fd: RawFd,
    saved: Option<libc::termios>,
}

impl Cbreak {
    pub fn stdin() -> Cbreak {
        Cbreak { fd: libc::STDIN_FILENO, saved: None }
    }
}

impl ModeSwitch for Cbreak {
    fn enter(&mut self) -> io::Result<()> {
        let mut term: libc::termios = unsafe { mem::zeroed() };
        if unsafe { libc::tcgetattr(self.fd, &mut term) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let original = term;

        term.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
        term.c_cc[libc::VMIN] = 1;
        term.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(self.fd, libc::TCSADRAIN, &term) } != 0 {
            return Err(io::Error::last_os_error());
        }
        self.saved = Some(original);
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        if let Some(original) = self.saved.take() {
            if unsafe { libc::tcsetattr(self.fd, libc::TCSADRAIN, &original) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

/// Holds the terminal in its console mode for as long as it lives.  The
/// original mode comes back when the guard is dropped, whether that is a
/// normal return, an error or a panic unwinding through.
pub struct TerminalGuard<M: ModeSwitch> {
    mode: M,
}

impl<M: ModeSwitch> TerminalGuard<M> {
    pub fn acquire(mut mode: M) -> Result<TerminalGuard<M>> {
        mode.enter().map_err(ConsoleError::TerminalMode)?;
        debug!("Terminal in cbreak mode");
        Ok(TerminalGuard { mode })
    }
}

impl<M: ModeSwitch> Drop for TerminalGuard<M> {
    fn drop(&mut self) {
        match self.mode.restore() {
            Ok(()) => debug!("Terminal mode restored"),
            Err(e) => error!("Failed to restore terminal mode: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingMode;

    #[test]
    fn restores_once_on_drop() {
        let mode = CountingMode::new();
        {
            let _guard = TerminalGuard::acquire(mode.clone()).unwrap();
            assert_eq!(mode.entered(), 1);
            assert_eq!(mode.restored(), 0);
        }
        assert_eq!(mode.restored(), 1);
    }

    #[test]
    fn failed_enter_is_a_terminal_mode_error() {
        let mode = CountingMode::failing();
        match TerminalGuard::acquire(mode.clone()) {
            Err(ConsoleError::TerminalMode(_)) => {}
            _ => panic!("expected a terminal mode error"),
        }
        assert_eq!(mode.restored(), 0);
    }

    #[test]
    fn cbreak_on_a_non_terminal_fails_cleanly() {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let mut mode = Cbreak { fd: fds[0], saved: None };
        assert!(mode.enter().is_err());
        assert!(mode.restore().is_ok());
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
