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
use std::os::unix::io::RawFd;
use log::*;

const ESC: u8 = 0x1B;
const CTRL_C: u8 = 0x03;
const BACKSPACE: u8 = 0x08;
const DEL: u8 = 0x7F;

/// A keystroke as the console sees it.  Anything that isn't one of the
/// special keys is passed through as the raw byte, so multi-byte UTF-8
/// input arrives one byte at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Esc,
    Interrupt,
    Erase,
    Enter,
    Byte(u8),
}

impl From<u8> for Key {
    fn from(b: u8) -> Key {
        match b {
            ESC => Key::Esc,
            CTRL_C => Key::Interrupt,
            BACKSPACE | DEL => Key::Erase,
            b'\n' => Key::Enter,
            other => Key::Byte(other),
        }
    }
}

/// Single keystrokes from the operator, without line buffering.
pub trait Keyboard {
    /// Returns at once; None if no key is ready.
    fn poll(&mut self) -> io::Result<Option<Key>>;

    /// Waits for exactly one key.
    fn read_blocking(&mut self) -> io::Result<Key>;
}

/// Reads keys straight from a file descriptor (normally stdin), bypassing
/// std's buffering so that `poll` sees exactly what is unread.
pub struct TermKeyboard {
    fd: RawFd,
}

impl TermKeyboard {
    pub fn stdin() -> TermKeyboard {
        TermKeyboard { fd: libc::STDIN_FILENO }
    }
}

impl Keyboard for TermKeyboard {
    fn poll(&mut self) -> io::Result<Option<Key>> {
        let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        if n < 0 {
            let e = io::Error::last_os_error();
            return if e.kind() == io::ErrorKind::Interrupted { Ok(None) } else { Err(e) };
        }
        if n == 0 || pfd.revents & (libc::POLLIN | libc::POLLHUP) == 0 {
            return Ok(None);
        }
        self.read_blocking().map(Some)
    }

    fn read_blocking(&mut self) -> io::Result<Key> {
        loop {
            let mut b: u8 = 0;
            let n = unsafe { libc::read(self.fd, &mut b as *mut u8 as *mut libc::c_void, 1) };
            match n {
                1 => {
                    trace!("KEY: {:#04x}", b);
                    return Ok(Key::from(b));
                }
                0 => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "keyboard input closed")),
                _ => {
                    let e = io::Error::last_os_error();
                    if e.kind() != io::ErrorKind::Interrupted {
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_keys() {
        assert_eq!(Key::from(0x1B), Key::Esc);
        assert_eq!(Key::from(0x03), Key::Interrupt);
        assert_eq!(Key::from(0x7F), Key::Erase);
        assert_eq!(Key::from(0x08), Key::Erase);
        assert_eq!(Key::from(b'\n'), Key::Enter);
        assert_eq!(Key::from(b'i'), Key::Byte(b'i'));
        assert_eq!(Key::from(0xC3), Key::Byte(0xC3));
    }

    #[test]
    fn reads_from_a_pipe() {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let mut kb = TermKeyboard { fd: fds[0] };

        assert_eq!(kb.poll().unwrap(), None);

        let data = b"s\x1b";
        let n = unsafe { libc::write(fds[1], data.as_ptr() as *const libc::c_void, data.len()) };
        assert_eq!(n, 2);
        assert_eq!(kb.poll().unwrap(), Some(Key::Byte(b's')));
        assert_eq!(kb.read_blocking().unwrap(), Key::Esc);

        unsafe { libc::close(fds[1]) };
        assert_eq!(kb.read_blocking().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        unsafe { libc::close(fds[0]) };
    }
}
