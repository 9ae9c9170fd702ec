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
use thiserror::Error;

/// Everything that can go wrong in the console.  Transmit and receive
/// failures are reported to the operator and the session carries on;
/// the others end it.
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transmit failed: {0}")]
    Transmit(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("terminal mode error: {0}")]
    TerminalMode(#[source] io::Error),

    #[error("console I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

impl ConsoleError {
    pub fn config(msg: impl Into<String>) -> Self {
        ConsoleError::Config(msg.into())
    }

    pub fn receive(msg: impl Into<String>) -> Self {
        ConsoleError::Receive(msg.into())
    }

    /// Whether the control loop should report this and keep going.
    pub fn is_link_error(&self) -> bool {
        match self {
            ConsoleError::Transmit(_) | ConsoleError::Receive(_) => true,
            _ => false,
        }
    }
}
