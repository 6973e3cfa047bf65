// smbfs-core is a library exposing a remote SMB share as a handle-oriented,
// async filesystem.
// Copyright (c) 2016 Konstantin Gribov
//
// This file is part of smbfs-core.
//
// smbfs-core is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// smbfs-core is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with smbfs-core. If not, see <http://www.gnu.org/licenses/>.

//! Error taxonomy shared across every component.
//!
//! Variants and display strings mirror the externally-visible contract:
//! callers (and the language bindings wrapping this crate) match against
//! `Error` variants and, in some cases, the literal message text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Directory {0:?} not found")]
    DirectoryNotFound(String),

    #[error("File {0:?} not found")]
    FileNotFound(String),

    #[error("Entry {0:?} not found")]
    EntryNotFound(String),

    #[error("Directory {0:?} is not empty")]
    NotEmpty(String),

    #[error("The path supplied exists, but was not an entry of requested type.")]
    TypeMismatch,

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid auth: {0}")]
    InvalidAuth(String),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Writing unsupported type")]
    UnsupportedType,

    #[error("Writing unsupported data type")]
    UnsupportedDataType,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Classifies a raw `errno` returned by the underlying client library
    /// into the taxonomy above. Used at the Driver's submission boundary
    /// (see `driver.rs`) so every higher-level component deals in `Error`,
    /// never in raw OS error codes.
    pub fn from_errno(context: &str, errno: i32) -> Error {
        match errno {
            libc::ENOENT => Error::EntryNotFound(context.to_owned()),
            libc::ENOTEMPTY => Error::NotEmpty(context.to_owned()),
            libc::EACCES | libc::EPERM => Error::PermissionDenied(context.to_owned()),
            libc::EEXIST => Error::IoError(format!("{context}: already exists")),
            libc::ENOTDIR | libc::EISDIR => Error::TypeMismatch,
            _ => Error::IoError(format!("{context}: {}", std::io::Error::from_raw_os_error(errno))),
        }
    }
}

impl From<std::ffi::NulError> for Error {
    fn from(err: std::ffi::NulError) -> Self {
        Error::InvalidName(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_external_contract() {
        assert_eq!(
            Error::DirectoryNotFound("foo".into()).to_string(),
            "Directory \"foo\" not found"
        );
        assert_eq!(
            Error::FileNotFound("foo".into()).to_string(),
            "File \"foo\" not found"
        );
        assert_eq!(
            Error::EntryNotFound("foo".into()).to_string(),
            "Entry \"foo\" not found"
        );
        assert_eq!(
            Error::NotEmpty("foo".into()).to_string(),
            "Directory \"foo\" is not empty"
        );
        assert_eq!(
            Error::TypeMismatch.to_string(),
            "The path supplied exists, but was not an entry of requested type."
        );
        assert_eq!(Error::UnsupportedType.to_string(), "Writing unsupported type");
        assert_eq!(
            Error::UnsupportedDataType.to_string(),
            "Writing unsupported data type"
        );
        assert_eq!(
            Error::InvalidState("WritableStream is locked").to_string(),
            "Invalid state: WritableStream is locked"
        );
        assert_eq!(
            Error::InvalidState("WritableStream is closed").to_string(),
            "Invalid state: WritableStream is closed"
        );
    }

    #[test]
    fn errno_classification() {
        assert!(matches!(
            Error::from_errno("x", libc::ENOENT),
            Error::EntryNotFound(_)
        ));
        assert!(matches!(
            Error::from_errno("x", libc::ENOTEMPTY),
            Error::NotEmpty(_)
        ));
        assert!(matches!(
            Error::from_errno("x", libc::EACCES),
            Error::PermissionDenied(_)
        ));
    }
}
