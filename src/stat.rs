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

//! [`StatRecord`] (§3) and MIME-type inference (§4.H).

use crate::handle::HandleKind;
use crate::sys::RawStat;

/// Metadata snapshot for a directory or file entry (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
    pub size: u64,
    pub creation_time_ms: i64,
    pub modified_time_ms: i64,
    pub accessed_time_ms: i64,
    pub kind: HandleKind,
}

impl StatRecord {
    pub(crate) fn from_raw(raw: RawStat) -> StatRecord {
        StatRecord {
            size: raw.size,
            // libsmbclient's `stat` does not distinguish a creation time
            // from a change time; we use the earliest of the two
            // timestamps we do get as the closest available proxy.
            creation_time_ms: raw.ctime_ms.min(raw.mtime_ms),
            modified_time_ms: raw.mtime_ms,
            accessed_time_ms: raw.atime_ms,
            kind: if raw.is_dir {
                HandleKind::Directory
            } else {
                HandleKind::File
            },
        }
    }
}

/// Infers a MIME type from a file name's extension only (§4.H). Unknown
/// extensions map to the literal string `"unknown"`, matching the external
/// contract language bindings build `File.type` from.
pub fn mime_type_for_name(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("bin") => "application/octet-stream",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_known_extensions() {
        assert_eq!(mime_type_for_name("photo.PNG"), "image/png");
        assert_eq!(mime_type_for_name("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_type_for_name("photo.jpg"), "image/jpeg");
        assert_eq!(mime_type_for_name("notes.txt"), "text/plain");
        assert_eq!(mime_type_for_name("blob.bin"), "application/octet-stream");
    }

    #[test]
    fn mime_unknown_extension_is_literal_string() {
        assert_eq!(mime_type_for_name("annar"), "unknown");
        assert_eq!(mime_type_for_name("archive.tar.gz"), "unknown");
        assert_eq!(mime_type_for_name("no_extension"), "unknown");
    }
}
