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

//! Share-relative path arithmetic (§4.E "Path Resolver").
//!
//! A [`PathRef`] is always normalized: no `.`/`..` segments, no empty
//! segments, no leading/trailing slash. The root is the empty segment list.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathRef {
    segments: Vec<String>,
}

impl PathRef {
    /// The root of a share.
    pub fn root() -> PathRef {
        PathRef { segments: Vec::new() }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, or `None` at the root.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parses a `/`-separated, share-relative path into a `PathRef`,
    /// rejecting `.`/`..` and empty interior segments.
    pub fn parse(raw: &str) -> Result<PathRef> {
        let mut segments = Vec::new();
        for part in raw.split('/') {
            if part.is_empty() {
                continue;
            }
            validate_segment(part)?;
            segments.push(part.to_owned());
        }
        Ok(PathRef { segments })
    }

    /// Appends a single path segment (§4.E `join`). Rejects any name
    /// containing `/`, `\`, NUL, or equal to `.`/`..`.
    pub fn join(&self, name: &str) -> Result<PathRef> {
        validate_segment(name)?;
        if name.contains('\\') {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Ok(PathRef { segments })
    }

    pub fn parent(&self) -> Option<PathRef> {
        if self.segments.is_empty() {
            None
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(PathRef { segments })
        }
    }

    /// Renders the SMB-style path libsmbclient expects, rooted at `/`.
    pub fn to_smb_path(&self) -> String {
        if self.segments.is_empty() {
            "/".to_owned()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }

    /// §4.E `isDescendant`: if `self` is `anchor` or a descendant of it,
    /// returns the relative segment list; otherwise `None`.
    pub fn strip_prefix(&self, anchor: &PathRef) -> Option<Vec<String>> {
        if self.segments.len() < anchor.segments.len() {
            return None;
        }
        if self.segments[..anchor.segments.len()] != anchor.segments[..] {
            return None;
        }
        Some(self.segments[anchor.segments.len()..].to_vec())
    }
}

impl std::fmt::Display for PathRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_smb_path())
    }
}

fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidName(name.to_owned()));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_empty() {
        let root = PathRef::root();
        assert!(root.is_root());
        assert_eq!(root.to_smb_path(), "/");
    }

    #[test]
    fn parse_normalizes() {
        let p = PathRef::parse("/a/b/c/").unwrap();
        assert_eq!(p.segments(), &["a", "b", "c"]);
        assert_eq!(p.to_smb_path(), "/a/b/c");
    }

    #[test]
    fn parse_rejects_dot_dot() {
        assert!(PathRef::parse("a/../b").is_err());
        assert!(PathRef::parse("a/./b").is_err());
    }

    #[test]
    fn join_rejects_invalid_names() {
        let root = PathRef::root();
        assert!(root.join("a/b").is_err());
        assert!(root.join("a\\b").is_err());
        assert!(root.join(".").is_err());
        assert!(root.join("..").is_err());
        assert!(root.join("a\0b").is_err());
        assert!(root.join("ok").is_ok());
    }

    #[test]
    fn is_descendant() {
        let anchor = PathRef::parse("first").unwrap();
        let cand = PathRef::parse("first/comment").unwrap();
        assert_eq!(
            cand.strip_prefix(&anchor),
            Some(vec!["comment".to_string()])
        );

        let other = PathRef::parse("quatre/points").unwrap();
        assert_eq!(other.strip_prefix(&anchor), None);

        assert_eq!(anchor.strip_prefix(&anchor), Some(vec![]));
    }

    #[test]
    fn equality_is_segment_identity() {
        let a = PathRef::parse("a/b").unwrap();
        let b = PathRef::parse("a/b").unwrap();
        let c = PathRef::parse("a/B").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
