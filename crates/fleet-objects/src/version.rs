// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object schema versions.
//!
//! Versions are written `MAJOR.MINOR` or `MAJOR.MINOR.PATCH`. The PATCH
//! component is reserved for stable-branch fixes: it never triggers a
//! backport, so everything changed under a PATCH bump must be additive and
//! a node that knows `X.Y` can treat `X.Y.Z` as equivalent.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{ObjectError, Result};

/// A parsed `MAJOR.MINOR[.PATCH]` version.
///
/// `PartialEq`/`Ord` follow the backport order, which is `(major, minor)`
/// only. Use [`ObjectVersion::is_exactly`] when PATCH matters.
#[derive(Debug, Clone, Copy)]
pub struct ObjectVersion {
    major: u32,
    minor: u32,
    patch: Option<u32>,
}

impl ObjectVersion {
    /// Create a two-part version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: None,
        }
    }

    /// Create a three-part version.
    pub const fn with_patch(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch: Some(patch),
        }
    }

    /// Parse `"X.Y"` or `"X.Y.Z"`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || ObjectError::InvalidVersion(s.to_string());

        let mut parts = s.split('.');
        let major = parts.next().ok_or_else(invalid)?;
        let minor = parts.next().ok_or_else(invalid)?;
        let patch = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        // Plain digits only, so the version renders back exactly as given
        let num = |p: &str| {
            let digits = !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
            if !digits || (p.len() > 1 && p.starts_with('0')) {
                return Err(invalid());
            }
            p.parse::<u32>().map_err(|_| invalid())
        };
        Ok(Self {
            major: num(major)?,
            minor: num(minor)?,
            patch: patch.map(num).transpose()?,
        })
    }

    pub const fn major(&self) -> u32 {
        self.major
    }

    pub const fn minor(&self) -> u32 {
        self.minor
    }

    pub const fn patch(&self) -> Option<u32> {
        self.patch
    }

    /// True if the version carries an explicit PATCH component.
    pub const fn has_patch(&self) -> bool {
        self.patch.is_some()
    }

    /// The same version with the PATCH component dropped.
    pub const fn truncated(&self) -> Self {
        Self::new(self.major, self.minor)
    }

    /// Exact equality including PATCH (a missing PATCH equals `.0`).
    pub fn is_exactly(&self, other: &Self) -> bool {
        self.full_tuple() == other.full_tuple()
    }

    /// Whether an implementation at `self` can accept data written at
    /// `requested`: same MAJOR, and `self` is at least as new.
    pub fn is_compatible_with(&self, requested: &Self) -> bool {
        self.major == requested.major && self.full_tuple() >= requested.full_tuple()
    }

    fn full_tuple(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch.unwrap_or(0))
    }
}

impl PartialEq for ObjectVersion {
    fn eq(&self, other: &Self) -> bool {
        (self.major, self.minor) == (other.major, other.minor)
    }
}

impl Eq for ObjectVersion {}

impl PartialOrd for ObjectVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

impl FromStr for ObjectVersion {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_and_three_parts() {
        let v = ObjectVersion::parse("1.4").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 4, None));

        let v = ObjectVersion::parse("2.0.3").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (2, 0, Some(3)));
        assert_eq!(v.to_string(), "2.0.3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "1", "1.", "a.b", "1.2.3.4", "1.-2"] {
            assert!(
                matches!(ObjectVersion::parse(bad), Err(ObjectError::InvalidVersion(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_parse_rejects_signs_and_spaces() {
        for bad in ["+1.2", "1.+2", "1.2.+3", " 1.2", "1. 2", "1.2 "] {
            assert!(ObjectVersion::parse(bad).is_err(), "{bad:?} should not parse");
        }
        assert!(ObjectVersion::parse("01.2").is_err());
        for good in ["0.1", "1.10", "10.0.0"] {
            assert_eq!(ObjectVersion::parse(good).unwrap().to_string(), good);
        }
    }

    #[test]
    fn test_ordering_ignores_patch() {
        let a = ObjectVersion::parse("1.2").unwrap();
        let b = ObjectVersion::parse("1.2.7").unwrap();
        assert_eq!(a, b);
        assert!(!a.is_exactly(&b));
        assert!(ObjectVersion::new(1, 10) > ObjectVersion::new(1, 9));
    }

    #[test]
    fn test_compatibility_requires_same_major_and_newer_implementation() {
        let registered = ObjectVersion::new(1, 3);
        assert!(registered.is_compatible_with(&ObjectVersion::new(1, 2)));
        assert!(registered.is_compatible_with(&ObjectVersion::new(1, 3)));
        assert!(!registered.is_compatible_with(&ObjectVersion::new(1, 4)));
        assert!(!registered.is_compatible_with(&ObjectVersion::new(2, 0)));
        assert!(!registered.is_compatible_with(&ObjectVersion::with_patch(1, 3, 1)));
    }

    #[test]
    fn test_truncation_drops_patch() {
        let v = ObjectVersion::with_patch(1, 5, 2).truncated();
        assert!(!v.has_patch());
        assert_eq!(v.to_string(), "1.5");
    }
}
