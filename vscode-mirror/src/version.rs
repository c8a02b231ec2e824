//! Extension version ordering and engine compatibility.
//!
//! Catalog versions are `major.minor.patch` with an optional `-tag` suffix
//! and are not semver: a tagged version sorts *after* its untagged base, and
//! an `x` in the patch slot stands for zero.

use crate::error::MirrorError;

/// Ordering key for a catalog version string.
///
/// Comparison runs field by field, so `1.2.0 < 1.2.1 < 1.3.0 < 2.0.0` and
/// `1.2.0 < 1.2.0-alpha < 1.2.0-beta`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionKey {
    major: u64,
    minor: u64,
    patch: u64,
    tag: Option<String>,
}

impl VersionKey {
    /// Parse a dotted version string.
    ///
    /// Exactly three dot-separated parts are required. The patch part may
    /// carry a `-tag` suffix or contain the `x` wildcard.
    pub fn parse(version: &str) -> Result<Self, MirrorError> {
        let mut parts = version.splitn(3, '.');
        let (Some(major), Some(minor), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(MirrorError::Version(version.to_owned()));
        };

        let major = parse_number(version, major)?;
        let minor = parse_number(version, minor)?;

        if let Some((patch, tag)) = rest.split_once('-') {
            Ok(Self {
                major,
                minor,
                patch: parse_number(version, patch)?,
                tag: Some(tag.to_owned()),
            })
        } else if rest.contains('x') {
            Ok(Self {
                major,
                minor,
                patch: 0,
                tag: None,
            })
        } else {
            Ok(Self {
                major,
                minor,
                patch: parse_number(version, rest)?,
                tag: None,
            })
        }
    }
}

fn parse_number(version: &str, part: &str) -> Result<u64, MirrorError> {
    part.parse()
        .map_err(|_| MirrorError::Version(version.to_owned()))
}

/// Check an extension's engine pattern against the mirrored editor version.
///
/// Only `*` and caret ranges occur in practice; anything else is a legacy
/// pin and never matches. A caret range matches when the major versions are
/// equal and the pattern's minor (and patch, unless zero) do not exceed the
/// engine's.
pub fn engine_matches(pattern: &str, engine: &str) -> Result<bool, MirrorError> {
    if pattern == "*" {
        return Ok(true);
    }

    let Some(floor) = pattern.strip_prefix('^') else {
        return Ok(false);
    };

    let pattern = VersionKey::parse(floor)?;
    let engine = VersionKey::parse(engine)?;

    if pattern.tag.as_deref() == Some("insiders") {
        return Ok(false);
    }

    if pattern.major != engine.major {
        return Ok(false);
    }
    if pattern.minor > engine.minor {
        return Ok(false);
    }
    if pattern.minor == engine.minor && pattern.patch != 0 && pattern.patch > engine.patch {
        return Ok(false);
    }

    Ok(true)
}
