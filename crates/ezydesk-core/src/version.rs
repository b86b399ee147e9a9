//! Dotted-numeric version comparison.
//!
//! Build versions are plain sequences of non-negative integers
//! (`"1.4.2"`), not semver: no pre-release tags, no build metadata, and a
//! tie is resolved in favor of the remote side so the manifest stays the
//! source of truth.

use thiserror::Error;

/// Errors from parsing a dotted-numeric version string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedVersionError {
    /// A segment could not be parsed as a non-negative integer.
    #[error("version segment {segment:?} in {version:?} is not an integer")]
    Segment { version: String, segment: String },

    /// The two versions have a different number of segments.
    ///
    /// No zero-padding is applied; the manifest and the build are expected
    /// to agree on the version scheme.
    #[error("cannot compare {remote:?} with {current:?}: segment counts differ")]
    SegmentCount { remote: String, current: String },
}

fn parse_segments(version: &str) -> Result<Vec<u64>, MalformedVersionError> {
    version
        .split('.')
        .map(|segment| {
            segment
                .parse::<u64>()
                .map_err(|_| MalformedVersionError::Segment {
                    version: version.to_string(),
                    segment: segment.to_string(),
                })
        })
        .collect()
}

/// Returns whichever of the two version strings is newer.
///
/// Segments are compared left to right; the first differing segment decides.
/// When every segment is equal the *remote* string is returned, so callers
/// comparing the result by identity treat the manifest as authoritative.
pub fn bigger_version<'a>(
    remote: &'a str,
    current: &'a str,
) -> Result<&'a str, MalformedVersionError> {
    let remote_segments = parse_segments(remote)?;
    let current_segments = parse_segments(current)?;

    if remote_segments.len() != current_segments.len() {
        return Err(MalformedVersionError::SegmentCount {
            remote: remote.to_string(),
            current: current.to_string(),
        });
    }

    for (r, c) in remote_segments.iter().zip(&current_segments) {
        if r > c {
            return Ok(remote);
        }
        if r < c {
            return Ok(current);
        }
    }

    Ok(remote)
}

/// Returns `true` when the two versions are segment-for-segment equal.
pub fn versions_equal(remote: &str, current: &str) -> Result<bool, MalformedVersionError> {
    let remote_segments = parse_segments(remote)?;
    let current_segments = parse_segments(current)?;

    if remote_segments.len() != current_segments.len() {
        return Err(MalformedVersionError::SegmentCount {
            remote: remote.to_string(),
            current: current.to_string(),
        });
    }

    Ok(remote_segments == current_segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_differing_segment_wins() {
        assert_eq!(bigger_version("1.2.0", "1.3.0").unwrap(), "1.3.0");
        assert_eq!(bigger_version("2.0.0", "1.9.9").unwrap(), "2.0.0");
        assert_eq!(bigger_version("1.4.2", "1.4.1").unwrap(), "1.4.2");
    }

    #[test]
    fn tie_returns_remote() {
        // Equal versions resolve to the first (remote) argument.
        let remote = "1.4.2";
        let result = bigger_version(remote, "1.4.2").unwrap();
        assert!(std::ptr::eq(result, remote));
    }

    #[test]
    fn antisymmetric_on_ordered_inputs() {
        assert_eq!(bigger_version("1.3.0", "1.2.0").unwrap(), "1.3.0");
        assert_eq!(bigger_version("1.2.0", "1.3.0").unwrap(), "1.3.0");
    }

    #[test]
    fn malformed_segment_is_rejected() {
        let err = bigger_version("1.x.0", "1.0.0").unwrap_err();
        assert!(matches!(err, MalformedVersionError::Segment { .. }));

        let err = bigger_version("1.0.0", "").unwrap_err();
        assert!(matches!(err, MalformedVersionError::Segment { .. }));
    }

    #[test]
    fn mismatched_segment_counts_are_rejected() {
        let err = bigger_version("1.4", "1.4.2").unwrap_err();
        assert_eq!(
            err,
            MalformedVersionError::SegmentCount {
                remote: "1.4".to_string(),
                current: "1.4.2".to_string(),
            }
        );
    }

    #[test]
    fn equality_check() {
        assert!(versions_equal("1.4.2", "1.4.2").unwrap());
        assert!(!versions_equal("1.4.2", "1.4.3").unwrap());
        assert!(versions_equal("01.4.2", "1.4.2").unwrap());
    }
}
