//! Typed ID and label definitions.
//!
//! IDs carry a unique prefix identifying what they name. Labels are checked
//! by [`validate_label`] and otherwise kept exactly as the platform sent them.

use crate::{define_id, define_label, IdError, Ulid};

// =============================================================================
// keyprop-minted IDs
// =============================================================================

define_id!(
    /// Canonical internal identifier of an API.
    ApiId, "api"
);
define_id!(
    /// One fan-out of one change event; shared by every delivery in it.
    BroadcastId, "bcast"
);
define_id!(
    /// Correlates a caller request with its broadcast and audit records.
    RequestId, "req"
);

// =============================================================================
// Platform-owned labels
// =============================================================================

define_label!(OrgId);
define_label!(ApiHandle);
define_label!(GatewayId);
define_label!(KeyName);

/// Split `{prefix}_{ulid}` and check both halves.
#[doc(hidden)]
pub fn parse_prefixed(s: &str, prefix: &'static str) -> Result<Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    let (actual, encoded) = s.split_once('_').ok_or(IdError::MissingSeparator)?;
    if actual != prefix {
        return Err(IdError::InvalidPrefix {
            expected: prefix,
            actual: actual.to_string(),
        });
    }

    encoded
        .parse::<Ulid>()
        .map_err(|e| IdError::InvalidUlid(e.to_string()))
}

/// Maximum label length in bytes.
pub const MAX_LABEL_LEN: usize = 256;

/// Validate a platform-owned label.
///
/// Labels must be non-empty, at most [`MAX_LABEL_LEN`] bytes, free of
/// leading/trailing whitespace, and free of control characters.
pub fn validate_label(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    if s.len() > MAX_LABEL_LEN {
        return Err(IdError::TooLong {
            max: MAX_LABEL_LEN,
            actual: s.len(),
        });
    }

    if s.trim() != s {
        return Err(IdError::SurroundingWhitespace);
    }

    if let Some((position, _)) = s.char_indices().find(|(_, c)| c.is_control()) {
        return Err(IdError::ControlCharacter { position });
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
