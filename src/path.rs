//! Status variable addressing.
//!
//! A status variable is addressed as `<monitorable>/<variable>`. Both
//! segments follow the symbolic-name grammar: dot-separated tokens of
//! letters, digits, `_` and `-`, at most [`MAX_ID_LENGTH`] characters long.
//!
//! Notification switching additionally accepts `*/<variable>` and `*/*`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Maximum length of a monitorable or status variable identifier.
pub const MAX_ID_LENGTH: usize = 32;

/// Wildcard marker accepted in notification-switch paths.
pub const WILDCARD: &str = "*";

/// Parsed `<monitorable>/<variable>` address.
///
/// Ordering is lexicographic by `(monitorable, variable)`, which gives jobs a
/// stable read-back order for their targets.
///
/// # Examples
///
/// ```
/// use statmon::PathAddress;
///
/// let path = PathAddress::parse("com.acme.pid/sv.id", false).unwrap();
/// assert_eq!(path.monitorable_id(), "com.acme.pid");
/// assert_eq!(path.status_variable_id(), "sv.id");
/// assert!(path.is_concrete());
///
/// assert!(PathAddress::parse("*/sv.id", false).is_err());
/// assert!(PathAddress::parse("*/sv.id", true).unwrap().is_monitorable_wildcard());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathAddress {
    monitorable_id: String,
    status_variable_id: String,
    is_monitorable_wildcard: bool,
    is_variable_wildcard: bool,
}

impl PathAddress {
    /// Parse `raw`. Wildcard forms are accepted only when `allow_wildcards` is set.
    pub fn parse(raw: &str, allow_wildcards: bool) -> Result<Self, AddressError> {
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() != 2 {
            return Err(AddressError::SegmentCount {
                found: segments.len(),
            });
        }
        let (monitorable, variable) = (segments[0], segments[1]);
        if monitorable.is_empty() || variable.is_empty() {
            return Err(AddressError::EmptySegment);
        }

        let monitorable_wildcard = check_segment(monitorable, allow_wildcards)?;
        let variable_wildcard = check_segment(variable, allow_wildcards)?;

        if variable_wildcard && !monitorable_wildcard {
            return Err(AddressError::UnsupportedWildcardForm);
        }

        Ok(Self {
            monitorable_id: monitorable.to_string(),
            status_variable_id: variable.to_string(),
            is_monitorable_wildcard: monitorable_wildcard,
            is_variable_wildcard: variable_wildcard,
        })
    }

    /// Build a concrete path from two already-separated identifiers.
    pub fn concrete(monitorable_id: &str, status_variable_id: &str) -> Result<Self, AddressError> {
        validate_identifier(monitorable_id)?;
        validate_identifier(status_variable_id)?;
        Ok(Self {
            monitorable_id: monitorable_id.to_string(),
            status_variable_id: status_variable_id.to_string(),
            is_monitorable_wildcard: false,
            is_variable_wildcard: false,
        })
    }

    /// `*/<variable>` pattern matching `variable` on every monitorable.
    pub(crate) fn any_monitorable(status_variable_id: &str) -> Self {
        Self {
            monitorable_id: WILDCARD.to_string(),
            status_variable_id: status_variable_id.to_string(),
            is_monitorable_wildcard: true,
            is_variable_wildcard: false,
        }
    }

    /// `*/*` pattern.
    pub(crate) fn global() -> Self {
        Self {
            monitorable_id: WILDCARD.to_string(),
            status_variable_id: WILDCARD.to_string(),
            is_monitorable_wildcard: true,
            is_variable_wildcard: true,
        }
    }

    #[must_use]
    pub fn monitorable_id(&self) -> &str {
        &self.monitorable_id
    }

    #[must_use]
    pub fn status_variable_id(&self) -> &str {
        &self.status_variable_id
    }

    #[must_use]
    pub const fn is_monitorable_wildcard(&self) -> bool {
        self.is_monitorable_wildcard
    }

    #[must_use]
    pub const fn is_variable_wildcard(&self) -> bool {
        self.is_variable_wildcard
    }

    /// True when neither segment is a wildcard.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        !self.is_monitorable_wildcard && !self.is_variable_wildcard
    }

    /// True for `*/*`.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.is_monitorable_wildcard && self.is_variable_wildcard
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.monitorable_id, self.status_variable_id)
    }
}

/// Serialized form goes back through [`PathAddress::parse`], wildcards allowed.
impl TryFrom<String> for PathAddress {
    type Error = AddressError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw, true)
    }
}

impl From<PathAddress> for String {
    fn from(path: PathAddress) -> Self {
        path.to_string()
    }
}

/// Returns whether the segment is a wildcard.
fn check_segment(segment: &str, allow_wildcards: bool) -> Result<bool, AddressError> {
    if segment.contains('*') {
        if !allow_wildcards {
            return Err(AddressError::WildcardNotAllowed);
        }
        if segment != WILDCARD {
            return Err(AddressError::MalformedWildcard {
                segment: segment.to_string(),
            });
        }
        return Ok(true);
    }
    validate_identifier(segment)?;
    Ok(false)
}

/// Validate a bare monitorable or status variable identifier.
///
/// ```
/// use statmon::path::validate_identifier;
///
/// assert!(validate_identifier("com.acme.pid").is_ok());
/// assert!(validate_identifier("aaa.aaa.").is_err());
/// assert!(validate_identifier("com.acme.pid2.very.long.monitorable.id").is_err());
/// ```
pub fn validate_identifier(id: &str) -> Result<(), AddressError> {
    if id.is_empty() {
        return Err(AddressError::EmptySegment);
    }
    if id.chars().count() > MAX_ID_LENGTH {
        return Err(AddressError::IdentifierTooLong {
            segment: id.to_string(),
            max: MAX_ID_LENGTH,
        });
    }

    let well_formed = id.split('.').all(|token| {
        !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    });
    if !well_formed {
        return Err(AddressError::InvalidIdentifier {
            segment: id.to_string(),
        });
    }
    Ok(())
}
