//! Validated identifier newtypes.
//!
//! Each ID is a thin wrapper over a `String` with a constructor that
//! validates shape once, so every other call site can treat the value as
//! already-correct.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of value that failed validation, used by [`ValidationError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`RunId`].
    RunId,
    /// A [`TaskId`].
    TaskId,
    /// A [`BatchId`].
    BatchId,
    /// A [`ProjectName`].
    ProjectName,
}

/// A value failed validation for an ID newtype.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Which ID type rejected the value.
    pub kind: ErrorKind,
    /// The raw value that was rejected.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {:?} {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

fn validate_slug(kind: ErrorKind, s: &str, allow_colon: bool) -> Result<(), ValidationError> {
    if s.is_empty() {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must not be empty".to_owned(),
        });
    }
    let ok = s.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_colon && c == ':')
    });
    if !ok {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must contain only ASCII alphanumerics, '-' and '_'".to_owned(),
        });
    }
    Ok(())
}

macro_rules! id_newtype {
    ($name:ident, $kind:expr, $allow_colon:expr) => {
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw string.
            ///
            /// # Errors
            /// Returns [`ValidationError`] if `s` is empty or contains
            /// characters outside `[A-Za-z0-9_-]`.
            pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
                let s = s.into();
                validate_slug($kind, &s, $allow_colon)?;
                Ok(Self(s))
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                validate_slug($kind, &s, $allow_colon)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_newtype!(RunId, ErrorKind::RunId, false);
id_newtype!(TaskId, ErrorKind::TaskId, false);
id_newtype!(BatchId, ErrorKind::BatchId, false);
id_newtype!(ProjectName, ErrorKind::ProjectName, false);

impl RunId {
    /// Default run id: `YYYYMMDD-HHMMSS` in UTC.
    #[must_use]
    pub fn from_timestamp(now: chrono::DateTime<chrono::Utc>) -> Self {
        Self(now.format("%Y%m%d-%H%M%S").to_string())
    }
}

/// Slugify a human-readable task name into a filesystem/ref-safe slug
///: lowercase ASCII, `[^a-z0-9]+` collapsed to `-`,
/// leading/trailing `-` stripped, capped at 80 characters.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for c in name.chars() {
        let lower = c.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            slug.push(lower);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-');
    let capped = if trimmed.len() > 80 {
        &trimmed[..80]
    } else {
        trimmed
    };
    capped.trim_matches('-').to_owned()
}
