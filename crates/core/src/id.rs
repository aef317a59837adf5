//! Caller-chosen identifiers.
//!
//! Streams and cached models are keyed by names the hosting application picks
//! (`"orders"`, `"daily-revenue"`), so these are validated string newtypes
//! rather than generated ids.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Longest identifier accepted.
pub const MAX_ID_LEN: usize = 128;

/// Identifier of a realtime data stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId(String);

/// Identifier of a cached trained model.
///
/// Defaults to [`ModelKey::DEFAULT`], so by default there is one cached model
/// per model kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelKey(String);

impl ModelKey {
    pub const DEFAULT: &'static str = "default";
}

impl Default for ModelKey {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

fn validate(raw: &str, name: &str) -> CoreResult<()> {
    if raw.trim().is_empty() {
        return Err(CoreError::invalid_id(format!("{name}: must not be empty")));
    }
    if raw.len() > MAX_ID_LEN {
        return Err(CoreError::invalid_id(format!(
            "{name}: longer than {MAX_ID_LEN} bytes"
        )));
    }
    if raw.chars().any(char::is_control) {
        return Err(CoreError::invalid_id(format!(
            "{name}: contains control characters"
        )));
    }
    Ok(())
}

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Validate and wrap a caller-chosen identifier.
            pub fn new(raw: impl Into<String>) -> CoreResult<Self> {
                let raw = raw.into();
                validate(&raw, $name)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_string_newtype!(StreamId, "StreamId");
impl_string_newtype!(ModelKey, "ModelKey");
