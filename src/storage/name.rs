//! Validated queue names.

use std::fmt;

use super::QueueError;

const MAX_NAME_LEN: usize = 255;

/// A queue name that is safe to use as a single directory under the store root.
///
/// Allowed characters are ASCII alphanumerics, `-`, `_` and `.`; a leading `.`
/// is rejected so names never collide with internal staging or claim files
/// and can never be `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueName(String);

impl QueueName {
    pub fn parse(raw: &str) -> Result<Self, QueueError> {
        let reject = |reason| QueueError::InvalidName {
            name: raw.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(reject("must not be empty"));
        }
        if raw.len() > MAX_NAME_LEN {
            return Err(reject("longer than 255 bytes"));
        }
        if raw.starts_with('.') {
            return Err(reject("must not start with '.'"));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        {
            return Err(reject("allowed characters are [A-Za-z0-9_.-]"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
