/*
 * Copyright 2019-2021 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

#![macro_use]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// The number of random bytes in a document or attachment ID.
pub const ID_BYTES: usize = 5;

/// The length of the hexadecimal representation of an ID.
pub const ID_LEN: usize = ID_BYTES * 2;

/// The character which prefixes the file name of every attachment.
pub const ATTACHMENT_TAG: char = 't';

/// The maximum length of an attachment file extension.
const MAX_EXTENSION_LEN: usize = 16;

/// Parse `value` as an ID, accepting only lowercase hexadecimal digits.
fn parse_hex_id(value: &str) -> Result<[u8; ID_BYTES]> {
    let well_formed = value.len() == ID_LEN
        && value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
    if !well_formed {
        return Err(Error::InvalidId(value.to_string()));
    }

    let mut bytes = [0u8; ID_BYTES];
    hex::decode_to_slice(value, &mut bytes).map_err(|_| Error::InvalidId(value.to_string()))?;
    Ok(bytes)
}

macro_rules! hex_id_type {
    {
        $(#[$meta:meta])*
        $name:ident
    } => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; ID_BYTES]);

        impl $name {
            /// Generate a new random ID.
            ///
            /// This does not check whether the ID is already in use.
            pub fn generate() -> Self {
                $name(rand::random())
            }

            /// Return the raw bytes of this ID.
            pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
                &self.0
            }
        }

        impl From<[u8; ID_BYTES]> for $name {
            fn from(bytes: [u8; ID_BYTES]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                parse_hex_id(value).map(Self)
            }
        }
    };
}

hex_id_type! {
    /// The ID of a document in a [`DocStore`].
    ///
    /// IDs are only unique within a single store.
    ///
    /// [`DocStore`]: crate::store::DocStore
    DocumentId
}

hex_id_type! {
    /// The ID of an attachment, unique within a single document.
    AttachmentId
}

/// Return whether `extension` is acceptable as an attachment file extension.
fn is_valid_extension(extension: &str) -> bool {
    !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

/// The file name of an attachment, of the form `t<id>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttachmentName {
    id: AttachmentId,
    extension: String,
}

impl AttachmentName {
    /// Return the name of the attachment with the given `id` and `extension`.
    ///
    /// # Errors
    /// - `Error::InvalidName`: The extension is empty, too long, or not ASCII alphanumeric.
    pub fn new(id: AttachmentId, extension: &str) -> Result<Self> {
        if !is_valid_extension(extension) {
            return Err(Error::InvalidName(extension.to_string()));
        }
        Ok(Self {
            id,
            extension: extension.to_string(),
        })
    }

    /// The ID embedded in this name.
    pub fn id(&self) -> AttachmentId {
        self.id
    }

    /// The file extension, without the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Parse a directory entry, returning `None` if it is not an attachment name.
    pub(crate) fn from_file_name(name: &str) -> Option<Self> {
        let (id, extension) = name.strip_prefix(ATTACHMENT_TAG)?.split_once('.')?;
        AttachmentName::new(id.parse().ok()?, extension).ok()
    }
}

impl fmt::Display for AttachmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", ATTACHMENT_TAG, self.id, self.extension)
    }
}

impl FromStr for AttachmentName {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        AttachmentName::from_file_name(value).ok_or_else(|| Error::InvalidName(value.to_string()))
    }
}

/// The policy for allocating collision-free IDs.
///
/// Every backend uses the same policy for both document and attachment IDs. The cancellation
/// token is checked before each attempt, and allocation gives up with `Error::Exhausted` after
/// `max_attempts` collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdPolicy {
    /// The maximum number of IDs to try before giving up.
    pub max_attempts: u32,
}

impl Default for IdPolicy {
    fn default() -> Self {
        Self { max_attempts: 16 }
    }
}

impl IdPolicy {
    /// Repeatedly call `try_reserve` until it reserves a value.
    ///
    /// `try_reserve` returns `Ok(None)` when the value it generated is already taken.
    pub(crate) fn allocate<T>(
        &self,
        cancel: &CancelToken,
        mut try_reserve: impl FnMut() -> Result<Option<T>>,
    ) -> Result<T> {
        for attempt in 1..=self.max_attempts {
            cancel.check()?;
            if let Some(value) = try_reserve()? {
                return Ok(value);
            }
            debug!(attempt, "Generated ID is already in use.");
        }
        Err(Error::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn ids_round_trip_through_strings() {
        let id = DocumentId::generate();
        let parsed: DocumentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_string().len(), ID_LEN);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for value in ["", "43dbc153e", "43dbc153e5a", "43DBC153E5", "43dbc153eg", "g43dbc153e"] {
            assert!(
                matches!(value.parse::<DocumentId>(), Err(Error::InvalidId(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn attachment_names_are_parsed() {
        let name: AttachmentName = "t7e2d9c3e82.css".parse().unwrap();
        assert_eq!(name.id().to_string(), "7e2d9c3e82");
        assert_eq!(name.extension(), "css");
        assert_eq!(name.to_string(), "t7e2d9c3e82.css");
    }

    #[test]
    fn non_conforming_file_names_are_skipped() {
        for name in [
            "7e2d9c3e82.css",
            "t7e2d9c3e82",
            "t7e2d9c3e82.",
            "t7e2d9c3e8.css",
            "t7e2d9c3e82.tar.gz",
            "x7e2d9c3e82.css",
        ] {
            assert_eq!(AttachmentName::from_file_name(name), None, "{name}");
        }
    }

    #[test]
    fn invalid_extensions_are_rejected() {
        let id = AttachmentId::generate();
        assert!(matches!(
            AttachmentName::new(id, "../x"),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(AttachmentName::new(id, ""), Err(Error::InvalidName(_))));
    }

    #[test]
    fn allocation_gives_up_after_max_attempts() {
        let attempts = Cell::new(0);
        let policy = IdPolicy { max_attempts: 3 };
        let result: Result<()> = policy.allocate(&CancelToken::new(), || {
            attempts.set(attempts.get() + 1);
            Ok(None)
        });
        assert!(matches!(result, Err(Error::Exhausted)));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn allocation_stops_when_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result: Result<u32> = IdPolicy::default().allocate(&cancel, || Ok(Some(1)));
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn allocation_retries_collisions() {
        let attempts = Cell::new(0);
        let value = IdPolicy::default()
            .allocate(&CancelToken::new(), || {
                attempts.set(attempts.get() + 1);
                Ok(if attempts.get() < 3 { None } else { Some(attempts.get()) })
            })
            .unwrap();
        assert_eq!(value, 3);
    }
}
