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

use std::io;
use std::result;

use thiserror::Error as DeriveError;

use crate::id::DocumentId;

/// The error type for operations on a document store.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// A document, attachment, branch or file was not found.
    #[error("A resource was not found.")]
    NotFound,

    /// A document or attachment ID does not have the expected shape.
    #[error("The ID '{0}' is not 10 lowercase hexadecimal characters.")]
    InvalidId(String),

    /// A root file name, attachment name or file extension is invalid.
    #[error("The name '{0}' is invalid.")]
    InvalidName(String),

    /// Another transaction committed changes to the same document first.
    #[error("Document {0} was modified by another transaction.")]
    Conflict(DocumentId),

    /// The operation was cancelled before it could complete.
    #[error("The operation was cancelled.")]
    Cancelled,

    /// No unused ID could be found within the configured number of attempts.
    #[error("Could not find an unused ID.")]
    Exhausted,

    /// No store or cache is registered under the given scheme.
    #[error("No backend is registered for the scheme '{0}'.")]
    UnsupportedScheme(String),

    /// The location does not contain a usable document store.
    #[error("The location does not contain a supported document store.")]
    UnsupportedStore,

    /// A value could not be serialized.
    #[error("A value could not be serialized.")]
    Serialize(#[source] quick_xml::DeError),

    /// A value could not be deserialized.
    #[error("A value could not be deserialized.")]
    Deserialize(#[source] quick_xml::DeError),

    /// An error occurred in the storage backend.
    #[error("{0}")]
    Store(#[from] anyhow::Error),

    /// An I/O error occurred.
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// A coarse classification of an [`Error`].
///
/// Callers which surface errors to users can use this to tell client mistakes apart from
/// conflicts and backend failures.
///
/// [`Error`]: crate::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested resource does not exist.
    NotFound,

    /// The caller supplied a malformed ID, name or descriptor.
    InvalidArgument,

    /// A concurrent writer won; the caller should retry with a fresh transaction.
    Conflict,

    /// The operation was cancelled.
    Cancelled,

    /// The storage backend failed.
    Backend,
}

impl Error {
    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound => ErrorKind::NotFound,
            Error::InvalidId(_) | Error::InvalidName(_) | Error::UnsupportedScheme(_) => {
                ErrorKind::InvalidArgument
            }
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Exhausted
            | Error::UnsupportedStore
            | Error::Serialize(_)
            | Error::Deserialize(_)
            | Error::Store(_)
            | Error::Io(_) => ErrorKind::Backend,
        }
    }

    /// Convert an I/O error, mapping a missing file to `Error::NotFound`.
    pub(crate) fn from_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Error::NotFound,
            _ => Error::Io(error),
        }
    }
}

/// The result type for operations on a document store.
pub type Result<T> = result::Result<T, Error>;
