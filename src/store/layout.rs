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

//! The on-disk layout of a document, shared by every backend.
//!
//! ```text
//! g<docid>/document.bin
//! g<docid>/meta.xml
//! g<docid>/att/t<attid>.<ext>
//! ```

use std::fs::{create_dir_all, read_dir, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::id::{AttachmentId, AttachmentName, DocumentId, IdPolicy};

/// The character which prefixes every document directory and branch name.
pub const DOCUMENT_PREFIX: char = 'g';

/// The name of the directory which holds a document's attachments.
pub const ATTACHMENT_DIRECTORY: &str = "att";

/// Return the directory or branch name for the document with the given `id`.
pub fn document_name(id: DocumentId) -> String {
    format!("{}{}", DOCUMENT_PREFIX, id)
}

/// Parse a directory or branch name, returning `None` if it does not name a document.
pub fn parse_document_name(name: &str) -> Option<DocumentId> {
    name.strip_prefix(DOCUMENT_PREFIX)?.parse().ok()
}

/// Return an error unless `name` is usable as the name of a root file.
pub fn validate_root_file_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && name != ATTACHMENT_DIRECTORY;
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// The paths of one document's files relative to some base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPaths {
    directory: PathBuf,
}

impl DocumentPaths {
    /// Return the paths for the document `id` stored under `base`.
    pub fn new(base: &Path, id: DocumentId) -> Self {
        Self {
            directory: base.join(document_name(id)),
        }
    }

    /// The document's directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The directory holding the document's attachments.
    pub fn attachment_directory(&self) -> PathBuf {
        self.directory.join(ATTACHMENT_DIRECTORY)
    }

    /// The path of the root file `name`, after validating the name.
    pub fn root_file(&self, name: &str) -> Result<PathBuf> {
        validate_root_file_name(name)?;
        Ok(self.directory.join(name))
    }

    /// The path of the attachment `name`.
    pub fn attachment(&self, name: &AttachmentName) -> PathBuf {
        self.attachment_directory().join(name.to_string())
    }

    /// Return the names of the plain files in the document directory, sorted.
    pub fn list_root_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in read_dir_or_empty(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_root_file_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Return the names of the attachments in the attachment directory, sorted.
    pub fn list_attachments(&self) -> Result<Vec<AttachmentName>> {
        let mut names = Vec::new();
        for entry in read_dir_or_empty(&self.attachment_directory())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str().and_then(AttachmentName::from_file_name)
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reserve an attachment with the given `extension` by creating it as an empty file.
    ///
    /// Candidate IDs come from `generate`. A candidate is rejected if any attachment of this
    /// document already uses its ID, whatever that attachment's extension.
    pub(crate) fn reserve_attachment(
        &self,
        policy: &IdPolicy,
        cancel: &CancelToken,
        extension: &str,
        mut generate: impl FnMut() -> AttachmentId,
    ) -> Result<AttachmentName> {
        // Fail on a bad extension before spending any attempts.
        AttachmentName::new(AttachmentId::generate(), extension)?;
        create_dir_all(self.attachment_directory())?;

        policy.allocate(cancel, || {
            let id = generate();
            if self.list_attachments()?.iter().any(|name| name.id() == id) {
                return Ok(None);
            }
            let name = AttachmentName::new(id, extension)?;
            Ok(create_new_file(&self.attachment(&name))?.map(|_| name))
        })
    }
}

/// Return the entries of `path`, or nothing if the directory does not exist.
pub fn read_dir_or_empty(path: &Path) -> Result<Vec<io::Result<std::fs::DirEntry>>> {
    match read_dir(path) {
        Ok(entries) => Ok(entries.collect()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(Error::Io(error)),
    }
}

/// Open an existing file for reading.
pub fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(Error::from_io)
}

/// Create a new empty file at `path`, returning `None` if it already exists.
pub fn create_new_file(path: &Path) -> Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(error) => Err(Error::Io(error)),
    }
}
