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

use std::fs::{create_dir, create_dir_all, read_dir, remove_file, File};
use std::io;
use std::iter;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::id::{AttachmentId, AttachmentName, DocumentId, IdPolicy};

use super::doc_store::{DocStore, DocTransaction, DocumentIds, ReadHandle, WriteHandle};
use super::layout::{document_name, open_file, parse_document_name, DocumentPaths};
use super::open_store::OpenStore;

/// The directory used when no location is given.
pub const DEFAULT_DIRECTORY: &str = "doc";

/// The configuration for opening a [`DirectoryStore`].
///
/// [`DirectoryStore`]: crate::store::DirectoryStore
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// The path of the directory store.
    pub path: PathBuf,

    /// The policy for allocating document and attachment IDs.
    #[serde(default)]
    pub id_policy: IdPolicy,
}

impl DirectoryConfig {
    /// Return the configuration for a directory store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_policy: IdPolicy::default(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTORY)
    }
}

impl OpenStore for DirectoryConfig {
    type Store = DirectoryStore;

    fn open(&self) -> crate::Result<Self::Store> {
        if self.path.exists() && !self.path.is_dir() {
            return Err(Error::UnsupportedStore);
        }
        create_dir_all(&self.path)?;

        info!(path = %self.path.display(), "Opened directory store.");

        Ok(DirectoryStore {
            path: self.path.clone(),
            id_policy: self.id_policy,
        })
    }
}

/// A `DocStore` which stores documents as plain directories in the local file system.
///
/// Every write is visible to every other transaction the moment it is made, and both
/// [`DocTransaction::commit`] and [`DocTransaction::rollback`] do nothing. There is no isolation
/// between concurrent transactions on the same document and no conflict detection; writes from
/// concurrent transactions interleave. Use [`GitStore`] when isolation matters.
///
/// You can use [`DirectoryConfig`] to open a document store of this type.
///
/// [`DocTransaction::commit`]: crate::store::DocTransaction::commit
/// [`DocTransaction::rollback`]: crate::store::DocTransaction::rollback
/// [`GitStore`]: crate::store::GitStore
/// [`DirectoryConfig`]: crate::store::DirectoryConfig
#[derive(Debug)]
pub struct DirectoryStore {
    /// The path of the store's root directory.
    path: PathBuf,

    id_policy: IdPolicy,
}

impl DirectoryStore {
    fn paths(&self, id: DocumentId) -> DocumentPaths {
        DocumentPaths::new(&self.path, id)
    }
}

impl DocStore for DirectoryStore {
    fn document_ids(&self) -> Result<DocumentIds<'_>> {
        let entries = match read_dir(&self.path) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Box::new(iter::empty()))
            }
            Err(error) => return Err(Error::Io(error)),
        };

        Ok(Box::new(entries.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => return Some(Err(Error::Io(error))),
            };
            let id = entry.file_name().to_str().and_then(parse_document_name)?;
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => Some(Ok(id)),
                Ok(_) => None,
                Err(error) => Some(Err(Error::Io(error))),
            }
        })))
    }

    fn new_document_id(&self, cancel: &CancelToken) -> Result<DocumentId> {
        let id = self.id_policy.allocate(cancel, || {
            let id = DocumentId::generate();
            // Creating the directory reserves the ID.
            match create_dir(self.path.join(document_name(id))) {
                Ok(()) => Ok(Some(id)),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(None),
                Err(error) => Err(Error::Io(error)),
            }
        })?;
        debug!(document = %id, "Reserved document ID.");
        Ok(id)
    }

    fn get_document(&self, id: DocumentId) -> Result<Box<dyn DocTransaction>> {
        Ok(Box::new(DirectoryTransaction {
            id,
            paths: self.paths(id),
            id_policy: self.id_policy,
        }))
    }

    fn get_root_file(&self, id: DocumentId, name: &str) -> Result<ReadHandle> {
        let file = open_file(&self.paths(id).root_file(name)?)?;
        Ok(Box::new(file))
    }

    fn get_attachment(
        &self,
        id: DocumentId,
        attachment: AttachmentId,
    ) -> Result<(AttachmentName, ReadHandle)> {
        let paths = self.paths(id);
        let name = find_attachment(&paths, attachment)?;
        let file = open_file(&paths.attachment(&name))?;
        Ok((name, Box::new(file)))
    }
}

/// Return the name of the attachment with the given `id` by listing the attachment directory.
fn find_attachment(paths: &DocumentPaths, id: AttachmentId) -> Result<AttachmentName> {
    paths
        .list_attachments()?
        .into_iter()
        .find(|name| name.id() == id)
        .ok_or(Error::NotFound)
}

/// A transaction on a [`DirectoryStore`], which reads and writes files in place.
#[derive(Debug)]
pub struct DirectoryTransaction {
    id: DocumentId,
    paths: DocumentPaths,
    id_policy: IdPolicy,
}

impl DocTransaction for DirectoryTransaction {
    fn document_id(&self) -> DocumentId {
        self.id
    }

    fn list_root_files(&self) -> Result<Vec<String>> {
        self.paths.list_root_files()
    }

    fn read_root_file(&self, name: &str) -> Result<ReadHandle> {
        let file = open_file(&self.paths.root_file(name)?)?;
        Ok(Box::new(file))
    }

    fn write_root_file(&mut self, name: &str) -> Result<WriteHandle> {
        let path = self.paths.root_file(name)?;
        create_dir_all(self.paths.directory())?;
        Ok(Box::new(File::create(path)?))
    }

    fn list_attachments(&self) -> Result<Vec<AttachmentName>> {
        self.paths.list_attachments()
    }

    fn read_attachment(&self, name: &AttachmentName) -> Result<ReadHandle> {
        let file = open_file(&self.paths.attachment(name))?;
        Ok(Box::new(file))
    }

    fn new_attachment_id(
        &mut self,
        cancel: &CancelToken,
        extension: &str,
    ) -> Result<AttachmentName> {
        let name = self.paths.reserve_attachment(
            &self.id_policy,
            cancel,
            extension,
            AttachmentId::generate,
        )?;
        debug!(document = %self.id, attachment = %name, "Reserved attachment ID.");
        Ok(name)
    }

    fn write_attachment(&mut self, name: &AttachmentName) -> Result<WriteHandle> {
        create_dir_all(self.paths.attachment_directory())?;
        Ok(Box::new(File::create(self.paths.attachment(name))?))
    }

    fn delete_attachment(&mut self, name: &AttachmentName) -> Result<()> {
        remove_file(self.paths.attachment(name)).map_err(Error::from_io)
    }

    fn attachment_name_from_id(&self, id: AttachmentId) -> Result<AttachmentName> {
        find_attachment(&self.paths, id)
    }

    fn commit(self: Box<Self>, message: &str) -> Result<()> {
        // A committed document exists even if nothing was written to it.
        create_dir_all(self.paths.directory())?;
        debug!(document = %self.id, message, "Committed directory transaction.");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
