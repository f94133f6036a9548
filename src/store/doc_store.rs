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

use std::fmt;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use static_assertions::assert_obj_safe;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::id::{AttachmentId, AttachmentName, DocumentId};

/// The root file which holds the archived document itself.
pub const DOCUMENT_FILE: &str = "document.bin";

/// The root file which holds the document's [`DocumentMeta`].
///
/// [`DocumentMeta`]: crate::meta::DocumentMeta
pub const META_FILE: &str = "meta.xml";

/// The extensions probed when recovering an attachment name from its ID.
pub const KNOWN_EXTENSIONS: [&str; 9] = [
    "css", "svg", "png", "jpeg", "ico", "woff", "woff2", "eot", "ttf",
];

/// A handle for reading a file in a document.
///
/// The handle is closed when it is dropped.
pub type ReadHandle = Box<dyn Read + Send>;

/// A handle for writing a file in a document.
///
/// The handle is closed when it is dropped. Whether the data is visible to other transactions
/// before the transaction is committed depends on the backend.
pub type WriteHandle = Box<dyn Write + Send>;

/// A lazily evaluated sequence of document IDs.
pub type DocumentIds<'a> = Box<dyn Iterator<Item = Result<DocumentId>> + Send + 'a>;

/// A single-use view of one document's content.
///
/// A transaction is resolved by calling either [`commit`] or [`rollback`], both of which consume
/// it. Dropping a transaction without resolving it is equivalent to rolling it back.
///
/// Within a transaction, reads always observe the transaction's own writes. Whether a transaction
/// is isolated from other transactions depends on the backend; see [`DirectoryStore`] and
/// [`GitStore`].
///
/// [`commit`]: crate::store::DocTransaction::commit
/// [`rollback`]: crate::store::DocTransaction::rollback
/// [`DirectoryStore`]: crate::store::DirectoryStore
/// [`GitStore`]: crate::store::GitStore
pub trait DocTransaction: fmt::Debug + Send {
    /// The ID of the document this transaction operates on.
    fn document_id(&self) -> DocumentId;

    /// Return the names of the root files in the document, sorted.
    fn list_root_files(&self) -> Result<Vec<String>>;

    /// Open the root file with the given `name` for reading.
    ///
    /// # Errors
    /// - `Error::InvalidName`: The name is not a plain file name.
    /// - `Error::NotFound`: The document has no such root file.
    /// - `Error::Io`: An I/O error occurred.
    fn read_root_file(&self, name: &str) -> Result<ReadHandle>;

    /// Open the root file with the given `name` for writing, truncating it if it exists.
    ///
    /// # Errors
    /// - `Error::InvalidName`: The name is not a plain file name.
    /// - `Error::Io`: An I/O error occurred.
    fn write_root_file(&mut self, name: &str) -> Result<WriteHandle>;

    /// Return the names of the attachments in the document, sorted.
    ///
    /// Files in the attachment directory which are not named like attachments are skipped.
    fn list_attachments(&self) -> Result<Vec<AttachmentName>>;

    /// Open the attachment with the given `name` for reading.
    ///
    /// # Errors
    /// - `Error::NotFound`: The document has no such attachment.
    /// - `Error::Io`: An I/O error occurred.
    fn read_attachment(&self, name: &AttachmentName) -> Result<ReadHandle>;

    /// Allocate and reserve a new attachment with the given `extension`.
    ///
    /// The reserved attachment is created empty. Use [`write_attachment`] to fill it.
    ///
    /// # Errors
    /// - `Error::InvalidName`: The extension is invalid.
    /// - `Error::Cancelled`: `cancel` was signalled between attempts.
    /// - `Error::Exhausted`: No unused ID was found.
    /// - `Error::Io`: An I/O error occurred.
    ///
    /// [`write_attachment`]: crate::store::DocTransaction::write_attachment
    fn new_attachment_id(
        &mut self,
        cancel: &CancelToken,
        extension: &str,
    ) -> Result<AttachmentName>;

    /// Open the attachment with the given `name` for writing, creating it if necessary.
    fn write_attachment(&mut self, name: &AttachmentName) -> Result<WriteHandle>;

    /// Remove the attachment with the given `name`.
    ///
    /// # Errors
    /// - `Error::NotFound`: The document has no such attachment.
    /// - `Error::Io`: An I/O error occurred.
    fn delete_attachment(&mut self, name: &AttachmentName) -> Result<()>;

    /// Return the full name of the attachment with the given `id`.
    ///
    /// The default implementation probes each of [`KNOWN_EXTENSIONS`] in turn, so attachments
    /// with any other extension are not found. Backends which can list the attachment directory
    /// cheaply should override this.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no attachment with this ID.
    ///
    /// [`KNOWN_EXTENSIONS`]: crate::store::KNOWN_EXTENSIONS
    fn attachment_name_from_id(&self, id: AttachmentId) -> Result<AttachmentName> {
        for extension in KNOWN_EXTENSIONS {
            let name = AttachmentName::new(id, extension)?;
            match self.read_attachment(&name) {
                Ok(_) => return Ok(name),
                Err(Error::NotFound) => continue,
                Err(error) => return Err(error),
            }
        }
        Err(Error::NotFound)
    }

    /// Durably persist the changes made in this transaction.
    ///
    /// `message` is a human-readable description of the change.
    ///
    /// # Errors
    /// - `Error::Conflict`: Another transaction committed changes to this document first. The
    /// changes in this transaction are discarded; retry with a fresh transaction.
    /// - `Error::Store`: An error occurred with the storage backend.
    /// - `Error::Io`: An I/O error occurred.
    fn commit(self: Box<Self>, message: &str) -> Result<()>;

    /// Discard this transaction.
    fn rollback(self: Box<Self>) -> Result<()>;
}

assert_obj_safe!(DocTransaction);

/// A persistent store of documents.
///
/// Each document is identified by a [`DocumentId`] and consists of a small set of named root
/// files plus any number of attachments. All access to a document goes through a
/// [`DocTransaction`].
///
/// [`DocumentId`]: crate::DocumentId
/// [`DocTransaction`]: crate::store::DocTransaction
pub trait DocStore: fmt::Debug + Send + Sync {
    /// Return the IDs of all documents in the store.
    fn document_ids(&self) -> Result<DocumentIds<'_>>;

    /// Allocate and reserve a new document ID which is not yet present in this store.
    ///
    /// # Errors
    /// - `Error::Cancelled`: `cancel` was signalled between attempts.
    /// - `Error::Exhausted`: No unused ID was found.
    /// - `Error::Store`: An error occurred with the storage backend.
    /// - `Error::Io`: An I/O error occurred.
    fn new_document_id(&self, cancel: &CancelToken) -> Result<DocumentId>;

    /// Start a transaction on the document with the given `id`.
    ///
    /// The document does not need to exist yet; committing a transaction on an unknown ID
    /// creates the document.
    fn get_document(&self, id: DocumentId) -> Result<Box<dyn DocTransaction>>;

    /// Open a root file of a document without keeping a transaction open.
    ///
    /// The default implementation reads the whole file into memory inside a transaction which is
    /// then rolled back. Backends which can open files directly should override this.
    fn get_root_file(&self, id: DocumentId, name: &str) -> Result<ReadHandle> {
        let transaction = self.get_document(id)?;
        let mut buffer = Vec::new();
        transaction.read_root_file(name)?.read_to_end(&mut buffer)?;
        transaction.rollback()?;
        Ok(Box::new(Cursor::new(buffer)))
    }

    /// Open an attachment of a document by its ID without keeping a transaction open.
    ///
    /// This returns the full name of the attachment along with a handle for reading it.
    fn get_attachment(
        &self,
        id: DocumentId,
        attachment: AttachmentId,
    ) -> Result<(AttachmentName, ReadHandle)> {
        let transaction = self.get_document(id)?;
        let name = transaction.attachment_name_from_id(attachment)?;
        let mut buffer = Vec::new();
        transaction.read_attachment(&name)?.read_to_end(&mut buffer)?;
        transaction.rollback()?;
        Ok((name, Box::new(Cursor::new(buffer))))
    }
}

assert_obj_safe!(DocStore);

macro_rules! forward_doc_store {
    ($pointer:ident) => {
        impl<S: DocStore + ?Sized> DocStore for $pointer<S> {
            fn document_ids(&self) -> Result<DocumentIds<'_>> {
                (**self).document_ids()
            }

            fn new_document_id(&self, cancel: &CancelToken) -> Result<DocumentId> {
                (**self).new_document_id(cancel)
            }

            fn get_document(&self, id: DocumentId) -> Result<Box<dyn DocTransaction>> {
                (**self).get_document(id)
            }

            fn get_root_file(&self, id: DocumentId, name: &str) -> Result<ReadHandle> {
                (**self).get_root_file(id, name)
            }

            fn get_attachment(
                &self,
                id: DocumentId,
                attachment: AttachmentId,
            ) -> Result<(AttachmentName, ReadHandle)> {
                (**self).get_attachment(id, attachment)
            }
        }
    };
}

forward_doc_store!(Box);
forward_doc_store!(Arc);
