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

use std::io::{self, Read, Write};

use tracing::{info, warn};

use crate::error::Result;
use crate::id::DocumentId;
use crate::store::{DocStore, DocTransaction};

/// The commit message used for documents copied from another store.
pub const COPY_MESSAGE: &str = "import from external store";

/// Copy every document in `source` into `target`.
///
/// Each document is copied in its own pair of transactions: a transaction on `source` which is
/// only read from and always rolled back, and a transaction on `target` which is committed only
/// if every root file and attachment was copied. Root files and attachments which already exist
/// in `target` are overwritten; other files in `target` are left alone.
///
/// This stops at the first document which fails to copy. Documents copied before that remain in
/// `target`. `source` is never modified.
///
/// This returns the number of documents copied.
///
/// # Errors
/// - `Error::Conflict`: A document in `target` was modified concurrently.
/// - `Error::Store`: An error occurred with either storage backend.
/// - `Error::Io`: An I/O error occurred.
pub fn copy_store(target: &dyn DocStore, source: &dyn DocStore) -> Result<usize> {
    let mut copied = 0;
    for id in source.document_ids()? {
        let id = id?;
        copy_document(target, source, id)?;
        copied += 1;
        info!(document = %id, "Copied document.");
    }
    info!(documents = copied, "Finished copying store.");
    Ok(copied)
}

fn copy_document(target: &dyn DocStore, source: &dyn DocStore, id: DocumentId) -> Result<()> {
    let reader = source.get_document(id)?;
    let mut writer = match target.get_document(id) {
        Ok(writer) => writer,
        Err(error) => {
            discard(reader);
            return Err(error);
        }
    };

    match copy_contents(reader.as_ref(), writer.as_mut()) {
        Ok(()) => {
            let committed = writer.commit(COPY_MESSAGE);
            let released = reader.rollback();
            committed.and(released)
        }
        Err(error) => {
            warn!(document = %id, %error, "Could not copy document.");
            discard(writer);
            discard(reader);
            Err(error)
        }
    }
}

/// Roll back a transaction whose outcome no longer matters.
fn discard(transaction: Box<dyn DocTransaction>) {
    let id = transaction.document_id();
    if let Err(error) = transaction.rollback() {
        warn!(document = %id, %error, "Could not roll back transaction.");
    }
}

fn copy_contents(source: &dyn DocTransaction, target: &mut dyn DocTransaction) -> Result<()> {
    for name in source.list_root_files()? {
        let reader = source.read_root_file(&name)?;
        let writer = target.write_root_file(&name)?;
        copy_file(reader, writer)?;
    }

    for name in source.list_attachments()? {
        let reader = source.read_attachment(&name)?;
        let writer = target.write_attachment(&name)?;
        copy_file(reader, writer)?;
    }

    Ok(())
}

/// Copy all of `reader` into `writer`, closing both.
fn copy_file(mut reader: impl Read, mut writer: impl Write) -> Result<()> {
    io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(())
}
