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

//! Queries over the metadata of every document in a store.

use std::fmt;

use static_assertions::assert_obj_safe;
use tracing::warn;

use crate::error::Result;
use crate::id::DocumentId;
use crate::meta::{read_meta, DocumentMeta};
use crate::store::{DocStore, DocTransaction};

/// A window into a list of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Limit {
    /// The number of matching results to skip.
    pub offset: usize,

    /// The maximum number of results to return, or `0` for no maximum.
    pub limit: usize,
}

impl Limit {
    /// Return a window of at most `limit` results after skipping `offset`.
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Return a window which includes every result.
    pub fn unlimited() -> Self {
        Self::default()
    }

    fn is_full(&self, count: usize) -> bool {
        self.limit > 0 && count >= self.limit
    }
}

/// Answers questions about the documents in a store which would otherwise require reading the
/// metadata of every document.
///
/// `user` is the ID of the requesting user, or `None` for an anonymous request.
pub trait DocumentCache: fmt::Debug + Send + Sync {
    /// Return the documents visible to `user` along with their metadata.
    ///
    /// Documents are visible when they are public or owned by `user`. Documents whose metadata
    /// cannot be read are skipped.
    fn get_documents(
        &self,
        user: Option<&str>,
        limit: Limit,
    ) -> Result<Vec<(DocumentId, DocumentMeta)>>;

    /// Find a document owned by `user` which was captured from `url`.
    ///
    /// This returns an open transaction on the document, which the caller must resolve.
    fn get_document_by_url(
        &self,
        user: Option<&str>,
        url: &str,
    ) -> Result<Option<Box<dyn DocTransaction>>>;

    /// Return the metadata of the document with the given `id`.
    ///
    /// # Errors
    /// - `Error::NotFound`: The document has no metadata.
    /// - `Error::Deserialize`: The metadata is invalid.
    fn get_document_meta(&self, id: DocumentId) -> Result<DocumentMeta>;
}

assert_obj_safe!(DocumentCache);

/// A `DocumentCache` which caches nothing.
///
/// Every query opens a transaction on every document in the store and reads its metadata, so the
/// cost of each query is proportional to the number of documents.
#[derive(Debug)]
pub struct NaiveCache<S: DocStore> {
    store: S,
}

impl<S: DocStore> NaiveCache<S> {
    /// Return a cache which reads from `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The store this cache reads from.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume this cache, returning the underlying store.
    pub fn into_inner(self) -> S {
        self.store
    }

    /// Read the metadata of `id` in a transaction, returning the still-open transaction.
    ///
    /// Unreadable metadata is logged and reported as `None`.
    fn open_with_meta(
        &self,
        id: DocumentId,
    ) -> Result<(Box<dyn DocTransaction>, Option<DocumentMeta>)> {
        let transaction = self.store.get_document(id)?;
        match read_meta(transaction.as_ref()) {
            Ok(meta) => Ok((transaction, Some(meta))),
            Err(error) => {
                warn!(document = %id, %error, "Skipping document with unreadable metadata.");
                Ok((transaction, None))
            }
        }
    }
}

impl<S: DocStore> DocumentCache for NaiveCache<S> {
    fn get_documents(
        &self,
        user: Option<&str>,
        limit: Limit,
    ) -> Result<Vec<(DocumentId, DocumentMeta)>> {
        let mut documents = Vec::new();
        let mut skipped = 0;

        for id in self.store.document_ids()? {
            let id = id?;
            let (transaction, meta) = self.open_with_meta(id)?;
            transaction.rollback()?;

            let meta = match meta {
                Some(meta) if meta.is_visible_to(user) => meta,
                _ => continue,
            };

            if skipped < limit.offset {
                skipped += 1;
                continue;
            }

            documents.push((id, meta));
            if limit.is_full(documents.len()) {
                break;
            }
        }

        Ok(documents)
    }

    fn get_document_by_url(
        &self,
        user: Option<&str>,
        url: &str,
    ) -> Result<Option<Box<dyn DocTransaction>>> {
        for id in self.store.document_ids()? {
            let (transaction, meta) = self.open_with_meta(id?)?;
            let matches = meta.map_or(false, |meta| {
                meta.url.as_deref() == Some(url) && meta.is_owned_by(user)
            });
            if matches {
                return Ok(Some(transaction));
            }
            transaction.rollback()?;
        }

        Ok(None)
    }

    fn get_document_meta(&self, id: DocumentId) -> Result<DocumentMeta> {
        let transaction = self.store.get_document(id)?;
        let meta = read_meta(transaction.as_ref());
        transaction.rollback()?;
        meta
    }
}
