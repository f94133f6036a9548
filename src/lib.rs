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

//! `hoard-store` is a library for transactional storage of archived web documents.
//!
//! A document is a small directory: a `document.bin` holding the archived page, a `meta.xml`
//! holding its [`DocumentMeta`], and any number of attachments such as stylesheets and images.
//! Documents live in a `DocStore`, and every access to a document goes through a transaction
//! which is either committed or rolled back.
//!
//! The following document stores are provided out of the box:
//! - `DirectoryStore` stores documents as plain directories in the local file system. Writes are
//! visible immediately and transactions are not isolated.
//! - `GitStore` stores each document on its own branch of a shared git repository. Transactions
//! are isolated from each other, and concurrent commits to the same document are detected and
//! rejected with `Error::Conflict`.
//!
//! On top of any store, this crate provides:
//! - [`read_meta`] and [`write_meta`] for the metadata of a document.
//! - [`NaiveCache`], which answers queries about which documents a user can see.
//! - [`copy_store`], which migrates every document from one store to another.
//! - [`Registry`], which opens stores and caches from `scheme:location` descriptors.
//!
//! # Examples
//! ```
//! use std::io::{Read, Write};
//! use hoard_store::store::{DirectoryConfig, OpenStore, DocStore, DOCUMENT_FILE};
//! use hoard_store::CancelToken;
//!
//! fn main() -> hoard_store::Result<()> {
//!     let directory = tempfile::tempdir()?;
//!     let store = DirectoryConfig::new(directory.path()).open()?;
//!
//!     // Reserve a new document ID.
//!     let id = store.new_document_id(&CancelToken::new())?;
//!
//!     // Write the document in a transaction.
//!     let mut transaction = store.get_document(id)?;
//!     transaction.write_root_file(DOCUMENT_FILE)?.write_all(b"<html></html>")?;
//!     transaction.commit("capture page")?;
//!
//!     // Read it back.
//!     let mut contents = Vec::new();
//!     store.get_root_file(id, DOCUMENT_FILE)?.read_to_end(&mut contents)?;
//!     assert_eq!(contents, b"<html></html>");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Features
//! Some functionality is gated behind cargo features:
//!
//! Type | Cargo Feature
//! --- | ---
//! `GitStore` | `store-git`
//! `hoard-store` binary | `cli`
//!
//! The `store-git` feature is enabled by default.
//!
//! [`DocumentMeta`]: crate::meta::DocumentMeta
//! [`read_meta`]: crate::meta::read_meta
//! [`write_meta`]: crate::meta::write_meta
//! [`NaiveCache`]: crate::cache::NaiveCache
//! [`copy_store`]: crate::copy_store
//! [`Registry`]: crate::Registry

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use cancel::CancelToken;
pub use copy::{copy_store, COPY_MESSAGE};
pub use error::{Error, ErrorKind, Result};
pub use id::{AttachmentId, AttachmentName, DocumentId, IdPolicy};
pub use registry::{CacheFactory, Registry, StoreDescriptor, StoreFactory};

mod cancel;
mod copy;
mod error;
mod id;
mod registry;

pub mod cache;
pub mod meta;
pub mod store;
