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

//! Backends for document storage.
//!
//! This module provides document stores. A document store holds a set of documents, each of which
//! is a directory of a few named root files plus any number of attachments. Every access to a
//! document goes through a transaction, which is resolved by committing or rolling it back.
//!
//! All document stores implement the [`DocStore`] trait, and their transactions implement
//! [`DocTransaction`].
//!
//! For each document store, there is a corresponding type which provides the necessary
//! configuration to open that document store. These config types implement [`OpenStore`].
//! Typically, you'll open stores through a [`Registry`] using a `scheme:location` descriptor
//! instead.
//!
//! [`DocStore`]: crate::store::DocStore
//! [`DocTransaction`]: crate::store::DocTransaction
//! [`OpenStore`]: crate::store::OpenStore
//! [`Registry`]: crate::Registry

pub use self::directory_store::{
    DirectoryConfig, DirectoryStore, DirectoryTransaction, DEFAULT_DIRECTORY,
};
pub use self::doc_store::{
    DocStore, DocTransaction, DocumentIds, ReadHandle, WriteHandle, DOCUMENT_FILE,
    KNOWN_EXTENSIONS, META_FILE,
};
#[cfg(feature = "store-git")]
pub use self::git_store::{
    GitConfig, GitStore, GitTransaction, DEFAULT_MAIN_BRANCH, DEFAULT_REPOSITORY,
};
pub use self::layout::{document_name, parse_document_name, ATTACHMENT_DIRECTORY, DOCUMENT_PREFIX};
pub use self::open_store::OpenStore;

mod directory_store;
mod doc_store;
mod git_store;
mod layout;
mod open_store;
