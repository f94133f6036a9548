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

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use rstest::*;
use tempfile::TempDir;
use walkdir::WalkDir;

use hoard_store::meta::{write_meta, DocumentMeta};
use hoard_store::store::{DirectoryConfig, DirectoryStore, DocStore, OpenStore, DOCUMENT_FILE};
#[cfg(feature = "store-git")]
use hoard_store::store::{GitConfig, GitStore};
use hoard_store::{AttachmentName, DocumentId};

use super::data::random_bytes;

/// The ID of the pre-seeded document.
pub const FIXTURE_DOCUMENT: &str = "43dbc153e5";

/// The only attachment of the pre-seeded document.
pub const FIXTURE_ATTACHMENT: &str = "t7e2d9c3e82.css";

/// A value which is tied to the lifetime of a temporary directory.
pub struct WithTempDir<T> {
    value: T,
    directory: TempDir,
}

impl<T> WithTempDir<T> {
    /// The temporary directory holding the value.
    pub fn path(&self) -> &Path {
        self.directory.path()
    }

    /// Separate the value from the directory which must outlive it.
    pub fn into_parts(self) -> (T, TempDir) {
        (self.value, self.directory)
    }
}

impl<T> Deref for WithTempDir<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for WithTempDir<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

/// A backend to run a test against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Directory,
    #[cfg(feature = "store-git")]
    Git,
}

impl Backend {
    /// The path of the store inside `directory`.
    pub fn store_path(self, directory: &Path) -> PathBuf {
        match self {
            Backend::Directory => directory.join("doc"),
            #[cfg(feature = "store-git")]
            Backend::Git => directory.join("doc.git"),
        }
    }

    /// Open a store of this type inside `directory`.
    pub fn open(self, directory: &Path) -> anyhow::Result<Box<dyn DocStore>> {
        let path = self.store_path(directory);
        let store: Box<dyn DocStore> = match self {
            Backend::Directory => Box::new(DirectoryConfig::new(path).open()?),
            #[cfg(feature = "store-git")]
            Backend::Git => Box::new(GitConfig::new(path).open()?),
        };
        Ok(store)
    }

    /// Open an empty store of this type in a new temporary directory.
    pub fn temp_store(self) -> WithTempDir<Box<dyn DocStore>> {
        let directory = tempfile::tempdir().unwrap();
        let value = self.open(directory.path()).unwrap();
        WithTempDir { value, directory }
    }
}

#[fixture]
pub fn directory_store() -> WithTempDir<DirectoryStore> {
    let directory = tempfile::tempdir().unwrap();
    let value = DirectoryConfig::new(directory.path().join("doc"))
        .open()
        .unwrap();
    WithTempDir { value, directory }
}

#[cfg(feature = "store-git")]
#[fixture]
pub fn git_store() -> WithTempDir<GitStore> {
    let directory = tempfile::tempdir().unwrap();
    let value = GitConfig::new(directory.path().join("doc.git"))
        .open()
        .unwrap();
    WithTempDir { value, directory }
}

/// Return metadata for a test document.
pub fn test_meta(title: &str, owner: &str, public: bool) -> DocumentMeta {
    let mut meta = DocumentMeta {
        title: title.to_string(),
        content_type: String::from("text/html"),
        ..DocumentMeta::default()
    };
    meta.permissions.owner = owner.to_string();
    meta.permissions.public = public;
    meta
}

/// Create and commit the fixture document: a `document.bin` of at least 512 bytes, a `meta.xml`
/// and the single attachment `t7e2d9c3e82.css`.
pub fn seed_fixture(store: &dyn DocStore) -> anyhow::Result<DocumentId> {
    let id: DocumentId = FIXTURE_DOCUMENT.parse()?;
    let attachment: AttachmentName = FIXTURE_ATTACHMENT.parse()?;

    let mut transaction = store.get_document(id)?;
    transaction
        .write_root_file(DOCUMENT_FILE)?
        .write_all(&random_bytes(1024))?;
    write_meta(transaction.as_mut(), &test_meta("Fixture", "alice", false))?;
    transaction
        .write_attachment(&attachment)?
        .write_all(b"body { color: black; }\n")?;
    transaction.commit("seed fixture document")?;

    Ok(id)
}

/// Return every file under `root` with its contents, keyed by relative path.
pub fn snapshot_tree(root: &Path) -> anyhow::Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let relative = entry.path().strip_prefix(root)?.to_path_buf();
            files.insert(relative, fs::read(entry.path())?);
        }
    }
    Ok(files)
}
