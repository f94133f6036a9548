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

#![cfg(feature = "store-git")]

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{create_dir_all, read_dir, remove_file, File};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, ErrorCode, Oid, PushOptions, RemoteCallbacks, Repository,
    RepositoryInitOptions, Signature,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::id::{AttachmentId, AttachmentName, DocumentId, IdPolicy};

use super::doc_store::{DocStore, DocTransaction, DocumentIds, ReadHandle, WriteHandle};
use super::layout::{document_name, open_file, parse_document_name, DocumentPaths};
use super::open_store::OpenStore;

/// The repository used when no location is given.
pub const DEFAULT_REPOSITORY: &str = "doc.git";

/// The branch new documents are created from.
pub const DEFAULT_MAIN_BRANCH: &str = "main";

/// The namespace of the scratch refs used to transfer commits into the shared repository.
const TRANSACTION_REF_PREFIX: &str = "refs/transactions/";

/// The contents of the file committed to the main branch of a new repository.
const README: &[u8] = b"Hello, world\n";

/// The name of the remote pointing at the shared repository in each working copy.
const ORIGIN: &str = "origin";

fn default_main_branch() -> String {
    String::from(DEFAULT_MAIN_BRANCH)
}

fn default_author_name() -> String {
    String::from("hoard-store")
}

fn default_author_email() -> String {
    String::from("hoard-store@localhost")
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

impl From<git2::Error> for Error {
    fn from(error: git2::Error) -> Self {
        match error.code() {
            ErrorCode::NotFound => Error::NotFound,
            _ => Error::Store(anyhow::Error::new(error)),
        }
    }
}

/// Return the commit `name` points to, or `None` if there is no such reference.
fn reference_target(repository: &Repository, name: &str) -> Result<Option<Oid>> {
    match repository.refname_to_id(name) {
        Ok(id) => Ok(Some(id)),
        Err(error) if error.code() == ErrorCode::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// The configuration for opening a [`GitStore`].
///
/// [`GitStore`]: crate::store::GitStore
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(docsrs, doc(cfg(feature = "store-git")))]
pub struct GitConfig {
    /// The path of the shared bare repository.
    pub path: PathBuf,

    /// The branch new documents are created from.
    #[serde(default = "default_main_branch")]
    pub main_branch: String,

    /// The author and committer name recorded on commits.
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// The author and committer email recorded on commits.
    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// The policy for allocating document and attachment IDs.
    #[serde(default)]
    pub id_policy: IdPolicy,
}

impl GitConfig {
    /// Return the configuration for a repository at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            main_branch: default_main_branch(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            id_policy: IdPolicy::default(),
        }
    }

    fn signature(&self) -> Result<Signature<'static>> {
        Ok(Signature::now(&self.author_name, &self.author_email)?)
    }

    /// Create a new bare repository at the configured path.
    fn init(&self) -> Result<Repository> {
        let mut options = RepositoryInitOptions::new();
        options
            .bare(true)
            .mkpath(true)
            .initial_head(&self.main_branch);
        let repository = Repository::init_opts(&self.path, &options)?;
        info!(path = %self.path.display(), "Created shared repository.");
        Ok(repository)
    }

    /// Give the main branch an initial commit if it does not have one yet.
    fn seed_main_branch(&self, repository: &Repository) -> Result<()> {
        let main_ref = branch_ref(&self.main_branch);
        if reference_target(repository, &main_ref)?.is_some() {
            return Ok(());
        }

        let readme = repository.blob(README)?;
        let mut builder = repository.treebuilder(None)?;
        builder.insert("README.md", readme, 0o100644)?;
        let tree = repository.find_tree(builder.write()?)?;
        let signature = self.signature()?;
        repository.commit(
            Some(&main_ref),
            &signature,
            &signature,
            "initial commit",
            &tree,
            &[],
        )?;

        info!(branch = %self.main_branch, "Created initial commit.");
        Ok(())
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REPOSITORY)
    }
}

impl OpenStore for GitConfig {
    type Store = GitStore;

    fn open(&self) -> crate::Result<Self::Store> {
        let repository = match Repository::open_bare(&self.path) {
            Ok(repository) => repository,
            Err(error) if error.code() == ErrorCode::NotFound => {
                // Refuse to turn an unrelated, non-empty directory into a repository.
                if self.path.exists() && read_dir(&self.path)?.next().is_some() {
                    return Err(Error::UnsupportedStore);
                }
                self.init()?
            }
            Err(error) => return Err(error.into()),
        };
        self.seed_main_branch(&repository)?;

        info!(path = %self.path.display(), "Opened git store.");

        Ok(GitStore {
            config: self.clone(),
        })
    }
}

/// A `DocStore` which stores each document on its own branch of a shared git repository.
///
/// Every transaction works in a private clone of the shared repository, so transactions never
/// observe each other's uncommitted changes. Committing a transaction creates a single commit and
/// publishes it by moving the document's branch from the commit the transaction started from to
/// the new commit. If another transaction moved the branch in the meantime, the commit fails with
/// `Error::Conflict` and nothing is published. Conflicts are never retried automatically.
///
/// Because the branch is moved with a compare-and-swap on the shared repository, the shared
/// repository must be reachable as a local path.
///
/// You can use [`GitConfig`] to open a document store of this type.
///
/// [`GitConfig`]: crate::store::GitConfig
#[derive(Debug)]
#[cfg_attr(docsrs, doc(cfg(feature = "store-git")))]
pub struct GitStore {
    config: GitConfig,
}

impl GitStore {
    fn repository(&self) -> Result<Repository> {
        Ok(Repository::open_bare(&self.config.path)?)
    }

    fn main_tip(&self, repository: &Repository) -> Result<Oid> {
        reference_target(repository, &branch_ref(&self.config.main_branch))?
            .ok_or(Error::NotFound)
    }
}

impl DocStore for GitStore {
    fn document_ids(&self) -> Result<DocumentIds<'_>> {
        let repository = self.repository()?;
        let mut ids = Vec::new();
        for branch in repository.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(id) = branch.name()?.and_then(parse_document_name) {
                ids.push(id);
            }
        }
        Ok(Box::new(ids.into_iter().map(Ok)))
    }

    fn new_document_id(&self, cancel: &CancelToken) -> Result<DocumentId> {
        let repository = self.repository()?;
        let base = self.main_tip(&repository)?;

        let id = self.config.id_policy.allocate(cancel, || {
            let id = DocumentId::generate();
            // Creating the branch reserves the ID; this fails if the branch already exists.
            match repository.reference(
                &branch_ref(&document_name(id)),
                base,
                false,
                "reserve document",
            ) {
                Ok(_) => Ok(Some(id)),
                Err(error) if error.code() == ErrorCode::Exists => Ok(None),
                Err(error) => Err(error.into()),
            }
        })?;

        debug!(document = %id, "Reserved document branch.");
        Ok(id)
    }

    fn get_document(&self, id: DocumentId) -> Result<Box<dyn DocTransaction>> {
        Ok(Box::new(GitTransaction::open(&self.config, id)?))
    }
}

/// A transaction on a [`GitStore`], backed by a private clone of the shared repository.
pub struct GitTransaction {
    id: DocumentId,

    /// The name of the document's branch.
    branch: String,

    /// The tip of the document's branch when the transaction started, if the branch existed.
    base: Option<Oid>,

    /// The commit checked out in the working copy.
    head: Oid,

    /// The document's paths inside the working copy.
    paths: DocumentPaths,

    /// The paths changed by this transaction, relative to the working copy.
    staged: BTreeSet<PathBuf>,

    config: GitConfig,

    clone: Repository,

    // This must be declared after `clone` so that the clone is closed before the directory
    // holding it is removed.
    workdir: TempDir,
}

impl fmt::Debug for GitTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitTransaction")
            .field("id", &self.id)
            .field("branch", &self.branch)
            .field("base", &self.base)
            .field("head", &self.head)
            .field("staged", &self.staged)
            .field("workdir", &self.workdir.path())
            .finish_non_exhaustive()
    }
}

impl GitTransaction {
    /// Clone the shared repository and check out the document's branch.
    fn open(config: &GitConfig, id: DocumentId) -> Result<Self> {
        let url = config.path.to_str().ok_or(Error::UnsupportedStore)?;
        let workdir = tempfile::Builder::new().prefix("hoard-").tempdir()?;
        let clone = RepoBuilder::new().clone(url, workdir.path())?;

        let branch = document_name(id);
        let base = reference_target(&clone, &format!("refs/remotes/{}/{}", ORIGIN, branch))?;
        let head = match base {
            Some(tip) => tip,
            None => reference_target(
                &clone,
                &format!("refs/remotes/{}/{}", ORIGIN, config.main_branch),
            )?
            .ok_or(Error::NotFound)?,
        };

        {
            let commit = clone.find_commit(head)?;
            clone.branch(&branch, &commit, true)?;
        }
        clone.set_head(&branch_ref(&branch))?;
        clone.checkout_head(Some(CheckoutBuilder::new().force()))?;

        debug!(
            document = %id,
            base = ?base,
            workdir = %workdir.path().display(),
            "Opened git transaction."
        );

        Ok(Self {
            id,
            paths: DocumentPaths::new(workdir.path(), id),
            branch,
            base,
            head,
            staged: BTreeSet::new(),
            config: config.clone(),
            clone,
            workdir,
        })
    }

    /// Record that the file at `path` changed so that it is included in the next commit.
    fn stage(&mut self, path: &Path) -> Result<()> {
        let relative = path
            .strip_prefix(self.workdir.path())
            .map_err(|_| anyhow!("Path is outside the working copy: {}", path.display()))?;
        self.staged.insert(relative.to_path_buf());
        Ok(())
    }

    /// Commit the staged paths to the document's branch in the working copy.
    fn create_commit(&self, message: &str) -> Result<Oid> {
        let mut index = self.clone.index()?;
        for path in &self.staged {
            if self.workdir.path().join(path).is_file() {
                index.add_path(path)?;
            } else {
                index.remove_path(path)?;
            }
        }
        index.write()?;

        let tree = self.clone.find_tree(index.write_tree()?)?;
        let parent = self.clone.find_commit(self.head)?;
        let signature = self.config.signature()?;
        Ok(self.clone.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent],
        )?)
    }

    /// Push the objects for `commit` into the shared repository under the scratch ref `scratch`.
    fn push(&self, scratch: &str) -> Result<()> {
        let mut remote = self.clone.find_remote(ORIGIN)?;
        let mut rejection = None;

        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.push_update_reference(|reference, status| {
                if let Some(status) = status {
                    rejection = Some(format!("{}: {}", reference, status));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let refspec = format!("+{}:{}", branch_ref(&self.branch), scratch);
            remote.push(&[refspec], Some(&mut options))?;
        }

        match rejection {
            Some(reason) => Err(Error::Store(anyhow!("The push was rejected: {}", reason))),
            None => Ok(()),
        }
    }

    /// Move the document's branch in `shared` from the base commit to `commit`.
    fn swap_branch(&self, shared: &Repository, commit: Oid, message: &str) -> Result<()> {
        let name = branch_ref(&self.branch);
        let log_message = format!("commit: {}", message);
        let swapped = match self.base {
            Some(base) => shared.reference_matching(&name, commit, true, base, &log_message),
            None => shared.reference(&name, commit, false, &log_message),
        };

        match swapped {
            Ok(_) => Ok(()),
            Err(error)
                if matches!(
                    error.code(),
                    ErrorCode::Modified
                        | ErrorCode::Exists
                        | ErrorCode::NotFound
                        | ErrorCode::Locked
                ) =>
            {
                warn!(document = %self.id, %error, "Rejected commit from a stale transaction.");
                Err(Error::Conflict(self.id))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Publish `commit` to the shared repository.
    fn publish(&self, commit: Oid, message: &str) -> Result<()> {
        let scratch = format!("{}{}", TRANSACTION_REF_PREFIX, Uuid::new_v4().as_simple());
        self.push(&scratch)?;

        let shared = Repository::open_bare(&self.config.path)?;
        let result = self.swap_branch(&shared, commit, message);

        let cleanup = shared
            .find_reference(&scratch)
            .and_then(|mut reference| reference.delete());
        if let Err(error) = cleanup {
            warn!(%error, reference = %scratch, "Could not remove scratch reference.");
        }

        result
    }

    /// Close the working copy and remove it from disk.
    fn discard(self) -> Result<()> {
        let Self { clone, workdir, .. } = self;
        drop(clone);
        workdir.close()?;
        Ok(())
    }
}

impl DocTransaction for GitTransaction {
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
        let file = File::create(&path)?;
        self.stage(&path)?;
        Ok(Box::new(file))
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
            &self.config.id_policy,
            cancel,
            extension,
            AttachmentId::generate,
        )?;

        let path = self.paths.attachment(&name);
        self.stage(&path)?;
        debug!(document = %self.id, attachment = %name, "Reserved attachment ID.");
        Ok(name)
    }

    fn write_attachment(&mut self, name: &AttachmentName) -> Result<WriteHandle> {
        let path = self.paths.attachment(name);
        create_dir_all(self.paths.attachment_directory())?;
        let file = File::create(&path)?;
        self.stage(&path)?;
        Ok(Box::new(file))
    }

    fn delete_attachment(&mut self, name: &AttachmentName) -> Result<()> {
        let path = self.paths.attachment(name);
        remove_file(&path).map_err(Error::from_io)?;
        self.stage(&path)
    }

    fn commit(self: Box<Self>, message: &str) -> Result<()> {
        let result = self
            .create_commit(message)
            .and_then(|commit| self.publish(commit, message));

        match &result {
            Ok(()) => debug!(document = %self.id, message, "Committed git transaction."),
            Err(error) => debug!(document = %self.id, %error, "Git transaction failed to commit."),
        }

        let discarded = self.discard();
        result.and(discarded)
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        debug!(document = %self.id, "Rolled back git transaction.");
        self.discard()
    }
}
