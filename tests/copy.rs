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

use std::io::Write;

use hoard_store::store::{document_name, DocStore, DOCUMENT_FILE};
use hoard_store::{copy_store, CancelToken, DocumentId};

use common::*;

mod common;

/// Fill `store` with the fixture document, one document which has no metadata, and one reserved
/// document which has no files at all.
fn populate(store: &dyn DocStore) -> anyhow::Result<Vec<DocumentId>> {
    let fixture = seed_fixture(store)?;

    let bare = store.new_document_id(&CancelToken::new())?;
    let mut transaction = store.get_document(bare)?;
    transaction
        .write_root_file(DOCUMENT_FILE)?
        .write_all(&random_bytes(MIN_BUFFER_SIZE))?;
    let image = transaction.new_attachment_id(&CancelToken::new(), "png")?;
    transaction
        .write_attachment(&image)?
        .write_all(&random_bytes(MIN_BUFFER_SIZE))?;
    transaction.commit("add document without metadata")?;

    let reserved = store.new_document_id(&CancelToken::new())?;

    let mut ids = vec![fixture, bare, reserved];
    ids.sort();
    Ok(ids)
}

/// Assert that every document in `expected` has the same files in `actual`.
fn assert_same_documents(actual: &dyn DocStore, expected: &dyn DocStore) -> anyhow::Result<()> {
    let mut actual_ids = actual
        .document_ids()?
        .collect::<hoard_store::Result<Vec<_>>>()?;
    let mut expected_ids = expected
        .document_ids()?
        .collect::<hoard_store::Result<Vec<_>>>()?;
    actual_ids.sort();
    expected_ids.sort();
    assert_that(&actual_ids).is_equal_to(&expected_ids);

    for id in expected_ids {
        let expected_transaction = expected.get_document(id)?;
        let actual_transaction = actual.get_document(id)?;

        let root_files = expected_transaction.list_root_files()?;
        assert_that(&actual_transaction.list_root_files()?).is_equal_to(&root_files);
        for name in root_files {
            assert_that(&read_all(actual_transaction.read_root_file(&name)?)?)
                .is_equal_to(read_all(expected_transaction.read_root_file(&name)?)?);
        }

        let attachments = expected_transaction.list_attachments()?;
        assert_that(&actual_transaction.list_attachments()?).is_equal_to(&attachments);
        for name in attachments {
            assert_that(&read_all(actual_transaction.read_attachment(&name)?)?)
                .is_equal_to(read_all(expected_transaction.read_attachment(&name)?)?);
        }

        expected_transaction.rollback()?;
        actual_transaction.rollback()?;
    }

    Ok(())
}

#[rstest]
#[case::directory_to_directory(Backend::Directory, Backend::Directory)]
#[cfg_attr(
    feature = "store-git",
    case::directory_to_git(Backend::Directory, Backend::Git)
)]
#[cfg_attr(
    feature = "store-git",
    case::git_to_directory(Backend::Git, Backend::Directory)
)]
#[cfg_attr(feature = "store-git", case::git_to_git(Backend::Git, Backend::Git))]
fn copy_reproduces_every_document(
    #[case] source_backend: Backend,
    #[case] target_backend: Backend,
) -> anyhow::Result<()> {
    let source = source_backend.temp_store();
    let target = target_backend.temp_store();
    let ids = populate(&**source)?;

    let copied = copy_store(&**target, &**source)?;

    assert_that(&copied).is_equal_to(ids.len());
    assert_same_documents(&**target, &**source)?;

    Ok(())
}

#[rstest]
#[case::directory(Backend::Directory)]
#[cfg_attr(feature = "store-git", case::git(Backend::Git))]
fn copy_leaves_the_source_untouched(#[case] target_backend: Backend) -> anyhow::Result<()> {
    let source = Backend::Directory.temp_store();
    let target = target_backend.temp_store();
    populate(&**source)?;
    let before = snapshot_tree(source.path())?;

    copy_store(&**target, &**source)?;

    assert_that(&snapshot_tree(source.path())?).is_equal_to(&before);

    Ok(())
}

#[rstest]
#[case::directory(Backend::Directory)]
#[cfg_attr(feature = "store-git", case::git(Backend::Git))]
fn copying_an_empty_store_copies_nothing(#[case] source_backend: Backend) -> anyhow::Result<()> {
    let source = source_backend.temp_store();
    let target = Backend::Directory.temp_store();

    assert_that(&copy_store(&**target, &**source)?).is_equal_to(0);
    assert_that(&target.document_ids()?.count()).is_equal_to(0);

    Ok(())
}

#[rstest]
#[case::directory(Backend::Directory)]
#[cfg_attr(feature = "store-git", case::git(Backend::Git))]
fn copy_overwrites_existing_documents(
    #[case] target_backend: Backend,
    buffer: Vec<u8>,
) -> anyhow::Result<()> {
    let source = Backend::Directory.temp_store();
    let target = target_backend.temp_store();
    let id = seed_fixture(&**source)?;

    let mut transaction = target.get_document(id)?;
    transaction.write_root_file(DOCUMENT_FILE)?.write_all(&buffer)?;
    transaction.commit("stale copy")?;

    copy_store(&**target, &**source)?;

    assert_that(&read_all(target.get_root_file(id, DOCUMENT_FILE)?)?)
        .is_equal_to(read_all(source.get_root_file(id, DOCUMENT_FILE)?)?);

    Ok(())
}

#[rstest]
#[case::directory(Backend::Directory)]
#[cfg_attr(feature = "store-git", case::git(Backend::Git))]
fn copy_materializes_empty_documents(#[case] source_backend: Backend) -> anyhow::Result<()> {
    let source = source_backend.temp_store();
    let target = Backend::Directory.temp_store();
    let id = source.new_document_id(&CancelToken::new())?;

    assert_that(&copy_store(&**target, &**source)?).is_equal_to(1);

    let ids = target
        .document_ids()?
        .collect::<hoard_store::Result<Vec<_>>>()?;
    assert_that(&ids).is_equal_to(vec![id]);
    let directory = Backend::Directory.store_path(target.path()).join(document_name(id));
    assert_that(&directory.is_dir()).is_true();

    Ok(())
}
