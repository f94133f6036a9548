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

use chrono::{TimeZone, Utc};

use hoard_store::meta::{read_meta, write_meta, DocumentMeta, DocumentStatus};
use hoard_store::store::{DirectoryStore, DocStore, META_FILE};
use hoard_store::{CancelToken, Error};

use common::*;

mod common;

#[rstest]
#[case::directory(Backend::Directory)]
#[cfg_attr(feature = "store-git", case::git(Backend::Git))]
fn metadata_survives_a_commit(#[case] backend: Backend) -> anyhow::Result<()> {
    let store = backend.temp_store();
    let id = store.new_document_id(&CancelToken::new())?;

    let mut expected = test_meta("Example Domain", "alice", true);
    expected.url = Some(String::from("https://example.com/"));
    expected.capture_date = Some(Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap());
    expected.permissions.read_groups = vec![String::from("staff")];
    expected.finalize();

    let mut transaction = store.get_document(id)?;
    write_meta(transaction.as_mut(), &expected)?;
    transaction.commit("write metadata")?;

    let transaction = store.get_document(id)?;
    let actual = read_meta(transaction.as_ref())?;
    transaction.rollback()?;

    assert_that(&actual).is_equal_to(&expected);
    assert_that(&actual.status).is_equal_to(DocumentStatus::Static);

    Ok(())
}

#[rstest]
#[case::directory(Backend::Directory)]
#[cfg_attr(feature = "store-git", case::git(Backend::Git))]
fn metadata_values_survive_exactly(#[case] backend: Backend) -> anyhow::Result<()> {
    let store = backend.temp_store();
    let id = store.new_document_id(&CancelToken::new())?;

    let mut expected = test_meta("  Spaced <title> & more\t", " alice ", false);
    expected.author = String::from("\nMultiline\nauthor\n");
    expected.url = Some(String::from(" https://example.com/?a=1&b=2 "));
    expected.content_type = String::from("text/html; charset=utf-8 ");
    expected.icon_id = Some(String::from("\tt7e2d9c3e82"));
    expected.date = Some(Utc.timestamp_opt(1_622_550_600, 123_456_789).unwrap());
    expected.capture_date = Some(Utc.timestamp_opt(1_622_550_601, 1).unwrap());
    expected.permissions.read_users = vec![String::from(" bob"), String::from("carol ")];
    expected.permissions.read_groups = vec![String::from("staff & friends")];
    expected.permissions.write_users = vec![String::from("  ")];
    expected.permissions.write_groups = vec![String::from("<editors>"), String::from("admins")];

    let mut transaction = store.get_document(id)?;
    write_meta(transaction.as_mut(), &expected)?;
    transaction.commit("write metadata")?;

    let transaction = store.get_document(id)?;
    let actual = read_meta(transaction.as_ref())?;
    transaction.rollback()?;

    assert_that(&actual).is_equal_to(&expected);

    Ok(())
}

#[rstest]
fn written_metadata_is_indented_xml(
    directory_store: WithTempDir<DirectoryStore>,
) -> anyhow::Result<()> {
    let id = directory_store.new_document_id(&CancelToken::new())?;

    let mut transaction = directory_store.get_document(id)?;
    write_meta(transaction.as_mut(), &test_meta("Example", "alice", false))?;
    let xml = String::from_utf8(read_all(transaction.read_root_file(META_FILE)?)?)?;
    transaction.rollback()?;

    assert_that(&xml.starts_with("<Document>")).is_true();
    assert_that(&xml.contains("\n\t<Title>Example</Title>")).is_true();
    assert_that(&xml.contains("\n\t\t<Owner>alice</Owner>")).is_true();

    Ok(())
}

#[rstest]
fn missing_metadata_is_not_found(
    directory_store: WithTempDir<DirectoryStore>,
) -> anyhow::Result<()> {
    let id = directory_store.new_document_id(&CancelToken::new())?;
    let transaction = directory_store.get_document(id)?;
    assert_that(&read_meta(transaction.as_ref())).is_err_variant(Error::NotFound);
    transaction.rollback()?;
    Ok(())
}

#[rstest]
fn malformed_metadata_fails_to_decode(
    directory_store: WithTempDir<DirectoryStore>,
) -> anyhow::Result<()> {
    let id = directory_store.new_document_id(&CancelToken::new())?;
    let mut transaction = directory_store.get_document(id)?;
    transaction
        .write_root_file(META_FILE)?
        .write_all(b"<Document><Status>archived</Status></Document>")?;

    let result = read_meta(transaction.as_ref());
    assert_that(&result.is_err()).is_true();
    assert_that(&matches!(result, Err(Error::Deserialize(_)))).is_true();
    transaction.rollback()?;

    Ok(())
}

#[rstest]
fn default_metadata_is_a_private_draft() {
    let meta = DocumentMeta::default();
    assert_that(&meta.status).is_equal_to(DocumentStatus::Draft);
    assert_that(&meta.is_visible_to(None)).is_false();
}
