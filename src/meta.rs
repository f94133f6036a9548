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

//! Document metadata stored in each document's `meta.xml`.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::store::{DocTransaction, META_FILE};

/// Whether a document may still be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentStatus {
    /// The document is still being captured and may be modified by its owner.
    #[default]
    Draft,

    /// The document is finished and will not change again.
    Static,
}

impl DocumentStatus {
    /// The textual form used in `meta.xml`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Static => "static",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    /// An empty status is a draft.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "" | "draft" => Ok(DocumentStatus::Draft),
            "static" => Ok(DocumentStatus::Static),
            other => Err(Error::InvalidName(other.to_string())),
        }
    }
}

impl Serialize for DocumentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DocumentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Who may see and change a document.
///
/// Only `owner` and `public` are enforced. The user and group lists are stored so they survive a
/// round trip, but nothing checks them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// The ID of the user who owns the document, or empty if nobody does.
    #[serde(rename = "Owner")]
    pub owner: String,

    /// Whether every user, including anonymous ones, may read the document.
    #[serde(rename = "Public")]
    pub public: bool,

    #[serde(rename = "ReadUsers", skip_serializing_if = "Vec::is_empty", with = "user_list")]
    pub read_users: Vec<String>,

    #[serde(rename = "ReadGroups", skip_serializing_if = "Vec::is_empty", with = "group_list")]
    pub read_groups: Vec<String>,

    #[serde(rename = "WriteUsers", skip_serializing_if = "Vec::is_empty", with = "user_list")]
    pub write_users: Vec<String>,

    #[serde(rename = "WriteGroups", skip_serializing_if = "Vec::is_empty", with = "group_list")]
    pub write_groups: Vec<String>,
}

/// The metadata of a document.
///
/// This is serialized as the `<Document>` element of `meta.xml`. Unset optional values are
/// omitted when writing. When reading, an empty element or the zero time `0001-01-01T00:00:00Z`
/// is treated as unset, and an empty `<Status>` is read as [`DocumentStatus::Draft`].
///
/// [`DocumentStatus::Draft`]: crate::meta::DocumentStatus::Draft
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename = "Document", default)]
pub struct DocumentMeta {
    #[serde(rename = "Title")]
    pub title: String,

    #[serde(rename = "Author")]
    pub author: String,

    /// The URL the document was captured from.
    #[serde(
        rename = "URL",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub url: Option<String>,

    /// The media type of `document.bin`.
    #[serde(rename = "ContentType")]
    pub content_type: String,

    /// The ID of the attachment holding the document's icon.
    #[serde(
        rename = "IconID",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub icon_id: Option<String>,

    /// The publication date of the captured content.
    #[serde(rename = "Date", skip_serializing_if = "Option::is_none", with = "rfc3339")]
    pub date: Option<DateTime<Utc>>,

    #[serde(rename = "Status")]
    pub status: DocumentStatus,

    /// When the document was captured.
    #[serde(
        rename = "CaptureDate",
        skip_serializing_if = "Option::is_none",
        with = "rfc3339"
    )]
    pub capture_date: Option<DateTime<Utc>>,

    #[serde(rename = "Permissions")]
    pub permissions: Permissions,
}

impl DocumentMeta {
    /// Mark the document as finished.
    ///
    /// This is a one-way transition; there is no way back to [`DocumentStatus::Draft`].
    ///
    /// [`DocumentStatus::Draft`]: crate::meta::DocumentStatus::Draft
    pub fn finalize(&mut self) {
        self.status = DocumentStatus::Static;
    }

    /// Return whether `user` owns the document.
    ///
    /// Anonymous users and the empty user ID own nothing.
    pub fn is_owned_by(&self, user: Option<&str>) -> bool {
        match user {
            Some(user) => !user.is_empty() && self.permissions.owner == user,
            None => false,
        }
    }

    /// Return whether `user` may read the document.
    ///
    /// `None` is an anonymous user, who can only see public documents.
    pub fn is_visible_to(&self, user: Option<&str>) -> bool {
        self.permissions.public || self.is_owned_by(user)
    }

    /// Return whether `user` may change the document.
    ///
    /// Only the owner may change a document, and only while it is a draft.
    pub fn is_mutable_by(&self, user: Option<&str>) -> bool {
        self.status == DocumentStatus::Draft && self.is_owned_by(user)
    }
}

/// Read and decode the `meta.xml` of the document open in `transaction`.
///
/// # Errors
/// - `Error::NotFound`: The document has no `meta.xml`.
/// - `Error::Deserialize`: The file is not valid metadata.
/// - `Error::Io`: An I/O error occurred.
pub fn read_meta(transaction: &dyn DocTransaction) -> Result<DocumentMeta> {
    let mut xml = String::new();
    transaction.read_root_file(META_FILE)?.read_to_string(&mut xml)?;
    quick_xml::de::from_str(&xml).map_err(Error::Deserialize)
}

/// Encode `meta` and write it as the `meta.xml` of the document open in `transaction`.
///
/// # Errors
/// - `Error::Serialize`: The metadata could not be encoded.
/// - `Error::Io`: An I/O error occurred.
pub fn write_meta(transaction: &mut dyn DocTransaction, meta: &DocumentMeta) -> Result<()> {
    let mut xml = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut xml);
    serializer.indent('\t', 1);
    meta.serialize(serializer).map_err(Error::Serialize)?;
    let xml = protect_edge_whitespace(&xml).map_err(|error| Error::Serialize(error.into()))?;

    let mut handle = transaction.write_root_file(META_FILE)?;
    handle.write_all(xml.as_bytes())?;
    handle.flush()?;
    Ok(())
}

fn non_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Rewrite the leading and trailing whitespace of every element value as character references.
///
/// The deserializer trims whitespace from raw text before unescaping it, so whitespace at the
/// edges of a value only survives a round trip when it is escaped. Whitespace between elements is
/// left alone.
fn protect_edge_whitespace(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    // Text directly inside a start tag, which is a value if the next event closes the element.
    let mut value: Option<BytesText<'_>> = None;
    let mut after_start = false;

    loop {
        let event = reader.read_event()?;
        if let (true, Event::Text(text)) = (after_start, &event) {
            value = Some(text.clone());
            after_start = false;
            continue;
        }

        match (&event, value.take()) {
            (Event::Eof, _) => break,
            (Event::End(_), Some(text)) => {
                writer.write_event(Event::Text(escape_edges(&text)?))?;
            }
            (_, Some(text)) => writer.write_event(Event::Text(text))?,
            (_, None) => {}
        }

        after_start = matches!(event, Event::Start(_));
        writer.write_event(event)?;
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn escape_edges(
    text: &BytesText<'_>,
) -> std::result::Result<BytesText<'static>, quick_xml::Error> {
    let raw = std::str::from_utf8(text)?;
    let start = raw.len() - raw.trim_start_matches(is_xml_space).len();
    let end = raw.trim_end_matches(is_xml_space).len().max(start);

    let mut escaped = String::with_capacity(raw.len() + 8);
    for c in raw[..start].chars() {
        escaped.push_str(&format!("&#{};", u32::from(c)));
    }
    escaped.push_str(&raw[start..end]);
    for c in raw[end..].chars() {
        escaped.push_str(&format!("&#{};", u32::from(c)));
    }

    Ok(BytesText::from_escaped(escaped))
}

/// Timestamps as RFC 3339 strings.
mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// The zero time `0001-01-01T00:00:00Z` as seconds since the Unix epoch.
    const ZERO_TIME: i64 = -62_135_596_800;

    pub fn serialize<S: Serializer>(
        date: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => {
                serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = String::deserialize(deserializer)?;
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        let date = DateTime::parse_from_rfc3339(value)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        Ok(if date.timestamp() == ZERO_TIME && date.timestamp_subsec_nanos() == 0 {
            None
        } else {
            Some(date)
        })
    }
}

/// User IDs, each in a `<User>` element.
mod user_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Users {
        #[serde(rename = "User", default)]
        users: Vec<String>,
    }

    pub fn serialize<S: Serializer>(users: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        Users {
            users: users.to_vec(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<String>, D::Error> {
        Ok(Users::deserialize(deserializer)?.users)
    }
}

/// Group names, each in a `<Group>` element.
mod group_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Groups {
        #[serde(rename = "Group", default)]
        groups: Vec<String>,
    }

    pub fn serialize<S: Serializer>(groups: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        Groups {
            groups: groups.to_vec(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<String>, D::Error> {
        Ok(Groups::deserialize(deserializer)?.groups)
    }
}
