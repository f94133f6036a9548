/*
 * Copyright 2019-2020 Wren Powell
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

use crate::store::DocStore;

/// A value which can be used to open a `DocStore`.
pub trait OpenStore {
    /// The type of `DocStore` which this value can be used to open.
    type Store: DocStore + 'static;

    /// Open or create a document store of type `Store`.
    ///
    /// This opens the document store, creating it if it does not already exist.
    ///
    /// # Errors
    /// - `Error::UnsupportedStore`: The location exists but does not contain a document store of
    /// this type.
    /// - `Error::Store`: An error occurred with the storage backend.
    /// - `Error::Io`: An I/O error occurred.
    fn open(&self) -> crate::Result<Self::Store>;
}
