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

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{DocumentCache, NaiveCache};
use crate::error::{Error, Result};
use crate::store::{DirectoryConfig, DocStore, OpenStore, DEFAULT_DIRECTORY};

/// A function which opens a document store at a location.
pub type StoreFactory = Box<dyn Fn(&str) -> Result<Box<dyn DocStore>> + Send + Sync>;

/// A function which creates a document cache over a store.
pub type CacheFactory =
    Box<dyn Fn(&str, Arc<dyn DocStore>) -> Result<Box<dyn DocumentCache>> + Send + Sync>;

/// A parsed `scheme:location` string.
///
/// The string is split at the first `:`. A string without a `:` has an empty scheme and is
/// entirely location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreDescriptor {
    scheme: String,
    location: String,
}

impl StoreDescriptor {
    /// Return a descriptor with the given `scheme` and `location`.
    pub fn new(scheme: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            location: location.into(),
        }
    }

    /// The scheme, which selects a backend.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The backend-specific location.
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl FromStr for StoreDescriptor {
    type Err = Infallible;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let (scheme, location) = value.split_once(':').unwrap_or(("", value));
        Ok(Self::new(scheme, location))
    }
}

impl fmt::Display for StoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.location)
    }
}

/// A set of named backends for opening stores and caches from descriptors.
///
/// # Examples
/// ```no_run
/// use hoard_store::Registry;
///
/// let registry = Registry::with_defaults();
/// let store = registry.open_store("fs:/var/lib/hoard")?;
/// for id in store.document_ids()? {
///     println!("{}", id?);
/// }
/// # Ok::<(), hoard_store::Error>(())
/// ```
pub struct Registry {
    stores: HashMap<String, StoreFactory>,
    caches: HashMap<String, CacheFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stores: Vec<_> = self.stores.keys().collect();
        stores.sort();
        let mut caches: Vec<_> = self.caches.keys().collect();
        caches.sort();
        f.debug_struct("Registry")
            .field("stores", &stores)
            .field("caches", &caches)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Return a registry with no backends.
    pub fn new() -> Self {
        Self {
            stores: HashMap::new(),
            caches: HashMap::new(),
        }
    }

    /// Return a registry with every backend this crate provides.
    ///
    /// Scheme | Backend | Default location
    /// --- | --- | ---
    /// `fs` or empty | [`DirectoryStore`] | `doc`
    /// `git` | [`GitStore`] | `doc.git`
    ///
    /// The [`NaiveCache`] is registered as the `naive` cache and as the empty cache scheme.
    ///
    /// [`DirectoryStore`]: crate::store::DirectoryStore
    /// [`GitStore`]: crate::store::GitStore
    /// [`NaiveCache`]: crate::cache::NaiveCache
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        for scheme in ["", "fs"] {
            registry.register_store(scheme, |location| {
                let path = if location.is_empty() {
                    DEFAULT_DIRECTORY
                } else {
                    location
                };
                Ok(Box::new(DirectoryConfig::new(path).open()?))
            });
        }

        #[cfg(feature = "store-git")]
        registry.register_store("git", |location| {
            use crate::store::{GitConfig, DEFAULT_REPOSITORY};

            let path = if location.is_empty() {
                DEFAULT_REPOSITORY
            } else {
                location
            };
            Ok(Box::new(GitConfig::new(path).open()?))
        });

        for scheme in ["", "naive"] {
            registry.register_cache(scheme, |_, store| Ok(Box::new(NaiveCache::new(store))));
        }

        registry
    }

    /// Register `factory` for opening stores with the given `scheme`.
    ///
    /// This replaces any factory already registered for `scheme`.
    pub fn register_store<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn(&str) -> Result<Box<dyn DocStore>> + Send + Sync + 'static,
    {
        self.stores.insert(scheme.to_string(), Box::new(factory));
    }

    /// Register `factory` for creating caches with the given `scheme`.
    ///
    /// This replaces any factory already registered for `scheme`.
    pub fn register_cache<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn(&str, Arc<dyn DocStore>) -> Result<Box<dyn DocumentCache>> + Send + Sync + 'static,
    {
        self.caches.insert(scheme.to_string(), Box::new(factory));
    }

    /// Open the store named by `descriptor`.
    ///
    /// # Errors
    /// - `Error::UnsupportedScheme`: No store is registered for the descriptor's scheme.
    /// - Any error returned by the backend while opening the store.
    pub fn open_store(&self, descriptor: &str) -> Result<Box<dyn DocStore>> {
        let descriptor: StoreDescriptor = descriptor.parse().unwrap_or_else(|never| match never {});
        let factory = self
            .stores
            .get(descriptor.scheme())
            .ok_or_else(|| Error::UnsupportedScheme(descriptor.scheme().to_string()))?;
        debug!(scheme = descriptor.scheme(), location = descriptor.location(), "Opening store.");
        factory(descriptor.location())
    }

    /// Create the cache named by `descriptor` over `store`.
    ///
    /// # Errors
    /// - `Error::UnsupportedScheme`: No cache is registered for the descriptor's scheme.
    pub fn open_cache(
        &self,
        descriptor: &str,
        store: Arc<dyn DocStore>,
    ) -> Result<Box<dyn DocumentCache>> {
        let descriptor: StoreDescriptor = descriptor.parse().unwrap_or_else(|never| match never {});
        let factory = self
            .caches
            .get(descriptor.scheme())
            .ok_or_else(|| Error::UnsupportedScheme(descriptor.scheme().to_string()))?;
        factory(descriptor.location(), store)
    }

    /// Return the schemes stores can be opened with, sorted.
    pub fn store_schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<_> = self.stores.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}
