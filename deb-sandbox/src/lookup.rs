// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package name to download URL resolution.

The lookup table is owned by someone else. We only read it. Its format is

```json
{"packages": {"<name>": {"url": "<string>"}}}
```
*/

use {
    crate::error::{LookupFailure, Result, SandboxError},
    serde::Deserialize,
    std::{collections::BTreeMap, path::Path},
};

/// Resolves package names to `.deb` URLs.
pub trait RegistryLookup {
    /// Obtain the download URL for a package.
    ///
    /// Fails with [SandboxError::RegistryLookup] if the package is unknown or
    /// has no URL.
    fn url(&self, package: &str) -> Result<String>;
}

/// A [RegistryLookup] backed by a JSON document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JsonRegistryLookup {
    #[serde(default)]
    packages: BTreeMap<String, serde_json::Value>,
}

impl JsonRegistryLookup {
    /// Parse a lookup document.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Read a lookup document from a file.
    ///
    /// A missing file behaves like an empty table.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match std::fs::read(path) {
            Ok(data) => Self::from_slice(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(SandboxError::Persistence {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Names of packages in the table.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(|k| k.as_str())
    }
}

impl RegistryLookup for JsonRegistryLookup {
    fn url(&self, package: &str) -> Result<String> {
        let failure = |reason| SandboxError::RegistryLookup {
            package: package.to_string(),
            reason,
        };

        let entry = self
            .packages
            .get(package)
            .ok_or_else(|| failure(LookupFailure::UnknownPackage))?;

        entry
            .get("url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| failure(LookupFailure::MissingUrl))
    }
}
