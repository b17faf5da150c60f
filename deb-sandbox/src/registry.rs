// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installed package bookkeeping.

The package database is a JSON document of the form

```json
{"installed": {"<name>": {"files": ["<relpath>", ...]}}}
```

Every mutation rewrites the whole document. There is no locking: two
processes operating on the same database will lose updates.
*/

use {
    crate::{
        confine::{Confinement, VirtualRoot},
        error::{Result, SandboxError},
    },
    serde::{Deserialize, Serialize},
    std::{
        cmp::Reverse,
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

/// Manifest of a single installed package.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstalledPackage {
    /// Root-relative paths in extraction order. May contain duplicates.
    #[serde(default)]
    pub files: Vec<String>,
}

/// The serialized form of the package database.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PackageDatabase {
    #[serde(default)]
    pub installed: BTreeMap<String, InstalledPackage>,
}

/// A manifest path left behind by a removal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetainedPath {
    pub path: String,
    pub reason: String,
}

/// What happened to each manifest path during removal.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemovalReport {
    /// Paths deleted, in deletion order.
    pub removed: Vec<String>,
    /// Paths that were already gone.
    pub missing: Vec<String>,
    /// Paths that could not be deleted. Non-empty directories still used by
    /// other packages end up here.
    pub retained: Vec<RetainedPath>,
}

/// Result of [PackageRegistry::remove()].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemovalOutcome {
    /// The package had no manifest. Nothing was touched.
    NotInstalled,
    /// The manifest was processed and dropped.
    Removed(RemovalReport),
}

/// Number of separators in a manifest path. Deeper paths are removed first.
fn path_depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Persistent mapping of package name to installed files.
#[derive(Clone, Debug)]
pub struct PackageRegistry {
    path: PathBuf,
    db: PackageDatabase,
}

impl PackageRegistry {
    /// Load the database at `path`.
    ///
    /// A missing file yields an empty registry. Nothing is written until
    /// the first mutation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let db = match std::fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PackageDatabase::default(),
            Err(source) => return Err(SandboxError::Persistence { path, source }),
        };

        Ok(Self { path, db })
    }

    /// Path of the backing store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory database.
    pub fn database(&self) -> &PackageDatabase {
        &self.db
    }

    /// Names of installed packages, sorted.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.db.installed.keys().map(|k| k.as_str())
    }

    /// Whether a package has a manifest.
    pub fn is_installed(&self, name: &str) -> bool {
        self.db.installed.contains_key(name)
    }

    /// Files recorded for a package.
    pub fn files(&self, name: &str) -> Option<&[String]> {
        self.db.installed.get(name).map(|p| p.files.as_slice())
    }

    /// Record files as belonging to a package and persist.
    ///
    /// Paths are appended to any existing manifest. Reinstalling a package
    /// therefore accumulates duplicate entries.
    ///
    /// The in-memory database only changes once the write succeeded.
    pub fn install(&mut self, name: &str, paths: impl IntoIterator<Item = String>) -> Result<()> {
        let mut db = self.db.clone();
        db.installed
            .entry(name.to_string())
            .or_default()
            .files
            .extend(paths);

        self.write(&db)?;
        self.db = db;

        Ok(())
    }

    /// Delete a package's files from `root` and drop its manifest.
    ///
    /// Paths are processed deepest first. Files are unlinked and directories
    /// are removed only if empty. Failures to delete are reported, not
    /// raised: a directory shared with another package simply survives.
    /// The manifest is dropped regardless of how many deletions failed.
    pub fn remove(&mut self, name: &str, root: &VirtualRoot) -> Result<RemovalOutcome> {
        let package = match self.db.installed.get(name) {
            Some(package) => package,
            None => {
                log::warn!("dpkg: warning: {} is not installed", name);
                return Ok(RemovalOutcome::NotInstalled);
            }
        };

        let mut paths = package.files.iter().collect::<Vec<_>>();
        // Stable, so siblings keep manifest order.
        paths.sort_by_key(|p| Reverse(path_depth(p)));

        let mut report = RemovalReport::default();

        for rel in paths {
            remove_path(root, rel, &mut report);
        }

        let mut db = self.db.clone();
        db.installed.remove(name);
        self.write(&db)?;
        self.db = db;

        Ok(RemovalOutcome::Removed(report))
    }

    /// Serialize the database and overwrite the backing store.
    pub fn flush(&self) -> Result<()> {
        self.write(&self.db)
    }

    fn write(&self, db: &PackageDatabase) -> Result<()> {
        let data = serde_json::to_vec_pretty(db)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.persistence_error(e))?;
            }
        }

        std::fs::write(&self.path, data).map_err(|e| self.persistence_error(e))
    }

    fn persistence_error(&self, source: std::io::Error) -> SandboxError {
        SandboxError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}

fn remove_path(root: &VirtualRoot, rel: &str, report: &mut RemovalReport) {
    let retain = |report: &mut RemovalReport, reason: String| {
        log::debug!("leaving {} in place: {}", rel, reason);
        report.retained.push(RetainedPath {
            path: rel.to_string(),
            reason,
        });
    };

    let confined = match root.confine_no_follow(rel) {
        Ok(Confinement::Accepted(path)) if !path.is_root() => path,
        Ok(Confinement::Accepted(_)) => {
            retain(report, "refusing to remove the virtual root".to_string());
            return;
        }
        Ok(Confinement::Rejected { reason, .. }) => {
            retain(report, reason.to_string());
            return;
        }
        Err(e) => {
            retain(report, e.to_string());
            return;
        }
    };

    let res = match std::fs::symlink_metadata(&confined.absolute) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir(&confined.absolute),
        Ok(_) => std::fs::remove_file(&confined.absolute),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            report.missing.push(rel.to_string());
            return;
        }
        Err(e) => Err(e),
    };

    match res {
        Ok(()) => report.removed.push(rel.to_string()),
        Err(e) => retain(report, e.to_string()),
    }
}
