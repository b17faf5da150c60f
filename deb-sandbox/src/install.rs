// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Extraction of `data.tar` entries into a virtual root. */

use {
    crate::{
        confine::{Confinement, RejectReason, VirtualRoot},
        deb::reader::{DataTarEntry, DataTarReader, EntryKind},
        error::{Result, SandboxError},
    },
    std::{
        io::Read,
        path::{Path, PathBuf},
    },
};

/// What to do with an entry that fails confinement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SandboxPolicy {
    /// Log the entry and carry on with the rest of the archive.
    #[default]
    Skip,
    /// Fail the install with [SandboxError::SandboxViolation].
    ///
    /// Entries already written are left in place.
    Abort,
}

/// The result of extracting a package payload.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstallOutcome {
    /// Resolved package name.
    pub package: String,
    /// Root-relative paths written, in archive order.
    pub files: Vec<String>,
    /// Raw names of entries refused by the sandbox.
    pub rejected: Vec<String>,
}

/// Derive a package name from a `.deb` file name.
///
/// Debian file names look like `<name>_<version>_<arch>.deb`. The portion of
/// the file stem before the first underscore is used. Names not following
/// this convention degrade to the whole stem.
pub fn package_name_from_filename(filename: &str) -> Option<String> {
    let stem = Path::new(filename).file_stem()?.to_string_lossy();
    let name = stem.split('_').next().unwrap_or_default();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Ensure a package name is usable as a single path component.
pub fn validate_package_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
    {
        Err(SandboxError::InvalidPackageName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Resolve the package name from an explicit hint or the archive file name.
pub fn resolve_package_name(hint: Option<&str>, archive_filename: Option<&str>) -> Result<String> {
    let name = match hint {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => archive_filename
            .and_then(package_name_from_filename)
            .ok_or(SandboxError::PackageNameUnresolved)?,
    };

    validate_package_name(&name)?;

    Ok(name)
}

/// Resolve a path to the form [VirtualRoot::confine()] produces, so the two
/// can be compared. Missing trailing components are kept as given.
fn comparable_path(path: &Path) -> PathBuf {
    let mut missing = vec![];
    let mut current = path;

    loop {
        if let Ok(canonical) = current.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, name| acc.join(name));
        }

        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                current = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Writes archive entries beneath a [VirtualRoot].
#[derive(Clone, Debug)]
pub struct ConfinedInstaller<'root> {
    root: &'root VirtualRoot,
    policy: SandboxPolicy,
    reserved: Vec<PathBuf>,
}

impl<'root> ConfinedInstaller<'root> {
    /// Construct a new instance bound to a root.
    pub fn new(root: &'root VirtualRoot, policy: SandboxPolicy) -> Self {
        Self {
            root,
            policy,
            reserved: vec![],
        }
    }

    /// Refuse archive entries landing on `path`.
    ///
    /// Used for state kept inside the root, such as the package database.
    /// Entries hitting a reserved path are handled like any other sandbox
    /// rejection.
    pub fn reserve_path(mut self, path: impl AsRef<Path>) -> Self {
        self.reserved.push(comparable_path(path.as_ref()));
        self
    }

    fn reject(
        &self,
        outcome: &mut InstallOutcome,
        path: String,
        reason: RejectReason,
    ) -> Result<()> {
        match self.policy {
            SandboxPolicy::Skip => {
                log::warn!("refusing to unpack {}: {}", path, reason);
                outcome.rejected.push(path);
                Ok(())
            }
            SandboxPolicy::Abort => Err(SandboxError::SandboxViolation(path)),
        }
    }

    /// Extract a package payload.
    ///
    /// The package name is resolved before anything is written. Extraction
    /// is not transactional: on error, files written so far stay on disk.
    pub fn install(
        &self,
        payload: &mut DataTarReader,
        name_hint: Option<&str>,
        archive_filename: Option<&str>,
    ) -> Result<InstallOutcome> {
        let package = resolve_package_name(name_hint, archive_filename)?;

        let mut outcome = self.install_entries(payload.entries()?)?;
        outcome.package = package;

        Ok(outcome)
    }

    /// Write a stream of entries, recording what was written.
    pub fn install_entries<'a>(
        &self,
        entries: impl Iterator<Item = Result<DataTarEntry<'a>>>,
    ) -> Result<InstallOutcome> {
        let mut outcome = InstallOutcome::default();

        for entry in entries {
            let mut entry = entry?;
            let raw_path = entry.path();
            let kind = entry.kind();

            if kind == EntryKind::Other {
                log::debug!("ignoring non-regular entry {}", raw_path);
                continue;
            }

            let confined = match self.root.confine(&raw_path)? {
                Confinement::Accepted(path) => path,
                Confinement::Rejected { path, reason } => {
                    self.reject(&mut outcome, path, reason)?;
                    continue;
                }
            };

            // The root always exists and never belongs to a package.
            if confined.is_root() {
                continue;
            }

            if self.reserved.contains(&confined.absolute) {
                self.reject(&mut outcome, raw_path, RejectReason::Reserved)?;
                continue;
            }

            match kind {
                EntryKind::Directory => {
                    create_dir_all(&confined.absolute)?;
                }
                EntryKind::RegularFile => {
                    let mut data = vec![];
                    entry
                        .read_to_end(&mut data)
                        .map_err(SandboxError::MalformedTar)?;

                    if let Some(parent) = confined.absolute.parent() {
                        create_dir_all(parent)?;
                    }

                    std::fs::write(&confined.absolute, &data).map_err(|source| {
                        SandboxError::IoPath {
                            path: confined.absolute.clone(),
                            source,
                        }
                    })?;
                }
                EntryKind::Other => continue,
            }

            log::debug!("unpacked {}", confined.relative);
            outcome.files.push(confined.relative);
        }

        Ok(outcome)
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| SandboxError::IoPath {
        path: path.to_path_buf(),
        source,
    })
}
