// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Path confinement to a virtual root.

Every filesystem mutation the engine performs goes through
[VirtualRoot::confine()] first. A path is accepted only if it resolves, with
symlinks followed, to the root itself or a descendant of it. The comparison
is done on canonical path components, never on string prefixes.
*/

use {
    crate::error::{Result, SandboxError},
    std::path::{Component, Path, PathBuf},
};

/// Why a path was refused.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectReason {
    /// `..` segments climb above the root.
    ParentTraversal,
    /// The resolved path lies outside the root (e.g. through a symlink).
    EscapesRoot,
    /// A symlink along the path could not be resolved.
    UnresolvableLink,
    /// The path holds engine state, such as the package database.
    Reserved,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ParentTraversal => "parent directory traversal",
            Self::EscapesRoot => "resolves outside the virtual root",
            Self::UnresolvableLink => "dangling symlink",
            Self::Reserved => "would overwrite package manager state",
        })
    }
}

/// A path that passed confinement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfinedPath {
    /// Where to perform I/O.
    pub absolute: PathBuf,
    /// Root-relative, `/` separated form. Empty for the root itself.
    pub relative: String,
}

impl ConfinedPath {
    /// Whether this path is the virtual root itself.
    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }
}

/// Outcome of a confinement check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Confinement {
    Accepted(ConfinedPath),
    Rejected { path: String, reason: RejectReason },
}

/// Normalize an archive member name to a root-relative path.
///
/// Leading `./` and `/` sequences are removed, so absolute names are
/// re-rooted under the virtual root.
pub fn normalize_entry_path(raw: &str) -> &str {
    let mut path = raw;

    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            break;
        }
    }

    if path == "." {
        ""
    } else {
        path
    }
}

/// A directory bounding every write performed by the engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualRoot {
    path: PathBuf,
}

impl VirtualRoot {
    /// Bind to an existing directory.
    ///
    /// The path is canonicalized so later comparisons are component exact.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        Ok(Self {
            path: path.canonicalize().map_err(|source| SandboxError::IoPath {
                path: path.to_path_buf(),
                source,
            })?,
        })
    }

    /// Bind to a directory, creating it if it doesn't exist.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref()).map_err(|source| SandboxError::IoPath {
            path: path.as_ref().to_path_buf(),
            source,
        })?;

        Self::open(path)
    }

    /// The canonical root path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check a root-relative path, following symlinks through every component.
    ///
    /// This is the check to run before writing.
    pub fn confine(&self, relative: &str) -> Result<Confinement> {
        self.resolve(relative, true)
    }

    /// Like [Self::confine()] but the final component is not dereferenced.
    ///
    /// This is the check to run before unlinking, so a symlink is removed
    /// rather than its target.
    pub fn confine_no_follow(&self, relative: &str) -> Result<Confinement> {
        self.resolve(relative, false)
    }

    fn resolve(&self, relative: &str, follow_final: bool) -> Result<Confinement> {
        let rejected = |reason: RejectReason| -> Result<Confinement> {
            Ok(Confinement::Rejected {
                path: relative.to_string(),
                reason,
            })
        };

        let normalized = normalize_entry_path(relative);

        // `..` may never climb above the root, whatever the filesystem says.
        let mut depth = 0usize;
        for component in normalized.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    depth = match depth.checked_sub(1) {
                        Some(depth) => depth,
                        None => return rejected(RejectReason::ParentTraversal),
                    };
                }
                _ => depth += 1,
            }
        }

        // Physical form, used for I/O. Components that exist are resolved
        // through the filesystem; components that don't can't be links.
        let components = Path::new(normalized).components().collect::<Vec<_>>();
        let mut current = self.path.clone();

        for (i, component) in components.iter().enumerate() {
            let is_final = i + 1 == components.len();

            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    current.pop();
                }
                Component::Normal(name) => {
                    current.push(name);

                    match std::fs::symlink_metadata(&current) {
                        Ok(metadata) => {
                            let follow = follow_final || !is_final;

                            if follow && metadata.file_type().is_symlink() {
                                match current.canonicalize() {
                                    Ok(resolved) => {
                                        current = resolved;
                                    }
                                    // Dangling or looping.
                                    Err(_) => return rejected(RejectReason::UnresolvableLink),
                                }
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                // Leading separators were stripped during normalization.
                Component::RootDir | Component::Prefix(_) => {
                    return rejected(RejectReason::EscapesRoot);
                }
            }

            if !current.starts_with(&self.path) {
                return rejected(RejectReason::EscapesRoot);
            }
        }

        // Record where the I/O lands, which differs from the lexical form
        // once a symlink was followed.
        let recorded = match current.strip_prefix(&self.path) {
            Ok(stripped) => stripped
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => return rejected(RejectReason::EscapesRoot),
        };

        Ok(Confinement::Accepted(ConfinedPath {
            absolute: current,
            relative: recorded,
        }))
    }
}
