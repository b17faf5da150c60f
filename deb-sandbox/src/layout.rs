// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem layout of a virtual root. */

use {
    crate::{
        error::{Result, SandboxError},
        install::validate_package_name,
    },
    std::path::{Path, PathBuf},
};

/// Directories created by [SandboxLayout::init()], relative to the root.
pub const STANDARD_DIRECTORIES: &[&str] = &[
    "usr/bin",
    "usr/lib",
    "usr/share",
    "etc",
    "var/log",
    "var/tmp",
    "var/cache/downloads",
    "bin",
    "tmp",
    "home",
];

const EMPTY_LOOKUP: &[u8] = b"{\n  \"packages\": {}\n}";
const EMPTY_DATABASE: &[u8] = b"{\n  \"installed\": {}\n}";

/// Every path the engine touches.
///
/// All paths default to locations beneath the root and can be overridden.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SandboxLayout {
    root: PathBuf,
    database: PathBuf,
    lookup: PathBuf,
    staging: PathBuf,
}

impl SandboxLayout {
    /// Construct the default layout for a root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();

        Self {
            database: root.join(".packages.json"),
            lookup: root.join("etc").join("apt_registry.json"),
            staging: root.join("var").join("tmp"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the package database.
    pub fn database_path(&self) -> &Path {
        &self.database
    }

    /// Path of the registry lookup file.
    pub fn lookup_path(&self) -> &Path {
        &self.lookup
    }

    /// Directory downloaded archives are written to.
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Where a downloaded archive for `package` is staged.
    ///
    /// Names that aren't a single path component are refused.
    pub fn staged_archive_path(&self, package: &str) -> Result<PathBuf> {
        validate_package_name(package)?;

        Ok(self.staging.join(format!("{}.deb", package)))
    }

    pub fn set_database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database = path.as_ref().to_path_buf();
        self
    }

    pub fn set_lookup_path(mut self, path: impl AsRef<Path>) -> Self {
        self.lookup = path.as_ref().to_path_buf();
        self
    }

    pub fn set_staging_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.staging = path.as_ref().to_path_buf();
        self
    }

    /// Create the standard directory tree and empty metadata files.
    ///
    /// Existing directories and files are left alone.
    pub fn init(&self) -> Result<()> {
        create_dir_all(&self.root)?;

        for dir in STANDARD_DIRECTORIES {
            create_dir_all(&self.root.join(dir))?;
        }
        create_dir_all(&self.staging)?;

        write_if_absent(&self.lookup, EMPTY_LOOKUP)?;
        write_if_absent(&self.database, EMPTY_DATABASE)?;

        log::info!("initialized virtual root at {}", self.root.display());

        Ok(())
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| SandboxError::IoPath {
        path: path.to_path_buf(),
        source,
    })
}

fn write_if_absent(path: &Path, data: &[u8]) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    std::fs::write(path, data).map_err(|source| SandboxError::Persistence {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{lookup::JsonRegistryLookup, registry::PackageRegistry},
        tempfile::TempDir,
    };

    #[test]
    fn test_default_paths() -> Result<()> {
        let layout = SandboxLayout::new("/srv/LinuxFS");

        assert_eq!(layout.root(), Path::new("/srv/LinuxFS"));
        assert_eq!(
            layout.database_path(),
            Path::new("/srv/LinuxFS/.packages.json")
        );
        assert_eq!(
            layout.lookup_path(),
            Path::new("/srv/LinuxFS/etc/apt_registry.json")
        );
        assert_eq!(
            layout.staged_archive_path("cowsay")?,
            Path::new("/srv/LinuxFS/var/tmp/cowsay.deb")
        );

        let layout = layout
            .set_database_path("/state/db.json")
            .set_lookup_path("/state/lookup.json")
            .set_staging_dir("/state/downloads");
        assert_eq!(layout.database_path(), Path::new("/state/db.json"));
        assert_eq!(layout.lookup_path(), Path::new("/state/lookup.json"));
        assert_eq!(
            layout.staged_archive_path("cowsay")?,
            Path::new("/state/downloads/cowsay.deb")
        );

        for name in ["", ".", "..", "../../escaped", "a/b", "a\\b"] {
            assert!(matches!(
                layout.staged_archive_path(name),
                Err(SandboxError::InvalidPackageName(n)) if n == name
            ));
        }

        Ok(())
    }

    #[test]
    fn test_init() -> Result<()> {
        let td = TempDir::new()?;
        let layout = SandboxLayout::new(td.path().join("LinuxFS"));

        layout.init()?;

        for dir in STANDARD_DIRECTORIES {
            assert!(layout.root().join(dir).is_dir(), "{} missing", dir);
        }

        let lookup = JsonRegistryLookup::from_path(layout.lookup_path())?;
        assert_eq!(lookup.packages().count(), 0);
        let registry = PackageRegistry::load(layout.database_path())?;
        assert_eq!(registry.packages().count(), 0);

        Ok(())
    }

    #[test]
    fn test_init_preserves_existing() -> Result<()> {
        let td = TempDir::new()?;
        let layout = SandboxLayout::new(td.path());

        std::fs::create_dir_all(td.path().join("etc"))?;
        let lookup = br#"{"packages": {"cowsay": {"url": "http://x/cowsay.deb"}}}"#;
        std::fs::write(layout.lookup_path(), lookup)?;

        layout.init()?;
        layout.init()?;

        assert_eq!(std::fs::read(layout.lookup_path())?, lookup);

        Ok(())
    }
}
