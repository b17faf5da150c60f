// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Install and remove entry points.

[SandboxEngine] ties together archive extraction, path confinement and the
package database for a single virtual root.
*/

use {
    crate::{
        confine::VirtualRoot,
        deb::reader::DataTarReader,
        error::{Result, SandboxError},
        fetch::DebFetcher,
        install::{validate_package_name, ConfinedInstaller, InstallOutcome, SandboxPolicy},
        layout::SandboxLayout,
        lookup::RegistryLookup,
        registry::{PackageRegistry, RemovalOutcome},
    },
    std::path::Path,
};

/// Tunables for a [SandboxEngine].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    /// How entries escaping the root are handled.
    pub sandbox_policy: SandboxPolicy,
    /// Whether downloaded archives stay in the staging directory.
    pub keep_downloads: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sandbox_policy: SandboxPolicy::default(),
            keep_downloads: true,
        }
    }
}

/// Installs `.deb` payloads into a virtual root and tracks what they own.
#[derive(Debug)]
pub struct SandboxEngine {
    layout: SandboxLayout,
    root: VirtualRoot,
    registry: PackageRegistry,
    config: EngineConfig,
}

impl SandboxEngine {
    /// Open the engine for a layout.
    ///
    /// The root directory is created if missing. The package database is
    /// loaded but not written.
    pub fn open(layout: SandboxLayout, config: EngineConfig) -> Result<Self> {
        let root = VirtualRoot::create(layout.root())?;
        let registry = PackageRegistry::load(layout.database_path())?;

        Ok(Self {
            layout,
            root,
            registry,
            config,
        })
    }

    pub fn layout(&self) -> &SandboxLayout {
        &self.layout
    }

    pub fn root(&self) -> &VirtualRoot {
        &self.root
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install a `.deb` held in memory.
    ///
    /// The package name is `name_hint` if given, else derived from
    /// `archive_filename`. Written paths are appended to the package's
    /// manifest and the database is persisted.
    pub fn install_from_bytes(
        &mut self,
        data: &[u8],
        name_hint: Option<&str>,
        archive_filename: Option<&str>,
    ) -> Result<InstallOutcome> {
        self.install_payload(data, name_hint, archive_filename, None)
    }

    fn install_payload(
        &mut self,
        data: &[u8],
        name_hint: Option<&str>,
        archive_filename: Option<&str>,
        staged: Option<&Path>,
    ) -> Result<InstallOutcome> {
        let mut payload = DataTarReader::from_deb_data(data)?;
        log::debug!(
            "reading payload from {} ({:?})",
            payload.member_name(),
            payload.codec()
        );

        let mut installer = ConfinedInstaller::new(&self.root, self.config.sandbox_policy)
            .reserve_path(self.layout.database_path())
            .reserve_path(self.layout.lookup_path());
        if let Some(staged) = staged {
            installer = installer.reserve_path(staged);
        }

        let outcome = installer.install(&mut payload, name_hint, archive_filename)?;

        if !self.registry.is_installed(&outcome.package) {
            log::info!(
                "Selecting previously unselected package {}.",
                outcome.package
            );
        }
        log::info!("Unpacking {} ...", outcome.package);

        self.registry
            .install(&outcome.package, outcome.files.iter().cloned())?;

        log::info!(
            "Setting up {} ({} paths, {} rejected) ...",
            outcome.package,
            outcome.files.len(),
            outcome.rejected.len()
        );

        Ok(outcome)
    }

    /// Install a `.deb` from the filesystem.
    pub fn install_from_file(
        &mut self,
        path: impl AsRef<Path>,
        name_hint: Option<&str>,
    ) -> Result<InstallOutcome> {
        let path = path.as_ref();

        let data = std::fs::read(path).map_err(|source| SandboxError::IoPath {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path.file_name().and_then(|s| s.to_str());

        self.install_from_bytes(&data, name_hint, filename)
    }

    /// Resolve a package by name, download it and install it.
    ///
    /// The name is validated and looked up before anything is downloaded
    /// or written. The download is staged in the layout's staging directory
    /// and can't be overwritten by the package's own content.
    pub fn install_from_registry(
        &mut self,
        lookup: &dyn RegistryLookup,
        fetcher: &dyn DebFetcher,
        name: &str,
    ) -> Result<InstallOutcome> {
        validate_package_name(name)?;

        let url = lookup.url(name)?;
        let data = fetcher.fetch(&url)?;

        let staged = self.layout.staged_archive_path(name)?;
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SandboxError::IoPath {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&staged, &data).map_err(|source| SandboxError::IoPath {
            path: staged.clone(),
            source,
        })?;
        log::debug!("staged {} at {}", url, staged.display());

        let filename = staged.file_name().and_then(|s| s.to_str());
        let res = self.install_payload(&data, Some(name), filename, Some(&staged));

        if !self.config.keep_downloads {
            if let Err(e) = std::fs::remove_file(&staged) {
                log::warn!("unable to remove {}: {}", staged.display(), e);
            }
        }

        res
    }

    /// Remove an installed package.
    ///
    /// Removing a package that isn't installed logs a warning and returns
    /// [RemovalOutcome::NotInstalled].
    pub fn remove(&mut self, name: &str) -> Result<RemovalOutcome> {
        if self.registry.is_installed(name) {
            log::info!("Removing {} ...", name);
        }

        let outcome = self.registry.remove(name, &self.root)?;

        if let RemovalOutcome::Removed(report) = &outcome {
            for retained in &report.retained {
                log::warn!(
                    "dpkg: warning: while removing {}, unable to remove {}: {}",
                    name,
                    retained.path,
                    retained.reason
                );
            }
            log::info!("Removed {}.", name);
        }

        Ok(outcome)
    }

    /// Names of installed packages, sorted.
    pub fn installed_packages(&self) -> impl Iterator<Item = &str> {
        self.registry.packages()
    }

    /// Files recorded for an installed package.
    pub fn package_files(&self, name: &str) -> Option<&[String]> {
        self.registry.files(name)
    }
}
