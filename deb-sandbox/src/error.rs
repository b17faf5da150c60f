// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {crate::deb::PayloadCodec, std::path::PathBuf, thiserror::Error};

/// Why a package name could not be mapped to a download URL.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LookupFailure {
    /// The lookup file has no entry for the package.
    UnknownPackage,
    /// The entry exists but lacks a `url` key.
    MissingUrl,
}

impl std::fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPackage => f.write_str("unable to locate package"),
            Self::MissingUrl => f.write_str("package entry has no url"),
        }
    }
}

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("not an ar archive (bad magic)")]
    Format,

    #[error("corrupt ar archive at offset {offset}: {reason}")]
    CorruptArchive { offset: usize, reason: &'static str },

    #[error("no data.tar.* member in .deb")]
    MissingDataTar,

    #[error("error decompressing {codec:?} payload: {source}")]
    Decompression {
        codec: PayloadCodec,
        source: std::io::Error,
    },

    #[error("malformed tar payload: {0}")]
    MalformedTar(std::io::Error),

    #[error("archive entry escapes the virtual root: {0}")]
    SandboxViolation(String),

    #[error("{reason}: {package}")]
    RegistryLookup {
        package: String,
        reason: LookupFailure,
    },

    #[cfg(feature = "http")]
    #[error("download error for {url}: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error("download error for {url}: {source}")]
    FileDownload {
        url: String,
        source: std::io::Error,
    },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedUrlScheme(String),

    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("cannot derive a package name: no name hint and no archive file name")]
    PackageNameUnresolved,

    #[error("invalid package name: {0:?}")]
    InvalidPackageName(String),

    #[error("error persisting {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    IoPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, SandboxError>;
