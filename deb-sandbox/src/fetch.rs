// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Retrieval of `.deb` files by URL. */

use {
    crate::error::{Result, SandboxError},
    url::Url,
};

/// Downloads package archives.
///
/// Implementations fully buffer the response. There is no streaming, retry,
/// or integrity verification.
pub trait DebFetcher {
    /// Fetch the content at `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Obtain an HTTP client.
///
/// `reqwest` picks up `http_proxy`, `https_proxy` and `no_proxy` from the
/// environment on its own.
#[cfg(feature = "http")]
fn http_client() -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("deb-sandbox/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// A [DebFetcher] speaking `http`, `https` and `file` URLs.
#[derive(Clone, Copy, Debug, Default)]
pub struct UrlFetcher;

impl UrlFetcher {
    #[cfg(feature = "http")]
    fn fetch_http(&self, url: &Url) -> Result<Vec<u8>> {
        let network = |source| SandboxError::Network {
            url: url.to_string(),
            source,
        };

        let client = http_client().map_err(network)?;
        let response = client
            .get(url.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(network)?;

        Ok(response.bytes().map_err(network)?.to_vec())
    }

    #[cfg(not(feature = "http"))]
    fn fetch_http(&self, url: &Url) -> Result<Vec<u8>> {
        Err(SandboxError::UnsupportedUrlScheme(url.scheme().to_string()))
    }

    fn fetch_file(&self, url: &Url) -> Result<Vec<u8>> {
        let download = |source| SandboxError::FileDownload {
            url: url.to_string(),
            source,
        };

        let path = url.to_file_path().map_err(|_| {
            download(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "file URL does not name a local path",
            ))
        })?;

        std::fs::read(path).map_err(download)
    }
}

impl DebFetcher for UrlFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = Url::parse(url)?;

        log::info!("Get: {}", url);

        match url.scheme() {
            "http" | "https" => self.fetch_http(&url),
            "file" => self.fetch_file(&url),
            scheme => Err(SandboxError::UnsupportedUrlScheme(scheme.to_string())),
        }
    }
}
