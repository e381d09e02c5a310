//! Shipping the finished archive to the cache backend.
//!
//! Two destinations are supported:
//!
//! - `file:///path/to/archive.tar`: the archive is copied, creating missing
//!   parent directories. Used by local and test backends.
//! - `http(s)://...`: the cache API. A POST with `{"file_size_in_bytes": N}`
//!   returns `{"upload_url": "..."}`, then the raw archive is PUT to that URL
//!   with an explicit `Content-Length`. A failed PUT is retried once.
//!
//! URLs appearing in errors and logs have credentials and query values
//! redacted, since upload URLs are usually pre-signed.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use bytesize::ByteSize;
use serde::Deserialize;

const URL_REDACTION: &str = "<redacted>";

/// Scheme prefix of local destinations.
pub const FILE_SCHEME: &str = "file://";

/// Tunables of the HTTP upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Timeout of the upload URL request
    pub timeout: Duration,
    /// Delay before the single retry of a failed PUT
    pub retry_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// Errors that can occur while uploading.
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    /// The archive or the local destination could not be accessed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The request could not be sent.
    #[error("Request to {url} failed: {message}")]
    Transport {
        /// Redacted URL
        url: String,
        /// Transport error description
        message: String,
    },

    /// The server answered with an unexpected status.
    #[error("{url} responded with status {status}")]
    Status {
        /// Redacted URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The upload URL response could not be decoded.
    #[error("Invalid response from {url}: {source}")]
    InvalidResponse {
        /// Redacted URL
        url: String,
        /// The underlying decode error
        #[source]
        source: io::Error,
    },

    /// The cache API accepted the request but returned no upload URL.
    #[error("{url} did not return an upload URL")]
    MissingUploadUrl {
        /// Redacted URL
        url: String,
    },
}

/// A place an archive can be uploaded to.
pub trait CacheStore {
    /// Upload the archive at `archive` to `url`.
    ///
    /// # Errors
    ///
    /// Any failure that survives the store's retry policy.
    fn upload(&self, archive: &Path, url: &str) -> Result<(), UploadError>;
}

/// Copies the archive to a `file://` destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl CacheStore for LocalStore {
    fn upload(&self, archive: &Path, url: &str) -> Result<(), UploadError> {
        let dest = PathBuf::from(url.strip_prefix(FILE_SCHEME).unwrap_or(url));

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| UploadError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let copied = fs::copy(archive, &dest).map_err(|source| UploadError::Io {
            path: dest.clone(),
            source,
        })?;
        log::debug!("Copied {} bytes to {}", copied, dest.display());
        Ok(())
    }
}

#[derive(Deserialize)]
struct UploadUrlResponse {
    #[serde(default)]
    upload_url: String,
}

/// Uploads through the two-step cache API protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpStore {
    options: UploadOptions,
}

impl HttpStore {
    /// Store with the given tunables.
    #[must_use]
    pub fn new(options: UploadOptions) -> Self {
        Self { options }
    }

    /// Ask the cache API for a URL to PUT `size` bytes to.
    fn request_upload_url(&self, api_url: &str, size: u64) -> Result<String, UploadError> {
        let safe_url = redact_url(api_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(self.options.timeout)
            .build();

        let response = agent
            .post(api_url)
            .send_json(serde_json::json!({ "file_size_in_bytes": size }))
            .map_err(|err| map_ureq_error(err, &safe_url))?;

        if !(200..=202).contains(&response.status()) {
            return Err(UploadError::Status {
                url: safe_url,
                status: response.status(),
            });
        }

        let body: UploadUrlResponse =
            response
                .into_json()
                .map_err(|source| UploadError::InvalidResponse {
                    url: safe_url.clone(),
                    source,
                })?;

        if body.upload_url.is_empty() {
            return Err(UploadError::MissingUploadUrl { url: safe_url });
        }
        Ok(body.upload_url)
    }

    /// PUT the archive once.
    fn put_archive(&self, upload_url: &str, archive: &Path) -> Result<(), UploadError> {
        let io_err = |source| UploadError::Io {
            path: archive.to_path_buf(),
            source,
        };
        let safe_url = redact_url(upload_url);

        let file = File::open(archive).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();

        let response = ureq::AgentBuilder::new()
            .build()
            .put(upload_url)
            .set("Content-Length", &size.to_string())
            .send(file)
            .map_err(|err| map_ureq_error(err, &safe_url))?;

        if response.status() != 200 {
            return Err(UploadError::Status {
                url: safe_url,
                status: response.status(),
            });
        }
        Ok(())
    }
}

impl CacheStore for HttpStore {
    fn upload(&self, archive: &Path, url: &str) -> Result<(), UploadError> {
        let size = fs::metadata(archive)
            .map_err(|source| UploadError::Io {
                path: archive.to_path_buf(),
                source,
            })?
            .len();
        log::debug!("Requesting upload URL for {}", ByteSize::b(size));

        let upload_url = self.request_upload_url(url, size)?;

        if let Err(e) = self.put_archive(&upload_url, archive) {
            log::warn!("First upload attempt failed, retrying: {}", e);
            thread::sleep(self.options.retry_delay);
            return self.put_archive(&upload_url, archive);
        }
        Ok(())
    }
}

fn map_ureq_error(err: ureq::Error, safe_url: &str) -> UploadError {
    match err {
        ureq::Error::Status(status, _response) => UploadError::Status {
            url: safe_url.to_string(),
            status,
        },
        // Transport's Display embeds the raw URL
        ureq::Error::Transport(transport) => UploadError::Transport {
            url: safe_url.to_string(),
            message: match transport.message() {
                Some(detail) => format!("{}: {}", transport.kind(), detail),
                None => transport.kind().to_string(),
            },
        },
    }
}

/// Pick the store for `url`: `file://` is local, anything else goes to the API.
#[must_use]
pub fn store_for_url(url: &str, options: UploadOptions) -> Box<dyn CacheStore> {
    if url.starts_with(FILE_SCHEME) {
        Box::new(LocalStore)
    } else {
        Box::new(HttpStore::new(options))
    }
}

/// Upload `archive` to `url` with the matching store.
///
/// # Errors
///
/// See [`UploadError`].
pub fn upload_archive(archive: &Path, url: &str, options: UploadOptions) -> Result<(), UploadError> {
    store_for_url(url, options).upload(archive, url)
}

/// Strip credentials and query values from `url`.
#[must_use]
pub fn redact_url(url: &str) -> String {
    let Some(scheme_idx) = url.find("://") else {
        return url.to_owned();
    };

    let (scheme, rest) = url.split_at(scheme_idx + 3);
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    let authority = match authority.rfind('@') {
        Some(at) => format!("{URL_REDACTION}@{}", &authority[at + 1..]),
        None => authority.to_owned(),
    };

    let tail = tail.split('#').next().unwrap_or_default();
    let tail = match tail.split_once('?') {
        Some((path, query)) => {
            let query = query
                .split('&')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let key = part.split_once('=').map_or(part, |(key, _)| key);
                    format!("{key}={URL_REDACTION}")
                })
                .collect::<Vec<_>>()
                .join("&");
            format!("{path}?{query}")
        }
        None => tail.to_owned(),
    };

    format!("{scheme}{authority}{tail}")
}
