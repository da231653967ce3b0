//! Byte transports used by [`crate::ArchiveStore`].
//!
//! A transport streams the body behind a URL into a writer. Keeping it behind
//! a trait lets the store stay ignorant of schemes, and lets tests count
//! transfers without a network.

use crate::error::FetchError;
use reqwest::Url;
use std::fs::File;
use std::io::{Read, Write};
use std::time::Duration;

/// Progress hook: `(bytes_so_far, total_if_known)`.
pub type ProgressFn<'a> = &'a dyn Fn(u64, Option<u64>);

const CHUNK_SIZE: usize = 64 * 1024;

/// Streams remote content into a sink.
pub trait Transport {
    /// Copy the body at `url` into `sink`, returning the byte count.
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, FetchError>;
}

/// Plain HTTP(S) GET with a streamed body. No auth, no range requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("model-cache/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(Duration::from_secs(30))
            // The whole-transfer timeout is off: archives can be hundreds of MB.
            .timeout(None)
            .build()
            .map_err(|e| FetchError::Transfer {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| FetchError::Transfer {
                url: url.to_string(),
                reason: format!("GET: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total = response.content_length();
        copy_with_progress(response, sink, total, on_progress, url)
    }
}

/// Reads `file://` URLs straight from disk (fixtures, pre-seeded mirrors).
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, FetchError> {
        let path = url.to_file_path().map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local file path".into(),
        })?;
        let file = File::open(&path).map_err(|source| FetchError::Io {
            path: path.clone(),
            source,
        })?;
        let total = file.metadata().ok().map(|m| m.len());
        copy_with_progress(file, sink, total, on_progress, url)
    }
}

/// Dispatches on the URL scheme: `http`/`https` or `file`.
#[derive(Debug, Clone)]
pub struct DefaultTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl DefaultTransport {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpTransport::new()?,
            file: FileTransport,
        })
    }
}

impl Transport for DefaultTransport {
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, FetchError> {
        match url.scheme() {
            "http" | "https" => self.http.fetch(url, sink, on_progress),
            "file" => self.file.fetch(url, sink, on_progress),
            other => Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
                scheme: other.to_string(),
            }),
        }
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, FetchError> {
        (**self).fetch(url, sink, on_progress)
    }
}

/// Copies in 64 KiB chunks, reporting progress after each one.
fn copy_with_progress(
    mut source: impl Read,
    sink: &mut dyn Write,
    total: Option<u64>,
    on_progress: Option<ProgressFn<'_>>,
    url: &Url,
) -> Result<u64, FetchError> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                sink.write_all(&chunk[..n])
                    .map_err(|e| FetchError::Transfer {
                        url: url.to_string(),
                        reason: format!("write error: {e}"),
                    })?;
                copied += n as u64;
                if let Some(cb) = on_progress {
                    cb(copied, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FetchError::Transfer {
                    url: url.to_string(),
                    reason: format!("read error: {e}"),
                });
            }
        }
    }

    sink.flush().map_err(|e| FetchError::Transfer {
        url: url.to_string(),
        reason: format!("flush error: {e}"),
    })?;

    Ok(copied)
}
