use std::fs::File;
use std::future::Future;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture};
use thiserror::Error;

/// Where a model comes from: a location resolved by the fetcher, or a file the
/// user handed over (drag and drop, file picker).
#[derive(Debug, Clone)]
pub enum ModelSource {
    Url(String),
    File(FileHandle),
}

impl ModelSource {
    pub fn url(location: impl Into<String>) -> Self {
        ModelSource::Url(location.into())
    }

    /// The name the format is taken from.
    pub fn name(&self) -> &str {
        match self {
            ModelSource::Url(location) => location,
            ModelSource::File(file) => &file.name,
        }
    }

    /// Directory that relative references inside the model resolve against.
    pub fn base_path(&self) -> Option<PathBuf> {
        let path = match self {
            ModelSource::Url(location) => PathBuf::from(local_path(location).ok()?),
            ModelSource::File(FileHandle {
                data: FileData::Path(path),
                ..
            }) => path.clone(),
            ModelSource::File(_) => return None,
        };
        path.parent().map(Path::to_path_buf)
    }
}

#[derive(Debug, Clone)]
pub enum FileData {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

/// A user supplied file. The size is what the host declared, which is what the
/// size limit is checked against before anything is read.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    pub data: FileData,
}

impl FileHandle {
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<FileHandle> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(FileHandle {
            name,
            size,
            data: FileData::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> FileHandle {
        let bytes = bytes.into();
        FileHandle {
            name: name.into(),
            size: bytes.len() as u64,
            data: FileData::Bytes(bytes),
        }
    }

    pub async fn read(
        &self,
        chunk_size: usize,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<Vec<u8>, FetchError> {
        match &self.data {
            FileData::Bytes(bytes) => {
                progress(bytes.len() as u64, Some(bytes.len() as u64));
                Ok(bytes.to_vec())
            }
            FileData::Path(path) => read_chunked(path, &self.name, chunk_size, progress).await,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("security error: permission denied reading {0}")]
    PermissionDenied(String),

    #[error("no fetcher handles the scheme of {0}")]
    UnsupportedScheme(String),

    #[error("failed to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn from_io(location: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(location.to_string()),
            io::ErrorKind::PermissionDenied => FetchError::PermissionDenied(location.to_string()),
            _ => FetchError::Io {
                location: location.to_string(),
                source,
            },
        }
    }
}

/// Retrieves the bytes behind a location. Progress is reported as
/// `(bytes_loaded, bytes_total)`, the total being unknown for streamed transfers.
pub trait AssetFetcher {
    fn fetch<'a>(
        &'a self,
        location: &'a str,
        progress: &'a mut dyn FnMut(u64, Option<u64>),
    ) -> LocalBoxFuture<'a, Result<Vec<u8>, FetchError>>;
}

/// Plain paths and `file://` URLs.
pub struct FileSystemFetcher {
    pub chunk_size: usize,
}

impl FileSystemFetcher {
    pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;
}

impl Default for FileSystemFetcher {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl AssetFetcher for FileSystemFetcher {
    fn fetch<'a>(
        &'a self,
        location: &'a str,
        progress: &'a mut dyn FnMut(u64, Option<u64>),
    ) -> LocalBoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async move {
            let path = local_path(location)?;
            read_chunked(Path::new(path), location, self.chunk_size, progress).await
        }
        .boxed_local()
    }
}

fn local_path(location: &str) -> Result<&str, FetchError> {
    if let Some(path) = location.strip_prefix("file://") {
        return Ok(path);
    }
    if location.contains("://") {
        return Err(FetchError::UnsupportedScheme(location.to_string()));
    }
    Ok(location)
}

async fn read_chunked(
    path: &Path,
    location: &str,
    chunk_size: usize,
    progress: &mut dyn FnMut(u64, Option<u64>),
) -> Result<Vec<u8>, FetchError> {
    let mut file = File::open(path).map_err(|err| FetchError::from_io(location, err))?;
    let total = file.metadata().ok().map(|metadata| metadata.len());

    let mut bytes = Vec::with_capacity(total.unwrap_or_default() as usize);
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        let read = file
            .read(&mut chunk)
            .map_err(|err| FetchError::from_io(location, err))?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
        progress(bytes.len() as u64, total);

        // Lets the host render frames while a large file is read
        yield_now().await;
    }

    Ok(bytes)
}

/// Turns byte counts into whole percentages that never go down.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    /// Returns a percentage only when it is known and larger than the last one.
    pub fn update(&mut self, loaded: u64, total: Option<u64>) -> Option<u8> {
        let total = total.filter(|total| *total > 0)?;
        let percent = ((loaded.min(total) as f64 / total as f64) * 100.0).floor() as u8;

        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}

pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::io::Write;

    #[test]
    fn test_progress_is_monotonic_and_skips_unknown_totals() {
        let mut tracker = ProgressTracker::default();
        assert_eq!(tracker.update(10, None), None);
        assert_eq!(tracker.update(0, Some(200)), Some(0));
        assert_eq!(tracker.update(50, Some(200)), Some(25));
        assert_eq!(tracker.update(50, Some(200)), None);
        assert_eq!(tracker.update(40, Some(200)), None);
        assert_eq!(tracker.update(400, Some(200)), Some(100));
        assert_eq!(tracker.update(10, Some(0)), None);
    }

    #[test]
    fn test_file_system_fetch_in_chunks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 1000]).unwrap();
        let location = file.path().to_string_lossy().into_owned();

        let fetcher = FileSystemFetcher { chunk_size: 300 };
        let mut reports = Vec::new();
        let bytes = block_on(fetcher.fetch(&location, &mut |loaded, total| {
            reports.push((loaded, total))
        }))
        .unwrap();

        assert_eq!(bytes.len(), 1000);
        assert_eq!(
            reports,
            vec![
                (300, Some(1000)),
                (600, Some(1000)),
                (900, Some(1000)),
                (1000, Some(1000))
            ]
        );
    }

    #[test]
    fn test_file_url_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"o part").unwrap();
        let url = format!("file://{}", file.path().display());

        let fetcher = FileSystemFetcher::default();
        let bytes = block_on(fetcher.fetch(&url, &mut |_, _| {})).unwrap();
        assert_eq!(bytes, b"o part");

        let missing = block_on(fetcher.fetch("/definitely/not/here.glb", &mut |_, _| {}));
        match missing {
            Err(err @ FetchError::NotFound(_)) => assert!(err.to_string().contains("not found")),
            other => panic!("unexpected result {:?}", other.map(|bytes| bytes.len())),
        }

        let remote = block_on(fetcher.fetch("https://example.com/a.glb", &mut |_, _| {}));
        assert!(matches!(remote, Err(FetchError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_file_handle_from_bytes() {
        let handle = FileHandle::from_bytes("Cube.OBJ", b"v 0 0 0".to_vec());
        assert_eq!(handle.size, 7);
        let source = ModelSource::File(handle);
        assert_eq!(source.name(), "Cube.OBJ");
        assert_eq!(source.base_path(), None);
    }
}
