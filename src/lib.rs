//! Dual-write storage.
//!
//! [`ReplicateStorage`] wraps a *source* and a *replica* backend behind one
//! [`Filesystem`] surface. Every mutation is applied to the source first and
//! then mirrored onto the replica; reads, existence checks, listings and
//! attribute lookups are served by the source alone.
//!
//! ```
//! # #[cfg(feature = "memory")]
//! # async fn example() -> replicate::Result<()> {
//! use replicate::{Config, Filesystem, FilesystemExt, MemoryStorage, ReplicateStorage};
//!
//! let storage = ReplicateStorage::new(MemoryStorage::new(), MemoryStorage::new());
//!
//! storage.write("notes/today.txt", b"hello", &Config::new()).await?;
//!
//! assert_eq!(storage.read_to_string("notes/today.txt").await?, "hello");
//! assert!(storage.replica().file_exists("notes/today.txt").await?);
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::stream::BoxStream;

mod attributes;
mod config;
pub mod stream;

pub use adapters::replicate::ReplicateStorage;
pub use attributes::{DirectoryAttributes, FileAttributes, StorageAttributes};
pub use config::{Config, Visibility};
pub use stream::ContentStream;

#[cfg(feature = "local")]
pub use adapters::local::LocalStorage;
#[cfg(feature = "memory")]
pub use adapters::memory::MemoryStorage;

/// A specialized Result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A unified Error type for storage operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid visibility: {0}")]
    InvalidVisibility(String),

    #[error("IO Error")]
    Io(#[from] std::io::Error),

    #[error("Generic storage error: {0}")]
    Generic(String),
}

/// Backend modules, gated behind Cargo features.
pub mod adapters {
    #[cfg(feature = "local")]
    pub mod local;
    #[cfg(feature = "memory")]
    pub mod memory;
    pub mod replicate;
}

/// The storage backend contract.
///
/// Paths are plain `/`-separated strings. Implementations decide how to map
/// them onto their own namespace; [`ReplicateStorage`] forwards them untouched.
///
/// Stat accessors ([`file_size`](Self::file_size), [`mime_type`](Self::mime_type),
/// [`last_modified`](Self::last_modified), [`visibility`](Self::visibility))
/// return a [`FileAttributes`] record that carries at least the requested field.
pub trait Filesystem: Send + Sync + Debug {
    /// Check if a file exists.
    fn file_exists(&self, path: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Check if a directory exists, explicitly created or implied by its contents.
    fn directory_exists(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Write `contents` to `path`, replacing anything already there.
    fn write(
        &self,
        path: &str,
        contents: &[u8],
        config: &Config,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a stream to `path`. The stream is consumed from its current position.
    fn write_stream(
        &self,
        path: &str,
        contents: &mut ContentStream,
        config: &Config,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Read a whole file into memory.
    fn read(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;

    /// Open a file for streaming reads.
    fn read_stream(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<ContentStream>> + Send;

    /// Delete a file. Deleting a missing file is backend policy; the bundled
    /// backends treat it as a no-op.
    fn delete(&self, path: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete a directory and everything beneath it.
    fn delete_directory(&self, path: &str)
    -> impl std::future::Future<Output = Result<()>> + Send;

    /// Create a directory, including missing parents.
    fn create_directory(
        &self,
        path: &str,
        config: &Config,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Change the visibility of a file.
    fn set_visibility(
        &self,
        path: &str,
        visibility: Visibility,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn visibility(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<FileAttributes>> + Send;

    fn mime_type(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<FileAttributes>> + Send;

    fn last_modified(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<FileAttributes>> + Send;

    fn file_size(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<FileAttributes>> + Send;

    /// List the entries under `path`. Only direct children unless `deep`.
    fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> impl std::future::Future<Output = Result<BoxStream<'_, Result<StorageAttributes>>>> + Send;

    /// Move a file, replacing the destination if present.
    fn move_file(
        &self,
        source: &str,
        destination: &str,
        config: &Config,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Copy a file, replacing the destination if present.
    fn copy(
        &self,
        source: &str,
        destination: &str,
        config: &Config,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

macro_rules! forward_filesystem {
    ($ty:ty) => {
        impl<T: Filesystem> Filesystem for $ty {
            async fn file_exists(&self, path: &str) -> Result<bool> {
                (**self).file_exists(path).await
            }

            async fn directory_exists(&self, path: &str) -> Result<bool> {
                (**self).directory_exists(path).await
            }

            async fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<()> {
                (**self).write(path, contents, config).await
            }

            async fn write_stream(
                &self,
                path: &str,
                contents: &mut ContentStream,
                config: &Config,
            ) -> Result<()> {
                (**self).write_stream(path, contents, config).await
            }

            async fn read(&self, path: &str) -> Result<Vec<u8>> {
                (**self).read(path).await
            }

            async fn read_stream(&self, path: &str) -> Result<ContentStream> {
                (**self).read_stream(path).await
            }

            async fn delete(&self, path: &str) -> Result<()> {
                (**self).delete(path).await
            }

            async fn delete_directory(&self, path: &str) -> Result<()> {
                (**self).delete_directory(path).await
            }

            async fn create_directory(&self, path: &str, config: &Config) -> Result<()> {
                (**self).create_directory(path, config).await
            }

            async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
                (**self).set_visibility(path, visibility).await
            }

            async fn visibility(&self, path: &str) -> Result<FileAttributes> {
                (**self).visibility(path).await
            }

            async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
                (**self).mime_type(path).await
            }

            async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
                (**self).last_modified(path).await
            }

            async fn file_size(&self, path: &str) -> Result<FileAttributes> {
                (**self).file_size(path).await
            }

            async fn list_contents(
                &self,
                path: &str,
                deep: bool,
            ) -> Result<BoxStream<'_, Result<StorageAttributes>>> {
                (**self).list_contents(path, deep).await
            }

            async fn move_file(
                &self,
                source: &str,
                destination: &str,
                config: &Config,
            ) -> Result<()> {
                (**self).move_file(source, destination, config).await
            }

            async fn copy(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
                (**self).copy(source, destination, config).await
            }
        }
    };
}

// Backends are usually injected by reference or shared handle.
forward_filesystem!(&T);
forward_filesystem!(Arc<T>);

/// Convenience methods built on [`Filesystem`].
pub trait FilesystemExt: Filesystem {
    /// Read a file as a UTF-8 string.
    fn read_to_string(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send {
        async move {
            let bytes = self.read(path).await?;
            String::from_utf8(bytes).map_err(|e| Error::Generic(format!("invalid utf-8: {e}")))
        }
    }

    /// Write a string with the default config.
    fn write_str(
        &self,
        path: &str,
        contents: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        async move { self.write(path, contents.as_bytes(), &Config::default()).await }
    }

    /// Collect the paths of a listing.
    fn list_paths(
        &self,
        path: &str,
        deep: bool,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send {
        async move {
            let mut entries = self.list_contents(path, deep).await?;
            let mut paths = Vec::new();
            while let Some(entry) = entries.next().await {
                paths.push(entry?.path().to_string());
            }
            Ok(paths)
        }
    }
}

impl<T: Filesystem + ?Sized> FilesystemExt for T {}
