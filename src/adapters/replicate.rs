use crate::stream::{reopen, try_rewind};
use crate::{
    Config, ContentStream, FileAttributes, Filesystem, Result, StorageAttributes, Visibility,
};
use futures::stream::BoxStream;

/// Mirrors every mutation from a source backend onto a replica.
///
/// Mutations run against the source first and, only once it succeeds, against
/// the replica with the same arguments. Reads, existence checks, listings and
/// attribute lookups are served by the source alone; the replica is a backup
/// target, never consulted for data.
///
/// There is no rollback. If the replica fails after the source succeeded, the
/// replica's error is returned unchanged and the two backends may have
/// diverged. Use [`source`](Self::source) and [`replica`](Self::replica) to
/// reconcile them by hand.
///
/// `delete` only touches the replica when the replica reports the file exists.
///
/// ```
/// # use replicate::{Config, Filesystem, MemoryStorage, ReplicateStorage};
/// # async fn example() -> replicate::Result<()> {
/// let source = MemoryStorage::new();
/// let replica = MemoryStorage::new();
/// let storage = ReplicateStorage::new(&source, &replica);
///
/// storage.write("a.txt", b"data", &Config::new()).await?;
/// assert_eq!(replica.read("a.txt").await?, b"data");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReplicateStorage<S, R>
where
    S: Filesystem,
    R: Filesystem,
{
    source: S,
    replica: R,
}

impl<S, R> ReplicateStorage<S, R>
where
    S: Filesystem,
    R: Filesystem,
{
    /// Create replicated storage over a source and a replica backend.
    pub fn new(source: S, replica: R) -> Self {
        Self { source, replica }
    }

    /// Get a reference to the source backend.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a reference to the replica backend.
    pub fn replica(&self) -> &R {
        &self.replica
    }

    /// Unwrap and return `(source, replica)`.
    pub fn into_inner(self) -> (S, R) {
        (self.source, self.replica)
    }
}

/// Log a replica failure that follows a successful source mutation.
fn replica_result<T>(operation: &'static str, path: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::warn!(operation, path, error = ?e, "Replica failed after source succeeded");
    }
    result
}

impl<S, R> Filesystem for ReplicateStorage<S, R>
where
    S: Filesystem,
    R: Filesystem,
{
    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.source.file_exists(path).await
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        self.source.directory_exists(path).await
    }

    async fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<()> {
        self.source.write(path, contents, config).await?;
        tracing::debug!(path, "Replicating write");
        replica_result(
            "write",
            path,
            self.replica.write(path, contents, config).await,
        )
    }

    async fn write_stream(
        &self,
        path: &str,
        contents: &mut ContentStream,
        config: &Config,
    ) -> Result<()> {
        self.source.write_stream(path, contents, config).await?;

        let result = if try_rewind(contents).await {
            tracing::debug!(path, "Replicating rewound stream");
            self.replica.write_stream(path, contents, config).await
        } else {
            tracing::debug!(path, "Stream not rewindable, re-reading from source");
            let mut reopened = reopen(&self.source, path).await?;
            self.replica.write_stream(path, &mut reopened, config).await
        };
        replica_result("write_stream", path, result)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.source.read(path).await
    }

    async fn read_stream(&self, path: &str) -> Result<ContentStream> {
        self.source.read_stream(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.source.delete(path).await?;

        let on_replica = replica_result("delete", path, self.replica.file_exists(path).await)?;
        if on_replica {
            tracing::debug!(path, "Replicating delete");
            replica_result("delete", path, self.replica.delete(path).await)
        } else {
            tracing::debug!(path, "Replica has no such file, skipping delete");
            Ok(())
        }
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        self.source.delete_directory(path).await?;
        tracing::debug!(path, "Replicating delete_directory");
        replica_result(
            "delete_directory",
            path,
            self.replica.delete_directory(path).await,
        )
    }

    async fn create_directory(&self, path: &str, config: &Config) -> Result<()> {
        self.source.create_directory(path, config).await?;
        tracing::debug!(path, "Replicating create_directory");
        replica_result(
            "create_directory",
            path,
            self.replica.create_directory(path, config).await,
        )
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.source.set_visibility(path, visibility).await?;
        tracing::debug!(path, %visibility, "Replicating set_visibility");
        replica_result(
            "set_visibility",
            path,
            self.replica.set_visibility(path, visibility).await,
        )
    }

    async fn visibility(&self, path: &str) -> Result<FileAttributes> {
        self.source.visibility(path).await
    }

    async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        self.source.mime_type(path).await
    }

    async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        self.source.last_modified(path).await
    }

    async fn file_size(&self, path: &str) -> Result<FileAttributes> {
        self.source.file_size(path).await
    }

    async fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> Result<BoxStream<'_, Result<StorageAttributes>>> {
        self.source.list_contents(path, deep).await
    }

    async fn move_file(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        self.source.move_file(source, destination, config).await?;
        tracing::debug!(source, destination, "Replicating move");
        replica_result(
            "move_file",
            source,
            self.replica.move_file(source, destination, config).await,
        )
    }

    async fn copy(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        self.source.copy(source, destination, config).await?;
        tracing::debug!(source, destination, "Replicating copy");
        replica_result(
            "copy",
            source,
            self.replica.copy(source, destination, config).await,
        )
    }
}
