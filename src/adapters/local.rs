use crate::{
    Config, ContentStream, DirectoryAttributes, Error, FileAttributes, Filesystem, Result,
    StorageAttributes, Visibility,
};
use futures::stream::{self, BoxStream};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::AsyncWriteExt;

/// A local filesystem backend.
///
/// - Paths are *relative* to a configured root directory (e.g. `"foo/bar.txt"`).
/// - Absolute paths and `..` components are rejected to prevent escaping the root.
/// - On unix, visibility maps to permission bits: files `0o644`/`0o600`,
///   directories `0o755`/`0o700`. Elsewhere everything reads back as public.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStorage")
            .field("root", &self.root)
            .finish()
    }
}

/// Map an I/O error onto the storage taxonomy, naming `path`.
fn map_io(path: &str, e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
        std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_string()),
        std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_string()),
        // A file sits where a directory is needed, or the other way round.
        std::io::ErrorKind::NotADirectory | std::io::ErrorKind::IsADirectory => {
            Error::AlreadyExists(path.to_string())
        }
        _ => Error::Io(e),
    }
}

fn modified_secs(md: &std::fs::Metadata) -> Option<u64> {
    md.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

#[cfg(unix)]
fn visibility_of(md: &std::fs::Metadata) -> Visibility {
    use std::os::unix::fs::PermissionsExt;
    if md.permissions().mode() & 0o004 != 0 {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

#[cfg(not(unix))]
fn visibility_of(_md: &std::fs::Metadata) -> Visibility {
    Visibility::Public
}

#[cfg(unix)]
async fn apply_visibility(path: &Path, visibility: Visibility, is_dir: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = match (visibility, is_dir) {
        (Visibility::Public, false) => 0o644,
        (Visibility::Private, false) => 0o600,
        (Visibility::Public, true) => 0o755,
        (Visibility::Private, true) => 0o700,
    };
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn apply_visibility(
    _path: &Path,
    _visibility: Visibility,
    _is_dir: bool,
) -> std::io::Result<()> {
    Ok(())
}

impl LocalStorage {
    /// Create a new local storage rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Return the configured root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_path(path: &str) -> Result<()> {
        let p = Path::new(path);

        if p.is_absolute() {
            return Err(Error::PermissionDenied(format!(
                "absolute paths are not allowed: {path}"
            )));
        }

        // Disallow traversal and tricky prefixes.
        for c in p.components() {
            match c {
                Component::ParentDir => {
                    return Err(Error::PermissionDenied(format!(
                        "parent dir components ('..') are not allowed: {path}"
                    )));
                }
                Component::Prefix(_) => {
                    // Windows drive prefixes like C:\
                    return Err(Error::PermissionDenied(format!(
                        "path prefixes are not allowed: {path}"
                    )));
                }
                Component::RootDir => {
                    return Err(Error::PermissionDenied(format!(
                        "root dir component is not allowed: {path}"
                    )));
                }
                Component::CurDir | Component::Normal(_) => {}
            }
        }

        Ok(())
    }

    /// Absolute location of `path`; the empty path is the root itself.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let path = path.trim_end_matches('/');
        Self::validate_path(path)?;
        Ok(self.root.join(path))
    }

    fn relative_path(&self, p: &Path) -> Result<String> {
        let rel = p
            .strip_prefix(&self.root)
            .map_err(|e| Error::Generic(format!("failed to relativize path: {e}")))?;

        let s = rel
            .to_str()
            .ok_or_else(|| Error::Generic("non-utf8 path under root".into()))?
            .replace('\\', "/");

        Ok(s)
    }

    /// Create the parents of `full` and make sure no directory occupies it.
    async fn prepare_file_slot(path: &str, full: &Path) -> Result<()> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(path, e))?;
        }
        match tokio::fs::metadata(full).await {
            Ok(md) if md.is_dir() => Err(Error::AlreadyExists(format!(
                "a directory exists at '{path}'"
            ))),
            _ => Ok(()),
        }
    }

    async fn stat(&self, path: &str) -> Result<FileAttributes> {
        let full = self.full_path(path)?;
        let md = tokio::fs::metadata(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        if !md.is_file() {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(Self::file_attributes(path.trim_end_matches('/'), &md))
    }

    fn file_attributes(path: &str, md: &std::fs::Metadata) -> FileAttributes {
        let mut attributes = FileAttributes::new(path)
            .with_file_size(md.len())
            .with_visibility(visibility_of(md))
            .with_mime_type(
                mime_guess::from_path(path)
                    .first_raw()
                    .unwrap_or("application/octet-stream"),
            );
        attributes.last_modified = modified_secs(md);
        attributes
    }

    fn directory_attributes(path: String, md: &std::fs::Metadata) -> DirectoryAttributes {
        DirectoryAttributes {
            path,
            visibility: Some(visibility_of(md)),
            last_modified: modified_secs(md),
        }
    }

    async fn list_entries(&self, base: PathBuf, deep: bool) -> Result<Vec<StorageAttributes>> {
        // If the base doesn't exist, return empty list.
        let md = match tokio::fs::metadata(&base).await {
            Ok(md) => md,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        if !md.is_dir() {
            return Ok(vec![]);
        }

        let mut out: Vec<StorageAttributes> = Vec::new();
        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let mut rd = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = rd.next_entry().await? {
                let path = entry.path();
                let name = self.relative_path(&path)?;
                // Leftovers of an interrupted write are not part of the namespace.
                if name.ends_with(TEMP_SUFFIX) {
                    continue;
                }
                let md = entry.metadata().await?;
                if md.is_dir() {
                    out.push(Self::directory_attributes(name, &md).into());
                    if deep {
                        stack.push(path);
                    }
                } else if md.is_file() {
                    out.push(Self::file_attributes(&name, &md).into());
                }
            }
        }

        out.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(out)
    }

    /// Stream `input` into a temp file, then rename into place.
    async fn write_from<R>(&self, path: &str, input: &mut R, config: &Config) -> Result<()>
    where
        R: tokio::io::AsyncRead + Send + Unpin + ?Sized,
    {
        let full = self.full_path(path)?;
        let visibility = config.visibility()?.unwrap_or_default();
        Self::prepare_file_slot(path, &full).await?;

        // Write to a temp file then rename into place for a more atomic update.
        let mut tmp_path = full.clone().into_os_string();
        tmp_path.push(TEMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_path);

        let result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            tokio::io::copy(input, &mut file).await?;
            file.flush().await?;
            drop(file);

            apply_visibility(&tmp_path, visibility, false).await?;
            tokio::fs::rename(&tmp_path, &full).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                tracing::debug!(path, error = %cleanup, "Failed to remove temp file");
            }
            return Err(map_io(path, e));
        }
        Ok(())
    }
}

const TEMP_SUFFIX: &str = ".tmp.replicate";

impl Filesystem for LocalStorage {
    async fn file_exists(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path)?;
        match tokio::fs::metadata(full).await {
            Ok(md) => Ok(md.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path)?;
        match tokio::fs::metadata(full).await {
            Ok(md) => Ok(md.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<()> {
        let mut reader = contents;
        self.write_from(path, &mut reader, config).await
    }

    async fn write_stream(
        &self,
        path: &str,
        contents: &mut ContentStream,
        config: &Config,
    ) -> Result<()> {
        self.write_from(path, contents, config).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path)?;
        tokio::fs::read(&full).await.map_err(|e| map_io(path, e))
    }

    async fn read_stream(&self, path: &str) -> Result<ContentStream> {
        let full = self.full_path(path)?;
        let file = tokio::fs::File::open(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        Ok(ContentStream::seekable(file))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path)?;
        match tokio::fs::remove_file(full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let full = self.full_path(path)?;
        if full == self.root {
            return Err(Error::PermissionDenied(
                "refusing to delete the storage root".to_string(),
            ));
        }
        match tokio::fs::remove_dir_all(full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_directory(&self, path: &str, config: &Config) -> Result<()> {
        let full = self.full_path(path)?;
        let visibility = config.directory_visibility()?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        if let Some(visibility) = visibility {
            apply_visibility(&full, visibility, true).await?;
        }
        Ok(())
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let full = self.full_path(path)?;
        let md = tokio::fs::metadata(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        apply_visibility(&full, visibility, md.is_dir())
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn visibility(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path).await
    }

    async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path).await
    }

    async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path).await
    }

    async fn file_size(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path).await
    }

    async fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> Result<BoxStream<'_, Result<StorageAttributes>>> {
        let base = self.full_path(path)?;

        // Eagerly list then stream results.
        let entries = self.list_entries(base, deep).await?;
        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }

    async fn move_file(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        let from = self.full_path(source)?;
        let to = self.full_path(destination)?;
        let visibility = config.visibility()?;

        if !tokio::fs::metadata(&from)
            .await
            .map_err(|e| map_io(source, e))?
            .is_file()
        {
            return Err(Error::NotFound(source.to_string()));
        }
        Self::prepare_file_slot(destination, &to).await?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| map_io(source, e))?;

        if let Some(visibility) = visibility {
            apply_visibility(&to, visibility, false).await?;
        }
        Ok(())
    }

    async fn copy(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        let from = self.full_path(source)?;
        let to = self.full_path(destination)?;
        let visibility = config.visibility()?;

        if !tokio::fs::metadata(&from)
            .await
            .map_err(|e| map_io(source, e))?
            .is_file()
        {
            return Err(Error::NotFound(source.to_string()));
        }
        Self::prepare_file_slot(destination, &to).await?;
        tokio::fs::copy(&from, &to)
            .await
            .map_err(|e| map_io(source, e))?;

        if let Some(visibility) = visibility {
            apply_visibility(&to, visibility, false).await?;
        }
        Ok(())
    }
}
