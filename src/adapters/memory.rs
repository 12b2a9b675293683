use crate::{
    Config, ContentStream, DirectoryAttributes, Error, FileAttributes, Filesystem, Result,
    StorageAttributes, Visibility,
};
use futures::stream::{self, BoxStream};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// A simple in-memory [`Filesystem`] backend.
///
/// - Files are kept as raw bytes with their visibility and modification time.
/// - Directories exist explicitly (via `create_directory`) or implicitly
///   whenever a file lives beneath them.
/// - Clones share the same contents.
///
/// Intended for tests, local development, and ephemeral usage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, MemoryFile>,
    directories: BTreeMap<String, MemoryDirectory>,
}

#[derive(Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    visibility: Visibility,
    last_modified: u64,
}

#[derive(Clone, Copy)]
struct MemoryDirectory {
    visibility: Visibility,
    last_modified: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Strip surrounding slashes and `.` segments; reject `..`.
fn normalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(Error::PermissionDenied(format!(
                    "parent dir components ('..') are not allowed: {path}"
                )));
            }
            part => parts.push(part),
        }
    }
    Ok(parts.join("/"))
}

/// Listing prefix for a normalized directory path.
fn dir_prefix(dir: &str) -> String {
    if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    }
}

fn guess_mime(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

impl MemoryFile {
    fn attributes(&self, path: &str) -> FileAttributes {
        FileAttributes::new(path)
            .with_file_size(self.contents.len() as u64)
            .with_visibility(self.visibility)
            .with_last_modified(self.last_modified)
            .with_mime_type(guess_mime(path))
    }
}

impl MemoryDirectory {
    fn attributes(&self, path: &str) -> DirectoryAttributes {
        DirectoryAttributes {
            path: path.to_string(),
            visibility: Some(self.visibility),
            last_modified: Some(self.last_modified),
        }
    }
}

impl Inner {
    fn file(&self, path: &str) -> Result<&MemoryFile> {
        self.files
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn has_directory(&self, dir: &str) -> bool {
        if dir.is_empty() || self.directories.contains_key(dir) {
            return true;
        }
        let prefix = dir_prefix(dir);
        self.files.keys().any(|p| p.starts_with(&prefix))
            || self.directories.keys().any(|p| p.starts_with(&prefix))
    }

    /// First proper ancestor of `path` that is stored as a file.
    fn file_ancestor<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.match_indices('/')
            .map(|(i, _)| &path[..i])
            .find(|ancestor| self.files.contains_key(*ancestor))
    }

    /// Fails unless a file may be stored at `path`.
    fn check_file_slot(&self, path: &str) -> Result<()> {
        if self.has_directory(path) {
            return Err(Error::AlreadyExists(format!(
                "a directory exists at '{path}'"
            )));
        }
        if let Some(ancestor) = self.file_ancestor(path) {
            return Err(Error::AlreadyExists(format!("a file exists at '{ancestor}'")));
        }
        Ok(())
    }

    fn insert_file(&mut self, path: String, file: MemoryFile) -> Result<()> {
        self.check_file_slot(&path)?;
        self.files.insert(path, file);
        Ok(())
    }

    fn directory_attributes(&self, dir: &str) -> DirectoryAttributes {
        match self.directories.get(dir) {
            Some(entry) => entry.attributes(dir),
            None => DirectoryAttributes::new(dir),
        }
    }
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored files.
    pub fn len(&self) -> usize {
        self.inner.read().expect("poisoned lock").files.len()
    }

    /// Returns true if there are no stored files.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every file and directory.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("poisoned lock");
        inner.files.clear();
        inner.directories.clear();
    }

    fn store(&self, path: &str, contents: Vec<u8>, config: &Config) -> Result<()> {
        let path = normalize(path)?;
        let visibility = config.visibility()?.unwrap_or_default();
        let file = MemoryFile {
            contents,
            visibility,
            last_modified: now(),
        };
        self.inner
            .write()
            .expect("poisoned lock")
            .insert_file(path, file)
    }

    fn stat(&self, path: &str) -> Result<FileAttributes> {
        let path = normalize(path)?;
        let inner = self.inner.read().expect("poisoned lock");
        Ok(inner.file(&path)?.attributes(&path))
    }

    fn transfer(&self, source: &str, destination: &str, config: &Config, keep: bool) -> Result<()> {
        let source = normalize(source)?;
        let destination = normalize(destination)?;
        let visibility = config.visibility()?;

        let mut inner = self.inner.write().expect("poisoned lock");
        let mut file = inner.file(&source)?.clone();
        if let Some(visibility) = visibility {
            file.visibility = visibility;
        }
        if keep {
            file.last_modified = now();
        } else {
            if destination != source {
                inner.check_file_slot(&destination)?;
            }
            inner.files.remove(&source);
        }
        inner.insert_file(destination, file)
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Avoid dumping potentially large in-memory contents.
        f.debug_struct("MemoryStorage")
            .field("len", &self.len())
            .finish()
    }
}

impl Filesystem for MemoryStorage {
    async fn file_exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        let inner = self.inner.read().expect("poisoned lock");
        Ok(inner.files.contains_key(&path))
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        let inner = self.inner.read().expect("poisoned lock");
        Ok(inner.has_directory(&path))
    }

    async fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<()> {
        self.store(path, contents.to_vec(), config)
    }

    async fn write_stream(
        &self,
        path: &str,
        contents: &mut ContentStream,
        config: &Config,
    ) -> Result<()> {
        let buf = contents.read_all().await?;
        self.store(path, buf, config)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path)?;
        let inner = self.inner.read().expect("poisoned lock");
        Ok(inner.file(&path)?.contents.clone())
    }

    async fn read_stream(&self, path: &str) -> Result<ContentStream> {
        let bytes = self.read(path).await?;
        Ok(ContentStream::from_bytes(bytes))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut inner = self.inner.write().expect("poisoned lock");
        inner.files.remove(&path);
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(Error::PermissionDenied(
                "refusing to delete the storage root".to_string(),
            ));
        }
        let prefix = dir_prefix(&path);
        let mut inner = self.inner.write().expect("poisoned lock");
        inner.files.retain(|p, _| !p.starts_with(&prefix));
        inner
            .directories
            .retain(|p, _| p != &path && !p.starts_with(&prefix));
        Ok(())
    }

    async fn create_directory(&self, path: &str, config: &Config) -> Result<()> {
        let path = normalize(path)?;
        let visibility = config.directory_visibility()?.unwrap_or_default();
        let mut inner = self.inner.write().expect("poisoned lock");
        if inner.files.contains_key(&path) {
            return Err(Error::AlreadyExists(format!("a file exists at '{path}'")));
        }
        if let Some(ancestor) = inner.file_ancestor(&path) {
            return Err(Error::AlreadyExists(format!("a file exists at '{ancestor}'")));
        }
        if !path.is_empty() {
            inner.directories.insert(
                path,
                MemoryDirectory {
                    visibility,
                    last_modified: now(),
                },
            );
        }
        Ok(())
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let path = normalize(path)?;
        let mut inner = self.inner.write().expect("poisoned lock");
        match inner.files.get_mut(&path) {
            Some(file) => {
                file.visibility = visibility;
                Ok(())
            }
            None => Err(Error::NotFound(path)),
        }
    }

    async fn visibility(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path)
    }

    async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path)
    }

    async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path)
    }

    async fn file_size(&self, path: &str) -> Result<FileAttributes> {
        self.stat(path)
    }

    async fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> Result<BoxStream<'_, Result<StorageAttributes>>> {
        let base = normalize(path)?;
        let prefix = dir_prefix(&base);
        let inner = self.inner.read().expect("poisoned lock");

        let mut entries: BTreeMap<String, StorageAttributes> = BTreeMap::new();
        let add_dirs = |rel: &str, is_dir: bool, entries: &mut BTreeMap<String, StorageAttributes>| {
            // Every ancestor below `base` is an (implicit) directory entry.
            let segments: Vec<&str> = rel.split('/').collect();
            let dir_depth = if is_dir { segments.len() } else { segments.len() - 1 };
            let limit = if deep { dir_depth } else { dir_depth.min(1) };
            for depth in 1..=limit {
                let dir = format!("{prefix}{}", segments[..depth].join("/"));
                entries
                    .entry(dir.clone())
                    .or_insert_with(|| inner.directory_attributes(&dir).into());
            }
        };

        for (file_path, file) in inner.files.range(prefix.clone()..) {
            let Some(rel) = file_path.strip_prefix(&prefix) else {
                break;
            };
            add_dirs(rel, false, &mut entries);
            if deep || !rel.contains('/') {
                entries.insert(file_path.clone(), file.attributes(file_path).into());
            }
        }
        for dir_path in inner.directories.keys() {
            if let Some(rel) = dir_path.strip_prefix(&prefix) {
                if !rel.is_empty() {
                    add_dirs(rel, true, &mut entries);
                }
            }
        }

        Ok(Box::pin(stream::iter(entries.into_values().map(Ok))))
    }

    async fn move_file(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        self.transfer(source, destination, config, false)
    }

    async fn copy(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        self.transfer(source, destination, config, true)
    }
}
