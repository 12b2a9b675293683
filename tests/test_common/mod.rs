//! Common test utilities and a reusable behaviour suite for filesystem backends.
//!
//! The `run_*` functions exercise any [`Filesystem`] implementation; each test
//! file calls them with a fresh backend. [`RecordingStorage`] is a fake backend
//! that logs every call into a shared [`CallLog`] and can be told to fail
//! specific operations.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::stream::BoxStream;
use replicate::{
    Config, ContentStream, Error, FileAttributes, Filesystem, FilesystemExt, MemoryStorage,
    Result, StorageAttributes, Visibility,
};

// ── Recording backend ────────────────────────────────────────────────────────

/// Ordered record of calls, shared between several backends.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Calls made on the backend called `name`.
    pub fn calls_on(&self, name: &str) -> Vec<String> {
        let prefix = format!("{name}.");
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn push(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }
}

/// A [`MemoryStorage`] that logs each call as `name.operation(args)`.
///
/// Operations registered with [`fail_on`](Self::fail_on) are logged and then
/// fail with `PermissionDenied("name.operation")` without touching the data.
#[derive(Debug, Clone)]
pub struct RecordingStorage {
    name: &'static str,
    log: CallLog,
    inner: MemoryStorage,
    failing: Arc<Mutex<HashSet<&'static str>>>,
}

fn render(config: &Config) -> String {
    let options: Vec<String> = config.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", options.join(","))
}

impl RecordingStorage {
    pub fn new(name: &'static str, log: CallLog) -> Self {
        Self {
            name,
            log,
            inner: MemoryStorage::new(),
            failing: Arc::default(),
        }
    }

    /// Make every later call to `operation` fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    /// The underlying data, bypassing the log.
    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }

    fn record(&self, operation: &'static str, args: String) -> Result<()> {
        self.log.push(format!("{}.{operation}({args})", self.name));
        if self.failing.lock().unwrap().contains(operation) {
            return Err(Error::PermissionDenied(format!("{}.{operation}", self.name)));
        }
        Ok(())
    }
}

impl Filesystem for RecordingStorage {
    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.record("file_exists", path.to_string())?;
        self.inner.file_exists(path).await
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        self.record("directory_exists", path.to_string())?;
        self.inner.directory_exists(path).await
    }

    async fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<()> {
        let text = String::from_utf8_lossy(contents).into_owned();
        self.record("write", format!("{path}, {text}, {}", render(config)))?;
        self.inner.write(path, contents, config).await
    }

    async fn write_stream(
        &self,
        path: &str,
        contents: &mut ContentStream,
        config: &Config,
    ) -> Result<()> {
        let data = contents.read_all().await?;
        let text = String::from_utf8_lossy(&data).into_owned();
        self.record("write_stream", format!("{path}, {text}, {}", render(config)))?;
        self.inner.write(path, &data, config).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.record("read", path.to_string())?;
        self.inner.read(path).await
    }

    async fn read_stream(&self, path: &str) -> Result<ContentStream> {
        self.record("read_stream", path.to_string())?;
        self.inner.read_stream(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.record("delete", path.to_string())?;
        self.inner.delete(path).await
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        self.record("delete_directory", path.to_string())?;
        self.inner.delete_directory(path).await
    }

    async fn create_directory(&self, path: &str, config: &Config) -> Result<()> {
        self.record("create_directory", format!("{path}, {}", render(config)))?;
        self.inner.create_directory(path, config).await
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.record("set_visibility", format!("{path}, {visibility}"))?;
        self.inner.set_visibility(path, visibility).await
    }

    async fn visibility(&self, path: &str) -> Result<FileAttributes> {
        self.record("visibility", path.to_string())?;
        self.inner.visibility(path).await
    }

    async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        self.record("mime_type", path.to_string())?;
        self.inner.mime_type(path).await
    }

    async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        self.record("last_modified", path.to_string())?;
        self.inner.last_modified(path).await
    }

    async fn file_size(&self, path: &str) -> Result<FileAttributes> {
        self.record("file_size", path.to_string())?;
        self.inner.file_size(path).await
    }

    async fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> Result<BoxStream<'_, Result<StorageAttributes>>> {
        self.record("list_contents", format!("{path}, {deep}"))?;
        self.inner.list_contents(path, deep).await
    }

    async fn move_file(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        self.record(
            "move_file",
            format!("{source}, {destination}, {}", render(config)),
        )?;
        self.inner.move_file(source, destination, config).await
    }

    async fn copy(&self, source: &str, destination: &str, config: &Config) -> Result<()> {
        self.record("copy", format!("{source}, {destination}, {}", render(config)))?;
        self.inner.copy(source, destination, config).await
    }
}

/// A source and a replica recording into the same log.
pub fn recording_pair() -> (RecordingStorage, RecordingStorage, CallLog) {
    let log = CallLog::default();
    let source = RecordingStorage::new("source", log.clone());
    let replica = RecordingStorage::new("replica", log.clone());
    (source, replica, log)
}

// ── Behaviour suite ──────────────────────────────────────────────────────────

pub async fn run_test_write_and_exists<F: Filesystem>(storage: &F) {
    assert!(!storage.file_exists("test.txt").await.unwrap());

    storage.write_str("test.txt", "hello world").await.unwrap();

    assert!(storage.file_exists("test.txt").await.unwrap());
}

pub async fn run_test_write_and_read<F: Filesystem>(storage: &F) {
    storage
        .write("test.txt", b"hello world", &Config::new())
        .await
        .unwrap();

    let retrieved = storage.read("test.txt").await.unwrap();
    assert_eq!(retrieved, b"hello world");
}

pub async fn run_test_read_nonexistent<F: Filesystem>(storage: &F) {
    let result = storage.read("nonexistent.txt").await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let result = storage.read_stream("nonexistent.txt").await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let result = storage.file_size("nonexistent.txt").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

pub async fn run_test_delete_existing<F: Filesystem>(storage: &F) {
    storage.write_str("test.txt", "hello world").await.unwrap();
    assert!(storage.file_exists("test.txt").await.unwrap());

    storage.delete("test.txt").await.unwrap();
    assert!(!storage.file_exists("test.txt").await.unwrap());
}

pub async fn run_test_delete_idempotent<F: Filesystem>(storage: &F) {
    // Delete non-existent file should not error
    storage.delete("test.txt").await.unwrap();
    storage.delete("test.txt").await.unwrap();
}

pub async fn run_test_overwrite<F: Filesystem>(storage: &F) {
    storage.write_str("test.txt", "original").await.unwrap();
    storage.write_str("test.txt", "updated").await.unwrap();

    assert_eq!(storage.read_to_string("test.txt").await.unwrap(), "updated");
}

pub async fn run_test_empty_data<F: Filesystem>(storage: &F) {
    storage.write("empty.txt", b"", &Config::new()).await.unwrap();

    assert!(storage.file_exists("empty.txt").await.unwrap());
    assert!(storage.read("empty.txt").await.unwrap().is_empty());
    assert_eq!(
        storage.file_size("empty.txt").await.unwrap().file_size,
        Some(0)
    );
}

pub async fn run_test_large_data<F: Filesystem>(storage: &F) {
    let data: Vec<u8> = (0..100_000).map(|i| (i % 256) as u8).collect();

    storage.write("large.bin", &data, &Config::new()).await.unwrap();

    assert_eq!(storage.read("large.bin").await.unwrap(), data);
}

pub async fn run_test_stream_round_trip<F: Filesystem>(storage: &F) {
    let data: Vec<u8> = (0..=255).collect();
    let mut input = ContentStream::from_bytes(data.clone());

    storage
        .write_stream("binary.dat", &mut input, &Config::new())
        .await
        .unwrap();

    let mut output = storage.read_stream("binary.dat").await.unwrap();
    assert_eq!(output.read_all().await.unwrap(), data);
}

pub async fn run_test_move<F: Filesystem>(storage: &F) {
    storage.write_str("from.txt", "moving").await.unwrap();

    storage
        .move_file("from.txt", "nested/to.txt", &Config::new())
        .await
        .unwrap();

    assert!(!storage.file_exists("from.txt").await.unwrap());
    assert_eq!(
        storage.read_to_string("nested/to.txt").await.unwrap(),
        "moving"
    );

    let result = storage
        .move_file("from.txt", "again.txt", &Config::new())
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

pub async fn run_test_copy<F: Filesystem>(storage: &F) {
    storage.write_str("original.txt", "copied").await.unwrap();

    storage
        .copy("original.txt", "copy.txt", &Config::new())
        .await
        .unwrap();

    assert_eq!(storage.read_to_string("original.txt").await.unwrap(), "copied");
    assert_eq!(storage.read_to_string("copy.txt").await.unwrap(), "copied");

    let result = storage
        .copy("missing.txt", "copy2.txt", &Config::new())
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

pub async fn run_test_directories<F: Filesystem>(storage: &F) {
    storage
        .create_directory("reports/2024", &Config::new())
        .await
        .unwrap();
    assert!(storage.directory_exists("reports").await.unwrap());
    assert!(storage.directory_exists("reports/2024").await.unwrap());
    assert!(!storage.directory_exists("invoices").await.unwrap());

    storage.write_str("reports/2024/q1.txt", "q1").await.unwrap();
    storage.write_str("reports/summary.txt", "sum").await.unwrap();
    storage.write_str("keep.txt", "keep").await.unwrap();

    storage.delete_directory("reports").await.unwrap();

    assert!(!storage.directory_exists("reports").await.unwrap());
    assert!(!storage.file_exists("reports/2024/q1.txt").await.unwrap());
    assert!(!storage.file_exists("reports/summary.txt").await.unwrap());
    assert!(storage.file_exists("keep.txt").await.unwrap());
}

pub async fn run_test_path_conflicts<F: Filesystem>(storage: &F) {
    storage.write_str("dir/x.txt", "inner").await.unwrap();
    storage.write_str("a.txt", "outer").await.unwrap();

    // Implicit directory in the way.
    let result = storage.write_str("dir", "file").await;
    assert!(matches!(result, Err(Error::AlreadyExists(_))));
    let result = storage.copy("a.txt", "dir", &Config::new()).await;
    assert!(matches!(result, Err(Error::AlreadyExists(_))));
    let result = storage.move_file("a.txt", "dir", &Config::new()).await;
    assert!(matches!(result, Err(Error::AlreadyExists(_))));

    // File in the way of a parent directory.
    let result = storage.write_str("a.txt/b.txt", "nested").await;
    assert!(matches!(result, Err(Error::AlreadyExists(_))));
    let result = storage.create_directory("a.txt/sub", &Config::new()).await;
    assert!(matches!(result, Err(Error::AlreadyExists(_))));

    assert!(!storage.file_exists("dir").await.unwrap());
    assert!(storage.directory_exists("dir").await.unwrap());
    assert_eq!(storage.read_to_string("a.txt").await.unwrap(), "outer");
    assert_eq!(
        storage.list_paths("", true).await.unwrap(),
        vec!["a.txt", "dir", "dir/x.txt"]
    );
}

pub async fn run_test_delete_root<F: Filesystem>(storage: &F) {
    storage.write_str("keep.txt", "keep").await.unwrap();

    let result = storage.delete_directory("").await;
    assert!(matches!(result, Err(Error::PermissionDenied(_))));
    assert!(storage.file_exists("keep.txt").await.unwrap());
}

pub async fn run_test_list_contents<F: Filesystem>(storage: &F) {
    storage.write_str("a.txt", "1").await.unwrap();
    storage.write_str("dir/b.txt", "2").await.unwrap();
    storage.write_str("dir/sub/c.txt", "3").await.unwrap();

    assert_eq!(
        storage.list_paths("", false).await.unwrap(),
        vec!["a.txt", "dir"]
    );
    assert_eq!(
        storage.list_paths("", true).await.unwrap(),
        vec!["a.txt", "dir", "dir/b.txt", "dir/sub", "dir/sub/c.txt"]
    );
    assert_eq!(
        storage.list_paths("dir", false).await.unwrap(),
        vec!["dir/b.txt", "dir/sub"]
    );
    assert!(storage.list_paths("nowhere", true).await.unwrap().is_empty());

    // Listings are restartable
    assert_eq!(storage.list_paths("dir", true).await.unwrap().len(), 3);
    assert_eq!(storage.list_paths("dir", true).await.unwrap().len(), 3);
}

pub async fn run_test_visibility<F: Filesystem>(storage: &F) {
    let private = Config::new().with(Config::VISIBILITY, "private");
    storage.write("secret.txt", b"s", &private).await.unwrap();
    storage.write_str("open.txt", "o").await.unwrap();

    assert_eq!(
        storage.visibility("secret.txt").await.unwrap().visibility,
        Some(Visibility::Private)
    );
    assert_eq!(
        storage.visibility("open.txt").await.unwrap().visibility,
        Some(Visibility::Public)
    );

    storage
        .set_visibility("secret.txt", Visibility::Public)
        .await
        .unwrap();
    assert_eq!(
        storage.visibility("secret.txt").await.unwrap().visibility,
        Some(Visibility::Public)
    );
}

pub async fn run_test_attributes<F: Filesystem>(storage: &F) {
    storage.write_str("page.html", "<html></html>").await.unwrap();

    let size = storage.file_size("page.html").await.unwrap();
    assert_eq!(size.path, "page.html");
    assert_eq!(size.file_size, Some(13));

    let mime = storage.mime_type("page.html").await.unwrap();
    assert_eq!(mime.mime_type.as_deref(), Some("text/html"));

    let modified = storage.last_modified("page.html").await.unwrap();
    assert!(modified.last_modified.unwrap_or_default() > 0);
}

/// Every `run_test_*` against a fresh backend from `make`.
pub async fn run_suite<F, M, Fut>(mut make: M)
where
    F: Filesystem,
    M: FnMut() -> Fut,
    Fut: std::future::Future<Output = F>,
{
    run_test_write_and_exists(&make().await).await;
    run_test_write_and_read(&make().await).await;
    run_test_read_nonexistent(&make().await).await;
    run_test_delete_existing(&make().await).await;
    run_test_delete_idempotent(&make().await).await;
    run_test_overwrite(&make().await).await;
    run_test_empty_data(&make().await).await;
    run_test_large_data(&make().await).await;
    run_test_stream_round_trip(&make().await).await;
    run_test_move(&make().await).await;
    run_test_copy(&make().await).await;
    run_test_directories(&make().await).await;
    run_test_path_conflicts(&make().await).await;
    run_test_delete_root(&make().await).await;
    run_test_list_contents(&make().await).await;
    run_test_visibility(&make().await).await;
    run_test_attributes(&make().await).await;
}
