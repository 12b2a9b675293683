//! Back up an in-memory store onto the local filesystem.
//!
//! Run with:
//! ```sh
//! RUST_LOG=replicate=debug cargo run --example local_replica --features="memory local"
//! ```

use replicate::{
    Config, Filesystem, FilesystemExt, LocalStorage, MemoryStorage, ReplicateStorage, Visibility,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let backup_dir = std::env::temp_dir().join("replicate-demo");
    let storage = ReplicateStorage::new(MemoryStorage::new(), LocalStorage::new(&backup_dir));

    let private = Config::new().with(Config::VISIBILITY, Visibility::Private.as_str());
    storage.write("notes/todo.txt", b"buy milk", &private).await?;
    storage.write_str("notes/readme.md", "# notes").await?;
    storage
        .set_visibility("notes/readme.md", Visibility::Private)
        .await?;

    for path in storage.replica().list_paths("notes", false).await? {
        let attributes = storage.replica().visibility(&path).await?;
        println!(
            "{} -> {}",
            backup_dir.join(&path).display(),
            attributes.visibility.unwrap_or_default()
        );
    }

    storage.delete_directory("notes").await?;
    println!(
        "notes removed from backup: {}",
        !storage.replica().directory_exists("notes").await?
    );

    Ok(())
}
