//! Mirror writes from one [`MemoryStorage`] onto another.
//!
//! Run with:
//! ```sh
//! RUST_LOG=replicate=debug cargo run --example replicate --features="memory"
//! ```

use futures::StreamExt as _;
use replicate::{
    Config, ContentStream, Filesystem, FilesystemExt, MemoryStorage, ReplicateStorage,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let source = MemoryStorage::new();
    let replica = MemoryStorage::new();
    let storage = ReplicateStorage::new(&source, &replica);

    // Write
    storage.write_str("hello.txt", "Hello, World!").await?;

    // Stream write; the replica receives the rewound stream
    let mut stream = ContentStream::from_bytes("Goodbye, World!");
    storage
        .write_stream("world.txt", &mut stream, &Config::new())
        .await?;

    // Copy and move are mirrored too
    storage
        .copy("hello.txt", "archive/hello.txt", &Config::new())
        .await?;
    storage
        .move_file("world.txt", "archive/world.txt", &Config::new())
        .await?;

    // Reads come from the source only
    let content = storage.read_to_string("archive/hello.txt").await?;
    println!("archive/hello.txt: {content}");

    println!("Replica contents:");
    let mut entries = replica.list_contents("", true).await?;
    while let Some(entry) = entries.next().await {
        println!("  {}", entry?.path());
    }

    // Delete
    storage.delete("hello.txt").await?;
    println!(
        "hello.txt on replica: {}",
        replica.file_exists("hello.txt").await?
    );

    Ok(())
}
