//! Closetkit CLI Tool
//!
//! Command-line interface for scanning garment photos and managing the local
//! wardrobe using the closetkit library with ONNX Runtime and Tract engines.

#[cfg(feature = "cli")]
use closetkit::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
