//! Lesionscope command-line entry point
//!
//! Runs the prediction HTTP service or classifies single images offline.

#[cfg(feature = "cli")]
use lesionscope::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
