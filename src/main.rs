//! Vigil CLI entry point.

use vigil_lib::cli::{self, Cli};
use vigil_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli).await
}
