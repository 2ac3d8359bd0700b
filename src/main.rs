//! scyllactl - main entry point.

use scyllactl::cli::{self, Cli};
use scyllactl::output;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    if let Err(e) = cli::run(cli).await {
        output::error(format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
