use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    cx_ratings_cli::init_tracing();
    let cli = cx_ratings_cli::Cli::parse();
    cx_ratings_cli::run_cli(cli)
}
