mod app;
mod cli;
mod data;
mod report;
mod state;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    app::run(cli::Cli::parse())
}
