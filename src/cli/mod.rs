pub mod config;
pub mod run;
pub mod setup;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;

use ofstest::config::Config;
use ofstest::runner::TestRunner;

/// Configuration file selection shared by the cluster commands.
#[derive(Args, Debug, Clone)]
pub struct ConfigFile {
    #[arg(
        short,
        long,
        help = "Configuration file (defaults to the platform configuration directory)"
    )]
    pub config: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            None => Config::load().context("Failed to load configuration"),
        }
    }
}

/// Prints one line per test and the totals.
pub fn print_summary(runner: &TestRunner) {
    println!();
    println!("{}", style("Test Results").bold().underlined());
    for outcome in runner.outcomes() {
        let name = format!("{}-{}", outcome.category, outcome.name);
        if outcome.passed() {
            println!("  {} {}", style("PASS").green().bold(), name);
        } else {
            println!(
                "  {} {} {}",
                style("FAIL").red().bold(),
                name,
                style(format!("(RC = {})", outcome.rc())).dim()
            );
        }
    }

    let failed = runner.failures();
    let passed = runner.outcomes().len() - failed;
    println!();
    println!(
        "{} passed, {} failed",
        style(passed).green(),
        if failed > 0 {
            style(failed).red()
        } else {
            style(failed).dim()
        }
    );
    println!("Results written to: {}", runner.log_path().display());
}
