use anyhow::Result;
use clap::{Parser, Subcommand};

mod cli;

use cli::config::ConfigCommand;
use cli::run::RunCommand;
use cli::setup::SetupCommand;
use cli::test::TestCommand;

#[derive(Parser)]
#[command(name = "ofstest")]
#[command(about = "Build an OrangeFS test cluster and run the OrangeFS test suites on it", long_about = None)]
struct Cli {
    /// Log every command, its exit status and its output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Setup(SetupCommand),
    Test(TestCommand),
    Run(RunCommand),
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // INFO by default, DEBUG with --verbose; RUST_LOG wins over both
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Commands::Setup(cmd) => cmd.execute(),
        Commands::Test(cmd) => cmd.execute(),
        Commands::Run(cmd) => cmd.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}
