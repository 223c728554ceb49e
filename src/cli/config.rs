//! CLI command for managing the ofstest configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use ofstest::config::{Config, NodeEntry};

#[derive(Args)]
#[command(about = "Manage the ofstest configuration")]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Configuration file to show instead of the default one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the configuration file path
    Path,

    /// Initialize a new configuration file with an example cluster
    Init {
        /// Overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(&self) -> Result<()> {
        match &self.action {
            ConfigAction::Show { config } => self.show_config(config.as_deref()),
            ConfigAction::Path => self.show_path(),
            ConfigAction::Init { force } => self.init_config(*force),
        }
    }

    fn show_config(&self, path: Option<&std::path::Path>) -> Result<()> {
        let config = match path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        if config.nodes.is_empty() && !config.wants_new_cloud_nodes() {
            println!("No nodes configured.");
            println!();
            println!("To create a configuration file, run:");
            println!("  ofstest config init");
            println!();
        }

        let yaml = serde_yaml::to_string(&config)?;
        println!("{}", yaml);

        Ok(())
    }

    fn show_path(&self) -> Result<()> {
        match Config::default_path() {
            Some(path) => {
                println!("Configuration file path: {}", path.display());
                if path.exists() {
                    println!("Status: File exists");
                } else {
                    println!("Status: File does not exist");
                }
            }
            None => {
                println!("Could not determine configuration directory");
            }
        }

        Ok(())
    }

    fn init_config(&self, force: bool) -> Result<()> {
        let path = Config::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine configuration directory"))?;

        if path.exists() && !force {
            println!("Configuration file already exists at: {}", path.display());
            println!("Use --force to overwrite");
            return Ok(());
        }

        let mut config = Config::default();
        config.ssh_key = Some("~/.ssh/id_rsa".to_string());
        config.nodes = vec![
            NodeEntry::new("10.0.0.10", "ec2-user"),
            NodeEntry::new("10.0.0.11", "ec2-user"),
        ];
        config.build.resource_location =
            "http://www.orangefs.org/svn/orangefs/branches/stable".to_string();
        config.save_to(&path)?;

        println!("Created configuration file at: {}", path.display());
        println!();
        println!("An example two node cluster has been added. Edit the file to describe your machines:");
        println!("  ofstest config show");
        println!();
        println!("Then build the cluster and run the tests:");
        println!("  ofstest run");

        Ok(())
    }
}
