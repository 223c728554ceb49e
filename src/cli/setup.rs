//! Builds the test cluster.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::rc::Rc;

use ofstest::network::NetworkOrchestrator;
use ofstest::node::SystemRunner;

use super::ConfigFile;

#[derive(Args)]
#[command(about = "Provision the cluster, build OrangeFS and start its servers")]
pub struct SetupCommand {
    #[command(flatten)]
    pub file: ConfigFile,
}

impl SetupCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.file.load()?;
        let mut network = NetworkOrchestrator::new(config, Rc::new(SystemRunner));
        network.setup().context("OrangeFS setup failed")?;

        println!(
            "{} OrangeFS is running on {} nodes",
            style("✓").green().bold(),
            network.nodes().len()
        );
        for node in network.nodes() {
            println!("  {} ({})", node.label(), node.ext_ip_address);
        }
        Ok(())
    }
}
