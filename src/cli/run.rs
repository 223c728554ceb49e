//! Setup followed by the tests, on the same cluster.

use anyhow::{Context, Result};
use clap::Args;
use std::rc::Rc;

use ofstest::network::NetworkOrchestrator;
use ofstest::node::SystemRunner;

use super::test::run_tests;
use super::ConfigFile;

#[derive(Args)]
#[command(about = "Build the cluster, then run the enabled tests on it")]
pub struct RunCommand {
    #[command(flatten)]
    pub file: ConfigFile,
}

impl RunCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.file.load()?;
        let mut network = NetworkOrchestrator::new(config.clone(), Rc::new(SystemRunner));
        network.setup().context("OrangeFS setup failed")?;
        run_tests(&config, &mut network)
    }
}
