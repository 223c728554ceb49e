//! Cloud instance provisioning.
//!
//! Creating and destroying instances is delegated to a [`CloudProvider`].
//! The provider shipped here runs operator supplied commands (for example
//! wrappers around `aws ec2` or `openstack server`), so no cloud SDK is
//! linked into the harness.

use log::{debug, info};
use std::rc::Rc;

use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::node::{Invocation, ProcessRunner};

/// A freshly created instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub ip_address: String,
    /// Address reachable from the harness, if different
    pub ext_ip_address: Option<String>,
}

/// Creates and terminates cloud instances.
pub trait CloudProvider {
    fn create_instances(&self, count: u32, image: &str, flavor: &str) -> Result<Vec<Instance>>;

    fn terminate_instances(&self, ids: &[String]) -> Result<()>;
}

/// Provider driven by the `create_command` and `terminate_command` of the
/// cloud configuration, run through `sh -c` on the harness machine.
pub struct CommandCloudProvider {
    create_command: String,
    terminate_command: String,
    runner: Rc<dyn ProcessRunner>,
}

impl CommandCloudProvider {
    pub fn new(config: &CloudConfig, runner: Rc<dyn ProcessRunner>) -> Self {
        Self {
            create_command: config.create_command.clone(),
            terminate_command: config.terminate_command.clone(),
            runner,
        }
    }

    fn shell(&self, command: &str) -> Result<String> {
        let invocation = Invocation::new("sh").args(["-c", command]);
        let result = self.runner.run(&invocation);
        if !result.is_success() {
            return Err(Error::Cloud(format!(
                "'{}' failed with exit code {}: {}",
                command,
                result.exit_code,
                result.stderr.trim()
            )));
        }
        Ok(result.stdout)
    }
}

impl CloudProvider for CommandCloudProvider {
    fn create_instances(&self, count: u32, image: &str, flavor: &str) -> Result<Vec<Instance>> {
        if self.create_command.is_empty() {
            return Err(Error::Cloud(
                "cloud.new_nodes is set but cloud.create_command is empty".to_string(),
            ));
        }

        let command = self
            .create_command
            .replace("{count}", &count.to_string())
            .replace("{image}", image)
            .replace("{flavor}", flavor);
        info!("Creating {} cloud instances", count);
        let output = self.shell(&command)?;

        let instances = parse_instances(&output)?;
        if instances.len() != count as usize {
            return Err(Error::Cloud(format!(
                "requested {} instances but the create command reported {}",
                count,
                instances.len()
            )));
        }
        Ok(instances)
    }

    fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if self.terminate_command.is_empty() {
            return Err(Error::Cloud("cloud.terminate_command is empty".to_string()));
        }
        let command = self.terminate_command.replace("{ids}", &ids.join(" "));
        info!("Terminating cloud instances {}", ids.join(", "));
        self.shell(&command)?;
        Ok(())
    }
}

/// Parses `<id> <internal-ip> [<external-ip>]` lines. Blank lines and lines
/// starting with `#` are skipped.
pub fn parse_instances(output: &str) -> Result<Vec<Instance>> {
    let mut instances = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [id, ip] => instances.push(Instance {
                id: id.to_string(),
                ip_address: ip.to_string(),
                ext_ip_address: None,
            }),
            [id, ip, ext] => instances.push(Instance {
                id: id.to_string(),
                ip_address: ip.to_string(),
                ext_ip_address: Some(ext.to_string()),
            }),
            _ => {
                return Err(Error::Cloud(format!(
                    "cannot parse instance line '{}', expected '<id> <ip> [<external ip>]'",
                    line
                )))
            }
        }
    }
    debug!("Parsed {} instances", instances.len());
    Ok(instances)
}
