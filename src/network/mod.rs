//! Cluster-wide orchestration.
//!
//! The [`NetworkOrchestrator`] owns every [`Node`] of the test cluster and
//! sequences the multi-node steps: credentials, host name resolution,
//! passwordless ssh, the build on the first node, distribution of the
//! installation, server configuration and service start. Everything runs
//! one node at a time.
//!
//! Load-bearing steps turn a non-zero exit status into
//! [`OfsTestError::Step`](crate::error::OfsTestError::Step) and abort the
//! sequence. Services already started stay running.

pub mod cloud;

use log::{debug, error, info, warn};
use std::path::Path;
use std::rc::Rc;

use crate::config::{Config, NodeEntry, NodeKind, SecurityMode};
use crate::error::{Error, Result};
use crate::node::command::shell_escape;
use crate::node::{Node, ProcessRunner};

pub use cloud::{CloudProvider, CommandCloudProvider, Instance};

/// Converts a step's exit status into an abort.
fn require(step: &str, rc: i32) -> Result<()> {
    if rc == 0 {
        return Ok(());
    }
    error!("{} failed with exit code {}", step, rc);
    Err(Error::step(step, rc))
}

/// The virtual cluster.
pub struct NetworkOrchestrator {
    nodes: Vec<Node>,
    config: Config,
    runner: Rc<dyn ProcessRunner>,
    cloud: Box<dyn CloudProvider>,
}

impl NetworkOrchestrator {
    /// Creates an empty cluster. Cloud instances are provisioned through
    /// the commands of the cloud configuration unless another provider is
    /// installed with [`with_cloud_provider`](Self::with_cloud_provider).
    pub fn new(config: Config, runner: Rc<dyn ProcessRunner>) -> Self {
        let cloud = Box::new(CommandCloudProvider::new(&config.cloud, runner.clone()));
        Self {
            nodes: Vec::new(),
            config,
            runner,
            cloud,
        }
    }

    pub fn with_cloud_provider(mut self, provider: Box<dyn CloudProvider>) -> Self {
        self.cloud = provider;
        self
    }

    pub fn add_node(&mut self, node: Node) {
        debug!("Adding {:?} to the cluster", node);
        self.nodes.push(node);
    }

    /// Adds the pre-existing machines listed in the configuration.
    pub fn add_configured_nodes(&mut self) {
        if self.config.nodes.is_empty() {
            return;
        }
        info!(
            "Adding {} existing nodes to the OrangeFS cluster",
            self.config.nodes.len()
        );
        for entry in self.config.nodes.clone() {
            let node = Node::from_entry(&entry, &self.config, self.runner.clone());
            self.add_node(node);
        }
    }

    /// Asks the cloud provider for `cloud.new_nodes` instances and adds them.
    pub fn create_cloud_nodes(&mut self) -> Result<()> {
        let cloud = self.config.cloud.clone();
        let instances = self
            .cloud
            .create_instances(cloud.new_nodes, &cloud.image, &cloud.flavor)?;

        for instance in instances {
            let mut entry =
                NodeEntry::new(instance.ip_address.clone(), cloud.user.clone()).with_kind(NodeKind::Cloud);
            if let Some(ext) = &instance.ext_ip_address {
                entry = entry.with_ext_ip_address(ext.clone());
            }
            info!("Created instance {} at {}", instance.id, entry.connect_address());
            let node = Node::from_instance(&entry, instance.id, &self.config, self.runner.clone());
            self.add_node(node);
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The first node: build node, source of the installation and the node
    /// tests run on.
    pub fn head_node_mut(&mut self) -> Result<&mut Node> {
        self.nodes.first_mut().ok_or(Error::NoNodes)
    }

    fn head_node(&self) -> Result<&Node> {
        self.nodes.first().ok_or(Error::NoNodes)
    }

    // ---- network -------------------------------------------------------

    /// Learns every node's identity, then distributes keys, fixes host
    /// name resolution and enables passwordless ssh between the nodes.
    pub fn init_network(&mut self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::NoNodes);
        }

        for node in &mut self.nodes {
            let rc = node.current_node_information();
            require(&format!("Reaching {}", node.ext_ip_address), rc)?;
        }

        info!("Distributing SSH keys");
        self.upload_keys()?;
        info!("Verifying hostname resolution");
        self.update_etc_hosts()?;
        info!("Enabling passwordless SSH access");
        self.enable_passwordless_ssh();
        Ok(())
    }

    /// Copies the harness key to every node and records it as the key for
    /// reaching every other node.
    pub fn upload_keys(&mut self) -> Result<()> {
        let addresses: Vec<String> = self.nodes.iter().map(|n| n.ip_address.clone()).collect();

        for node in &mut self.nodes {
            let Some(local_key) = node.local_key_file.clone() else {
                debug!("No ssh key configured for {}", node.label());
                continue;
            };
            let file_name = Path::new(&local_key)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "id_rsa".to_string());

            let ssh_dir = format!("/home/{}/.ssh", node.current_user);
            let remote_key = format!("{}/{}", ssh_dir, file_name);
            node.run(&format!("mkdir -p {}", ssh_dir));
            let result = node.push_from_harness(&local_key, &remote_key, false);
            require(
                &format!("Upload ssh key to {}", node.label()),
                node.check("Upload ssh key", &result),
            )?;
            node.run(&format!("chmod 600 {}", remote_key));
            node.node_key_file = Some(remote_key.clone());

            let own_address = node.ip_address.clone();
            for address in addresses.iter().filter(|a| **a != own_address) {
                node.add_remote_key(address.clone(), remote_key.clone());
            }
        }
        Ok(())
    }

    /// Adds an `/etc/hosts` entry for every node on every node, so servers
    /// and clients resolve each other by host name.
    pub fn update_etc_hosts(&mut self) -> Result<()> {
        let entries: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| !n.host_name.is_empty())
            .map(|n| format!("{} {}", n.ip_address, n.host_name))
            .collect();

        for node in &mut self.nodes {
            for entry in &entries {
                node.add_batch(format!(
                    "grep -q '^{entry}$' /etc/hosts || echo '{entry}' | sudo tee -a /etc/hosts > /dev/null",
                    entry = entry
                ));
            }
            let result = node.flush_batch();
            require(
                &format!("Update /etc/hosts on {}", node.label()),
                node.check("Update /etc/hosts", &result),
            )?;
        }
        Ok(())
    }

    /// Authorizes the uploaded key on every node and disables host key
    /// prompts, as MPI and Hadoop need. Failures are only logged.
    pub fn enable_passwordless_ssh(&mut self) {
        for node in &mut self.nodes {
            let Some(key) = node.node_key_file.clone() else {
                continue;
            };
            node.add_batch("mkdir -p ~/.ssh && chmod 700 ~/.ssh");
            node.add_batch(format!("pub=$(ssh-keygen -y -f {})", key));
            node.add_batch(
                "grep -qF \"$pub\" ~/.ssh/authorized_keys 2> /dev/null || echo \"$pub\" >> ~/.ssh/authorized_keys",
            );
            node.add_batch("chmod 600 ~/.ssh/authorized_keys");
            node.add_batch(format!(
                "printf 'Host *\\n  StrictHostKeyChecking no\\n  IdentityFile {}\\n' > ~/.ssh/config",
                key
            ));
            node.add_batch("chmod 600 ~/.ssh/config");
            let result = node.flush_batch();
            node.check("Enable passwordless ssh", &result);
        }
    }

    // ---- node preparation ----------------------------------------------

    /// Updates and reboots the cloud nodes, waits for them to return and
    /// queries them again.
    pub fn update_cloud_nodes(&mut self) -> Result<()> {
        for node in self.nodes.iter_mut().filter(|n| n.kind() == NodeKind::Cloud) {
            node.update_node();
            node.wait("the reboot", node.delays.reboot());
            let rc = node.current_node_information();
            require(&format!("Reaching {} after reboot", node.label()), rc)?;
        }
        Ok(())
    }

    /// Installs prerequisites everywhere. Failures are only logged; a node
    /// may already have everything.
    pub fn install_required_software(&mut self) {
        for node in &mut self.nodes {
            info!("Installing required software on {}", node.label());
            if node.install_required_software() != 0 {
                warn!("Prerequisite installation incomplete on {}", node.label());
            }
        }
    }

    // ---- build ---------------------------------------------------------

    /// Retrieves, configures and builds OrangeFS on the head node.
    pub fn build_from_source(&mut self) -> Result<()> {
        let build = self.config.build.clone();
        let head = self.head_node_mut()?;

        let credentials = match (&build.svn_username, &build.svn_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        };
        info!("Retrieving OrangeFS from {}", build.resource_location);
        require(
            "Copy OrangeFS source",
            head.copy_source(
                build.resource_type,
                &build.resource_location,
                &build.source_dir,
                credentials,
            ),
        )?;

        info!("Configuring OrangeFS in {}", head.paths.source);
        require("Configure OrangeFS", head.configure_source(&build))?;
        info!("Building OrangeFS");
        require("Build OrangeFS", head.make_source(&build.make_opts, build.build_kmod))
    }

    /// Installs the build on the head node. Prefixes outside the user's
    /// home directory are installed as root.
    pub fn install_build(&mut self) -> Result<()> {
        let build = self.config.build.clone();
        let head = self.head_node_mut()?;
        let as_root = !head.paths.installation.starts_with("/home/");
        info!("Installing OrangeFS to {}", head.paths.installation);
        require(
            "Install OrangeFS",
            head.install_source(&build.install_opts, as_root, build.build_kmod),
        )
    }

    /// Installs the shipped test programs and the third party benchmarks.
    pub fn install_tests(&mut self) -> Result<()> {
        let url = self.config.build.benchmarks_url.clone();
        let head = self.head_node_mut()?;
        require("Install OrangeFS tests", head.install_tests(""))?;
        require("Install benchmarks", head.install_benchmarks(&url, None))
    }

    // ---- servers -------------------------------------------------------

    /// Generates the server configuration on the head node with every node
    /// as an I/O and metadata server.
    pub fn configure_server(&mut self) -> Result<()> {
        let hosts: Vec<String> = self.nodes.iter().map(|n| n.host_name.clone()).collect();
        let build = self.config.build.clone();
        let head = self.head_node_mut()?;
        require(
            "Configure OrangeFS server",
            head.configure_server(
                &hosts,
                &build.fs_name,
                &build.genconfig_opts,
                build.conf_file.as_deref(),
                build.security_mode,
            ),
        )
    }

    /// Copies the head node's installation to every other node.
    pub fn copy_installation_to_all(&mut self) -> Result<()> {
        let Some((head, rest)) = self.nodes.split_first_mut() else {
            return Err(Error::NoNodes);
        };
        for node in rest {
            info!("Copying OrangeFS from {} to {}", head.label(), node.label());
            require(
                &format!("Copy OrangeFS to {}", node.label()),
                head.copy_installation_to(node),
            )?;
            node.service.fs_name = head.service.fs_name.clone();
            node.paths.mount_point = head.paths.mount_point.clone();
        }
        Ok(())
    }

    /// Creates keys on every node and installs the combined keystore.
    pub fn generate_security_keys(&mut self) -> Result<()> {
        let aliases = {
            let head = self.head_node()?;
            match &head.service.aliases {
                Some(aliases) => aliases.clone(),
                None => head.aliases_from_conf_file(),
            }
        };

        let mut keystore = String::new();
        for node in &mut self.nodes {
            node.service.aliases = Some(aliases.clone());
            require(
                &format!("Generate keys on {}", node.label()),
                node.generate_security_keys(),
            )?;
            let result = node.run(&node.keystore_entries());
            require(
                &format!("Read public keys on {}", node.label()),
                node.check("Read public keys", &result),
            )?;
            keystore.push_str(&result.stdout);
        }

        for node in &self.nodes {
            let path = format!("{}/etc/orangefs-keystore", node.paths.installation);
            let result = node.run(&format!(
                "printf '%s' {} > {path} && chmod 600 {path}",
                shell_escape(&keystore),
                path = path
            ));
            require(
                &format!("Install keystore on {}", node.label()),
                node.check("Install keystore", &result),
            )?;
        }
        Ok(())
    }

    pub fn start_servers(&mut self) -> Result<()> {
        for node in &mut self.nodes {
            let rc = node.start_server(false);
            require(&format!("Start OrangeFS servers on {}", node.label()), rc)?;
        }
        Ok(())
    }

    /// Kills the servers everywhere. Nodes without a server are fine.
    pub fn stop_servers(&mut self) {
        for node in &mut self.nodes {
            info!("Stopping OrangeFS servers on {}", node.label());
            node.stop_server();
        }
    }

    // ---- clients -------------------------------------------------------

    /// Starts the client on the head node.
    pub fn start_client(&mut self) -> Result<i32> {
        let security = self.config.build.security_mode;
        Ok(self.head_node_mut()?.load_and_start_client(security))
    }

    /// Starts clients everywhere. Failures are only logged.
    pub fn start_clients_all_nodes(&mut self) {
        let security = self.config.build.security_mode;
        for node in &mut self.nodes {
            if node.load_and_start_client(security) != 0 {
                warn!("Client did not start on {}", node.label());
            }
        }
    }

    pub fn install_openmpi(&mut self) -> Result<()> {
        let head = self.head_node_mut()?;
        require("Install OpenMPI", head.install_openmpi(None))
    }

    // ---- existing installations ----------------------------------------

    /// Applies the configured paths and service settings to every node.
    pub fn apply_settings(&mut self) {
        for node in &mut self.nodes {
            node.apply_settings(&self.config);
        }
    }

    /// Learns the running installation from the head node's server process
    /// and shares it with the other nodes.
    pub fn find_existing_installation(&mut self) -> Result<()> {
        let head = self.head_node_mut()?;
        require("Find existing OrangeFS installation", head.find_existing_installation())?;

        let paths = head.paths.clone();
        let service = head.service.clone();
        let tab_file = head.env("PVFS2TAB_FILE").map(str::to_string);
        for node in self.nodes.iter_mut().skip(1) {
            node.paths = paths.clone();
            node.service = service.clone();
            if let Some(tab_file) = &tab_file {
                node.set_env("PVFS2TAB_FILE", tab_file.clone());
            }
        }
        Ok(())
    }

    /// Destroys the instances created through the cloud provider.
    pub fn terminate_cloud_nodes(&mut self) -> Result<()> {
        let ids: Vec<String> = self
            .nodes
            .iter()
            .filter_map(|n| n.instance_id().map(str::to_string))
            .collect();
        if ids.is_empty() {
            debug!("No cloud instances to terminate");
            return Ok(());
        }
        self.cloud.terminate_instances(&ids)?;
        self.nodes.retain(|n| n.instance_id().is_none());
        Ok(())
    }

    // ---- sequences -----------------------------------------------------

    /// Builds the whole cluster: provisioning, network, build, install,
    /// configuration, distribution, keys and servers.
    pub fn setup(&mut self) -> Result<()> {
        if self.config.wants_new_cloud_nodes() {
            self.create_cloud_nodes()?;
        }
        self.add_configured_nodes();
        if self.nodes.is_empty() {
            return Err(Error::NoNodes);
        }
        self.apply_settings();

        self.init_network()?;
        if self.config.wants_new_cloud_nodes() && self.config.cloud.update_new_nodes {
            self.update_cloud_nodes()?;
        }
        self.install_required_software();

        if self.config.build.build_from_source {
            self.build_from_source()?;
            self.install_build()?;
            if self.config.build.install_tests {
                self.install_tests()?;
            }
        } else {
            info!(
                "Not building, using the installation at {}",
                self.config.build.install_prefix
            );
        }

        self.configure_server()?;
        self.copy_installation_to_all()?;
        if self.config.build.security_mode == SecurityMode::Key {
            self.generate_security_keys()?;
        }
        self.start_servers()?;

        if self.config.tests.start_client_on_all_nodes {
            self.start_clients_all_nodes();
        }
        if self.config.tests.install_mpi || self.config.tests.mpiio {
            self.install_openmpi()?;
        }
        if self.config.tests.hadoop {
            warn!("Hadoop is not set up by ofstest; hadoop tests expect an existing installation");
        }
        info!("OrangeFS cluster of {} nodes is ready", self.nodes.len());
        Ok(())
    }

    /// Attaches to an already running cluster instead of building one.
    pub fn attach(&mut self) -> Result<()> {
        if self.config.wants_new_cloud_nodes() {
            return Err(Error::Precondition(
                "new cloud nodes were requested, so there is no running installation to attach to"
                    .to_string(),
            ));
        }
        self.add_configured_nodes();
        self.init_network()?;
        self.apply_settings();
        self.find_existing_installation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Delays, ResourceType};
    use crate::node::testing::RecordingRunner;
    use crate::node::LocalShell;
    use std::cell::RefCell;

    fn test_node(runner: &Rc<RecordingRunner>, ip: &str, host: &str) -> Node {
        let mut node = Node::new(Box::new(LocalShell::new("tester")), runner.clone(), ip, "tester")
            .with_delays(Delays::none());
        node.host_name = host.to_string();
        node
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.delays = Delays::none();
        config.build.resource_type = ResourceType::Svn;
        config.build.resource_location = "http://orangefs.org/svn/orangefs/branches/stable".to_string();
        config.build.install_tests = false;
        config
    }

    fn cluster(runner: &Rc<RecordingRunner>, config: Config) -> NetworkOrchestrator {
        runner.respond("ls -l /home/", 0, "tester\n");
        runner.respond_once("hostname", 0, "node1\n");
        runner.respond("hostname", 0, "node2\n");
        runner.respond("grep 'Alias '", 0, "node1\nnode2\n");
        let mut network = NetworkOrchestrator::new(config, runner.clone());
        network.add_node(test_node(runner, "10.0.0.1", ""));
        network.add_node(test_node(runner, "10.0.0.2", ""));
        network
    }

    fn position(scripts: &[String], pattern: &str) -> usize {
        scripts
            .iter()
            .position(|s| s.contains(pattern))
            .unwrap_or_else(|| panic!("'{}' never ran", pattern))
    }

    struct FakeCloud {
        terminated: Rc<RefCell<Vec<String>>>,
    }

    impl CloudProvider for FakeCloud {
        fn create_instances(&self, count: u32, _image: &str, _flavor: &str) -> Result<Vec<Instance>> {
            Ok((1..=count)
                .map(|i| Instance {
                    id: format!("i-{}", i),
                    ip_address: format!("10.1.0.{}", i),
                    ext_ip_address: Some(format!("54.0.0.{}", i)),
                })
                .collect())
        }

        fn terminate_instances(&self, ids: &[String]) -> Result<()> {
            self.terminated.borrow_mut().extend(ids.iter().cloned());
            Ok(())
        }
    }

    #[test]
    fn test_setup_runs_steps_in_order() {
        let runner = RecordingRunner::new();
        let mut network = cluster(&runner, config());
        network.setup().unwrap();

        let scripts = runner.scripts();
        let export = position(&scripts, "svn export --force");
        let configure = position(&scripts, "./configure --prefix=/opt/orangefs");
        let install = position(&scripts, "sudo make install");
        let genconfig = position(&scripts, "pvfs2-genconfig");
        let copy = position(&scripts, "rsync -a -e");
        let server = position(&scripts, "pvfs2-server -p");
        assert!(export < configure && configure < install);
        assert!(install < genconfig && genconfig < copy && copy < server);

        assert!(runner.ran("--iospec=\"node1:3396,node2:3396\""));
        assert!(runner.ran("echo '10.0.0.2 node2' | sudo tee -a /etc/hosts"));
        assert_eq!(network.nodes()[1].paths.installation, "/opt/orangefs");
        assert!(!runner.ran("openssl genrsa"));
    }

    #[test]
    fn test_setup_aborts_on_failed_install() {
        let runner = RecordingRunner::new();
        runner.respond("make install", 2, "");
        let mut network = cluster(&runner, config());

        let err = network.setup().unwrap_err();
        assert_eq!(err.rc(), Some(2));
        assert!(!runner.ran("pvfs2-genconfig"));
        assert!(!runner.ran("pvfs2-server"));
    }

    #[test]
    fn test_setup_without_nodes() {
        let runner = RecordingRunner::new();
        let mut network = NetworkOrchestrator::new(config(), runner.clone());
        assert!(matches!(network.setup(), Err(Error::NoNodes)));
    }

    #[test]
    fn test_init_network_fails_on_unreachable_node() {
        let runner = RecordingRunner::new();
        let mut network = NetworkOrchestrator::new(config(), runner.clone());
        network.add_node(test_node(&runner, "10.0.0.1", ""));
        let err = network.init_network().unwrap_err();
        assert_eq!(err.rc(), Some(255));
    }

    #[test]
    fn test_upload_keys_fills_key_tables() {
        let runner = RecordingRunner::new();
        let mut network = NetworkOrchestrator::new(config(), runner.clone());
        for (ip, host) in [("10.0.0.1", "node1"), ("10.0.0.2", "node2")] {
            let mut node = test_node(&runner, ip, host);
            node.local_key_file = Some("/keys/cluster.pem".to_string());
            network.add_node(node);
        }
        network.upload_keys().unwrap();

        let head = &network.nodes()[0];
        assert_eq!(head.node_key_file.as_deref(), Some("/home/tester/.ssh/cluster.pem"));
        assert_eq!(head.remote_key_file("10.0.0.2"), Some("/home/tester/.ssh/cluster.pem"));
        assert_eq!(head.remote_key_file("10.0.0.1"), None);
        assert!(runner
            .invocations()
            .iter()
            .any(|i| i.program == "cp" && i.args.contains(&"/keys/cluster.pem".to_string())));
    }

    #[test]
    fn test_generate_security_keys_installs_keystore_everywhere() {
        let runner = RecordingRunner::new();
        runner.respond("echo S:", 0, "S:node1\n-----BEGIN PUBLIC KEY-----\n");
        let mut config = config();
        config.build.security_mode = SecurityMode::Key;
        let mut network = NetworkOrchestrator::new(config, runner.clone());
        network.add_node(test_node(&runner, "10.0.0.1", "node1"));
        network.add_node(test_node(&runner, "10.0.0.2", "node2"));
        network.head_node_mut().unwrap().service.aliases =
            Some(vec!["node1".to_string(), "node2".to_string()]);

        network.generate_security_keys().unwrap();
        assert_eq!(runner.count("openssl genrsa"), 2);
        assert_eq!(runner.count("> /opt/orangefs/etc/orangefs-keystore"), 2);
        assert_eq!(
            network.nodes()[1].service.aliases,
            Some(vec!["node1".to_string(), "node2".to_string()])
        );
    }

    #[test]
    fn test_cloud_nodes_created_and_terminated() {
        let runner = RecordingRunner::new();
        let terminated = Rc::new(RefCell::new(Vec::new()));
        let mut config = config();
        config.cloud.new_nodes = 2;
        let mut network = NetworkOrchestrator::new(config, runner.clone())
            .with_cloud_provider(Box::new(FakeCloud { terminated: terminated.clone() }));

        network.create_cloud_nodes().unwrap();
        assert_eq!(network.nodes().len(), 2);
        assert_eq!(network.nodes()[0].kind(), NodeKind::Cloud);
        assert_eq!(network.nodes()[0].ext_ip_address, "54.0.0.1");
        assert_eq!(network.nodes()[1].instance_id(), Some("i-2"));

        network.terminate_cloud_nodes().unwrap();
        assert_eq!(*terminated.borrow(), vec!["i-1".to_string(), "i-2".to_string()]);
        assert!(network.nodes().is_empty());
    }

    #[test]
    fn test_client_start_and_server_stop() {
        let runner = RecordingRunner::new();
        let mut network = NetworkOrchestrator::new(config(), runner.clone());
        network.add_node(test_node(&runner, "10.0.0.1", "node1"));
        network.add_node(test_node(&runner, "10.0.0.2", "node2"));

        assert_eq!(network.start_client().unwrap(), 0);
        assert_eq!(runner.count("pvfs2-client -p"), 1);

        network.stop_servers();
        assert_eq!(runner.count("killall -s 9 pvfs2-server"), 2);
    }

    #[test]
    fn test_attach_refuses_new_cloud_nodes() {
        let runner = RecordingRunner::new();
        let mut config = config();
        config.cloud.new_nodes = 1;
        let mut network = NetworkOrchestrator::new(config, runner.clone());
        assert!(matches!(network.attach(), Err(Error::Precondition(_))));
        assert!(runner.scripts().is_empty());
    }

    #[test]
    fn test_find_existing_installation_shared_with_all_nodes() {
        let runner = RecordingRunner::new();
        runner.respond("print $8", 0, "/usr/local/orangefs/sbin/pvfs2-server\n");
        runner.respond("print $11", 0, "/usr/local/orangefs/etc/orangefs.conf\n");
        runner.respond("print $13", 0, "node1\n");
        runner.respond("grep -l -r", 0, "/usr/local/orangefs/etc/orangefstab\n");
        let mut network = NetworkOrchestrator::new(config(), runner.clone());
        network.add_node(test_node(&runner, "10.0.0.1", "node1"));
        network.add_node(test_node(&runner, "10.0.0.2", "node2"));

        network.find_existing_installation().unwrap();
        let other = &network.nodes()[1];
        assert_eq!(other.paths.installation, "/usr/local/orangefs");
        assert_eq!(other.env("PVFS2TAB_FILE"), Some("/usr/local/orangefs/etc/orangefstab"));
    }
}
