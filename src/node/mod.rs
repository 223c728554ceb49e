//! One machine under test.
//!
//! A [`Node`] bundles the identity of a machine, its shell session state
//! (working directory, exported environment, pending batch), the locations of
//! the OrangeFS installation on it, and the transport used to reach it.
//! Higher level operations live in the `builder`, `server` and `client`
//! submodules and are all compositions of [`Node::run`] and
//! [`Node::flush_batch`].

pub mod batch;
pub mod builder;
pub mod client;
pub mod command;
pub mod diagnostics;
pub mod distro;
pub mod server;
pub mod transport;

use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use crate::config::{
    Config, Delays, NodeEntry, NodeKind, DEFAULT_DB4_PREFIX, DEFAULT_FS_NAME,
    DEFAULT_INSTALL_PREFIX,
};
use crate::error::Result;

pub use batch::BatchScript;
pub use command::{CommandResult, Invocation, ProcessRunner, SystemRunner, TRANSPORT_FAILURE_RC};
pub use distro::{CommandTemplates, Distro, DistroFamily};
pub use transport::{CloudInstance, CommandLineBuilder, LocalShell, ShellContext, SshRemote};

/// Port the OrangeFS servers listen on.
pub const DEFAULT_TCP_PORT: u16 = 3396;

const MAX_HOST_NAME_LEN: usize = 15;

/// Where OrangeFS and its companions live on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    /// Checked out or extracted source tree
    pub source: String,
    /// Server storage directory
    pub storage: String,
    /// Installation prefix
    pub installation: String,
    /// Third party benchmarks
    pub extra_tests: String,
    pub mount_point: String,
    /// Server configuration file, once generated or discovered
    pub conf_file: Option<String>,
    pub db4_dir: String,
    /// Name of the source branch or tarball directory
    pub branch: String,
    /// OpenMPI installation, if built
    pub openmpi: Option<String>,
}

impl Default for InstallPaths {
    fn default() -> Self {
        Self {
            source: String::new(),
            storage: String::new(),
            installation: DEFAULT_INSTALL_PREFIX.to_string(),
            extra_tests: String::new(),
            mount_point: String::new(),
            conf_file: None,
            db4_dir: DEFAULT_DB4_PREFIX.to_string(),
            branch: String::new(),
            openmpi: None,
        }
    }
}

impl InstallPaths {
    pub fn db4_lib_dir(&self) -> String {
        format!("{}/lib", self.db4_dir)
    }

    /// Location of the client mount table file.
    pub fn tab_file(&self) -> String {
        format!("{}/etc/orangefstab", self.installation)
    }

    /// Configuration file, falling back to the generated location.
    pub fn conf_file_or_default(&self) -> String {
        self.conf_file
            .clone()
            .unwrap_or_else(|| format!("{}/etc/orangefs.conf", self.installation))
    }
}

/// Filesystem service metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub fs_name: String,
    pub tcp_port: u16,
    /// Server aliases from the configuration file, read on first server start
    pub aliases: Option<Vec<String>>,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            fs_name: DEFAULT_FS_NAME.to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            aliases: None,
        }
    }
}

/// A machine in the test cluster.
pub struct Node {
    pub ip_address: String,
    pub ext_ip_address: String,
    pub host_name: String,
    /// Login user
    pub current_user: String,
    pub current_group: String,
    pub kernel_version: String,
    pub processor_type: String,
    pub distro: Distro,
    templates: CommandTemplates,

    current_directory: String,
    previous_directory: String,
    environment: BTreeMap<String, String>,
    batch: BatchScript,

    /// Key on the harness machine used to reach this node
    pub local_key_file: Option<String>,
    /// The same key as stored on the node itself
    pub node_key_file: Option<String>,
    keytable: HashMap<String, String>,

    pub paths: InstallPaths,
    pub service: ServiceInfo,
    pub delays: Delays,

    transport: Box<dyn CommandLineBuilder>,
    runner: Rc<dyn ProcessRunner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("ip_address", &self.ip_address)
            .field("host_name", &self.host_name)
            .field("current_user", &self.current_user)
            .field("kind", &self.transport.kind())
            .finish()
    }
}

impl Node {
    /// Creates a node reached through `transport`.
    pub fn new(
        transport: Box<dyn CommandLineBuilder>,
        runner: Rc<dyn ProcessRunner>,
        ip_address: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        let ip_address = ip_address.into();
        Self {
            ext_ip_address: transport
                .address()
                .map(str::to_string)
                .unwrap_or_else(|| ip_address.clone()),
            ip_address,
            host_name: String::new(),
            current_user: user.into(),
            current_group: String::new(),
            kernel_version: String::new(),
            processor_type: "x86_64".to_string(),
            distro: Distro::default(),
            templates: CommandTemplates::default(),
            current_directory: "~".to_string(),
            previous_directory: "~".to_string(),
            environment: BTreeMap::new(),
            batch: BatchScript::new(),
            local_key_file: None,
            node_key_file: None,
            keytable: HashMap::new(),
            paths: InstallPaths::default(),
            service: ServiceInfo::default(),
            delays: Delays::default(),
            transport,
            runner,
        }
    }

    /// The harness machine itself, running commands as `user`.
    pub fn local(user: impl Into<String>) -> Self {
        let user = user.into();
        Self::new(
            Box::new(LocalShell::new(user.clone())),
            Rc::new(SystemRunner),
            "127.0.0.1",
            user,
        )
    }

    /// Creates a node for a configured machine.
    pub fn from_entry(entry: &NodeEntry, config: &Config, runner: Rc<dyn ProcessRunner>) -> Self {
        Self::build(entry, None, config, runner)
    }

    /// Creates a node for an instance the cloud provider just created.
    pub fn from_instance(
        entry: &NodeEntry,
        instance_id: impl Into<String>,
        config: &Config,
        runner: Rc<dyn ProcessRunner>,
    ) -> Self {
        Self::build(entry, Some(instance_id.into()), config, runner)
    }

    fn build(
        entry: &NodeEntry,
        instance_id: Option<String>,
        config: &Config,
        runner: Rc<dyn ProcessRunner>,
    ) -> Self {
        let key = config.expanded_ssh_key();
        let ssh = || {
            SshRemote::new(
                entry.connect_address(),
                key.clone(),
                config.ssh_port,
                config.connect_timeout,
            )
        };

        let transport: Box<dyn CommandLineBuilder> = match entry.kind {
            NodeKind::Local => Box::new(LocalShell::new(entry.user.clone())),
            NodeKind::Ssh => Box::new(ssh()),
            NodeKind::Cloud => Box::new(CloudInstance::new(ssh(), instance_id)),
        };

        let mut node = Self::new(transport, runner, entry.ip_address.clone(), entry.user.clone());
        node.local_key_file = key.map(|k| k.to_string_lossy().into_owned());
        node.delays = config.delays;
        node
    }

    pub fn with_delays(mut self, delays: Delays) -> Self {
        self.delays = delays;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.transport.kind()
    }

    /// Provider id, for nodes created through a cloud provider.
    pub fn instance_id(&self) -> Option<&str> {
        self.transport.instance_id()
    }

    pub fn templates(&self) -> &CommandTemplates {
        &self.templates
    }

    /// Records the distribution and resolves its command table.
    pub fn set_distro(&mut self, distro: Distro) {
        self.templates = distro.templates();
        self.distro = distro;
    }

    // ---- session state -------------------------------------------------

    /// Changes the directory later commands run from.
    pub fn change_directory(&mut self, directory: impl Into<String>) {
        self.previous_directory = std::mem::replace(&mut self.current_directory, directory.into());
    }

    /// Returns to the directory in use before the last change.
    pub fn restore_directory(&mut self) {
        std::mem::swap(&mut self.current_directory, &mut self.previous_directory);
    }

    pub fn working_directory(&self) -> &str {
        &self.current_directory
    }

    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(name.into(), value.into());
    }

    /// Sets variables from `NAME=value` lines. Lines without `=` are ignored.
    pub fn set_environment(&mut self, assignments: &str) {
        for line in assignments.lines() {
            match line.split_once('=') {
                Some((name, value)) if !name.trim().is_empty() => {
                    self.set_env(name.trim(), value)
                }
                _ => debug!("Ignoring environment line '{}'", line),
            }
        }
    }

    pub fn clear_environment(&mut self) {
        self.environment.clear();
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment.get(name).map(String::as_str)
    }

    // ---- keys ----------------------------------------------------------

    /// Records where on this node the key for `address` is stored.
    pub fn add_remote_key(&mut self, address: impl Into<String>, key_path: impl Into<String>) {
        self.keytable.insert(address.into(), key_path.into());
    }

    pub fn remote_key_file(&self, address: &str) -> Option<&str> {
        self.keytable.get(address).map(String::as_str)
    }

    // ---- execution -----------------------------------------------------

    fn context<'a>(&'a self, acting_user: &'a str) -> ShellContext<'a> {
        ShellContext {
            directory: &self.current_directory,
            environment: &self.environment,
            acting_user,
        }
    }

    /// Runs one command as the login user.
    pub fn run(&self, command: &str) -> CommandResult {
        self.run_as(command, &self.current_user)
    }

    /// Runs one command as `user`.
    pub fn run_as(&self, command: &str, user: &str) -> CommandResult {
        let invocation = self.transport.command(&self.context(user), command);
        let result = self.runner.run(&invocation);
        debug!("[{}] {} -> {}", self.label(), command, result.exit_code);
        result
    }

    /// Standard output's first line, or empty.
    pub fn run_first_line(&self, command: &str) -> String {
        self.run(command).first_line()
    }

    /// Appends a command to the pending batch.
    pub fn add_batch(&mut self, command: impl Into<String>) {
        self.batch.add(command);
    }

    pub fn pending_batch(&self) -> &BatchScript {
        &self.batch
    }

    /// Drops the pending batch without running it. Returns how many
    /// commands were dropped.
    pub fn discard_batch(&mut self) -> usize {
        let dropped = self.batch.clear();
        for command in &dropped {
            warn!("[{}] discarding unflushed batch command: {}", self.label(), command);
        }
        dropped.len()
    }

    /// Runs all pending commands as one script and empties the batch. The
    /// exit status is the script's, not any single line's.
    pub fn flush_batch(&mut self) -> CommandResult {
        if self.batch.is_empty() {
            return CommandResult::skipped("");
        }
        let count = self.batch.len();
        let script = self.batch.take();
        let invocation = self.transport.script(&self.context(&self.current_user), &script);
        let mut result = self.runner.run(&invocation);
        if self.transport.script_uses_tty() {
            result = result.from_tty();
        }
        debug!(
            "[{}] batch of {} commands -> {}",
            self.label(),
            count,
            result.exit_code
        );
        result
    }

    /// Runs one command through the batch path.
    pub fn run_single_as_batch(&mut self, command: impl Into<String>) -> CommandResult {
        self.add_batch(command);
        self.flush_batch()
    }

    /// Replaces the pending batch with the lines of a script on the harness
    /// machine and runs it.
    pub fn run_batch_file(&mut self, path: &Path) -> Result<CommandResult> {
        let contents = fs::read_to_string(path)?;
        self.batch = BatchScript::new();
        for line in contents.lines() {
            self.batch.add(line);
        }
        Ok(self.flush_batch())
    }

    /// Copies a file or tree from the harness machine onto this node.
    pub fn push_from_harness(&self, local_path: &str, remote_path: &str, recursive: bool) -> CommandResult {
        let invocation = self
            .transport
            .push_from_harness(local_path, remote_path, recursive);
        self.runner.run(&invocation)
    }

    /// Copies within this node.
    pub fn copy_local(&self, source: &str, destination: &str, recursive: bool) -> i32 {
        let flag = if recursive { "-a " } else { "" };
        let result = self.run(&format!("rsync {}{} {}", flag, source, destination));
        if !result.is_success() {
            warn!(
                "[{}] copy {} -> {} failed: {}",
                self.label(),
                source,
                destination,
                result.stderr.trim()
            );
        }
        result.exit_code
    }

    /// Copies from this node to `destination` with rsync over ssh, using
    /// the key recorded for the destination's address.
    pub fn copy_to_node(&self, source: &str, destination: &Node, dest_path: &str, recursive: bool) -> i32 {
        let flag = if recursive { "-a" } else { "-t" };
        let ssh = match self.remote_key_file(&destination.ip_address) {
            Some(key) => format!("ssh -i {} -o StrictHostKeyChecking=no", key),
            None => "ssh -o StrictHostKeyChecking=no".to_string(),
        };
        let command = format!(
            "rsync {} -e \"{}\" {} {}@{}:{}",
            flag, ssh, source, destination.current_user, destination.ip_address, dest_path
        );
        let result = self.run(&command);
        if !result.is_success() {
            warn!(
                "[{}] copy of {} to {} failed (rc {})",
                self.label(),
                source,
                destination.label(),
                result.exit_code
            );
        }
        result.exit_code
    }

    /// Exit code of `result`, logging a diagnosis when it is non-zero.
    pub fn check(&self, step: &str, result: &CommandResult) -> i32 {
        if !result.is_success() {
            warn!(
                "{}",
                diagnostics::diagnose_step_failure(step, result, self.label())
            );
        }
        result.exit_code
    }

    /// Waits a fixed time for a service to become ready. Nothing is polled.
    pub fn wait(&self, what: &str, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        info!("Waiting {} seconds for {}", duration.as_secs(), what);
        thread::sleep(duration);
    }

    /// Host name if known, otherwise the address.
    pub fn label(&self) -> &str {
        if self.host_name.is_empty() {
            &self.ip_address
        } else {
            &self.host_name
        }
    }

    // ---- discovery -----------------------------------------------------

    /// Queries host name, kernel, processor, login group and distribution.
    pub fn current_node_information(&mut self) -> i32 {
        let group_query = format!(
            "ls -l /home/ | grep {} | awk '{{print $4}}'",
            self.current_user
        );
        self.current_group = self.run_first_line(&group_query).trim().to_string();

        // Some images only accept the key for root. Hand the key to the
        // login user so later commands can use it.
        if self.current_group.is_empty() {
            let user = self.current_user.clone();
            self.current_group = self.run_as(&group_query, "root").first_line().trim().to_string();
            if self.current_group.is_empty() {
                warn!("Could not access node at {} via ssh", self.ext_ip_address);
                return command::TRANSPORT_FAILURE_RC;
            }

            let rc = self
                .run_as(&format!("cp -r /root/.ssh /home/{}/", user), "root")
                .exit_code;
            if rc != 0 {
                warn!("Could not copy ssh key from /root/.ssh to /home/{}/", user);
                return rc;
            }
            let rc = self
                .run_as(
                    &format!("chown -R {}:{} /home/{}/.ssh/", user, self.current_group, user),
                    "root",
                )
                .exit_code;
            if rc != 0 {
                warn!("Could not change ownership of /home/{}/.ssh", user);
                return rc;
            }
        }

        self.host_name = self.run_first_line("hostname");
        if self.host_name.len() > MAX_HOST_NAME_LEN {
            let short: String = self.host_name.chars().take(MAX_HOST_NAME_LEN).collect();
            info!("Truncating hostname {} to {}", self.host_name, short);
            self.run_single_as_batch(format!("sudo bash -c 'echo {} > /etc/hostname'", short));
            self.run_single_as_batch(format!("sudo hostname {}", short));
            self.host_name = short;
        }

        self.kernel_version = self.run_first_line("uname -r");
        self.processor_type = self.run_first_line("uname -p");

        let distro = self.detect_distro_name();
        self.set_distro(Distro::detect(&distro));

        info!(
            "Node: {} {} {} {}",
            self.host_name, self.distro.name, self.kernel_version, self.processor_type
        );
        0
    }

    fn detect_distro_name(&self) -> String {
        let present = |file: &str| {
            self.run_first_line(&format!("find /etc -name \"{}\" 2> /dev/null", file))
                .trim()
                == format!("/etc/{}", file)
        };
        let value_of = |line: String| {
            line.split_once('=')
                .map(|(_, value)| value.to_string())
                .unwrap_or_default()
        };

        if present("os-release") {
            value_of(self.run_first_line("grep PRETTY_NAME /etc/os-release"))
        } else if present("redhat-release") {
            self.run_first_line("cat /etc/redhat-release")
        } else if present("lsb-release") {
            value_of(self.run_first_line("grep DISTRIB_DESCRIPTION /etc/lsb-release"))
        } else if present("SuSE-release") {
            self.run_first_line("head -n 1 /etc/SuSE-release")
        } else if self.run_first_line("uname").trim() == "Darwin" {
            format!("Mac OS X-{}", self.run_first_line("sw_vers -productVersion"))
        } else {
            String::new()
        }
    }

    /// Installation paths and service settings taken from the configuration.
    pub fn apply_settings(&mut self, config: &Config) {
        self.paths.installation = config.build.install_prefix.clone();
        self.paths.db4_dir = config.build.db4_prefix.clone();
        self.paths.mount_point = config.build.mount_point.clone();
        self.service.fs_name = config.build.fs_name.clone();
        self.delays = config.delays;
    }
}

/// Recording fake used by the unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    struct Rule {
        pattern: String,
        exit_code: i32,
        stdout: String,
        uses_left: Option<usize>,
    }

    /// Records every invocation. Returns exit status 0 and no output unless
    /// a rule whose pattern occurs in the command text matches.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: RefCell<Vec<Invocation>>,
        rules: RefCell<Vec<Rule>>,
    }

    impl RecordingRunner {
        pub fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        pub fn respond(&self, pattern: &str, exit_code: i32, stdout: &str) {
            self.push_rule(pattern, exit_code, stdout, None);
        }

        /// Like `respond`, but only for the first matching command.
        pub fn respond_once(&self, pattern: &str, exit_code: i32, stdout: &str) {
            self.push_rule(pattern, exit_code, stdout, Some(1));
        }

        fn push_rule(&self, pattern: &str, exit_code: i32, stdout: &str, uses_left: Option<usize>) {
            self.rules.borrow_mut().push(Rule {
                pattern: pattern.to_string(),
                exit_code,
                stdout: stdout.to_string(),
                uses_left,
            });
        }

        /// Text of every command run, session prelude included.
        pub fn scripts(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|i| i.args.last().cloned().unwrap_or_default())
                .collect()
        }

        pub fn invocations(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        pub fn count(&self, pattern: &str) -> usize {
            self.scripts().iter().filter(|s| s.contains(pattern)).count()
        }

        pub fn ran(&self, pattern: &str) -> bool {
            self.count(pattern) > 0
        }

        pub fn clear(&self) {
            self.calls.borrow_mut().clear();
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run(&self, invocation: &Invocation) -> CommandResult {
            self.calls.borrow_mut().push(invocation.clone());
            let text = invocation.args.last().cloned().unwrap_or_default();

            let mut rules = self.rules.borrow_mut();
            let hit = rules.iter_mut().find(|rule| {
                rule.uses_left != Some(0) && text.contains(&rule.pattern)
            });
            match hit {
                Some(rule) => {
                    if let Some(ref mut left) = rule.uses_left {
                        *left -= 1;
                    }
                    CommandResult {
                        command_line: invocation.command_line(),
                        exit_code: rule.exit_code,
                        stdout: rule.stdout.clone(),
                        stderr: String::new(),
                    }
                }
                None => CommandResult::skipped(invocation.command_line()),
            }
        }
    }

    /// A local node named `node1` logged in as `tester`, with no waits.
    pub fn node(runner: &Rc<RecordingRunner>) -> Node {
        let mut node = Node::new(
            Box::new(LocalShell::new("tester")),
            runner.clone(),
            "10.0.0.1",
            "tester",
        )
        .with_delays(Delays::none());
        node.host_name = "node1".to_string();
        node
    }
}
