//! Transport-specific command line construction.
//!
//! Every node owns one [`CommandLineBuilder`], chosen when the node is
//! created. The builder turns a shell command plus the node's session state
//! (working directory, environment, acting user) into an [`Invocation`]
//! that runs on the harness machine: a local `bash`, or the OpenSSH client.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::NodeKind;
use crate::node::command::{shell_escape, Invocation};

/// Session state applied to every command.
#[derive(Debug, Clone, Copy)]
pub struct ShellContext<'a> {
    pub directory: &'a str,
    pub environment: &'a BTreeMap<String, String>,
    pub acting_user: &'a str,
}

impl ShellContext<'_> {
    /// Wraps `body` so it runs from the working directory with the
    /// environment exported.
    pub fn wrap(&self, body: &str) -> String {
        let mut script = format!("cd {} || exit 1\n", cd_target(self.directory));
        for (name, value) in self.environment {
            script.push_str(&format!("export {}=\"{}\"\n", name, escape_double(value)));
        }
        script.push_str(body);
        script
    }
}

/// Builds invocations for one transport.
pub trait CommandLineBuilder {
    fn kind(&self) -> NodeKind;

    /// Invocation running a single command.
    fn command(&self, ctx: &ShellContext<'_>, command: &str) -> Invocation;

    /// Invocation running a multi-line script as one session.
    fn script(&self, ctx: &ShellContext<'_>, script: &str) -> Invocation;

    /// Invocation copying a path from the harness machine onto this node.
    fn push_from_harness(&self, local_path: &str, remote_path: &str, recursive: bool) -> Invocation;

    /// Address the harness connects to, if remote.
    fn address(&self) -> Option<&str> {
        None
    }

    /// Provider id of the instance behind this transport.
    fn instance_id(&self) -> Option<&str> {
        None
    }

    /// True when scripts run under a pseudo-terminal, which merges stderr
    /// into stdout and ends lines with `\r\n`.
    fn script_uses_tty(&self) -> bool {
        false
    }
}

/// Commands run on the harness machine itself.
#[derive(Debug, Clone)]
pub struct LocalShell {
    login_user: String,
}

impl LocalShell {
    pub fn new(login_user: impl Into<String>) -> Self {
        Self {
            login_user: login_user.into(),
        }
    }
}

impl CommandLineBuilder for LocalShell {
    fn kind(&self) -> NodeKind {
        NodeKind::Local
    }

    fn command(&self, ctx: &ShellContext<'_>, command: &str) -> Invocation {
        let text = ctx.wrap(command);
        if ctx.acting_user == self.login_user {
            Invocation::new("bash").args(["-c", text.as_str()])
        } else {
            Invocation::new("sudo")
                .args(["-n", "-H", "-u", ctx.acting_user, "bash", "-c"])
                .arg(text)
        }
    }

    fn script(&self, ctx: &ShellContext<'_>, script: &str) -> Invocation {
        self.command(ctx, script)
    }

    fn push_from_harness(&self, local_path: &str, remote_path: &str, recursive: bool) -> Invocation {
        let invocation = Invocation::new("cp");
        let invocation = if recursive { invocation.arg("-a") } else { invocation };
        invocation.args([local_path, remote_path])
    }
}

/// Commands run over ssh with a key.
#[derive(Debug, Clone)]
pub struct SshRemote {
    address: String,
    key: Option<PathBuf>,
    port: u16,
    timeout: u64,
    extra_options: Vec<String>,
}

impl SshRemote {
    pub fn new(address: impl Into<String>, key: Option<PathBuf>, port: u16, timeout: u64) -> Self {
        Self {
            address: address.into(),
            key,
            port,
            timeout,
            extra_options: Vec::new(),
        }
    }

    /// Adds an `-o` option to every ssh and scp invocation.
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.extra_options.push(option.into());
        self
    }

    fn add_ssh_options(&self, mut invocation: Invocation, port_flag: &str) -> Invocation {
        invocation = invocation
            .args(["-o", "BatchMode=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.timeout))
            .args(["-o", "StrictHostKeyChecking=no"]);

        for option in &self.extra_options {
            invocation = invocation.arg("-o").arg(option.as_str());
        }

        if let Some(ref key) = self.key {
            invocation = invocation.arg("-i").arg(key.to_string_lossy());
        }

        if self.port != 22 {
            invocation = invocation.arg(port_flag).arg(self.port.to_string());
        }
        invocation
    }

    fn ssh(&self, acting_user: &str, force_tty: bool) -> Invocation {
        let invocation = Invocation::new("ssh");
        // sudo under `requiretty` needs a terminal for the whole batch.
        let invocation = if force_tty { invocation.arg("-tt") } else { invocation };
        self.add_ssh_options(invocation, "-p")
            .arg(format!("{}@{}", acting_user, self.address))
    }
}

impl CommandLineBuilder for SshRemote {
    fn kind(&self) -> NodeKind {
        NodeKind::Ssh
    }

    fn command(&self, ctx: &ShellContext<'_>, command: &str) -> Invocation {
        self.ssh(ctx.acting_user, false).arg(ctx.wrap(command))
    }

    fn script(&self, ctx: &ShellContext<'_>, script: &str) -> Invocation {
        self.ssh(ctx.acting_user, true)
            .arg(format!("bash -c {}", shell_escape(&ctx.wrap(script))))
    }

    fn script_uses_tty(&self) -> bool {
        true
    }

    fn push_from_harness(&self, local_path: &str, remote_path: &str, recursive: bool) -> Invocation {
        let invocation = Invocation::new("scp");
        let invocation = if recursive { invocation.arg("-r") } else { invocation };
        // scp takes the port as -P, not -p
        self.add_ssh_options(invocation, "-P")
            .arg(local_path)
            .arg(format!("{}:{}", self.address, remote_path))
    }

    fn address(&self) -> Option<&str> {
        Some(&self.address)
    }
}

/// A cloud instance. Reached over ssh on its external address; host keys
/// are not recorded because addresses are recycled between instances.
#[derive(Debug, Clone)]
pub struct CloudInstance {
    ssh: SshRemote,
    instance_id: Option<String>,
}

impl CloudInstance {
    pub fn new(ssh: SshRemote, instance_id: Option<String>) -> Self {
        Self {
            ssh: ssh.with_option("UserKnownHostsFile=/dev/null"),
            instance_id,
        }
    }
}

impl CommandLineBuilder for CloudInstance {
    fn kind(&self) -> NodeKind {
        NodeKind::Cloud
    }

    fn command(&self, ctx: &ShellContext<'_>, command: &str) -> Invocation {
        self.ssh.command(ctx, command)
    }

    fn script(&self, ctx: &ShellContext<'_>, script: &str) -> Invocation {
        self.ssh.script(ctx, script)
    }

    fn push_from_harness(&self, local_path: &str, remote_path: &str, recursive: bool) -> Invocation {
        self.ssh.push_from_harness(local_path, remote_path, recursive)
    }

    fn address(&self) -> Option<&str> {
        self.ssh.address()
    }

    fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    fn script_uses_tty(&self) -> bool {
        self.ssh.script_uses_tty()
    }
}

fn cd_target(directory: &str) -> String {
    if directory == "~" {
        return "~".to_string();
    }
    match directory.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", shell_escape(rest)),
        None => shell_escape(directory),
    }
}

// Values may reference other variables, so they are double quoted.
fn escape_double(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
