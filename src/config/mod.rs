//! Configuration management for ofstest.
//!
//! The configuration describes the machines of the test cluster, how OrangeFS
//! is retrieved and built on them, which test categories run, and the fixed
//! readiness delays used after starting services.
//!
//! # Configuration File Location
//!
//! - Linux: `~/.config/ofstest/config.yml`
//! - macOS: `~/Library/Application Support/ofstest/config.yml`
//!
//! A different file can be given with `--config`.
//!
//! # Example Configuration
//!
//! ```yaml
//! ssh_key: "~/.ssh/buildbot.pem"
//! nodes:
//!   - ip_address: "10.20.102.54"
//!     user: "ec2-user"
//!   - ip_address: "10.20.102.60"
//!     user: "ec2-user"
//! build:
//!   resource_type: svn
//!   resource_location: "http://orangefs.org/svn/orangefs/branches/stable"
//!   security_mode: key
//! tests:
//!   sysint: true
//!   vfs_kmod: true
//!   log_file: "results.log"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default SSH port
const DEFAULT_SSH_PORT: u16 = 22;

/// Default SSH connection timeout in seconds
const DEFAULT_TIMEOUT: u64 = 60;

pub const DEFAULT_INSTALL_PREFIX: &str = "/opt/orangefs";
pub const DEFAULT_DB4_PREFIX: &str = "/opt/db4";
pub const DEFAULT_MOUNT_POINT: &str = "/tmp/mount/orangefs";
pub const DEFAULT_FS_NAME: &str = "orangefs";
pub const DEFAULT_BENCHMARKS_URL: &str =
    "http://devorange.clemson.edu/pvfs/benchmarks-20121017.tar.gz";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Pre-existing machines added to the cluster, in order. The first one
    /// is the build node and the head node for tests.
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,

    /// Private key used to reach every node (optional, falls back to the
    /// ssh client's defaults)
    #[serde(default)]
    pub ssh_key: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub connect_timeout: u64,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub tests: TestSelection,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub delays: Delays,
}

/// One machine of the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Address on the internal network
    pub ip_address: String,

    /// Address used by the harness when it differs from the internal one
    #[serde(default)]
    pub ext_ip_address: Option<String>,

    /// Login user
    pub user: String,

    #[serde(default)]
    pub kind: NodeKind,
}

/// How commands reach a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The machine running the harness
    Local,
    /// A reachable machine, accessed over ssh with a key
    #[default]
    Ssh,
    /// A cloud instance, accessed over ssh on its external address
    Cloud,
}

/// Where the OrangeFS source comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Version-control export or checkout
    #[default]
    Svn,
    /// Tarball download
    Tar,
    /// A directory already present on the build node
    BuildNode,
    /// A directory on the harness machine, pushed to the build node first
    Local,
    /// A directory on another node of the cluster
    RemoteDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    None,
    Key,
    Cert,
}

/// Source retrieval and build options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Build from source at all. When false, setup expects an existing install.
    pub build_from_source: bool,
    pub resource_type: ResourceType,
    pub resource_location: String,
    pub svn_username: Option<String>,
    pub svn_password: Option<String>,
    /// Directory on the build node the source is placed under
    pub source_dir: String,
    pub install_prefix: String,
    pub db4_prefix: String,
    pub build_kmod: bool,
    pub enable_strict: bool,
    pub enable_fuse: bool,
    pub enable_shared: bool,
    pub patch_files: Vec<String>,
    pub configure_opts: String,
    pub make_opts: String,
    pub install_opts: String,
    pub install_tests: bool,
    pub benchmarks_url: String,
    pub security_mode: SecurityMode,
    /// Replaces the generated pvfs2-genconfig flags when non-empty
    pub genconfig_opts: String,
    /// Where to copy the generated server configuration, if elsewhere
    pub conf_file: Option<String>,
    pub fs_name: String,
    pub mount_point: String,
    pub debug: bool,
}

/// Which test categories run and where results go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSelection {
    pub sysint: bool,
    pub vfs_kmod: bool,
    pub vfs_fuse: bool,
    pub usrint: bool,
    pub mpiio: bool,
    pub hadoop: bool,
    /// Result log, one PASS/FAIL line per test
    pub log_file: PathBuf,
    /// Directory for the per-test logs
    pub test_log_dir: PathBuf,
    pub start_client_on_all_nodes: bool,
    pub install_mpi: bool,
    pub delete_cloud_nodes_after_test: bool,
}

/// Cloud provisioning settings. Instances are created and destroyed by
/// external commands; see [`crate::network::cloud`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub new_nodes: u32,
    pub image: String,
    pub flavor: String,
    pub user: String,
    /// Prints one `<instance-id> <internal-ip> [<external-ip>]` line per
    /// created instance. `{count}`, `{image}` and `{flavor}` are substituted.
    pub create_command: String,
    /// `{ids}` is replaced with the space separated instance ids.
    pub terminate_command: String,
    /// Run the distro update and reboot on freshly created instances
    pub update_new_nodes: bool,
}

/// Fixed waits after starting services. The harness does not poll for
/// readiness; it sleeps for these durations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub server_start_secs: u64,
    pub mount_secs: u64,
    /// Wait after rebooting an updated cloud instance
    pub reboot_secs: u64,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            ssh_key: None,
            ssh_port: DEFAULT_SSH_PORT,
            connect_timeout: DEFAULT_TIMEOUT,
            build: BuildConfig::default(),
            tests: TestSelection::default(),
            cloud: CloudConfig::default(),
            delays: Delays::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_from_source: true,
            resource_type: ResourceType::Svn,
            resource_location: String::new(),
            svn_username: None,
            svn_password: None,
            source_dir: "/tmp/ofstest".to_string(),
            install_prefix: DEFAULT_INSTALL_PREFIX.to_string(),
            db4_prefix: DEFAULT_DB4_PREFIX.to_string(),
            build_kmod: true,
            enable_strict: false,
            enable_fuse: false,
            enable_shared: false,
            patch_files: Vec::new(),
            configure_opts: String::new(),
            make_opts: String::new(),
            install_opts: String::new(),
            install_tests: true,
            benchmarks_url: DEFAULT_BENCHMARKS_URL.to_string(),
            security_mode: SecurityMode::None,
            genconfig_opts: String::new(),
            conf_file: None,
            fs_name: DEFAULT_FS_NAME.to_string(),
            mount_point: DEFAULT_MOUNT_POINT.to_string(),
            debug: false,
        }
    }
}

impl Default for TestSelection {
    fn default() -> Self {
        Self {
            sysint: true,
            vfs_kmod: true,
            vfs_fuse: false,
            usrint: false,
            mpiio: false,
            hadoop: false,
            log_file: PathBuf::from("ofstest-results.log"),
            test_log_dir: PathBuf::from("."),
            start_client_on_all_nodes: false,
            install_mpi: false,
            delete_cloud_nodes_after_test: false,
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            new_nodes: 0,
            image: String::new(),
            flavor: String::new(),
            user: "ec2-user".to_string(),
            create_command: String::new(),
            terminate_command: String::new(),
            update_new_nodes: true,
        }
    }
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            server_start_secs: 15,
            mount_secs: 30,
            reboot_secs: 180,
        }
    }
}

impl Delays {
    /// No waiting at all, for tests.
    pub fn none() -> Self {
        Self {
            server_start_secs: 0,
            mount_secs: 0,
            reboot_secs: 0,
        }
    }

    pub fn server_start(&self) -> Duration {
        Duration::from_secs(self.server_start_secs)
    }

    pub fn mount(&self) -> Duration {
        Duration::from_secs(self.mount_secs)
    }

    pub fn reboot(&self) -> Duration {
        Duration::from_secs(self.reboot_secs)
    }
}

impl Config {
    /// Returns the default configuration file path for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ofstest").join("config.yml"))
    }

    /// Loads configuration from the default location.
    ///
    /// Returns `Ok(Config::default())` if no config file exists.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Loads configuration from a specific file path.
    ///
    /// Returns `Ok(Config::default())` if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to read config file: {}\n\n\
                     File path: {}\n\n\
                     Suggestions:\n\
                     • Check file permissions: ls -la {}\n\
                     • Try recreating with: ofstest config init",
                    e,
                    path.display(),
                    path.display()
                ),
            ))
        })?;

        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Saves configuration to a specific file path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Returns true if new cloud instances have to be created.
    pub fn wants_new_cloud_nodes(&self) -> bool {
        self.cloud.new_nodes > 0
    }

    /// Expands the SSH key path, replacing ~ with the home directory.
    pub fn expanded_ssh_key(&self) -> Option<PathBuf> {
        self.ssh_key.as_deref().map(expand_home)
    }
}

/// Replaces a leading `~/` with the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl NodeEntry {
    pub fn new(ip_address: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            ext_ip_address: None,
            user: user.into(),
            kind: NodeKind::Ssh,
        }
    }

    pub fn with_ext_ip_address(mut self, address: impl Into<String>) -> Self {
        self.ext_ip_address = Some(address.into());
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// The address the harness connects to.
    pub fn connect_address(&self) -> &str {
        self.ext_ip_address.as_deref().unwrap_or(&self.ip_address)
    }
}
