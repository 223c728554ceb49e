//! OrangeFS server configuration and lifecycle on a node.

use log::{info, warn};

use crate::config::{SecurityMode, DEFAULT_MOUNT_POINT};
use crate::node::Node;

impl Node {
    /// Generates the server configuration with pvfs2-genconfig for the
    /// given server host names, then reads the filesystem name back from it.
    ///
    /// Non-empty `genconfig_opts` replace the generated host, storage and
    /// security flags. When `conf_file` is given the configuration is also
    /// copied there; if that copy fails the generated file is used.
    pub fn configure_server(
        &mut self,
        hosts: &[String],
        fs_name: &str,
        genconfig_opts: &str,
        conf_file: Option<&str>,
        security: SecurityMode,
    ) -> i32 {
        self.service.fs_name = fs_name.to_string();
        let installation = self.paths.installation.clone();
        self.change_directory(installation.clone());
        if self.paths.storage.is_empty() {
            self.paths.storage = format!("{}/data", installation);
        }

        let port = self.service.tcp_port;
        let host_spec = hosts
            .iter()
            .map(|host| format!("{}:{}", host, port))
            .collect::<Vec<_>>()
            .join(",");

        let security_args = match security {
            SecurityMode::None => String::new(),
            SecurityMode::Key => {
                info!("Configuring key based security");
                format!(
                    " --securitykey --serverkey={0}/etc/orangefs-serverkey.pem --keystore={0}/etc/orangefs-keystore",
                    installation
                )
            }
            SecurityMode::Cert => {
                warn!("Certificate based security is not supported, configuring without security");
                String::new()
            }
        };

        let generated = format!("{}/etc/orangefs.conf", installation);
        let genconfig = if genconfig_opts.is_empty() {
            format!(
                "{inst}/bin/pvfs2-genconfig {conf} --protocol tcp --iospec=\"{hosts}\" --metaspec=\"{hosts}\" --storage={storage}{security} --logfile={inst}/pvfs2-server-{branch}.log --quiet",
                inst = installation,
                conf = generated,
                hosts = host_spec,
                storage = self.paths.storage,
                security = security_args,
                branch = self.paths.branch
            )
        } else {
            format!(
                "{}/bin/pvfs2-genconfig {} {} --quiet",
                installation, generated, genconfig_opts
            )
        };

        self.run(&format!("mkdir -p {}/etc", installation));
        info!("Generating orangefs.conf: {}", genconfig);
        let result = self.run(&genconfig);
        if self.check("pvfs2-genconfig", &result) != 0 {
            return result.exit_code;
        }

        self.paths.conf_file = Some(generated.clone());
        if let Some(target) = conf_file {
            if self.copy_local(&generated, target, false) == 0 {
                self.paths.conf_file = Some(target.to_string());
            } else {
                warn!("Could not copy orangefs.conf to {}, using {}", target, generated);
            }
        }

        let name = self.run_first_line(&format!(
            "grep Name {} | awk '{{print $2}}'",
            self.paths.conf_file_or_default()
        ));
        if !name.trim().is_empty() {
            self.service.fs_name = name.trim().to_string();
        }
        0
    }

    /// Server aliases listed in the configuration file.
    pub fn aliases_from_conf_file(&self) -> Vec<String> {
        let conf = self.paths.conf_file_or_default();
        self.run(&format!("grep 'Alias ' {} | awk '{{print $2}}'", conf))
            .stdout
            .lines()
            .map(str::trim)
            .filter(|alias| !alias.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn server_command(&self, mode: &str, alias: &str) -> String {
        let inst = &self.paths.installation;
        format!(
            "{inst}/sbin/pvfs2-server -p {inst}/pvfs2-server-{host}.pid {mode}{conf} -a {alias}",
            inst = inst,
            host = self.host_name,
            mode = mode,
            conf = self.paths.conf_file_or_default(),
            alias = alias
        )
    }

    /// Starts a server for every alias of this host.
    ///
    /// Storage is created first; if that fails the storage is removed and
    /// created once more. After each start the node waits the configured
    /// server delay. Then the client mount table is written and exported
    /// as `PVFS2TAB_FILE`.
    pub fn start_server(&mut self, run_as_root: bool) -> i32 {
        let installation = self.paths.installation.clone();
        self.change_directory(installation.clone());

        if self.service.aliases.is_none() {
            self.service.aliases = Some(self.aliases_from_conf_file());
        }
        let aliases = self.service.aliases.clone().unwrap_or_default();
        if aliases.is_empty() {
            warn!(
                "Could not find any aliases in {}",
                self.paths.conf_file_or_default()
            );
            return -1;
        }

        let local_aliases: Vec<String> = aliases
            .into_iter()
            .filter(|alias| alias.contains(self.host_name.as_str()))
            .collect();

        info!("Starting OrangeFS servers on {}", self.label());
        for alias in &local_aliases {
            let result = self.run(&self.server_command("-f ", alias));
            if !result.is_success() {
                // the storage may already exist
                self.run(&self.server_command("-r ", alias));
                let retry = self.run(&self.server_command("-f ", alias));
                if self.check("Create storage space", &retry) != 0 {
                    return retry.exit_code;
                }
            }

            let prefix = if run_as_root {
                format!(
                    "sudo LD_LIBRARY_PATH={}:{}/lib ",
                    self.paths.db4_lib_dir(),
                    installation
                )
            } else {
                String::new()
            };
            let start = format!("{}{}", prefix, self.server_command("", alias));
            let result = self.run_single_as_batch(start);
            let rc = self.check(&format!("Start server {}", alias), &result);
            if rc != 0 {
                return rc;
            }
            self.wait("the OrangeFS server", self.delays.server_start());
        }

        if self.paths.mount_point.is_empty() {
            self.paths.mount_point = DEFAULT_MOUNT_POINT.to_string();
        }
        let tab_file = self.paths.tab_file();
        let result = self.run(&format!(
            "mkdir -p {mnt} {inst}/etc && echo \"tcp://{host}:{port}/{fs} {mnt} pvfs2 defaults 0 0\" > {tab}",
            mnt = self.paths.mount_point,
            inst = installation,
            host = self.host_name,
            port = self.service.tcp_port,
            fs = self.service.fs_name,
            tab = tab_file
        ));
        let rc = self.check("Write client mount table", &result);
        if rc != 0 {
            return rc;
        }
        self.set_env("PVFS2TAB_FILE", tab_file);

        self.run(&format!(
            "{}/bin/pvfs2-set-debugmask -m {} \"all\"",
            installation, self.paths.mount_point
        ));
        0
    }

    pub fn stop_server(&self) -> i32 {
        self.run("killall -s 9 pvfs2-server").exit_code
    }

    /// Creates this node's server and client keys for key based security.
    pub fn generate_security_keys(&self) -> i32 {
        let etc = format!("{}/etc", self.paths.installation);
        let result = self.run(&format!(
            "mkdir -p {etc} && openssl genrsa -out {etc}/orangefs-serverkey.pem 2048 && openssl genrsa -out {etc}/pvfs2-clientkey.pem 1024 && chmod 600 {etc}/orangefs-serverkey.pem {etc}/pvfs2-clientkey.pem",
            etc = etc
        ));
        self.check("Generate security keys", &result)
    }

    /// Keystore entries for this node's server aliases and client.
    pub fn keystore_entries(&self) -> String {
        let etc = format!("{}/etc", self.paths.installation);
        let mut entries = Vec::new();
        for alias in self.service.aliases.iter().flatten() {
            if alias.contains(self.host_name.as_str()) {
                entries.push(format!("echo S:{}", alias));
                entries.push(format!("openssl rsa -in {}/orangefs-serverkey.pem -pubout", etc));
            }
        }
        entries.push(format!("echo C:{}", self.host_name));
        entries.push(format!("openssl rsa -in {}/pvfs2-clientkey.pem -pubout", etc));
        entries.join("; ")
    }

    /// Learns the installation from a running server process.
    pub fn find_existing_installation(&mut self) -> i32 {
        let ps = |column: u8| {
            format!(
                "ps -f --no-heading -C pvfs2-server | awk '{{print ${}}}'",
                column
            )
        };

        let server = self.run_first_line(&ps(8));
        if server.trim().is_empty() {
            warn!("No pvfs2-server process found on {}", self.label());
            return 1;
        }
        // <installation>/sbin/pvfs2-server
        let installation = server
            .trim()
            .rsplitn(3, '/')
            .nth(2)
            .unwrap_or_default()
            .to_string();
        self.paths.installation = installation.clone();

        let conf = self.run_first_line(&ps(11)).trim().to_string();
        self.paths.conf_file = Some(conf.clone());
        let alias = self.run_first_line(&ps(13)).trim().to_string();
        self.service.aliases = Some(vec![alias.clone()]);

        let url_base = self
            .run_first_line(&format!(
                "grep {} {} | grep tcp: | awk '{{print $3}}'",
                alias, conf
            ))
            .trim()
            .to_string();
        let fs_name = self.run_first_line(&format!("grep Name {} | awk '{{print $2}}'", conf));
        if !fs_name.trim().is_empty() {
            self.service.fs_name = fs_name.trim().to_string();
        }

        let mount = self.run("mount | grep pvfs2 | awk '{print $3}'");
        self.paths.mount_point = match mount.first_line().trim() {
            mount_point if mount.is_success() && !mount_point.is_empty() => mount_point.to_string(),
            _ => {
                info!("OrangeFS mount point not detected. Trying {}", DEFAULT_MOUNT_POINT);
                DEFAULT_MOUNT_POINT.to_string()
            }
        };

        let needle = format!(
            "{}/{}\\s{}",
            url_base, self.service.fs_name, self.paths.mount_point
        );
        for root in [installation.as_str(), "/etc"] {
            let found = self.run(&format!("grep -l -r '{}' {} 2> /dev/null", needle, root));
            if found.is_success() && !found.first_line().trim().is_empty() {
                self.set_env("PVFS2TAB_FILE", found.first_line().trim());
                break;
            }
        }
        0
    }

    /// Copies the installation tree to `destination`, which then shares the
    /// installation prefix, branch and configuration file.
    pub fn copy_installation_to(&self, destination: &mut Node) -> i32 {
        let installation = &self.paths.installation;
        let rc = self.copy_to_node(&format!("{}/", installation), destination, installation, true);
        destination.paths.installation = installation.clone();
        destination.paths.branch = self.paths.branch.clone();
        destination.paths.conf_file = self.paths.conf_file.clone();
        rc
    }
}
