//! OrangeFS client, kernel module and mounts on a node.
//!
//! Loading the module, starting the client and kernel mounts need root, so
//! they go through the batch path where `sudo` works without a password
//! prompt for the whole script.

use log::{info, warn};

use crate::config::{SecurityMode, DEFAULT_MOUNT_POINT};
use crate::node::Node;

impl Node {
    /// Inserts the pvfs2 kernel module built for the running kernel.
    pub fn install_kernel_module(&mut self) -> i32 {
        self.add_batch(format!(
            "sudo /sbin/insmod {}/lib/modules/{}/kernel/fs/pvfs2/pvfs2.ko &> pvfs2-kernel-module.log",
            self.paths.installation, self.kernel_version
        ));
        self.add_batch("sudo /sbin/lsmod >> pvfs2-kernel-module.log");
        let result = self.flush_batch();
        self.check("Kernel module installation", &result)
    }

    /// Starts pvfs2-client as root.
    pub fn start_client(&mut self, security: SecurityMode) -> i32 {
        let inst = self.paths.installation.clone();
        let keypath = match security {
            SecurityMode::Key => format!(" --keypath={}/etc/pvfs2-clientkey.pem", inst),
            SecurityMode::None | SecurityMode::Cert => String::new(),
        };
        let log_file = format!("{}/pvfs2-client-{}.log", inst, self.paths.branch);

        let start = format!(
            "sudo LD_LIBRARY_PATH={db4}:{inst}/lib PVFS2TAB_FILE={tab} {inst}/sbin/pvfs2-client -p {inst}/sbin/pvfs2-client-core -L {log}{key}",
            db4 = self.paths.db4_lib_dir(),
            inst = inst,
            tab = self.paths.tab_file(),
            log = log_file,
            key = keypath
        );
        info!("Starting pvfs2-client on {}", self.label());
        self.add_batch(start);
        self.add_batch(format!("sudo chmod 644 {}", log_file));
        let result = self.flush_batch();
        self.check("Client start", &result)
    }

    /// Loads the kernel module, then starts the client. A failed module
    /// load is only logged; FUSE mounts work without it.
    pub fn load_and_start_client(&mut self, security: SecurityMode) -> i32 {
        if self.install_kernel_module() != 0 {
            warn!("Continuing without the pvfs2 kernel module on {}", self.label());
        }
        self.start_client(security)
    }

    /// Zero when `mount_point` (or the node's mount point) appears as a
    /// mount point in the mount table. Only whole entries match.
    pub fn check_mount(&self, mount_point: Option<&str>) -> i32 {
        let mount_point = mount_point.unwrap_or(&self.paths.mount_point);
        let result = self.run("mount | awk '{print $3}'");
        if !result.is_success() {
            return result.exit_code;
        }
        if is_mounted(&result.stdout, mount_point) {
            0
        } else {
            1
        }
    }

    /// Mounts the filesystem through the kernel module or FUSE, then waits
    /// the configured mount delay. Already mounted is success and mounts
    /// nothing.
    pub fn mount_filesystem(&mut self, fuse: bool, mount_point: Option<&str>) -> i32 {
        if let Some(mount_point) = mount_point {
            self.paths.mount_point = mount_point.to_string();
        } else if self.paths.mount_point.is_empty() {
            self.paths.mount_point = DEFAULT_MOUNT_POINT.to_string();
        }

        if self.check_mount(None) == 0 {
            info!("OrangeFS already mounted at {}", self.paths.mount_point);
            return 0;
        }

        let mount_point = self.paths.mount_point.clone();
        self.run(&format!("mkdir -p {}", mount_point));

        let spec = format!(
            "tcp://{}:{}/{}",
            self.host_name, self.service.tcp_port, self.service.fs_name
        );
        let result = if fuse {
            info!("Mounting {} at {} via fuse", spec, mount_point);
            self.run(&format!(
                "{}/bin/pvfs2fuse {} -o fs_spec={} -o nonempty",
                self.paths.installation, mount_point, spec
            ))
        } else {
            info!("Mounting {} at {}", spec, mount_point);
            self.run_single_as_batch(format!("sudo mount -t pvfs2 {} {}", spec, mount_point))
        };

        self.wait("the mount", self.delays.mount());
        self.check("Mount", &result)
    }

    pub fn unmount_filesystem(&mut self) -> i32 {
        info!("Unmounting OrangeFS mounted at {}", self.paths.mount_point);
        self.add_batch(format!("sudo umount {}", self.paths.mount_point));
        self.add_batch("sleep 10");
        self.flush_batch().exit_code
    }

    /// Unmounts and kills the client, forcibly if it lingers.
    pub fn stop_client(&mut self) -> i32 {
        self.unmount_filesystem();
        info!("Stopping pvfs2-client on {}", self.label());
        self.add_batch("sudo killall pvfs2-client");
        self.add_batch("sleep 10");
        self.add_batch("sudo killall -s 9 pvfs2-client");
        self.add_batch("sleep 2");
        self.flush_batch().exit_code
    }
}

/// Looks for `mount_point` among the mount points of `mount` output.
fn is_mounted(mount_points: &str, mount_point: &str) -> bool {
    fn normalize(path: &str) -> &str {
        let trimmed = path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }

    if mount_point.trim().is_empty() {
        return false;
    }
    let wanted = normalize(mount_point);
    mount_points
        .lines()
        .filter(|line| !line.trim().is_empty())
        .any(|line| normalize(line) == wanted)
}

#[cfg(test)]
mod tests {
    use crate::config::SecurityMode;
    use crate::node::testing::{node, RecordingRunner};

    #[test]
    fn test_mount_skips_when_already_mounted() {
        let runner = RecordingRunner::new();
        runner.respond("mount | awk", 0, "/\n/proc\n/tmp/mount/orangefs\n");
        let mut node = node(&runner);

        assert_eq!(node.mount_filesystem(false, None), 0);
        assert!(!runner.ran("mount -t pvfs2"));
        assert!(!runner.ran("mkdir -p"));
        assert_eq!(runner.scripts().len(), 1);
    }

    #[test]
    fn test_mount_ignores_lookalike_mount_points() {
        let runner = RecordingRunner::new();
        runner.respond("mount | awk", 0, "/\n/tmp/mount/orangefs-old\n/srv/tmp/mount/orangefs\n");
        let mut node = node(&runner);
        node.paths.mount_point = "/tmp/mount/orangefs".to_string();

        assert_eq!(node.check_mount(None), 1);
        assert_eq!(node.mount_filesystem(false, None), 0);
        assert!(runner.ran("sudo mount -t pvfs2 tcp://node1:3396/orangefs /tmp/mount/orangefs"));
    }

    #[test]
    fn test_check_mount_accepts_trailing_slash() {
        let runner = RecordingRunner::new();
        runner.respond("mount | awk", 0, "/mnt/ofs\n");
        let node = node(&runner);
        assert_eq!(node.check_mount(Some("/mnt/ofs/")), 0);
        assert_eq!(node.check_mount(Some("/mnt")), 1);
        assert_eq!(node.check_mount(Some("")), 1);
    }

    #[test]
    fn test_check_mount_reports_failed_lookup() {
        let runner = RecordingRunner::new();
        runner.respond("mount | awk", 127, "");
        let node = node(&runner);
        assert_eq!(node.check_mount(None), 127);
    }

    #[test]
    fn test_mount_kmod_through_batch() {
        let runner = RecordingRunner::new();
        runner.respond("mount | awk", 0, "/\n/proc\n");
        let mut node = node(&runner);

        assert_eq!(node.mount_filesystem(false, Some("/mnt/ofs")), 0);
        assert!(runner.ran("sudo mount -t pvfs2 tcp://node1:3396/orangefs /mnt/ofs"));
        assert_eq!(node.paths.mount_point, "/mnt/ofs");
        assert!(node.pending_batch().is_empty());
    }

    #[test]
    fn test_mount_fuse() {
        let runner = RecordingRunner::new();
        runner.respond("mount | awk", 0, "/\n/proc\n");
        runner.respond("pvfs2fuse", 1, "");
        let mut node = node(&runner);

        assert_eq!(node.mount_filesystem(true, None), 1);
        assert!(runner.ran(
            "/opt/orangefs/bin/pvfs2fuse /tmp/mount/orangefs -o fs_spec=tcp://node1:3396/orangefs -o nonempty"
        ));
    }

    #[test]
    fn test_start_client_with_key() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.paths.branch = "stable".to_string();
        assert_eq!(node.start_client(SecurityMode::Key), 0);

        let scripts = runner.scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains(
            "sudo LD_LIBRARY_PATH=/opt/db4/lib:/opt/orangefs/lib PVFS2TAB_FILE=/opt/orangefs/etc/orangefstab /opt/orangefs/sbin/pvfs2-client -p /opt/orangefs/sbin/pvfs2-client-core -L /opt/orangefs/pvfs2-client-stable.log --keypath=/opt/orangefs/etc/pvfs2-clientkey.pem"
        ));
        assert!(scripts[0].contains("sudo chmod 644 /opt/orangefs/pvfs2-client-stable.log"));
    }

    #[test]
    fn test_stop_client_unmounts_first() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.paths.mount_point = "/tmp/mount/orangefs".to_string();
        node.stop_client();

        let scripts = runner.scripts();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].contains("sudo umount /tmp/mount/orangefs"));
        assert!(scripts[1].contains("sudo killall -s 9 pvfs2-client"));
    }

    #[test]
    fn test_load_and_start_client_survives_module_failure() {
        let runner = RecordingRunner::new();
        runner.respond("insmod", 1, "");
        let mut node = node(&runner);
        assert_eq!(node.load_and_start_client(SecurityMode::None), 0);
        assert!(runner.ran("pvfs2-client -p"));
    }

    #[test]
    fn test_install_kernel_module() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.kernel_version = "3.2.0-40-virtual".to_string();
        assert_eq!(node.install_kernel_module(), 0);
        assert!(runner.ran("sudo /sbin/insmod /opt/orangefs/lib/modules/3.2.0-40-virtual/kernel/fs/pvfs2/pvfs2.ko"));
    }
}
