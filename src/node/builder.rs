//! Software installation and OrangeFS builds on a node.

use log::{info, warn};

use crate::config::{BuildConfig, ResourceType, SecurityMode};
use crate::node::Node;

const DB4_VERSION: &str = "db-4.8.30";
const DB4_URL: &str = "http://devorange.clemson.edu/pvfs/db-4.8.30.tar.gz";
const OPENMPI_VERSION: &str = "openmpi-1.6.5";
const OPENMPI_URL_BASE: &str = "http://devorange.clemson.edu/pvfs/";

/// tar flags and the directory a tarball extracts to.
pub fn tar_flags(file_name: &str) -> Option<(&'static str, &str)> {
    [(".tar.gz", "zxf"), (".tgz", "zxf"), (".tar.bz2", "jxf"), (".tar", "xf")]
        .iter()
        .find_map(|(ext, flags)| file_name.find(ext).map(|idx| (*flags, &file_name[..idx])))
}

fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

impl Node {
    /// Updates every package and reboots. Always does both, even when the
    /// node is already current.
    pub fn update_node(&mut self) -> i32 {
        for command in self.templates().update.clone() {
            self.add_batch(command);
        }
        let result = self.flush_batch();
        let rc = self.check("System update", &result);

        info!("Node {} at {} updated. Rebooting.", self.label(), self.ip_address);
        self.run_single_as_batch("sudo /sbin/reboot");
        rc
    }

    /// Installs build and test prerequisites for the distribution, then
    /// Berkeley DB under the db4 prefix if it is not there yet.
    pub fn install_required_software(&mut self) -> i32 {
        let prerequisites = self.templates().prerequisites;
        if prerequisites.is_empty() {
            warn!(
                "No prerequisite script for '{}' on {}",
                self.distro.name,
                self.label()
            );
        } else {
            self.add_batch(prerequisites);
        }

        let db4 = self.paths.db4_dir.clone();
        self.add_batch(format!(
            "if [ ! -d {db4} ]\n\
             then\n\
             cd ~\n\
             wget -q {url}\n\
             tar zxf {version}.tar.gz &> /dev/null\n\
             cd {version}/build_unix\n\
             echo \"Configuring Berkeley DB...\"\n\
             ../dist/configure --prefix={db4} &> db4conf.out\n\
             echo \"Building Berkeley DB...\"\n\
             make &> db4make.out\n\
             echo \"Installing Berkeley DB to {db4}...\"\n\
             make install &> db4install.out\n\
             fi",
            db4 = db4,
            url = DB4_URL,
            version = DB4_VERSION
        ));

        let result = self.flush_batch();
        let lib_dir = self.paths.db4_lib_dir();
        self.set_env("LD_LIBRARY_PATH", format!("{}:$LD_LIBRARY_PATH", lib_dir));
        self.check("Prerequisite installation", &result)
    }

    /// Places the OrangeFS source under `dest_dir` and records its location
    /// and branch name.
    pub fn copy_source(
        &mut self,
        resource: ResourceType,
        location: &str,
        dest_dir: &str,
        credentials: Option<(&str, &str)>,
    ) -> i32 {
        let result = self.run(&format!("mkdir -p {}", dest_dir));
        if self.check(&format!("Create {}", dest_dir), &result) != 0 {
            return result.exit_code;
        }

        match resource {
            ResourceType::Svn => self.copy_source_from_svn(location, dest_dir, credentials),
            ResourceType::Tar => self.copy_source_from_tarball(location, dest_dir),
            ResourceType::BuildNode | ResourceType::RemoteDir => {
                self.copy_source_from_directory(location, dest_dir)
            }
            ResourceType::Local => {
                let result = self.push_from_harness(location, dest_dir, true);
                if self.check("Upload source", &result) != 0 {
                    return result.exit_code;
                }
                let pushed = format!("{}/{}", dest_dir.trim_end_matches('/'), base_name(location));
                self.copy_source_from_directory(&pushed, &pushed)
            }
        }
    }

    fn copy_source_from_svn(&mut self, url: &str, dest_dir: &str, credentials: Option<(&str, &str)>) -> i32 {
        self.paths.branch = base_name(url).to_string();

        // export unless we can authenticate, which allows later updates
        let command = match credentials {
            Some((user, password)) if !user.is_empty() && !password.is_empty() => {
                format!("svn co {} --username {} --password {}", url, user, password)
            }
            _ => format!("svn export --force {}", url),
        };

        self.change_directory(dest_dir);
        let result = self.run(&command);
        if self.check("svn export", &result) != 0 {
            return result.exit_code;
        }
        self.paths.source = format!("{}/{}", dest_dir.trim_end_matches('/'), self.paths.branch);
        info!("svn exported to {}", self.paths.source);
        0
    }

    fn copy_source_from_tarball(&mut self, url: &str, dest_dir: &str) -> i32 {
        let tarball = base_name(url);
        let Some((flags, directory)) = tar_flags(tarball) else {
            warn!("{} is not a tarfile", url);
            return 1;
        };

        self.change_directory(dest_dir);
        self.run(&format!("rm -f {}", tarball));
        let result = self.run(&format!("wget {}", url));
        if self.check("Download OrangeFS", &result) != 0 {
            return result.exit_code;
        }
        let result = self.run(&format!("tar {} {}", flags, tarball));
        if self.check("Extract OrangeFS", &result) != 0 {
            return result.exit_code;
        }

        self.paths.branch = directory.to_string();
        self.paths.source = format!("{}/{}", dest_dir.trim_end_matches('/'), directory);
        0
    }

    fn copy_source_from_directory(&mut self, directory: &str, dest_dir: &str) -> i32 {
        let mut rc = 0;
        if directory != dest_dir {
            rc = self.copy_local(&format!("{}/", directory.trim_end_matches('/')), dest_dir, true);
        }
        self.paths.source = dest_dir.to_string();
        self.paths.branch = base_name(dest_dir).to_string();
        rc
    }

    /// Patches, prepares and configures the source tree.
    pub fn configure_source(&mut self, build: &BuildConfig) -> i32 {
        self.change_directory(self.paths.source.clone());

        for patch in &build.patch_files {
            info!("Patching: patch -c -p1 < {}", patch);
            let result = self.run(&format!("patch -c -p1 < {}", patch));
            if !result.is_success() {
                warn!("Patch {} failed, continuing", patch);
            }
        }

        let result = self.run("./prepare");
        if self.check("./prepare", &result) != 0 {
            return result.exit_code;
        }

        let mut prefix = build.install_prefix.clone();
        if self.run(&format!("mkdir -p {}", prefix)).is_success() {
            self.run(&format!("rmdir {}", prefix));
        } else {
            prefix = format!("/home/{}/orangefs", self.current_user);
            warn!(
                "Could not create {}, installing to {} instead",
                build.install_prefix, prefix
            );
        }

        // the kernel may have changed since the last update
        self.kernel_version = self.run_first_line("uname -r");

        let mut options = format!(
            "{} --prefix={} --with-db={}",
            build.configure_opts, prefix, build.db4_prefix
        );
        if build.build_kmod {
            options.push_str(&format!(
                " --with-kernel=/lib/modules/{}/{}",
                self.kernel_version,
                self.templates().kernel_source_subdir
            ));
        }
        if build.enable_strict && self.templates().supports_strict {
            options.push_str(" --enable-strict");
        }
        if build.enable_shared {
            options.push_str(" --enable-shared");
        }
        if build.enable_fuse {
            options.push_str(" --enable-fuse");
        }
        match build.security_mode {
            SecurityMode::None => {}
            SecurityMode::Key => options.push_str(" --enable-security-key"),
            SecurityMode::Cert => options.push_str(" --enable-security-cert"),
        }

        let cflags = if build.debug { "CFLAGS=\"-g -O0\" " } else { "" };
        let result = self.run(&format!("{}./configure {}", cflags, options.trim_start()));
        if self.check("./configure", &result) == 0 {
            self.paths.installation = prefix;
        }
        result.exit_code
    }

    /// Builds the source tree, and the kernel module when requested.
    pub fn make_source(&mut self, make_opts: &str, build_kmod: bool) -> i32 {
        self.change_directory(self.paths.source.clone());
        self.run("make clean");

        let result = self.run(format!("make {}", make_opts).trim_end());
        if self.check("make", &result) != 0 {
            return result.exit_code;
        }

        if build_kmod {
            let result = self.run("make kmod");
            return self.check("make kmod", &result);
        }
        0
    }

    /// Installs the build. `as_root` runs `make install` under sudo in a batch.
    pub fn install_source(&mut self, install_opts: &str, as_root: bool, build_kmod: bool) -> i32 {
        self.change_directory(self.paths.source.clone());

        let install = format!("make install {}", install_opts);
        let result = if as_root {
            self.run_single_as_batch(format!("sudo {}", install.trim_end()))
        } else {
            self.run(install.trim_end())
        };
        if self.check("make install", &result) != 0 {
            return result.exit_code;
        }

        if build_kmod {
            let result = self.run(&format!(
                "make kmod_install kmod_prefix={}",
                self.paths.installation
            ));
            return self.check("make kmod_install", &result);
        }
        0
    }

    /// Builds and installs the test programs shipped with the source.
    pub fn install_tests(&mut self, configure_opts: &str) -> i32 {
        let options = if configure_opts.is_empty() {
            format!(
                "--with-db={} --prefix={}",
                self.paths.db4_dir, self.paths.installation
            )
        } else {
            configure_opts.to_string()
        };

        self.change_directory(format!("{}/test", self.paths.source));
        for (step, command) in [
            ("Configure tests", format!("./configure {}", options)),
            ("Build tests", "make all".to_string()),
            ("Install tests", "make install".to_string()),
        ] {
            let result = self.run(&command);
            if self.check(step, &result) != 0 {
                return result.exit_code;
            }
        }
        0
    }

    /// Downloads and extracts the third party benchmarks.
    pub fn install_benchmarks(&mut self, url: &str, dest_dir: Option<&str>) -> i32 {
        let dest_dir = dest_dir
            .map(str::to_string)
            .unwrap_or_else(|| format!("/home/{}", self.current_user));
        let tarball = base_name(url);
        let Some((flags, _)) = tar_flags(tarball) else {
            warn!("{} is not a tarfile", url);
            return 1;
        };

        info!("Installing benchmarks from {}", url);
        self.run(&format!("mkdir -p {}", dest_dir));
        self.change_directory(dest_dir.clone());
        self.run(&format!("rm -f {}", tarball));

        let result = self.run(&format!("wget {}", url));
        if self.check("Download benchmarks", &result) != 0 {
            return result.exit_code;
        }
        let result = self.run(&format!("tar {} {}", flags, tarball));
        if self.check("Extract benchmarks", &result) != 0 {
            return result.exit_code;
        }

        self.paths.extra_tests = format!("{}/benchmarks", dest_dir.trim_end_matches('/'));
        0
    }

    /// Builds OpenMPI with ROMIO support for OrangeFS.
    pub fn install_openmpi(&mut self, install_location: Option<&str>) -> i32 {
        let install_location = install_location.unwrap_or("/opt/mpi").to_string();
        let url = format!("{}{}-omnibond.tar.gz", OPENMPI_URL_BASE, OPENMPI_VERSION);

        self.run(&format!("mkdir -p {}", install_location));
        self.change_directory(install_location.clone());

        let result = self.run(&format!("wget --quiet {}", url));
        if self.check("Download OpenMPI", &result) != 0 {
            self.restore_directory();
            return result.exit_code;
        }
        self.run(&format!("tar xzf {}-omnibond.tar.gz", OPENMPI_VERSION));
        self.change_directory(format!("{}/{}", install_location, OPENMPI_VERSION));

        let configure = format!(
            "./configure --prefix {}/openmpi --with-io-romio-flags='--with-pvfs2={} --with-file-system=pvfs2+nfs' > openmpiconfig.log",
            install_location, self.paths.installation
        );
        for (step, command) in [
            ("Configure OpenMPI", configure.as_str()),
            ("Build OpenMPI", "make > openmpimake.log"),
            ("Install OpenMPI", "make install > openmpiinstall.log"),
        ] {
            info!("{} on {}", step, self.label());
            let result = self.run(command);
            if self.check(step, &result) != 0 {
                return result.exit_code;
            }
        }

        self.paths.openmpi = Some(format!("{}/openmpi", install_location));
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{node, RecordingRunner};
    use crate::node::Distro;

    #[test]
    fn test_tar_flags() {
        assert_eq!(tar_flags("orangefs-2.8.7.tar.gz"), Some(("zxf", "orangefs-2.8.7")));
        assert_eq!(tar_flags("bench.tgz"), Some(("zxf", "bench")));
        assert_eq!(tar_flags("src.tar.bz2"), Some(("jxf", "src")));
        assert_eq!(tar_flags("plain.tar"), Some(("xf", "plain")));
        assert_eq!(tar_flags("source.zip"), None);
    }

    #[test]
    fn test_copy_source_from_tarball() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        let rc = node.copy_source(
            ResourceType::Tar,
            "http://example.org/orangefs-2.8.7.tar.gz",
            "/tmp/ofstest/",
            None,
        );
        assert_eq!(rc, 0);
        assert!(runner.ran("wget http://example.org/orangefs-2.8.7.tar.gz"));
        assert!(runner.ran("tar zxf orangefs-2.8.7.tar.gz"));
        assert_eq!(node.paths.source, "/tmp/ofstest/orangefs-2.8.7");
        assert_eq!(node.paths.branch, "orangefs-2.8.7");
    }

    #[test]
    fn test_copy_source_rejects_unknown_archive() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        let rc = node.copy_source(ResourceType::Tar, "http://example.org/src.zip", "/tmp/ofstest", None);
        assert_eq!(rc, 1);
        assert!(!runner.ran("wget"));
    }

    #[test]
    fn test_copy_source_svn_uses_checkout_with_credentials() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        let url = "http://orangefs.org/svn/orangefs/branches/stable";

        node.copy_source(ResourceType::Svn, url, "/tmp/ofstest", None);
        assert!(runner.ran("svn export --force http://orangefs.org/svn/orangefs/branches/stable"));
        assert_eq!(node.paths.source, "/tmp/ofstest/stable");

        node.copy_source(ResourceType::Svn, url, "/tmp/ofstest", Some(("bot", "secret")));
        assert!(runner.ran("svn co http://orangefs.org/svn/orangefs/branches/stable --username bot --password secret"));
    }

    #[test]
    fn test_copy_source_download_failure_stops() {
        let runner = RecordingRunner::new();
        runner.respond("wget", 8, "");
        let mut node = node(&runner);
        let rc = node.copy_source(ResourceType::Tar, "http://example.org/o.tar.gz", "/tmp/ofstest", None);
        assert_eq!(rc, 8);
        assert!(!runner.ran("tar zxf"));
        assert!(node.paths.source.is_empty());
    }

    #[test]
    fn test_copy_source_from_build_node_directory() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.copy_source(ResourceType::BuildNode, "/home/tester/orangefs", "/tmp/ofstest/src", None);
        assert!(runner.ran("rsync -a /home/tester/orangefs/ /tmp/ofstest/src"));
        assert_eq!(node.paths.source, "/tmp/ofstest/src");
        assert_eq!(node.paths.branch, "src");
    }

    #[test]
    fn test_configure_source_flags() {
        let runner = RecordingRunner::new();
        runner.respond("uname -r", 0, "3.0.13-0.27-default\n");
        let mut node = node(&runner);
        node.set_distro(Distro::detect("SUSE Linux Enterprise Server 11"));
        node.paths.source = "/tmp/ofstest/stable".to_string();

        let build = BuildConfig {
            enable_strict: true,
            enable_fuse: true,
            security_mode: SecurityMode::Key,
            patch_files: vec!["/tmp/fix.patch".to_string()],
            ..BuildConfig::default()
        };
        assert_eq!(node.configure_source(&build), 0);

        assert!(runner.ran("patch -c -p1 < /tmp/fix.patch"));
        assert!(runner.ran(
            "./configure --prefix=/opt/orangefs --with-db=/opt/db4 \
             --with-kernel=/lib/modules/3.0.13-0.27-default/source \
             --enable-strict --enable-fuse --enable-security-key"
        ));
        assert_eq!(node.paths.installation, "/opt/orangefs");
    }

    #[test]
    fn test_configure_source_falls_back_to_home_prefix() {
        let runner = RecordingRunner::new();
        runner.respond("mkdir -p /opt/orangefs", 1, "");
        let mut node = node(&runner);
        node.paths.source = "/tmp/ofstest/stable".to_string();

        let build = BuildConfig {
            build_kmod: false,
            ..BuildConfig::default()
        };
        assert_eq!(node.configure_source(&build), 0);
        assert!(runner.ran("--prefix=/home/tester/orangefs"));
        assert_eq!(node.paths.installation, "/home/tester/orangefs");
    }

    #[test]
    fn test_configure_source_stops_when_prepare_fails() {
        let runner = RecordingRunner::new();
        runner.respond("./prepare", 2, "");
        let mut node = node(&runner);
        let build = BuildConfig::default();
        assert_eq!(node.configure_source(&build), 2);
        assert!(!runner.ran("./configure"));
    }

    #[test]
    fn test_make_source_stops_on_failure() {
        let runner = RecordingRunner::new();
        runner.respond("make -j4", 2, "");
        let mut node = node(&runner);
        assert_eq!(node.make_source("-j4", true), 2);
        assert!(runner.ran("make clean"));
        assert!(!runner.ran("make kmod"));
    }

    #[test]
    fn test_install_source_as_root_uses_batch() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        assert_eq!(node.install_source("", true, true), 0);
        assert!(runner.ran("sudo make install"));
        assert!(runner.ran("make kmod_install kmod_prefix=/opt/orangefs"));
    }

    #[test]
    fn test_install_required_software_sets_library_path() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.set_distro(Distro::detect("CentOS release 6.4 (Final)"));
        assert_eq!(node.install_required_software(), 0);

        let scripts = runner.scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("sudo yum -y install gcc"));
        assert!(scripts[0].contains("--prefix=/opt/db4"));
        assert_eq!(node.env("LD_LIBRARY_PATH"), Some("/opt/db4/lib:$LD_LIBRARY_PATH"));
    }

    #[test]
    fn test_update_node_always_reboots() {
        let runner = RecordingRunner::new();
        runner.respond("apt-get", 100, "");
        let mut node = node(&runner);
        node.set_distro(Distro::detect("Ubuntu 12.04.2 LTS"));
        assert_eq!(node.update_node(), 100);
        assert!(runner.ran("sudo /sbin/reboot"));
    }

    #[test]
    fn test_install_benchmarks() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        let rc = node.install_benchmarks("http://example.org/benchmarks-20121017.tar.gz", None);
        assert_eq!(rc, 0);
        assert_eq!(node.paths.extra_tests, "/home/tester/benchmarks");
    }

    #[test]
    fn test_install_openmpi() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        assert_eq!(node.install_openmpi(None), 0);
        assert!(runner.ran("--with-pvfs2=/opt/orangefs"));
        assert_eq!(node.paths.openmpi.as_deref(), Some("/opt/mpi/openmpi"));
    }
}
