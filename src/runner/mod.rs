//! Test categories and the test run.
//!
//! A run walks the enabled categories in a fixed order. Each category first
//! brings the head node into the state its tests need (client running or
//! stopped, filesystem mounted through the kernel module or FUSE). When
//! that fails, every test of the category is recorded with
//! [`PRECONDITION_FAILED_RC`] and none of them is called. Otherwise the
//! tests run in order; a test that errors or panics is recorded with
//! [`CAUGHT_ERROR_RC`] and the next test runs.

pub mod log;

use ::log::{error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::config::{Config, SecurityMode, TestSelection};
use crate::error::Result;
use crate::network::NetworkOrchestrator;
use crate::node::{CommandResult, Node};
use crate::suites;

pub use self::log::{format_outcome, write_test_log, ResultLog};

/// Status logged for tests whose category could not be prepared.
pub const PRECONDITION_FAILED_RC: i32 = -999;

/// Status logged for tests that returned an error or panicked.
pub const CAUGHT_ERROR_RC: i32 = -99;

/// A test function. It records the last command it ran in the
/// `CommandResult` so the per-test log can show it.
pub type TestFn = Box<dyn Fn(&mut Node, &mut CommandResult) -> anyhow::Result<i32>>;

pub struct NamedTest {
    pub name: String,
    pub func: TestFn,
}

impl NamedTest {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Node, &mut CommandResult) -> anyhow::Result<i32> + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl std::fmt::Debug for NamedTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedTest").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Sysint,
    VfsKmod,
    VfsFuse,
    Usrint,
    Mpiio,
    Hadoop,
}

/// Whether a category's head node state was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    Met,
    Failed(String),
}

impl Category {
    /// Run order.
    pub const ALL: [Category; 6] = [
        Category::Sysint,
        Category::VfsKmod,
        Category::VfsFuse,
        Category::Usrint,
        Category::Mpiio,
        Category::Hadoop,
    ];

    /// Prefix of the per-test log files.
    pub fn name(self) -> &'static str {
        match self {
            Category::Sysint => "sysint",
            Category::VfsKmod => "vfs-kmod",
            Category::VfsFuse => "vfs-fuse",
            Category::Usrint => "usrint",
            Category::Mpiio => "mpiio",
            Category::Hadoop => "hadoop",
        }
    }

    /// Section header in the result log.
    pub fn title(self) -> &'static str {
        match self {
            Category::Sysint => "Sysint Tests",
            Category::VfsKmod => "VFS Tests (kmod)",
            Category::VfsFuse => "VFS Tests (fuse)",
            Category::Usrint => "Usrint Tests",
            Category::Mpiio => "MPI-IO Tests",
            Category::Hadoop => "Hadoop Tests",
        }
    }

    pub fn enabled(self, selection: &TestSelection) -> bool {
        match self {
            Category::Sysint => selection.sysint,
            Category::VfsKmod => selection.vfs_kmod,
            Category::VfsFuse => selection.vfs_fuse,
            Category::Usrint => selection.usrint,
            Category::Mpiio => selection.mpiio,
            Category::Hadoop => selection.hadoop,
        }
    }

    /// The category's tests, in run order.
    pub fn tests(self) -> Vec<NamedTest> {
        match self {
            Category::Sysint => suites::sysint::tests(),
            Category::VfsKmod | Category::VfsFuse => suites::vfs::tests(),
            Category::Usrint => suites::usrint::tests(),
            Category::Mpiio => suites::mpiio::tests(),
            Category::Hadoop => suites::hadoop::tests(),
        }
    }

    /// Brings the head node into the state the category's tests need.
    pub fn prepare(self, head: &mut Node, security: SecurityMode) -> Precondition {
        match self {
            Category::Sysint => {
                if head.load_and_start_client(security) != 0 {
                    warn!("Client did not start on {}, running sysint tests anyway", head.label());
                }
                Precondition::Met
            }
            Category::VfsKmod => {
                head.load_and_start_client(security);
                Self::remount(head, false)
            }
            Category::VfsFuse => Self::remount(head, true),
            Category::Usrint | Category::Mpiio | Category::Hadoop => {
                head.unmount_filesystem();
                head.stop_client();
                Precondition::Met
            }
        }
    }

    fn remount(head: &mut Node, fuse: bool) -> Precondition {
        head.unmount_filesystem();
        head.mount_filesystem(fuse, None);
        // the mount status alone gives false positives
        if head.check_mount(None) == 0 {
            Precondition::Met
        } else {
            Precondition::Failed("Mount failed.".to_string())
        }
    }
}

/// What a single test invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestRun {
    Ok(i32),
    Caught(String),
}

impl TestRun {
    pub fn rc(&self) -> i32 {
        match self {
            TestRun::Ok(rc) => *rc,
            TestRun::Caught(_) => CAUGHT_ERROR_RC,
        }
    }
}

/// One line of the result log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub category: String,
    pub name: String,
    pub run: TestRun,
}

impl TestOutcome {
    pub fn rc(&self) -> i32 {
        self.run.rc()
    }

    pub fn passed(&self) -> bool {
        self.rc() == 0
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked".to_string()
    }
}

/// Runs test categories against the head node and records the results.
pub struct TestRunner {
    selection: TestSelection,
    security: SecurityMode,
    log: ResultLog,
    test_log_dir: PathBuf,
    outcomes: Vec<TestOutcome>,
}

impl TestRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            selection: config.tests.clone(),
            security: config.build.security_mode,
            log: ResultLog::new(config.tests.log_file.clone()),
            test_log_dir: config.tests.test_log_dir.clone(),
            outcomes: Vec::new(),
        }
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    pub fn log_path(&self) -> &std::path::Path {
        self.log.path()
    }

    /// Points the head node's library paths at db4 and the installation,
    /// moves it home and starts a fresh result log.
    pub fn begin(&mut self, head: &mut Node) -> Result<()> {
        let libs = format!("{}:{}/lib", head.paths.db4_lib_dir(), head.paths.installation);
        head.set_env("LD_LIBRARY_PATH", libs.clone());
        head.set_env("LIBRARY_PATH", libs);
        head.change_directory("~");
        self.log.header("Running OrangeFS Tests")
    }

    /// Prepares the head node for `category`, then runs `tests`, or records
    /// them all as failed when the preparation fails.
    pub fn run_category(&mut self, head: &mut Node, category: Category, tests: &[NamedTest]) -> Result<()> {
        info!("Preparing {} on {}", category.title(), head.label());
        match category.prepare(head, self.security) {
            Precondition::Met => {
                self.log.header(category.title())?;
                self.run_tests(head, category.name(), tests)
            }
            Precondition::Failed(reason) => {
                error!("{} could not run: {}", category.title(), reason);
                self.log
                    .header(&format!("{} could not run. {}", category.title(), reason))?;
                for test in tests {
                    self.record(category.name(), &test.name, TestRun::Ok(PRECONDITION_FAILED_RC))?;
                }
                Ok(())
            }
        }
    }

    /// Runs `tests` in order. Errors and panics inside a test are recorded
    /// and never stop the remaining tests.
    pub fn run_tests(&mut self, head: &mut Node, category: &str, tests: &[NamedTest]) -> Result<()> {
        for test in tests {
            let run = self.run_one(head, category, test);
            self.record(category, &test.name, run)?;
        }
        Ok(())
    }

    /// Calls one test and writes its per-test log.
    pub fn run_one(&self, head: &mut Node, category: &str, test: &NamedTest) -> TestRun {
        info!("Running test {}-{}", category, test.name);
        let mut last = CommandResult::default();
        let run = match panic::catch_unwind(AssertUnwindSafe(|| (test.func)(head, &mut last))) {
            Ok(Ok(rc)) => TestRun::Ok(rc),
            Ok(Err(e)) => {
                error!("Test {}-{} failed with an error: {:#}", category, test.name, e);
                TestRun::Caught(format!("{:#}", e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Test {}-{} panicked: {}", category, test.name, message);
                TestRun::Caught(message)
            }
        };
        // a test that stopped early must not hand its batch to the next one
        head.discard_batch();

        let path = self
            .test_log_dir
            .join(format!("{}-{}.log", category, test.name));
        if let Err(e) = write_test_log(&path, &last, run.rc()) {
            warn!("Could not write {}: {}", path.display(), e);
        }
        run
    }

    fn record(&mut self, category: &str, name: &str, run: TestRun) -> Result<()> {
        self.log.outcome(name, run.rc())?;
        self.outcomes.push(TestOutcome {
            category: category.to_string(),
            name: name.to_string(),
            run,
        });
        Ok(())
    }

    /// Runs every enabled category on the head node, then terminates the
    /// cloud nodes if the configuration asks for it.
    pub fn run(&mut self, network: &mut NetworkOrchestrator) -> Result<()> {
        let head = network.head_node_mut()?;
        self.begin(head)?;
        for category in Category::ALL {
            if !category.enabled(&self.selection) {
                continue;
            }
            let tests = category.tests();
            self.run_category(head, category, &tests)?;
        }

        if self.selection.delete_cloud_nodes_after_test {
            info!("Terminating cloud nodes");
            network.terminate_cloud_nodes()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{node, RecordingRunner};
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn runner_in(dir: &TempDir) -> TestRunner {
        let mut config = Config::default();
        config.tests.log_file = dir.path().join("results.log");
        config.tests.test_log_dir = dir.path().to_path_buf();
        TestRunner::new(&config)
    }

    fn counting(name: &str, calls: &Rc<Cell<usize>>, rc: i32) -> NamedTest {
        let calls = calls.clone();
        NamedTest::new(name, move |_node, _last| {
            calls.set(calls.get() + 1);
            Ok(rc)
        })
    }

    #[test]
    fn test_mount_failure_fans_out_sentinel() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.respond("mount | awk", 0, "/\n/proc\n");
        let mut head = node(&runner);

        let calls = Rc::new(Cell::new(0));
        let tests = vec![counting("mkdir", &calls, 0), counting("ls", &calls, 0)];
        let mut test_runner = runner_in(&dir);
        test_runner.begin(&mut head).unwrap();
        test_runner
            .run_category(&mut head, Category::VfsKmod, &tests)
            .unwrap();

        assert_eq!(calls.get(), 0);
        let contents = fs::read_to_string(dir.path().join("results.log")).unwrap();
        assert!(contents.contains("VFS Tests (kmod) could not run. Mount failed."));
        assert!(contents.contains("mkdir........................................FAIL: RC = -999\n"));
        assert!(contents.contains("ls........................................FAIL: RC = -999\n"));
        assert_eq!(test_runner.failures(), 2);
    }

    #[test]
    fn test_fuse_category_runs_when_mounted() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.respond_once("mount | awk", 0, "/\n");
        runner.respond("mount | awk", 0, "/\n/tmp/mount/orangefs\n");
        let mut head = node(&runner);
        head.paths.mount_point = "/tmp/mount/orangefs".to_string();

        let calls = Rc::new(Cell::new(0));
        let tests = vec![counting("cp", &calls, 0)];
        let mut test_runner = runner_in(&dir);
        test_runner.begin(&mut head).unwrap();
        test_runner
            .run_category(&mut head, Category::VfsFuse, &tests)
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert!(runner.ran("pvfs2fuse /tmp/mount/orangefs"));
        assert!(!runner.ran("pvfs2-client -p"));
        let contents = fs::read_to_string(dir.path().join("results.log")).unwrap();
        assert!(contents.contains("VFS Tests (fuse) ==="));
    }

    #[test]
    fn test_error_and_panic_do_not_stop_suite() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let mut head = node(&runner);

        let calls = Rc::new(Cell::new(0));
        let tests = vec![
            counting("first", &calls, 0),
            NamedTest::new("raises", |_node, _last| anyhow::bail!("pvfs2-ls not found")),
            NamedTest::new("panics", |_node, _last| panic!("index out of range")),
            counting("last", &calls, 3),
        ];
        let mut test_runner = runner_in(&dir);
        test_runner.begin(&mut head).unwrap();
        test_runner.run_tests(&mut head, "sysint", &tests).unwrap();

        assert_eq!(calls.get(), 2);
        let lines: Vec<String> = fs::read_to_string(dir.path().join("results.log"))
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                format_outcome("first", 0),
                format_outcome("raises", CAUGHT_ERROR_RC),
                format_outcome("panics", CAUGHT_ERROR_RC),
                format_outcome("last", 3),
            ]
        );
        assert_eq!(
            test_runner.outcomes()[1].run,
            TestRun::Caught("pvfs2-ls not found".to_string())
        );
    }

    #[test]
    fn test_batch_left_by_failed_test_is_not_run_later() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let mut head = node(&runner);

        let tests = vec![
            NamedTest::new("queues", |node, _last| {
                node.add_batch("touch /tmp/stale-marker");
                anyhow::bail!("gave up before flushing")
            }),
            NamedTest::new("flushes", |node, last| {
                *last = node.run_single_as_batch("true");
                Ok(last.exit_code)
            }),
        ];
        let mut test_runner = runner_in(&dir);
        test_runner.begin(&mut head).unwrap();
        test_runner.run_tests(&mut head, "vfs", &tests).unwrap();

        assert!(!runner.ran("touch /tmp/stale-marker"));
        assert!(head.pending_batch().is_empty());
        assert!(test_runner.outcomes()[1].passed());
    }

    #[test]
    fn test_per_test_log_records_last_command() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.respond("pvfs2-ping", 0, "ok\n");
        let mut head = node(&runner);

        let test = NamedTest::new("ping", |node, last| {
            *last = node.run("pvfs2-ping -m /tmp/mount/orangefs");
            Ok(last.exit_code)
        });
        let test_runner = runner_in(&dir);
        assert_eq!(test_runner.run_one(&mut head, "sysint", &test), TestRun::Ok(0));

        let contents = fs::read_to_string(dir.path().join("sysint-ping.log")).unwrap();
        assert!(contents.starts_with("COMMAND:"));
        assert!(contents.contains("RC: 0\nSTDOUT:ok\n"));
    }

    #[test]
    fn test_begin_sets_library_paths() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let mut head = node(&runner);
        head.change_directory("/opt/orangefs");

        runner_in(&dir).begin(&mut head).unwrap();
        assert_eq!(head.env("LD_LIBRARY_PATH"), Some("/opt/db4/lib:/opt/orangefs/lib"));
        assert_eq!(head.env("LIBRARY_PATH"), Some("/opt/db4/lib:/opt/orangefs/lib"));
        assert_eq!(head.working_directory(), "~");
    }

    #[test]
    fn test_usrint_stops_client_first() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let mut head = node(&runner);
        let mut test_runner = runner_in(&dir);
        test_runner.begin(&mut head).unwrap();
        test_runner
            .run_category(&mut head, Category::Usrint, &[])
            .unwrap();
        assert!(runner.ran("sudo killall pvfs2-client"));
        let contents = fs::read_to_string(dir.path().join("results.log")).unwrap();
        assert!(contents.ends_with("Usrint Tests ==================================================\n"));
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::VfsKmod.name(), "vfs-kmod");
        assert_eq!(Category::Mpiio.title(), "MPI-IO Tests");
        let selection = TestSelection::default();
        let enabled: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| c.enabled(&selection))
            .collect();
        assert_eq!(enabled, vec![Category::Sysint, Category::VfsKmod]);
    }
}
