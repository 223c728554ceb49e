//! System interface tests, driven through the pvfs2 administration tools.
//! They reach the servers through `PVFS2TAB_FILE` and need no mount.

use anyhow::Result;

use super::{expect_output, ofs_bin, on_mount, run, run_all};
use crate::node::{CommandResult, Node};
use crate::runner::NamedTest;

const DIR: &str = "sysint-dir";

pub fn tests() -> Vec<NamedTest> {
    vec![
        NamedTest::new("ping", ping),
        NamedTest::new("statfs", statfs),
        NamedTest::new("mkdir", mkdir),
        NamedTest::new("touch", touch),
        NamedTest::new("cp", cp),
        NamedTest::new("ls", ls),
        NamedTest::new("stat", stat),
        NamedTest::new("rm", rm),
    ]
}

fn ping(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!("{} -m {}", ofs_bin(node, "pvfs2-ping"), node.paths.mount_point);
    Ok(run(node, last, &command))
}

fn statfs(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!("{} -m {}", ofs_bin(node, "pvfs2-statfs"), node.paths.mount_point);
    Ok(run(node, last, &command))
}

fn mkdir(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!("{} {}", ofs_bin(node, "pvfs2-mkdir"), on_mount(node, DIR));
    Ok(run(node, last, &command))
}

fn touch(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = on_mount(node, &format!("{}/touched", DIR));
    let command = format!("{} {}", ofs_bin(node, "pvfs2-touch"), file);
    Ok(run(node, last, &command))
}

/// Copies a file in and back out and compares the two.
fn cp(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let remote = on_mount(node, &format!("{}/services", DIR));
    let copy = ofs_bin(node, "pvfs2-cp");
    let commands = [
        format!("{} -t /etc/services {}", copy, remote),
        format!("{} -t {} /tmp/sysint-services", copy, remote),
        "cmp /etc/services /tmp/sysint-services".to_string(),
    ];
    Ok(run_all(node, last, &commands))
}

fn ls(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!("{} {}", ofs_bin(node, "pvfs2-ls"), on_mount(node, DIR));
    let rc = run(node, last, &command);
    if rc != 0 {
        return Ok(rc);
    }
    Ok(expect_output(last, "services"))
}

fn stat(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = on_mount(node, &format!("{}/services", DIR));
    let command = format!("{} {}", ofs_bin(node, "pvfs2-stat"), file);
    Ok(run(node, last, &command))
}

fn rm(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let remove = ofs_bin(node, "pvfs2-rm");
    let commands = [
        format!("{} {}", remove, on_mount(node, &format!("{}/services", DIR))),
        format!("{} {}", remove, on_mount(node, &format!("{}/touched", DIR))),
        format!("{} {}", remove, on_mount(node, DIR)),
    ];
    Ok(run_all(node, last, &commands))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{node, RecordingRunner};

    #[test]
    fn test_ping_uses_installed_tool() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.paths.mount_point = "/tmp/mount/orangefs".to_string();
        let mut last = CommandResult::default();

        assert_eq!(ping(&mut node, &mut last).unwrap(), 0);
        assert!(last.command_line.contains("/opt/orangefs/bin/pvfs2-ping -m /tmp/mount/orangefs"));
    }

    #[test]
    fn test_ls_requires_copied_file() {
        let runner = RecordingRunner::new();
        runner.respond_once("pvfs2-ls", 0, "touched\n");
        runner.respond("pvfs2-ls", 0, "services\ntouched\n");
        let mut node = node(&runner);
        let mut last = CommandResult::default();

        assert_eq!(ls(&mut node, &mut last).unwrap(), 1);
        assert_eq!(ls(&mut node, &mut last).unwrap(), 0);
    }

    #[test]
    fn test_cp_stops_at_first_failure() {
        let runner = RecordingRunner::new();
        runner.respond("-t /etc/services", 2, "");
        let mut node = node(&runner);
        let mut last = CommandResult::default();

        assert_eq!(cp(&mut node, &mut last).unwrap(), 2);
        assert!(!runner.ran("cmp /etc/services"));
    }

    #[test]
    fn test_suite_order() {
        let names: Vec<String> = tests().into_iter().map(|t| t.name).collect();
        assert_eq!(names.first().map(String::as_str), Some("ping"));
        assert_eq!(names.last().map(String::as_str), Some("rm"));
    }
}
