//! File operations through the mounted filesystem. The same list runs for
//! the kernel module mount and the FUSE mount.

use anyhow::Result;

use super::{expect_output, on_mount, run, run_all};
use crate::node::{CommandResult, Node};
use crate::runner::NamedTest;

const DIR: &str = "vfs-dir";

pub fn tests() -> Vec<NamedTest> {
    vec![
        NamedTest::new("mkdir", mkdir),
        NamedTest::new("touch", touch),
        NamedTest::new("cp", cp),
        NamedTest::new("append", append),
        NamedTest::new("ls", ls),
        NamedTest::new("rename", rename),
        NamedTest::new("symlink", symlink),
        NamedTest::new("truncate", truncate),
        NamedTest::new("dd", dd),
        NamedTest::new("rm", rm),
        NamedTest::new("rmdir", rmdir),
    ]
}

fn path(node: &Node, name: &str) -> String {
    on_mount(node, &format!("{}/{}", DIR, name))
}

fn mkdir(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!("mkdir -p {}", on_mount(node, DIR));
    Ok(run(node, last, &command))
}

fn touch(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = path(node, "touched");
    let commands = [format!("touch {}", file), format!("test -f {}", file)];
    Ok(run_all(node, last, &commands))
}

fn cp(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = path(node, "services");
    let commands = [
        format!("cp /etc/services {}", file),
        format!("cmp /etc/services {}", file),
    ];
    Ok(run_all(node, last, &commands))
}

fn append(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = path(node, "appended");
    let commands = [
        format!("echo first > {}", file),
        format!("echo second >> {}", file),
        format!("test $(wc -l < {}) -eq 2", file),
    ];
    Ok(run_all(node, last, &commands))
}

fn ls(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!("ls -l {}", on_mount(node, DIR));
    let rc = run(node, last, &command);
    if rc != 0 {
        return Ok(rc);
    }
    Ok(expect_output(last, "services"))
}

fn rename(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let from = path(node, "touched");
    let to = path(node, "renamed");
    let commands = [
        format!("mv {} {}", from, to),
        format!("test -f {} && test ! -e {}", to, from),
    ];
    Ok(run_all(node, last, &commands))
}

fn symlink(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let target = path(node, "services");
    let link = path(node, "services-link");
    let commands = [
        format!("ln -s {} {}", target, link),
        format!("cmp {} {}", target, link),
        format!("rm -f {}", link),
    ];
    Ok(run_all(node, last, &commands))
}

fn truncate(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = path(node, "appended");
    let commands = [
        format!("truncate -s 4 {}", file),
        format!("test $(stat -c %s {}) -eq 4", file),
    ];
    Ok(run_all(node, last, &commands))
}

/// Writes and reads back 16 MiB, large enough to span several servers.
fn dd(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = path(node, "zeros");
    let commands = [
        format!("dd if=/dev/zero of={} bs=1M count=16", file),
        format!("test $(stat -c %s {}) -eq 16777216", file),
        format!("dd if={} of=/dev/null bs=1M", file),
    ];
    Ok(run_all(node, last, &commands))
}

fn rm(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let files = ["services", "appended", "renamed", "zeros"]
        .iter()
        .map(|name| path(node, name))
        .collect::<Vec<_>>()
        .join(" ");
    let commands = [
        format!("rm -f {}", files),
        format!("test -z \"$(ls -A {})\"", on_mount(node, DIR)),
    ];
    Ok(run_all(node, last, &commands))
}

fn rmdir(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!("rmdir {}", on_mount(node, DIR));
    Ok(run(node, last, &command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{node, RecordingRunner};

    #[test]
    fn test_paths_are_under_mount_point() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.paths.mount_point = "/tmp/mount/orangefs/".to_string();
        let mut last = CommandResult::default();

        assert_eq!(cp(&mut node, &mut last).unwrap(), 0);
        assert!(runner.ran("cp /etc/services /tmp/mount/orangefs/vfs-dir/services"));
        assert!(last.command_line.contains("cmp /etc/services"));
    }

    #[test]
    fn test_failed_step_is_the_command_of_record() {
        let runner = RecordingRunner::new();
        runner.respond("stat -c %s", 1, "");
        let mut node = node(&runner);
        let mut last = CommandResult::default();

        assert_eq!(dd(&mut node, &mut last).unwrap(), 1);
        assert!(last.command_line.contains("16777216"));
        assert!(!runner.ran("of=/dev/null"));
    }

    #[test]
    fn test_ls_checks_output() {
        let runner = RecordingRunner::new();
        runner.respond("ls -l", 0, "-rw-r--r-- 1 tester tester 19558 services\n");
        let mut node = node(&runner);
        let mut last = CommandResult::default();
        assert_eq!(ls(&mut node, &mut last).unwrap(), 0);
    }
}
