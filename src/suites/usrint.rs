//! User interface library tests. Ordinary tools run with the OrangeFS
//! user interface library preloaded, with the client stopped and nothing
//! mounted, so every file operation goes through the library.

use anyhow::Result;

use super::{expect_output, on_mount, run, run_all};
use crate::node::{CommandResult, Node};
use crate::runner::NamedTest;

const DIR: &str = "usrint-dir";

pub fn tests() -> Vec<NamedTest> {
    vec![
        NamedTest::new("mkdir", mkdir),
        NamedTest::new("cp", cp),
        NamedTest::new("cat", cat),
        NamedTest::new("ls", ls),
        NamedTest::new("rm", rm),
    ]
}

/// `command` with the user interface libraries preloaded.
fn preloaded(node: &Node, command: &str) -> String {
    let lib = format!("{}/lib", node.paths.installation);
    format!(
        "LD_PRELOAD={lib}/libofs.so:{lib}/libpvfs2.so {command}",
        lib = lib,
        command = command
    )
}

fn mkdir(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = preloaded(node, &format!("mkdir -p {}", on_mount(node, DIR)));
    Ok(run(node, last, &command))
}

fn cp(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = on_mount(node, &format!("{}/services", DIR));
    let command = preloaded(node, &format!("cp /etc/services {}", file));
    Ok(run(node, last, &command))
}

fn cat(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let file = on_mount(node, &format!("{}/services", DIR));
    let command = preloaded(node, &format!("cat {}", file));
    let rc = run(node, last, &command);
    if rc != 0 {
        return Ok(rc);
    }
    let expected = node.run("cat /etc/services");
    Ok(if expected.stdout == last.stdout { 0 } else { 1 })
}

fn ls(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = preloaded(node, &format!("ls {}", on_mount(node, DIR)));
    let rc = run(node, last, &command);
    if rc != 0 {
        return Ok(rc);
    }
    Ok(expect_output(last, "services"))
}

fn rm(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let dir = on_mount(node, DIR);
    let commands = [
        preloaded(node, &format!("rm {}/services", dir)),
        preloaded(node, &format!("rmdir {}", dir)),
    ];
    Ok(run_all(node, last, &commands))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{node, RecordingRunner};

    #[test]
    fn test_commands_are_preloaded() {
        let runner = RecordingRunner::new();
        let mut node = node(&runner);
        node.paths.mount_point = "/tmp/mount/orangefs".to_string();
        let mut last = CommandResult::default();

        assert_eq!(mkdir(&mut node, &mut last).unwrap(), 0);
        assert!(runner.ran(
            "LD_PRELOAD=/opt/orangefs/lib/libofs.so:/opt/orangefs/lib/libpvfs2.so mkdir -p /tmp/mount/orangefs/usrint-dir"
        ));
    }

    #[test]
    fn test_cat_compares_with_original() {
        let runner = RecordingRunner::new();
        runner.respond("LD_PRELOAD", 0, "http 80/tcp\n");
        runner.respond("cat /etc/services", 0, "http 80/tcp\nhttps 443/tcp\n");
        let mut node = node(&runner);
        let mut last = CommandResult::default();
        assert_eq!(cat(&mut node, &mut last).unwrap(), 1);
    }
}
