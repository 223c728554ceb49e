//! The named tests of each category.
//!
//! Every test receives the head node and a slot for the last command it
//! ran, and returns that command's exit status. The runner writes the slot
//! to the test's own log file.

pub mod hadoop;
pub mod mpiio;
pub mod sysint;
pub mod usrint;
pub mod vfs;

use crate::node::{CommandResult, Node};

/// Runs `command` on the node as the test's command of record.
fn run(node: &Node, last: &mut CommandResult, command: &str) -> i32 {
    *last = node.run(command);
    last.exit_code
}

/// Runs `commands` in order and stops at the first failure.
fn run_all(node: &Node, last: &mut CommandResult, commands: &[String]) -> i32 {
    for command in commands {
        let rc = run(node, last, command);
        if rc != 0 {
            return rc;
        }
    }
    0
}

/// `name` under the mount point.
fn on_mount(node: &Node, name: &str) -> String {
    format!("{}/{}", node.paths.mount_point.trim_end_matches('/'), name)
}

/// An installed OrangeFS program.
fn ofs_bin(node: &Node, program: &str) -> String {
    format!("{}/bin/{}", node.paths.installation, program)
}

/// Non-zero when `needle` is missing from the last command's output.
fn expect_output(last: &CommandResult, needle: &str) -> i32 {
    if last.stdout.contains(needle) {
        0
    } else {
        1
    }
}
