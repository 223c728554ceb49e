//! Hadoop file system shell tests against an existing Hadoop installation
//! configured to use OrangeFS.

use anyhow::Result;

use super::{expect_output, run, run_all};
use crate::node::{CommandResult, Node};
use crate::runner::NamedTest;

const DEFAULT_HADOOP_PREFIX: &str = "/opt/hadoop";
const DIR: &str = "/ofstest-hadoop";

pub fn tests() -> Vec<NamedTest> {
    vec![
        NamedTest::new("mkdir", mkdir),
        NamedTest::new("put", put),
        NamedTest::new("ls", ls),
        NamedTest::new("cat", cat),
        NamedTest::new("rm", rm),
    ]
}

/// `hadoop fs` with `args`, from `HADOOP_PREFIX` or the default prefix.
fn hadoop_fs(node: &Node, args: &str) -> String {
    let prefix = node.env("HADOOP_PREFIX").unwrap_or(DEFAULT_HADOOP_PREFIX);
    format!("{}/bin/hadoop fs {}", prefix, args)
}

fn mkdir(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = hadoop_fs(node, &format!("-mkdir {}", DIR));
    Ok(run(node, last, &command))
}

fn put(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = hadoop_fs(node, &format!("-put /etc/services {}/services", DIR));
    Ok(run(node, last, &command))
}

fn ls(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = hadoop_fs(node, &format!("-ls {}", DIR));
    let rc = run(node, last, &command);
    if rc != 0 {
        return Ok(rc);
    }
    Ok(expect_output(last, "services"))
}

fn cat(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let command = format!(
        "{} | cmp - /etc/services",
        hadoop_fs(node, &format!("-cat {}/services", DIR))
    );
    Ok(run(node, last, &command))
}

fn rm(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let commands = [
        hadoop_fs(node, &format!("-rm {}/services", DIR)),
        hadoop_fs(node, &format!("-rmdir {}", DIR)),
    ];
    Ok(run_all(node, last, &commands))
}
