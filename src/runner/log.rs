//! Result log and per-test logs.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::node::CommandResult;

const DOTS: &str = "........................................";
const HEADER_RULE: &str = "==================================================";

/// One line of the result log.
pub fn format_outcome(name: &str, rc: i32) -> String {
    if rc == 0 {
        format!("{}{}PASS.", name, DOTS)
    } else {
        format!("{}{}FAIL: RC = {}", name, DOTS, rc)
    }
}

/// The run's result log. The first header of a run truncates the file;
/// everything after that appends.
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    started: bool,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = if self.started {
            OpenOptions::new().create(true).append(true).open(&self.path)?
        } else {
            File::create(&self.path)?
        };
        self.started = true;
        Ok(file)
    }

    /// Writes `<title> ====…`.
    pub fn header(&mut self, title: &str) -> Result<()> {
        let mut file = self.open()?;
        writeln!(file, "{} {}", title, HEADER_RULE)?;
        Ok(())
    }

    pub fn outcome(&mut self, name: &str, rc: i32) -> Result<()> {
        let mut file = self.open()?;
        writeln!(file, "{}", format_outcome(name, rc))?;
        Ok(())
    }
}

/// Writes the last command a test ran, with its status and output.
pub fn write_test_log(path: &Path, last: &CommandResult, rc: i32) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "COMMAND:{}", last.command_line)?;
    writeln!(file, "RC: {}", rc)?;
    writeln!(file, "STDOUT:{}", last.stdout)?;
    writeln!(file, "STDERR:{}", last.stderr)?;
    Ok(())
}
