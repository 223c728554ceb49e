//! Human readable explanations for failed node steps.
//!
//! Node operations return bare exit codes. When a step fails, the captured
//! output is turned into a report with a few likely causes so the operator
//! does not have to re-run the command by hand.

use crate::node::command::{CommandResult, TRANSPORT_FAILURE_RC};

/// Builds a report for a failed step on `host`.
pub fn diagnose_step_failure(step: &str, result: &CommandResult, host: &str) -> String {
    let combined = format!("{} {}", result.stderr, result.stdout).to_lowercase();
    let command = extract_command_name(&result.command_line);
    let mut suggestions = Vec::new();

    if result.exit_code == TRANSPORT_FAILURE_RC && result.stdout.is_empty() {
        suggestions.extend(transport_suggestions(&combined, host));
    } else if combined.contains("command not found") || result.exit_code == 127 {
        suggestions.push("• A program used by this step is not installed on the node".to_string());
        suggestions.push(format!(
            "• Run the prerequisite installation on {} (ofstest setup)",
            host
        ));
    } else if combined.contains("sudo:") && combined.contains("password") {
        suggestions.push(format!("• Passwordless sudo is not configured for the login user on {}", host));
        suggestions.push("• Add a NOPASSWD rule for the user in /etc/sudoers".to_string());
    } else if combined.contains("permission denied") || result.exit_code == 126 {
        suggestions.push("• Permission denied while running the step".to_string());
        suggestions.push("• Check ownership of the installation prefix and source directory".to_string());
    } else if combined.contains("no space left") {
        suggestions.push(format!("• The disk is full on {}", host));
        suggestions.push("• Free space or point install_prefix at a larger volume".to_string());
    } else if combined.contains("could not resolve") || combined.contains("unable to resolve") {
        suggestions.push(format!("• {} cannot resolve a download host", host));
        suggestions.push("• Verify DNS on the node and the resource_location URL".to_string());
    }

    if suggestions.is_empty() {
        suggestions.push(format!("• {} failed with exit code {}", step, result.exit_code));
        suggestions.push("• Review the output above for specific error details".to_string());
        suggestions.push(format!(
            "• Re-run manually on {}: {}",
            host, command
        ));
    }

    let mut report = format!("{} failed on {}\n", step, host);
    report.push_str(&format!("Exit code: {}\n\n", result.exit_code));

    if !result.stderr.trim().is_empty() {
        report.push_str("Stderr:\n");
        report.push_str(&indent_text(tail(&result.stderr, 20), 2));
        report.push_str("\n\n");
    }
    if !result.stdout.trim().is_empty() {
        report.push_str("Stdout:\n");
        report.push_str(&indent_text(tail(&result.stdout, 20), 2));
        report.push_str("\n\n");
    }

    report.push_str("Troubleshooting suggestions:\n");
    report.push_str(&suggestions.join("\n"));
    report
}

fn transport_suggestions(output: &str, host: &str) -> Vec<String> {
    let mut suggestions = Vec::new();

    if output.contains("connection refused")
        || output.contains("timed out")
        || output.contains("no route to host")
    {
        suggestions.push(format!("• Verify the host '{}' is reachable", host));
        suggestions.push("• Check that sshd is running and the port is open".to_string());
    }
    if output.contains("permission denied") || output.contains("publickey") {
        suggestions.push("• Verify the ssh_key in the configuration (chmod 600)".to_string());
        suggestions.push(format!(
            "• Verify the public key is in ~/.ssh/authorized_keys on {}",
            host
        ));
    }
    if output.contains("failed to start") {
        suggestions.push("• The OpenSSH client (ssh, scp) is not installed on this machine".to_string());
    }
    if suggestions.is_empty() {
        suggestions.push(format!("• Could not reach {} over ssh", host));
        suggestions.push(format!("• Test the connection manually: ssh {}", host));
    }
    suggestions
}

fn extract_command_name(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

fn tail(text: &str, lines: usize) -> &str {
    let trimmed = text.trim_end();
    match trimmed.char_indices().rev().filter(|(_, c)| *c == '\n').nth(lines - 1) {
        Some((index, _)) => &trimmed[index + 1..],
        None => trimmed,
    }
}

fn indent_text(text: &str, spaces: usize) -> String {
    let indent = " ".repeat(spaces);
    text.lines()
        .map(|line| format!("{}{}", indent, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(exit_code: i32, stderr: &str) -> CommandResult {
        CommandResult {
            command_line: "./configure --prefix=/opt/orangefs".to_string(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_diagnose_missing_program() {
        let report = diagnose_step_failure("Configure", &failed(127, "bash: svn: command not found"), "node1");
        assert!(report.contains("Configure failed on node1"));
        assert!(report.contains("not installed on the node"));
    }

    #[test]
    fn test_diagnose_sudo_password() {
        let report = diagnose_step_failure(
            "Install",
            &failed(1, "sudo: a password is required"),
            "node1",
        );
        assert!(report.contains("Passwordless sudo"));
    }

    #[test]
    fn test_diagnose_reads_stdout_of_tty_batches() {
        let result = CommandResult {
            command_line: "ssh -tt tester@node1 bash -c 'sudo make install'".to_string(),
            exit_code: 1,
            stdout: "sudo: a password is required\n".to_string(),
            stderr: String::new(),
        };
        let report = diagnose_step_failure("Install", &result, "node1");
        assert!(report.contains("Passwordless sudo"));
        assert!(report.contains("Stdout:\n  sudo: a password is required"));
        assert!(!report.contains("Stderr:"));
    }

    #[test]
    fn test_diagnose_transport_failure() {
        let result = CommandResult::transport_failure(
            "ssh node1 true",
            "ssh: connect to host node1 port 22: Connection refused",
        );
        let report = diagnose_step_failure("Upload keys", &result, "node1");
        assert!(report.contains("Exit code: 255"));
        assert!(report.contains("reachable"));
    }

    #[test]
    fn test_diagnose_generic() {
        let report = diagnose_step_failure("Make", &failed(2, "make: *** [all] Error 1"), "node1");
        assert!(report.contains("Make failed with exit code 2"));
        assert!(report.contains("Re-run manually on node1: ./configure"));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("a\nb", 5), "a\nb");
    }

    #[test]
    fn test_indent_text() {
        assert_eq!(indent_text("line1\nline2", 2), "  line1\n  line2");
    }
}
