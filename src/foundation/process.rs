use std::{
    io::{BufRead as _, BufReader, Read},
    process::{Command, Stdio},
    thread::JoinHandle,
};

/// Return `true` when `program -version` can be invoked from `PATH`.
pub fn is_tool_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Forward a child's stderr to `tracing`, line by line, until the pipe closes.
///
/// Long-lived children must have their stderr drained or they stall once the pipe buffer
/// fills.
pub(crate) fn forward_stderr(
    label: &'static str,
    stderr: impl Read + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("{label}-stderr"))
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => tracing::warn!(process = label, "{}", line.trim_end()),
                    Err(e) => {
                        tracing::debug!(process = label, "stderr read ended: {e}");
                        break;
                    }
                }
            }
        })
}
