//! Decoding of raw `waitpid` statuses.

/// What one collected wait status says about a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// Stopped by a signal (job control).
    Stopped,
    /// Exited normally with the given code.
    Exited(i32),
    /// Terminated by the given signal.
    Signaled(i32),
    /// None of the above; the kernel reported something this shell does
    /// not model (e.g. a continue event it never asked for).
    Unknown,
}

pub fn decode(raw: libc::c_int) -> ChildStatus {
    if libc::WIFSTOPPED(raw) {
        ChildStatus::Stopped
    } else if libc::WIFEXITED(raw) {
        ChildStatus::Exited(libc::WEXITSTATUS(raw))
    } else if libc::WIFSIGNALED(raw) {
        ChildStatus::Signaled(libc::WTERMSIG(raw))
    } else {
        ChildStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    fn raw_status_of(script: &str) -> libc::c_int {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .status()
            .expect("spawn sh")
            .into_raw()
    }

    #[test]
    fn decodes_normal_exit() {
        assert_eq!(decode(raw_status_of("exit 0")), ChildStatus::Exited(0));
        assert_eq!(decode(raw_status_of("exit 7")), ChildStatus::Exited(7));
    }

    #[test]
    fn decodes_signal_termination() {
        let status = raw_status_of("kill -TERM $$");
        assert_eq!(decode(status), ChildStatus::Signaled(libc::SIGTERM));
    }
}
