//! Parent-side opening of explicit redirections.
//!
//! Files are opened before the fork so an open failure can abort the job
//! build without launching anything. Each opened `File` is owned by its
//! `Process` until the launcher moves it into the child; dropping it on
//! any early-exit path is the close.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;

use crate::parser;

/// The three streams a pipeline segment may explicitly rewire.
/// `None` means inherit, or take the pipe end the launcher provides.
#[derive(Debug)]
pub struct Redirections {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
    pub stderr: Option<File>,
}

/// Open every redirection named in one pipeline segment.
/// The first failure aborts the build; files opened earlier are dropped.
pub fn open_redirections(tokens: &[String]) -> Result<Redirections, String> {
    let stdin = match parser::redirect_stdin(tokens) {
        Some(path) => Some(open_input(path)?),
        None => None,
    };
    let stdout = match parser::redirect_stdout(tokens) {
        Some(path) => Some(open_output(path)?),
        None => None,
    };
    let stderr = match parser::redirect_stderr(tokens) {
        Some(path) => Some(open_output(path)?),
        None => None,
    };

    Ok(Redirections {
        stdin,
        stdout,
        stderr,
    })
}

fn open_input(path: &str) -> Result<File, String> {
    File::open(path).map_err(|e| format!("yash: {path}: {e}"))
}

// `2>` shares these semantics with `>`: create or truncate, mode 0666
// before the umask.
fn open_output(path: &str) -> Result<File, String> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o666)
        .open(path)
        .map_err(|e| format!("yash: {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn toks(line: &str) -> Vec<String> {
        crate::parser::tokenize(line)
    }

    #[test]
    fn opens_all_three_streams() {
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.txt");
        std::fs::write(&in_path, "abc\n").unwrap();
        let line = format!(
            "cat < {} > {} 2> {}",
            in_path.display(),
            dir.path().join("out.txt").display(),
            dir.path().join("err.txt").display()
        );

        let redirs = open_redirections(&toks(&line)).unwrap();
        assert!(redirs.stdin.is_some());
        assert!(redirs.stdout.is_some());
        assert!(redirs.stderr.is_some());

        let mut buf = String::new();
        redirs.stdin.unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "abc\n");
    }

    #[test]
    fn missing_input_file_reports_path() {
        let err = open_redirections(&toks("cat < /no/such/file")).unwrap_err();
        assert!(err.starts_with("yash: /no/such/file: "), "was: {err}");
    }

    #[test]
    fn output_redirect_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old contents").unwrap();

        let line = format!("echo > {}", path.display());
        let mut redirs = open_redirections(&toks(&line)).unwrap();
        let file = redirs.stdout.as_mut().unwrap();
        file.write_all(b"new").unwrap();

        drop(redirs);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn stderr_redirect_is_create_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("err.txt");
        std::fs::write(&path, "stale").unwrap();

        let line = format!("cmd 2> {}", path.display());
        let redirs = open_redirections(&toks(&line)).unwrap();
        assert!(redirs.stderr.is_some());
        drop(redirs);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn no_markers_means_no_files() {
        let redirs = open_redirections(&toks("echo hello")).unwrap();
        assert!(redirs.stdin.is_none());
        assert!(redirs.stdout.is_none());
        assert!(redirs.stderr.is_none());
    }
}
