//! Process-group, terminal, and signal plumbing.
//!
//! Everything here is a thin wrapper over libc: retry on `EINTR`,
//! tolerate the errno codes that the deliberate parent/child races
//! produce, and surface everything else as `io::Error`.

use std::io;
use std::thread;
use std::time::Duration;

use crossterm::tty::IsTty;

/// How long the startup handshake keeps poking the terminal before
/// giving up and proceeding without foreground ownership.
const HANDSHAKE_TRIES: u32 = 40;
const HANDSHAKE_PAUSE: Duration = Duration::from_millis(25);

/// Move `pid` into process group `pgid`.
///
/// Performed from both sides of the fork; the loser of that race sees
/// `EACCES` (child already exec'd) or `ESRCH` (child already gone), both
/// of which mean the winner has done the job.
pub fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        if unsafe { libc::setpgid(pid, pgid) } == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Deliver `signal` to every member of process group `pgid`.
pub fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        if unsafe { libc::kill(-pgid, signal) } == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Make `pgid` the terminal's foreground process group.
///
/// The shell ignores SIGTTOU, so this is safe to call even while the
/// terminal still belongs to someone else.
pub fn set_terminal_foreground(pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        if unsafe { libc::tcsetpgrp(libc::STDIN_FILENO, pgid) } == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Snapshot the terminal attributes of stdin.
pub fn terminal_attributes() -> io::Result<libc::termios> {
    let mut modes: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut modes) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(modes)
}

/// Reapply previously saved terminal attributes, after output drains.
pub fn restore_terminal_attributes(modes: &libc::termios) -> io::Result<()> {
    if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSADRAIN, modes) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// One `waitpid` poll over all children.
pub enum WaitPoll {
    /// A child changed state: (pid, raw wait status).
    Changed(libc::pid_t, libc::c_int),
    /// Non-blocking poll with nothing to report.
    NoChange,
}

/// Collect one child status, stopped children included.
/// `block` selects between the prompt-time sweep and the foreground wait.
/// `ECHILD` comes back as an error for the caller to interpret.
pub fn wait_any(block: bool) -> io::Result<WaitPoll> {
    let options = if block {
        libc::WUNTRACED
    } else {
        libc::WUNTRACED | libc::WNOHANG
    };

    let mut raw: libc::c_int = 0;
    loop {
        let pid = unsafe { libc::waitpid(-1, &mut raw, options) };
        if pid == 0 {
            return Ok(WaitPoll::NoChange);
        }
        if pid > 0 {
            return Ok(WaitPoll::Changed(pid, raw));
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

// SIGTSTP handler: redraw the prompt. Restricted to async-signal-safe
// calls, hence raw write(2).
extern "C" fn redraw_prompt(_signo: libc::c_int) {
    const MARKER: &[u8] = b"\n# ";
    unsafe {
        libc::write(libc::STDOUT_FILENO, MARKER.as_ptr().cast(), MARKER.len());
    }
}

fn install(signal: libc::c_int, disposition: libc::sighandler_t) {
    if unsafe { libc::signal(signal, disposition) } == libc::SIG_ERR {
        eprintln!("yash: signal({signal}): {}", io::Error::last_os_error());
    }
}

/// Signal dispositions for the shell itself. SIGINT is handled by the
/// `ctrlc` callback installed in `main`; children reset everything back
/// to the defaults before exec.
pub fn install_signal_dispositions() {
    let redraw: extern "C" fn(libc::c_int) = redraw_prompt;
    install(libc::SIGTSTP, redraw as libc::sighandler_t);
    install(libc::SIGQUIT, libc::SIG_IGN);
    install(libc::SIGTTIN, libc::SIG_IGN);
    install(libc::SIGTTOU, libc::SIG_IGN);
    install(libc::SIGCHLD, libc::SIG_DFL);
}

/// The shell's claim on the controlling terminal: its own pid and the
/// attribute snapshot restored on every return to the prompt.
pub struct Terminal {
    shell_pid: libc::pid_t,
    tmodes: libc::termios,
}

impl Terminal {
    /// Startup handshake. Any failure here means job control cannot work
    /// and the shell must not start.
    pub fn init() -> Result<Terminal, String> {
        if !io::stdin().is_tty() {
            return Err(
                "yash: abort reason: Job control won't work because yash is not executing from a tty"
                    .to_string(),
            );
        }

        let shell_pid = unsafe { libc::getpid() };
        if unsafe { libc::setpgid(0, 0) } == -1 {
            return Err(format!(
                "yash: abort reason: Couldn't put yash in its own process group: {}",
                io::Error::last_os_error()
            ));
        }

        // If the shell was itself launched in the background, stop until
        // its parent puts it in the foreground. SIGTTIN still has its
        // default disposition at this point, which is exactly the stop we
        // want. Bounded so a terminal that never hands over cannot wedge
        // startup.
        let pgid = unsafe { libc::getpgrp() };
        let mut tries = 0;
        while unsafe { libc::tcgetpgrp(libc::STDIN_FILENO) } != pgid {
            let _ = signal_group(pgid, libc::SIGTTIN);
            thread::sleep(HANDSHAKE_PAUSE);
            tries += 1;
            if tries >= HANDSHAKE_TRIES {
                eprintln!("yash: warning: couldn't reach the foreground, proceeding anyway");
                break;
            }
        }

        set_terminal_foreground(shell_pid).map_err(|e| {
            format!("yash: abort reason: Couldn't obtain control of the terminal: {e}")
        })?;

        let tmodes = terminal_attributes().map_err(|e| {
            format!("yash: abort reason: Couldn't read the terminal attributes: {e}")
        })?;

        Ok(Terminal { shell_pid, tmodes })
    }

    /// The saved shell attributes; every new job starts with a copy.
    pub fn attributes(&self) -> libc::termios {
        self.tmodes
    }

    /// Return the terminal to the shell: restore the saved attributes,
    /// take back the foreground slot, and re-snapshot.
    pub fn reclaim(&mut self) {
        let _ = restore_terminal_attributes(&self.tmodes);
        let _ = set_terminal_foreground(self.shell_pid);
        if let Ok(modes) = terminal_attributes() {
            self.tmodes = modes;
        }
    }

    /// Hand the terminal's foreground slot to a job's process group.
    pub fn hand_over(&self, pgid: libc::pid_t) {
        if let Err(e) = set_terminal_foreground(pgid) {
            eprintln!("yash: warning: tcsetpgrp: {e}");
        }
    }

    /// Reapply a stopped job's saved attributes before resuming it.
    pub fn restore_job_modes(&self, modes: &libc::termios) {
        if let Err(e) = restore_terminal_attributes(modes) {
            eprintln!("yash: warning: tcsetattr: {e}");
        }
    }
}
