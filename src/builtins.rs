//! The built-in control surface: `fg`, `bg`, `jobs`, `exit`.

use crate::executor;
use crate::job_control::{self, Terminal};
use crate::jobs::{JobState, JobTable, ProcessState};

/// What the REPL should do after a built-in ran.
pub enum BuiltinAction {
    Continue,
    Exit,
}

/// A built-in is reserved only when it is the sole token on the line;
/// `fg 1` is an ordinary external command.
fn builtin_name(tokens: &[String]) -> Option<&str> {
    if tokens.len() != 1 {
        return None;
    }
    match tokens[0].as_str() {
        name @ ("fg" | "bg" | "jobs" | "exit") => Some(name),
        _ => None,
    }
}

/// Run `tokens` as a built-in if it is one.
pub fn dispatch(
    tokens: &[String],
    table: &mut JobTable,
    term: &mut Terminal,
) -> Option<BuiltinAction> {
    match builtin_name(tokens)? {
        "fg" => fg(table, term),
        "bg" => bg(table),
        "jobs" => table.report(true),
        "exit" => return Some(BuiltinAction::Exit),
        _ => return None,
    }
    Some(BuiltinAction::Continue)
}

/// Resume the current job in the foreground: restore its terminal modes
/// if it was stopped, hand the terminal over, continue the group, and
/// wait for it.
fn fg(table: &mut JobTable, term: &mut Terminal) {
    let Some(pos) = table.fg_candidate() else {
        eprintln!("yash: fg: current: no such job");
        return;
    };

    let pgid = {
        let Some(job) = table.job_at_mut(pos) else {
            return;
        };
        let was_stopped = job.state == JobState::Stopped;
        job.foreground = true;
        job.mark_all(ProcessState::Running);
        println!("{}", job.format_line(pos == 0));
        if was_stopped {
            term.restore_job_modes(&job.tmodes);
        }
        job.pgid
    };

    term.hand_over(pgid);
    if let Err(e) = job_control::signal_group(pgid, libc::SIGCONT) {
        eprintln!("yash: kill (SIGCONT): {e}");
    }

    executor::wait_in_foreground(table, term, pos);
}

/// Resume the current stopped job in the background. The terminal stays
/// with the shell.
fn bg(table: &mut JobTable) {
    let Some(pos) = table.bg_candidate() else {
        eprintln!("yash: bg: current: no such job");
        return;
    };

    let Some(job) = table.job_at_mut(pos) else {
        return;
    };
    job.foreground = false;
    job.mark_all(ProcessState::Running);
    println!("{}", job.format_line(pos == 0));

    let pgid = job.pgid;
    if let Err(e) = job_control::signal_group(pgid, libc::SIGCONT) {
        eprintln!("yash: kill (SIGCONT): {e}");
    }
}
