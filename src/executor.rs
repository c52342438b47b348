//! Launching a job's pipeline and supervising it in the foreground.
//!
//! Spawning is `std::process::Command` with a `pre_exec` hook: the child
//! joins the job's process group, takes the terminal if the job is
//! foreground, and resets signal dispositions before exec. The parent
//! repeats the group/terminal assignment after the fork; the two sides
//! race deliberately and either winner leaves the intended state.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use os_pipe::PipeReader;

use crate::job_control::{self, Terminal};
use crate::jobs::{Job, JobState, JobTable, ProcessState};

/// Fork and wire every stage of `job`'s pipeline. On success the job's
/// pgid is the pid of its first spawned stage and, for foreground jobs,
/// the terminal belongs to that group. Pipe creation failure aborts the
/// launch; stages already forked are left to be reaped normally.
pub fn launch(job: &mut Job) -> Result<(), String> {
    let count = job.processes.len();
    let foreground = job.foreground;
    let mut pipeline_pgid: Option<libc::pid_t> = None;
    let mut prev_reader: Option<PipeReader> = None;

    for i in 0..count {
        let is_last = i + 1 == count;

        let (next_reader, pipe_writer) = if is_last {
            (None, None)
        } else {
            let (reader, writer) = os_pipe::pipe().map_err(|e| format!("yash: pipe: {e}"))?;
            (Some(reader), Some(writer))
        };

        // Wire this stage's streams. An explicit redirection beats the
        // pipe for each of stdin/stdout; a superseded pipe end is dropped
        // here, which is its close.
        let program;
        let mut command;
        {
            let process = &mut job.processes[i];
            program = process.argv.first().cloned().unwrap_or_default();

            command = Command::new(&program);
            if process.argv.len() > 1 {
                command.args(&process.argv[1..]);
            }

            let mut piped_in = prev_reader.take();
            let stdin = if let Some(file) = process.stdin.take() {
                Stdio::from(file)
            } else if let Some(reader) = piped_in.take() {
                Stdio::from(reader)
            } else {
                Stdio::inherit()
            };
            drop(piped_in);

            let mut piped_out = pipe_writer;
            let stdout = if let Some(file) = process.stdout.take() {
                Stdio::from(file)
            } else if let Some(writer) = piped_out.take() {
                Stdio::from(writer)
            } else {
                Stdio::inherit()
            };
            drop(piped_out);

            let stderr = process
                .stderr
                .take()
                .map(Stdio::from)
                .unwrap_or_else(Stdio::inherit);

            command.stdin(stdin).stdout(stdout).stderr(stderr);
        }

        let captured_pgid = pipeline_pgid;
        unsafe {
            command.pre_exec(move || {
                // Join the job's process group (first stage: create it)
                // and, for foreground jobs, take the terminal. The
                // tcsetpgrp call must come before the disposition reset:
                // it relies on the inherited SIGTTOU ignore.
                let pgid = captured_pgid.unwrap_or(0);
                libc::setpgid(0, pgid);
                if foreground {
                    let pgid = if pgid == 0 { libc::getpid() } else { pgid };
                    libc::tcsetpgrp(libc::STDIN_FILENO, pgid);
                }
                // SIG_IGN survives exec, so undo everything the shell
                // altered.
                for signal in [
                    libc::SIGINT,
                    libc::SIGQUIT,
                    libc::SIGTSTP,
                    libc::SIGTTIN,
                    libc::SIGTTOU,
                    libc::SIGCHLD,
                ] {
                    libc::signal(signal, libc::SIG_DFL);
                }
                Ok(())
            });
        }

        match command.spawn() {
            Ok(child) => {
                let pid = child.id() as libc::pid_t;
                // Reaping is by waitpid sweeps only; the handle must not
                // wait or it would steal the status.
                drop(child);

                job.processes[i].pid = pid;
                let pgid = pipeline_pgid.unwrap_or(pid);
                pipeline_pgid = Some(pgid);
                job.pgid = pgid;

                // Parent side of the race the child's pre_exec also runs.
                if let Err(e) = job_control::set_process_group(pid, pgid) {
                    eprintln!("yash: setpgid: {e}");
                }
                if foreground {
                    if let Err(e) = job_control::set_terminal_foreground(pgid) {
                        eprintln!("yash: warning: tcsetpgrp: {e}");
                    }
                }
            }
            Err(e) => {
                // The stage never reached exec. Report it the way the
                // child would have and let the rest of the pipeline run.
                if e.kind() == io::ErrorKind::NotFound {
                    eprintln!("{program}: command not found");
                } else {
                    eprintln!("yash: exec: {program}: {e}");
                }
                job.processes[i].state = ProcessState::Done;
            }
        }

        prev_reader = next_reader;
    }

    Ok(())
}

/// Block until the foreground job at `pos` leaves Running, then return
/// the terminal to the shell. A stop is reported immediately; a finished
/// foreground job stays silent (the user was watching it).
pub fn wait_in_foreground(table: &mut JobTable, term: &mut Terminal, pos: usize) {
    table.wait_job(pos);

    if let Some(job) = table.job_at(pos) {
        if job.state == JobState::Stopped {
            println!("{}", job.format_line(pos == 0));
        }
    }

    term.reclaim();
}
