//! Jobs, their processes, and the table that tracks them.
//!
//! A job is one entered pipeline; the table keeps live jobs newest-first
//! with the head as the "current" job. All status reconciliation with the
//! kernel happens here, from the REPL thread, at prompt boundaries or
//! inside the foreground wait, never from a signal handler.

use std::fmt;
use std::fs::File;

use crate::job_control::{self, WaitPoll};
use crate::parser;
use crate::redirect;
use crate::status::{self, ChildStatus};

/// Longest pipeline the builder will assemble; segments past the cap are
/// dropped.
pub const MAX_PIPE_MEMBERS: usize = 100;

/// Lifecycle of one child. Done and Error are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Stopped,
    Done,
    Error,
}

/// Job state as derived from the member processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
            JobState::Done => "Done",
            JobState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One command of a pipeline.
///
/// The redirection files are opened in the parent at build time and moved
/// into the child at launch; holding the `File` is the close obligation.
#[derive(Debug)]
pub struct Process {
    pub argv: Vec<String>,
    /// Kernel pid, 0 until forked.
    pub pid: libc::pid_t,
    pub stdin: Option<File>,
    pub stdout: Option<File>,
    pub stderr: Option<File>,
    pub state: ProcessState,
}

/// A pipeline entered as a single command line.
#[derive(Debug)]
pub struct Job {
    pub index: i32,
    /// Process group id; 0 until the first child forks, then that
    /// child's pid.
    pub pgid: libc::pid_t,
    pub foreground: bool,
    /// The entered tokens joined by spaces, `&` stripped (the job-line
    /// format re-appends it).
    pub command: String,
    pub state: JobState,
    /// Terminal attributes to restore when `fg` resumes this job;
    /// captured when the job stops while in the foreground.
    pub tmodes: libc::termios,
    pub processes: Vec<Process>,
}

impl Job {
    /// Job state per the derivation rules: any Error process poisons the
    /// job; a job runs while any process still runs; otherwise it is
    /// Stopped unless every process is Done.
    pub fn derive_state(&self) -> JobState {
        let mut running = false;
        let mut stopped = false;
        for p in &self.processes {
            match p.state {
                ProcessState::Error => return JobState::Error,
                ProcessState::Running => running = true,
                ProcessState::Stopped => stopped = true,
                ProcessState::Done => {}
            }
        }
        if running {
            JobState::Running
        } else if stopped {
            JobState::Stopped
        } else {
            JobState::Done
        }
    }

    /// True once no process is Running (the condition that ends the
    /// foreground wait). An Error process is handled before this check.
    pub fn has_left_running(&self) -> bool {
        self.processes
            .iter()
            .all(|p| !matches!(p.state, ProcessState::Running))
    }

    /// Force every process (and the job) into `state`; used by `fg`/`bg`
    /// when resuming and by the defensive ECHILD path.
    pub fn mark_all(&mut self, state: ProcessState) {
        for p in &mut self.processes {
            p.state = state;
        }
        self.state = match state {
            ProcessState::Running => JobState::Running,
            ProcessState::Stopped => JobState::Stopped,
            ProcessState::Done => JobState::Done,
            ProcessState::Error => JobState::Error,
        };
    }

    /// The listing line: `[index]` then `+` for the current job, the
    /// state padded to 24 columns, the command, and `&` for background.
    pub fn format_line(&self, is_current: bool) -> String {
        format!(
            "[{}]{}  {:<24}{} {}",
            self.index,
            if is_current { '+' } else { '-' },
            self.state,
            self.command,
            if self.foreground { ' ' } else { '&' },
        )
    }
}

/// Assemble a job from one line's tokens by peeling off pipeline
/// segments. The result is not running: no pgid, no pids. A failed
/// redirection open aborts the build and the error carries the message
/// to print.
pub fn build_job(
    mut tokens: Vec<String>,
    index: i32,
    tmodes: libc::termios,
) -> Result<Job, String> {
    let foreground = !parser::take_ampersand(&mut tokens);
    let command = tokens.join(" ");

    let mut processes = Vec::new();
    let mut rest = Some(tokens);
    while let Some(mut segment) = rest {
        if processes.len() == MAX_PIPE_MEMBERS {
            break;
        }
        rest = parser::split_pipe(&mut segment);

        let redirs = redirect::open_redirections(&segment)?;
        parser::clip_args(&mut segment);

        processes.push(Process {
            argv: segment,
            pid: 0,
            stdin: redirs.stdin,
            stdout: redirs.stdout,
            stderr: redirs.stderr,
            state: ProcessState::Running,
        });
    }

    Ok(Job {
        index,
        pgid: 0,
        foreground,
        command,
        state: JobState::Running,
        tmodes,
        processes,
    })
}

/// The live jobs, newest first. The head is the current job.
pub struct JobTable {
    jobs: Vec<Job>,
    next_index: i32,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_index: 1,
        }
    }

    /// Claim the next display index. Consumed even when the build then
    /// fails.
    pub fn claim_index(&mut self) -> i32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// New jobs become the current job.
    pub fn push_front(&mut self, job: Job) {
        self.jobs.insert(0, job);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn job_at(&self, pos: usize) -> Option<&Job> {
        self.jobs.get(pos)
    }

    pub fn job_at_mut(&mut self, pos: usize) -> Option<&mut Job> {
        self.jobs.get_mut(pos)
    }

    /// Target for `fg`: the newest job that is stopped, or running in
    /// the background.
    pub fn fg_candidate(&self) -> Option<usize> {
        self.jobs.iter().position(|j| {
            j.state == JobState::Stopped || (j.state == JobState::Running && !j.foreground)
        })
    }

    /// Target for `bg`: the newest stopped job.
    pub fn bg_candidate(&self) -> Option<usize> {
        self.jobs.iter().position(|j| j.state == JobState::Stopped)
    }

    fn find_process_mut(&mut self, pid: libc::pid_t) -> Option<&mut Process> {
        self.jobs
            .iter_mut()
            .flat_map(|j| j.processes.iter_mut())
            .find(|p| p.pid == pid)
    }

    fn job_of_pid_mut(&mut self, pid: libc::pid_t) -> Option<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| j.processes.iter().any(|p| p.pid == pid))
    }

    /// Fold one collected wait status into the owning process and job.
    fn apply_status(&mut self, pid: libc::pid_t, raw: libc::c_int) {
        match status::decode(raw) {
            ChildStatus::Stopped => {
                if let Some(p) = self.find_process_mut(pid) {
                    p.state = ProcessState::Stopped;
                }
            }
            ChildStatus::Exited(_) => {
                if let Some(p) = self.find_process_mut(pid) {
                    p.state = ProcessState::Done;
                }
            }
            ChildStatus::Signaled(signal) => {
                if let Some(p) = self.find_process_mut(pid) {
                    p.state = ProcessState::Done;
                }
                // Killed by something other than the interactive Ctrl-C
                // (say, a kill from another terminal): clear the
                // foreground flag so the completion prints at the next
                // prompt. Ctrl-C of a foreground job stays silent.
                if signal != libc::SIGINT {
                    if let Some(job) = self.job_of_pid_mut(pid) {
                        job.foreground = false;
                    }
                }
            }
            ChildStatus::Unknown => {
                if let Some(p) = self.find_process_mut(pid) {
                    p.state = ProcessState::Error;
                }
                if let Some(job) = self.job_of_pid_mut(pid) {
                    job.state = JobState::Error;
                }
            }
        }
    }

    /// The shared reap loop. Non-blocking (`block == false`) runs before
    /// every prompt and stops at the first no-change poll; blocking runs
    /// after launching or resuming a foreground job and returns once the
    /// job has left Running. Statuses collected for other jobs' children
    /// along the way are folded in where they belong.
    fn sweep_job(&mut self, pos: usize, block: bool) {
        loop {
            let Some(job) = self.jobs.get(pos) else { return };
            if job.state == JobState::Error || job.has_left_running() {
                break;
            }

            match job_control::wait_any(block) {
                Ok(WaitPoll::NoChange) => break,
                Ok(WaitPoll::Changed(pid, raw)) => self.apply_status(pid, raw),
                Err(e) if block && e.raw_os_error() == Some(libc::ECHILD) => {
                    // The children are already gone (reaped elsewhere,
                    // somehow). Call the job finished rather than error.
                    if let Some(job) = self.jobs.get_mut(pos) {
                        job.mark_all(ProcessState::Done);
                    }
                    break;
                }
                Err(e) => {
                    eprintln!("yash: waitpid: {e}");
                    return;
                }
            }
        }

        let Some(job) = self.jobs.get_mut(pos) else { return };
        job.state = job.derive_state();
        if block && job.foreground && job.state == JobState::Stopped {
            // Save the stopped job's terminal modes before the shell
            // reclaims the terminal; `fg` restores them.
            if let Ok(modes) = job_control::terminal_attributes() {
                job.tmodes = modes;
            }
        }
    }

    /// Non-blocking reconciliation of one job with the kernel.
    pub fn update_job(&mut self, pos: usize) {
        self.sweep_job(pos, false);
    }

    /// Block until the job at `pos` leaves Running.
    pub fn wait_job(&mut self, pos: usize) {
        self.sweep_job(pos, true);
    }

    pub fn update_all(&mut self) {
        for pos in 0..self.jobs.len() {
            self.update_job(pos);
        }
    }

    /// Drop every Done/Error job, preserving survivor order. The display
    /// counter shrinks with each removal to keep job numbers small; it is
    /// cosmetic, not an identifier.
    pub fn prune(&mut self) {
        let before = self.jobs.len();
        self.jobs
            .retain(|j| !matches!(j.state, JobState::Done | JobState::Error));
        self.next_index -= (before - self.jobs.len()) as i32;
    }

    /// Sweep every job, print the reportable ones oldest-first, then
    /// prune. Before a prompt (`list_all == false`) only completions of
    /// non-foreground jobs print; `jobs` lists everything still in the
    /// table.
    pub fn report(&mut self, list_all: bool) {
        self.update_all();

        let lines: Vec<String> = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| match job.state {
                JobState::Running | JobState::Stopped => list_all,
                JobState::Done | JobState::Error => list_all || !job.foreground,
            })
            .map(|(pos, job)| job.format_line(pos == 0))
            .collect();

        for line in lines.iter().rev() {
            println!("{line}");
        }

        self.prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_modes() -> libc::termios {
        unsafe { std::mem::zeroed() }
    }

    fn job_with_states(index: i32, foreground: bool, states: &[ProcessState]) -> Job {
        Job {
            index,
            pgid: 0,
            foreground,
            command: String::from("cmd"),
            state: JobState::Running,
            tmodes: shell_modes(),
            processes: states
                .iter()
                .map(|&state| Process {
                    argv: vec![String::from("cmd")],
                    pid: 0,
                    stdin: None,
                    stdout: None,
                    stderr: None,
                    state,
                })
                .collect(),
        }
    }

    #[test]
    fn builds_pipeline_segments() {
        let tokens = parser::tokenize("ls | wc -l &");
        let job = build_job(tokens, 1, shell_modes()).unwrap();

        assert!(!job.foreground);
        assert_eq!(job.command, "ls | wc -l");
        assert_eq!(job.processes.len(), 2);
        assert_eq!(job.processes[0].argv, vec!["ls"]);
        assert_eq!(job.processes[1].argv, vec!["wc", "-l"]);
        assert_eq!(job.pgid, 0);
    }

    #[test]
    fn builds_redirections_and_clips_argv() {
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.txt");
        std::fs::write(&in_path, "abc\n").unwrap();
        let line = format!(
            "cat < {} > {}",
            in_path.display(),
            dir.path().join("out.txt").display()
        );

        let job = build_job(parser::tokenize(&line), 1, shell_modes()).unwrap();
        assert!(job.foreground);
        assert_eq!(job.processes.len(), 1);
        assert_eq!(job.processes[0].argv, vec!["cat"]);
        assert!(job.processes[0].stdin.is_some());
        assert!(job.processes[0].stdout.is_some());
        assert!(job.processes[0].stderr.is_none());
    }

    #[test]
    fn failed_redirection_aborts_build() {
        let tokens = parser::tokenize("cat < /no/such/file | wc");
        let err = build_job(tokens, 1, shell_modes()).unwrap_err();
        assert!(err.starts_with("yash: /no/such/file: "), "was: {err}");
    }

    #[test]
    fn pipeline_is_capped() {
        let line = vec!["true"; MAX_PIPE_MEMBERS + 50].join(" | ");
        let job = build_job(parser::tokenize(&line), 1, shell_modes()).unwrap();
        assert_eq!(job.processes.len(), MAX_PIPE_MEMBERS);
    }

    #[test]
    fn state_derivation_rules() {
        use ProcessState::*;

        let cases: &[(&[ProcessState], JobState)] = &[
            (&[Running, Running], JobState::Running),
            (&[Running, Done], JobState::Running),
            (&[Running, Stopped], JobState::Running),
            (&[Stopped, Done], JobState::Stopped),
            (&[Stopped, Stopped], JobState::Stopped),
            (&[Done, Done], JobState::Done),
            (&[Done, Error], JobState::Error),
            (&[Running, Error], JobState::Error),
        ];
        for (states, expected) in cases {
            let job = job_with_states(1, true, states);
            assert_eq!(job.derive_state(), *expected, "states: {states:?}");
        }
    }

    #[test]
    fn left_running_means_no_running_process() {
        use ProcessState::*;
        assert!(!job_with_states(1, true, &[Running, Done]).has_left_running());
        assert!(job_with_states(1, true, &[Stopped, Done]).has_left_running());
        assert!(job_with_states(1, true, &[Done]).has_left_running());
    }

    #[test]
    fn job_line_format() {
        let mut job = job_with_states(1, false, &[ProcessState::Running]);
        job.command = String::from("sleep 30");
        assert_eq!(
            job.format_line(true),
            "[1]+  Running                 sleep 30 &"
        );

        job.foreground = true;
        job.mark_all(ProcessState::Stopped);
        assert_eq!(
            job.format_line(false),
            "[1]-  Stopped                 sleep 30  "
        );
    }

    #[test]
    fn head_is_current_and_candidates_prefer_newest() {
        let mut table = JobTable::new();
        let first = table.claim_index();
        table.push_front(job_with_states(first, true, &[ProcessState::Stopped]));
        let second = table.claim_index();
        table.push_front(job_with_states(second, false, &[ProcessState::Running]));

        // Derived job states.
        table.job_at_mut(0).unwrap().state = JobState::Running;
        table.job_at_mut(1).unwrap().state = JobState::Stopped;

        assert_eq!(table.job_at(0).unwrap().index, second);
        // fg prefers the newest eligible job: the running background one.
        assert_eq!(table.fg_candidate(), Some(0));
        // bg only considers stopped jobs.
        assert_eq!(table.bg_candidate(), Some(1));
    }

    #[test]
    fn fg_candidate_ignores_foreground_running_jobs() {
        let mut table = JobTable::new();
        let index = table.claim_index();
        table.push_front(job_with_states(index, true, &[ProcessState::Running]));
        table.job_at_mut(0).unwrap().state = JobState::Running;

        assert_eq!(table.fg_candidate(), None);
        assert_eq!(table.bg_candidate(), None);
    }

    #[test]
    fn prune_keeps_order_and_shrinks_counter() {
        let mut table = JobTable::new();
        for _ in 0..3 {
            let index = table.claim_index();
            table.push_front(job_with_states(index, false, &[ProcessState::Running]));
        }

        // Oldest job finished.
        table.job_at_mut(2).unwrap().mark_all(ProcessState::Done);
        table.prune();

        let indices: Vec<i32> = table.iter().map(|j| j.index).collect();
        assert_eq!(indices, vec![3, 2]);
        assert_eq!(table.claim_index(), 3);
    }

    #[test]
    fn prune_is_idempotent() {
        let mut table = JobTable::new();
        let index = table.claim_index();
        table.push_front(job_with_states(index, false, &[ProcessState::Done]));
        table.job_at_mut(0).unwrap().state = JobState::Done;

        table.prune();
        assert!(table.job_at(0).is_none());
        let after_first = table.claim_index();
        table.prune();
        assert_eq!(table.claim_index(), after_first + 1);
    }
}
