mod builtins;
mod executor;
mod job_control;
mod jobs;
mod parser;
mod redirect;
mod status;

use std::io::{self, Write};

use builtins::BuiltinAction;
use job_control::Terminal;
use jobs::JobTable;

const PIKACHU: &str = "
 █▀▀▄           ▄▀▀█
 █░░░▀▄ ▄▄▄▄▄ ▄▀░░░█
  ▀▄░░░▀░░░░░▀░░░▄▀
   ▐░░▄▀░░░▀▄░░▌▄▄▀▀▀▀█
   ▌▄▄▀▀░▄░▀▀▄▄▐░░░░░░█
▄▀▀▐▀▀░▄▄▄▄▄░▀▀▌▄▄▄░░░█
█░░░▀▄░█░░░█░▄▀░░░░█▀▀▀
 ▀▄░░▀░░▀▀▀░░▀░░░▄█▀
   █░░░░░░░░░░░▄▀▄░▀▄
   █░░░░░░░░░▄▀█  █░░█
   █░░░░░░░░░░░█▄█░░▄▀
   █░░░░░░░░░░░████▀
   ▀▄▄▀▀▄▄▀▀▄▄▄█▀";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    // The banner prints before the tty check so it shows up even when
    // someone pipes at us.
    if std::env::args().nth(1).as_deref() == Some("pikachu") {
        eprintln!("\n         YASH!{PIKACHU}\n(...and his best friend ^)\n");
    }

    let mut term = match Terminal::init() {
        Ok(term) => term,
        Err(msg) => {
            eprintln!("{msg}");
            return 1;
        }
    };
    job_control::install_signal_dispositions();

    ctrlc::set_handler(|| {
        print!("\n# ");
        let _ = io::stdout().flush();
    })
    .expect("Failed to set Ctrl-C handler");

    let mut table = JobTable::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        // Background completions since the last prompt land here.
        table.report(false);
        term.reclaim();

        print!("# ");
        if stdout.flush().is_err() {
            break;
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                continue;
            }
            Err(error) => {
                eprintln!("yash: error reading input: {error}");
                break;
            }
        }

        let tokens = parser::tokenize(&input);
        if tokens.is_empty() {
            continue;
        }

        match builtins::dispatch(&tokens, &mut table, &mut term) {
            Some(BuiltinAction::Exit) => break,
            Some(BuiltinAction::Continue) => continue,
            None => {}
        }

        let index = table.claim_index();
        let job = match jobs::build_job(tokens, index, term.attributes()) {
            Ok(job) => job,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };

        // The job is current from the moment it enters the table.
        table.push_front(job);
        if let Some(job) = table.job_at_mut(0) {
            if let Err(msg) = executor::launch(job) {
                eprintln!("{msg}");
            }
        }

        let (foreground, launched) = table
            .job_at(0)
            .map(|j| (j.foreground, j.pgid != 0))
            .unwrap_or((false, false));

        if foreground {
            if launched {
                executor::wait_in_foreground(&mut table, &mut term, 0);
            }
        } else {
            // Announce the new background job with a fresh state: a stage
            // that never spawned has already marked itself Done.
            table.update_job(0);
            if let Some(job) = table.job_at(0) {
                println!("{}", job.format_line(true));
            }
        }
    }

    shutdown(&table);
    0
}

/// SIGHUP every surviving job's process group, then announce the exit.
fn shutdown(table: &JobTable) {
    for job in table.iter() {
        if job.pgid > 0 {
            let _ = job_control::signal_group(job.pgid, libc::SIGHUP);
        }
    }
    println!("exit");
}
