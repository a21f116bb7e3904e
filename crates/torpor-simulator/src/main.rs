//! Desktop simulator for the torpor deep-sleep logger.
//!
//! Deep sleep on the device ends every cycle with a reset, so the simulator
//! runs each cycle in a fresh child process. The supervisor re-executes
//! itself once per cycle; the child loads the retained image and the
//! simulated hardware from the state directory, runs the lifecycle to
//! suspend, and writes both back. See [`options`] for the environment
//! variables.

use std::env;
use std::fs;
use std::io;
use std::process::{Command, ExitCode};

use log::{debug, error, info};

mod board;
mod clock;
mod cycle;
mod options;
mod state;

use options::Options;

/// Set on child processes that run a single cycle
const CYCLE_CHILD: &str = "TORPOR_CYCLE_CHILD";

fn main() -> ExitCode {
    let options = Options::from_env();

    if env::var_os(CYCLE_CHILD).is_some() {
        return match cycle::run(&options) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Cycle failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    env_logger::Builder::from_env(env_logger::Env::default().filter_or(options::LOG, "info"))
        .init();

    match supervise(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn supervise(options: &Options) -> io::Result<()> {
    fs::create_dir_all(&options.state_dir)?;
    let exe = env::current_exe()?;
    info!(
        "Running {} cycles in {}",
        options.cycles,
        options.state_dir.display()
    );

    for cycle in 0..options.cycles {
        let mut child = Command::new(&exe);
        child.env(CYCLE_CHILD, "1");
        if cycle > 0 {
            for name in options::ONE_SHOT {
                child.env_remove(name);
            }
        }

        let status = child.status()?;
        if !status.success() {
            return Err(io::Error::other(format!(
                "cycle process {cycle} exited with {status}"
            )));
        }
        debug!("Cycle process {} finished", cycle);
    }

    let samples = fs::read_to_string(options.state_dir.join(state::DATALOG_FILE))
        .map(|text| text.lines().count().saturating_sub(1))
        .unwrap_or(0);
    info!("Done, {} samples logged in total", samples);
    Ok(())
}
