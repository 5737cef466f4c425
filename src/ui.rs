use std::fmt::Display;
use std::io::BufRead;
use std::path::Path;

use anyhow::Result;
use colored::{ColoredString, Colorize};

use util::Timer;

use crate::settings::Settings;

/// Label printed in front of a node (or node file) the user should know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Completed,
    Run,
    Failed,
    Deleting,
}

impl Status {
    fn label(self) -> ColoredString {
        match self {
            Self::Completed => "COMPLETED".green(),
            Self::Run => "RUN".green(),
            Self::Failed => "FAILED".red(),
            Self::Deleting => "Deleting".red(),
        }
    }
}

/// All interactions with the text UI should go through this struct.
/// It holds no interior mutability, so worker threads can share a `&Ui`.
pub struct Ui {
    /// -v setting, displays extra text info to user
    pub verbose: bool,
    /// -y setting, ignores all points where the user is prompted to enter 'y'
    override_confirmation: bool,
    /// times the setup stages (indexing, assembly)
    timer: Timer,
}

impl Ui {
    pub fn new(settings: &Settings) -> Self {
        Self {
            verbose: settings.verbose > 0,
            override_confirmation: settings.yes,
            timer: Timer::now(),
        }
    }

    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.override_confirmation {
            return Ok(true);
        }
        eprintln!("{} (y/N)", prompt);

        let mut answer = String::with_capacity(16);
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim_start().chars().next(), Some('y' | 'Y')))
    }

    /// `LABEL msg`, always shown.
    pub fn status(&self, status: Status, msg: impl Display) {
        eprintln!("{} {msg}", status.label());
    }

    /// `LABEL node (program) in "dir"`, always shown.
    pub fn node(&self, status: Status, node: impl Display, dir: &Path) {
        eprintln!("{} {node} in {dir:?}", status.label());
    }

    /// Green line for the end states of a run ("No sessions to run", etc.).
    pub fn finished(&self, msg: &str) {
        eprintln!("{}", msg.green());
    }

    pub fn sessions_found(&self, found: usize, excluded: usize) {
        eprintln!(
            "Found {} sessions to process ({excluded} excluded).",
            found.to_string().cyan()
        );
    }

    pub fn start_timer(&mut self) {
        self.timer.reset();
    }

    /// Time since the last `start_timer`.
    pub fn print_elapsed(&self, stage: &str) {
        self.print_elapsed_since(&self.timer, stage);
    }

    /// Time measured by a timer the caller owns, e.g. one per node.
    pub fn print_elapsed_since(&self, timer: &Timer, what: &str) {
        if self.verbose {
            timer.print_elapsed(what);
        }
    }

    pub fn verbose_msg(&self, msg: &str) {
        if self.verbose {
            eprintln!("{}", msg);
        }
    }

    /// Magenta heading on its own line, e.g. before listing checked files.
    pub fn verbose_heading(&self, msg: &str) {
        if self.verbose {
            eprintln!("\n{}", format!("{msg}...").magenta());
        }
    }

    pub fn verbose_progress(&self, msg: &str) {
        if self.verbose {
            eprint!("{}... ", msg.magenta());
        }
    }

    pub fn verbose_progress_debug<T: std::fmt::Debug>(&self, msg: &str, arg: T) {
        if self.verbose {
            eprint!("{} {:?}... ", msg.magenta(), arg);
        }
    }

    pub fn done(&self) {
        if self.verbose {
            eprintln!("{}.", "done".green());
        }
    }
}
