/*
Copyright 2021 Jakub Lewandowski

This file is part of CORDEX Completeness Checker (cordex-check).

CORDEX Completeness Checker (cordex-check) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

CORDEX Completeness Checker (cordex-check) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with CORDEX Completeness Checker (cordex-check). If not, see https://www.gnu.org/licenses/.
*/

//! Module running the post-processing step for every month
//! of every complete year.
//!
//! Each `(year, month)` unit reads only its own raw files and writes
//! only its own output, so units can run in any order and concurrently.
//! The step itself is opaque: its exit status is recorded and its
//! output is logged, but a failed unit is never retried.

use super::{
    completeness::CompletenessReport,
    configuration::{Dispatch, Postprocess},
    filesystem::FileSystem,
};
use crate::{
    constants::{CHUNK_DIR_PLACEHOLDER, MONTHS, MONTH_PLACEHOLDER, YEAR_PLACEHOLDER},
    errors::InvocationError,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    process::Command,
    sync::{mpsc, Arc},
};

/// One post-processing job.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WorkUnit {
    pub chunk_dir: PathBuf,
    pub year: i32,
    /// Calendar month, `1..=12`.
    pub month: u32,
}

impl WorkUnit {
    /// Substitutes the unit into a `${YEAR}`/`${MONTH}`/`${CHUNK_DIR}` template.
    pub fn fill_template(&self, template: &str) -> String {
        template
            .replace(YEAR_PLACEHOLDER, &self.year.to_string())
            .replace(MONTH_PLACEHOLDER, &self.month.to_string())
            .replace(CHUNK_DIR_PLACEHOLDER, &self.chunk_dir.to_string_lossy())
    }

    fn log_name(&self) -> String {
        format!("out.{}.{}.log", self.year, self.month)
    }
}

/// Exit status and standard streams of a finished step.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StepOutput {
    pub success: bool,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// External program processing a single unit.
pub trait ExternalStep {
    fn run(&self, unit: &WorkUnit) -> io::Result<StepOutput>;

    /// Shell command equivalent to [`ExternalStep::run`].
    fn command_line(&self, unit: &WorkUnit) -> String;
}

/// Post-processing script started through its interpreter.
#[derive(Clone, Debug)]
pub struct ScriptStep {
    interpreter: String,
    script: PathBuf,
    arguments: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ScriptStep {
    pub fn new(config: &Postprocess) -> Self {
        ScriptStep {
            interpreter: config.interpreter.clone(),
            script: config.script.clone(),
            arguments: config.arguments.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    fn arguments(&self, unit: &WorkUnit) -> Vec<String> {
        self.arguments
            .iter()
            .map(|arg| unit.fill_template(arg))
            .collect()
    }
}

impl ExternalStep for ScriptStep {
    fn run(&self, unit: &WorkUnit) -> io::Result<StepOutput> {
        let mut command = Command::new(&self.interpreter);
        command.arg(&self.script).args(self.arguments(unit));

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command.output()?;

        Ok(StepOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn command_line(&self, unit: &WorkUnit) -> String {
        let mut words = vec![
            shell_quote(&self.interpreter),
            shell_quote(&self.script.to_string_lossy()),
        ];
        words.extend(self.arguments(unit).iter().map(|arg| shell_quote(arg)));

        let command = words.join(" ");

        match &self.working_dir {
            Some(dir) => format!("cd {} && {}", shell_quote(&dir.to_string_lossy()), command),
            None => command,
        }
    }
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));

    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Result of one unit, or the error which prevented starting it.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: WorkUnit,
    pub output: io::Result<StepOutput>,
}

impl UnitOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.output, Ok(output) if output.success)
    }
}

#[derive(Serialize)]
struct SummaryRecord {
    year: i32,
    month: u32,
    chunk_dir: String,
    exit_code: Option<i32>,
    succeeded: bool,
}

/// Units submitted by one run of the invoker.
#[derive(Debug, Default)]
pub struct InvocationSummary {
    pub units: Vec<WorkUnit>,
    /// Empty when units were only written to a command file.
    pub outcomes: Vec<UnitOutcome>,
}

impl InvocationSummary {
    /// True when the units were run by this process.
    pub fn executed(&self) -> bool {
        !self.outcomes.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    /// Years whose every month finished successfully.
    pub fn complete_years(&self) -> Vec<i32> {
        let mut months: BTreeMap<i32, FxHashSet<u32>> = BTreeMap::new();

        for outcome in self.outcomes.iter().filter(|o| o.succeeded()) {
            months
                .entry(outcome.unit.year)
                .or_default()
                .insert(outcome.unit.month);
        }

        months
            .into_iter()
            .filter(|(_, done)| MONTHS.all(|month| done.contains(&month)))
            .map(|(year, _)| year)
            .collect()
    }

    fn write_csv(&self, path: &Path) -> Result<(), InvocationError> {
        let mut out_file = csv::Writer::from_path(path)?;

        for outcome in &self.outcomes {
            out_file.serialize(SummaryRecord {
                year: outcome.unit.year,
                month: outcome.unit.month,
                chunk_dir: outcome.unit.chunk_dir.to_string_lossy().to_string(),
                exit_code: outcome.output.as_ref().ok().and_then(|o| o.code),
                succeeded: outcome.succeeded(),
            })?;
        }

        out_file.flush()?;

        Ok(())
    }
}

/// Every month of every year in the report, in chunk and year order.
///
/// Neighbouring chunks overlap, so a year complete in more than one
/// chunk is processed once, from the earliest of them.
pub fn work_units(report: &CompletenessReport) -> Vec<WorkUnit> {
    let mut units = vec![];
    let mut scheduled = FxHashSet::default();

    for (chunk_dir, years) in report.iter() {
        for year in years {
            if !scheduled.insert(*year) {
                debug!(
                    "{} already scheduled from an earlier chunk, skipping it in {}",
                    year,
                    chunk_dir.display()
                );
                continue;
            }

            for month in MONTHS {
                units.push(WorkUnit {
                    chunk_dir: chunk_dir.to_path_buf(),
                    year: *year,
                    month,
                });
            }
        }
    }

    units
}

/// Checks that the post-processing script exists and that
/// the companion script, when configured, sits next to it.
pub fn check_scripts(fs: &impl FileSystem, config: &Postprocess) -> Result<(), InvocationError> {
    if !fs.exists(&config.script) {
        return Err(InvocationError::MissingScript(config.script.clone()));
    }

    if let Some(companion) = &config.companion_script {
        if !fs.exists(companion) {
            return Err(InvocationError::MissingScript(companion.clone()));
        }

        if companion.parent() != config.script.parent() {
            return Err(InvocationError::ScriptsNotColocated {
                script: config.script.clone(),
                companion: companion.clone(),
            });
        }
    }

    Ok(())
}

/// Submits every unit of the report with the configured dispatch.
pub fn invoke<S>(
    fs: &impl FileSystem,
    report: &CompletenessReport,
    step: &Arc<S>,
    config: &Postprocess,
    threads: u16,
) -> Result<InvocationSummary, InvocationError>
where
    S: ExternalStep + Send + Sync + 'static,
{
    check_scripts(fs, config)?;

    let units = work_units(report);
    info!("Submitting {} post-processing units", units.len());

    fs::create_dir_all(&config.log_dir)?;

    if config.dispatch == Dispatch::Cmdfile {
        write_cmdfile(&config.cmdfile, &config.log_dir, &units, step.as_ref())?;
        info!(
            "Commands written to {}, submit it to the job scheduler",
            config.cmdfile.display()
        );

        return Ok(InvocationSummary {
            units,
            outcomes: vec![],
        });
    }

    let units_bar = ProgressBar::new(units.len() as u64);
    units_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    units_bar.set_prefix("Post-processed months");

    let mut outcomes = Vec::with_capacity(units.len());

    let mut record = |outcome: UnitOutcome| {
        log_outcome(&outcome, &config.log_dir);
        outcomes.push(outcome);
        units_bar.inc(1);
    };

    match config.dispatch {
        Dispatch::Pool => {
            debug!("Setting up ThreadPool with {} threads", threads);
            let threadpool = ThreadPoolBuilder::new()
                .num_threads(threads as usize)
                .build()?;

            let (tx, rx) = mpsc::channel();

            for unit in units.iter().cloned() {
                let tx = tx.clone();
                let step = Arc::clone(step);

                threadpool.spawn(move || {
                    let output = step.run(&unit);
                    // receiver outlives all units
                    let _ = tx.send(UnitOutcome { unit, output });
                });
            }
            drop(tx);

            for outcome in rx.iter().take(units.len()) {
                record(outcome);
            }
        }
        _ => {
            for unit in units.iter().cloned() {
                let output = step.run(&unit);
                record(UnitOutcome { unit, output });
            }
        }
    }

    units_bar.finish_with_message("All units finished");

    let summary = InvocationSummary { units, outcomes };
    summary.write_csv(&config.log_dir.join("invocations.csv"))?;

    Ok(summary)
}

fn log_outcome(outcome: &UnitOutcome, log_dir: &Path) {
    let unit = &outcome.unit;

    match &outcome.output {
        Ok(output) => {
            debug!("{}-{} stdout: {}", unit.year, unit.month, output.stdout.trim_end());
            debug!("{}-{} stderr: {}", unit.year, unit.month, output.stderr.trim_end());

            let log_path = log_dir.join(unit.log_name());
            let log = format!("{}{}", output.stdout, output.stderr);
            if let Err(err) = fs::write(&log_path, log) {
                error!("Cannot write {}: {}", log_path.display(), err);
            }

            if !output.success {
                error!(
                    "Post-processing of {}-{} exited with {:?}, see {}",
                    unit.year,
                    unit.month,
                    output.code,
                    log_path.display()
                );
            }
        }
        Err(err) => error!(
            "Post-processing of {}-{} could not be started: {}",
            unit.year, unit.month, err
        ),
    }
}

/// Writes one shell command per unit, each redirecting
/// its output to its own log file.
pub fn write_cmdfile(
    path: &Path,
    log_dir: &Path,
    units: &[WorkUnit],
    step: &impl ExternalStep,
) -> io::Result<()> {
    let mut lines = String::new();

    for unit in units {
        let log_path = log_dir.join(unit.log_name());
        lines.push_str(&format!(
            "{} > {} 2>&1\n",
            step.command_line(unit),
            shell_quote(&log_path.to_string_lossy())
        ));
    }

    fs::write(path, lines)
}
