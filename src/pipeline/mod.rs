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

//! Module containing the whole checking and post-processing pipeline.
//!
//! The raw WRF output of a CORDEX-CMIP6 simulation is stored in
//! chunk directories named after the first simulated year (e.g. `1987_chunk`),
//! each holding one file per day for every output stream. Before
//! post-processing can start, the pipeline:
//!
//! 1. resolves the chunk directories and checks that none is missing
//!    or misplaced ([`chunks`]),
//! 2. checks that every chunk holds exactly the configured streams ([`patterns`]),
//! 3. checks that every stream has a file for every day of every
//!    year of interest ([`completeness`]).
//!
//! Only when the whole tree is complete, the post-processing script is
//! submitted for every month of every year of interest ([`invoker`]) and
//! the yearly plots are generated for fully post-processed years ([`plotting`]).

mod calendar;
mod chunks;
pub(crate) mod completeness;
mod configuration;
mod filesystem;
mod invoker;
mod patterns;
mod plotting;


use crate::errors::PipelineError;
use completeness::CompletenessReport;
use configuration::Config;
use filesystem::{FileSystem, LocalFs};
use invoker::{ExternalStep, InvocationSummary, ScriptStep};
use log::{debug, error, info, warn};
use plotting::{PlotScript, PlotStep};
use std::{path::Path, sync::Arc};

/// Main pipeline function, reading the configuration and running
/// all steps against the local disk.
pub fn main(config_path: &Path, check_only: bool) -> Result<(), PipelineError> {
    debug!("Reading configuration from {}", config_path.display());
    let config = Config::new_from_file(config_path)?;

    let step = Arc::new(ScriptStep::new(&config.postprocess));
    let plot_step = config.plot.as_ref().map(PlotScript::new);

    run(&LocalFs, &config, check_only, &step, plot_step.as_ref())?;

    Ok(())
}

/// Runs the pipeline with the given external steps.
///
/// Returns `None` when only the verification was requested.
pub fn run<S, P>(
    fs: &impl FileSystem,
    config: &Config,
    check_only: bool,
    step: &Arc<S>,
    plot_step: Option<&P>,
) -> Result<Option<InvocationSummary>, PipelineError>
where
    S: ExternalStep + Send + Sync + 'static,
    P: PlotStep,
{
    info!(
        "Verifying raw output in {}",
        config.layout.base_dir.display()
    );
    let report = completeness::verify(fs, &config.layout, config.failure_policy)?;
    report_years(&report, check_only);

    if report.is_empty() {
        warn!("No years of interest found, nothing to post-process");
    }

    if check_only {
        info!("Raw output is complete, stopping after verification as requested");
        return Ok(None);
    }

    let summary = invoker::invoke(
        fs,
        &report,
        step,
        &config.postprocess,
        config.resources.threads,
    )?;

    let plotted = if !summary.executed() {
        debug!("No units were run by the checker, plotting is skipped");
        Ok(())
    } else if let (Some(plot), Some(plot_step)) = (&config.plot, plot_step) {
        let years = summary.complete_years();
        plotting::generate_plots(fs, plot, &years, plot_step)
    } else {
        Ok(())
    };

    // failed units take precedence over a failed plot
    if summary.failed_count() > 0 {
        if let Err(err) = &plotted {
            error!("Plotting failed: {}", err);
        }

        warn!(
            "{} of {} post-processing units failed",
            summary.failed_count(),
            summary.units.len()
        );
        return Err(PipelineError::ExternalInvocationFailure(
            summary.failed_count(),
        ));
    }

    plotted?;

    Ok(Some(summary))
}

/// Prints the complete years of every chunk when only the verification
/// was requested, otherwise they are only logged.
fn report_years(report: &CompletenessReport, check_only: bool) {
    info!(
        "{} years of interest are complete in {} chunk directories",
        report.years().len(),
        report.len()
    );

    for line in report_lines(report) {
        if check_only {
            println!("{}", line);
        } else {
            info!("{}", line);
        }
    }
}

fn report_lines(report: &CompletenessReport) -> Vec<String> {
    report
        .iter()
        .map(|(chunk_dir, years)| format!("{}: {:?}", chunk_dir.display(), years))
        .collect()
}
