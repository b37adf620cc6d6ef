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

//! Module preparing and starting the plotting step for the
//! post-processed years.
//!
//! Plots are regenerated only when at least one of the yearly
//! figures is absent from the output directory.

use super::{
    configuration::{Area, PanelOrientation, Plot},
    filesystem::FileSystem,
    invoker::StepOutput,
};
use crate::{
    constants::{MONTHS, MONTH_PLACEHOLDER, YEAR_PLACEHOLDER},
    errors::PlotError,
};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    process::Command,
};

lazy_static! {
    static ref LEADING_WORD: Regex = Regex::new(r"^(\w+?)_").unwrap();
}

/// Name of the settings file handed to the plotting script.
const SETTINGS_FILE_NAME: &str = "plot_settings.yaml";

/// Plotting program, called with the path of the settings file.
pub trait PlotStep {
    fn plot(&self, settings: &Path) -> io::Result<StepOutput>;
}

#[derive(Clone, Debug)]
pub struct PlotScript {
    interpreter: String,
    script: PathBuf,
}

impl PlotScript {
    pub fn new(config: &Plot) -> Self {
        PlotScript {
            interpreter: config.interpreter.clone(),
            script: config.script.clone(),
        }
    }
}

impl PlotStep for PlotScript {
    fn plot(&self, settings: &Path) -> io::Result<StepOutput> {
        let output = Command::new(&self.interpreter)
            .arg(&self.script)
            .arg(settings)
            .output()?;

        Ok(StepOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Plot filename of every year, e.g. `tas_1988.png`.
pub fn expected_plot_files(template: &str, years: &[i32], extension: &str) -> Vec<String> {
    years
        .iter()
        .map(|year| {
            format!(
                "{}.{}",
                template.replace(YEAR_PLACEHOLDER, &year.to_string()),
                extension
            )
        })
        .collect()
}

/// True when the plot of every year is already in `output_dir`.
pub fn should_skip(
    fs: &impl FileSystem,
    output_dir: &Path,
    template: &str,
    years: &[i32],
    extension: &str,
) -> bool {
    let present: FxHashSet<String> = match fs.files(output_dir) {
        Ok(files) => files.into_iter().collect(),
        Err(err) => {
            debug!("Cannot list {}: {}", output_dir.display(), err);
            FxHashSet::default()
        }
    };

    expected_plot_files(template, years, extension)
        .iter()
        .all(|name| present.contains(name))
}

/// Variable name leading the post-processed filename,
/// e.g. `tas` for `tas_NAM-12_ERA5_..._${YEAR}-${MONTH}`.
pub fn data_variable(template: &str) -> Option<&str> {
    LEADING_WORD
        .captures(template)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Directory with post-processed files, `INPUT_DIR` takes precedence.
pub fn input_dir(config: &Plot) -> PathBuf {
    env::var_os("INPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.input_dir.clone())
}

fn zero_padded_months() -> Vec<String> {
    MONTHS.map(|month| format!("{:02}", month)).collect()
}

/// Post-processed files of all months of `years` which exist.
///
/// Absent files are only reported, but at least one must exist.
pub fn input_files(
    fs: &impl FileSystem,
    config: &Plot,
    input_dir: &Path,
    years: &[i32],
) -> Result<Vec<PathBuf>, PlotError> {
    let extension = config.input_filename_extension.as_deref().unwrap_or("");
    let mut found = vec![];
    let mut missing = vec![];

    for year in years {
        for month in zero_padded_months() {
            let name = config
                .input_filename_template
                .replace(YEAR_PLACEHOLDER, &year.to_string())
                .replace(MONTH_PLACEHOLDER, &month);
            let path = input_dir.join(format!("{}{}", name, extension));

            if fs.exists(&path) {
                found.push(path);
            } else {
                missing.push(path);
            }
        }
    }

    for path in &missing {
        warn!("Missing plot input file {}", path.display());
    }

    if found.is_empty() {
        let first = missing
            .into_iter()
            .next()
            .unwrap_or_else(|| input_dir.to_path_buf());
        return Err(PlotError::NoInputFiles(first));
    }

    Ok(found)
}

#[derive(Serialize)]
struct PlotOverrides<'a> {
    input_dir: &'a Path,
    output_dir: &'a Path,
    input_filename_template: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_filename_extension: Option<&'a str>,
    output_filename_template: &'a str,
    years_by_list: bool,
    years: &'a [i32],
    months_by_list: bool,
    months_list: Vec<String>,
    data_var: &'a str,
    areas_of_interest: &'a [Area],
    panel_orientation: PanelOrientation,
    #[serde(skip_serializing_if = "Option::is_none")]
    region_upper_left: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region_lower_left: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region_upper_right: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region_lower_right: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    point_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    point_lon: Option<f64>,
}

/// Settings record for the plotting script: options from the
/// optional settings file with the run-specific values on top.
pub fn build_settings(config: &Plot, input_dir: &Path, years: &[i32]) -> Result<Value, PlotError> {
    let mut settings = match &config.settings_file {
        Some(path) => match serde_yaml::from_slice(&fs::read(path)?)? {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            _ => {
                warn!(
                    "{} is not a mapping of settings, ignoring it",
                    path.display()
                );
                Mapping::new()
            }
        },
        None => Mapping::new(),
    };

    let data_var = match &config.data_var {
        Some(data_var) => data_var.as_str(),
        None => data_variable(&config.input_filename_template)
            .ok_or_else(|| PlotError::NoDataVariable(config.input_filename_template.clone()))?,
    };

    let overrides = PlotOverrides {
        input_dir,
        output_dir: &config.output_dir,
        input_filename_template: &config.input_filename_template,
        input_filename_extension: config.input_filename_extension.as_deref(),
        output_filename_template: &config.output_filename_template,
        years_by_list: true,
        years,
        months_by_list: true,
        months_list: zero_padded_months(),
        data_var,
        areas_of_interest: &config.areas_of_interest,
        panel_orientation: config.panel_orientation,
        region_upper_left: config.region.map(|r| r.upper_left),
        region_lower_left: config.region.map(|r| r.lower_left),
        region_upper_right: config.region.map(|r| r.upper_right),
        region_lower_right: config.region.map(|r| r.lower_right),
        point_lat: config.point.map(|p| p.lat),
        point_lon: config.point.map(|p| p.lon),
    };

    if let Value::Mapping(overrides) = serde_yaml::to_value(overrides)? {
        for (key, value) in overrides {
            settings.insert(key, value);
        }
    }

    Ok(Value::Mapping(settings))
}

/// Runs the plotting step for `years` unless all their plots exist.
pub fn generate_plots(
    fs: &impl FileSystem,
    config: &Plot,
    years: &[i32],
    step: &impl PlotStep,
) -> Result<(), PlotError> {
    if years.is_empty() {
        info!("No fully post-processed years, nothing to plot");
        return Ok(());
    }

    if should_skip(
        fs,
        &config.output_dir,
        &config.output_filename_template,
        years,
        &config.output_extension,
    ) {
        info!(
            "All plots already exist for years {:?}, skip creating these plots",
            years
        );
        return Ok(());
    }

    let input_dir = input_dir(config);
    let inputs = input_files(fs, config, &input_dir, years)?;
    debug!("Plotting from {} input files", inputs.len());

    let settings = build_settings(config, &input_dir, years)?;

    fs::create_dir_all(&config.output_dir)?;
    let settings_path = config.output_dir.join(SETTINGS_FILE_NAME);
    fs::write(&settings_path, serde_yaml::to_string(&settings)?)?;

    info!("Generating plots for years {:?}", years);
    let output = step.plot(&settings_path)?;

    debug!("Plotting stdout: {}", output.stdout.trim_end());
    debug!("Plotting stderr: {}", output.stderr.trim_end());

    if !output.success {
        return Err(PlotError::Failed(output.code));
    }

    Ok(())
}
