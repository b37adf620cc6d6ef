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

//! Module responsible for parsing and checking the configuration file.
//!
//! To provide meaningful error messages. The configuration file uses
//! [YAML](https://en.wikipedia.org/wiki/YAML) and `serde` to enforce
//! strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml` so you can check this documentation
//! for more details how to set the config file.

use crate::constants::{WRF_STREAM_PREFIXES, YEAR_PLACEHOLDER};
use crate::errors::ConfigError;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Fields describing how the raw simulation output is organised.
///
/// The simulation is split into chunks, each started from a new
/// initial state and written into its own `YYYY_chunk` directory
/// under `base_dir`.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct SimulationLayout {
    /// Directory holding the chunk directories.
    pub base_dir: PathBuf,

    /// Number of years between the first and the last chunk start
    /// (e.g. chunks starting in 1977, 1987, 1997, 2007 and 2017 span `40` years).
    ///
    /// Must be divisible by `year_increment`.
    pub total_years: u32,

    /// Number of years between the starts of consecutive chunks.
    ///
    /// Cannot be less than `1`.
    pub year_increment: u32,

    /// _(Optional)_ Number of years covered by the output of a single chunk,
    /// counting the partial last year which only holds its first day.
    ///
    /// Defaults to `13`. Cannot be less than `2`.
    #[serde(default = "SimulationLayout::default_years_per_chunk")]
    pub years_per_chunk: u32,

    /// _(Optional)_ When set chunks start in the seventh year of a decade
    /// and the chunk year is searched anywhere in the directory name
    /// (e.g. `run_1977_chunk`), otherwise names must start with it.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub seventh_year_of_decade: bool,

    /// _(Optional)_ Which year inside a chunk (`1` for first, `2` for second, etc.)
    /// is the first one checked. Preceding years are spin-up output.
    ///
    /// Defaults to `1`. Must be smaller than `years_per_chunk`.
    #[serde(default = "SimulationLayout::default_ordinal_start_year")]
    pub ordinal_start_year: u32,

    /// _(Optional)_ Start year of the first chunk.
    ///
    /// Defaults to the year of the first chunk directory found.
    #[serde(default)]
    pub first_year: Option<i32>,

    /// _(Optional)_ Filename prefixes of the output streams expected
    /// in every chunk directory.
    ///
    /// Defaults to the six WRF streams (`wrfout_d01_`, `wrfout_hour_d01_`,
    /// `wrfout_pres_d01_`, `wrfout_zlev_d01_`, `wrfout_afwa_d01_`, `wrfrst_d01_`).
    #[serde(default = "SimulationLayout::default_stream_prefixes")]
    pub stream_prefixes: Vec<String>,
}

impl SimulationLayout {
    fn default_years_per_chunk() -> u32 {
        13
    }

    fn default_ordinal_start_year() -> u32 {
        1
    }

    fn default_stream_prefixes() -> Vec<String> {
        WRF_STREAM_PREFIXES.iter().map(|p| p.to_string()).collect()
    }

    /// Checks if the layout is consistent.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.year_increment < 1 {
            return Err(ConfigError::OutOfBounds(
                "Year increment cannot be less than 1",
            ));
        }

        if self.total_years % self.year_increment != 0 {
            return Err(ConfigError::OutOfBounds(
                "Total years must be a multiple of year increment",
            ));
        }

        if self.years_per_chunk < 2 {
            return Err(ConfigError::OutOfBounds(
                "Years per chunk cannot be less than 2",
            ));
        }

        if self.ordinal_start_year < 1 || self.ordinal_start_year >= self.years_per_chunk {
            return Err(ConfigError::OutOfBounds(
                "Ordinal start year must be between 1 and years per chunk minus 1",
            ));
        }

        if let (true, Some(first_year)) = (self.seventh_year_of_decade, self.first_year) {
            if first_year.rem_euclid(10) != 7 {
                return Err(ConfigError::OutOfBounds(
                    "First year must be the seventh year of a decade",
                ));
            }
        }

        if self.stream_prefixes.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "At least one stream prefix is required",
            ));
        }

        let unique: FxHashSet<&String> = self.stream_prefixes.iter().collect();
        if unique.len() != self.stream_prefixes.len() {
            return Err(ConfigError::OutOfBounds("Stream prefixes must be unique"));
        }

        Ok(())
    }
}

/// How post-processing units are dispatched.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// One unit after another in this process.
    Sequential,
    /// Units run concurrently on the thread pool.
    Pool,
    /// Units are written to a command file for an external job array.
    Cmdfile,
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch::Sequential
    }
}

/// Fields with information about the post-processing step,
/// run once for every month of every complete year.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Postprocess {
    /// Post-processing entry point.
    pub script: PathBuf,

    /// _(Optional)_ Program running the script.
    ///
    /// Defaults to `python`.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// _(Optional)_ Script called by the post-processing script
    /// (e.g. `cmorize.compress.sh`). When set it must exist and reside
    /// in the same directory as `script`.
    #[serde(default)]
    pub companion_script: Option<PathBuf>,

    /// _(Optional)_ Arguments passed to the script. `${YEAR}`, `${MONTH}`
    /// (without leading zero) and `${CHUNK_DIR}` are substituted.
    ///
    /// Defaults to `["${YEAR}", "${MONTH}"]`.
    #[serde(default = "Postprocess::default_arguments")]
    pub arguments: Vec<String>,

    /// _(Optional)_ `sequential`, `pool` or `cmdfile`.
    ///
    /// Defaults to `sequential`.
    #[serde(default)]
    pub dispatch: Dispatch,

    /// _(Optional)_ Working directory of the script, where it
    /// writes its output.
    ///
    /// Defaults to the current directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// _(Optional)_ Directory for per-unit logs and the invocation summary.
    ///
    /// Defaults to `./logs`.
    #[serde(default = "Postprocess::default_log_dir")]
    pub log_dir: PathBuf,

    /// _(Optional)_ Command file written in `cmdfile` dispatch.
    ///
    /// Defaults to `./cmdfile`.
    #[serde(default = "Postprocess::default_cmdfile")]
    pub cmdfile: PathBuf,
}

impl Postprocess {
    fn default_arguments() -> Vec<String> {
        vec!["${YEAR}".to_string(), "${MONTH}".to_string()]
    }

    fn default_log_dir() -> PathBuf {
        PathBuf::from("./logs")
    }

    fn default_cmdfile() -> PathBuf {
        PathBuf::from("./cmdfile")
    }
}

fn default_interpreter() -> String {
    "python".to_string()
}

/// Area shown in one panel of the time-series figure.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Region,
    Entire,
    Point,
}

/// Layout of the panels in the time-series figure.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelOrientation {
    Horizontal,
    Vertical,
}

impl Default for PanelOrientation {
    fn default() -> Self {
        PanelOrientation::Vertical
    }
}

/// Corners of the region of interest as `(lat, lon)` pairs.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Region {
    pub upper_left: (f64, f64),
    pub lower_left: (f64, f64),
    pub upper_right: (f64, f64),
    pub lower_right: (f64, f64),
}

/// Point of interest, e.g. a station.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

/// _(Optional)_ Fields with information about the plotting step.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Plot {
    /// Plotting entry point, called with the path to generated settings.
    pub script: PathBuf,

    /// _(Optional)_ Program running the script.
    ///
    /// Defaults to `python`.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// _(Optional)_ YAML file with the remaining plotting options
    /// (figure size, colours, labels). Values set here override it.
    #[serde(default)]
    pub settings_file: Option<PathBuf>,

    /// Directory with post-processed files. The `INPUT_DIR`
    /// environment variable takes precedence.
    pub input_dir: PathBuf,

    /// Directory where plots are written.
    pub output_dir: PathBuf,

    /// Post-processed filename with `${YEAR}` and `${MONTH}` placeholders.
    pub input_filename_template: String,

    /// _(Optional)_ Extension appended to input filenames, e.g. `.nc`.
    #[serde(default)]
    pub input_filename_extension: Option<String>,

    /// Plot filename (without extension) with the `${YEAR}` placeholder.
    pub output_filename_template: String,

    /// _(Optional)_ Plot file extension.
    ///
    /// Defaults to `png`.
    #[serde(default = "Plot::default_output_extension")]
    pub output_extension: String,

    /// _(Optional)_ Plotted variable.
    ///
    /// Defaults to the leading word of `input_filename_template`.
    #[serde(default)]
    pub data_var: Option<String>,

    /// _(Optional)_ Panels in the figure, in order.
    ///
    /// Defaults to `[entire]`. Entries cannot repeat.
    #[serde(default = "Plot::default_areas")]
    pub areas_of_interest: Vec<Area>,

    /// _(Optional)_ Defaults to `vertical`.
    #[serde(default)]
    pub panel_orientation: PanelOrientation,

    /// Required when `region` is in `areas_of_interest`.
    #[serde(default)]
    pub region: Option<Region>,

    /// Required when `point` is in `areas_of_interest`.
    #[serde(default)]
    pub point: Option<Point>,
}

impl Plot {
    fn default_output_extension() -> String {
        "png".to_string()
    }

    fn default_areas() -> Vec<Area> {
        vec![Area::Entire]
    }

    /// Checks if areas and their coordinates are complete.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !self.output_filename_template.contains(YEAR_PLACEHOLDER) {
            return Err(ConfigError::OutOfBounds(
                "Output filename template must contain ${YEAR}",
            ));
        }

        if self.areas_of_interest.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "At least one area of interest is required",
            ));
        }

        let unique: FxHashSet<Area> = self.areas_of_interest.iter().copied().collect();
        if unique.len() != self.areas_of_interest.len() {
            return Err(ConfigError::OutOfBounds(
                "Areas of interest cannot repeat",
            ));
        }

        if unique.contains(&Area::Region) {
            let region = self.region.ok_or(ConfigError::OutOfBounds(
                "Region corners are required to plot a region",
            ))?;

            let corners = [
                region.upper_left,
                region.lower_left,
                region.upper_right,
                region.lower_right,
            ];

            if corners.iter().any(|(lat, _)| !(-90.0..=90.0).contains(lat)) {
                return Err(ConfigError::OutOfBounds(
                    "Region latitude is too low or too high",
                ));
            }
        }

        if unique.contains(&Area::Point) {
            let point = self.point.ok_or(ConfigError::OutOfBounds(
                "Point coordinates are required to plot a point",
            ))?;

            if !(-90.0..=90.0).contains(&point.lat) {
                return Err(ConfigError::OutOfBounds(
                    "Point latitude is too low or too high",
                ));
            }
        }

        Ok(())
    }
}

/// Reaction to an incomplete chunk directory.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first incomplete chunk.
    FailFast,
    /// Check every chunk and report all of them.
    CollectAll,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::FailFast
    }
}

/// _(Optional)_ Fields with information about
/// resources available for the checker.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used in `pool` dispatch.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    /// Checks if thread count is above limit.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub layout: SimulationLayout,

    pub postprocess: Postprocess,

    #[serde(default)]
    pub plot: Option<Plot>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.layout.check_bounds()?;
        config.resources.check_bounds()?;

        if let Some(plot) = &config.plot {
            plot.check_bounds()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{Area, Config, Dispatch, FailurePolicy, PanelOrientation};
    use crate::errors::ConfigError;
    use std::path::Path;

    const MINIMAL: &str = "
layout:
  base_dir: /raw/wrf_d01
  total_years: 40
  year_increment: 10
postprocess:
  script: /scripts/postprocess.core.variables.py
";

    #[test]
    fn sample_config() {
        let cfg = Config::new_from_file(Path::new("./test-data/config.yaml")).unwrap();

        assert_eq!(cfg.layout.total_years, 40);
        assert_eq!(cfg.layout.years_per_chunk, 13);
        assert_eq!(cfg.layout.ordinal_start_year, 2);
        assert!(cfg.layout.seventh_year_of_decade);
        assert_eq!(cfg.layout.stream_prefixes.len(), 6);
        assert_eq!(cfg.postprocess.dispatch, Dispatch::Pool);
        assert_eq!(cfg.resources.threads, 4);

        let plot = cfg.plot.unwrap();
        assert_eq!(
            plot.areas_of_interest,
            vec![Area::Entire, Area::Region, Area::Point]
        );
        assert_eq!(plot.panel_orientation, PanelOrientation::Horizontal);
    }

    #[test]
    fn defaults() {
        let cfg = Config::new_from_slice(MINIMAL.as_bytes()).unwrap();

        assert_eq!(cfg.layout.years_per_chunk, 13);
        assert_eq!(cfg.layout.ordinal_start_year, 1);
        assert_eq!(cfg.layout.first_year, None);
        assert!(!cfg.layout.seventh_year_of_decade);
        assert_eq!(cfg.layout.stream_prefixes[0], "wrfout_d01_");
        assert_eq!(cfg.postprocess.interpreter, "python");
        assert_eq!(cfg.postprocess.arguments, vec!["${YEAR}", "${MONTH}"]);
        assert_eq!(cfg.postprocess.dispatch, Dispatch::Sequential);
        assert_eq!(cfg.failure_policy, FailurePolicy::FailFast);
        assert_eq!(cfg.resources.threads, 1);
        assert!(cfg.plot.is_none());
    }

    fn out_of_bounds(extra_layout: &str) -> bool {
        let yaml = MINIMAL.replace(
            "  year_increment: 10\n",
            &format!("  year_increment: 10\n{}", extra_layout),
        );

        matches!(
            Config::new_from_slice(yaml.as_bytes()),
            Err(ConfigError::OutOfBounds(_))
        )
    }

    #[test]
    fn layout_bounds() {
        assert!(out_of_bounds("  ordinal_start_year: 0\n"));
        assert!(out_of_bounds("  ordinal_start_year: 13\n"));
        assert!(!out_of_bounds("  ordinal_start_year: 12\n"));
        assert!(out_of_bounds("  years_per_chunk: 1\n"));
        assert!(out_of_bounds("  stream_prefixes: []\n"));
        assert!(out_of_bounds("  stream_prefixes: [a_, a_]\n"));
        assert!(out_of_bounds("  seventh_year_of_decade: true\n  first_year: 1980\n"));
        assert!(!out_of_bounds("  seventh_year_of_decade: true\n  first_year: 1977\n"));

        let uneven = MINIMAL.replace("total_years: 40", "total_years: 45");
        assert!(matches!(
            Config::new_from_slice(uneven.as_bytes()),
            Err(ConfigError::OutOfBounds(_))
        ));
    }

    #[test]
    fn plot_bounds() {
        let plot = |areas: &str, extra: &str| {
            format!(
                "{}plot:
  script: /scripts/plot.py
  input_dir: /post/tas
  output_dir: /plots
  input_filename_template: tas_hr_${{YEAR}}-${{MONTH}}
  output_filename_template: tas_${{YEAR}}
  areas_of_interest: {}
{}",
                MINIMAL, areas, extra
            )
        };

        let ok = plot("[entire, point]", "  point:\n    lat: 40.0\n    lon: 255.75\n");
        assert!(Config::new_from_slice(ok.as_bytes()).is_ok());

        for bad in [
            plot("[entire, entire]", ""),
            plot("[]", ""),
            plot("[region]", ""),
            plot("[point]", "  point:\n    lat: 140.0\n    lon: 0.0\n"),
        ] {
            assert!(matches!(
                Config::new_from_slice(bad.as_bytes()),
                Err(ConfigError::OutOfBounds(_))
            ));
        }

        let unknown = plot("[everywhere]", "");
        assert!(matches!(
            Config::new_from_slice(unknown.as_bytes()),
            Err(ConfigError::CantDeserialize(_))
        ));
    }
}
