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

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::completeness::YearCompleteness;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error while reading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Raw data verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Cannot invoke post-processing: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Plotting failed: {0}")]
    Plot(#[from] PlotError),

    #[error("{0} post-processing unit(s) exited with an error, check the log for details")]
    ExternalInvocationFailure(usize),
}

impl PipelineError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::Verification(_) => 3,
            PipelineError::ExternalInvocationFailure(_) => 4,
            PipelineError::Invocation(_) | PipelineError::Plot(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open configuration file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize configuration file: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds: {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Cannot list chunk directories in {path}: {source}")]
    CantList {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No chunk directories were found in {0}")]
    NoChunkDirectories(PathBuf),

    #[error("Directories with names not matching the chunk naming pattern: {0:?}")]
    UnrecognizedDirectories(Vec<String>),

    #[error("Chunk directories do not match the expected years, missing: {missing:?}, unexpected: {unexpected:?}")]
    Inconsistent {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Chunk directories are not in chronological order: {0:?}")]
    OutOfOrder(Vec<String>),
}

#[derive(Error, Debug)]
pub enum CompletenessError {
    #[error("Cannot list files in {path}: {source}")]
    CantList {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{chunk} has {found} filename patterns instead of {expected}, missing: {missing:?}, unexpected: {unexpected:?}")]
    PatternCountMismatch {
        chunk: PathBuf,
        found: usize,
        expected: usize,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("{chunk} is incomplete: {} missing file(s) in {} stream-year(s)", missing_count(.shortfalls), .shortfalls.len())]
    FileCountShortfall {
        chunk: PathBuf,
        shortfalls: Vec<YearCompleteness>,
    },
}

fn missing_count(shortfalls: &[YearCompleteness]) -> usize {
    shortfalls.iter().map(|s| s.missing.len()).sum()
}

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("{0}")]
    Layout(#[from] LayoutError),

    #[error("{} chunk director(y/ies) incomplete: {}", .0.len(), join_failures(.0))]
    Incomplete(Vec<CompletenessError>),
}

fn join_failures(failures: &[CompletenessError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Script not found: {0}")]
    MissingScript(PathBuf),

    #[error("{companion} does not reside in the same directory as {script}")]
    ScriptsNotColocated { script: PathBuf, companion: PathBuf },

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot write command file or summary: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot write invocation summary: {0}")]
    Summary(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("No plot input files found for the requested years, first expected: {0}")]
    NoInputFiles(PathBuf),

    #[error("Cannot read or write plot settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot serialize plot settings: {0}")]
    Settings(#[from] serde_yaml::Error),

    #[error("Input filename template {0} does not start with a variable name")]
    NoDataVariable(String),

    #[error("Plotting script exited with code {0:?}")]
    Failed(Option<i32>),
}
