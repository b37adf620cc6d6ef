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

//! CORDEX Completeness Checker (cordex-check) verifies that the raw
//! WRF output of a CORDEX-CMIP6 regional climate simulation is complete
//! before starting the post-processing and plotting of it.
//!
//! A simulation spanning several decades is run in chunks and one
//! missing daily file is enough to corrupt the monthly post-processed
//! output, so every file of every stream is accounted for first.

mod constants;
mod errors;
mod pipeline;

use clap::{value_parser, Arg, ArgAction, Command};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;

/// The main program function.
/// Prepares the runtime environment and calls the [`pipeline::main`].
///
/// The `env_logger` needs to be initiated before any log messages
/// are possible to occur. Errors end the process with
/// the exit code of their kind.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("CORDEX_CHECK_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("CORDEX_CHECK_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    let cli = Command::new("cordex-check")
        .about("Checks raw CORDEX-CMIP6 WRF output and starts its post-processing")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .default_value("config.yaml")
                .help("Path to a configuration file (YAML)"),
        )
        .arg(
            Arg::new("check-only")
                .long("check-only")
                .action(ArgAction::SetTrue)
                .help("Stop after verification and print the complete years"),
        )
        .get_matches();

    let config_path = cli
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let check_only = cli.get_flag("check-only");

    match pipeline::main(&config_path, check_only) {
        Ok(_) => info!("Checker finished. Check the log directory and output."),
        Err(err) => {
            error!("Checker failed with error: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}
