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

//! Module containing constants used by the checker.

/// Raw output files expected in a non-leap year, one per day.
pub const EXPECTED_NUM_FILES: usize = 365;

/// Raw output files expected in a leap year, one per day.
pub const EXPECTED_NUM_FILES_LEAP_YEAR: usize = 366;

/// Filename prefixes of the WRF output streams written into
/// every chunk directory. Each stream has one file per day.
pub const WRF_STREAM_PREFIXES: [&str; 6] = [
    "wrfout_d01_",
    "wrfout_hour_d01_",
    "wrfout_pres_d01_",
    "wrfout_zlev_d01_",
    "wrfout_afwa_d01_",
    "wrfrst_d01_",
];

/// Time of day stamped on the daily raw output files.
pub const DAILY_FILE_TIME: &str = "00:00:00";

/// Suffix of chunk directory names, after the start year.
pub const CHUNK_SUFFIX: &str = "_chunk";

/// Placeholders substituted in filename and argument templates.
pub const YEAR_PLACEHOLDER: &str = "${YEAR}";
pub const MONTH_PLACEHOLDER: &str = "${MONTH}";
pub const CHUNK_DIR_PLACEHOLDER: &str = "${CHUNK_DIR}";

/// Calendar months, every one is a separate post-processing unit.
pub const MONTHS: std::ops::RangeInclusive<u32> = 1..=12;
