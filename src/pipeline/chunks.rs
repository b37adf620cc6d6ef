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

//! Module resolving the chunk directories of a simulation.
//!
//! Every chunk directory is named after the year its simulation
//! segment starts (`1977_chunk`, `1987_chunk`, ...). Before any file
//! is counted all the chunks expected from the layout must be present,
//! and nothing else may sit next to them.

use super::{configuration::SimulationLayout, filesystem::FileSystem};
use crate::{constants::CHUNK_SUFFIX, errors::LayoutError};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::path::PathBuf;

lazy_static! {
    static ref CHUNK_NAME_AT_START: Regex = Regex::new(r"^(\d{4})_chunk").unwrap();
    static ref CHUNK_NAME_ANYWHERE: Regex = Regex::new(r"(\d{4})_chunk").unwrap();
}

/// One simulation segment directory.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChunkDirectory {
    pub path: PathBuf,
    pub name: String,
    pub start_year: i32,
}

/// Lists the chunk directories under the layout base directory
/// and checks them against the expected sequence of start years.
///
/// Directories are returned in lexicographic order of their names
/// which, with four-digit years, is also chronological.
pub fn resolve(
    fs: &impl FileSystem,
    layout: &SimulationLayout,
) -> Result<Vec<ChunkDirectory>, LayoutError> {
    let base_dir = &layout.base_dir;

    let mut names = fs
        .subdirectories(base_dir)
        .map_err(|source| LayoutError::CantList {
            path: base_dir.clone(),
            source,
        })?;
    names.sort();

    if names.is_empty() {
        return Err(LayoutError::NoChunkDirectories(base_dir.clone()));
    }

    let name_pattern: &Regex = if layout.seventh_year_of_decade {
        &*CHUNK_NAME_ANYWHERE
    } else {
        &*CHUNK_NAME_AT_START
    };

    let mut chunks = Vec::with_capacity(names.len());
    let mut unrecognized = vec![];

    for name in names {
        let start_year = name_pattern
            .captures(&name)
            .and_then(|caps| caps[1].parse::<i32>().ok());

        match start_year {
            Some(start_year) => chunks.push(ChunkDirectory {
                path: base_dir.join(&name),
                name,
                start_year,
            }),
            None => unrecognized.push(name),
        }
    }

    if !unrecognized.is_empty() {
        return Err(LayoutError::UnrecognizedDirectories(unrecognized));
    }

    let first_year = layout.first_year.unwrap_or(chunks[0].start_year);
    let expected = expected_chunk_years(layout, first_year);
    debug!("Expecting chunks starting in {:?}", expected);

    check_sequence(&chunks, &expected, layout.seventh_year_of_decade)?;

    Ok(chunks)
}

/// Start years of all chunks, from `first_year` up to and including
/// `first_year + total_years`.
pub fn expected_chunk_years(layout: &SimulationLayout, first_year: i32) -> Vec<i32> {
    let increment = layout.year_increment.max(1);

    (0..=layout.total_years / increment)
        .map(|step| first_year + (step * increment) as i32)
        .collect()
}

fn check_sequence(
    chunks: &[ChunkDirectory],
    expected: &[i32],
    seventh_year_of_decade: bool,
) -> Result<(), LayoutError> {
    let expected_set: FxHashSet<i32> = expected.iter().copied().collect();
    let mut seen = FxHashSet::default();
    let mut unexpected = vec![];

    for chunk in chunks {
        let wrong_decade_year = seventh_year_of_decade && chunk.start_year.rem_euclid(10) != 7;

        // a second directory for the same year is unexpected too
        if !expected_set.contains(&chunk.start_year)
            || !seen.insert(chunk.start_year)
            || wrong_decade_year
        {
            unexpected.push(chunk.name.clone());
        }
    }

    let missing: Vec<String> = expected
        .iter()
        .filter(|year| !seen.contains(*year))
        .map(|year| format!("{}{}", year, CHUNK_SUFFIX))
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(LayoutError::Inconsistent {
            missing,
            unexpected,
        });
    }

    let in_order = chunks
        .iter()
        .map(|c| c.start_year)
        .eq(expected.iter().copied());

    if !in_order {
        return Err(LayoutError::OutOfOrder(
            chunks.iter().map(|c| c.name.clone()).collect(),
        ));
    }

    Ok(())
}
