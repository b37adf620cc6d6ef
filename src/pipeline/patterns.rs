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

//! Module discovering the output streams present in a chunk directory.
//!
//! WRF writes every stream into files named
//! `<prefix>YYYY-MM-DD_hh:mm:ss`, so the text before the date
//! identifies the stream (e.g. `wrfout_hour_d01_`).

use super::filesystem::FileSystem;
use crate::errors::CompletenessError;
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

lazy_static! {
    static ref DATED_FILE: Regex =
        Regex::new(r"^(.*?)(\d{4})-\d{1,2}-\d{1,2}_\d{2}:\d{2}:\d{2}").unwrap();
}

/// One output stream and the years its files cover.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FilePatternFamily {
    pub prefix: String,
    pub years: BTreeSet<i32>,
}

impl FilePatternFamily {
    /// Filename stem shared by all files of the year,
    /// the glob `stub*` selects them.
    pub fn stub(&self, year: i32) -> String {
        format!("{}{}", self.prefix, year)
    }
}

/// Streams found in one chunk directory, keyed by prefix.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PatternInventory {
    families: BTreeMap<String, FilePatternFamily>,
}

/// Splits a dated filename into stream prefix and year.
pub fn parse_dated_filename(name: &str) -> Option<(&str, i32)> {
    let caps = DATED_FILE.captures(name)?;
    let prefix = caps.get(1)?.as_str();
    let year = caps.get(2)?.as_str().parse().ok()?;

    Some((prefix, year))
}

/// Collects the streams of all dated files in `chunk_dir`.
/// Files without a date are ignored.
pub fn inventory(
    fs: &impl FileSystem,
    chunk_dir: &Path,
) -> Result<PatternInventory, CompletenessError> {
    let files = fs
        .files(chunk_dir)
        .map_err(|source| CompletenessError::CantList {
            path: chunk_dir.to_path_buf(),
            source,
        })?;

    let mut inventory = PatternInventory::default();

    for name in &files {
        if let Some((prefix, year)) = parse_dated_filename(name) {
            inventory
                .families
                .entry(prefix.to_string())
                .or_insert_with(|| FilePatternFamily {
                    prefix: prefix.to_string(),
                    years: BTreeSet::new(),
                })
                .years
                .insert(year);
        }
    }

    Ok(inventory)
}

impl PatternInventory {
    pub fn families(&self) -> impl Iterator<Item = &FilePatternFamily> {
        self.families.values()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Representative filename stub (prefix with the earliest year)
    /// of every stream.
    pub fn stubs(&self) -> BTreeMap<&str, String> {
        self.families
            .values()
            .filter_map(|f| {
                f.years
                    .iter()
                    .next()
                    .map(|year| (f.prefix.as_str(), f.stub(*year)))
            })
            .collect()
    }

    /// All years with at least one file in any stream.
    pub fn years(&self) -> BTreeSet<i32> {
        self.families
            .values()
            .flat_map(|f| f.years.iter().copied())
            .collect()
    }

    /// Checks that exactly the `expected` streams were found,
    /// a missing or an additional stream fails the whole chunk.
    pub fn check_families(
        &self,
        chunk_dir: &Path,
        expected: &[String],
    ) -> Result<(), CompletenessError> {
        let missing: Vec<String> = expected
            .iter()
            .filter(|prefix| !self.families.contains_key(prefix.as_str()))
            .cloned()
            .collect();

        let unexpected: Vec<String> = self
            .families
            .keys()
            .filter(|prefix| !expected.contains(prefix))
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }

        Err(CompletenessError::PatternCountMismatch {
            chunk: chunk_dir.to_path_buf(),
            found: self.families.len(),
            expected: expected.len(),
            missing,
            unexpected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{inventory, parse_dated_filename};
    use crate::constants::WRF_STREAM_PREFIXES;
    use crate::errors::CompletenessError;
    use crate::pipeline::filesystem::memory::MemoryFs;
    use std::path::Path;

    const CHUNK: &str = "/raw/1987_chunk";

    fn expected() -> Vec<String> {
        WRF_STREAM_PREFIXES.iter().map(|p| p.to_string()).collect()
    }

    fn chunk_with(prefixes: &[&str]) -> MemoryFs {
        let mut fs = MemoryFs::new();
        for prefix in prefixes {
            fs.add_file(format!("{}/{}1988-01-01_00:00:00", CHUNK, prefix));
            fs.add_file(format!("{}/{}1989-06-15_00:00:00", CHUNK, prefix));
        }
        fs
    }

    #[test]
    fn dated_filenames() {
        assert_eq!(
            parse_dated_filename("wrfout_hour_d01_1988-02-29_00:00:00"),
            Some(("wrfout_hour_d01_", 1988))
        );
        assert_eq!(
            parse_dated_filename("wrfrst_d01_2000-1-1_12:00:00.nc"),
            Some(("wrfrst_d01_", 2000))
        );
        assert_eq!(parse_dated_filename("namelist.input"), None);
        assert_eq!(parse_dated_filename("wrfout_d01_1988-01-01"), None);
        assert_eq!(
            parse_dated_filename("wrfout_d01_1988-01-01_00:00:00_from_1987-12-31_00:00:00"),
            Some(("wrfout_d01_", 1988))
        );
    }

    #[test]
    fn six_streams() {
        let mut fs = chunk_with(&WRF_STREAM_PREFIXES);
        fs.add_file(format!("{}/rsl.out.0000", CHUNK));

        let inv = inventory(&fs, Path::new(CHUNK)).unwrap();

        assert_eq!(inv.len(), 6);
        assert_eq!(inv.years().into_iter().collect::<Vec<_>>(), vec![1988, 1989]);
        assert_eq!(inv.stubs()["wrfrst_d01_"], "wrfrst_d01_1988");
        assert!(inv.check_families(Path::new(CHUNK), &expected()).is_ok());
    }

    #[test]
    fn missing_stream() {
        let fs = chunk_with(&WRF_STREAM_PREFIXES[..5]);
        let inv = inventory(&fs, Path::new(CHUNK)).unwrap();

        match inv.check_families(Path::new(CHUNK), &expected()) {
            Err(CompletenessError::PatternCountMismatch {
                found,
                expected,
                missing,
                unexpected,
                ..
            }) => {
                assert_eq!((found, expected), (5, 6));
                assert_eq!(missing, vec!["wrfrst_d01_"]);
                assert!(unexpected.is_empty());
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn additional_stream() {
        let mut prefixes = WRF_STREAM_PREFIXES.to_vec();
        prefixes.push("wrfxtrm_d01_");
        let fs = chunk_with(&prefixes);
        let inv = inventory(&fs, Path::new(CHUNK)).unwrap();

        assert_eq!(inv.len(), 7);
        assert!(matches!(
            inv.check_families(Path::new(CHUNK), &expected()),
            Err(CompletenessError::PatternCountMismatch { unexpected, .. }) if unexpected == vec!["wrfxtrm_d01_"]
        ));
    }

    #[test]
    fn empty_chunk() {
        let mut fs = MemoryFs::new();
        fs.add_dir(CHUNK);
        let inv = inventory(&fs, Path::new(CHUNK)).unwrap();

        assert!(inv.is_empty());
        assert!(inv.check_families(Path::new(CHUNK), &expected()).is_err());
    }
}
