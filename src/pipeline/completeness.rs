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

//! Module checking that chunk directories hold full years of output.
//!
//! Inside a chunk only the years of interest are checked: the
//! spin-up years before the ordinal start year are skipped, and so is
//! the last year of the chunk which only holds the first day of output.
//! For every stream each checked year needs one file per calendar day.
//!
//! When anything is missing the exact filenames are reported
//! so the failed simulation days can be rerun.

use super::{
    calendar::{days_in_year, days_of_year},
    chunks::{self, ChunkDirectory},
    configuration::{FailurePolicy, SimulationLayout},
    filesystem::FileSystem,
    patterns::{self, PatternInventory},
};
use crate::{
    constants::DAILY_FILE_TIME,
    errors::{CompletenessError, VerificationError},
};
use log::{debug, error, info, warn};
use rustc_hash::FxHashSet;
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Range,
    path::{Path, PathBuf},
};

/// Result of counting the files of one stream in one year.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct YearCompleteness {
    pub chunk: PathBuf,
    pub prefix: String,
    pub year: i32,
    pub expected: usize,
    pub found: usize,
    /// Expected files with no counterpart, empty when
    /// the count differs only by surplus files.
    pub missing: Vec<PathBuf>,
}

impl YearCompleteness {
    pub fn is_complete(&self) -> bool {
        self.found == self.expected && self.missing.is_empty()
    }
}

/// Complete years of every chunk directory, the only input
/// from which post-processing is scheduled.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CompletenessReport {
    chunks: BTreeMap<PathBuf, Vec<i32>>,
}

impl CompletenessReport {
    pub fn new(chunks: BTreeMap<PathBuf, Vec<i32>>) -> Self {
        CompletenessReport { chunks }
    }

    pub fn get(&self, chunk_dir: &Path) -> Option<&[i32]> {
        self.chunks.get(chunk_dir).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[i32])> {
        self.chunks
            .iter()
            .map(|(dir, years)| (dir.as_path(), years.as_slice()))
    }

    /// Distinct years of all chunks, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.chunks
            .values()
            .flatten()
            .copied()
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.values().all(Vec::is_empty)
    }
}

/// Years checked inside a chunk whose output begins in `first_year`.
pub fn years_of_interest(layout: &SimulationLayout, first_year: i32) -> Range<i32> {
    let start = first_year + layout.ordinal_start_year as i32 - 1;
    // the last year of the chunk holds a single day
    let end = first_year + layout.years_per_chunk as i32 - 1;

    start..end
}

/// Filename of the daily file of every day in `year`.
pub fn expected_filenames(prefix: &str, year: i32) -> Vec<String> {
    days_of_year(year)
        .into_iter()
        .map(|day| format!("{}{}_{}", prefix, day.format("%Y-%m-%d"), DAILY_FILE_TIME))
        .collect()
}

/// Counts the files of the `prefix` stream in `year`
/// and lists the days without a file.
pub fn check_year(
    fs: &impl FileSystem,
    chunk_dir: &Path,
    prefix: &str,
    year: i32,
) -> Result<YearCompleteness, CompletenessError> {
    let stub = format!("{}{}", prefix, year);
    let matched = fs
        .files_with_prefix(chunk_dir, &stub)
        .map_err(|source| CompletenessError::CantList {
            path: chunk_dir.to_path_buf(),
            source,
        })?;

    let expected = days_in_year(year);

    // prefix, date and separator, e.g. `wrfout_d01_1988-01-01_`
    let day_key_len = prefix.len() + "YYYY-MM-DD_".len();
    let present_days: FxHashSet<&str> = matched
        .iter()
        .filter_map(|name| name.get(..day_key_len))
        .collect();

    // surplus files can balance the count, so every day is looked up
    let missing: Vec<PathBuf> = expected_filenames(prefix, year)
        .into_iter()
        .filter(|name| !present_days.contains(&name[..day_key_len]))
        .map(|name| chunk_dir.join(name))
        .collect();

    Ok(YearCompleteness {
        chunk: chunk_dir.to_path_buf(),
        prefix: prefix.to_string(),
        year,
        expected,
        found: matched.len(),
        missing,
    })
}

/// Checks every stream of the chunk in each year of interest.
///
/// The inventory must already hold exactly the expected streams.
/// Shortfalls of all streams and years are collected before failing,
/// otherwise the complete years of the chunk are returned.
pub fn check(
    fs: &impl FileSystem,
    chunk: &ChunkDirectory,
    inventory: &PatternInventory,
    layout: &SimulationLayout,
) -> Result<Vec<i32>, CompletenessError> {
    let first_year = inventory
        .years()
        .into_iter()
        .next()
        .unwrap_or(chunk.start_year);

    if first_year != chunk.start_year {
        warn!(
            "First output year {} in {} differs from the chunk start year {}",
            first_year, chunk.name, chunk.start_year
        );
    }

    let years = years_of_interest(layout, first_year);
    debug!(
        "Checking years {}-{} in {}",
        years.start,
        years.end - 1,
        chunk.name
    );

    let mut valid_years = vec![];
    let mut shortfalls = vec![];

    for year in years {
        let mut year_complete = true;

        for family in inventory.families() {
            let status = check_year(fs, &chunk.path, &family.prefix, year)?;

            if !status.is_complete() {
                year_complete = false;
                shortfalls.push(status);
            }
        }

        if year_complete {
            valid_years.push(year);
        }
    }

    if !shortfalls.is_empty() {
        return Err(CompletenessError::FileCountShortfall {
            chunk: chunk.path.clone(),
            shortfalls,
        });
    }

    Ok(valid_years)
}

/// Resolves the chunk directories and checks all of them.
///
/// With [`FailurePolicy::FailFast`] checking stops at the first
/// incomplete chunk, with [`FailurePolicy::CollectAll`] every chunk
/// is checked. In both cases no report is produced if any chunk fails.
pub fn verify(
    fs: &impl FileSystem,
    layout: &SimulationLayout,
    policy: FailurePolicy,
) -> Result<CompletenessReport, VerificationError> {
    let chunk_dirs = chunks::resolve(fs, layout)?;
    info!(
        "Found all {} chunk directories in {}",
        chunk_dirs.len(),
        layout.base_dir.display()
    );

    let mut complete = BTreeMap::new();
    let mut failures = vec![];

    for chunk in &chunk_dirs {
        let result = patterns::inventory(fs, &chunk.path).and_then(|inventory| {
            debug!("Streams found in {}: {:?}", chunk.name, inventory.stubs());
            inventory.check_families(&chunk.path, &layout.stream_prefixes)?;
            check(fs, chunk, &inventory, layout)
        });

        match result {
            Ok(years) => {
                info!("{} is complete for years {:?}", chunk.name, years);
                complete.insert(chunk.path.clone(), years);
            }
            Err(err) => {
                log_failure(&err);
                failures.push(err);

                if policy == FailurePolicy::FailFast {
                    break;
                }
            }
        }
    }

    if !failures.is_empty() {
        return Err(VerificationError::Incomplete(failures));
    }

    Ok(CompletenessReport::new(complete))
}

/// Writes every offending stream and file of the failure to the log.
pub fn log_failure(err: &CompletenessError) {
    error!("{}", err);

    if let CompletenessError::FileCountShortfall { shortfalls, .. } = err {
        for shortfall in shortfalls {
            error!(
                "{}{}: found {} of {} files, {} missing",
                shortfall.prefix,
                shortfall.year,
                shortfall.found,
                shortfall.expected,
                shortfall.missing.len()
            );

            for missing in &shortfall.missing {
                error!("Missing {}", missing.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{check, check_year, expected_filenames, verify, years_of_interest};
    use crate::constants::WRF_STREAM_PREFIXES;
    use crate::errors::{CompletenessError, VerificationError};
    use crate::pipeline::{
        chunks::ChunkDirectory,
        configuration::{FailurePolicy, SimulationLayout},
        filesystem::memory::MemoryFs,
        patterns::inventory,
    };
    use std::path::{Path, PathBuf};

    const BASE: &str = "/raw/wrf_d01";

    fn layout(years_per_chunk: u32, ordinal_start_year: u32) -> SimulationLayout {
        SimulationLayout {
            base_dir: PathBuf::from(BASE),
            total_years: 10,
            year_increment: 10,
            years_per_chunk,
            seventh_year_of_decade: true,
            ordinal_start_year,
            first_year: None,
            stream_prefixes: WRF_STREAM_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn chunk(start_year: i32) -> ChunkDirectory {
        let name = format!("{}_chunk", start_year);
        ChunkDirectory {
            path: Path::new(BASE).join(&name),
            name,
            start_year,
        }
    }

    /// Full years from `start_year` to the year before the last,
    /// then only the first day of the last year.
    fn add_chunk(fs: &mut MemoryFs, start_year: i32, years_per_chunk: i32) {
        let dir = chunk(start_year).path;
        let last_year = start_year + years_per_chunk - 1;

        for prefix in WRF_STREAM_PREFIXES {
            for year in start_year..last_year {
                fs.add_year(&dir, prefix, year);
            }
            fs.add_file(dir.join(format!("{}{}-01-01_00:00:00", prefix, last_year)));
        }
    }

    fn run_check(fs: &MemoryFs, start_year: i32, layout: &SimulationLayout) -> Result<Vec<i32>, CompletenessError> {
        let chunk = chunk(start_year);
        let inv = inventory(fs, &chunk.path).unwrap();
        check(fs, &chunk, &inv, layout)
    }

    #[test]
    fn interest_window() {
        assert_eq!(years_of_interest(&layout(13, 2), 1987), 1988..1999);
        assert_eq!(years_of_interest(&layout(13, 1), 1987), 1987..1999);
        assert_eq!(years_of_interest(&layout(13, 12), 1987), 1998..1999);
        assert_eq!(years_of_interest(&layout(4, 3), 2017), 2019..2020);
    }

    #[test]
    fn expected_names() {
        let names = expected_filenames("wrfout_d01_", 1988);

        assert_eq!(names.len(), 366);
        assert_eq!(names[0], "wrfout_d01_1988-01-01_00:00:00");
        assert_eq!(names[59], "wrfout_d01_1988-02-29_00:00:00");
        assert_eq!(names[365], "wrfout_d01_1988-12-31_00:00:00");
        assert_eq!(expected_filenames("wrfrst_d01_", 1900).len(), 365);
    }

    #[test]
    fn complete_chunk() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1987, 5);

        let years = run_check(&fs, 1987, &layout(5, 2)).unwrap();

        // 1987 is spin-up and 1991 holds a single day
        assert_eq!(years, vec![1988, 1989, 1990]);
    }

    #[test]
    fn first_ordinal_year_is_checked() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1987, 4);

        assert_eq!(
            run_check(&fs, 1987, &layout(4, 1)).unwrap(),
            vec![1987, 1988, 1989]
        );

        // with ordinal 1 an incomplete first year fails the chunk
        fs.remove_file(chunk(1987).path.join("wrfout_afwa_d01_1987-07-04_00:00:00"));
        assert!(run_check(&fs, 1987, &layout(4, 1)).is_err());
        assert_eq!(run_check(&fs, 1987, &layout(4, 2)).unwrap(), vec![1988, 1989]);
    }

    #[test]
    fn spin_up_and_final_year_are_ignored() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1987, 4);
        let dir = chunk(1987).path;

        fs.remove_file(dir.join("wrfout_d01_1987-03-01_00:00:00"));
        // a fully written final year is still not checked
        fs.add_year(&dir, "wrfout_d01_", 1990);

        assert_eq!(run_check(&fs, 1987, &layout(4, 2)).unwrap(), vec![1988, 1989]);
    }

    #[test]
    fn reports_exact_missing_file() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1987, 4);
        let dir = chunk(1987).path;
        let removed = dir.join("wrfout_pres_d01_1988-02-29_00:00:00");
        assert!(fs.remove_file(&removed));

        match run_check(&fs, 1987, &layout(4, 2)) {
            Err(CompletenessError::FileCountShortfall { chunk, shortfalls }) => {
                assert_eq!(chunk, dir);
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].prefix, "wrfout_pres_d01_");
                assert_eq!(shortfalls[0].year, 1988);
                assert_eq!((shortfalls[0].found, shortfalls[0].expected), (365, 366));
                assert_eq!(shortfalls[0].missing, vec![removed]);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn missing_files_accumulate_across_streams() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1987, 4);
        let dir = chunk(1987).path;
        fs.remove_file(dir.join("wrfout_d01_1988-01-01_00:00:00"));
        fs.remove_file(dir.join("wrfrst_d01_1989-12-31_00:00:00"));
        fs.remove_file(dir.join("wrfrst_d01_1989-01-31_00:00:00"));

        match run_check(&fs, 1987, &layout(4, 2)) {
            Err(CompletenessError::FileCountShortfall { shortfalls, .. }) => {
                let missing: Vec<PathBuf> = shortfalls
                    .iter()
                    .flat_map(|s| s.missing.iter().cloned())
                    .collect();

                assert_eq!(
                    missing,
                    vec![
                        dir.join("wrfout_d01_1988-01-01_00:00:00"),
                        dir.join("wrfrst_d01_1989-01-31_00:00:00"),
                        dir.join("wrfrst_d01_1989-12-31_00:00:00"),
                    ]
                );
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn absent_year_lists_every_day() {
        let mut fs = MemoryFs::new();
        fs.add_year("/raw/wrf_d01/1987_chunk", "wrfout_d01_", 1987);

        let status = check_year(&fs, Path::new("/raw/wrf_d01/1987_chunk"), "wrfout_d01_", 1988).unwrap();

        assert!(!status.is_complete());
        assert_eq!(status.found, 0);
        assert_eq!(status.missing.len(), 366);
    }

    #[test]
    fn surplus_files_fail_without_missing_days() {
        let mut fs = MemoryFs::new();
        let dir = Path::new("/raw/wrf_d01/1987_chunk");
        fs.add_year(dir, "wrfout_d01_", 1989);
        fs.add_file(dir.join("wrfout_d01_1989-06-01_12:00:00"));

        let status = check_year(&fs, dir, "wrfout_d01_", 1989).unwrap();

        assert_eq!((status.found, status.expected), (366, 365));
        assert!(status.missing.is_empty());
        assert!(!status.is_complete());
    }

    #[test]
    fn surplus_file_does_not_hide_missing_day() {
        let mut fs = MemoryFs::new();
        let dir = Path::new("/raw/wrf_d01/1987_chunk");
        fs.add_year(dir, "wrfout_d01_", 1989);
        assert!(fs.remove_file(dir.join("wrfout_d01_1989-07-14_00:00:00")));
        fs.add_file(dir.join("wrfout_d01_1989-06-01_12:00:00"));

        let status = check_year(&fs, dir, "wrfout_d01_", 1989).unwrap();

        assert_eq!((status.found, status.expected), (365, 365));
        assert_eq!(
            status.missing,
            vec![dir.join("wrfout_d01_1989-07-14_00:00:00")]
        );
        assert!(!status.is_complete());
    }

    #[test]
    fn files_with_suffix_cover_their_day() {
        let mut fs = MemoryFs::new();
        let dir = Path::new("/raw/wrf_d01/1987_chunk");
        for name in expected_filenames("wrfout_d01_", 1989) {
            fs.add_file(dir.join(format!("{}.nc", name)));
        }
        fs.remove_file(dir.join("wrfout_d01_1989-05-05_00:00:00.nc"));

        let status = check_year(&fs, dir, "wrfout_d01_", 1989).unwrap();

        assert_eq!(status.missing, vec![dir.join("wrfout_d01_1989-05-05_00:00:00")]);
    }

    #[test]
    fn verify_policies() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1977, 4);
        add_chunk(&mut fs, 1987, 4);
        fs.remove_file("/raw/wrf_d01/1977_chunk/wrfout_zlev_d01_1978-10-10_00:00:00");
        fs.remove_file("/raw/wrf_d01/1987_chunk/wrfout_zlev_d01_1988-10-10_00:00:00");

        let layout = layout(4, 2);

        match verify(&fs, &layout, FailurePolicy::FailFast) {
            Err(VerificationError::Incomplete(failures)) => assert_eq!(failures.len(), 1),
            other => panic!("unexpected result {:?}", other),
        }

        match verify(&fs, &layout, FailurePolicy::CollectAll) {
            Err(VerificationError::Incomplete(failures)) => assert_eq!(failures.len(), 2),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn verify_complete_tree() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1977, 4);
        add_chunk(&mut fs, 1987, 4);

        let report = verify(&fs, &layout(4, 2), FailurePolicy::FailFast).unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(
            report.get(Path::new("/raw/wrf_d01/1987_chunk")),
            Some(&[1988, 1989][..])
        );
        assert_eq!(report.years(), vec![1978, 1979, 1988, 1989]);
    }

    #[test]
    fn verify_rejects_missing_stream() {
        let mut fs = MemoryFs::new();
        add_chunk(&mut fs, 1977, 4);
        add_chunk(&mut fs, 1987, 4);
        let mut layout = layout(4, 2);
        layout.stream_prefixes.push("wrfxtrm_d01_".to_string());

        match verify(&fs, &layout, FailurePolicy::CollectAll) {
            Err(VerificationError::Incomplete(failures)) => {
                assert_eq!(failures.len(), 2);
                assert!(failures
                    .iter()
                    .all(|f| matches!(f, CompletenessError::PatternCountMismatch { .. })));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
