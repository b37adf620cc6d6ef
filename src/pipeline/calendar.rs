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

//! Gregorian calendar rules deciding how many daily
//! files a complete year of output holds.

use crate::constants::{EXPECTED_NUM_FILES, EXPECTED_NUM_FILES_LEAP_YEAR};
use chrono::{Datelike, NaiveDate};

/// Leap year is divisible by 4, except centuries
/// which are leap only when divisible by 400.
pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && !(year % 100 == 0 && year % 400 != 0)
}

/// Number of daily files expected for the year.
pub fn days_in_year(year: i32) -> usize {
    if is_leap_year(year) {
        EXPECTED_NUM_FILES_LEAP_YEAR
    } else {
        EXPECTED_NUM_FILES
    }
}

/// All calendar days of the year in chronological order.
///
/// Returns an empty list for years outside the range
/// representable by [`NaiveDate`].
pub fn days_of_year(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(EXPECTED_NUM_FILES_LEAP_YEAR);
    let mut date = NaiveDate::from_ymd_opt(year, 1, 1);

    while let Some(day) = date.filter(|d| d.year() == year) {
        days.push(day);
        date = day.succ_opt();
    }

    days
}

#[cfg(test)]
mod tests {
    use super::{days_in_year, days_of_year, is_leap_year};
    use chrono::Datelike;

    #[test]
    fn gregorian_rule() {
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2023));
        assert!(is_leap_year(2400));
        assert!(!is_leap_year(2100));
        assert!(is_leap_year(1988));
        assert!(!is_leap_year(1977));
    }

    #[test]
    fn expected_file_count() {
        assert_eq!(days_in_year(1996), 366);
        assert_eq!(days_in_year(1997), 365);
        assert_eq!(days_in_year(1900), 365);
    }

    #[test]
    fn days_agree_with_leap_rule() {
        for year in 1850..2150 {
            assert_eq!(days_of_year(year).len(), days_in_year(year), "year {}", year);
        }
    }

    #[test]
    fn february_length() {
        let february = |year| {
            days_of_year(year)
                .into_iter()
                .filter(|d| d.month() == 2)
                .count()
        };

        assert_eq!(february(2000), 29);
        assert_eq!(february(2100), 28);
        assert_eq!(days_of_year(1990).first().map(|d| d.ordinal()), Some(1));
    }
}
