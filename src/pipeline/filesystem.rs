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

//! Module providing the directory listing capability
//! used by the checker.
//!
//! Raw data trees of a full simulation hold hundreds of thousands
//! of files, so all checks only ever list directories and
//! never open the files. Listing is hidden behind the [`FileSystem`]
//! trait so checks can also run against an in-memory tree.

use glob::{GlobError, Pattern};
use std::{fs, io, path::Path};

/// Read-only view of a directory tree.
pub trait FileSystem {
    /// Names of immediate subdirectories of `dir`.
    fn subdirectories(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Names of regular files directly inside `dir`.
    fn files(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Names of files inside `dir` starting with `prefix`,
    /// the equivalent of the `dir/prefix*` glob.
    fn files_with_prefix(&self, dir: &Path, prefix: &str) -> io::Result<Vec<String>> {
        Ok(self
            .files(dir)?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    fn exists(&self, path: &Path) -> bool;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Copy, Clone, Debug, Default)]
pub struct LocalFs;

impl LocalFs {
    fn entries(dir: &Path, want_dirs: bool) -> io::Result<Vec<String>> {
        let mut names = vec![];

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            // follows symlinks so linked chunk directories are accepted
            let is_dir = entry.path().is_dir();

            if is_dir == want_dirs {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        Ok(names)
    }
}

impl FileSystem for LocalFs {
    fn subdirectories(&self, dir: &Path) -> io::Result<Vec<String>> {
        LocalFs::entries(dir, true)
    }

    fn files(&self, dir: &Path) -> io::Result<Vec<String>> {
        LocalFs::entries(dir, false)
    }

    fn files_with_prefix(&self, dir: &Path, prefix: &str) -> io::Result<Vec<String>> {
        let dir_str = dir.to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not valid UTF-8", dir.display()),
            )
        })?;
        let pattern = Path::new(&Pattern::escape(dir_str))
            .join(format!("{}*", Pattern::escape(prefix)));

        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;

        let mut names = vec![];

        for path in paths {
            let path = path.map_err(GlobError::into_error)?;

            if path.is_dir() {
                continue;
            }

            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().to_string());
            }
        }

        Ok(names)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
