// Copyright 2022 The hwpack-tools Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Property-level assertions over tar archives: "archive A has a member
//! at path P whose attributes match this subset". Mismatches are values
//! with equality and hashing, so tests can compare them structurally.

use anyhow::{Context, Result};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// A structural mismatch between an archive and an expectation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TarMismatch {
    MissingPath {
        archive: String,
        path: String,
    },
    WrongValue {
        attribute: &'static str,
        archive: String,
        path: String,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for TarMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TarMismatch::MissingPath { archive, path } => {
                write!(f, "{:?} has no path {:?}", archive, path)
            }
            TarMismatch::WrongValue {
                attribute,
                archive,
                path,
                expected,
                actual,
            } => write!(
                f,
                "the path {:?} in {:?} has {} {}, expected {}",
                path, archive, attribute, actual, expected
            ),
        }
    }
}

/// Expected attributes of one archive member. Unset attributes are not
/// checked.
#[derive(Debug, Clone, Default)]
pub struct TarEntryExpectation {
    path: String,
    entry_type: Option<tar::EntryType>,
    size: Option<u64>,
    mtime: Option<u64>,
    mode: Option<u32>,
    linkname: Option<String>,
    uid: Option<u64>,
    gid: Option<u64>,
    uname: Option<String>,
    gname: Option<String>,
    content: Option<Vec<u8>>,
}

impl TarEntryExpectation {
    pub fn new(path: &str) -> TarEntryExpectation {
        TarEntryExpectation {
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn entry_type(mut self, entry_type: tar::EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn linkname(mut self, linkname: &str) -> Self {
        self.linkname = Some(linkname.to_string());
        self
    }

    pub fn uid(mut self, uid: u64) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn gid(mut self, gid: u64) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn uname(mut self, uname: &str) -> Self {
        self.uname = Some(uname.to_string());
        self
    }

    pub fn gname(mut self, gname: &str) -> Self {
        self.gname = Some(gname.to_string());
        self
    }

    pub fn content(mut self, content: Vec<u8>) -> Self {
        self.content = Some(content);
        self
    }

    /// Walk the archive looking for the expected path and compare the
    /// requested attributes. `None` means the expectation holds;
    /// `Some(mismatch)` names the first attribute that doesn't.
    pub fn check<R: Read>(
        &self,
        archive_name: &str,
        archive: &mut tar::Archive<R>,
    ) -> Result<Option<TarMismatch>> {
        for entry in archive.entries().context("reading archive entries")? {
            let mut entry = entry.context("reading archive entry")?;
            let path = entry.path().context("reading entry path")?;
            if path.as_ref() != Path::new(&self.path) {
                continue;
            }
            return self.check_entry(archive_name, &mut entry);
        }
        Ok(Some(TarMismatch::MissingPath {
            archive: archive_name.to_string(),
            path: self.path.clone(),
        }))
    }

    fn check_entry<R: Read>(
        &self,
        archive_name: &str,
        entry: &mut tar::Entry<R>,
    ) -> Result<Option<TarMismatch>> {
        let header = entry.header();
        let mut wrong = |attribute: &'static str, expected: String, actual: String| {
            Some(TarMismatch::WrongValue {
                attribute,
                archive: archive_name.to_string(),
                path: self.path.clone(),
                expected,
                actual,
            })
        };

        if let Some(expected) = self.entry_type {
            let actual = header.entry_type();
            if actual != expected {
                return Ok(wrong("type", format!("{:?}", expected), format!("{:?}", actual)));
            }
        }
        if let Some(expected) = self.size {
            let actual = header.size().context("reading entry size")?;
            if actual != expected {
                return Ok(wrong("size", expected.to_string(), actual.to_string()));
            }
        }
        if let Some(expected) = self.mtime {
            let actual = header.mtime().context("reading entry mtime")?;
            if actual != expected {
                return Ok(wrong("mtime", expected.to_string(), actual.to_string()));
            }
        }
        if let Some(expected) = self.mode {
            let actual = header.mode().context("reading entry mode")? & 0o7777;
            if actual != expected {
                return Ok(wrong(
                    "mode",
                    format!("{:o}", expected),
                    format!("{:o}", actual),
                ));
            }
        }
        if let Some(expected) = &self.linkname {
            let actual = header
                .link_name()
                .context("reading entry linkname")?
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            if &actual != expected {
                return Ok(wrong("linkname", expected.clone(), actual));
            }
        }
        if let Some(expected) = self.uid {
            let actual = header.uid().context("reading entry uid")?;
            if actual != expected {
                return Ok(wrong("uid", expected.to_string(), actual.to_string()));
            }
        }
        if let Some(expected) = self.gid {
            let actual = header.gid().context("reading entry gid")?;
            if actual != expected {
                return Ok(wrong("gid", expected.to_string(), actual.to_string()));
            }
        }
        if let Some(expected) = &self.uname {
            let actual = header
                .username()
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string();
            if &actual != expected {
                return Ok(wrong("uname", expected.clone(), actual));
            }
        }
        if let Some(expected) = &self.gname {
            let actual = header
                .groupname()
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string();
            if &actual != expected {
                return Ok(wrong("gname", expected.clone(), actual));
            }
        }
        if let Some(expected) = &self.content {
            let mut actual = Vec::new();
            entry
                .read_to_end(&mut actual)
                .context("reading entry content")?;
            if &actual != expected {
                return Ok(wrong(
                    "content",
                    String::from_utf8_lossy(expected).into_owned(),
                    String::from_utf8_lossy(&actual).into_owned(),
                ));
            }
        }
        Ok(None)
    }
}
