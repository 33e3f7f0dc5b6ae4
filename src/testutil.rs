// Copyright 2021 The hwpack-tools Authors
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

//! Test fixtures: packages with fabricated content, and on-disk flat
//! repositories the isolated index can refresh from.

use std::fs;
use tempfile::TempDir;

use crate::package::{packages_file, FetchedPackage, Md5Digest};
use crate::relation::{RelationKind, Relationship};

/// A package whose "archive" is a deterministic placeholder blob. Good
/// enough for everything that doesn't parse the archive itself.
pub fn dummy_package(name: &str, version: &str, architecture: &str) -> FetchedPackage {
    let filename = format!("{}_{}_{}.deb", name, version, architecture);
    let content = format!("Content of {}", filename).into_bytes();
    let mut package = FetchedPackage::new(
        name,
        version,
        &filename,
        content.len() as u64,
        Md5Digest::of(&content).unwrap(),
        architecture,
    );
    package.bind_content(content).unwrap();
    package
}

/// `dummy_package` plus relationship fields, given as
/// `(kind, "bar | baz (>= 1.0)")` pairs.
pub fn dummy_package_with(
    name: &str,
    version: &str,
    architecture: &str,
    relationships: &[(RelationKind, &str)],
) -> FetchedPackage {
    let mut package = dummy_package(name, version, architecture);
    for (kind, text) in relationships {
        package.set_relationship(*kind, Some(Relationship::parse(text).unwrap()));
    }
    package
}

/// An on-disk flat repository: a Packages file plus the archive blobs,
/// addressed by a `file:` source entry.
pub struct SourceFixture {
    // holds the fixture tree alive for the fixture's lifetime
    _dir: TempDir,
    pub entry: String,
}

impl SourceFixture {
    pub fn new(packages: &[FetchedPackage]) -> SourceFixture {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Packages"), packages_file(packages, None)).unwrap();
        for package in packages {
            fs::write(
                dir.path().join(&package.filename),
                package.content().expect("fixture package without content"),
            )
            .unwrap();
        }
        let entry = format!("file:{} ./", dir.path().display());
        SourceFixture { _dir: dir, entry }
    }
}
