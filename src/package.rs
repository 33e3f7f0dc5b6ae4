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

use anyhow::{bail, Context, Result};
use openssl::hash::{hash, MessageDigest};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::errors::Error;
use crate::relation::{RelationKind, Relationship};

/// MD5 content digest, rendered as lowercase hex in index stanzas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    pub fn of(data: &[u8]) -> Result<Md5Digest> {
        let digest = hash(MessageDigest::md5(), data).context("hashing content")?;
        Ok(Md5Digest(
            digest.as_ref().try_into().context("unexpected digest size")?,
        ))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Md5Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).with_context(|| format!("decoding MD5 digest {:?}", s))?;
        Ok(Md5Digest(bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("MD5 digest {:?} is not 16 bytes", s)
        })?))
    }
}

/// A resolved package: identity, index metadata, and (optionally) the
/// exact archive bytes. Immutable after construction apart from the
/// one-shot `bind_content`.
///
/// `filename` is informational and need not be derived from the name and
/// version. `size` and `md5` describe the archive bytes; when content is
/// bound they are checked against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPackage {
    pub name: String,
    pub version: String,
    pub filename: String,
    pub size: u64,
    pub md5: Md5Digest,
    pub architecture: String,
    pub depends: Option<Relationship>,
    pub pre_depends: Option<Relationship>,
    pub conflicts: Option<Relationship>,
    pub recommends: Option<Relationship>,
    pub provides: Option<Relationship>,
    pub replaces: Option<Relationship>,
    pub breaks: Option<Relationship>,
    content: Option<Vec<u8>>,
}

impl FetchedPackage {
    pub fn new(
        name: &str,
        version: &str,
        filename: &str,
        size: u64,
        md5: Md5Digest,
        architecture: &str,
    ) -> FetchedPackage {
        FetchedPackage {
            name: name.to_string(),
            version: version.to_string(),
            filename: filename.to_string(),
            size,
            md5,
            architecture: architecture.to_string(),
            depends: None,
            pre_depends: None,
            conflicts: None,
            recommends: None,
            provides: None,
            replaces: None,
            breaks: None,
            content: None,
        }
    }

    pub fn relationship(&self, kind: RelationKind) -> Option<&Relationship> {
        match kind {
            RelationKind::Depends => self.depends.as_ref(),
            RelationKind::PreDepends => self.pre_depends.as_ref(),
            RelationKind::Conflicts => self.conflicts.as_ref(),
            RelationKind::Recommends => self.recommends.as_ref(),
            RelationKind::Provides => self.provides.as_ref(),
            RelationKind::Replaces => self.replaces.as_ref(),
            RelationKind::Breaks => self.breaks.as_ref(),
        }
    }

    pub fn set_relationship(&mut self, kind: RelationKind, rel: Option<Relationship>) {
        let slot = match kind {
            RelationKind::Depends => &mut self.depends,
            RelationKind::PreDepends => &mut self.pre_depends,
            RelationKind::Conflicts => &mut self.conflicts,
            RelationKind::Recommends => &mut self.recommends,
            RelationKind::Provides => &mut self.provides,
            RelationKind::Replaces => &mut self.replaces,
            RelationKind::Breaks => &mut self.breaks,
        };
        *slot = rel;
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Bind the archive bytes. Valid once; the advertised size and digest
    /// must describe exactly these bytes.
    pub fn bind_content(&mut self, content: Vec<u8>) -> Result<()> {
        if self.content.is_some() {
            return Err(Error::ProgrammingError("content is already bound").into());
        }
        if content.len() as u64 != self.size {
            bail!(
                "content of {} is {} bytes, index advertised {}",
                self.filename,
                content.len(),
                self.size
            );
        }
        let digest = Md5Digest::of(&content)?;
        if digest != self.md5 {
            bail!(
                "content of {} has MD5 {}, index advertised {}",
                self.filename,
                digest,
                self.md5
            );
        }
        self.content = Some(content);
        Ok(())
    }
}

/// Render the Packages-index stanza for each package, in the fixed field
/// order, separated by blank lines. `extra_text` becomes a line of its
/// own right after `Package`, which is how the status file marks entries
/// installed.
pub fn packages_file(packages: &[FetchedPackage], extra_text: Option<&str>) -> String {
    let mut out = String::new();
    for package in packages {
        writeln!(out, "Package: {}", package.name).unwrap();
        if let Some(extra) = extra_text {
            writeln!(out, "{}", extra).unwrap();
        }
        writeln!(out, "Version: {}", package.version).unwrap();
        writeln!(out, "Filename: {}", package.filename).unwrap();
        writeln!(out, "Size: {}", package.size).unwrap();
        writeln!(out, "Architecture: {}", package.architecture).unwrap();
        for kind in RelationKind::ALL {
            if let Some(rel) = package.relationship(kind) {
                writeln!(out, "{}: {}", kind.field_name(), rel).unwrap();
            }
        }
        writeln!(out, "MD5sum: {}", package.md5).unwrap();
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::dummy_package;

    #[test]
    fn digest_roundtrip() {
        let digest = Md5Digest::of(b"Content of foo_1.1_all.deb").unwrap();
        let parsed: Md5Digest = digest.to_string().parse().unwrap();
        assert_eq!(digest, parsed);
        assert_eq!(digest.to_string().len(), 32);
    }

    #[test]
    fn digest_rejects_bad_input() {
        assert!("zz".parse::<Md5Digest>().is_err());
        assert!("aabb".parse::<Md5Digest>().is_err());
    }

    #[test]
    fn single_stanza() {
        let package = dummy_package("foo", "1.1", "armel");
        assert_eq!(
            packages_file(&[package.clone()], None),
            format!(
                "Package: foo\n\
                 Version: 1.1\n\
                 Filename: {}\n\
                 Size: {}\n\
                 Architecture: armel\n\
                 MD5sum: {}\n\n",
                package.filename, package.size, package.md5
            )
        );
    }

    #[test]
    fn two_stanzas_concatenate() {
        let package1 = dummy_package("foo", "1.1", "all");
        let package2 = dummy_package("bar", "1.2", "all");
        assert_eq!(
            packages_file(&[package1.clone()], None) + &packages_file(&[package2.clone()], None),
            packages_file(&[package1, package2], None)
        );
    }

    #[test]
    fn relationships_render_in_fixed_order() {
        let mut package = dummy_package("foo", "1.1", "all");
        package.breaks = Some(Relationship::parse("bar (<< 2.0)").unwrap());
        package.depends = Some(Relationship::parse("bar | baz").unwrap());
        package.provides = Some(Relationship::parse("virt").unwrap());
        let stanza = packages_file(&[package], None);
        let depends = stanza.find("Depends: bar | baz\n").unwrap();
        let provides = stanza.find("Provides: virt\n").unwrap();
        let breaks = stanza.find("Breaks: bar (<< 2.0)\n").unwrap();
        assert!(depends < provides && provides < breaks);
    }

    #[test]
    fn extra_text_goes_after_package() {
        let package = dummy_package("foo", "1.1", "all");
        let stanza = packages_file(&[package], Some("Status: install ok installed"));
        assert!(
            stanza.starts_with("Package: foo\nStatus: install ok installed\nVersion: 1.1\n"),
            "stanza was:\n{}",
            stanza
        );
    }

    #[test]
    fn stanza_is_deterministic() {
        let mut package = dummy_package("foo", "1.1", "armel");
        package.depends = Some(Relationship::parse("bar, baz (>= 1.0)").unwrap());
        assert_eq!(
            packages_file(&[package.clone()], None),
            packages_file(&[package], None)
        );
    }

    #[test]
    fn equality_covers_metadata() {
        let a = dummy_package("foo", "1.1", "armel");
        assert_eq!(a, a.clone());

        let mut b = a.clone();
        b.version = "1.2".to_string();
        assert_ne!(a, b);

        let mut b = a.clone();
        b.filename = "other_1.1.deb".to_string();
        assert_ne!(a, b);

        let mut b = a.clone();
        b.depends = Some(Relationship::parse("bar").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn equality_covers_content() {
        let mut a = dummy_package("foo", "1.1", "armel");
        let b = a.clone();
        let bytes = a.content().unwrap().to_vec();
        a.content = None;
        let mut a2 = a.clone();
        a.bind_content(bytes.clone()).unwrap();
        // bound vs unbound is inequality
        assert_ne!(a, a2);
        a2.bind_content(bytes).unwrap();
        assert_eq!(a, a2);
        assert_eq!(a, b);
    }

    #[test]
    fn bind_checks_advertised_size_and_digest() {
        let mut package = FetchedPackage::new(
            "foo",
            "1.0",
            "foo_1.0_all.deb",
            4,
            Md5Digest::of(b"xxxx").unwrap(),
            "all",
        );
        assert!(package.bind_content(b"xxxxx".to_vec()).is_err());
        assert!(package.bind_content(b"yyyy".to_vec()).is_err());
        package.bind_content(b"xxxx".to_vec()).unwrap();

        // a second binding is a programming error
        let err = package.bind_content(b"xxxx".to_vec()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ProgrammingError(_))
        ));
    }
}
