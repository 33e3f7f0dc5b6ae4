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

//! Minimal codec for the ar-wrapped binary package format: an `ar`
//! container holding `debian-binary`, `control.tar.gz` and `data.tar.gz`.
//! We only parse out the fields we care about; signature members are
//! neither produced nor consumed.

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::errors::Error;
use crate::package::{FetchedPackage, Md5Digest};
use crate::relation::{RelationKind, Relationship};

const AR_MAGIC: &[u8] = b"!<arch>\n";
const AR_HEADER_LEN: usize = 60;

/// Control fields the writer accepts besides the seven relationships.
const PLAIN_FIELDS: [&str; 5] = [
    "Architecture",
    "Maintainer",
    "Description",
    "Section",
    "Priority",
];

/// One member of an ar container.
pub(crate) struct ArMember {
    pub name: String,
    pub data: Vec<u8>,
}

/// Parse an ar container into its members.
pub(crate) fn ar_members(data: &[u8]) -> Result<Vec<ArMember>> {
    let rest = data
        .strip_prefix(AR_MAGIC)
        .ok_or_else(|| anyhow!("bad ar magic"))?;
    let mut members = Vec::new();
    let mut offset = 0;
    while offset < rest.len() {
        let header = rest
            .get(offset..offset + AR_HEADER_LEN)
            .ok_or_else(|| anyhow!("truncated ar member header"))?;
        if &header[58..60] != b"`\n" {
            bail!("bad ar member header terminator");
        }
        let name = std::str::from_utf8(&header[0..16])
            .context("non-UTF-8 ar member name")?
            .trim_end()
            .trim_end_matches('/')
            .to_string();
        let size: usize = std::str::from_utf8(&header[48..58])
            .context("non-UTF-8 ar member size")?
            .trim_end()
            .parse()
            .context("parsing ar member size")?;
        let start = offset + AR_HEADER_LEN;
        let body = rest
            .get(start..start + size)
            .ok_or_else(|| anyhow!("truncated ar member {}", name))?;
        members.push(ArMember {
            name,
            data: body.to_vec(),
        });
        // member data is padded to an even offset
        offset = start + size + size % 2;
    }
    Ok(members)
}

fn ar_append(out: &mut Vec<u8>, name: &str, data: &[u8]) {
    // name, mtime, uid, gid, mode, size, terminator
    let header = format!(
        "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
        name,
        0,
        0,
        0,
        "100644",
        data.len()
    );
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(b'\n');
    }
}

/// Build a gzipped tarball holding the given members, each a regular file
/// under `./`.
fn gzipped_tarball(members: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    dir.set_mtime(0);
    dir.set_cksum();
    builder
        .append_data(&mut dir, "./", &mut std::io::empty())
        .context("appending tar directory entry")?;

    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(data.len() as u64);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("./{}", name), *data)
            .with_context(|| format!("appending tar member {}", name))?;
    }
    builder
        .into_inner()
        .context("finishing tarball")?
        .finish()
        .context("finishing gzip stream")
}

/// Render the control file. `Package`, `Version` and `Architecture` lead;
/// the remaining fields keep their input order.
fn render_control(name: &str, version: &str, fields: &[(&str, &str)]) -> Result<String> {
    for (field, _) in fields {
        if RelationKind::from_field_name(field).is_none() && !PLAIN_FIELDS.contains(field) {
            return Err(Error::UnknownField(field.to_string()).into());
        }
    }
    let architecture = fields
        .iter()
        .find(|(field, _)| *field == "Architecture")
        .map(|(_, value)| *value)
        .unwrap_or("all");
    let mut control = format!(
        "Package: {}\nVersion: {}\nArchitecture: {}\n",
        name, version, architecture
    );
    for (field, value) in fields {
        if *field == "Architecture" {
            continue;
        }
        control.push_str(field);
        control.push_str(": ");
        control.push_str(value);
        control.push('\n');
    }
    Ok(control)
}

/// Writer of syntactically valid binary packages, used for fixtures. Owns
/// a scratch directory from `enter()` until `exit()` or drop.
#[derive(Default)]
pub struct PackageBuilder {
    scratch: Option<TempDir>,
}

impl PackageBuilder {
    pub fn new() -> PackageBuilder {
        PackageBuilder::default()
    }

    /// Create the scratch directory. Valid once per builder lifetime.
    pub fn enter(&mut self) -> Result<()> {
        if self.scratch.is_some() {
            return Err(Error::ProgrammingError("package builder already entered").into());
        }
        self.scratch = Some(
            tempfile::Builder::new()
                .prefix("hwpack-deb-")
                .tempdir()
                .context("creating package scratch directory")?,
        );
        Ok(())
    }

    /// Remove the scratch directory and everything written into it. Safe
    /// to call without a prior `enter` and more than once.
    pub fn exit(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            // the drop path would remove it too; report problems instead
            // of ignoring them silently
            if let Err(err) = scratch.close() {
                eprintln!("Failed to remove package scratch directory: {}", err);
            }
        }
    }

    fn scratch_path(&self) -> Result<&Path> {
        Ok(self
            .scratch
            .as_ref()
            .ok_or(Error::ProgrammingError("package builder not entered"))?
            .path())
    }

    /// A fresh directory under the scratch root, removed with it.
    pub fn make_temporary_directory(&self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("dir-")
            .tempdir_in(self.scratch_path()?)
            .context("creating temporary directory")?;
        // keep it until the builder exits
        Ok(dir.into_path())
    }

    /// Synthesise a minimally-valid package archive and return its path.
    /// The filename follows the `<name>_<version>_<arch>.deb` layout.
    /// Recognised control fields are the seven relationship kinds plus
    /// Architecture, Maintainer, Description, Section and Priority; any
    /// other field fails.
    pub fn write_package(
        &self,
        name: &str,
        version: &str,
        fields: &[(&str, &str)],
    ) -> Result<PathBuf> {
        let control = render_control(name, version, fields)?;
        let architecture = fields
            .iter()
            .find(|(field, _)| *field == "Architecture")
            .map(|(_, value)| *value)
            .unwrap_or("all");

        let control_tar = gzipped_tarball(&[("control", control.as_bytes())])
            .context("building control tarball")?;
        let data_tar = gzipped_tarball(&[]).context("building data tarball")?;

        let mut archive = Vec::new();
        archive.extend_from_slice(AR_MAGIC);
        ar_append(&mut archive, "debian-binary", b"2.0\n");
        ar_append(&mut archive, "control.tar.gz", &control_tar);
        ar_append(&mut archive, "data.tar.gz", &data_tar);

        let path = self
            .scratch_path()?
            .join(format!("{}_{}_{}.deb", name, version, architecture));
        fs::write(&path, archive).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

impl Drop for PackageBuilder {
    fn drop(&mut self) {
        self.exit();
    }
}

/// Parse the archive at `path` into a FetchedPackage with content bound
/// to the exact file bytes.
pub fn read_package(path: &Path) -> Result<FetchedPackage> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .with_context(|| format!("extracting filename of {}", path.display()))?
        .to_string_lossy()
        .into_owned();

    let members = ar_members(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    let control_tar = members
        .iter()
        .find(|member| member.name == "control.tar.gz")
        .with_context(|| format!("{} has no control.tar.gz member", path.display()))?;
    let control = read_control(&control_tar.data)
        .with_context(|| format!("reading control member of {}", path.display()))?;

    let fields = parse_control(&control)?;
    let field = |name: &str| -> Result<&str> {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .with_context(|| format!("control file of {} lacks {}", path.display(), name))
    };

    let mut package = FetchedPackage::new(
        field("Package")?,
        field("Version")?,
        &filename,
        bytes.len() as u64,
        Md5Digest::of(&bytes)?,
        field("Architecture")?,
    );
    for kind in RelationKind::ALL {
        if let Ok(value) = field(kind.field_name()) {
            package.set_relationship(kind, Some(Relationship::parse(value)?));
        }
    }
    package.bind_content(bytes)?;
    Ok(package)
}

/// Pull the control file text out of a gzipped control tarball.
fn read_control(control_tar: &[u8]) -> Result<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(control_tar));
    for entry in archive.entries().context("reading control tarball")? {
        let mut entry = entry.context("reading control tarball entry")?;
        let path = entry.path().context("reading control tarball path")?;
        if path.file_name().map(|f| f == "control").unwrap_or(false) {
            let mut control = String::new();
            entry
                .read_to_string(&mut control)
                .context("reading control file")?;
            return Ok(control);
        }
    }
    bail!("control tarball has no control file");
}

/// Split a control file into (field, value) pairs. Continuation lines
/// (leading whitespace) extend the previous value.
fn parse_control(control: &str) -> Result<Vec<(String, String)>> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in control.lines() {
        if line.is_empty() {
            break; // only the first stanza matters
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            let (_, value) = fields
                .last_mut()
                .ok_or_else(|| anyhow!("continuation line without a field: {:?}", line))?;
            value.push('\n');
            value.push_str(line);
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .with_context(|| format!("malformed control line {:?}", line))?;
        fields.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(fields)
}
