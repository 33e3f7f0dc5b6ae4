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

//! An isolated package index: a private scratch root laid out the way the
//! standard index reader expects, populated from a set of source entries,
//! and queryable for newest candidates. The index also tracks an
//! install-mark set which the fetcher uses to walk dependency closures;
//! marks are a scratch computation and are always cleared before a
//! fetcher call returns.

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

use crate::errors::Error;
use crate::package::{packages_file, FetchedPackage, Md5Digest};
use crate::relation::{RelationEntry, RelationKind, Relationship};
use crate::version;

/// Completion timeout for HTTP requests.
const HTTP_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Transient HTTP statuses worth a retry; matches `curl --retry`.
const RETRY_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];
const HTTP_RETRIES: u32 = 3;

/// The newest record for a package name across all configured sources,
/// plus the source it came from.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Metadata record, content unbound.
    pub record: FetchedPackage,
    /// Base URI of the source advertising this record; `Filename` is
    /// relative to it.
    pub base_uri: String,
}

/// Project one relationship of a candidate into its canonical text form.
/// Returns `None` when the candidate declares no such relationship.
pub fn stringify_relationship(candidate: &Candidate, kind: RelationKind) -> Option<String> {
    candidate.record.relationship(kind).map(|rel| rel.to_string())
}

/// One `deb` line: URI plus suite, and components unless the suite is a
/// plain directory (trailing slash).
#[derive(Debug, Clone)]
struct SourceEntry {
    uri: String,
    suite: String,
    components: Vec<String>,
}

impl SourceEntry {
    fn parse(entry: &str) -> Result<SourceEntry> {
        let mut words = entry.split_whitespace();
        let uri = words
            .next()
            .with_context(|| format!("source entry {:?} lacks a URI", entry))?;
        let suite = words
            .next()
            .with_context(|| format!("source entry {:?} lacks a suite", entry))?;
        let components: Vec<String> = words.map(str::to_string).collect();
        if !suite.ends_with('/') && components.is_empty() {
            bail!("source entry {:?} names no components", entry);
        }
        Ok(SourceEntry {
            uri: uri.trim_end_matches('/').to_string(),
            suite: suite.to_string(),
            components,
        })
    }

    /// URIs of the Packages indexes this entry advertises.
    fn index_uris(&self, architecture: Option<&str>) -> Result<Vec<String>> {
        if self.suite.ends_with('/') {
            // flat repository: Packages sits in the named directory
            return Ok(vec![format!("{}/{}Packages", self.uri, self.suite)]);
        }
        let architecture = architecture.with_context(|| {
            format!(
                "source entry for {} requires a configured architecture",
                self.uri
            )
        })?;
        Ok(self
            .components
            .iter()
            .map(|component| {
                format!(
                    "{}/dists/{}/{}/binary-{}/Packages",
                    self.uri, self.suite, component, architecture
                )
            })
            .collect())
    }
}

/// A scoped package-manager cache over a set of source entries and an
/// optional architecture. Prepare before querying; cleanup (or drop)
/// removes every trace.
pub struct IsolatedIndex {
    sources: Vec<String>,
    architecture: Option<String>,
    scratch: Option<TempDir>,
    records: HashMap<String, Vec<Candidate>>,
    providers: HashMap<String, Vec<String>>,
    marked: Vec<String>,
    marked_set: HashSet<String>,
}

impl IsolatedIndex {
    pub fn new(sources: &[String], architecture: Option<&str>) -> IsolatedIndex {
        IsolatedIndex {
            sources: sources.to_vec(),
            architecture: architecture.map(str::to_string),
            scratch: None,
            records: HashMap::new(),
            providers: HashMap::new(),
            marked: Vec::new(),
            marked_set: HashSet::new(),
        }
    }

    /// Build the scratch root and refresh the index so candidates become
    /// queryable. Re-preparing rebuilds from scratch.
    pub fn prepare(&mut self) -> Result<()> {
        self.cleanup();

        let scratch = tempfile::Builder::new()
            .prefix("hwpack-index-")
            .tempdir()
            .context("creating index scratch root")?;
        let root = scratch.path();

        fs::create_dir_all(root.join("etc/apt")).context("creating etc/apt")?;
        fs::create_dir_all(root.join("var/lib/dpkg")).context("creating var/lib/dpkg")?;
        fs::create_dir_all(root.join("var/lib/apt/lists/partial"))
            .context("creating lists/partial")?;
        fs::create_dir_all(root.join("var/cache/apt/archives/partial"))
            .context("creating archives/partial")?;

        fs::write(root.join("var/lib/dpkg/status"), "").context("writing status file")?;

        let mut sources_list = String::new();
        for entry in &self.sources {
            sources_list.push_str("deb ");
            sources_list.push_str(entry);
            sources_list.push('\n');
        }
        fs::write(root.join("etc/apt/sources.list"), sources_list)
            .context("writing sources.list")?;

        if let Some(architecture) = &self.architecture {
            fs::write(
                root.join("etc/apt/apt.conf"),
                format!(
                    "Apt {{\nArchitecture \"{}\";\nInstall-Recommends \"true\";\n}}\n",
                    architecture
                ),
            )
            .context("writing apt.conf")?;
        }

        self.scratch = Some(scratch);
        self.refresh()
    }

    /// Fetch and parse every configured Packages index.
    fn refresh(&mut self) -> Result<()> {
        let lists_dir = self.path_in_scratch("var/lib/apt/lists")?;
        for entry_text in self.sources.clone() {
            let entry = SourceEntry::parse(&entry_text)?;
            for index_uri in entry.index_uris(self.architecture.as_deref())? {
                let data = fetch_index(&index_uri)
                    .with_context(|| format!("refreshing index {}", index_uri))?;
                fs::write(lists_dir.join(munge_uri(&index_uri)), &data)
                    .context("storing fetched index")?;
                let text = String::from_utf8(data)
                    .with_context(|| format!("index {} is not UTF-8", index_uri))?;
                self.load_stanzas(&text, &entry.uri)
                    .with_context(|| format!("parsing index {}", index_uri))?;
            }
        }
        Ok(())
    }

    fn load_stanzas(&mut self, text: &str, base_uri: &str) -> Result<()> {
        for stanza in text.split("\n\n").filter(|s| !s.trim().is_empty()) {
            let record = parse_stanza(stanza)?;
            let candidate = Candidate {
                base_uri: base_uri.to_string(),
                record,
            };
            if let Some(provides) = &candidate.record.provides {
                for entry in &provides.entries {
                    for alternative in &entry.alternatives {
                        let providers = self
                            .providers
                            .entry(alternative.package.clone())
                            .or_default();
                        if !providers.contains(&candidate.record.name) {
                            providers.push(candidate.record.name.clone());
                        }
                    }
                }
            }
            self.records
                .entry(candidate.record.name.clone())
                .or_default()
                .push(candidate);
        }
        Ok(())
    }

    fn path_in_scratch(&self, relative: &str) -> Result<PathBuf> {
        Ok(self
            .scratch
            .as_ref()
            .ok_or(Error::ProgrammingError("index is not prepared"))?
            .path()
            .join(relative))
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|s| s.path())
    }

    fn check_prepared(&self) -> Result<()> {
        if self.scratch.is_none() {
            return Err(Error::ProgrammingError("index is not prepared").into());
        }
        Ok(())
    }

    /// The newest candidate for `name` across all configured sources,
    /// restricted to the configured architecture (plus `all`).
    pub fn lookup(&self, name: &str) -> Result<&Candidate> {
        self.check_prepared()?;
        self.records
            .get(name)
            .into_iter()
            .flatten()
            .filter(|candidate| self.architecture_matches(&candidate.record.architecture))
            .reduce(|best, next| {
                match version::compare(&next.record.version, &best.record.version) {
                    Ordering::Greater => next,
                    _ => best,
                }
            })
            .ok_or_else(|| Error::PackageNotFound(name.to_string()).into())
    }

    fn architecture_matches(&self, architecture: &str) -> bool {
        match &self.architecture {
            Some(wanted) => architecture == wanted || architecture == "all",
            None => true,
        }
    }

    /// Rewrite the status file to list `packages` as installed.
    pub fn set_installed(&self, packages: &[FetchedPackage]) -> Result<()> {
        let status = self.path_in_scratch("var/lib/dpkg/status")?;
        fs::write(
            &status,
            packages_file(packages, Some("Status: install ok installed")),
        )
        .with_context(|| format!("writing {}", status.display()))
    }

    /// Mark `name` for installation together with the transitive closure
    /// of its Depends, Pre-Depends and Recommends. Marks accumulate in
    /// discovery order until cleared.
    pub fn mark_install(&mut self, name: &str) -> Result<()> {
        self.mark_install_excluding(name, &HashSet::new())
    }

    /// Like `mark_install`, but the walk never enters `excluded` names:
    /// a dependency entry whose alternatives lead only to excluded
    /// packages (directly or via their providers) is dropped instead of
    /// followed, so nothing reachable solely through the excluded set
    /// gets marked.
    pub fn mark_install_excluding(
        &mut self,
        name: &str,
        excluded: &HashSet<String>,
    ) -> Result<()> {
        let candidate = self.lookup(name)?.clone();
        if self.marked_set.contains(name) {
            return Ok(());
        }
        self.marked.push(name.to_string());
        self.marked_set.insert(name.to_string());
        for kind in [
            RelationKind::Depends,
            RelationKind::PreDepends,
            RelationKind::Recommends,
        ] {
            if let Some(rel) = candidate.record.relationship(kind) {
                for entry in &rel.entries {
                    self.satisfy_entry(&candidate.record.name, entry, excluded)?;
                }
            }
        }
        Ok(())
    }

    /// Satisfy one comma-separated entry of a relationship belonging to
    /// `parent`: the first alternative with a usable candidate wins, then
    /// virtual providers are consulted for unversioned alternatives.
    /// Entries leading only into `excluded` are dropped.
    fn satisfy_entry(
        &mut self,
        parent: &str,
        entry: &RelationEntry,
        excluded: &HashSet<String>,
    ) -> Result<()> {
        // something already marked may satisfy this entry
        for alternative in &entry.alternatives {
            if self.marked_set.contains(&alternative.package) {
                return Ok(());
            }
            if alternative.constraint.is_none() {
                if let Some(providers) = self.providers.get(&alternative.package) {
                    if providers.iter().any(|p| self.marked_set.contains(p)) {
                        return Ok(());
                    }
                }
            }
        }
        // an entry naming an excluded package is not followed
        for alternative in &entry.alternatives {
            if excluded.contains(&alternative.package) {
                return Ok(());
            }
        }
        for alternative in &entry.alternatives {
            if let Ok(candidate) = self.lookup(&alternative.package) {
                let version_ok = alternative
                    .constraint
                    .as_ref()
                    .map(|constraint| constraint.satisfied_by(&candidate.record.version))
                    .unwrap_or(true);
                if version_ok {
                    return self.mark_install_excluding(&alternative.package, excluded);
                }
            }
        }
        // virtual packages: an unversioned alternative is satisfied by
        // any package providing it
        let mut saw_excluded_provider = false;
        for alternative in &entry.alternatives {
            if alternative.constraint.is_some() {
                continue;
            }
            let providers = self
                .providers
                .get(&alternative.package)
                .cloned()
                .unwrap_or_default();
            for provider in providers {
                if excluded.contains(&provider) {
                    saw_excluded_provider = true;
                    continue;
                }
                if self.lookup(&provider).is_ok() {
                    return self.mark_install_excluding(&provider, excluded);
                }
            }
        }
        if saw_excluded_provider {
            // satisfiable, just not through anything we may follow
            return Ok(());
        }
        Err(Error::DependencyNotSatisfied(parent.to_string()).into())
    }

    /// Names marked for installation, in discovery order.
    pub fn changes(&self) -> &[String] {
        &self.marked
    }

    pub fn clear_marks(&mut self) {
        self.marked.clear();
        self.marked_set.clear();
    }

    /// Fetch the archive bytes of a candidate from its source, keeping a
    /// copy in the archive cache.
    pub fn fetch_content(&self, candidate: &Candidate) -> Result<Vec<u8>> {
        let uri = format!("{}/{}", candidate.base_uri, candidate.record.filename);
        let bytes = fetch_uri(&uri).with_context(|| format!("fetching {}", uri))?;
        let cache = self.path_in_scratch("var/cache/apt/archives")?;
        let basename = Path::new(&candidate.record.filename)
            .file_name()
            .with_context(|| format!("bad filename {:?}", candidate.record.filename))?;
        fs::write(cache.join(basename), &bytes).context("caching fetched archive")?;
        Ok(bytes)
    }

    /// Remove the scratch root. Safe before prepare and after a prior
    /// cleanup.
    pub fn cleanup(&mut self) {
        self.records.clear();
        self.providers.clear();
        self.clear_marks();
        if let Some(scratch) = self.scratch.take() {
            if let Err(err) = scratch.close() {
                eprintln!("Failed to remove index scratch root: {}", err);
            }
        }
    }
}

impl Drop for IsolatedIndex {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Parse one Packages stanza into a metadata record.
fn parse_stanza(stanza: &str) -> Result<FetchedPackage> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in stanza.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = fields.last_mut() {
                value.push('\n');
                value.push_str(line);
            }
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .with_context(|| format!("malformed index line {:?}", line))?;
        fields.push((key.trim().to_string(), value.trim().to_string()));
    }
    let field = |name: &str| -> Result<&str> {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| anyhow!("stanza lacks {}", name))
    };

    let md5: Md5Digest = field("MD5sum")?.parse()?;
    let size: u64 = field("Size")?.parse().context("parsing Size")?;
    let mut record = FetchedPackage::new(
        field("Package")?,
        field("Version")?,
        field("Filename")?,
        size,
        md5,
        field("Architecture")?,
    );
    for kind in RelationKind::ALL {
        if let Ok(value) = field(kind.field_name()) {
            record.set_relationship(kind, Some(Relationship::parse(value)?));
        }
    }
    Ok(record)
}

/// Fetch a Packages index, falling back to the gzipped variant.
fn fetch_index(uri: &str) -> Result<Vec<u8>> {
    match fetch_uri(uri) {
        Ok(data) => Ok(data),
        Err(plain_err) => {
            let gz_uri = format!("{}.gz", uri);
            let compressed = match fetch_uri(&gz_uri) {
                Ok(compressed) => compressed,
                // report the plain failure; the .gz attempt was a fallback
                Err(_) => return Err(plain_err),
            };
            let mut data = Vec::new();
            GzDecoder::new(&compressed[..])
                .read_to_end(&mut data)
                .with_context(|| format!("decompressing {}", gz_uri))?;
            Ok(data)
        }
    }
}

/// Fetch the bytes behind a `file:` or `http(s):` URI.
fn fetch_uri(uri: &str) -> Result<Vec<u8>> {
    let url = Url::parse(uri).with_context(|| format!("parsing URI {}", uri))?;
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| anyhow!("URI {} is not a local path", uri))?;
            fs::read(&path).with_context(|| format!("reading {}", path.display()))
        }
        "http" | "https" => http_get(uri),
        other => bail!("unsupported URI scheme {:?} in {}", other, uri),
    }
}

/// Blocking GET with basic exponential backoff on transient statuses.
fn http_get(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::ClientBuilder::new()
        .timeout(HTTP_COMPLETION_TIMEOUT)
        .build()
        .context("building HTTP client")?;

    let mut delay = 1;
    let mut tries = HTTP_RETRIES;
    loop {
        let err: anyhow::Error = match client.get(url).send() {
            Err(err) => err.into(),
            Ok(resp) => match resp.status().as_u16() {
                code if RETRY_STATUS_CODES.contains(&code) => anyhow!(
                    "HTTP {} {}",
                    code,
                    resp.status().canonical_reason().unwrap_or("")
                ),
                _ => {
                    let resp = resp
                        .error_for_status()
                        .with_context(|| format!("fetching '{}'", url))?;
                    let mut bytes = Vec::new();
                    let mut resp = resp;
                    resp.copy_to(&mut bytes)
                        .with_context(|| format!("reading '{}'", url))?;
                    return Ok(bytes);
                }
            },
        };

        tries -= 1;
        if tries == 0 {
            return Err(err).with_context(|| format!("fetching '{}'", url));
        }
        eprintln!("Error fetching '{}': {}", url, err);
        eprintln!("Sleeping {}s and retrying...", delay);
        sleep(Duration::from_secs(delay));
        delay *= 2;
    }
}

/// Flatten an index URI into a list filename, the way the standard index
/// reader names its fetched lists.
fn munge_uri(uri: &str) -> String {
    uri.trim_start_matches("file:")
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_matches('/')
        .replace(|c| c == '/' || c == ':', "_")
}
