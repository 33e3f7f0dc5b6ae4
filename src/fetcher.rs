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

//! Fetches root packages and their transitive closure out of an isolated
//! index. The fetcher owns the index for its lifetime: preparing or
//! cleaning up the fetcher prepares or tears down the index, and dropping
//! it removes the scratch root.

use anyhow::Result;
use std::collections::HashSet;

use crate::index::IsolatedIndex;
use crate::package::FetchedPackage;

pub struct PackageFetcher {
    index: IsolatedIndex,
    /// The names passed to `ignore_packages`. What else those names
    /// suppress is recomputed against the live roots of each fetch.
    ignore_roots: HashSet<String>,
}

impl PackageFetcher {
    pub fn new(sources: &[String], architecture: Option<&str>) -> PackageFetcher {
        PackageFetcher {
            index: IsolatedIndex::new(sources, architecture),
            ignore_roots: HashSet::new(),
        }
    }

    /// Prepare the underlying index. Required before `fetch_packages` or
    /// `ignore_packages`.
    pub fn prepare(&mut self) -> Result<()> {
        self.index.prepare()
    }

    /// Tear the underlying index down. A no-op when nothing is prepared.
    pub fn cleanup(&mut self) {
        self.index.cleanup();
    }

    pub fn index(&self) -> &IsolatedIndex {
        &self.index
    }

    /// Exclude `names` (and everything reachable only through them) from
    /// future fetches. Accumulates across calls. Each name must be known
    /// to some source and must itself have satisfiable dependencies; the
    /// validation walks the full dependency closure, honouring Provides.
    pub fn ignore_packages(&mut self, names: &[&str]) -> Result<()> {
        let result = self.ignore_inner(names);
        if result.is_ok() {
            self.ignore_roots
                .extend(names.iter().map(|name| name.to_string()));
        }
        self.index.clear_marks();
        result
    }

    fn ignore_inner(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.index.mark_install(name)?;
        }
        Ok(())
    }

    /// Fetch `roots` and, when content is downloaded, the transitive
    /// closure of their Depends, Pre-Depends and Recommends. Each root
    /// precedes the dependencies it pulled in; roots keep their input
    /// order. Explicitly ignored roots are silently absent, and the walk
    /// never enters the ignored set, so a package is suppressed exactly
    /// when every path from a live root to it passes through that set.
    pub fn fetch_packages(
        &mut self,
        roots: &[&str],
        download_content: bool,
    ) -> Result<Vec<FetchedPackage>> {
        let result = self.fetch_inner(roots, download_content);
        self.index.clear_marks();
        result
    }

    fn fetch_inner(
        &mut self,
        roots: &[&str],
        download_content: bool,
    ) -> Result<Vec<FetchedPackage>> {
        // every root must be known before any fetching occurs
        for root in roots {
            self.index.lookup(root)?;
        }
        let live_roots: Vec<&str> = roots
            .iter()
            .copied()
            .filter(|root| !self.ignore_roots.contains(*root))
            .collect();

        if !download_content {
            // metadata only, and the closure is not walked past the roots
            return live_roots
                .iter()
                .map(|root| Ok(self.index.lookup(root)?.record.clone()))
                .collect();
        }

        for root in &live_roots {
            self.index.mark_install_excluding(root, &self.ignore_roots)?;
        }
        // the walk skipped the ignored set, so the closure is exactly
        // what reaches the live roots without it
        let closure: Vec<String> = self.index.changes().to_vec();

        let mut fetched = Vec::new();
        for name in closure {
            let candidate = self.index.lookup(&name)?.clone();
            let content = self.index.fetch_content(&candidate)?;
            let mut record = candidate.record;
            record.bind_content(content)?;
            fetched.push(record);
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::relation::RelationKind;
    use crate::testutil::{dummy_package, dummy_package_with, SourceFixture};

    fn prepared(sources: &[&SourceFixture], architecture: Option<&str>) -> PackageFetcher {
        let entries: Vec<String> = sources.iter().map(|s| s.entry.clone()).collect();
        let mut fetcher = PackageFetcher::new(&entries, architecture);
        fetcher.prepare().unwrap();
        fetcher
    }

    fn assert_not_found(err: anyhow::Error, expected: &str) {
        match err.downcast_ref::<Error>() {
            Some(Error::PackageNotFound(name)) => assert_eq!(name, expected),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    fn assert_unsatisfied(err: anyhow::Error, expected: &str) {
        match err.downcast_ref::<Error>() {
            Some(Error::DependencyNotSatisfied(name)) => {
                assert_eq!(name, expected);
                assert_eq!(
                    err.downcast_ref::<Error>().unwrap().to_string(),
                    format!("Unable to satisfy dependencies of {}", expected)
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn scratch_root_lives_with_the_fetcher() {
        let scratch;
        {
            let mut fetcher = PackageFetcher::new(&[], None);
            fetcher.prepare().unwrap();
            scratch = fetcher.index().scratch_dir().unwrap().to_path_buf();
            assert!(scratch.is_dir());
        }
        assert!(!scratch.exists());
    }

    #[test]
    fn cleanup_is_safe_from_any_state() {
        let mut fetcher = PackageFetcher::new(&[], None);
        fetcher.cleanup(); // fresh
        fetcher.prepare().unwrap();
        fetcher.cleanup(); // prepared
        fetcher.cleanup(); // closed
    }

    #[test]
    fn fetch_before_prepare_is_a_programming_error() {
        let mut fetcher = PackageFetcher::new(&[], None);
        let err = fetcher.fetch_packages(&["foo"], true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ProgrammingError(_))
        ));
    }

    #[test]
    fn unknown_root_fails_not_found() {
        let mut fetcher = prepared(&[], None);
        let err = fetcher.fetch_packages(&["nothere"], true).unwrap_err();
        assert_not_found(err, "nothere");

        let source = SourceFixture::new(&[dummy_package("foo", "1.0", "all")]);
        let mut fetcher = prepared(&[&source], None);
        let err = fetcher.fetch_packages(&["nothere"], true).unwrap_err();
        assert_not_found(err, "nothere");
        let err = fetcher.fetch_packages(&["foo", "nothere"], true).unwrap_err();
        assert_not_found(err, "nothere");
    }

    #[test]
    fn fetch_no_roots_returns_nothing() {
        let source = SourceFixture::new(&[dummy_package("foo", "1.0", "all")]);
        let mut fetcher = prepared(&[&source], None);
        assert!(fetcher.fetch_packages(&[], true).unwrap().is_empty());
    }

    #[test]
    fn fetched_record_equals_the_published_one() {
        let package = dummy_package("foo", "1.0", "all");
        let source = SourceFixture::new(&[package.clone()]);
        let mut fetcher = prepared(&[&source], None);
        let fetched = fetcher.fetch_packages(&["foo"], true).unwrap();
        assert_eq!(fetched, vec![package]);
    }

    #[test]
    fn roots_keep_their_input_order() {
        let foo = dummy_package("foo", "1.0", "all");
        let bar = dummy_package("bar", "1.0", "all");
        let source = SourceFixture::new(&[bar.clone(), foo.clone()]);
        let mut fetcher = prepared(&[&source], None);
        assert_eq!(
            fetcher.fetch_packages(&["foo", "bar"], true).unwrap(),
            vec![foo, bar]
        );
    }

    #[test]
    fn newest_version_wins_across_sources() {
        let old = SourceFixture::new(&[dummy_package("bar", "1.0", "all")]);
        let new_package = dummy_package("bar", "1.1", "all");
        let new = SourceFixture::new(&[new_package.clone()]);
        let mut fetcher = prepared(&[&old, &new], None);
        assert_eq!(
            fetcher.fetch_packages(&["bar"], true).unwrap(),
            vec![new_package]
        );
    }

    #[test]
    fn configured_architecture_selects_candidates() {
        let wanted = dummy_package("foo", "1.0", "arch1");
        let unwanted = dummy_package("foo", "1.1", "arch2");
        let source = SourceFixture::new(&[wanted.clone(), unwanted]);
        let mut fetcher = prepared(&[&source], Some("arch1"));
        assert_eq!(
            fetcher.fetch_packages(&["foo"], true).unwrap(),
            vec![wanted]
        );
    }

    #[test]
    fn closure_covers_depends_recommends_and_pre_depends() {
        let top = dummy_package_with(
            "top",
            "1.0",
            "all",
            &[
                (RelationKind::Depends, "foo"),
                (RelationKind::PreDepends, "bar (>= 1.0)"),
                (RelationKind::Recommends, "zing, zang"),
                (RelationKind::Conflicts, "baz | zap"),
            ],
        );
        let deps = [
            dummy_package("foo", "1.0", "all"),
            dummy_package("bar", "1.0", "all"),
            dummy_package("zing", "1.0", "all"),
            dummy_package("zang", "1.0", "all"),
        ];
        let mut packages = vec![top.clone()];
        packages.extend(deps.iter().cloned());
        let source = SourceFixture::new(&packages);
        let mut fetcher = prepared(&[&source], None);
        let fetched = fetcher.fetch_packages(&["top"], true).unwrap();
        assert!(fetched.contains(&top));
        for dep in &deps {
            assert!(fetched.contains(dep), "missing {}", dep.name);
        }
        // Conflicts targets are metadata, not closure members
        assert_eq!(fetched.len(), 5);
    }

    #[test]
    fn each_root_precedes_its_dependencies() {
        let foo = dummy_package_with("foo", "1.0", "all", &[(RelationKind::Depends, "bar")]);
        let bar = dummy_package("bar", "1.0", "all");
        let source = SourceFixture::new(&[foo.clone(), bar.clone()]);
        let mut fetcher = prepared(&[&source], None);
        assert_eq!(
            fetcher.fetch_packages(&["foo"], true).unwrap(),
            vec![foo, bar]
        );
    }

    #[test]
    fn recommends_are_followed() {
        let foo = dummy_package_with("foo", "1.0", "all", &[(RelationKind::Recommends, "bar")]);
        let bar = dummy_package("bar", "1.0", "all");
        let source = SourceFixture::new(&[foo.clone(), bar.clone()]);
        let mut fetcher = prepared(&[&source], None);
        assert_eq!(
            fetcher.fetch_packages(&["foo"], true).unwrap(),
            vec![foo, bar]
        );
    }

    #[test]
    fn broken_dependencies_fail() {
        let source = SourceFixture::new(&[dummy_package_with(
            "foo",
            "1.0",
            "all",
            &[(RelationKind::Depends, "bar")],
        )]);
        let mut fetcher = prepared(&[&source], None);
        let err = fetcher.fetch_packages(&["foo"], true).unwrap_err();
        assert_unsatisfied(err, "foo");
    }

    #[test]
    fn no_content_download_skips_dependencies() {
        let foo = dummy_package_with("foo", "1.0", "all", &[(RelationKind::Depends, "bar")]);
        let bar = dummy_package("bar", "1.0", "all");
        let source = SourceFixture::new(&[foo, bar]);
        let mut fetcher = prepared(&[&source], None);
        let fetched = fetcher.fetch_packages(&["foo"], false).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].name, "foo");
        assert_eq!(fetched[0].content(), None);
    }

    #[test]
    fn fetch_leaves_no_marked_changes() {
        let source = SourceFixture::new(&[dummy_package("foo", "1.0", "all")]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.fetch_packages(&["foo"], true).unwrap();
        assert!(fetcher.index().changes().is_empty());
    }

    #[test]
    fn failed_fetch_leaves_no_marked_changes() {
        let source = SourceFixture::new(&[
            dummy_package("good", "1.0", "all"),
            dummy_package_with("foo", "1.0", "all", &[(RelationKind::Depends, "bar")]),
        ]);
        let mut fetcher = prepared(&[&source], None);
        assert!(fetcher.fetch_packages(&["good", "foo"], true).is_err());
        assert!(fetcher.index().changes().is_empty());
    }

    #[test]
    fn ignored_packages_are_excluded() {
        let foo = dummy_package_with("foo", "1.0", "all", &[(RelationKind::Depends, "bar")]);
        let bar = dummy_package("bar", "1.0", "all");
        let source = SourceFixture::new(&[foo.clone(), bar]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["bar"]).unwrap();
        assert_eq!(fetcher.fetch_packages(&["foo"], true).unwrap(), vec![foo]);
    }

    #[test]
    fn dependencies_reachable_only_through_ignored_are_excluded() {
        let foo = dummy_package("foo", "1.0", "all");
        let bar = dummy_package_with("bar", "1.0", "all", &[(RelationKind::Depends, "quux")]);
        let quux = dummy_package("quux", "1.0", "all");
        let top = dummy_package_with("top", "1.0", "all", &[(RelationKind::Depends, "foo, bar")]);
        let source = SourceFixture::new(&[top.clone(), foo.clone(), bar, quux]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["bar"]).unwrap();
        // quux's only path from a live root runs through bar
        assert_eq!(
            fetcher.fetch_packages(&["top"], true).unwrap(),
            vec![top, foo]
        );
    }

    #[test]
    fn shared_dependency_of_an_ignored_package_is_kept() {
        // bar and foo both depend on quux; ignoring bar must not drag
        // quux out of foo's closure
        let foo = dummy_package_with("foo", "1.0", "all", &[(RelationKind::Depends, "quux")]);
        let bar = dummy_package_with("bar", "1.0", "all", &[(RelationKind::Depends, "quux")]);
        let quux = dummy_package("quux", "1.0", "all");
        let source = SourceFixture::new(&[foo.clone(), bar, quux.clone()]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["bar"]).unwrap();
        assert_eq!(
            fetcher.fetch_packages(&["foo"], true).unwrap(),
            vec![foo, quux]
        );
    }

    #[test]
    fn ignore_unknown_package_fails_not_found() {
        let mut fetcher = prepared(&[&SourceFixture::new(&[])], None);
        let err = fetcher.ignore_packages(&["unknown"]).unwrap_err();
        assert_not_found(err, "unknown");
        assert!(fetcher.index().changes().is_empty());
    }

    #[test]
    fn ignore_with_unsatisfiable_dependencies_fails() {
        let source = SourceFixture::new(&[dummy_package_with(
            "foo",
            "1.0",
            "all",
            &[(RelationKind::Depends, "bar")],
        )]);
        let mut fetcher = prepared(&[&source], None);
        let err = fetcher.ignore_packages(&["foo"]).unwrap_err();
        assert_unsatisfied(err, "foo");
        assert!(fetcher.index().changes().is_empty());
    }

    #[test]
    fn ignore_honours_provides() {
        let source = SourceFixture::new(&[
            dummy_package_with(
                "ubuntu-minimal",
                "1.0",
                "all",
                &[(RelationKind::Depends, "apt-utils")],
            ),
            dummy_package_with(
                "apt-utils",
                "1.0",
                "all",
                &[(RelationKind::Depends, "libapt-pkg")],
            ),
            dummy_package_with(
                "apt",
                "1.0",
                "all",
                &[
                    (RelationKind::Provides, "libapt-pkg"),
                    (RelationKind::Replaces, "someotherpackage"),
                ],
            ),
        ]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["ubuntu-minimal"]).unwrap();
    }

    #[test]
    fn ignored_root_is_silently_absent() {
        let source = SourceFixture::new(&[dummy_package("foo", "1.0", "all")]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["foo"]).unwrap();
        assert!(fetcher.fetch_packages(&["foo"], true).unwrap().is_empty());
        assert!(fetcher.fetch_packages(&["foo"], false).unwrap().is_empty());
    }

    #[test]
    fn ignores_accumulate() {
        let source = SourceFixture::new(&[
            dummy_package("foo", "1.0", "all"),
            dummy_package("bar", "1.0", "all"),
        ]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["foo"]).unwrap();
        fetcher.ignore_packages(&["bar"]).unwrap();
        assert!(fetcher
            .fetch_packages(&["foo", "bar"], false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn ignore_leaves_no_marked_changes() {
        let source = SourceFixture::new(&[dummy_package("foo", "1.0", "all")]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["foo"]).unwrap();
        assert!(fetcher.index().changes().is_empty());
    }

    #[test]
    fn provider_pulled_by_an_ignored_closure_stays_fetchable() {
        let minimal = dummy_package_with(
            "ubuntu-minimal",
            "1.0",
            "all",
            &[(RelationKind::Depends, "apt-utils")],
        );
        let utils = dummy_package_with(
            "apt-utils",
            "1.0",
            "all",
            &[(RelationKind::Depends, "libapt-pkg")],
        );
        let apt = dummy_package_with(
            "apt",
            "1.0",
            "all",
            &[(RelationKind::Provides, "libapt-pkg")],
        );
        let source = SourceFixture::new(&[minimal, utils, apt.clone()]);
        let mut fetcher = prepared(&[&source], None);
        // the validation walk marks apt via Provides, but only
        // ubuntu-minimal itself is ignored
        fetcher.ignore_packages(&["ubuntu-minimal"]).unwrap();
        assert_eq!(fetcher.fetch_packages(&["apt"], true).unwrap(), vec![apt]);
    }

    #[test]
    fn dependency_satisfied_only_by_an_ignored_provider_is_dropped() {
        let foo = dummy_package_with(
            "foo",
            "1.0",
            "all",
            &[(RelationKind::Depends, "libapt-pkg")],
        );
        let apt = dummy_package_with(
            "apt",
            "1.0",
            "all",
            &[(RelationKind::Provides, "libapt-pkg")],
        );
        let source = SourceFixture::new(&[foo.clone(), apt]);
        let mut fetcher = prepared(&[&source], None);
        fetcher.ignore_packages(&["apt"]).unwrap();
        assert_eq!(fetcher.fetch_packages(&["foo"], true).unwrap(), vec![foo]);
    }
}
