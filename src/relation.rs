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

//! The relationship grammar shared by the seven relationship fields:
//! comma-separated entries, each a `|`-disjunction of alternatives, each
//! alternative a package name with an optional parenthesized version
//! constraint. Parsing preserves entry and alternative order; rendering
//! produces the canonical ` | ` / `, ` separators.

use anyhow::{bail, Context, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::version;

/// The seven relationship kinds a package record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Depends,
    PreDepends,
    Conflicts,
    Recommends,
    Provides,
    Replaces,
    Breaks,
}

impl RelationKind {
    /// All kinds, in the order they appear in index stanzas.
    pub const ALL: [RelationKind; 7] = [
        RelationKind::Depends,
        RelationKind::PreDepends,
        RelationKind::Conflicts,
        RelationKind::Recommends,
        RelationKind::Provides,
        RelationKind::Replaces,
        RelationKind::Breaks,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            RelationKind::Depends => "Depends",
            RelationKind::PreDepends => "Pre-Depends",
            RelationKind::Conflicts => "Conflicts",
            RelationKind::Recommends => "Recommends",
            RelationKind::Provides => "Provides",
            RelationKind::Replaces => "Replaces",
            RelationKind::Breaks => "Breaks",
        }
    }

    pub fn from_field_name(name: &str) -> Option<RelationKind> {
        RelationKind::ALL
            .into_iter()
            .find(|kind| kind.field_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Version-constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionOp {
    StrictlyEarlier,
    EarlierEqual,
    Exactly,
    LaterEqual,
    StrictlyLater,
}

impl fmt::Display for VersionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionOp::StrictlyEarlier => "<<",
            VersionOp::EarlierEqual => "<=",
            VersionOp::Exactly => "=",
            VersionOp::LaterEqual => ">=",
            VersionOp::StrictlyLater => ">>",
        })
    }
}

impl FromStr for VersionOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "<<" => VersionOp::StrictlyEarlier,
            "<=" => VersionOp::EarlierEqual,
            "=" => VersionOp::Exactly,
            ">=" => VersionOp::LaterEqual,
            ">>" => VersionOp::StrictlyLater,
            other => bail!("unrecognized version operator {:?}", other),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: VersionOp,
    pub version: String,
}

impl Constraint {
    pub fn satisfied_by(&self, candidate: &str) -> bool {
        let ord = version::compare(candidate, &self.version);
        match self.op {
            VersionOp::StrictlyEarlier => ord == Ordering::Less,
            VersionOp::EarlierEqual => ord != Ordering::Greater,
            VersionOp::Exactly => ord == Ordering::Equal,
            VersionOp::LaterEqual => ord != Ordering::Less,
            VersionOp::StrictlyLater => ord == Ordering::Greater,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", self.op, self.version)
    }
}

/// One alternative of a relationship entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub package: String,
    pub constraint: Option<Constraint>,
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{} {}", self.package, constraint),
            None => f.write_str(&self.package),
        }
    }
}

/// One comma-separated entry: a disjunction of alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEntry {
    pub alternatives: Vec<Alternative>,
}

impl fmt::Display for RelationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", alt)?;
        }
        Ok(())
    }
}

/// A full relationship field value. Absent relationships are `None` at the
/// call sites, never an empty `Relationship`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub entries: Vec<RelationEntry>,
}

impl Relationship {
    pub fn parse(text: &str) -> Result<Relationship> {
        if text.trim().is_empty() {
            bail!("empty relationship field");
        }
        let entries = text
            .split(',')
            .map(parse_entry)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("parsing relationship {:?}", text))?;
        Ok(Relationship { entries })
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

impl FromStr for Relationship {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Relationship::parse(s)
    }
}

fn parse_entry(text: &str) -> Result<RelationEntry> {
    let alternatives = text
        .split('|')
        .map(parse_alternative)
        .collect::<Result<Vec<_>>>()?;
    Ok(RelationEntry { alternatives })
}

fn parse_alternative(text: &str) -> Result<Alternative> {
    let text = text.trim();
    if text.is_empty() {
        bail!("empty alternative");
    }
    let (package, constraint) = match text.split_once('(') {
        Some((package, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .with_context(|| format!("unterminated version constraint in {:?}", text))?
                .trim();
            // two-character operators first so "<=" isn't read as "=", and
            // whitespace before the version is optional
            let (op, wanted) = ["<<", "<=", ">=", ">>", "="]
                .iter()
                .find_map(|op| inner.strip_prefix(op).map(|rest| (*op, rest)))
                .with_context(|| format!("malformed version constraint in {:?}", text))?;
            let wanted = wanted.trim();
            if wanted.is_empty() {
                bail!("missing version in constraint {:?}", text);
            }
            let constraint = Constraint {
                op: op.parse()?,
                version: wanted.to_string(),
            };
            (package.trim(), Some(constraint))
        }
        None => (text, None),
    };
    if package.is_empty() {
        bail!("missing package name in {:?}", text);
    }
    Ok(Alternative {
        package: package.to_string(),
        constraint,
    })
}
