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

use thiserror::Error;

/// Error categories promised by the library. Most call sites return
/// `anyhow::Result` with one of these at the bottom of the chain, so
/// callers can match on the category with `downcast_ref::<Error>()`.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested package is absent from every configured source.
    #[error("package {0} not found in any configured source")]
    PackageNotFound(String),

    /// The resolver cannot satisfy a required relationship of the named
    /// package.
    #[error("Unable to satisfy dependencies of {0}")]
    DependencyNotSatisfied(String),

    /// The archive writer received a control field outside the recognised
    /// set.
    #[error("unknown control field {0:?}")]
    UnknownField(String),

    /// A required on-disk artifact matched zero or multiple paths.
    #[error("expected exactly one match for {pattern:?}, found {count}")]
    GlobAmbiguous { pattern: String, count: usize },

    /// A spawned helper exited non-zero.
    #[error("{command} failed with {status}")]
    ExternalToolFailed { command: String, status: String },

    /// Misuse of the API, e.g. querying before preparation.
    #[error("programming error: {0}")]
    ProgrammingError(&'static str),
}
