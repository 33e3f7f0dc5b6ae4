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

//! Hardware pack assembly and boot media layout for ARM boards: an
//! isolated package index with a transitive-closure fetcher, a codec for
//! the ar-wrapped binary package format, and a deterministic partition
//! and boot-artifact planner driven by per-board profiles.

pub mod archive;
pub mod boards;
pub mod bootfiles;
pub mod cmdline;
pub mod errors;
pub mod fetcher;
pub mod index;
pub mod package;
pub mod partitions;
pub mod relation;
pub mod tarmatch;
pub mod util;
pub mod version;

#[cfg(test)]
pub(crate) mod testutil;
