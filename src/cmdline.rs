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

use clap::Parser;

// Args are listed in --help in the order declared in these structs.
// Please keep the entire help text to 80 columns.

#[derive(Debug, Parser)]
#[clap(version)]
#[clap(args_conflicts_with_subcommands = true)]
#[clap(disable_help_subcommand = true)]
pub enum Cmd {
    /// Fetch packages and their dependency closure from package sources
    FetchPackages(FetchPackagesConfig),
    /// Show the metadata stanza of a binary package archive
    InspectPackage(InspectPackageConfig),
    /// Print the sfdisk directive partitioning the media for a board
    SfdiskCmd(SfdiskCmdConfig),
    /// Populate the boot partition for a board
    MakeBootFiles(MakeBootFilesConfig),
}

#[derive(Debug, Parser)]
pub struct FetchPackagesConfig {
    /// Package source entry "<uri> <suite> [component...]" (repeatable)
    #[clap(short = 's', long = "source", value_name = "ENTRY", required = true)]
    pub sources: Vec<String>,
    /// Restrict candidates to this architecture (plus "all")
    #[clap(short, long, value_name = "ARCH")]
    pub architecture: Option<String>,
    /// Exclude a package and its exclusive dependencies (repeatable)
    #[clap(short, long, value_name = "NAME")]
    pub ignore: Vec<String>,
    /// Resolve metadata only; skip archive downloads and dependencies
    #[clap(long)]
    pub no_content: bool,
    /// Write the fetched archives into this directory
    #[clap(short, long, value_name = "DIR")]
    pub out_dir: Option<String>,
    /// Root packages to fetch
    #[clap(value_name = "PACKAGE", required = true)]
    pub packages: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct InspectPackageConfig {
    /// Path to a .deb archive
    #[clap(value_name = "PATH")]
    pub path: String,
}

#[derive(Debug, Parser)]
pub struct SfdiskCmdConfig {
    /// Board to lay the media out for
    #[clap(value_name = "BOARD")]
    pub board: String,
}

#[derive(Debug, Parser)]
pub struct MakeBootFilesConfig {
    /// Board to produce boot files for
    #[clap(long, value_name = "BOARD")]
    pub board: String,
    /// Directory holding the extracted kernel and initrd artifacts
    #[clap(long, value_name = "DIR")]
    pub uboot_parts_dir: String,
    /// Target root filesystem
    #[clap(long, value_name = "DIR")]
    pub root_dir: String,
    /// Mounted boot partition to populate
    #[clap(long, value_name = "DIR")]
    pub boot_dir: String,
    /// The medium itself, for boards that raw-write a bootloader
    #[clap(long, value_name = "PATH")]
    pub device: String,
    /// Build for a live image (boot=casper)
    #[clap(long)]
    pub live: bool,
    /// Restrict the live session for low-memory boards
    #[clap(long)]
    pub lowmem: bool,
    /// Kernel console (repeatable)
    #[clap(long = "console", value_name = "CONSOLE")]
    pub consoles: Vec<String>,
    /// UUID of the root filesystem
    #[clap(long, value_name = "UUID", default_value = "")]
    pub rootfs_uuid: String,
}
