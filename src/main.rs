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

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use std::process;

use libhwpack::boards::BoardKind;
use libhwpack::bootfiles::{self, BootFilesRequest};
use libhwpack::cmdline::{
    Cmd, FetchPackagesConfig, InspectPackageConfig, MakeBootFilesConfig, SfdiskCmdConfig,
};
use libhwpack::fetcher::PackageFetcher;
use libhwpack::package::packages_file;
use libhwpack::{archive, partitions};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cmd::parse() {
        Cmd::FetchPackages(config) => fetch_packages(&config),
        Cmd::InspectPackage(config) => inspect_package(&config),
        Cmd::SfdiskCmd(config) => sfdisk_cmd(&config),
        Cmd::MakeBootFiles(config) => make_boot_files(&config),
    }
}

fn fetch_packages(config: &FetchPackagesConfig) -> Result<()> {
    let mut fetcher = PackageFetcher::new(&config.sources, config.architecture.as_deref());
    fetcher.prepare()?;

    let ignore: Vec<&str> = config.ignore.iter().map(String::as_str).collect();
    if !ignore.is_empty() {
        fetcher.ignore_packages(&ignore)?;
    }

    let roots: Vec<&str> = config.packages.iter().map(String::as_str).collect();
    let fetched = fetcher.fetch_packages(&roots, !config.no_content)?;

    if let Some(out_dir) = &config.out_dir {
        fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir))?;
        for package in &fetched {
            if let Some(content) = package.content() {
                let path = Path::new(out_dir).join(&package.filename);
                fs::write(&path, content)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
    }

    print!("{}", packages_file(&fetched, None));
    Ok(())
}

fn inspect_package(config: &InspectPackageConfig) -> Result<()> {
    let package = archive::read_package(Path::new(&config.path))?;
    print!("{}", packages_file(&[package], None));
    Ok(())
}

fn sfdisk_cmd(config: &SfdiskCmdConfig) -> Result<()> {
    let board: BoardKind = config.board.parse()?;
    println!("{}", partitions::sfdisk_directive(&board.profile()));
    Ok(())
}

fn make_boot_files(config: &MakeBootFilesConfig) -> Result<()> {
    let board: BoardKind = config.board.parse()?;
    bootfiles::make_boot_files(&BootFilesRequest {
        board,
        uboot_parts_dir: Path::new(&config.uboot_parts_dir),
        root_dir: Path::new(&config.root_dir),
        boot_dir: Path::new(&config.boot_dir),
        boot_device_or_file: Path::new(&config.device),
        is_live: config.live,
        is_lowmem: config.lowmem,
        consoles: &config.consoles,
        rootfs_uuid: &config.rootfs_uuid,
    })
}
