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

//! Populates the boot partition for a board: kernel and initrd wrapped as
//! bootable images, the compiled boot script, and the per-family
//! bootloader emplacement (MLO for OMAP, a raw-written second stage for
//! mx51evk).

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::boards::{BoardFamily, BoardKind, BoardProfile};
use crate::errors::Error;
use crate::util::{run_tool, tool_command, unique_glob_match};

/// Everything needed to populate a boot partition.
pub struct BootFilesRequest<'a> {
    pub board: BoardKind,
    /// Directory holding the extracted kernel and initrd artifacts.
    pub uboot_parts_dir: &'a Path,
    /// The target root filesystem.
    pub root_dir: &'a Path,
    /// Mounted boot partition to populate.
    pub boot_dir: &'a Path,
    /// The medium itself, for boards that raw-write a bootloader.
    pub boot_device_or_file: &'a Path,
    pub is_live: bool,
    pub is_lowmem: bool,
    pub consoles: &'a [String],
    pub rootfs_uuid: &'a str,
}

/// Produce the boot files for the request's board.
pub fn make_boot_files(request: &BootFilesRequest<'_>) -> Result<()> {
    let mut profile = request.board.profile();
    if matches!(profile.family, BoardFamily::Omap(_)) {
        // must happen before anything reads the serial TTY
        profile.resolve_serial_tty(request.root_dir)?;
    }
    let boot_cmd = profile.boot_command(
        request.is_live,
        request.is_lowmem,
        request.consoles,
        request.rootfs_uuid,
    )?;

    match profile.family {
        BoardFamily::Omap(_) => {
            if profile.uboot_flavor.is_some() {
                install_omap_boot_loader(request.root_dir, request.boot_dir)?;
            }
            make_uimage(&profile, request.uboot_parts_dir, request.boot_dir)?;
            make_uinitrd(&profile, request.uboot_parts_dir, request.boot_dir)?;
            let script = compile_boot_script(&profile, &boot_cmd, request.boot_dir)?;
            install_boot_ini(&script, request.boot_dir)?;
        }
        BoardFamily::Ux500 => {
            make_uimage(&profile, request.uboot_parts_dir, request.boot_dir)?;
            make_uinitrd(&profile, request.uboot_parts_dir, request.boot_dir)?;
            compile_boot_script(&profile, &boot_cmd, request.boot_dir)?;
        }
        BoardFamily::Mx51evk => {
            let imx = request.root_dir.join("usr/lib/u-boot/mx51evk/u-boot.imx");
            install_mx51evk_boot_loader(&imx, request.boot_device_or_file)?;
            make_uimage(&profile, request.uboot_parts_dir, request.boot_dir)?;
            make_uinitrd(&profile, request.uboot_parts_dir, request.boot_dir)?;
            compile_boot_script(&profile, &boot_cmd, request.boot_dir)?;
        }
        BoardFamily::Vexpress => {
            // the Boot Monitor loads images straight off the FAT
            // partition; no boot script
            make_uimage(&profile, request.uboot_parts_dir, request.boot_dir)?;
            make_uinitrd(&profile, request.uboot_parts_dir, request.boot_dir)?;
        }
    }
    Ok(())
}

fn run_mkimage(
    img_type: &str,
    load_addr: &str,
    entry_point: &str,
    name: &str,
    img_data: &Path,
    img: &Path,
) -> Result<()> {
    let args: Vec<&OsStr> = vec![
        "-A".as_ref(),
        "arm".as_ref(),
        "-O".as_ref(),
        "linux".as_ref(),
        "-T".as_ref(),
        img_type.as_ref(),
        "-C".as_ref(),
        "none".as_ref(),
        "-a".as_ref(),
        load_addr.as_ref(),
        "-e".as_ref(),
        entry_point.as_ref(),
        "-n".as_ref(),
        name.as_ref(),
        "-d".as_ref(),
        img_data.as_os_str(),
        img.as_os_str(),
    ];
    run_tool(tool_command("mkimage", &args, true))
}

/// Wrap the kernel matching the profile's suffix as `uImage`.
pub fn make_uimage(
    profile: &BoardProfile,
    uboot_parts_dir: &Path,
    boot_dir: &Path,
) -> Result<PathBuf> {
    let kernel = unique_glob_match(&format!(
        "{}/vmlinuz-*-{}",
        uboot_parts_dir.display(),
        profile.kernel_suffix
    ))?;
    let img = boot_dir.join("uImage");
    run_mkimage(
        "kernel",
        profile.load_addr,
        profile.load_addr,
        "Linux",
        &kernel,
        &img,
    )?;
    Ok(img)
}

/// Wrap the initrd matching the profile's suffix as `uInitrd`.
pub fn make_uinitrd(
    profile: &BoardProfile,
    uboot_parts_dir: &Path,
    boot_dir: &Path,
) -> Result<PathBuf> {
    let initrd = unique_glob_match(&format!(
        "{}/initrd.img-*-{}",
        uboot_parts_dir.display(),
        profile.kernel_suffix
    ))?;
    let img = boot_dir.join("uInitrd");
    run_mkimage("ramdisk", "0", "0", "initramfs", &initrd, &img)?;
    Ok(img)
}

/// Compile the boot command into the profile's boot script. The script
/// source is a temporary file owned by this call and removed when it
/// returns.
pub fn compile_boot_script(
    profile: &BoardProfile,
    boot_cmd: &str,
    boot_dir: &Path,
) -> Result<PathBuf> {
    let name = profile
        .boot_script
        .ok_or(Error::ProgrammingError("board has no boot script"))?;
    let mut source = tempfile::NamedTempFile::new().context("creating boot script source")?;
    source
        .write_all(boot_cmd.as_bytes())
        .context("writing boot script source")?;
    source.flush().context("flushing boot script source")?;
    let script = boot_dir.join(name);
    run_mkimage("script", "0", "0", "boot script", source.path(), &script)?;
    Ok(script)
}

/// Locate the MLO first-stage loader in the root filesystem. Newer
/// x-loader packages install under a versioned subdirectory, older ones
/// directly under usr/lib.
fn locate_mlo(root_dir: &Path) -> Result<PathBuf> {
    let deep_pattern = format!("{}/usr/lib/*/*/MLO", root_dir.display());
    let shallow_pattern = format!("{}/usr/lib/*/MLO", root_dir.display());
    let mut matches = glob_all(&deep_pattern)?;
    let pattern = if matches.is_empty() {
        matches = glob_all(&shallow_pattern)?;
        shallow_pattern
    } else {
        deep_pattern
    };
    if matches.len() != 1 {
        return Err(Error::GlobAmbiguous {
            pattern,
            count: matches.len(),
        }
        .into());
    }
    Ok(matches.remove(0))
}

fn glob_all(pattern: &str) -> Result<Vec<PathBuf>> {
    glob::glob(pattern)
        .with_context(|| format!("globbing {}", pattern))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("walking matches of {}", pattern))
}

/// Copy MLO into the boot partition and flush the medium.
pub fn install_omap_boot_loader(root_dir: &Path, boot_dir: &Path) -> Result<()> {
    let mlo = locate_mlo(root_dir)?;
    run_tool(tool_command(
        "cp",
        &["-v".as_ref(), mlo.as_os_str(), boot_dir.as_os_str()],
        true,
    ))?;
    run_tool(tool_command::<&str>("sync", &[], false))
}

/// Raw-write the mx51evk second-stage loader just past the MBR.
pub fn install_mx51evk_boot_loader(imx_file: &Path, boot_device_or_file: &Path) -> Result<()> {
    run_tool(tool_command(
        "dd",
        &[
            format!("if={}", imx_file.display()),
            format!("of={}", boot_device_or_file.display()),
            "bs=1024".to_string(),
            "seek=1".to_string(),
            "conv=notrunc".to_string(),
        ],
        true,
    ))
}

/// OMAP firmware also reads the boot script as `boot.ini`.
pub fn install_boot_ini(boot_script: &Path, boot_dir: &Path) -> Result<()> {
    run_tool(tool_command(
        "cp",
        &[
            "-v".as_ref(),
            boot_script.as_os_str(),
            boot_dir.join("boot.ini").as_os_str(),
        ],
        true,
    ))
}
