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

//! Per-board constants and the boot command built from them. Boards are
//! value records; the family variant selects the boot-file strategy in
//! `bootfiles`.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::errors::Error;
use crate::util::unique_glob_match;

/// Substitution slot in the serial option templates, filled with the
/// resolved serial TTY at synthesis time.
const SERIAL_SLOT: &str = "{serial}";

lazy_static! {
    static ref KERNEL_MINOR_RE: Regex = Regex::new(r"2\.6\.([0-9]{2})").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmapBoard {
    Beagle,
    Igep,
    Overo,
    Panda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardFamily {
    Omap(OmapBoard),
    Ux500,
    Mx51evk,
    Vexpress,
}

/// FAT size of the boot partition. The partition type nibble follows
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatSize {
    Fat16,
    Fat32,
}

/// The configuration used when building an image for a board.
#[derive(Debug, Clone)]
pub struct BoardProfile {
    pub family: BoardFamily,
    pub uboot_flavor: Option<&'static str>,
    /// `slot:partition` naming the SD/eMMC partition holding boot files.
    pub mmc_option: &'static str,
    /// Non-zero when a raw loader partition precedes the boot partition.
    pub mmc_part_offset: u32,
    pub fat_size: FatSize,
    pub kernel_addr: &'static str,
    pub initrd_addr: &'static str,
    pub load_addr: &'static str,
    pub kernel_suffix: &'static str,
    pub boot_script: Option<&'static str>,
    /// Resolved serial TTY. OMAP profiles start unresolved; reading the
    /// TTY before `resolve_serial_tty` is a programming error.
    serial_tty: Option<String>,
    default_serial_tty: &'static str,
    extra_serial_opts: &'static str,
    /// Empty when the board has no live serial options.
    live_serial_opts: &'static str,
    pub extra_boot_args_options: Option<&'static str>,
}

/// The boards we can lay out media for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Beagle,
    Igep,
    Overo,
    Panda,
    Ux500,
    Mx51evk,
    Vexpress,
}

impl BoardKind {
    pub const ALL: [BoardKind; 7] = [
        BoardKind::Beagle,
        BoardKind::Igep,
        BoardKind::Overo,
        BoardKind::Panda,
        BoardKind::Ux500,
        BoardKind::Mx51evk,
        BoardKind::Vexpress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BoardKind::Beagle => "beagle",
            BoardKind::Igep => "igep",
            BoardKind::Overo => "overo",
            BoardKind::Panda => "panda",
            BoardKind::Ux500 => "ux500",
            BoardKind::Mx51evk => "mx51evk",
            BoardKind::Vexpress => "vexpress",
        }
    }

    pub fn profile(&self) -> BoardProfile {
        match self {
            BoardKind::Beagle => BoardProfile {
                family: BoardFamily::Omap(OmapBoard::Beagle),
                uboot_flavor: Some("omap3_beagle"),
                mmc_option: "0:1",
                mmc_part_offset: 0,
                fat_size: FatSize::Fat32,
                kernel_addr: "0x80000000",
                initrd_addr: "0x81600000",
                load_addr: "0x80008000",
                kernel_suffix: "linaro-omap",
                boot_script: Some("boot.scr"),
                serial_tty: None,
                default_serial_tty: "ttyO2",
                extra_serial_opts: "console=tty0 console={serial},115200n8",
                live_serial_opts: "serialtty={serial}",
                extra_boot_args_options: Some(
                    "earlyprintk fixrtc nocompcache vram=12M \
                     omapfb.mode=dvi:1280x720MR-16@60",
                ),
            },
            BoardKind::Igep => BoardProfile {
                // same silicon as beagle, but no u-boot of its own
                uboot_flavor: None,
                family: BoardFamily::Omap(OmapBoard::Igep),
                ..BoardKind::Beagle.profile()
            },
            BoardKind::Overo => BoardProfile {
                family: BoardFamily::Omap(OmapBoard::Overo),
                uboot_flavor: Some("omap3_overo"),
                mmc_option: "0:1",
                mmc_part_offset: 0,
                fat_size: FatSize::Fat32,
                kernel_addr: "0x80000000",
                initrd_addr: "0x81600000",
                load_addr: "0x80008000",
                kernel_suffix: "linaro-omap",
                boot_script: Some("boot.scr"),
                serial_tty: None,
                default_serial_tty: "ttyO2",
                extra_serial_opts: "console=tty0 console={serial},115200n8",
                live_serial_opts: "",
                extra_boot_args_options: Some("earlyprintk"),
            },
            BoardKind::Panda => BoardProfile {
                family: BoardFamily::Omap(OmapBoard::Panda),
                uboot_flavor: Some("omap4_panda"),
                mmc_option: "0:1",
                mmc_part_offset: 0,
                fat_size: FatSize::Fat32,
                kernel_addr: "0x80200000",
                initrd_addr: "0x81600000",
                load_addr: "0x80008000",
                kernel_suffix: "linaro-omap",
                boot_script: Some("boot.scr"),
                serial_tty: None,
                default_serial_tty: "ttyO2",
                extra_serial_opts: "console=tty0 console={serial},115200n8",
                live_serial_opts: "serialtty={serial}",
                extra_boot_args_options: Some(
                    "earlyprintk fixrtc nocompcache vram=32M \
                     omapfb.vram=0:8M mem=463M ip=none",
                ),
            },
            BoardKind::Ux500 => BoardProfile {
                family: BoardFamily::Ux500,
                uboot_flavor: None,
                mmc_option: "1:1",
                mmc_part_offset: 0,
                fat_size: FatSize::Fat32,
                kernel_addr: "0x00100000",
                initrd_addr: "0x08000000",
                load_addr: "0x00008000",
                kernel_suffix: "ux500",
                boot_script: Some("flash.scr"),
                serial_tty: Some("ttyAMA2".to_string()),
                default_serial_tty: "ttyAMA2",
                extra_serial_opts: "console=tty0 console={serial},115200n8",
                live_serial_opts: "serialtty={serial}",
                extra_boot_args_options: Some(
                    "earlyprintk rootdelay=1 fixrtc nocompcache \
                     mem=96M@0 mem_modem=32M@96M mem=44M@128M pmem=22M@172M \
                     mem=30M@194M mem_mali=32M@224M pmem_hwb=54M@256M \
                     hwmem=48M@302M mem=152M@360M",
                ),
            },
            BoardKind::Mx51evk => BoardProfile {
                family: BoardFamily::Mx51evk,
                uboot_flavor: None,
                mmc_option: "0:2",
                mmc_part_offset: 1,
                fat_size: FatSize::Fat32,
                kernel_addr: "0x90000000",
                initrd_addr: "0x90800000",
                load_addr: "0x90008000",
                kernel_suffix: "linaro-mx51",
                boot_script: Some("boot.scr"),
                serial_tty: Some("ttymxc0".to_string()),
                default_serial_tty: "ttymxc0",
                extra_serial_opts: "console=tty0 console={serial},115200n8",
                live_serial_opts: "serialtty={serial}",
                extra_boot_args_options: None,
            },
            BoardKind::Vexpress => BoardProfile {
                family: BoardFamily::Vexpress,
                uboot_flavor: Some("ca9x4_ct_vxp"),
                mmc_option: "0:1",
                mmc_part_offset: 0,
                // the ARM Boot Monitor loading u-boot only reads FAT16
                fat_size: FatSize::Fat16,
                kernel_addr: "0x60008000",
                initrd_addr: "0x81000000",
                load_addr: "0x60008000",
                kernel_suffix: "linaro-vexpress",
                boot_script: None,
                serial_tty: Some("ttyAMA0".to_string()),
                default_serial_tty: "ttyAMA0",
                extra_serial_opts: "console=tty0 console={serial},38400n8",
                live_serial_opts: "serialtty={serial}",
                extra_boot_args_options: None,
            },
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BoardKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        BoardKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .with_context(|| format!("unknown board {:?}", s))
    }
}

impl BoardProfile {
    /// The effective serial TTY. OMAP profiles must resolve it first.
    pub fn serial_tty(&self) -> Result<&str> {
        self.serial_tty
            .as_deref()
            .ok_or_else(|| Error::ProgrammingError("serial TTY has not been resolved").into())
    }

    /// Resolve the serial TTY from the kernel installed in the target
    /// root filesystem: 2.6 kernels older than .36 drove the OMAP UART
    /// as ttyS2, newer ones use the board default.
    pub fn resolve_serial_tty(&mut self, root_dir: &Path) -> Result<()> {
        let vmlinuz =
            unique_glob_match(&format!("{}/boot/vmlinuz*", root_dir.display()))
                .context("locating kernel image")?;
        let basename = vmlinuz
            .file_name()
            .context("kernel image has no filename")?
            .to_string_lossy()
            .into_owned();
        let minor: u32 = KERNEL_MINOR_RE
            .captures(&basename)
            .with_context(|| format!("no kernel version in {:?}", basename))?[1]
            .parse()
            .context("parsing kernel minor version")?;
        self.serial_tty = Some(if minor < 36 {
            "ttyS2".to_string()
        } else {
            self.default_serial_tty.to_string()
        });
        Ok(())
    }

    /// The kernel command line for this board.
    pub fn boot_args(
        &self,
        is_live: bool,
        is_lowmem: bool,
        consoles: &[String],
        rootfs_uuid: &str,
    ) -> Result<String> {
        let serial_tty = self.serial_tty()?;
        let fill = |template: &str| template.replace(SERIAL_SLOT, serial_tty);

        let mut tokens: Vec<String> = Vec::new();
        for console in consoles {
            tokens.push(format!("console={}", console));
        }
        if is_live {
            tokens.push(format!("serialtty={}", serial_tty));
        }
        tokens.push(fill(self.extra_serial_opts));
        if is_live {
            tokens.push(fill(self.live_serial_opts));
            if is_lowmem {
                tokens.push("only-ubiquity".to_string());
            }
        }
        if is_live {
            tokens.push("boot=casper".to_string());
        } else {
            tokens.push(format!("root=UUID={}", rootfs_uuid));
        }
        tokens.push("rootwait ro".to_string());
        if let Some(extra) = self.extra_boot_args_options {
            tokens.push(extra.to_string());
        }
        Ok(tokens
            .into_iter()
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// The boot command: kernel and initrd loads, the bootargs line, and
    /// the final `boot`.
    pub fn boot_command(
        &self,
        is_live: bool,
        is_lowmem: bool,
        consoles: &[String],
        rootfs_uuid: &str,
    ) -> Result<String> {
        let boot_args = self.boot_args(is_live, is_lowmem, consoles, rootfs_uuid)?;
        Ok(format!(
            "setenv bootcmd 'fatload mmc {mmc} {kernel} uImage; \
             fatload mmc {mmc} {initrd} uInitrd; bootm {kernel} {initrd}'\n\
             setenv bootargs '{args}'\n\
             boot",
            mmc = self.mmc_option,
            kernel = self.kernel_addr,
            initrd = self.initrd_addr,
            args = boot_args,
        ))
    }
}
