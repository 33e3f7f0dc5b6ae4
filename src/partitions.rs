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

//! Sector-exact media layout. Geometry is fixed at 255 heads and 63
//! sectors per track (older OMAP3 boot ROMs can't cope with anything
//! else), partitions start on 4 MiB boundaries for performance and
//! wear-leveling, and they end on cylinder boundaries to keep sfdisk
//! happy. The root partition follows the boot partition, which follows
//! an optional raw loader partition.

use std::fmt::Write as _;

use crate::boards::{BoardProfile, FatSize};

/// Sectors per cylinder under the fixed 255x63 geometry.
const CYLINDER_S: u64 = 63 * 255;

/// Alignment of partition starts, in 512-byte sectors (4 MiB).
pub const PART_ALIGN_S: u64 = 4 * 1024 * 1024 / 512;

/// Start of the optional raw loader partition, right after the MBR.
/// This one needs no alignment.
pub const LOADER_PART_START_S: u64 = 2;

/// Start of the boot partition (8 MiB).
pub const BOOT_PART_START_S: u64 = 8 * 1024 * 1024 / 512;

/// Start of the root partition (64 MiB).
pub const ROOT_PART_START_S: u64 = 64 * 1024 * 1024 / 512;

/// The loader partition runs up to the last cylinder boundary before the
/// boot partition.
pub const LOADER_PART_SIZE_S: u64 =
    (BOOT_PART_START_S / CYLINDER_S) * CYLINDER_S - LOADER_PART_START_S;

/// The boot partition runs up to the last cylinder boundary before the
/// root partition.
pub const BOOT_PART_SIZE_S: u64 =
    (ROOT_PART_START_S / CYLINDER_S) * CYLINDER_S - BOOT_PART_START_S;

// Layout invariants; a violation here is a bug in the constants above.
const _: () = assert!(BOOT_PART_START_S % PART_ALIGN_S == 0);
const _: () = assert!(ROOT_PART_START_S % PART_ALIGN_S == 0);
const _: () = assert!(LOADER_PART_START_S + LOADER_PART_SIZE_S < BOOT_PART_START_S);
const _: () = assert!(BOOT_PART_START_S + BOOT_PART_SIZE_S < ROOT_PART_START_S);

/// The sfdisk directive partitioning the media for a board: an optional
/// type-0xDA loader partition, the bootable FAT partition, and a root
/// partition filling the remaining space.
pub fn sfdisk_directive(profile: &BoardProfile) -> String {
    let boot_type = match profile.fat_size {
        FatSize::Fat32 => "0x0C",
        FatSize::Fat16 => "0x0E",
    };
    let mut directive = String::new();
    if profile.mmc_part_offset > 0 {
        writeln!(
            directive,
            "{},{},0xDA",
            LOADER_PART_START_S, LOADER_PART_SIZE_S
        )
        .unwrap();
    }
    write!(
        directive,
        "{},{},{},*\n{},,,-",
        BOOT_PART_START_S, BOOT_PART_SIZE_S, boot_type, ROOT_PART_START_S
    )
    .unwrap();
    directive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::BoardKind;

    #[test]
    fn constants_follow_the_geometry() {
        assert_eq!(PART_ALIGN_S, 8192);
        assert_eq!(BOOT_PART_START_S, 16384);
        assert_eq!(ROOT_PART_START_S, 131072);
        assert_eq!(LOADER_PART_SIZE_S, 16063);
        assert_eq!(BOOT_PART_SIZE_S, 112136);
    }

    #[test]
    fn layout_invariants_hold() {
        assert_eq!(BOOT_PART_START_S % PART_ALIGN_S, 0);
        assert_eq!(ROOT_PART_START_S % PART_ALIGN_S, 0);
        assert!(LOADER_PART_START_S + LOADER_PART_SIZE_S < BOOT_PART_START_S);
        assert!(BOOT_PART_START_S < BOOT_PART_START_S + BOOT_PART_SIZE_S);
        assert!(BOOT_PART_START_S + BOOT_PART_SIZE_S < ROOT_PART_START_S);
    }

    #[test]
    fn fat32_board_directive() {
        assert_eq!(
            sfdisk_directive(&BoardKind::Beagle.profile()),
            format!(
                "{},{},0x0C,*\n{},,,-",
                BOOT_PART_START_S, BOOT_PART_SIZE_S, ROOT_PART_START_S
            )
        );
        assert_eq!(
            sfdisk_directive(&BoardKind::Beagle.profile()),
            "16384,112136,0x0C,*\n131072,,,-"
        );
    }

    #[test]
    fn fat16_board_directive() {
        assert_eq!(
            sfdisk_directive(&BoardKind::Vexpress.profile()),
            "16384,112136,0x0E,*\n131072,,,-"
        );
    }

    #[test]
    fn loader_partition_leads_when_offset_is_set() {
        assert_eq!(
            sfdisk_directive(&BoardKind::Mx51evk.profile()),
            "2,16063,0xDA\n16384,112136,0x0C,*\n131072,,,-"
        );
    }

    #[test]
    fn only_mx51evk_carries_a_loader_partition() {
        for kind in BoardKind::ALL {
            let has_loader = sfdisk_directive(&kind.profile()).starts_with("2,");
            assert_eq!(has_loader, kind == BoardKind::Mx51evk, "board {}", kind);
        }
    }
}
