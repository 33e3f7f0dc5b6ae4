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

//! Package version ordering. This is the dpkg comparison algorithm:
//! `[epoch:]upstream[-revision]`, where digit runs compare numerically,
//! letters sort before other characters, and `~` sorts before everything
//! including the end of the string.

use std::cmp::Ordering;

/// Compare two version strings under the index's ordering.
pub fn compare(a: &str, b: &str) -> Ordering {
    let (a_epoch, a_upstream, a_revision) = split(a);
    let (b_epoch, b_upstream, b_revision) = split(b);
    a_epoch
        .cmp(&b_epoch)
        .then_with(|| fragment_cmp(a_upstream, b_upstream))
        .then_with(|| fragment_cmp(a_revision, b_revision))
}

/// Split into (epoch, upstream, revision). A missing epoch is 0 and a
/// missing revision is empty, which sorts first.
fn split(version: &str) -> (u64, &str, &str) {
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) => (epoch.parse().unwrap_or(0), rest),
        None => (0, version),
    };
    let (upstream, revision) = match rest.rsplit_once('-') {
        Some((upstream, revision)) => (upstream, revision),
        None => (rest, ""),
    };
    (epoch, upstream, revision)
}

/// Sort weight of one byte in a non-digit run.
fn order(c: u8) -> i32 {
    match c {
        b'~' => -1,
        c if c.is_ascii_digit() => 0,
        c if c.is_ascii_alphabetic() => c as i32,
        0 => 0,
        c => c as i32 + 256,
    }
}

/// Compare one upstream-version or revision fragment.
fn fragment_cmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        // non-digit run
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied().unwrap_or(0));
            let bc = order(b.get(j).copied().unwrap_or(0));
            match ac.cmp(&bc) {
                Ordering::Equal => (),
                other => return other,
            }
            i += 1;
            j += 1;
        }
        // digit run, numerically: skip leading zeros, then the longer run
        // of significant digits wins
        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }
        let mut first_diff = Ordering::Equal;
        while i < a.len() && a[i].is_ascii_digit() && j < b.len() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn earlier(a: &str, b: &str) {
        assert_eq!(compare(a, b), Ordering::Less, "{} vs {}", a, b);
        assert_eq!(compare(b, a), Ordering::Greater, "{} vs {}", b, a);
    }

    #[test]
    fn simple_ordering() {
        earlier("1.0", "1.1");
        earlier("1.0", "2.0");
        earlier("1.9", "1.10");
        assert_eq!(compare("1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn leading_zeros_are_insignificant() {
        assert_eq!(compare("1.01", "1.1"), Ordering::Equal);
        earlier("1.01", "1.2");
    }

    #[test]
    fn epoch_dominates() {
        earlier("2.0", "1:1.0");
        earlier("1:1.0", "2:0.1");
    }

    #[test]
    fn revision_breaks_ties() {
        earlier("1.0-1", "1.0-2");
        earlier("1.0", "1.0-1");
        assert_eq!(compare("1.0-1", "1.0-1"), Ordering::Equal);
    }

    #[test]
    fn hyphen_splits_on_last() {
        earlier("1.0-1-1", "1.0-1-2");
        earlier("1.0-1-1", "1.0-2-1");
    }

    #[test]
    fn tilde_sorts_before_everything() {
        earlier("1.0~rc1", "1.0");
        earlier("1.0~rc1", "1.0~rc2");
        earlier("1.0~~", "1.0~");
    }

    #[test]
    fn letters_sort_before_other_characters() {
        earlier("1.0a", "1.0+");
        earlier("1.0alpha", "1.0b");
    }

    #[test]
    fn ubuntu_style_suffixes() {
        earlier("1.0", "1.0ubuntu1");
        earlier("1.0ubuntu1", "1.0ubuntu2");
        earlier("1.0-1", "1.0-1ubuntu1");
    }
}
