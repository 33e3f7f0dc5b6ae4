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

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;

use crate::errors::Error;

/// Build a command line, elevating privileges with sudo when the operation
/// targets something the invoking user normally can't write (block devices,
/// root-owned boot partitions).
pub fn tool_command<S: AsRef<OsStr>>(program: &str, args: &[S], as_root: bool) -> Command {
    let mut cmd = if as_root {
        let mut cmd = Command::new("sudo");
        cmd.arg(program);
        cmd
    } else {
        Command::new(program)
    };
    cmd.args(args);
    cmd
}

/// Render a command for error reporting.
fn describe(cmd: &Command) -> String {
    let mut out = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        out.push(' ');
        out.push_str(&arg.to_string_lossy());
    }
    out
}

/// Run the command to completion and check its exit status. Failures carry
/// the full command line and the status.
pub fn run_tool(mut cmd: Command) -> Result<()> {
    let status = cmd
        .status()
        .with_context(|| format!("running {}", describe(&cmd)))?;
    if !status.success() {
        return Err(Error::ExternalToolFailed {
            command: describe(&cmd),
            status: status.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Runs the provided Command object, captures its stdout, and swallows its
/// stderr except on failure. Output is assumed to be UTF-8.
pub fn cmd_output(cmd: &mut Command) -> Result<String> {
    let result = cmd
        .output()
        .with_context(|| format!("running {}", describe(cmd)))?;
    if !result.status.success() {
        eprint!("{}", String::from_utf8_lossy(&result.stderr));
        return Err(Error::ExternalToolFailed {
            command: describe(cmd),
            status: result.status.to_string(),
        }
        .into());
    }
    String::from_utf8(result.stdout)
        .with_context(|| format!("decoding as UTF-8 output of `{}`", describe(cmd)))
}

/// Return the single path matching the glob pattern. Zero or multiple
/// matches fail.
pub fn unique_glob_match(pattern: &str) -> Result<PathBuf> {
    let matches = glob::glob(pattern)
        .with_context(|| format!("globbing {}", pattern))?
        .collect::<Result<Vec<PathBuf>, _>>()
        .with_context(|| format!("walking matches of {}", pattern))?;
    if matches.len() != 1 {
        return Err(Error::GlobAmbiguous {
            pattern: pattern.to_string(),
            count: matches.len(),
        }
        .into());
    }
    Ok(matches.into_iter().next().unwrap())
}
