//! # Disk Format Probe
//!
//! Asks `blkid` which filesystem (if any) a block device carries, so the VM
//! setup can decide whether a disk needs formatting before it is attached.
//!
//! ## Output Contract
//!
//! blkid is run with `-o export`, which prints one `KEY=VALUE` per line:
//!
//! ```text
//! DEVNAME=/dev/vdb
//! TYPE="ext4"
//! ```
//!
//! busybox blkid prints the pairs space-separated on one line instead, so
//! lines are additionally split on spaces.
//!
//! | Exit status | Meaning                         | Result        |
//! |-------------|---------------------------------|---------------|
//! | 0           | signature found (or no `TYPE`)  | parsed `TYPE` |
//! | 2           | nothing identified (unformatted)| `None`        |
//! | other       | blkid failure                   | error         |

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::constants::{
    BLKID_ARGS, BLKID_EXIT_NO_SIGNATURE, BLKID_PROGRAM, BLKID_TIMEOUT, MAX_BLKID_STDERR,
};
use crate::error::{Error, Result};

/// Runs blkid against block devices.
#[derive(Debug, Clone)]
pub struct BlkidProbe {
    program: PathBuf,
    timeout: Duration,
}

impl BlkidProbe {
    /// Creates a probe using `blkid` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(BLKID_PROGRAM),
            timeout: BLKID_TIMEOUT,
        }
    }

    /// Sets the blkid executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the filesystem type on `disk`.
    ///
    /// `Ok(None)` means the device carries no recognizable signature.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if blkid cannot be spawned.
    /// - [`Error::Timeout`] if blkid does not finish in time.
    /// - [`Error::BlkidFailed`] for exit statuses other than 0 and 2.
    pub async fn dev_format(&self, disk: &Path) -> Result<Option<String>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(BLKID_ARGS)
            .arg(disk)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Probing disk format of {}", disk.display());

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("blkid {}", disk.display()),
                duration: self.timeout,
            })??;

        if !output.status.success() {
            if output.status.code() == Some(BLKID_EXIT_NO_SIGNATURE) {
                debug!("{} is unformatted", disk.display());
                return Ok(None);
            }
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.len() > MAX_BLKID_STDERR {
                let mut end = MAX_BLKID_STDERR;
                while !stderr.is_char_boundary(end) {
                    end -= 1;
                }
                stderr.truncate(end);
            }
            return Err(Error::BlkidFailed {
                disk: disk.to_path_buf(),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(parse_export_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for BlkidProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the `TYPE` value from `blkid -o export` output.
///
/// Tokens that are not exactly `KEY=VALUE` are skipped. Quotes are removed
/// from the value. When `TYPE` appears more than once the last one wins.
#[must_use]
pub fn parse_export_output(output: &str) -> Option<String> {
    let mut fstype = None;
    for token in output.lines().flat_map(|line| line.split(' ')) {
        let mut parts = token.split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if key == "TYPE" {
            fstype = Some(value.replace('"', ""));
        }
    }
    fstype
}

/// Returns the filesystem type on `disk` using the default probe.
///
/// # Errors
///
/// See [`BlkidProbe::dev_format`].
pub async fn dev_format(disk: &Path) -> Result<Option<String>> {
    BlkidProbe::new().dev_format(disk).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_util_linux_output() {
        let out = "DEVNAME=/dev/vdb\nTYPE=ext4\n";
        assert_eq!(parse_export_output(out).as_deref(), Some("ext4"));
    }

    #[test]
    fn test_parse_busybox_output() {
        let out = "/dev/vdb: UUID=\"1234-abcd\" TYPE=\"xfs\"\n";
        assert_eq!(parse_export_output(out).as_deref(), Some("xfs"));
    }

    #[test]
    fn test_parse_partition_table_only() {
        let out = "DEVNAME=/dev/vdb\nPTTYPE=gpt\n";
        assert_eq!(parse_export_output(out), None);
    }

    #[test]
    fn test_parse_empty_output() {
        assert_eq!(parse_export_output(""), None);
        assert_eq!(parse_export_output("\n\n"), None);
    }

    #[test]
    fn test_parse_skips_malformed_tokens() {
        let out = "TYPE=a=b\nTYPE\nTYPE=\"vfat\"";
        assert_eq!(parse_export_output(out).as_deref(), Some("vfat"));
    }
}
