//! Unit and mountpoint enumeration.
//!
//! Queries run one command and filter its output here rather than in a shell
//! pipeline, so callers can act on (and fail on) each item separately.

use crate::host::{CommandExecutor, HostCommand, Logger};

pub fn daemon_reload() -> HostCommand {
    HostCommand::new("systemctl").arg("daemon-reload")
}

pub fn list_unit_files() -> HostCommand {
    HostCommand::new("systemctl").arg("list-unit-files")
}

pub fn stop(unit: &str) -> HostCommand {
    HostCommand::new("systemctl").arg("stop").arg(unit)
}

pub fn is_active(unit: &str) -> HostCommand {
    HostCommand::new("systemctl").arg("is-active").arg(unit)
}

pub fn list_mountpoints() -> HostCommand {
    HostCommand::new("lsblk").args(["-r", "-o", "MOUNTPOINT"])
}

pub fn umount(mountpoint: &str) -> HostCommand {
    HostCommand::new("umount").arg(mountpoint)
}

/// First column of every `list-unit-files` line that contains `filter`.
pub fn matching_units(listing: &str, filter: &str) -> Vec<String> {
    listing
        .lines()
        .filter(|line| line.contains(filter))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Mountpoints from `lsblk -r -o MOUNTPOINT` output that contain `filter`.
pub fn matching_mountpoints(listing: &str, filter: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains(filter))
        .map(str::to_string)
        .collect()
}

/// Installed units whose listing line contains `filter`.
///
/// A listing that cannot be produced is logged and reads as no units.
pub fn query_units(
    executor: &dyn CommandExecutor,
    logger: &dyn Logger,
    filter: &str,
) -> Vec<String> {
    query(executor, logger, &list_unit_files())
        .map(|listing| matching_units(&listing, filter))
        .unwrap_or_default()
}

/// Raw mountpoint listing, or `None` when `lsblk` failed.
pub fn query_mountpoints(executor: &dyn CommandExecutor, logger: &dyn Logger) -> Option<String> {
    query(executor, logger, &list_mountpoints())
}

fn query(
    executor: &dyn CommandExecutor,
    logger: &dyn Logger,
    command: &HostCommand,
) -> Option<String> {
    match executor.execute(command, false) {
        Ok(output) if output.success() => Some(output.stdout),
        Ok(output) => {
            logger.log(&format!(
                "`{command}` exited with status {}: {}",
                output.status,
                output.diagnostic()
            ));
            None
        }
        Err(err) => {
            logger.log(&format!("`{command}` could not run: {err}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CommandOutput;
    use crate::testing::{FakeExecutor, Journal, MemoryLogger};

    const UNIT_FILES: &str = "\
UNIT FILE                                  STATE           VENDOR PRESET
snap-core18-2128.mount                     enabled         enabled
snap-lxd-21029.mount                       enabled         enabled
snapd.apparmor.service                     enabled         enabled
snapd.service                              enabled         enabled
ssh.service                                enabled         enabled
walinuxagent.service                       enabled         enabled

6 unit files listed.
";

    const MOUNTPOINTS: &str = "\
MOUNTPOINT
/snap/core18/2128
/snap/lxd/21029
/snap/snapd/12704

/boot/efi
/
";

    #[test]
    fn units_are_filtered_by_substring() {
        assert_eq!(
            matching_units(UNIT_FILES, "snap"),
            vec![
                "snap-core18-2128.mount",
                "snap-lxd-21029.mount",
                "snapd.apparmor.service",
                "snapd.service",
            ]
        );
    }

    #[test]
    fn no_matching_units_yields_empty_list() {
        assert!(matching_units(UNIT_FILES, "docker").is_empty());
    }

    #[test]
    fn mountpoints_are_filtered_by_substring() {
        assert_eq!(
            matching_mountpoints(MOUNTPOINTS, "/snap/lxd"),
            vec!["/snap/lxd/21029"]
        );
        assert_eq!(
            matching_mountpoints(MOUNTPOINTS, "/snap/core18"),
            vec!["/snap/core18/2128"]
        );
        assert!(matching_mountpoints(MOUNTPOINTS, "/snap/gnome").is_empty());
    }

    #[test]
    fn failed_listing_reads_as_no_units() {
        let journal = Journal::default();
        let executor = FakeExecutor::new(journal);
        executor.respond(
            "systemctl list-unit-files",
            CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: "System has not been booted with systemd".into(),
            },
        );
        let logger = MemoryLogger::default();

        assert!(query_units(&executor, &logger, "snap").is_empty());
        assert!(logger.contains("System has not been booted with systemd"));
    }

    #[test]
    fn successful_listing_is_filtered() {
        let journal = Journal::default();
        let executor = FakeExecutor::new(journal);
        executor.respond(
            "systemctl list-unit-files",
            CommandOutput {
                status: 0,
                stdout: UNIT_FILES.into(),
                stderr: String::new(),
            },
        );

        let units = query_units(&executor, &MemoryLogger::default(), "snapd");
        assert_eq!(units, vec!["snapd.apparmor.service", "snapd.service"]);
    }
}
