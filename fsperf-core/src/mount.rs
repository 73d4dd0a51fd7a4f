//! Formatting and mounting of the filesystem under test.

use crate::command::CommandRunner;
use crate::error::PerfResult;
use crate::settings::{MAIN_SECTION, Settings};

/// Something that can unmount and remount the filesystem under test.
pub trait Remount {
    /// Unmounts and mounts the filesystem again, dropping cached state.
    fn cycle_mount(&mut self) -> PerfResult<()>;
}

/// Manages the filesystem of one configuration section.
///
/// Reads `device`, `mkfs` and `mount_opts` from the section. Without a `device`, all operations
/// are no-ops and tests run against whatever is mounted at the directory.
#[derive(Debug)]
pub struct MountManager<'a> {
    runner: &'a dyn CommandRunner,
    device: Option<String>,
    directory: String,
    mkfs: String,
    mount_opts: Option<String>,
    mounted: bool,
}

impl<'a> MountManager<'a> {
    /// Creates a manager from the settings of `section`.
    pub fn new(
        settings: &dyn Settings,
        section: &str,
        runner: &'a dyn CommandRunner,
    ) -> PerfResult<Self> {
        let lookup = |key: &str| {
            settings
                .get(section, key)
                .or_else(|| settings.get(MAIN_SECTION, key))
                .map(str::to_owned)
        };

        Ok(Self {
            runner,
            device: lookup("device"),
            directory: settings.directory()?.to_owned(),
            mkfs: lookup("mkfs").unwrap_or_else(|| "mkfs.btrfs -f".to_owned()),
            mount_opts: lookup("mount_opts"),
            mounted: false,
        })
    }

    /// Whether this manager controls a device at all.
    pub fn is_managed(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Creates a fresh filesystem on the device.
    pub fn mkfs(&self) -> PerfResult<()> {
        let Some(device) = &self.device else {
            return Ok(());
        };
        self.runner.run(&format!("{} {device}", self.mkfs), None)
    }

    pub fn mount(&mut self) -> PerfResult<()> {
        let Some(device) = &self.device else {
            return Ok(());
        };

        let mut command = "mount".to_owned();
        if let Some(opts) = &self.mount_opts {
            command += &format!(" -o {opts}");
        }
        command += &format!(" {device} {}", self.directory);

        self.runner.run(&command, None)?;
        self.mounted = true;
        Ok(())
    }

    pub fn umount(&mut self) -> PerfResult<()> {
        if !self.mounted {
            return Ok(());
        }
        self.runner.run(&format!("umount {}", self.directory), None)?;
        self.mounted = false;
        Ok(())
    }
}

impl Remount for MountManager<'_> {
    fn cycle_mount(&mut self) -> PerfResult<()> {
        if !self.mounted {
            tracing::debug!("nothing mounted, skipping remount");
            return Ok(());
        }
        self.umount()?;
        self.mount()
    }
}

impl Drop for MountManager<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.umount() {
            tracing::error!(error = &error as &dyn std::error::Error, "failed to unmount");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::command::fake::RecordingRunner;

    use super::*;

    fn settings(btrfs: &[(&str, &str)]) -> BTreeMap<String, BTreeMap<String, String>> {
        let section = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        BTreeMap::from([
            ("main".to_owned(), section(&[("directory", "/mnt/test")])),
            ("btrfs".to_owned(), section(btrfs)),
        ])
    }

    #[test]
    fn full_cycle() {
        let settings = settings(&[("device", "/dev/nvme0n1"), ("mount_opts", "noatime")]);
        let runner = RecordingRunner::default();

        let mut mount = MountManager::new(&settings, "btrfs", &runner).unwrap();
        mount.mkfs().unwrap();
        mount.mount().unwrap();
        mount.cycle_mount().unwrap();
        drop(mount);

        assert_eq!(
            runner.commands(),
            [
                "mkfs.btrfs -f /dev/nvme0n1",
                "mount -o noatime /dev/nvme0n1 /mnt/test",
                "umount /mnt/test",
                "mount -o noatime /dev/nvme0n1 /mnt/test",
                "umount /mnt/test",
            ]
        );
    }

    #[test]
    fn remount_requires_mount() {
        let settings = settings(&[("device", "/dev/nvme0n1")]);
        let runner = RecordingRunner::default();

        let mut mount = MountManager::new(&settings, "btrfs", &runner).unwrap();
        mount.cycle_mount().unwrap();
        assert!(!mount.is_mounted());
        drop(mount);

        assert!(runner.commands().is_empty());
    }

    #[test]
    fn unmanaged_is_noop() {
        let settings = settings(&[]);
        let runner = RecordingRunner::default();

        let mut mount = MountManager::new(&settings, "btrfs", &runner).unwrap();
        assert!(!mount.is_managed());
        mount.mkfs().unwrap();
        mount.mount().unwrap();
        mount.cycle_mount().unwrap();
        drop(mount);

        assert!(runner.commands().is_empty());
    }
}
