//! Host seams: everything a state touches outside the process.
//!
//! Each seam is a trait with one `System*` implementation that talks to the real
//! host. States only ever see the traits, through [`crate::EncryptionContext`], so
//! the in-memory doubles of the `testing` feature can stand in for the whole machine.

mod distro;
mod executor;
mod fs;
mod logger;
pub mod systemd;

pub use distro::{parse_os_release, DistroInfo, DistroPatcher, OsReleasePatcher, OS_RELEASE_PATH};
pub use executor::{CommandExecutor, CommandOutput, HostCommand, SystemCommandExecutor};
pub use fs::{HostFs, SystemFs};
pub use logger::{LogLogger, Logger};
