//! Platform-specific change sources
//!
//! Windows reads the native change records directly. Everywhere else the
//! `notify` crate is used and its events are re-encoded into the same record
//! layout, so one decoder serves every platform.

use crate::config::WatchConfig;
use crate::source::OpenError;

#[cfg(windows)]
pub mod windows;

#[cfg(windows)]
pub use self::windows::DirectoryHandle as PlatformSource;

#[cfg(not(windows))]
pub mod portable;

#[cfg(not(windows))]
pub use self::portable::NotifySource as PlatformSource;

/// Open the platform change source for `config.root`
pub fn open(config: &WatchConfig) -> Result<PlatformSource, OpenError> {
    PlatformSource::open(config)
}
