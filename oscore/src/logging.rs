//! Logger install, standing in for `keos::teletype`'s serial-port `kprint!`
//! macros.
//!
//! Outside a booted kernel there is no serial console to write to, so this
//! workspace logs through the `log` facade instead (the crate the broader
//! retrieved corpus reaches for in the same position, e.g.
//! `RunningShrimp-os`, `yelili422-yeli-os`). `init` installs a no-op logger
//! by default; binaries/tests that want output install their own
//! `log::Log` implementation (or `env_logger` under `#[cfg(test)]`) before
//! calling into `filesys`/`vm`.

use spin::Once;

struct NullLogger;

impl log::Log for NullLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        false
    }
    fn log(&self, _record: &log::Record) {}
    fn flush(&self) {}
}

static NULL_LOGGER: NullLogger = NullLogger;
static INIT: Once<()> = Once::new();

/// Installs a logger if one has not already been installed by the host
/// application. Safe to call more than once; only the first call has any
/// effect.
pub fn init() {
    INIT.call_once(|| {
        let _ = log::set_logger(&NULL_LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
    });
}
