/*
 * Boot configuration
 *
 * Stands in for the Pintos kernel command line (`-mlfqs`, `-q`, ...) in an
 * environment with no argv: a single immutable record read once before
 * `thread_init` and never mutated afterward.
 */

use log::LevelFilter;

#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// If true, use the 4.4BSD MLFQS policy. If false (default), strict
    /// priority with donation. Mutually exclusive, fixed for the whole run.
    pub mlfqs: bool,
    pub log_level: LevelFilter,
}

impl BootConfig {
    pub const fn default() -> BootConfig {
        BootConfig {
            mlfqs: false,
            log_level: LevelFilter::Info,
        }
    }
}

static mut CONFIG: BootConfig = BootConfig::default();
static CONFIG_SET: spin::Once<()> = spin::Once::new();

/// Freezes the boot configuration. Must be called exactly once, before
/// `thread_init`.
pub fn set(config: BootConfig) {
    CONFIG_SET.call_once(|| {
        unsafe {
            CONFIG = config;
        }
    });
}

pub fn get() -> BootConfig {
    unsafe { CONFIG }
}
