use crate::platform::Platform;

/// Outcome summary of a sync run.
///
/// Everything in here was already logged while it happened; the report
/// exists so callers can inspect the run as a whole.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Archives resolved for the mirror, ignored catalog archives excluded.
    pub downloaded: usize,

    /// Wanted platforms some extension does not publish for.
    pub missing_platforms: Vec<MissingPlatform>,

    /// Initially requested identifiers that resolved to nothing.
    pub not_found: Vec<String>,
}

#[derive(Debug)]
pub struct MissingPlatform {
    pub name: String,
    pub platform: Platform,
}
