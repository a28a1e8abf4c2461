/// Logs a line tagged with a component name, which becomes the record target.
///
/// The `fern` dispatcher set up in `main.rs` prefixes every line with the
/// timestamp, level, target, pid and tid, so a call such as
/// ```ignore
/// tagsync_log!(Level::Warn, "reconcile", "Skipping contact {}: {}", id, err);
/// ```
/// renders as
/// `[2026-10-19T16:32:10+02:00][WARN ][reconcile][pid=4568][tid=ThreadId(3)] Skipping contact 7: ...`
#[macro_export]
macro_rules! tagsync_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        log::log!(target: $component, $level, $fmt $(, $($arg)+)?)
    };
}
