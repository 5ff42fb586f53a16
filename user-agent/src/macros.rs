/// Logs a line tagged with the emitting component.
///
/// The component becomes the record target, so the global `fern` format
/// prints it in the `[target]` slot next to timestamp, level, pid and tid.
/// Usage:
/// ```rust,ignore
/// hids_log!(Level::Info, "tracker", "new track {}", guid);
/// hids_log!(Level::Error, "actions", "memdump failed: {}", err);
/// ```
/// Logs like:
/// [2025-04-25T16:32:10+02:00][INFO ][tracker][pid=4568][tid=ThreadId(3)] new track {..}
#[macro_export]
macro_rules! hids_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        log::log!(
            target: concat!("hids::", $component),
            $level,
            $fmt
            $(, $($arg)+)?
        )
    };
}
