/// Seconds left of `total_duration_secs` at `now_ms` for a countdown that
/// started at `launched_at_ms`.
///
/// Elapsed time is floored to whole seconds. The result is clamped to
/// `[0, total_duration_secs]` and never increases as `now_ms` grows.
pub fn remaining(now_ms: i64, launched_at_ms: i64, total_duration_secs: u64) -> u64 {
    let elapsed_ms = now_ms.saturating_sub(launched_at_ms).max(0);
    let elapsed_secs = (elapsed_ms / 1000) as u64;
    total_duration_secs.saturating_sub(elapsed_secs)
}

/// Like [`remaining`] but tolerates a session that was never launched.
pub fn remaining_or_full(now_ms: i64, launched_at_ms: Option<i64>, total_duration_secs: u64) -> u64 {
    match launched_at_ms {
        Some(launched_at) => remaining(now_ms, launched_at, total_duration_secs),
        None => total_duration_secs,
    }
}
