use std::time::Duration;
use time::OffsetDateTime;

/// Why an update is due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateReason {
    /// The caller asked for an update regardless of the last one.
    Forced,
    /// There is no record of a successful update.
    NeverUpdated,
    /// The last update is at least one interval old.
    Stale { elapsed: Duration },
}

/// The decision for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunDecision {
    /// The working copy is fresh enough, the next update is due in `remaining`.
    Skip { remaining: Duration },
    /// The working copy should be updated.
    Update(UpdateReason),
}

/// Decide whether an update is due.
///
/// A last update in the future (clock skew or a tampered record) counts as
/// zero elapsed time, so it is skipped unless the interval is zero.
pub fn decide(
    last_update: Option<OffsetDateTime>,
    now: OffsetDateTime,
    interval: Duration,
    force: bool,
) -> RunDecision {
    if force {
        return RunDecision::Update(UpdateReason::Forced);
    }

    let Some(last_update) = last_update else {
        return RunDecision::Update(UpdateReason::NeverUpdated);
    };

    let elapsed = Duration::try_from(now - last_update).unwrap_or(Duration::ZERO);
    if elapsed >= interval {
        RunDecision::Update(UpdateReason::Stale { elapsed })
    } else {
        RunDecision::Skip {
            remaining: interval - elapsed,
        }
    }
}
