use crate::{
    clock::Clock,
    interval::format_remaining,
    policy::{decide, RunDecision, UpdateReason},
    store::{lock::PathLock, TimestampStore},
    updater::{UpdateError, UpdateReport, Updater},
};
use log::{debug, error, info, warn};
use std::{path::Path, time::Duration};

/// Exit code of a run that is up to date or updated.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code of a run where the update failed.
pub const EXIT_UPDATE_FAILED: i32 = 1;
/// Exit code of an invalid invocation, nothing was touched.
pub const EXIT_USAGE: i32 = 2;

/// The options of a single run.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// How old the last update can be before updating again.
    pub interval: Duration,
    /// Update regardless of the last update.
    pub force: bool,
}

/// The result of a single run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The last update is recent enough, the next one is due in `remaining`.
    UpToDate { remaining: Duration },
    /// The update ran successfully.
    Updated(UpdateReport),
    /// The update ran, but failed. Nothing was recorded.
    UpdateFailed(UpdateError),
}

impl RunOutcome {
    /// The exit code of the process after this run.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::UpToDate { .. } | RunOutcome::Updated(_) => EXIT_SUCCESS,
            RunOutcome::UpdateFailed(_) => EXIT_UPDATE_FAILED,
        }
    }
}

/// Run once: load the last update time, decide, update if it is due and record it.
///
/// A successful update is recorded with the time it finished. If recording fails,
/// the run is still successful (the working copy is updated), but the next
/// run will update again, so it is logged as a warning.
pub fn start(
    target: &Path,
    options: &Options,
    store: &dyn TimestampStore,
    updater: &dyn Updater,
    clock: &dyn Clock,
) -> RunOutcome {
    let last_update = store.load(target);
    debug!("Last update of {}: {last_update:?}.", target.to_string_lossy());

    match decide(last_update, clock.now(), options.interval, options.force) {
        RunDecision::Skip { remaining } => {
            info!(
                "Already up to date. Next update is due in {}.",
                format_remaining(remaining)
            );
            RunOutcome::UpToDate { remaining }
        }
        RunDecision::Update(reason) => {
            match reason {
                UpdateReason::Forced => debug!("Forced to update."),
                UpdateReason::NeverUpdated => debug!("There is no previous update, updating."),
                UpdateReason::Stale { elapsed } => {
                    debug!("Last update was {} ago, updating.", format_remaining(elapsed))
                }
            }

            match updater.run(target) {
                Ok(report) => {
                    if let Err(err) = store.save(target, clock.now()) {
                        warn!("Could not record the update, the next run will update again: {err}.");
                    }
                    info!("Updated. {report}.");
                    RunOutcome::Updated(report)
                }
                Err(err) => {
                    error!("Update failed: {err}.");
                    RunOutcome::UpdateFailed(err)
                }
            }
        }
    }
}

/// Run once while holding the lock of the working copy.
///
/// A concurrent run on the same working copy holds the lock until it recorded
/// its update, so waiting for it means this run sees the fresh record and skips.
/// If the lock can't be taken in time, the run goes on without it.
pub fn start_locked(
    lock_path: &Path,
    lock_timeout: Duration,
    target: &Path,
    options: &Options,
    store: &dyn TimestampStore,
    updater: &dyn Updater,
    clock: &dyn Clock,
) -> RunOutcome {
    let _lock = match PathLock::acquire(lock_path, lock_timeout) {
        Ok(lock) => Some(lock),
        Err(err) => {
            warn!(
                "Cannot lock {}, running without a lock: {err}.",
                target.to_string_lossy()
            );
            None
        }
    };

    start(target, options, store, updater, clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::MockClock,
        store::{file::FileStore, MockTimestampStore, StoreError},
        updater::MockUpdater,
    };
    use log::Level;
    use rand::distributions::{Alphanumeric, DistString};
    use std::{
        error::Error,
        fs,
        path::PathBuf,
        sync::{Arc, Barrier},
        thread,
    };
    use time::{macros::datetime, OffsetDateTime};

    const HOUR: Duration = Duration::from_secs(60 * 60);
    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);
    const TARGET: &str = "/home/user/project";

    fn options(force: bool) -> Options {
        Options {
            interval: 8 * HOUR,
            force,
        }
    }

    fn fixed_clock(now: OffsetDateTime) -> MockClock {
        let mut clock = MockClock::new();
        clock.expect_now().return_const(now);
        clock
    }

    fn get_random_id() -> String {
        Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
    }

    fn create_store() -> Result<(String, FileStore), Box<dyn Error>> {
        let state_dir = format!("test_directories/{}", get_random_id());
        fs::create_dir_all(&state_dir)?;

        Ok((state_dir.clone(), FileStore::new(PathBuf::from(state_dir))))
    }

    #[test]
    fn it_should_update_and_record_a_new_path() {
        let mut store = MockTimestampStore::new();
        store.expect_load().times(1).returning(|_| None);
        store
            .expect_save()
            .withf(|path, timestamp| path.to_string_lossy() == TARGET && *timestamp == NOW)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut updater = MockUpdater::new();
        updater
            .expect_run()
            .times(1)
            .returning(|_| Ok(UpdateReport::AlreadyUpToDate));

        let outcome = start(
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert!(
            matches!(outcome, RunOutcome::Updated(UpdateReport::AlreadyUpToDate)),
            "{outcome:?} should be Updated"
        );
        assert_eq!(EXIT_SUCCESS, outcome.exit_code());
    }

    #[test]
    fn it_should_skip_a_recent_update() {
        let mut store = MockTimestampStore::new();
        store
            .expect_load()
            .times(1)
            .return_const(Some(NOW - time::Duration::hours(1)));
        store.expect_save().times(0);

        let mut updater = MockUpdater::new();
        updater.expect_run().times(0);

        let outcome = start(
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert!(
            matches!(outcome, RunOutcome::UpToDate { remaining } if remaining == 7 * HOUR),
            "{outcome:?} should be UpToDate with 7 hours remaining"
        );
        assert_eq!(EXIT_SUCCESS, outcome.exit_code());
    }

    #[test]
    fn it_should_log_the_remaining_time_when_skipping() {
        testing_logger::setup();

        let mut store = MockTimestampStore::new();
        store
            .expect_load()
            .return_const(Some(NOW - time::Duration::hours(1)));
        let updater = MockUpdater::new();

        start(
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );

        testing_logger::validate(|captured_logs| {
            assert!(captured_logs.iter().any(|log| log.level == Level::Info
                && log.body == "Already up to date. Next update is due in 7h 0m."));
        });
    }

    #[test]
    fn it_should_update_if_forced() {
        let mut store = MockTimestampStore::new();
        store
            .expect_load()
            .return_const(Some(NOW - time::Duration::minutes(1)));
        store.expect_save().times(1).returning(|_, _| Ok(()));

        let mut updater = MockUpdater::new();
        updater.expect_run().times(1).returning(|_| {
            Ok(UpdateReport::Changed {
                from: Some(String::from("0123456789")),
                to: String::from("89abcdef01"),
            })
        });

        let outcome = start(
            Path::new(TARGET),
            &options(true),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert!(
            matches!(outcome, RunOutcome::Updated(UpdateReport::Changed { .. })),
            "{outcome:?} should be Updated"
        );
    }

    #[test]
    fn it_should_not_record_a_failed_update() {
        let mut store = MockTimestampStore::new();
        store
            .expect_load()
            .return_const(Some(NOW - time::Duration::hours(9)));
        store.expect_save().times(0);

        let mut updater = MockUpdater::new();
        updater
            .expect_run()
            .times(1)
            .returning(|_| Err(UpdateError::ClientError(1, String::from("fatal: no network"))));

        let outcome = start(
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert!(
            matches!(outcome, RunOutcome::UpdateFailed(UpdateError::ClientError(1, _))),
            "{outcome:?} should be UpdateFailed"
        );
        assert_eq!(EXIT_UPDATE_FAILED, outcome.exit_code());
    }

    #[test]
    fn it_should_succeed_with_a_warning_if_recording_fails() {
        testing_logger::setup();

        let mut store = MockTimestampStore::new();
        store.expect_load().returning(|_| None);
        store.expect_save().times(1).returning(|path, _| {
            Err(StoreError::Write(
                path.to_path_buf(),
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ))
        });

        let mut updater = MockUpdater::new();
        updater
            .expect_run()
            .returning(|_| Ok(UpdateReport::AlreadyUpToDate));

        let outcome = start(
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert_eq!(EXIT_SUCCESS, outcome.exit_code());

        testing_logger::validate(|captured_logs| {
            assert!(captured_logs.iter().any(|log| log.level == Level::Warn
                && log.body.starts_with("Could not record the update")));
        });
    }

    #[test]
    fn it_should_record_the_time_the_update_finished() {
        let mut clock = MockClock::new();
        let mut times = vec![NOW + time::Duration::minutes(5), NOW];
        clock
            .expect_now()
            .times(2)
            .returning(move || times.pop().unwrap());

        let mut store = MockTimestampStore::new();
        store.expect_load().returning(|_| None);
        store
            .expect_save()
            .withf(|path, timestamp| {
                path.to_string_lossy() == TARGET && *timestamp == NOW + time::Duration::minutes(5)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut updater = MockUpdater::new();
        updater
            .expect_run()
            .returning(|_| Ok(UpdateReport::AlreadyUpToDate));

        start(Path::new(TARGET), &options(false), &store, &updater, &clock);
    }

    #[test]
    fn it_should_be_up_to_date_right_after_an_update() -> Result<(), Box<dyn Error>> {
        let (state_dir, store) = create_store()?;

        let mut updater = MockUpdater::new();
        updater
            .expect_run()
            .times(1)
            .returning(|_| Ok(UpdateReport::AlreadyUpToDate));
        let clock = fixed_clock(NOW);

        let first = start(Path::new(TARGET), &options(false), &store, &updater, &clock);
        assert!(matches!(first, RunOutcome::Updated(_)), "{first:?} should be Updated");
        assert_eq!(Some(NOW), store.load(Path::new(TARGET)));

        let second = start(Path::new(TARGET), &options(false), &store, &updater, &clock);
        assert!(
            matches!(second, RunOutcome::UpToDate { .. }),
            "{second:?} should be UpToDate"
        );

        fs::remove_dir_all(state_dir)?;

        Ok(())
    }

    #[test]
    fn it_should_keep_the_record_after_a_failed_update() -> Result<(), Box<dyn Error>> {
        let (state_dir, store) = create_store()?;
        let nine_hours_ago = NOW - time::Duration::hours(9);
        store.save(Path::new(TARGET), nine_hours_ago)?;

        let mut updater = MockUpdater::new();
        updater
            .expect_run()
            .times(1)
            .returning(|_| Err(UpdateError::ClientError(128, String::from("fatal: conflict"))));

        let outcome = start(
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert_eq!(EXIT_UPDATE_FAILED, outcome.exit_code());
        assert_eq!(Some(nine_hours_ago), store.load(Path::new(TARGET)));

        fs::remove_dir_all(state_dir)?;

        Ok(())
    }

    #[test]
    fn it_should_wait_for_a_concurrent_run_and_skip() -> Result<(), Box<dyn Error>> {
        let (state_dir, store) = create_store()?;
        let lock_path = store.lock_path(Path::new(TARGET));
        let barrier = Arc::new(Barrier::new(2));

        // Another run holds the lock while it updates, then records it
        let other_run = {
            let state_dir = state_dir.clone();
            let lock_path = lock_path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = FileStore::new(PathBuf::from(state_dir));
                let lock = PathLock::acquire(&lock_path, Duration::from_secs(1)).unwrap();
                barrier.wait();
                thread::sleep(Duration::from_millis(200));
                store.save(Path::new(TARGET), NOW).unwrap();
                drop(lock);
            })
        };

        let mut updater = MockUpdater::new();
        updater.expect_run().times(0);

        barrier.wait();
        let outcome = start_locked(
            &lock_path,
            Duration::from_secs(5),
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert!(
            matches!(outcome, RunOutcome::UpToDate { remaining } if remaining == 8 * HOUR),
            "{outcome:?} should be UpToDate"
        );

        other_run.join().unwrap();
        fs::remove_dir_all(state_dir)?;

        Ok(())
    }

    #[test]
    fn it_should_run_without_the_lock_if_it_is_not_released() -> Result<(), Box<dyn Error>> {
        testing_logger::setup();
        let (state_dir, store) = create_store()?;
        let lock_path = store.lock_path(Path::new(TARGET));
        let _other_run = PathLock::acquire(&lock_path, Duration::ZERO)?;

        let mut updater = MockUpdater::new();
        updater
            .expect_run()
            .times(1)
            .returning(|_| Ok(UpdateReport::AlreadyUpToDate));

        let outcome = start_locked(
            &lock_path,
            Duration::from_millis(50),
            Path::new(TARGET),
            &options(false),
            &store,
            &updater,
            &fixed_clock(NOW),
        );
        assert!(matches!(outcome, RunOutcome::Updated(_)), "{outcome:?} should be Updated");

        testing_logger::validate(|captured_logs| {
            assert!(captured_logs.iter().any(|log| log.level == Level::Warn
                && log.body.starts_with("Cannot lock /home/user/project")));
        });

        fs::remove_dir_all(state_dir)?;

        Ok(())
    }
}
