use fs2::FileExt;
use log::trace;
use std::{
    fs::{self, File},
    io,
    path::Path,
    thread::sleep,
    time::{Duration, Instant},
};

const FIRST_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// An exclusive advisory lock on one working copy, held until dropped.
///
/// Other processes running on the same working copy wait for it, so they
/// see the freshly written record instead of starting a second update.
#[derive(Debug)]
pub struct PathLock {
    file: File,
}

impl PathLock {
    fn open(lock_path: &Path) -> io::Result<File> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
    }

    /// Wait for the lock until the timeout, polling with an increasing backoff.
    /// Fails with `ErrorKind::TimedOut` if someone else holds it for too long,
    /// with a zero timeout it is only tried once.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> io::Result<Self> {
        let file = PathLock::open(lock_path)?;
        let start = Instant::now();
        let mut backoff = FIRST_BACKOFF;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    trace!("Acquired lock {}.", lock_path.to_string_lossy());
                    return Ok(PathLock { file });
                }
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if start.elapsed() >= timeout {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("another run held the lock for more than {timeout:?}"),
                        ));
                    }
                    trace!("Waiting for lock {}.", lock_path.to_string_lossy());
                    sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
