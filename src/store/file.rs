use super::{StoreError, TimestampStore, UpdateRecord};
use log::{debug, trace, warn};
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const RECORDS_DIRECTORY: &str = "records";
const LOCKS_DIRECTORY: &str = "locks";

static TEMPORARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A store keeping one small record file per working copy.
///
/// Records live in `<state_dir>/records/<key>.record`, where the key is a hash of
/// the normalized path. Each record contains the path on the first line, so
/// a hash collision is detected, and an RFC 3339 timestamp on the second.
/// Writes go to a temporary file first, which is renamed over the record.
pub struct FileStore {
    state_dir: PathBuf,
}

impl FileStore {
    /// Creates a store in the given state directory. Nothing is touched until the first save.
    pub fn new(state_dir: PathBuf) -> Self {
        FileStore { state_dir }
    }

    /// The file holding the record of the working copy.
    pub fn record_path(&self, path: &Path) -> PathBuf {
        self.state_dir
            .join(RECORDS_DIRECTORY)
            .join(format!("{}.record", record_key(path)))
    }

    /// The file used to lock runs on the working copy.
    pub fn lock_path(&self, path: &Path) -> PathBuf {
        self.state_dir
            .join(LOCKS_DIRECTORY)
            .join(format!("{}.lock", record_key(path)))
    }

    fn read_record(&self, path: &Path) -> Result<Option<UpdateRecord>, StoreError> {
        let record_path = self.record_path(path);
        let contents = match fs::read_to_string(&record_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Read(record_path, err)),
        };

        let record =
            parse_record(&contents).map_err(|reason| StoreError::Corrupt(record_path.clone(), reason))?;

        let path = normalize(path);
        if record.path.to_string_lossy() != path.to_string_lossy() {
            debug!(
                "Record {} belongs to {}, not {}.",
                record_path.to_string_lossy(),
                record.path.to_string_lossy(),
                path.to_string_lossy()
            );
            return Ok(None);
        }

        Ok(Some(record))
    }

    fn write_record(&self, record: &UpdateRecord) -> Result<(), StoreError> {
        let records_directory = self.state_dir.join(RECORDS_DIRECTORY);
        fs::create_dir_all(&records_directory)
            .map_err(|err| StoreError::Write(records_directory, err))?;

        let record_path = self.record_path(&record.path);
        let contents = format_record(record)
            .map_err(|err| StoreError::Write(record_path.clone(), err))?;
        replace_atomically(&record_path, &contents)
            .map_err(|err| StoreError::Write(record_path.clone(), err))?;

        trace!("Written record {}.", record_path.to_string_lossy());

        Ok(())
    }
}

impl TimestampStore for FileStore {
    fn load(&self, path: &Path) -> Option<OffsetDateTime> {
        match self.read_record(path) {
            Ok(record) => record.map(|record| record.last_update),
            Err(err) => {
                warn!("Ignoring the last update time: {err}.");
                None
            }
        }
    }

    fn save(&self, path: &Path, timestamp: OffsetDateTime) -> Result<(), StoreError> {
        self.write_record(&UpdateRecord {
            path: normalize(path),
            last_update: timestamp,
        })
    }
}

/// Strip trailing slashes and `.` components, so equal paths get equal keys.
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

fn record_key(path: &Path) -> String {
    blake3::hash(normalize(path).as_os_str().as_encoded_bytes())
        .to_hex()
        .to_string()
}

fn format_record(record: &UpdateRecord) -> io::Result<String> {
    let timestamp = record
        .last_update
        .format(&Rfc3339)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    Ok(format!("{}\n{timestamp}\n", record.path.to_string_lossy()))
}

fn parse_record(contents: &str) -> Result<UpdateRecord, String> {
    // Paths may contain newlines, the timestamp is always the last line.
    let (path, timestamp) = contents
        .trim_end_matches('\n')
        .rsplit_once('\n')
        .ok_or_else(|| String::from("expected a path and a timestamp"))?;

    if path.is_empty() {
        return Err(String::from("the path is empty"));
    }
    let last_update = OffsetDateTime::parse(timestamp.trim(), &Rfc3339)
        .map_err(|err| format!("invalid timestamp {timestamp:?} ({err})"))?;

    Ok(UpdateRecord {
        path: PathBuf::from(path),
        last_update,
    })
}

fn replace_atomically(target: &Path, contents: &str) -> io::Result<()> {
    loop {
        // A unique name per process and write, a leftover from a crash is skipped.
        let counter = TEMPORARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temporary = target.with_extension(format!("record.tmp.{}.{counter}", process::id()));

        let mut file = match File::options()
            .write(true)
            .create_new(true)
            .open(&temporary)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        };

        let result = file
            .write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .and_then(|()| fs::rename(&temporary, target));
        if result.is_err() {
            let _ = fs::remove_file(&temporary);
        }

        return result;
    }
}
