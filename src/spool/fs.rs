//! Filesystem spool: one file per item in a spool directory

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::smtp::Message;
use crate::spool::{ItemId, RetryState, SpoolError, SpoolStore, SpooledItem, format};

const ITEM_SUFFIX: &str = ".msg";
const STATE_SUFFIX: &str = ".state";
const QUARANTINE_DIR: &str = "failed";

/// A spool kept as plain files in one directory.
///
/// Item `ID` is stored as `ID.msg`; its delivery history, once it has one,
/// as `ID.state`. Quarantined items move to the `failed` subdirectory.
/// Items are staged in hidden temporary files and renamed into place, and
/// both the rename and the directory scan happen under the same lock.
#[derive(Debug)]
pub struct FsSpool {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FsSpool {
    /// Open the spool at `dir`, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SpoolError> {
        let dir = dir.as_ref().to_owned();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "using spool directory");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.dir.join(QUARANTINE_DIR)
    }

    fn item_path(&self, id: &ItemId) -> PathBuf {
        self.dir.join(format!("{id}{ITEM_SUFFIX}"))
    }

    fn state_path(&self, id: &ItemId) -> PathBuf {
        self.dir.join(format!("{id}{STATE_SUFFIX}"))
    }

    fn read_state(&self, id: &ItemId) -> Result<RetryState, SpoolError> {
        match fs::read_to_string(self.state_path(id)) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RetryState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_state(&self, id: &ItemId, state: &RetryState) -> Result<(), SpoolError> {
        let text = toml::to_string(state)?;
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(text.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(self.state_path(id))
            .map_err(|e| SpoolError::Io(e.error))?;
        Ok(())
    }

    fn persist_item(&self, mut staged: NamedTempFile, at: &DateTime<Local>) -> Result<ItemId, SpoolError> {
        let mut n = 0;
        loop {
            let id = ItemId::at(at, n);
            match staged.persist_noclobber(self.item_path(&id)) {
                Ok(_) => return Ok(id),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    staged = e.file;
                    n += 1;
                }
                Err(e) => return Err(e.error.into()),
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn is_item_name(name: &str) -> bool {
    !name.starts_with('.') && name.len() > ITEM_SUFFIX.len() && name.ends_with(ITEM_SUFFIX)
}

impl SpoolStore for FsSpool {
    fn enqueue(&self, message: &Message) -> Result<ItemId, SpoolError> {
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(format::encode(message).as_bytes())?;
        staged.as_file().sync_all()?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self.persist_item(staged, &Local::now())?;
        // A history left behind by an earlier item of the same name does not apply
        remove_if_exists(&self.state_path(&id))?;
        debug!(%id, "wrote spool item");
        Ok(id)
    }

    fn list_pending(&self) -> Result<Vec<SpooledItem>, SpoolError> {
        let mut ids = Vec::new();
        {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if is_item_name(name) {
                    ids.push(ItemId::from(&name[..name.len() - ITEM_SUFFIX.len()]));
                }
            }
        }
        ids.sort();

        Ok(ids
            .into_iter()
            .map(|id| {
                let retry = self.read_state(&id).unwrap_or_else(|e| {
                    warn!(%id, "ignoring retry state: {e}");
                    RetryState::default()
                });
                SpooledItem { id, retry }
            })
            .collect())
    }

    fn load(&self, id: &ItemId) -> Result<Message, SpoolError> {
        let content = match fs::read_to_string(self.item_path(id)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        format::decode(id, &content)
    }

    fn remove_by_id(&self, id: &ItemId) -> Result<(), SpoolError> {
        match fs::remove_file(self.item_path(id)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            other => other?,
        }
        remove_if_exists(&self.state_path(id))?;
        Ok(())
    }

    fn record_failure(&self, id: &ItemId, at: DateTime<Utc>) -> Result<RetryState, SpoolError> {
        let mut state = self.read_state(id)?;
        state.attempts += 1;
        state.last_attempt = Some(at);
        self.write_state(id, &state)?;
        Ok(state)
    }

    fn quarantine(&self, id: &ItemId) -> Result<(), SpoolError> {
        let target = self.quarantine_dir();
        fs::create_dir_all(&target)?;

        match fs::rename(self.item_path(id), target.join(format!("{id}{ITEM_SUFFIX}"))) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            other => other?,
        }
        match fs::rename(self.state_path(id), target.join(format!("{id}{STATE_SUFFIX}"))) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn message(n: usize) -> Message {
        Message {
            sender: format!("sender{n}@example.com"),
            recipients: vec![format!("rcpt{n}@example.com")],
            body: vec![format!("Subject: {n}"), String::new(), "body".to_string()],
        }
    }

    #[test]
    fn test_enqueue_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();

        let id = spool.enqueue(&message(1)).unwrap();
        assert!(dir.path().join(format!("{id}.msg")).is_file());

        let pending = spool.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].retry, RetryState::default());
        assert_eq!(spool.load(&id).unwrap(), message(1));
    }

    #[test]
    fn test_same_second_items_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();

        let ids: Vec<_> = (0..5).map(|n| spool.enqueue(&message(n)).unwrap()).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);

        for (n, id) in ids.iter().enumerate() {
            assert_eq!(spool.load(id).unwrap(), message(n));
        }
    }

    #[test]
    fn test_listing_skips_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();
        let id = spool.enqueue(&message(1)).unwrap();

        fs::write(dir.path().join(".hidden.msg"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join(".msg"), "x").unwrap();
        fs::create_dir(dir.path().join("sub.msg")).unwrap();

        let pending = spool.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[test]
    fn test_listing_is_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();
        let body = format::encode(&message(1));
        for name in [
            "20240102T030405-10",
            "20240102T030406",
            "20240102T030405-2",
            "20240102T030405",
        ] {
            fs::write(dir.path().join(format!("{name}.msg")), &body).unwrap();
        }

        let listed: Vec<_> = spool
            .list_pending()
            .unwrap()
            .into_iter()
            .map(|item| item.id.to_string())
            .collect();
        assert_eq!(
            listed,
            [
                "20240102T030405",
                "20240102T030405-2",
                "20240102T030405-10",
                "20240102T030406"
            ]
        );
    }

    #[test]
    fn test_remove_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();
        let id = spool.enqueue(&message(1)).unwrap();
        spool.record_failure(&id, Utc::now()).unwrap();

        spool.remove_by_id(&id).unwrap();
        assert!(spool.list_pending().unwrap().is_empty());
        assert!(!dir.path().join(format!("{id}.state")).exists());
        assert!(matches!(spool.remove_by_id(&id), Err(SpoolError::NotFound(_))));
        assert!(matches!(spool.load(&id), Err(SpoolError::NotFound(_))));
    }

    #[test]
    fn test_record_failure_persists() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();
        let id = spool.enqueue(&message(1)).unwrap();

        let at = Utc::now();
        spool.record_failure(&id, at).unwrap();
        let state = spool.record_failure(&id, at).unwrap();
        assert_eq!(state.attempts, 2);

        let reopened = FsSpool::open(dir.path()).unwrap();
        let pending = reopened.list_pending().unwrap();
        assert_eq!(pending[0].retry.attempts, 2);
        assert_eq!(pending[0].retry.last_attempt, Some(at));
    }

    #[test]
    fn test_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();
        let id = spool.enqueue(&message(1)).unwrap();
        spool.record_failure(&id, Utc::now()).unwrap();

        spool.quarantine(&id).unwrap();
        assert!(spool.list_pending().unwrap().is_empty());
        assert!(spool.quarantine_dir().join(format!("{id}.msg")).is_file());
        assert!(spool.quarantine_dir().join(format!("{id}.state")).is_file());
    }

    #[test]
    fn test_load_malformed_item() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FsSpool::open(dir.path()).unwrap();
        fs::write(dir.path().join("20240101T000000.msg"), "only a sender\n").unwrap();

        let pending = spool.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(matches!(
            spool.load(&pending[0].id),
            Err(SpoolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_concurrent_enqueue_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Arc::new(FsSpool::open(dir.path()).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let spool = Arc::clone(&spool);
                thread::spawn(move || {
                    for n in 0..10 {
                        spool.enqueue(&message(w * 100 + n)).unwrap();
                    }
                })
            })
            .collect();

        // Every item a scan reports must already be complete
        let scanner = {
            let spool = Arc::clone(&spool);
            thread::spawn(move || {
                for _ in 0..50 {
                    for item in spool.list_pending().unwrap() {
                        let loaded = spool.load(&item.id).unwrap();
                        assert_eq!(loaded.body.len(), 3);
                        assert_eq!(loaded.recipients.len(), 1);
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        scanner.join().unwrap();
        assert_eq!(spool.list_pending().unwrap().len(), 40);
    }
}
