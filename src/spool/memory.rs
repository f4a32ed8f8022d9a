//! In-process spool, for embedding and tests

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, Utc};

use crate::smtp::Message;
use crate::spool::{ItemId, RetryState, SpoolError, SpoolStore, SpooledItem};

#[derive(Debug, Default)]
struct Inner {
    pending: BTreeMap<ItemId, (Message, RetryState)>,
    quarantined: BTreeMap<ItemId, Message>,
}

/// A spool that keeps everything in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySpool {
    inner: Mutex<Inner>,
}

impl MemorySpool {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the pending messages, oldest first
    pub fn messages(&self) -> Vec<Message> {
        self.inner()
            .pending
            .values()
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn quarantined(&self) -> Vec<ItemId> {
        self.inner().quarantined.keys().cloned().collect()
    }
}

impl SpoolStore for MemorySpool {
    fn enqueue(&self, message: &Message) -> Result<ItemId, SpoolError> {
        let now = Local::now();
        let mut inner = self.inner();
        let mut n = 0;
        let id = loop {
            let id = ItemId::at(&now, n);
            if !inner.pending.contains_key(&id) && !inner.quarantined.contains_key(&id) {
                break id;
            }
            n += 1;
        };
        inner
            .pending
            .insert(id.clone(), (message.clone(), RetryState::default()));
        Ok(id)
    }

    fn list_pending(&self) -> Result<Vec<SpooledItem>, SpoolError> {
        Ok(self
            .inner()
            .pending
            .iter()
            .map(|(id, (_, retry))| SpooledItem {
                id: id.clone(),
                retry: retry.clone(),
            })
            .collect())
    }

    fn load(&self, id: &ItemId) -> Result<Message, SpoolError> {
        self.inner()
            .pending
            .get(id)
            .map(|(message, _)| message.clone())
            .ok_or_else(|| SpoolError::NotFound(id.clone()))
    }

    fn remove_by_id(&self, id: &ItemId) -> Result<(), SpoolError> {
        self.inner()
            .pending
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SpoolError::NotFound(id.clone()))
    }

    fn record_failure(&self, id: &ItemId, at: DateTime<Utc>) -> Result<RetryState, SpoolError> {
        let mut inner = self.inner();
        let (_, retry) = inner
            .pending
            .get_mut(id)
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;
        retry.attempts += 1;
        retry.last_attempt = Some(at);
        Ok(retry.clone())
    }

    fn quarantine(&self, id: &ItemId) -> Result<(), SpoolError> {
        let mut inner = self.inner();
        let (message, _) = inner
            .pending
            .remove(id)
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;
        inner.quarantined.insert(id.clone(), message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str) -> Message {
        Message {
            sender: sender.to_string(),
            recipients: vec!["r@example.com".to_string()],
            body: vec!["hello".to_string()],
        }
    }

    #[test]
    fn test_queue_operations() {
        let spool = MemorySpool::new();
        let first = spool.enqueue(&message("a@example.com")).unwrap();
        let second = spool.enqueue(&message("b@example.com")).unwrap();
        assert_ne!(first, second);
        assert_eq!(spool.len(), 2);

        let ids: Vec<_> = spool
            .list_pending()
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first) && ids.contains(&second));

        assert_eq!(spool.load(&second).unwrap().sender, "b@example.com");
        spool.remove_by_id(&first).unwrap();
        assert!(matches!(spool.load(&first), Err(SpoolError::NotFound(_))));
        assert_eq!(spool.messages(), vec![message("b@example.com")]);
    }

    #[test]
    fn test_failures_and_quarantine() {
        let spool = MemorySpool::new();
        let id = spool.enqueue(&message("a@example.com")).unwrap();

        let state = spool.record_failure(&id, Utc::now()).unwrap();
        assert_eq!(state.attempts, 1);
        assert_eq!(spool.list_pending().unwrap()[0].retry.attempts, 1);

        spool.quarantine(&id).unwrap();
        assert!(spool.is_empty());
        assert_eq!(spool.quarantined(), vec![id.clone()]);
        assert!(spool.record_failure(&id, Utc::now()).is_err());
    }
}
