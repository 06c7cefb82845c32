use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::TransactionKey;
use super::server::PendingResponse;
use crate::error::{Error, Result};
use crate::transport::incoming::IncomingMessage;

pub(crate) type TransactionEntry = mpsc::Sender<IncomingMessage>;

/// Table of the live outbound transactions, of the ones that finished
/// recently and of the responses recently given to inbound requests.
pub struct TransactionManager {
    transactions: Mutex<HashMap<TransactionKey, TransactionEntry>>,
    responses: Mutex<ExpiringCache<Arc<PendingResponse>>>,
    finished: Mutex<ExpiringCache<()>>,
}

impl TransactionManager {
    /// Creates an empty table. Responses and finished keys are kept for
    /// `response_lifetime`, at most `response_capacity` of each.
    pub fn new(response_lifetime: Duration, response_capacity: usize) -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            responses: Mutex::new(ExpiringCache::new(response_lifetime, response_capacity)),
            finished: Mutex::new(ExpiringCache::new(response_lifetime, response_capacity)),
        }
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<TransactionKey, TransactionEntry>>> {
        self.transactions.lock().map_err(|_| Error::PoisonedLock)
    }

    fn cache(&self) -> Result<MutexGuard<'_, ExpiringCache<Arc<PendingResponse>>>> {
        self.responses.lock().map_err(|_| Error::PoisonedLock)
    }

    fn finished(&self) -> Result<MutexGuard<'_, ExpiringCache<()>>> {
        self.finished.lock().map_err(|_| Error::PoisonedLock)
    }

    /// Registers `entry` under every key at once.
    #[inline]
    pub(crate) fn register(&self, keys: &[TransactionKey], entry: TransactionEntry) -> Result<()> {
        let mut map = self.table()?;

        for key in keys {
            map.insert(*key, entry.clone());
        }

        Ok(())
    }

    /// Removes every key at once, so a transaction is never reachable
    /// through one key only.
    #[inline]
    pub(crate) fn remove(&self, keys: &[TransactionKey]) -> Result<()> {
        let mut map = self.table()?;

        for key in keys {
            map.remove(key);
        }

        Ok(())
    }

    /// Removes a finished transaction and remembers `keys` for the
    /// exchange lifetime, so late duplicates can still be told apart from
    /// unknown traffic.
    pub(crate) fn finish(&self, keys: &[TransactionKey]) -> Result<()> {
        self.remove(keys)?;

        let mut finished = self.finished()?;
        let now = Instant::now();
        for key in keys {
            finished.insert(*key, (), now);
        }

        Ok(())
    }

    /// Returns `true` if any of `keys` belongs to a transaction that
    /// finished within the exchange lifetime.
    pub(crate) fn recently_finished(&self, keys: &[TransactionKey]) -> Result<bool> {
        let mut finished = self.finished()?;
        let now = Instant::now();

        Ok(keys.iter().any(|key| finished.get(key, now).is_some()))
    }

    /// Returns the entry of the first key that is registered.
    #[inline]
    pub(crate) fn find(&self, keys: &[TransactionKey]) -> Result<Option<TransactionEntry>> {
        let map = self.table()?;

        Ok(keys.iter().find_map(|key| map.get(key)).cloned())
    }

    /// Number of registered keys; two per live transaction.
    pub fn len(&self) -> usize {
        self.table().map(|map| map.len()).unwrap_or_default()
    }

    /// Returns `true` when no transaction is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry, which fails the transactions that still wait.
    pub(crate) fn clear(&self) -> Result<usize> {
        let mut map = self.table()?;
        let count = map.len();

        map.clear();
        self.finished()?.clear();

        Ok(count)
    }

    pub(crate) fn cached_response(&self, key: &TransactionKey) -> Result<Option<Arc<PendingResponse>>> {
        let mut cache = self.cache()?;

        Ok(cache.get(key, Instant::now()))
    }

    pub(crate) fn cache_response(&self, key: TransactionKey, response: Arc<PendingResponse>) -> Result<()> {
        let mut cache = self.cache()?;

        cache.insert(key, response, Instant::now());

        Ok(())
    }

    /// Evicts the responses and finished keys older than their lifetime,
    /// returns how many responses were evicted.
    pub(crate) fn sweep_responses(&self) -> Result<usize> {
        let now = Instant::now();
        self.finished()?.sweep(now);

        let mut cache = self.cache()?;

        Ok(cache.sweep(now))
    }

    /// Number of responses kept for duplicate requests.
    pub fn cached_responses(&self) -> usize {
        self.cache().map(|cache| cache.entries.len()).unwrap_or_default()
    }
}

struct CachedEntry<V> {
    value: V,
    inserted: Instant,
}

/// Entries keyed by transaction identity, evicted by age and, past
/// `capacity`, oldest first.
struct ExpiringCache<V> {
    entries: HashMap<TransactionKey, CachedEntry<V>>,
    order: VecDeque<(TransactionKey, Instant)>,
    lifetime: Duration,
    capacity: usize,
}

impl<V: Clone> ExpiringCache<V> {
    fn new(lifetime: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            lifetime,
            capacity: capacity.max(1),
        }
    }

    fn get(&mut self, key: &TransactionKey, now: Instant) -> Option<V> {
        let cached = self.entries.get(key)?;

        if now.duration_since(cached.inserted) >= self.lifetime {
            self.entries.remove(key);
            return None;
        }

        Some(cached.value.clone())
    }

    fn insert(&mut self, key: TransactionKey, value: V, now: Instant) {
        self.sweep(now);

        while self.entries.len() >= self.capacity {
            if self.pop_oldest().is_none() {
                break;
            }
        }

        self.order.push_back((key, now));
        self.entries.insert(key, CachedEntry { value, inserted: now });
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let mut evicted = 0;

        while let Some((_, inserted)) = self.order.front() {
            if now.duration_since(*inserted) < self.lifetime {
                break;
            }
            if let Some(true) = self.pop_oldest() {
                evicted += 1;
            }
        }

        evicted
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Pops the head of the insertion order, evicting its entry unless the
    /// key was inserted again since. `None` once the order is empty.
    fn pop_oldest(&mut self) -> Option<bool> {
        let (key, inserted) = self.order.pop_front()?;

        match self.entries.get(&key) {
            Some(cached) if cached.inserted == inserted => {
                self.entries.remove(&key);
                Some(true)
            }
            _ => Some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::message::MessageType;

    fn peer() -> SocketAddr {
        "127.0.0.1:5683".parse().unwrap()
    }

    fn pending() -> Arc<PendingResponse> {
        Arc::new(PendingResponse::new(peer(), 1, MessageType::Confirmable, Default::default()))
    }

    #[test]
    fn test_register_and_remove_both_keys() {
        let manager = TransactionManager::new(Duration::from_secs(247), 16);
        let (sender, _receiver) = mpsc::channel(1);
        let id_key = TransactionKey::from_message_id(10, &peer());
        let token_key = TransactionKey::from_token(b"abcd", &peer());

        manager.register(&[id_key, token_key], sender).unwrap();

        assert_eq!(manager.len(), 2);
        assert!(manager.find(&[id_key]).unwrap().is_some());
        assert!(manager.find(&[token_key]).unwrap().is_some());

        manager.remove(&[id_key, token_key]).unwrap();

        assert!(manager.is_empty());
        assert!(manager.find(&[id_key, token_key]).unwrap().is_none());
    }

    #[test]
    fn test_find_falls_back_to_the_next_key() {
        let manager = TransactionManager::new(Duration::from_secs(247), 16);
        let (sender, _receiver) = mpsc::channel(1);
        let token_key = TransactionKey::from_token(b"abcd", &peer());
        let unknown = TransactionKey::from_message_id(99, &peer());

        manager.register(&[token_key], sender).unwrap();

        assert!(manager.find(&[unknown, token_key]).unwrap().is_some());
        assert!(manager.find(&[unknown]).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_keys_are_remembered_for_lifetime() {
        let manager = TransactionManager::new(Duration::from_secs(247), 16);
        let (sender, _receiver) = mpsc::channel(1);
        let id_key = TransactionKey::from_message_id(10, &peer());
        let token_key = TransactionKey::from_token(b"abcd", &peer());

        manager.register(&[id_key, token_key], sender).unwrap();
        manager.finish(&[id_key, token_key]).unwrap();

        assert!(manager.is_empty());
        assert!(manager.recently_finished(&[token_key]).unwrap());

        tokio::time::advance(Duration::from_secs(247)).await;
        assert!(!manager.recently_finished(&[token_key]).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_response_expires_after_lifetime() {
        let manager = TransactionManager::new(Duration::from_secs(247), 16);
        let key = TransactionKey::from_message_id(1, &peer());

        manager.cache_response(key, pending()).unwrap();
        tokio::time::advance(Duration::from_secs(246)).await;
        assert!(manager.cached_response(&key).unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(manager.cached_response(&key).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_expired_responses() {
        let manager = TransactionManager::new(Duration::from_secs(10), 16);

        manager.cache_response(TransactionKey::from_message_id(1, &peer()), pending()).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        manager.cache_response(TransactionKey::from_message_id(2, &peer()), pending()).unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(manager.sweep_responses().unwrap(), 1);
        assert_eq!(manager.cached_responses(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest_first() {
        let manager = TransactionManager::new(Duration::from_secs(247), 3);
        let keys: Vec<_> = (0..4).map(|id| TransactionKey::from_message_id(id, &peer())).collect();

        for key in &keys {
            manager.cache_response(*key, pending()).unwrap();
            tokio::time::advance(Duration::from_millis(1)).await;
        }

        assert_eq!(manager.cached_responses(), 3);
        assert!(manager.cached_response(&keys[0]).unwrap().is_none());
        assert!(manager.cached_response(&keys[3]).unwrap().is_some());
    }
}
