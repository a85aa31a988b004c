//! Replay protection for payment authorizations.
//!
//! Every authorization is identified by `(network, payer, nonce)`. Before the
//! gate contacts a facilitator it reserves that key; a successful settlement
//! confirms it, any other outcome releases it. A confirmed key is kept until
//! the authorization's `validBefore` passes, after which the authorization
//! could not be redeemed anyway and the record can be purged.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::networks::{InvalidAddress, Network};
use crate::proto::PaymentPayload;
use crate::timestamp::UnixTimestamp;

/// Identity of a payment authorization in the nonce store.
///
/// Payer and nonce are canonicalized per address family, so two encodings of
/// the same EVM authorization that differ only in hex case map to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonceKey {
    network: Network,
    payer: String,
    nonce: String,
}

impl NonceKey {
    /// Builds a canonical key.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAddress`] if `payer` is not an address of the
    /// network's family.
    pub fn new(network: Network, payer: &str, nonce: &str) -> Result<Self, InvalidAddress> {
        let family = network.family();
        Ok(Self {
            network,
            payer: family.canonical_address(payer)?,
            nonce: family.canonical_nonce(nonce),
        })
    }

    /// Builds the key identifying `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAddress`] if the payer is not a valid address.
    pub fn from_payload(payload: &PaymentPayload) -> Result<Self, InvalidAddress> {
        Self::new(payload.network, &payload.payer, &payload.nonce)
    }

    /// Network the authorization is valid on.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }

    /// Canonical payer address.
    #[must_use]
    pub fn payer(&self) -> &str {
        &self.payer
    }

    /// Canonical nonce.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }
}

impl fmt::Display for NonceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.network, self.payer, self.nonce)
    }
}

/// Lifecycle of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceState {
    /// A request holding this key is talking to the facilitator.
    Reserved,
    /// Settlement succeeded; the key is spent.
    Redeemed,
}

/// What the store remembers about a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceRecord {
    /// Current state.
    pub state: NonceState,
    /// When settlement was confirmed.
    pub redeemed_at: Option<UnixTimestamp>,
    /// The authorization's `validBefore`; the record may be purged after it.
    pub expires_at: UnixTimestamp,
}

/// Storage for reserved and redeemed authorization keys.
///
/// Every operation must be atomic per key: of any number of concurrent
/// [`reserve`](NonceStore::reserve) calls for the same key, at most one
/// returns `true`.
pub trait NonceStore: Send + Sync {
    /// Claims `key` if nobody holds it. Returns `false` if it is already
    /// reserved or redeemed.
    fn reserve(&self, key: &NonceKey, expires_at: UnixTimestamp) -> bool;

    /// Drops a reservation. Redeemed keys are never released. Returns `true`
    /// if a reservation was removed.
    fn release(&self, key: &NonceKey) -> bool;

    /// Marks a reserved key as permanently redeemed. Returns `false` if the
    /// key was not reserved.
    fn confirm(&self, key: &NonceKey) -> bool;

    /// Removes every record whose `expires_at` is before `now`. Returns how
    /// many were removed.
    fn purge_expired(&self, now: UnixTimestamp) -> usize;

    /// Current state of `key`, if stored.
    fn get(&self, key: &NonceKey) -> Option<NonceRecord>;

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// Returns `true` if the store holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local [`NonceStore`] on a sharded concurrent map.
///
/// Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    records: DashMap<NonceKey, NonceRecord>,
}

impl InMemoryNonceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn reserve(&self, key: &NonceKey, expires_at: UnixTimestamp) -> bool {
        // Entry holds the shard lock, so check-and-insert is atomic.
        match self.records.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(NonceRecord {
                    state: NonceState::Reserved,
                    redeemed_at: None,
                    expires_at,
                });
                true
            }
        }
    }

    fn release(&self, key: &NonceKey) -> bool {
        self.records
            .remove_if(key, |_, record| record.state == NonceState::Reserved)
            .is_some()
    }

    fn confirm(&self, key: &NonceKey) -> bool {
        match self.records.get_mut(key) {
            Some(mut record) if record.state == NonceState::Reserved => {
                record.state = NonceState::Redeemed;
                record.redeemed_at = Some(UnixTimestamp::now());
                true
            }
            _ => false,
        }
    }

    fn purge_expired(&self, now: UnixTimestamp) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at >= now);
        before.saturating_sub(self.records.len())
    }

    fn get(&self, key: &NonceKey) -> Option<NonceRecord> {
        self.records.get(key).map(|record| *record)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// A held reservation that is released on drop unless it was confirmed.
///
/// This is what keeps a key from dangling when the task driving a payment
/// panics or is torn down mid-flight.
pub struct NonceReservation {
    store: Arc<dyn NonceStore>,
    key: NonceKey,
    done: bool,
}

impl NonceReservation {
    /// Reserves `key` in `store`, or returns `None` if it is already taken.
    #[must_use]
    pub fn acquire(
        store: Arc<dyn NonceStore>,
        key: NonceKey,
        expires_at: UnixTimestamp,
    ) -> Option<Self> {
        store.reserve(&key, expires_at).then(|| Self {
            store,
            key,
            done: false,
        })
    }

    /// The reserved key.
    #[must_use]
    pub const fn key(&self) -> &NonceKey {
        &self.key
    }

    /// Marks the key as redeemed and disarms the guard.
    pub fn confirm(mut self) -> bool {
        self.done = true;
        self.store.confirm(&self.key)
    }

    /// Releases the key now.
    pub fn release(mut self) {
        self.done = true;
        self.store.release(&self.key);
    }
}

impl Drop for NonceReservation {
    fn drop(&mut self) {
        if !self.done {
            #[cfg(feature = "telemetry")]
            tracing::warn!(key = %self.key, "releasing abandoned nonce reservation");
            self.store.release(&self.key);
        }
    }
}

impl fmt::Debug for NonceReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceReservation")
            .field("key", &self.key)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Spawns a task that purges expired records every `every`.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. Must be called from within a Tokio runtime.
pub fn spawn_sweeper(store: Arc<dyn NonceStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired(UnixTimestamp::now());
            #[cfg(feature = "telemetry")]
            if purged > 0 {
                tracing::debug!(purged, remaining = store.len(), "purged expired nonces");
            }
            #[cfg(not(feature = "telemetry"))]
            let _ = purged;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAYER: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    fn key(nonce: &str) -> NonceKey {
        NonceKey::new(Network::BaseSepolia, PAYER, nonce).unwrap()
    }

    fn far_future() -> UnixTimestamp {
        UnixTimestamp::now().saturating_add(Duration::from_secs(3600))
    }

    #[test]
    fn key_is_case_insensitive_on_evm() {
        let lower = NonceKey::new(Network::Base, &PAYER.to_lowercase(), "0xABCD").unwrap();
        let mixed = NonceKey::new(Network::Base, PAYER, "0xabcd").unwrap();
        assert_eq!(lower, mixed);
        assert_ne!(lower, NonceKey::new(Network::BaseSepolia, PAYER, "0xabcd").unwrap());
    }

    #[test]
    fn non_hex_nonces_keep_their_case() {
        let upper = NonceKey::new(Network::Base, PAYER, "Ab").unwrap();
        let lower = NonceKey::new(Network::Base, PAYER, "ab").unwrap();
        assert_ne!(upper, lower);
        assert_eq!(upper.nonce(), "Ab");

        let store = InMemoryNonceStore::new();
        assert!(store.reserve(&upper, far_future()));
        assert!(store.reserve(&lower, far_future()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn second_reservation_is_refused() {
        let store = InMemoryNonceStore::new();
        assert!(store.reserve(&key("0x01"), far_future()));
        assert!(!store.reserve(&key("0x01"), far_future()));
        assert!(store.reserve(&key("0x02"), far_future()));
    }

    #[test]
    fn release_frees_only_reservations() {
        let store = InMemoryNonceStore::new();
        let k = key("0x01");
        assert!(store.reserve(&k, far_future()));
        assert!(store.release(&k));
        assert!(store.is_empty());
        assert!(store.reserve(&k, far_future()));
        assert!(store.confirm(&k));
        assert!(!store.release(&k));
        assert!(!store.reserve(&k, far_future()));
        let record = store.get(&k).unwrap();
        assert_eq!(record.state, NonceState::Redeemed);
        assert!(record.redeemed_at.is_some());
    }

    #[test]
    fn confirm_requires_a_reservation() {
        let store = InMemoryNonceStore::new();
        assert!(!store.confirm(&key("0x01")));
        assert!(store.reserve(&key("0x01"), far_future()));
        assert!(store.confirm(&key("0x01")));
        assert!(!store.confirm(&key("0x01")));
    }

    #[test]
    fn purge_drops_only_expired_records() {
        let store = InMemoryNonceStore::new();
        let now = UnixTimestamp::from_secs(1_000);
        store.reserve(&key("0x01"), UnixTimestamp::from_secs(999));
        store.reserve(&key("0x02"), UnixTimestamp::from_secs(1_000));
        store.reserve(&key("0x03"), UnixTimestamp::from_secs(2_000));
        store.confirm(&key("0x01"));
        assert_eq!(store.purge_expired(now), 1);
        assert_eq!(store.len(), 2);
        assert!(store.reserve(&key("0x01"), far_future()));
    }

    #[test]
    fn concurrent_reservations_admit_exactly_one() {
        let store = InMemoryNonceStore::new();
        let winners = AtomicUsize::new(0);
        let barrier = Barrier::new(16);
        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    barrier.wait();
                    if store.reserve(&key("0xfeed"), far_future()) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_reservation_is_released() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new());
        let guard = NonceReservation::acquire(Arc::clone(&store), key("0x01"), far_future());
        assert!(guard.is_some());
        assert!(NonceReservation::acquire(Arc::clone(&store), key("0x01"), far_future()).is_none());
        drop(guard);
        assert!(store.is_empty());

        let guard =
            NonceReservation::acquire(Arc::clone(&store), key("0x01"), far_future()).unwrap();
        assert!(guard.confirm());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_on_interval() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new());
        store.reserve(&key("0x01"), UnixTimestamp::from_secs(1));
        let handle = spawn_sweeper(Arc::clone(&store), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty());
        handle.abort();
    }
}
