//! Optimistic overlay engine: keeps collection stores in step with the backend while
//! showing local creations and deletions before a fetch confirms them.
//!
//! Store mutations happen inside short write-lock sections that never span a gateway
//! call, so each operation's effect on a store is atomic. Gateway calls may overlap;
//! their results are applied in completion order, except that a fetch issued before the
//! last applied fetch or mutation of its collection is discarded when stale-response
//! filtering is on.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    error::SyncError,
    gateway::CollectionGateway,
    model::{CollectionKey, Entity, Identity, Payload, ProvisionalId},
    store::EntityStore,
    sync::{keys::KeyPolicy, reconcile::reconcile},
};

/// Handle shared between the session and the presentation layer.
pub type SharedEngine = Arc<SyncEngine>;

/// Behaviour switches of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Show a created record before the backend answers, withdrawing it on failure.
    pub optimistic_creates: bool,
    /// Refetch listable collections after a successful create or delete.
    pub refresh_after_mutation: bool,
    /// Drop fetch responses older than the last applied fetch or mutation.
    pub discard_stale_responses: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            optimistic_creates: false,
            refresh_after_mutation: true,
            discard_stale_responses: true,
        }
    }
}

/// A create the backend accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// Entry shown for the new record: a provisional entry, or the fetched row when a
    /// fetch already listed the record before the create was answered.
    pub entity: Entity,
    /// Failure of the refetch run after the create.
    pub refresh_error: Option<SyncError>,
}

/// A delete that left the record out of its store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    /// Entry removed, or `None` when it was already absent.
    pub removed: Option<Entity>,
    /// Failure of the refetch run after the delete.
    pub refresh_error: Option<SyncError>,
}

/// What a refresh did to its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fetch applied.
    Applied {
        /// Number of fetched entities.
        fetched: usize,
        /// Provisional entries replaced by fetched ones.
        superseded: usize,
        /// Provisional entries still shown.
        retained: usize,
    },
    /// A newer fetch or mutation was applied while this fetch was in flight.
    Stale,
    /// The backend cannot list this kind; contents were kept as they were.
    Unsupported,
}

struct Tracked {
    store: EntityStore,
    /// Sequence number of the last fetch issued.
    issued: u64,
    /// Fetches numbered at or below this are stale.
    applied: u64,
}

impl Tracked {
    fn new(collection: CollectionKey) -> Self {
        Self {
            store: EntityStore::new(collection),
            issued: 0,
            applied: 0,
        }
    }

    /// Make every fetch issued so far stale.
    fn settle(&mut self) {
        self.applied = self.issued;
    }
}

/// Synchronisation core holding one store per collection.
pub struct SyncEngine {
    gateway: Arc<dyn CollectionGateway>,
    keys: KeyPolicy,
    options: SyncOptions,
    collections: RwLock<HashMap<CollectionKey, Tracked>>,
    revision: watch::Sender<u64>,
}

impl SyncEngine {
    /// Construct an engine over `gateway`, wrapped in an [`Arc`] so it can be shared.
    pub fn new(
        gateway: Arc<dyn CollectionGateway>,
        options: SyncOptions,
        keys: KeyPolicy,
    ) -> SharedEngine {
        let (revision, _rx) = watch::channel(0);
        Arc::new(Self {
            gateway,
            keys,
            options,
            collections: RwLock::new(HashMap::new()),
            revision,
        })
    }

    /// Behaviour switches in effect.
    pub fn options(&self) -> SyncOptions {
        self.options
    }

    /// Whether the backend can list entities of this collection's kind.
    pub fn can_refresh(&self, collection: CollectionKey) -> bool {
        self.gateway.supports_fetch(collection.kind)
    }

    /// Current contents of a collection in display order.
    pub async fn subscribe(&self, collection: CollectionKey) -> Vec<Entity> {
        let collections = self.collections.read().await;
        collections
            .get(&collection)
            .map(|tracked| tracked.store.all().cloned().collect())
            .unwrap_or_default()
    }

    /// Receiver whose value changes after every store mutation.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Fetch a collection and reconcile it with the provisional entries still held.
    ///
    /// A failed fetch leaves the previous contents visible.
    pub async fn refresh(&self, collection: CollectionKey) -> Result<RefreshOutcome, SyncError> {
        if !self.can_refresh(collection) {
            debug!(%collection, "backend cannot list collection; keeping contents");
            return Ok(RefreshOutcome::Unsupported);
        }

        let sequence = {
            let mut collections = self.collections.write().await;
            let tracked = collections
                .entry(collection)
                .or_insert_with(|| Tracked::new(collection));
            tracked.issued += 1;
            tracked.issued
        };

        let fetched = self.gateway.fetch(collection).await.map_err(|err| {
            warn!(%collection, error = %err, "fetch failed; keeping previous contents");
            SyncError::from(err)
        })?;

        let mut collections = self.collections.write().await;
        let tracked = match collections.entry(collection) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Tracked::new(collection)),
        };

        if self.options.discard_stale_responses && sequence <= tracked.applied {
            debug!(%collection, sequence, applied = tracked.applied, "discarding stale fetch");
            return Ok(RefreshOutcome::Stale);
        }

        let reconciled = reconcile(
            collection,
            fetched,
            tracked.store.provisional(),
            &self.keys,
        )
        .inspect_err(|err| warn!(%collection, error = %err, "rejecting fetch response"))?;

        let fetched = reconciled.authoritative.len();
        let superseded = reconciled.superseded.len();
        let retained = reconciled.retained.len();
        if !reconciled.collapsed.is_empty() {
            debug!(%collection, count = reconciled.collapsed.len(), "collapsed duplicate provisional entries");
        }

        tracked.store.replace_all(reconciled.authoritative)?;
        tracked.store.retain_provisional(&reconciled.retained);
        tracked.applied = tracked.applied.max(sequence);
        drop(collections);
        self.notify();

        info!(%collection, fetched, superseded, retained, "collection refreshed");
        Ok(RefreshOutcome::Applied {
            fetched,
            superseded,
            retained,
        })
    }

    /// Create a record and show it as a provisional entry.
    ///
    /// No provisional entry is added when a fetch finished during the call and already
    /// lists the record, by echoed id or by content key. Nothing is shown for a failed
    /// create.
    pub async fn create(&self, payload: Payload) -> Result<Created, SyncError> {
        payload.validate()?;

        let collection = payload.collection();
        let id = ProvisionalId::mint();

        if self.options.optimistic_creates {
            let pending = Entity::provisional(id, payload.clone(), None);
            self.with_store(collection, |store| store.upsert_provisional(pending))
                .await;
        }

        let confirmed = match self.gateway.create(payload.clone()).await {
            Ok(confirmed) => confirmed,
            Err(err) => {
                warn!(%collection, error = %err, "create failed");
                if self.options.optimistic_creates {
                    self.with_store(collection, |store| {
                        store.remove(Identity::Provisional(id));
                    })
                    .await;
                }
                return Err(err.into());
            }
        };

        let pending = Entity::provisional(id, payload, confirmed);
        let key = self.keys.key(&pending);
        let keys = &self.keys;
        let entity = self
            .with_store(collection, |store| {
                let listed = confirmed
                    .and_then(|confirmed| store.get(Identity::Server(confirmed)))
                    .or_else(|| store.authoritative().find(|row| keys.key(row) == key))
                    .cloned();
                match listed {
                    Some(row) => {
                        store.remove(Identity::Provisional(id));
                        row
                    }
                    None => {
                        store.upsert_provisional(pending.clone());
                        pending
                    }
                }
            })
            .await;
        info!(%collection, identity = %entity.identity(), confirmed = ?confirmed, "created record");

        let refresh_error = self.refresh_after_mutation(collection).await;
        Ok(Created {
            entity,
            refresh_error,
        })
    }

    /// Delete a record. Confirmation is assumed to have been given already.
    ///
    /// Deleting an absent record succeeds without a backend call. A provisional record
    /// the backend never reported an id for is only removed locally. A failed backend
    /// call leaves the record visible.
    pub async fn delete(
        &self,
        collection: CollectionKey,
        identity: Identity,
    ) -> Result<Deleted, SyncError> {
        let target = {
            let collections = self.collections.read().await;
            collections
                .get(&collection)
                .and_then(|tracked| tracked.store.get(identity).cloned())
        };

        let Some(entity) = target else {
            debug!(%collection, %identity, "record already absent");
            return Ok(Deleted {
                removed: None,
                refresh_error: None,
            });
        };

        let Some(server_id) = entity.server_id() else {
            self.with_store(collection, |store| {
                store.remove(identity);
            })
            .await;
            info!(%collection, %identity, "discarded unconfirmed record locally");
            return Ok(Deleted {
                removed: Some(entity),
                refresh_error: None,
            });
        };

        self.gateway
            .delete(server_id, entity.payload().clone())
            .await
            .map_err(|err| {
                warn!(%collection, %identity, error = %err, "delete failed");
                SyncError::from(err)
            })?;

        self.with_store(collection, |store| {
            store.remove(identity);
            store.remove(Identity::Server(server_id));
            store.remove_confirmed(server_id);
        })
        .await;
        info!(%collection, %identity, "deleted record");

        let refresh_error = self.refresh_after_mutation(collection).await;
        Ok(Deleted {
            removed: Some(entity),
            refresh_error,
        })
    }

    /// Drop a collection's contents and make its in-flight fetches stale.
    pub async fn forget(&self, collection: CollectionKey) {
        let mut collections = self.collections.write().await;
        if let Some(tracked) = collections.get_mut(&collection) {
            tracked.store = EntityStore::new(collection);
            tracked.settle();
            drop(collections);
            self.notify();
            debug!(%collection, "forgot collection contents");
        }
    }

    /// Apply a mutation to one store, marking in-flight fetches of it stale.
    async fn with_store<F, R>(&self, collection: CollectionKey, apply: F) -> R
    where
        F: FnOnce(&mut EntityStore) -> R,
    {
        let result = {
            let mut collections = self.collections.write().await;
            let tracked = collections
                .entry(collection)
                .or_insert_with(|| Tracked::new(collection));
            let result = apply(&mut tracked.store);
            tracked.settle();
            result
        };
        self.notify();
        result
    }

    /// Refetch a listable collection after a successful mutation. The mutation stands
    /// even when the refetch fails; the failure is handed back to the caller.
    async fn refresh_after_mutation(&self, collection: CollectionKey) -> Option<SyncError> {
        if !self.options.refresh_after_mutation || !self.can_refresh(collection) {
            return None;
        }

        match self.refresh(collection).await {
            Ok(_) => None,
            Err(err) => {
                warn!(%collection, error = %err, "refetch after mutation failed");
                Some(err)
            }
        }
    }
}
