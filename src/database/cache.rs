use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

use super::backend::ClientFactory;
use super::error::DatabaseError;

/// One key's handle, built at most once and closed at most once
struct Entry<C> {
    cell: OnceCell<C>,
    closed: AtomicBool,
}

impl<C> Entry<C> {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The built handle, handed out to exactly one closer.
    fn take_for_close(&self) -> Option<&C> {
        let client = self.cell.get()?;
        if self.closed.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(client)
        }
    }
}

type Slot<C> = Arc<Entry<C>>;

/// Keyed cache of live client handles, one per tenant database.
///
/// Each key owns a `OnceCell` slot. The map lock is held only long enough to
/// find or insert the slot; the handle itself is built inside the slot, so
/// concurrent callers for the same key wait on one construction while callers
/// for other keys proceed untouched. A failed construction removes its empty
/// slot and the next caller tries again.
pub struct ConnectionCache<C> {
    factory: Arc<dyn ClientFactory<Client = C>>,
    slots: RwLock<HashMap<String, Slot<C>>>,
}

impl<C: Clone + Send + Sync + 'static> ConnectionCache<C> {
    pub fn new(factory: Arc<dyn ClientFactory<Client = C>>) -> Self {
        Self {
            factory,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Get existing handle or create a new one lazily
    pub async fn get_client(&self, database_name: &str) -> Result<C, DatabaseError> {
        let slot = self.slot(database_name).await;

        let built = slot
            .cell
            .get_or_try_init(|| async {
                let client = self.factory.connect(database_name).await?;
                info!("Created database pool for: {}", database_name);
                Ok::<C, DatabaseError>(client)
            })
            .await;
        let client = match built {
            Ok(client) => client.clone(),
            Err(err) => {
                self.discard_empty(database_name, &slot).await;
                return Err(err);
            }
        };

        // An invalidation that raced with construction removed the slot; the
        // handle we just built must not escape untracked. Every waiter on the
        // slot lands here, only one of them closes.
        if !self.is_current(database_name, &slot).await {
            if let Some(client) = slot.take_for_close() {
                self.factory.close(client).await;
            }
            return Err(DatabaseError::Invalidated(database_name.to_string()));
        }

        Ok(client)
    }

    async fn slot(&self, database_name: &str) -> Slot<C> {
        // Fast path: try read lock
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(database_name) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(database_name.to_string())
                .or_insert_with(|| Arc::new(Entry::new())),
        )
    }

    /// Drop a slot whose construction failed, unless it was replaced or a
    /// later caller has filled it since.
    async fn discard_empty(&self, database_name: &str, slot: &Slot<C>) {
        let mut slots = self.slots.write().await;
        let stale = slots
            .get(database_name)
            .map(|current| Arc::ptr_eq(current, slot) && !current.cell.initialized())
            .unwrap_or(false);
        if stale {
            slots.remove(database_name);
        }
    }

    async fn is_current(&self, database_name: &str, slot: &Slot<C>) -> bool {
        let slots = self.slots.read().await;
        slots
            .get(database_name)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
    }

    /// Remove and close the handle for one database. Returns whether a live
    /// handle was closed.
    pub async fn invalidate(&self, database_name: &str) -> bool {
        let removed = {
            let mut slots = self.slots.write().await;
            slots.remove(database_name)
        };

        match removed.as_ref().and_then(|slot| slot.take_for_close()) {
            Some(client) => {
                self.factory.close(client).await;
                info!("Closed database pool: {}", database_name);
                true
            }
            None => {
                debug!("No cached pool to invalidate for: {}", database_name);
                false
            }
        }
    }

    /// Close and remove all handles (e.g., on shutdown)
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, Slot<C>)> = {
            let mut slots = self.slots.write().await;
            slots.drain().collect()
        };

        let closing = drained.iter().filter_map(|(name, slot)| {
            slot.take_for_close().map(|client| async move {
                self.factory.close(client).await;
                info!("Closed database pool: {}", name);
            })
        });
        futures::future::join_all(closing).await;
    }

    /// Whether a constructed handle is cached for this database.
    pub async fn contains(&self, database_name: &str) -> bool {
        let slots = self.slots.read().await;
        slots
            .get(database_name)
            .map(|slot| slot.cell.initialized())
            .unwrap_or(false)
    }

    /// Number of constructed handles currently cached.
    pub async fn len(&self) -> usize {
        let slots = self.slots.read().await;
        slots.values().filter(|slot| slot.cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
