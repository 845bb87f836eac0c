// In-process backends for every tenancy collaborator.
//
// `MemoryServer` stands in for a Postgres cluster (admin + client factory +
// migrator) and `MemoryRegistry` for the platform `tenants` table. Both
// enforce the same constraints as their Postgres counterparts and expose
// fault injection and construction counters for tests and local demos.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::backend::{ClientFactory, DatabaseAdmin, SchemaMigrator};
use super::error::{DatabaseError, UniqueField};
use super::models::{NewTenant, TenantLookup, TenantRecord};
use super::registry::TenantRegistry;

/// Schema version stamped on a store by `MemoryServer::apply`.
pub const MEMORY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Connect,
    Create,
    Migrate,
    Terminate,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Retryable, e.g. a dropped socket
    Transient,
    /// Permanent failure of the operation
    Permanent,
}

impl Fault {
    fn into_error(self, point: FaultPoint, database_name: &str) -> DatabaseError {
        match self {
            Fault::Transient => {
                DatabaseError::Connection(format!("injected {:?} blip on {}", point, database_name))
            }
            Fault::Permanent if point == FaultPoint::Migrate => {
                DatabaseError::Migration(format!("injected migration failure on {}", database_name))
            }
            Fault::Permanent => DatabaseError::Backend(format!(
                "injected {:?} failure on {}",
                point, database_name
            )),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    schema_version: Option<u32>,
    rows: HashMap<String, String>,
    /// Sessions held by processes other than this one
    external_sessions: u64,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: HashMap<String, MemoryDatabase>,
    clients: HashMap<String, Vec<Arc<AtomicBool>>>,
    connects: HashMap<String, usize>,
    connect_delays: HashMap<String, Duration>,
    faults: HashMap<FaultPoint, VecDeque<Fault>>,
}

impl ServerState {
    fn take_fault(&mut self, point: FaultPoint) -> Option<Fault> {
        self.faults.get_mut(&point).and_then(VecDeque::pop_front)
    }

    fn open_clients(&self, database_name: &str) -> usize {
        self.clients
            .get(database_name)
            .map(|flags| flags.iter().filter(|closed| !closed.load(Ordering::SeqCst)).count())
            .unwrap_or(0)
    }
}

/// Simulated database server
#[derive(Debug, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
    next_connection_id: AtomicU64,
}

/// Client handle bound to one simulated store
#[derive(Debug, Clone)]
pub struct MemoryClient {
    database_name: String,
    connection_id: u64,
    closed: Arc<AtomicBool>,
    state: Arc<Mutex<ServerState>>,
}

impl MemoryClient {
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn with_database<T>(
        &self,
        f: impl FnOnce(&mut MemoryDatabase) -> T,
    ) -> Result<T, DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::Connection(format!(
                "connection {} to {} is closed",
                self.connection_id, self.database_name
            )));
        }
        let mut state = lock(&self.state);
        state
            .databases
            .get_mut(&self.database_name)
            .map(f)
            .ok_or_else(|| DatabaseError::Missing(self.database_name.clone()))
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.with_database(|db| {
            db.rows.insert(key.to_string(), value.to_string());
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        self.with_database(|db| db.rows.get(key).cloned())
    }

    pub fn ping(&self) -> Result<(), DatabaseError> {
        self.with_database(|_| ())
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        lock(&self.state)
    }

    /// Queue a fault for the next call at `point`.
    pub fn inject(&self, point: FaultPoint, fault: Fault) {
        self.state().faults.entry(point).or_default().push_back(fault);
    }

    /// Create an empty store directly, bypassing provisioning.
    pub fn create_database_now(&self, database_name: &str) {
        self.state()
            .databases
            .entry(database_name.to_string())
            .or_default();
    }

    pub fn set_connect_delay(&self, database_name: &str, delay: Duration) {
        self.state()
            .connect_delays
            .insert(database_name.to_string(), delay);
    }

    /// Simulate a session held by another process.
    pub fn open_external_session(&self, database_name: &str) {
        if let Some(db) = self.state().databases.get_mut(database_name) {
            db.external_sessions += 1;
        }
    }

    pub fn has_database(&self, database_name: &str) -> bool {
        self.state().databases.contains_key(database_name)
    }

    pub fn schema_version(&self, database_name: &str) -> Option<u32> {
        self.state()
            .databases
            .get(database_name)
            .and_then(|db| db.schema_version)
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().databases.keys().cloned().collect();
        names.sort();
        names
    }

    /// How many handles were ever constructed for this store.
    pub fn connect_count(&self, database_name: &str) -> usize {
        self.state().connects.get(database_name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ClientFactory for MemoryServer {
    type Client = MemoryClient;

    async fn connect(&self, database_name: &str) -> Result<MemoryClient, DatabaseError> {
        let delay = {
            let mut state = self.state();
            *state.connects.entry(database_name.to_string()).or_default() += 1;
            if let Some(fault) = state.take_fault(FaultPoint::Connect) {
                return Err(fault.into_error(FaultPoint::Connect, database_name));
            }
            state.connect_delays.get(database_name).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if !state.databases.contains_key(database_name) {
            return Err(DatabaseError::Missing(database_name.to_string()));
        }

        let closed = Arc::new(AtomicBool::new(false));
        state
            .clients
            .entry(database_name.to_string())
            .or_default()
            .push(closed.clone());

        Ok(MemoryClient {
            database_name: database_name.to_string(),
            connection_id: self.next_connection_id.fetch_add(1, Ordering::SeqCst),
            closed,
            state: self.state.clone(),
        })
    }

    async fn close(&self, client: &MemoryClient) {
        client.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatabaseAdmin for MemoryServer {
    async fn create_database(&self, database_name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state();
        if let Some(fault) = state.take_fault(FaultPoint::Create) {
            return Err(fault.into_error(FaultPoint::Create, database_name));
        }
        if state.databases.contains_key(database_name) {
            return Err(DatabaseError::AlreadyExists(database_name.to_string()));
        }
        state
            .databases
            .insert(database_name.to_string(), MemoryDatabase::default());
        Ok(())
    }

    async fn terminate_connections(&self, database_name: &str) -> Result<u64, DatabaseError> {
        let mut state = self.state();
        if let Some(fault) = state.take_fault(FaultPoint::Terminate) {
            return Err(fault.into_error(FaultPoint::Terminate, database_name));
        }

        let mut terminated = 0;
        if let Some(flags) = state.clients.get_mut(database_name) {
            for closed in flags.iter() {
                if !closed.swap(true, Ordering::SeqCst) {
                    terminated += 1;
                }
            }
            flags.clear();
        }
        if let Some(db) = state.databases.get_mut(database_name) {
            terminated += db.external_sessions;
            db.external_sessions = 0;
        }
        Ok(terminated)
    }

    async fn drop_database(&self, database_name: &str) -> Result<(), DatabaseError> {
        let mut state = self.state();
        if let Some(fault) = state.take_fault(FaultPoint::Drop) {
            return Err(fault.into_error(FaultPoint::Drop, database_name));
        }

        let external = match state.databases.get(database_name) {
            Some(db) => db.external_sessions,
            None => return Err(DatabaseError::Missing(database_name.to_string())),
        };
        if external > 0 || state.open_clients(database_name) > 0 {
            return Err(DatabaseError::InUse(database_name.to_string()));
        }

        state.databases.remove(database_name);
        state.clients.remove(database_name);
        Ok(())
    }

    async fn database_exists(&self, database_name: &str) -> Result<bool, DatabaseError> {
        Ok(self.has_database(database_name))
    }
}

#[async_trait]
impl SchemaMigrator<MemoryClient> for MemoryServer {
    async fn apply(&self, database_name: &str, client: &MemoryClient) -> Result<(), DatabaseError> {
        {
            let mut state = self.state();
            if let Some(fault) = state.take_fault(FaultPoint::Migrate) {
                return Err(fault.into_error(FaultPoint::Migrate, database_name));
            }
        }
        client.with_database(|db| db.schema_version = Some(MEMORY_SCHEMA_VERSION))
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    rows: Vec<TenantRecord>,
    fail_commits: u32,
    read_delay: Option<Duration>,
}

/// In-memory platform registry with the same uniqueness rules as the
/// `tenants` table: database names are unique across every row ever written,
/// slugs and domains only across rows that are not retired.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        lock(&self.state)
    }

    /// Insert a row verbatim, skipping every constraint.
    pub fn insert_raw(&self, record: TenantRecord) {
        self.state().rows.push(record);
    }

    /// Make the next `n` commits fail with a non-retryable error.
    pub fn fail_next_commits(&self, n: u32) {
        self.state().fail_commits = n;
    }

    /// Slow down `find` and `database_name_in_use`.
    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = Some(delay);
    }

    /// Every row, including pending and retired ones.
    pub fn all_rows(&self) -> Vec<TenantRecord> {
        self.state().rows.clone()
    }

    async fn read_delay(&self) {
        let delay = self.state().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn with_row<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut TenantRecord) -> T,
    ) -> Result<T, DatabaseError> {
        let mut state = self.state();
        state
            .rows
            .iter_mut()
            .find(|row| row.id == id && row.deleted_at.is_none())
            .map(f)
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))
    }
}

fn matches_lookup(row: &TenantRecord, lookup: &TenantLookup) -> bool {
    match lookup {
        TenantLookup::Id(id) => row.id == *id,
        TenantLookup::Slug(slug) => row.slug == *slug,
        TenantLookup::Domain(domain) => row
            .domain
            .as_deref()
            .map(|d| d.eq_ignore_ascii_case(domain))
            .unwrap_or(false),
    }
}

#[async_trait]
impl TenantRegistry for MemoryRegistry {
    async fn find(&self, lookup: &TenantLookup) -> Result<Option<TenantRecord>, DatabaseError> {
        self.read_delay().await;
        let state = self.state();
        Ok(state
            .rows
            .iter()
            .find(|row| row.is_live() && matches_lookup(row, lookup))
            .cloned())
    }

    async fn find_by_database(
        &self,
        database_name: &str,
    ) -> Result<Option<TenantRecord>, DatabaseError> {
        let state = self.state();
        Ok(state
            .rows
            .iter()
            .find(|row| row.deleted_at.is_none() && row.database_name.as_deref() == Some(database_name))
            .cloned())
    }

    async fn database_name_in_use(&self, database_name: &str) -> Result<bool, DatabaseError> {
        self.read_delay().await;
        let state = self.state();
        Ok(state
            .rows
            .iter()
            .any(|row| row.database_name.as_deref() == Some(database_name)))
    }

    async fn reserve(&self, tenant: &NewTenant) -> Result<TenantRecord, DatabaseError> {
        let mut state = self.state();

        for row in &state.rows {
            if row.database_name.as_deref() == Some(tenant.database_name.as_str()) {
                return Err(DatabaseError::Conflict(UniqueField::DatabaseName));
            }
            if row.deleted_at.is_some() {
                continue;
            }
            if row.slug == tenant.slug {
                return Err(DatabaseError::Conflict(UniqueField::Slug));
            }
            if let (Some(existing), Some(wanted)) = (&row.domain, &tenant.domain) {
                if existing.eq_ignore_ascii_case(wanted) {
                    return Err(DatabaseError::Conflict(UniqueField::Domain));
                }
            }
        }

        let now = Utc::now();
        let record = TenantRecord {
            id: Uuid::new_v4(),
            display_name: tenant.display_name.clone(),
            slug: tenant.slug.clone(),
            domain: tenant.domain.clone(),
            database_name: Some(tenant.database_name.clone()),
            active: true,
            owner_id: tenant.owner_id,
            created_at: now,
            updated_at: now,
            provisioned_at: None,
            deleted_at: None,
        };
        state.rows.push(record.clone());
        Ok(record)
    }

    async fn commit(&self, id: Uuid) -> Result<TenantRecord, DatabaseError> {
        {
            let mut state = self.state();
            if state.fail_commits > 0 {
                state.fail_commits -= 1;
                return Err(DatabaseError::Migration(format!(
                    "injected commit failure for {}",
                    id
                )));
            }
        }
        self.with_row(id, |row| {
            let now = Utc::now();
            row.provisioned_at = Some(now);
            row.updated_at = now;
            row.clone()
        })
    }

    async fn release(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut state = self.state();
        let before = state.rows.len();
        state.rows.retain(|row| !(row.id == id && row.is_pending()));
        if state.rows.len() == before {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), DatabaseError> {
        self.with_row(id, |row| {
            row.active = active;
            row.updated_at = Utc::now();
        })
    }

    async fn retire(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.with_row(id, |row| {
            let now = Utc::now();
            row.active = false;
            row.deleted_at = Some(now);
            row.updated_at = now;
        })
    }

    async fn list(&self) -> Result<Vec<TenantRecord>, DatabaseError> {
        let state = self.state();
        let mut rows: Vec<TenantRecord> = state.rows.iter().filter(|r| r.is_live()).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}
