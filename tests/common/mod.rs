//! Shared fixtures: an in-process fake of the clients server.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use client_sync::{
    ChangeSet, ClientsApi, CorrectedClient, DatasetKey, HierarchicalSnapshot, InMemorySnapshotStore,
    Location, MapListing, PersistedSnapshot, PersistenceError, Record, SnapshotStore, SyncCoordinator,
    TransportError, UnmappedClient, ViewKind, Watermark,
};
use client_sync::transport::{CitySnapshot, SectorSnapshot};

/// Route coordinator logs to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}

pub fn wm(token: &str) -> Watermark {
    Watermark::from_server(token).unwrap()
}

pub fn laval(id: &str, district: &str) -> Record {
    Record::new(id, "Laval").with_district(district)
}

pub fn mapped(id: &str, lat: f64, lng: f64) -> Record {
    Record::new(id, "Laval")
        .with_name("Client", id)
        .with_coordinates(lat, lng)
}

/// Build the hierarchical wire shape the server would send for `records`.
pub fn snapshot_of(records: &[Record]) -> HierarchicalSnapshot {
    let mut snapshot = HierarchicalSnapshot::default();
    for record in records {
        let sector = record.resolved_sector();
        let node: &mut SectorSnapshot = snapshot.0.entry(sector.as_str().to_string()).or_default();
        if sector.indexes_by_district() {
            match record.index_district() {
                Some(d) => node.districts.entry(d.to_string()).or_default().push(record.clone()),
                None => node.unassigned.push(record.clone()),
            }
        } else {
            let city: &mut CitySnapshot = node.cities.entry(record.city.clone()).or_default();
            match record.index_district() {
                Some(d) => city.districts.entry(d.to_string()).or_default().push(record.clone()),
                None => city.clients.push(record.clone()),
            }
        }
    }
    snapshot
}

fn failure(endpoint: &str) -> TransportError {
    TransportError::Network { endpoint: endpoint.to_string(), reason: "connection refused".to_string() }
}

#[derive(Default)]
pub struct ServerState {
    /// Full by-city dataset
    pub records: Vec<Record>,
    /// for-map listing
    pub map_clients: Vec<Record>,
    pub missing: Vec<UnmappedClient>,
    pub last_update: Option<Watermark>,
    /// What changes_since answers
    pub changes: ChangeSet,
    /// What update_single_client answers
    pub correction: Option<Result<CorrectedClient, TransportError>>,
    /// Endpoints that fail
    pub failing: HashSet<&'static str>,
    /// Endpoint log, in call order
    pub calls: Vec<String>,
}

/// Scriptable in-process server.
#[derive(Default)]
pub struct FakeApi {
    pub state: Mutex<ServerState>,
    /// When set, changes_since parks until notified
    pub gate: Mutex<Option<Arc<Notify>>>,
    /// Notified when changes_since is entered
    pub entered: Arc<Notify>,
    /// When set, update_single_client parks until notified
    pub correction_gate: Mutex<Option<Arc<Notify>>>,
    /// Notified when update_single_client is entered
    pub correction_entered: Arc<Notify>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.as_str() == endpoint).count()
    }

    fn enter(&self, endpoint: &'static str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.push(endpoint.to_string());
        if state.failing.contains(endpoint) {
            return Err(failure(endpoint));
        }
        Ok(())
    }
}

#[async_trait]
impl ClientsApi for FakeApi {
    async fn by_city(&self, frequent_only: bool) -> Result<HierarchicalSnapshot, TransportError> {
        self.enter("by_city")?;
        let state = self.state.lock();
        let records: Vec<Record> = state
            .records
            .iter()
            .filter(|r| !frequent_only || r.frequent)
            .cloned()
            .collect();
        Ok(snapshot_of(&records))
    }

    async fn changes_since(&self, _since: &Watermark) -> Result<ChangeSet, TransportError> {
        self.enter("changes_since")?;
        self.entered.notify_one();
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.state.lock().changes.clone())
    }

    async fn for_map(&self, frequent_only: bool) -> Result<MapListing, TransportError> {
        self.enter("for_map")?;
        let state = self.state.lock();
        let clients: Vec<Record> = state
            .map_clients
            .iter()
            .filter(|r| !frequent_only || r.frequent)
            .cloned()
            .collect();
        Ok(MapListing {
            total_with_coordinates: clients.len(),
            without_coordinates: state.missing.len(),
            clients,
            missing_clients: state.missing.clone(),
        })
    }

    async fn last_update(&self) -> Result<Option<Watermark>, TransportError> {
        self.enter("last_update")?;
        Ok(self.state.lock().last_update.clone())
    }

    async fn update_single_client(
        &self,
        id: &str,
        _new_address: &str,
    ) -> Result<CorrectedClient, TransportError> {
        self.enter("update_single_client")?;
        self.correction_entered.notify_one();
        let gate = self.correction_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.state
            .lock()
            .correction
            .clone()
            .unwrap_or_else(|| {
                Ok(CorrectedClient { client: Record::new(id, "Laval"), location: Location::default() })
            })
    }
}

/// Snapshot store whose writes always fail; reads come from `inner`.
#[derive(Default)]
pub struct FailingSnapshotStore {
    pub inner: InMemorySnapshotStore,
    pub save_attempts: AtomicUsize,
}

impl FailingSnapshotStore {
    pub fn saves(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn load(&self, key: &DatasetKey) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        self.inner.load(key).await
    }

    async fn save(&self, _key: &DatasetKey, _snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistenceError::Backend("disk I/O error".to_string()))
    }

    async fn clear(&self, key: &DatasetKey) -> Result<(), PersistenceError> {
        self.inner.clear(key).await
    }
}

/// Coordinator over `api` with an in-memory snapshot store.
pub fn coordinator(
    view: ViewKind,
    api: &Arc<FakeApi>,
) -> (Arc<SyncCoordinator>, Arc<InMemorySnapshotStore>) {
    init_tracing();
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let coordinator = SyncCoordinator::new(
        view,
        false,
        api.clone() as Arc<dyn ClientsApi>,
        snapshots.clone() as Arc<dyn SnapshotStore>,
    );
    (Arc::new(coordinator), snapshots)
}

/// Seed the cache slot for `key`.
pub async fn seed(snapshots: &InMemorySnapshotStore, key: DatasetKey, records: Vec<Record>, watermark: &str) {
    snapshots
        .save(&key, &PersistedSnapshot::new(records, wm(watermark)))
        .await
        .unwrap();
}
