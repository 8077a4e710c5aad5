//! In-memory gateway with backend-assigned serial ids and failure injection.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use crate::{
    gateway::{CollectionGateway, GatewayError, GatewayResult},
    model::{CollectionKey, Entity, EntityKind, Payload, ServerId},
};

/// Gateway operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`CollectionGateway::fetch`].
    Fetch,
    /// [`CollectionGateway::create`].
    Create,
    /// [`CollectionGateway::delete`].
    Delete,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    /// Rows in insertion order. Ids are not checked for uniqueness so tests can model
    /// a backend that breaks its own contract.
    rows: Vec<(ServerId, Payload)>,
    /// Rows created but not yet visible to fetches (read-after-write lag).
    lagging: Vec<(ServerId, Payload)>,
    failures: HashMap<Operation, VecDeque<GatewayError>>,
    fetch_gates: VecDeque<oneshot::Receiver<()>>,
    create_gates: VecDeque<oneshot::Receiver<()>>,
    calls: HashMap<Operation, usize>,
}

/// Gateway keeping rows in process memory.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
    unlistable: Arc<HashSet<EntityKind>>,
    lag_creates: bool,
    echo_ids: bool,
}

/// Handle releasing a call held by [`MemoryGateway::hold_next_fetch`] or
/// [`MemoryGateway::hold_next_create`].
pub struct CallGate(oneshot::Sender<()>);

impl CallGate {
    /// Let the held call complete.
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

impl MemoryGateway {
    /// Gateway listing every kind and echoing created ids.
    pub fn new() -> Self {
        Self {
            echo_ids: true,
            ..Self::default()
        }
    }

    /// Stop listing `kind`, like a backend without a list endpoint for it.
    pub fn without_listing(mut self, kind: EntityKind) -> Self {
        let mut unlistable = (*self.unlistable).clone();
        unlistable.insert(kind);
        self.unlistable = Arc::new(unlistable);
        self
    }

    /// Keep created rows out of fetches until [`MemoryGateway::settle`] is called.
    pub fn with_lagging_reads(mut self) -> Self {
        self.lag_creates = true;
        self
    }

    /// Answer creates without the new id.
    pub fn without_id_echo(mut self) -> Self {
        self.echo_ids = false;
        self
    }

    /// Insert a row directly, returning its new id.
    pub async fn seed(&self, payload: Payload) -> ServerId {
        let mut state = self.state.lock().await;
        let id = next_id(&mut state);
        state.rows.push((id, payload));
        id
    }

    /// Insert a row under an explicit id, even one already in use.
    pub async fn seed_with_id(&self, id: ServerId, payload: Payload) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(id.get());
        state.rows.push((id, payload));
    }

    /// Make lagging rows visible to fetches.
    pub async fn settle(&self) {
        let mut state = self.state.lock().await;
        let lagging = std::mem::take(&mut state.lagging);
        state.rows.extend(lagging);
    }

    /// Fail the next call of `operation` with `error`.
    pub async fn fail_next(&self, operation: Operation, error: GatewayError) {
        let mut state = self.state.lock().await;
        state.failures.entry(operation).or_default().push_back(error);
    }

    /// Hold the next fetch until the returned gate is released. The held fetch answers
    /// with the rows present when it was issued.
    pub async fn hold_next_fetch(&self) -> CallGate {
        let (tx, rx) = oneshot::channel();
        self.state.lock().await.fetch_gates.push_back(rx);
        CallGate(tx)
    }

    /// Hold the answer to the next create until the returned gate is released. The row
    /// is stored before the call waits, so fetches issued meanwhile already list it.
    pub async fn hold_next_create(&self) -> CallGate {
        let (tx, rx) = oneshot::channel();
        self.state.lock().await.create_gates.push_back(rx);
        CallGate(tx)
    }

    /// Number of calls received for `operation`, failed ones included.
    pub async fn calls(&self, operation: Operation) -> usize {
        let state = self.state.lock().await;
        state.calls.get(&operation).copied().unwrap_or_default()
    }

    /// Rows currently held, lagging ones included.
    pub async fn row_count(&self) -> usize {
        let state = self.state.lock().await;
        state.rows.len() + state.lagging.len()
    }
}

fn next_id(state: &mut MemoryState) -> ServerId {
    state.next_id += 1;
    ServerId::new(state.next_id)
}

/// Record the call and pop an injected failure for it, if any.
fn begin(state: &mut MemoryState, operation: Operation) -> GatewayResult<()> {
    *state.calls.entry(operation).or_default() += 1;
    match state
        .failures
        .get_mut(&operation)
        .and_then(VecDeque::pop_front)
    {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl CollectionGateway for MemoryGateway {
    fn supports_fetch(&self, kind: EntityKind) -> bool {
        !self.unlistable.contains(&kind)
    }

    fn fetch(&self, collection: CollectionKey) -> BoxFuture<'static, GatewayResult<Vec<Entity>>> {
        let gateway = self.clone();
        Box::pin(async move {
            if !gateway.supports_fetch(collection.kind) {
                return Err(GatewayError::Unsupported {
                    kind: collection.kind,
                    operation: "list",
                });
            }

            let (gate, outcome) = {
                let mut state = gateway.state.lock().await;
                let outcome = begin(&mut state, Operation::Fetch).map(|()| {
                    state
                        .rows
                        .iter()
                        .filter(|(_, payload)| payload.collection() == collection)
                        .map(|(id, payload)| Entity::authoritative(*id, payload.clone()))
                        .collect::<Vec<_>>()
                });
                (state.fetch_gates.pop_front(), outcome)
            };

            if let Some(gate) = gate {
                let _ = gate.await;
            }

            debug!(%collection, "memory gateway answered fetch");
            outcome
        })
    }

    fn create(&self, payload: Payload) -> BoxFuture<'static, GatewayResult<Option<ServerId>>> {
        let gateway = self.clone();
        Box::pin(async move {
            let (gate, id) = {
                let mut state = gateway.state.lock().await;
                begin(&mut state, Operation::Create)?;

                let id = next_id(&mut state);
                let row = (id, payload.without_secrets());
                if gateway.lag_creates {
                    state.lagging.push(row);
                } else {
                    state.rows.push(row);
                }
                (state.create_gates.pop_front(), id)
            };

            if let Some(gate) = gate {
                let _ = gate.await;
            }

            Ok(gateway.echo_ids.then_some(id))
        })
    }

    fn delete(&self, id: ServerId, payload: Payload) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let mut state = gateway.state.lock().await;
            begin(&mut state, Operation::Delete)?;

            let kind = payload.kind();
            let before = state.rows.len() + state.lagging.len();
            let keep = |(row_id, row): &(ServerId, Payload)| !(*row_id == id && row.kind() == kind);
            state.rows.retain(keep);
            state.lagging.retain(keep);

            if state.rows.len() + state.lagging.len() == before {
                return Err(GatewayError::Rejected {
                    reason: Some(format!("{kind} {id} not found")),
                });
            }
            Ok(())
        })
    }
}
