mod error;
mod mutations;
mod queries;

pub use error::StoreError;
pub use queries::OrganizationSummary;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::InvalidationHub;
use crate::wal::Wal;

pub type SharedOrganizationState = Arc<RwLock<OrganizationState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Takes the first append, drains whatever else is already
/// queued, then fsyncs the whole batch once and answers every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} records: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_err = batch
        .iter()
        .find_map(|(event, _)| wal.append_buffered(event).err());
    // Flush even after a failed append so half-written bytes don't leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Row store for every organization-scoped entity.
///
/// Each organization is one partition behind its own lock; a mutation is a
/// single WAL record, applied in memory only once it is durable.
pub struct Store {
    orgs: DashMap<Ulid, SharedOrganizationState>,
    /// Reverse lookup: entity id (profile, pet, service, block, appointment) → organization id.
    entity_to_org: DashMap<Ulid, Ulid>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared, compaction exclusively, so a snapshot never
    /// misses a record appended while it is being written.
    commit_gate: RwLock<()>,
    pub notify: Arc<InvalidationHub>,
}

/// Apply an event to its organization (caller holds the write lock).
fn apply_to_org(state: &mut OrganizationState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    let org = state.id;
    match event {
        Event::ProfileCreated(p) | Event::ProfileUpdated(p) => {
            entity_map.insert(p.id, org);
            state.profiles.insert(p.id, p.clone());
        }
        Event::PetCreated(p) | Event::PetUpdated(p) => {
            entity_map.insert(p.id, org);
            state.pets.insert(p.id, p.clone());
        }
        Event::PetDeleted { id, .. } => {
            state.pets.remove(id);
            entity_map.remove(id);
        }
        Event::ServiceCreated(s) => {
            entity_map.insert(s.id, org);
            state.services.insert(s.id, s.clone());
        }
        Event::BlockCreated(b) => {
            entity_map.insert(b.id, org);
            state.insert_block(b.clone());
        }
        Event::BlockDeleted { id, .. } => {
            state.remove_block(*id);
            entity_map.remove(id);
        }
        Event::AppointmentCreated(a) => {
            entity_map.insert(a.id, org);
            state.appointments.insert(a.id, a.clone());
        }
        Event::AppointmentStatusSet { id, status, .. } => {
            if let Some(a) = state.appointments.get_mut(id) {
                a.status = *status;
            }
        }
        Event::AppointmentCheckedIn { id, at, .. } => {
            if let Some(a) = state.appointments.get_mut(id) {
                a.actual_check_in = Some(at.clone());
            }
        }
        Event::AppointmentCheckedOut { id, at, .. } => {
            if let Some(a) = state.appointments.get_mut(id) {
                a.actual_check_out = Some(at.clone());
                a.status = AppointmentStatus::Done;
            }
        }
        Event::ChecklistReplaced { id, items, .. } => {
            if let Some(a) = state.appointments.get_mut(id) {
                a.checklist = items.clone();
            }
        }
    }
}

impl Store {
    /// Replay the WAL at `wal_path` and start its writer task.
    pub fn open(wal_path: PathBuf, notify: Arc<InvalidationHub>) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.discarded_tail {
            tracing::warn!(
                "discarding truncated tail of {} after {} bytes",
                wal_path.display(),
                replay.valid_len
            );
            Wal::truncate(&wal_path, replay.valid_len)?;
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            orgs: DashMap::new(),
            entity_to_org: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            notify,
        };

        // Sole owner of every partition here, so try_write never contends.
        // blocking_write would panic when opened from inside a runtime.
        for event in &replay.events {
            let shared = store.partition(event.organization_id());
            let Ok(mut guard) = shared.try_write() else {
                return Err(io::Error::other("replay: partition unexpectedly locked"));
            };
            apply_to_org(&mut guard, event, &store.entity_to_org);
        }
        tracing::info!(
            "replayed {} records across {} organizations",
            replay.events.len(),
            store.orgs.len()
        );
        Ok(store)
    }

    /// Get or lazily create an organization partition.
    fn partition(&self, organization_id: Ulid) -> SharedOrganizationState {
        if let Some(entry) = self.orgs.get(&organization_id) {
            return entry.value().clone();
        }
        let shared = self
            .orgs
            .entry(organization_id)
            .or_insert_with(|| Arc::new(RwLock::new(OrganizationState::new(organization_id))))
            .value()
            .clone();
        metrics::gauge!(crate::observability::ORGANIZATIONS_ACTIVE).set(self.orgs.len() as f64);
        shared
    }

    fn existing_partition(&self, organization_id: &Ulid) -> Option<SharedOrganizationState> {
        self.orgs.get(organization_id).map(|e| e.value().clone())
    }

    /// Organization an entity belongs to, if the entity exists.
    pub fn organization_of(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_org.get(entity_id).map(|e| *e.value())
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// WAL-append, apply, then invalidate dependent views.
    async fn persist_and_apply(
        &self,
        state: &mut OrganizationState,
        event: Event,
    ) -> Result<(), StoreError> {
        self.wal_append(&event).await?;
        apply_to_org(state, &event, &self.entity_to_org);
        self.notify.invalidate(state.id, event.invalidates());
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Rewrite the WAL with just the records needed to rebuild current state.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _exclusive = self.commit_gate.write().await;
        let mut events = Vec::new();
        let partitions: Vec<SharedOrganizationState> =
            self.orgs.iter().map(|e| e.value().clone()).collect();
        for shared in partitions {
            let state = shared.read().await;
            events.extend(state.profiles.values().cloned().map(Event::ProfileCreated));
            events.extend(state.services.values().cloned().map(Event::ServiceCreated));
            events.extend(state.pets.values().cloned().map(Event::PetCreated));
            events.extend(state.blocks.iter().cloned().map(Event::BlockCreated));
            events.extend(state.appointments.values().cloned().map(Event::AppointmentCreated));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }
}
