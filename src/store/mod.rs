mod conflict;
mod error;
pub mod live;
mod mutations;
mod queries;
mod repository;
mod schedule;

pub use error::StoreError;
pub use live::{AppointmentQuery, ClientQuery, Feed, LiveQuery, ServiceQuery, StaffQuery};
pub use repository::AppointmentRepository;
pub use schedule::Schedule;

use std::io;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedSchedule = Arc<RwLock<Schedule>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
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

/// Background task that owns the journal and batches appends for group commit:
/// take every append already queued behind the first one, write them all,
/// fsync once, then answer every sender with the shared result.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    let mut batch: Vec<PendingAppend> = Vec::new();
    while let Some(cmd) = rx.recv().await {
        let mut next = Some(cmd);
        while let Some(cmd) = next.take() {
            match cmd {
                JournalCommand::Append { event, response } => {
                    batch.push((event, response));
                    next = rx.try_recv().ok();
                }
                other => {
                    // Appends queued before a non-append command commit first.
                    commit_batch(&mut journal, &mut batch);
                    handle_non_append(&mut journal, other);
                }
            }
        }
        commit_batch(&mut journal, &mut batch);
    }
}

fn commit_batch(journal: &mut Journal, batch: &mut Vec<PendingAppend>) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let appended = batch
        .iter()
        .try_for_each(|(event, _)| journal.append_buffered(event));
    // Always flush, even after a failed append, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flushed = journal.flush_sync();
    let result = appended.and(flushed);

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("journal commit of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_snapshot(journal.path(), &events)
                .and_then(|()| journal.swap_snapshot());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => {}
    }
}

/// In-process document store for the catalog and appointments.
///
/// Appointments live in one [`Schedule`] per professional, each behind its own
/// lock, so a booking can check for conflicts and insert without racing other
/// writers for the same professional. Every change is journaled before it is
/// applied and then broadcast on the [`NotifyHub`].
pub struct Store {
    pub(super) schedules: DashMap<Ulid, SharedSchedule>,
    /// Reverse lookup: appointment id → professional id.
    pub(super) appointment_barber: DashMap<Ulid, Ulid>,
    pub(super) services: DashMap<Ulid, Service>,
    pub(super) staff: DashMap<Ulid, Member>,
    pub(super) clients: DashMap<Ulid, Client>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so its
    /// snapshot never misses an event that is journaled but not yet applied.
    pub(super) commit_gate: RwLock<()>,
    /// One per catalog collection, held across journal + apply so records
    /// land in memory in the order they were journaled.
    pub(super) service_writes: Mutex<()>,
    pub(super) staff_writes: Mutex<()>,
    pub(super) client_writes: Mutex<()>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an appointment event to one schedule (caller holds the lock).
fn apply_to_schedule(schedule: &mut Schedule, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::AppointmentCreated(appt) => {
            if appt.barber_id == schedule.barber_id {
                schedule.insert(appt.clone());
                index.insert(appt.id, appt.barber_id);
            }
        }
        Event::AppointmentUpdated { appointment, .. } => {
            schedule.remove(appointment.id);
            if appointment.barber_id == schedule.barber_id {
                schedule.insert(appointment.clone());
                index.insert(appointment.id, appointment.barber_id);
            }
        }
        Event::AppointmentDeleted { id, .. } => {
            schedule.remove(*id);
            index.remove(id);
        }
        // Catalog events never touch schedules
        _ => {}
    }
}

/// Professionals whose schedules an appointment event touches.
fn event_barbers(event: &Event) -> Vec<Ulid> {
    match event {
        Event::AppointmentCreated(a) => vec![a.barber_id],
        Event::AppointmentUpdated {
            previous_barber,
            appointment,
        } if *previous_barber != appointment.barber_id => vec![*previous_barber, appointment.barber_id],
        Event::AppointmentUpdated { appointment, .. } => vec![appointment.barber_id],
        Event::AppointmentDeleted { barber_id, .. } => vec![*barber_id],
        _ => Vec::new(),
    }
}

impl Store {
    /// Open the store journaled at `path`, replaying its history.
    /// Spawns the journal writer, so it must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (journal, events) = Journal::open(path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = Self {
            schedules: DashMap::new(),
            appointment_barber: DashMap::new(),
            services: DashMap::new(),
            staff: DashMap::new(),
            clients: DashMap::new(),
            journal_tx,
            commit_gate: RwLock::new(()),
            service_writes: Mutex::new(()),
            staff_writes: Mutex::new(()),
            client_writes: Mutex::new(()),
            notify: Arc::new(NotifyHub::new()),
        };

        // Replay: we're the sole owner of these locks, so try_write always
        // succeeds instantly. Never block here: this may run inside a runtime.
        for event in &events {
            store.apply_catalog(event);
            for barber in event_barbers(event) {
                let schedule = store.schedule(barber);
                if let Ok(mut guard) = schedule.try_write() {
                    apply_to_schedule(&mut guard, event, &store.appointment_barber);
                }
            }
        }
        tracing::info!(
            events = events.len(),
            services = store.services.len(),
            staff = store.staff.len(),
            appointments = store.appointment_barber.len(),
            "store opened at {}",
            path.display()
        );

        Ok(store)
    }

    fn apply_catalog(&self, event: &Event) {
        match event {
            Event::ServiceSaved(s) => {
                self.services.insert(s.id, s.clone());
            }
            Event::ServiceRemoved { id } => {
                self.services.remove(id);
            }
            Event::MemberSaved(m) => {
                self.staff.insert(m.id, m.clone());
            }
            Event::MemberRemoved { id } => {
                self.staff.remove(id);
            }
            Event::ClientSaved(c) => {
                self.clients.insert(c.id, c.clone());
            }
            Event::ClientRemoved { id } => {
                self.clients.remove(id);
            }
            Event::AppointmentCreated(_)
            | Event::AppointmentUpdated { .. }
            | Event::AppointmentDeleted { .. } => {}
        }
    }

    /// Write event to the journal via the background group-commit writer.
    async fn journal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WriteFailed("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WriteFailed("journal writer dropped response".into()))?
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
    }

    /// The professional's schedule, created empty on first use.
    pub(super) fn schedule(&self, barber_id: Ulid) -> SharedSchedule {
        self.schedules
            .entry(barber_id)
            .or_insert_with(|| Arc::new(RwLock::new(Schedule::new(barber_id))))
            .clone()
    }

    /// Existing schedules only, snapshotted so no map guard is held across an await.
    pub(super) fn all_schedules(&self) -> Vec<SharedSchedule> {
        self.schedules.iter().map(|e| e.value().clone()).collect()
    }

    pub(super) fn barber_of(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_barber.get(appointment_id).map(|e| *e.value())
    }

    /// Journal + apply + notify for an event confined to one schedule.
    pub(super) async fn persist_and_apply(
        &self,
        schedule: &mut Schedule,
        event: &Event,
    ) -> Result<(), StoreError> {
        self.journal_append(event).await?;
        apply_to_schedule(schedule, event, &self.appointment_barber);
        self.notify.send(event);
        Ok(())
    }

    /// Journal + apply + notify for an appointment moving between two schedules.
    pub(super) async fn persist_and_apply_pair(
        &self,
        from: &mut Schedule,
        to: &mut Schedule,
        event: &Event,
    ) -> Result<(), StoreError> {
        self.journal_append(event).await?;
        apply_to_schedule(from, event, &self.appointment_barber);
        apply_to_schedule(to, event, &self.appointment_barber);
        self.notify.send(event);
        Ok(())
    }

    /// Journal + apply + notify for a catalog event.
    pub(super) async fn persist_catalog(&self, event: &Event) -> Result<(), StoreError> {
        self.journal_append(event).await?;
        self.apply_catalog(event);
        self.notify.send(event);
        Ok(())
    }

    /// Lookup appointment → professional, acquire that schedule's write lock,
    /// and confirm the appointment is still there once the lock is held.
    pub(super) async fn resolve_appointment_write(
        &self,
        id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<Schedule>), StoreError> {
        // An admin move between professionals can race the lookup; retry a few times.
        for _ in 0..3 {
            let barber_id = self.barber_of(id).ok_or(StoreError::NotFound(*id))?;
            let guard = self.schedule(barber_id).write_owned().await;
            if guard.contains(*id) {
                return Ok((barber_id, guard));
            }
        }
        Err(StoreError::NotFound(*id))
    }

    pub async fn compact_journal(&self) -> Result<(), StoreError> {
        let _gate = self.commit_gate.write().await;

        let mut events: Vec<Event> = Vec::new();
        events.extend(self.services.iter().map(|e| Event::ServiceSaved(e.value().clone())));
        events.extend(self.staff.iter().map(|e| Event::MemberSaved(e.value().clone())));
        events.extend(self.clients.iter().map(|e| Event::ClientSaved(e.value().clone())));
        for schedule in self.all_schedules() {
            let guard = schedule.read().await;
            events.extend(guard.appointments.iter().cloned().map(Event::AppointmentCreated));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WriteFailed("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WriteFailed("journal writer dropped response".into()))?
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        tracing::info!(events = count, "journal compacted");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
