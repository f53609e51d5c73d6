//! Live queries: a feed yields the full matching set, then yields it again
//! every time a change could have altered it.
//!
//! Feeds are built from the store's broadcast channels. A change seen on the
//! channel only marks the feed dirty; the next call to [`Feed::next`] takes a
//! fresh snapshot. If the receiver lags behind the channel, the feed assumes
//! something relevant changed and re-snapshots as well.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use ulid::Ulid;

use crate::model::*;
use crate::observability::LIVE_FEEDS_ACTIVE;

use super::queries::check_window;
use super::{Store, StoreError};

#[async_trait]
pub trait LiveQuery: Send + Sync {
    type Item: Clone + Send;

    fn collection(&self) -> Collection;

    /// Checked once when the feed is opened.
    fn validate(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Whether `event` may change the result. `delivered` holds the ids in
    /// the last set handed out, so removals and moves out of the set count.
    fn affected_by(&self, event: &Event, delivered: &HashSet<Ulid>) -> bool;

    async fn snapshot(&self, store: &Store) -> Vec<Self::Item>;

    fn id_of(item: &Self::Item) -> Ulid;
}

/// Filters over the appointments collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentQuery {
    ById(Ulid),
    /// `date` in `[start, end)`, every professional, ascending.
    DateRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// One professional, `date` in `[start, end)`, ascending.
    Barber {
        barber_id: Ulid,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// Everything, newest first.
    All,
}

impl AppointmentQuery {
    fn matches(&self, appt: &Appointment) -> bool {
        match *self {
            AppointmentQuery::ById(id) => appt.id == id,
            AppointmentQuery::DateRange { start, end } => appt.date >= start && appt.date < end,
            AppointmentQuery::Barber {
                barber_id,
                start,
                end,
            } => appt.barber_id == barber_id && appt.date >= start && appt.date < end,
            AppointmentQuery::All => true,
        }
    }
}

#[async_trait]
impl LiveQuery for AppointmentQuery {
    type Item = Appointment;

    fn collection(&self) -> Collection {
        Collection::Appointments
    }

    /// Date windows follow the same bounds as [`Store::appointments_in_range`].
    fn validate(&self) -> Result<(), StoreError> {
        match *self {
            AppointmentQuery::DateRange { start, end }
            | AppointmentQuery::Barber { start, end, .. } => check_window(start, end),
            AppointmentQuery::ById(_) | AppointmentQuery::All => Ok(()),
        }
    }

    fn affected_by(&self, event: &Event, delivered: &HashSet<Ulid>) -> bool {
        if delivered.contains(&event.record_id()) {
            return true;
        }
        event.appointment().is_some_and(|a| self.matches(a))
    }

    async fn snapshot(&self, store: &Store) -> Vec<Appointment> {
        match *self {
            AppointmentQuery::ById(id) => store.get_appointment(id).await.into_iter().collect(),
            AppointmentQuery::DateRange { start, end } => store.appointments_between(start, end).await,
            AppointmentQuery::Barber {
                barber_id,
                start,
                end,
            } => {
                let mut out = store
                    .appointments_for_barber_in(barber_id, &Span::new(start, end))
                    .await;
                out.retain(|a| self.matches(a));
                out
            }
            AppointmentQuery::All => store.all_appointments().await,
        }
    }

    fn id_of(item: &Appointment) -> Ulid {
        item.id
    }
}

/// Services ordered by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceQuery {
    pub active_only: bool,
}

#[async_trait]
impl LiveQuery for ServiceQuery {
    type Item = Service;

    fn collection(&self) -> Collection {
        Collection::Services
    }

    fn affected_by(&self, _event: &Event, _delivered: &HashSet<Ulid>) -> bool {
        true
    }

    async fn snapshot(&self, store: &Store) -> Vec<Service> {
        if self.active_only {
            store.active_services()
        } else {
            store.list_services()
        }
    }

    fn id_of(item: &Service) -> Ulid {
        item.id
    }
}

/// Staff ordered by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaffQuery {
    pub active_only: bool,
}

#[async_trait]
impl LiveQuery for StaffQuery {
    type Item = Member;

    fn collection(&self) -> Collection {
        Collection::Staff
    }

    fn affected_by(&self, _event: &Event, _delivered: &HashSet<Ulid>) -> bool {
        true
    }

    async fn snapshot(&self, store: &Store) -> Vec<Member> {
        if self.active_only {
            store.active_staff()
        } else {
            store.list_staff()
        }
    }

    fn id_of(item: &Member) -> Ulid {
        item.id
    }
}

/// Clients, highest total spent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientQuery;

#[async_trait]
impl LiveQuery for ClientQuery {
    type Item = Client;

    fn collection(&self) -> Collection {
        Collection::Clients
    }

    fn affected_by(&self, _event: &Event, _delivered: &HashSet<Ulid>) -> bool {
        true
    }

    async fn snapshot(&self, store: &Store) -> Vec<Client> {
        store.list_clients()
    }

    fn id_of(item: &Client) -> Ulid {
        item.id
    }
}

/// A subscription to one live query. Dropping it unsubscribes.
pub struct Feed<Q: LiveQuery> {
    store: Weak<Store>,
    query: Q,
    rx: broadcast::Receiver<Event>,
    delivered: HashSet<Ulid>,
    dirty: bool,
}

impl<Q: LiveQuery> Feed<Q> {
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Wait for the next result set. The first call returns immediately.
    /// Returns `None` once the store has shut down.
    ///
    /// Cancel-safe: a change observed by a cancelled call is delivered by the next one.
    pub async fn next(&mut self) -> Option<Vec<Q::Item>> {
        loop {
            if self.dirty {
                let store = self.store.upgrade()?;
                let items = self.query.snapshot(&store).await;
                self.delivered = items.iter().map(Q::id_of).collect();
                self.dirty = false;
                return Some(items);
            }
            match self.rx.recv().await {
                Ok(event) => {
                    if self.query.affected_by(&event, &self.delivered) {
                        self.dirty = true;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "live feed lagged, re-snapshotting");
                    self.dirty = true;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl<Q: LiveQuery> Drop for Feed<Q> {
    fn drop(&mut self) {
        metrics::gauge!(LIVE_FEEDS_ACTIVE).decrement(1.0);
    }
}

impl Store {
    /// Open a live feed. The feed holds only a weak reference to the store.
    ///
    /// Fails with [`StoreError::Invalid`] or [`StoreError::LimitExceeded`]
    /// for an empty or over-wide date window.
    pub fn subscribe<Q: LiveQuery>(self: &Arc<Self>, query: Q) -> Result<Feed<Q>, StoreError> {
        query.validate()?;
        let rx = self.notify.subscribe(query.collection());
        metrics::gauge!(LIVE_FEEDS_ACTIVE).increment(1.0);
        Ok(Feed {
            store: Arc::downgrade(self),
            query,
            rx,
            delivered: HashSet::new(),
            dirty: true,
        })
    }
}
