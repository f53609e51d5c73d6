//! Back-office view of one day's appointments.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::availability::day_window;
use crate::model::*;
use crate::store::{AppointmentQuery, AppointmentRepository, Feed, ServiceQuery, StaffQuery, Store, StoreError};

/// Client name used when the admin leaves it blank.
pub const DEFAULT_CLIENT_NAME: &str = "Cliente";
const UNKNOWN_SERVICE: &str = "Servicio eliminado";
const UNKNOWN_MEMBER: &str = "Profesional eliminado";

/// One row of the agenda: an appointment with its display names joined in.
#[derive(Debug, Clone, PartialEq)]
pub struct AgendaEntry {
    pub appointment: Appointment,
    pub service_name: String,
    pub barber_name: String,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySummary {
    pub pending: usize,
    pub confirmed: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Sum of current service prices over appointments that are not cancelled.
    pub expected_revenue: u64,
}

impl DaySummary {
    pub fn count(&self, status: AppointmentStatus) -> usize {
        match status {
            AppointmentStatus::Pending => self.pending,
            AppointmentStatus::Confirmed => self.confirmed,
            AppointmentStatus::Completed => self.completed,
            AppointmentStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> usize {
        AppointmentStatus::ALL.iter().map(|s| self.count(*s)).sum()
    }
}

/// Admin-entered appointment. Duration comes from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentForm {
    pub service_id: Ulid,
    pub barber_id: Ulid,
    pub date: NaiveDateTime,
    pub client: ClientRef,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

/// Which feed delivered the change seen by [`Agenda::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgendaChange {
    Appointments,
    Services,
    Staff,
}

enum Update {
    Appointments(Vec<Appointment>),
    Services(Vec<Service>),
    Staff(Vec<Member>),
}

fn day_query(day: NaiveDate) -> AppointmentQuery {
    let window = day_window(day);
    AppointmentQuery::DateRange {
        start: window.start,
        end: window.end,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct Agenda {
    store: Arc<Store>,
    day: NaiveDate,
    appointments_feed: Feed<AppointmentQuery>,
    services_feed: Feed<ServiceQuery>,
    staff_feed: Feed<StaffQuery>,
    appointments: Vec<Appointment>,
    services: HashMap<Ulid, Service>,
    staff: HashMap<Ulid, Member>,
}

impl Agenda {
    /// Subscribe to `day` and the catalogs, and load the first snapshots.
    pub async fn open(store: Arc<Store>, day: NaiveDate) -> Result<Self, StoreError> {
        let mut appointments_feed = store.subscribe(day_query(day))?;
        // Inactive records stay visible: old appointments still reference them.
        let mut services_feed = store.subscribe(ServiceQuery { active_only: false })?;
        let mut staff_feed = store.subscribe(StaffQuery { active_only: false })?;

        let appointments = appointments_feed.next().await.unwrap_or_default();
        let services = services_feed.next().await.unwrap_or_default();
        let staff = staff_feed.next().await.unwrap_or_default();

        Ok(Self {
            store,
            day,
            appointments_feed,
            services_feed,
            staff_feed,
            appointments,
            services: services.into_iter().map(|s| (s.id, s)).collect(),
            staff: staff.into_iter().map(|m| (m.id, m)).collect(),
        })
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Show another day.
    pub async fn select_day(&mut self, day: NaiveDate) -> Result<(), StoreError> {
        if day == self.day {
            return Ok(());
        }
        self.appointments_feed = self.store.subscribe(day_query(day))?;
        self.appointments = self.appointments_feed.next().await.unwrap_or_default();
        self.day = day;
        Ok(())
    }

    /// Wait for the next change to the day or the catalogs and apply it.
    /// Returns `None` once the store is gone.
    pub async fn refresh(&mut self) -> Option<AgendaChange> {
        let update = tokio::select! {
            a = self.appointments_feed.next() => a.map(Update::Appointments),
            s = self.services_feed.next() => s.map(Update::Services),
            m = self.staff_feed.next() => m.map(Update::Staff),
        };

        Some(match update? {
            Update::Appointments(list) => {
                self.appointments = list;
                AgendaChange::Appointments
            }
            Update::Services(list) => {
                self.services = list.into_iter().map(|s| (s.id, s)).collect();
                AgendaChange::Services
            }
            Update::Staff(list) => {
                self.staff = list.into_iter().map(|m| (m.id, m)).collect();
                AgendaChange::Staff
            }
        })
    }

    /// The day's appointments by start time, with names joined from the catalog.
    pub fn entries(&self) -> Vec<AgendaEntry> {
        let mut entries: Vec<AgendaEntry> = self
            .appointments
            .iter()
            .map(|a| AgendaEntry {
                service_name: self
                    .services
                    .get(&a.service_id)
                    .map_or_else(|| UNKNOWN_SERVICE.to_string(), |s| s.name.clone()),
                barber_name: self
                    .staff
                    .get(&a.barber_id)
                    .map_or_else(|| UNKNOWN_MEMBER.to_string(), |m| m.name.clone()),
                end: a.end(),
                appointment: a.clone(),
            })
            .collect();
        entries.sort_by_key(|e| (e.appointment.date, e.appointment.id));
        entries
    }

    pub fn summary(&self) -> DaySummary {
        let mut summary = DaySummary::default();
        for a in &self.appointments {
            match a.status {
                AppointmentStatus::Pending => summary.pending += 1,
                AppointmentStatus::Confirmed => summary.confirmed += 1,
                AppointmentStatus::Completed => summary.completed += 1,
                AppointmentStatus::Cancelled => summary.cancelled += 1,
            }
            if a.occupies_schedule()
                && let Some(service) = self.services.get(&a.service_id)
            {
                summary.expected_revenue += service.price;
            }
        }
        summary
    }

    fn repo(&self) -> &dyn AppointmentRepository {
        &*self.store
    }

    fn service(&self, id: Ulid) -> Result<&Service, StoreError> {
        self.services.get(&id).ok_or(StoreError::NotFound(id))
    }

    // ── Writes ───────────────────────────────────────────────
    //
    // Changes show up in the agenda on the next refresh.

    /// Create an appointment. Overlaps with existing ones are allowed.
    pub async fn create(&self, form: AppointmentForm) -> Result<Ulid, StoreError> {
        let service = self.service(form.service_id)?;
        let name = form.client_name.trim();
        let new = NewAppointment {
            client: form.client,
            client_name: if name.is_empty() {
                DEFAULT_CLIENT_NAME.to_string()
            } else {
                name.to_string()
            },
            client_phone: non_blank(form.client_phone),
            client_email: non_blank(form.client_email),
            notes: non_blank(form.notes),
            service_id: service.id,
            barber_id: form.barber_id,
            date: form.date,
            duration: service.duration,
            status: form.status,
        };
        let id = self.repo().insert(new).await?;
        tracing::info!(%id, "agenda: appointment created");
        Ok(id)
    }

    /// Apply a field edit. Switching service without an explicit duration
    /// takes the new service's duration.
    pub async fn update(&self, id: Ulid, mut patch: AppointmentPatch) -> Result<Appointment, StoreError> {
        if let Some(service_id) = patch.service_id
            && patch.duration.is_none()
        {
            patch.duration = Some(self.service(service_id)?.duration);
        }
        self.repo().update(id, patch).await
    }

    pub async fn reschedule(
        &self,
        id: Ulid,
        barber_id: Ulid,
        date: NaiveDateTime,
    ) -> Result<Appointment, StoreError> {
        self.repo()
            .update(id, AppointmentPatch::reschedule(barber_id, date))
            .await
    }

    pub async fn set_status(&self, id: Ulid, status: AppointmentStatus) -> Result<Appointment, StoreError> {
        let updated = self.repo().update(id, AppointmentPatch::status(status)).await?;
        tracing::info!(%id, %status, "agenda: status changed");
        Ok(updated)
    }

    pub async fn delete(&self, id: Ulid) -> Result<(), StoreError> {
        self.repo().delete(id).await?;
        tracing::info!(%id, "agenda: appointment deleted");
        Ok(())
    }
}
