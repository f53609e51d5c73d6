use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::availability::day_window;
use crate::limits::*;
use crate::model::*;

use super::{SharedSchedule, Store, StoreError};

fn by_name<T>(items: &mut [T], name: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| name(a).cmp(name(b)));
}

/// A non-empty window no wider than `MAX_QUERY_WINDOW_DAYS`.
pub(super) fn check_window(start: NaiveDateTime, end: NaiveDateTime) -> Result<(), StoreError> {
    if start >= end {
        return Err(StoreError::Invalid("range start must be before end"));
    }
    if (end - start).num_days() > MAX_QUERY_WINDOW_DAYS {
        return Err(StoreError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

impl Store {
    /// The professional's schedule if one exists. Reads never create schedules.
    pub(super) fn existing_schedule(&self, barber_id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(barber_id).map(|e| e.value().clone())
    }

    pub async fn get_appointment(&self, id: Ulid) -> Option<Appointment> {
        let barber_id = self.barber_of(&id)?;
        let schedule = self.existing_schedule(&barber_id)?;
        let guard = schedule.read().await;
        guard.get(id).cloned()
    }

    /// The professional's appointments, any status, whose interval intersects `span`.
    pub async fn appointments_for_barber_in(&self, barber_id: Ulid, span: &Span) -> Vec<Appointment> {
        let Some(schedule) = self.existing_schedule(&barber_id) else {
            return Vec::new();
        };
        let guard = schedule.read().await;
        guard.overlapping(span).cloned().collect()
    }

    pub async fn appointments_for_barber_on(&self, barber_id: Ulid, day: NaiveDate) -> Vec<Appointment> {
        self.appointments_for_barber_in(barber_id, &day_window(day))
            .await
    }

    /// Every appointment matching `keep`, unordered.
    pub(super) async fn collect_appointments(
        &self,
        keep: impl Fn(&Appointment) -> bool,
    ) -> Vec<Appointment> {
        let mut out = Vec::new();
        for schedule in self.all_schedules() {
            let guard = schedule.read().await;
            out.extend(guard.appointments.iter().filter(|a| keep(a)).cloned());
        }
        out
    }

    pub(super) async fn appointments_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<Appointment> {
        let mut out = self
            .collect_appointments(|a| a.date >= start && a.date < end)
            .await;
        out.sort_by_key(|a| (a.date, a.id));
        out
    }

    /// Appointments of every professional with `date` in `[start, end)`, ascending.
    pub async fn appointments_in_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Appointment>, StoreError> {
        check_window(start, end)?;
        Ok(self.appointments_between(start, end).await)
    }

    pub async fn appointments_on(&self, day: NaiveDate) -> Vec<Appointment> {
        let window = day_window(day);
        self.appointments_between(window.start, window.end).await
    }

    /// Newest first.
    pub async fn all_appointments(&self) -> Vec<Appointment> {
        let mut out = self.collect_appointments(|_| true).await;
        out.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        out
    }

    // ── Catalog ──────────────────────────────────────────────

    pub fn get_service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    /// All services, inactive included, ordered by name.
    pub fn list_services(&self) -> Vec<Service> {
        let mut out: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        by_name(&mut out, |s| s.name.as_str());
        out
    }

    pub fn active_services(&self) -> Vec<Service> {
        let mut out = self.list_services();
        out.retain(|s| s.active);
        out
    }

    pub fn get_member(&self, id: &Ulid) -> Option<Member> {
        self.staff.get(id).map(|e| e.value().clone())
    }

    pub fn list_staff(&self) -> Vec<Member> {
        let mut out: Vec<Member> = self.staff.iter().map(|e| e.value().clone()).collect();
        by_name(&mut out, |m| m.name.as_str());
        out
    }

    pub fn active_staff(&self) -> Vec<Member> {
        let mut out = self.list_staff();
        out.retain(|m| m.active);
        out
    }

    pub fn get_client(&self, id: &Ulid) -> Option<Client> {
        self.clients.get(id).map(|e| e.value().clone())
    }

    /// Best customers first.
    pub fn list_clients(&self) -> Vec<Client> {
        let mut out: Vec<Client> = self.clients.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| {
            b.total_spent
                .cmp(&a.total_spent)
                .then_with(|| a.full_name.cmp(&b.full_name))
        });
        out
    }

    pub fn catalog_is_empty(&self) -> bool {
        self.services.is_empty() && self.staff.is_empty()
    }
}
