use chrono::TimeDelta;
use ulid::Ulid;

use crate::limits::MAX_DURATION_MINUTES;
use crate::model::{Appointment, Span};

/// One professional's appointments, cancelled ones included, sorted by `date`.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub barber_id: Ulid,
    pub appointments: Vec<Appointment>,
}

impl Schedule {
    pub fn new(barber_id: Ulid) -> Self {
        Self {
            barber_id,
            appointments: Vec::new(),
        }
    }

    /// Insert maintaining sort order by date.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.date <= appointment.date);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    /// Appointments whose occupied interval overlaps `query`, any status.
    ///
    /// Both bounds come from binary search: nothing starting at or after
    /// `query.end` can overlap, and no stored appointment is longer than
    /// `MAX_DURATION_MINUTES`, so nothing starting earlier than that before
    /// `query.start` can reach it.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self.appointments.partition_point(|a| a.date < query.end);
        let left_bound = match query
            .start
            .checked_sub_signed(TimeDelta::minutes(MAX_DURATION_MINUTES as i64))
        {
            Some(earliest) => self.appointments.partition_point(|a| a.date < earliest),
            None => 0,
        };
        self.appointments[left_bound.min(right_bound)..right_bound]
            .iter()
            .filter(move |a| a.end() > query.start)
    }

    /// Overlapping appointments that actually hold the professional's time.
    pub fn occupying(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        self.overlapping(query).filter(|a| a.occupies_schedule())
    }
}
