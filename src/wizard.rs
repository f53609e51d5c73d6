//! The public booking flow: service → professional → date and time → summary.
//!
//! [`BookingWizard`] is a plain value owned by one task. It holds the
//! customer's selection, keeps it consistent with the catalog snapshots it is
//! fed, tags every slot fetch so late answers for an old selection are
//! dropped, and commits through [`AppointmentRepository::book`].

use std::fmt;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use crate::availability::{format_slot, slots_for_day};
use crate::config::SchedulePolicy;
use crate::model::*;
use crate::observability::{SLOT_COMPUTE_DURATION_SECONDS, SLOT_QUERIES_TOTAL, STALE_SLOT_RESULTS_TOTAL};
use crate::store::{AppointmentRepository, StoreError};

/// Wizard steps, in the order the customer walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Service,
    Professional,
    DateTime,
    Summary,
    Success,
}

/// What the customer has picked so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub service_id: Option<Ulid>,
    pub professional_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl Selection {
    pub fn start(&self) -> Option<NaiveDateTime> {
        Some(self.date?.and_time(self.time?))
    }
}

/// Contact details collected on the summary step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerData {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub notes: Option<String>,
}

/// A slot fetch, tagged with the selection it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRequest {
    pub generation: u64,
    pub barber_id: Ulid,
    pub day: NaiveDate,
    pub service_duration: Minutes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDelivery {
    Applied,
    /// The selection moved on since the request was issued; nothing changed.
    Stale,
}

/// A slot fetch that did not complete. Not fatal: request again to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub message: String,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not load available times: {}", self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    NotRequested,
    Loading,
    Ready(Vec<NaiveDateTime>),
    FetchError(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingService,
    MissingProfessional,
    MissingDate,
    MissingTime,
    UnknownService(Ulid),
    UnknownProfessional(Ulid),
    DateOutOfRange(NaiveDate),
    /// The time is not among the loaded available slots.
    SlotUnavailable(NaiveTime),
    CannotGoBack(Step),
    WrongStep { expected: Step, actual: Step },
    /// A required contact field is blank.
    MissingContact(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingService => write!(f, "choose a service first"),
            ValidationError::MissingProfessional => write!(f, "choose a professional first"),
            ValidationError::MissingDate => write!(f, "choose a date first"),
            ValidationError::MissingTime => write!(f, "choose a time first"),
            ValidationError::UnknownService(id) => write!(f, "service {id} is not available"),
            ValidationError::UnknownProfessional(id) => write!(f, "professional {id} is not available"),
            ValidationError::DateOutOfRange(d) => write!(f, "{d} is outside the booking window"),
            ValidationError::SlotUnavailable(t) => write!(f, "{} is not available", t.format("%H:%M")),
            ValidationError::CannotGoBack(step) => write!(f, "cannot go back from {step:?}"),
            ValidationError::WrongStep { expected, actual } => {
                write!(f, "only allowed at {expected:?}, wizard is at {actual:?}")
            }
            ValidationError::MissingContact(field) => write!(f, "{field} is required"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    Validation(ValidationError),
    /// Someone else took an overlapping time first.
    SlotConflict(Ulid),
    Write(StoreError),
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingError::Validation(e) => write!(f, "{e}"),
            BookingError::SlotConflict(_) => write!(f, "that time was just booked, pick another"),
            BookingError::Write(e) => write!(f, "booking failed: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<ValidationError> for BookingError {
    fn from(e: ValidationError) -> Self {
        BookingError::Validation(e)
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SlotConflict(existing) => BookingError::SlotConflict(existing),
            other => BookingError::Write(other),
        }
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingContact(field));
    }
    Ok(value.to_string())
}

pub struct BookingWizard {
    policy: SchedulePolicy,
    client: ClientRef,
    services: Vec<Service>,
    staff: Vec<Member>,
    step: Step,
    selection: Selection,
    slots: SlotState,
    /// Bumped whenever loaded or in-flight slots stop matching the selection.
    generation: u64,
    booked: Option<Ulid>,
}

impl BookingWizard {
    /// A guest booking.
    pub fn new(policy: SchedulePolicy) -> Self {
        Self {
            policy,
            client: ClientRef::Guest,
            services: Vec::new(),
            staff: Vec::new(),
            step: Step::Service,
            selection: Selection::default(),
            slots: SlotState::NotRequested,
            generation: 0,
            booked: None,
        }
    }

    /// A booking attached to a registered client.
    pub fn for_client(policy: SchedulePolicy, client_id: Ulid) -> Self {
        Self {
            client: ClientRef::Registered(client_id),
            ..Self::new(policy)
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn slots(&self) -> &SlotState {
        &self.slots
    }

    /// Loaded slots as `"HH:MM"` labels. Empty unless slots are ready.
    pub fn slot_labels(&self) -> Vec<String> {
        match &self.slots {
            SlotState::Ready(slots) => slots.iter().copied().map(format_slot).collect(),
            _ => Vec::new(),
        }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn staff(&self) -> &[Member] {
        &self.staff
    }

    pub fn selected_service(&self) -> Option<&Service> {
        let id = self.selection.service_id?;
        self.services.iter().find(|s| s.id == id)
    }

    pub fn selected_professional(&self) -> Option<&Member> {
        let id = self.selection.professional_id?;
        self.staff.iter().find(|m| m.id == id)
    }

    /// Id of the appointment created by the last successful [`confirm`](Self::confirm).
    pub fn booked_id(&self) -> Option<Ulid> {
        self.booked
    }

    fn invalidate_slots(&mut self) {
        self.generation += 1;
        self.slots = SlotState::NotRequested;
        self.selection.time = None;
        self.rewind_to_valid_step();
    }

    /// Step back to the earliest step whose requirements no longer hold, so
    /// the wizard never sits past a step with a missing selection.
    fn rewind_to_valid_step(&mut self) {
        if self.step == Step::Success {
            return;
        }
        let earliest = if self.selection.service_id.is_none() {
            Step::Service
        } else if self.selection.professional_id.is_none() {
            Step::Professional
        } else if self.selection.start().is_none() {
            Step::DateTime
        } else {
            Step::Summary
        };
        if earliest < self.step {
            tracing::debug!(from = ?self.step, to = ?earliest, "selection invalidated, stepping back");
            self.step = earliest;
        }
    }

    fn require_step(&self, expected: Step) -> Result<(), ValidationError> {
        if self.step != expected {
            return Err(ValidationError::WrongStep {
                expected,
                actual: self.step,
            });
        }
        Ok(())
    }

    // ── Catalog snapshots ────────────────────────────────────

    /// Replace the services catalog. Only active services are offered.
    ///
    /// If the chosen service is gone it is deselected; if its duration
    /// changed, loaded slots no longer apply and are dropped.
    pub fn set_services(&mut self, services: Vec<Service>) {
        let before = self.selected_service().map(|s| s.duration);
        let mut services: Vec<Service> = services.into_iter().filter(|s| s.active).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        self.services = services;

        if self.selection.service_id.is_none() {
            return;
        }
        match self.selected_service().map(|s| s.duration) {
            None => {
                self.selection.service_id = None;
                self.invalidate_slots();
            }
            Some(duration) if Some(duration) != before => self.invalidate_slots(),
            Some(_) => {}
        }
    }

    /// Replace the staff catalog. Only active members are offered.
    pub fn set_staff(&mut self, staff: Vec<Member>) {
        let mut staff: Vec<Member> = staff.into_iter().filter(|m| m.active).collect();
        staff.sort_by(|a, b| a.name.cmp(&b.name));
        self.staff = staff;

        if self.selection.professional_id.is_some() && self.selected_professional().is_none() {
            self.selection.professional_id = None;
            self.invalidate_slots();
        }
    }

    // ── Selection ────────────────────────────────────────────

    pub fn select_service(&mut self, id: Ulid) -> Result<(), ValidationError> {
        self.require_step(Step::Service)?;
        if !self.services.iter().any(|s| s.id == id) {
            return Err(ValidationError::UnknownService(id));
        }
        if self.selection.service_id != Some(id) {
            self.selection.service_id = Some(id);
            self.invalidate_slots();
        }
        Ok(())
    }

    pub fn select_professional(&mut self, id: Ulid) -> Result<(), ValidationError> {
        self.require_step(Step::Professional)?;
        if !self.staff.iter().any(|m| m.id == id) {
            return Err(ValidationError::UnknownProfessional(id));
        }
        if self.selection.professional_id != Some(id) {
            self.selection.professional_id = Some(id);
            self.invalidate_slots();
        }
        Ok(())
    }

    /// Pick a day in `[today, today + horizon)`.
    pub fn select_date(&mut self, date: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
        self.require_step(Step::DateTime)?;
        if !self.policy.within_horizon(date, today) {
            return Err(ValidationError::DateOutOfRange(date));
        }
        if self.selection.date != Some(date) {
            self.selection.date = Some(date);
            self.invalidate_slots();
        }
        Ok(())
    }

    /// Pick one of the currently loaded slots.
    pub fn select_time(&mut self, time: NaiveTime) -> Result<(), ValidationError> {
        self.require_step(Step::DateTime)?;
        if self.selection.date.is_none() {
            return Err(ValidationError::MissingDate);
        }
        match &self.slots {
            SlotState::Ready(slots) if slots.iter().any(|s| s.time() == time) => {
                self.selection.time = Some(time);
                Ok(())
            }
            _ => Err(ValidationError::SlotUnavailable(time)),
        }
    }

    // ── Slots ────────────────────────────────────────────────

    /// Start a slot fetch for the current selection. Any earlier request becomes stale.
    pub fn slot_request(&mut self) -> Result<SlotRequest, ValidationError> {
        let service_id = self.selection.service_id.ok_or(ValidationError::MissingService)?;
        let barber_id = self
            .selection
            .professional_id
            .ok_or(ValidationError::MissingProfessional)?;
        let day = self.selection.date.ok_or(ValidationError::MissingDate)?;
        let service_duration = self
            .selected_service()
            .ok_or(ValidationError::UnknownService(service_id))?
            .duration;

        self.generation += 1;
        self.slots = SlotState::Loading;
        Ok(SlotRequest {
            generation: self.generation,
            barber_id,
            day,
            service_duration,
        })
    }

    fn is_current(&self, request: &SlotRequest) -> bool {
        request.generation == self.generation
            && self.selection.professional_id == Some(request.barber_id)
            && self.selection.date == Some(request.day)
            && self.selected_service().map(|s| s.duration) == Some(request.service_duration)
    }

    /// Deliver the appointments fetched for `request`.
    pub fn receive_slots(
        &mut self,
        request: SlotRequest,
        fetched: Result<Vec<Appointment>, StoreError>,
        now: NaiveDateTime,
    ) -> SlotDelivery {
        if !self.is_current(&request) {
            metrics::counter!(STALE_SLOT_RESULTS_TOTAL).increment(1);
            tracing::debug!(generation = request.generation, current = self.generation, "dropping stale slots");
            return SlotDelivery::Stale;
        }

        let appointments = match fetched {
            Ok(appointments) => appointments,
            Err(e) => {
                tracing::warn!(day = %request.day, "slot fetch failed: {e}");
                self.slots = SlotState::FetchError(FetchError { message: e.to_string() });
                return SlotDelivery::Applied;
            }
        };

        let started = Instant::now();
        let slots = slots_for_day(
            request.day,
            &self.policy,
            request.service_duration,
            &appointments,
            request.barber_id,
            now,
        );
        metrics::counter!(SLOT_QUERIES_TOTAL).increment(1);
        metrics::histogram!(SLOT_COMPUTE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        if let Some(time) = self.selection.time
            && !slots.iter().any(|s| s.time() == time)
        {
            self.selection.time = None;
            self.rewind_to_valid_step();
        }
        self.slots = SlotState::Ready(slots);
        SlotDelivery::Applied
    }

    /// Request, fetch and receive in one go. A failed read is recorded as
    /// [`SlotState::FetchError`], not returned.
    pub async fn load_slots(
        &mut self,
        repo: &dyn AppointmentRepository,
        now: NaiveDateTime,
    ) -> Result<SlotDelivery, ValidationError> {
        let request = self.slot_request()?;
        let fetched = repo
            .appointments_for_barber_on(request.barber_id, request.day)
            .await;
        Ok(self.receive_slots(request, fetched, now))
    }

    // ── Navigation ───────────────────────────────────────────

    pub fn next(&mut self) -> Result<Step, ValidationError> {
        let next = match self.step {
            Step::Service => {
                self.selection.service_id.ok_or(ValidationError::MissingService)?;
                Step::Professional
            }
            Step::Professional => {
                self.selection
                    .professional_id
                    .ok_or(ValidationError::MissingProfessional)?;
                Step::DateTime
            }
            Step::DateTime => {
                self.selection.date.ok_or(ValidationError::MissingDate)?;
                self.selection.time.ok_or(ValidationError::MissingTime)?;
                Step::Summary
            }
            // Leaving the summary takes a successful confirm.
            Step::Summary | Step::Success => {
                return Err(ValidationError::WrongStep {
                    expected: Step::DateTime,
                    actual: self.step,
                });
            }
        };
        self.step = next;
        Ok(next)
    }

    pub fn back(&mut self) -> Result<Step, ValidationError> {
        let prev = match self.step {
            Step::Professional => Step::Service,
            Step::DateTime => Step::Professional,
            Step::Summary => Step::DateTime,
            Step::Service | Step::Success => return Err(ValidationError::CannotGoBack(self.step)),
        };
        self.step = prev;
        Ok(prev)
    }

    /// Start over with an empty selection. The catalog is kept.
    pub fn reset(&mut self) {
        self.step = Step::Service;
        self.selection = Selection::default();
        self.booked = None;
        self.invalidate_slots();
    }

    // ── Commit ───────────────────────────────────────────────

    /// Book the selection for `customer`. On failure the wizard stays on the
    /// summary with its selection intact, so the customer can retry.
    pub async fn confirm(
        &mut self,
        repo: &dyn AppointmentRepository,
        customer: CustomerData,
    ) -> Result<Ulid, BookingError> {
        self.require_step(Step::Summary)?;

        let name = required(&customer.name, "name")?;
        let phone = required(&customer.phone, "phone")?;
        let email = required(&customer.email, "email")?;
        let notes = customer
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let service = self.selected_service().ok_or(ValidationError::MissingService)?;
        let barber_id = self
            .selected_professional()
            .ok_or(ValidationError::MissingProfessional)?
            .id;
        let date = self.selection.start().ok_or(ValidationError::MissingTime)?;

        let new = NewAppointment {
            client: self.client,
            client_name: name,
            client_phone: Some(phone),
            client_email: Some(email),
            notes,
            service_id: service.id,
            barber_id,
            date,
            duration: service.duration,
            status: AppointmentStatus::Pending,
        };

        match repo.book(new).await {
            Ok(id) => {
                tracing::info!(%id, %barber_id, %date, client = %self.client, "booking confirmed");
                self.booked = Some(id);
                self.step = Step::Success;
                Ok(id)
            }
            Err(e) => {
                tracing::info!(%barber_id, %date, "booking not confirmed: {e}");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeDelta;

    use crate::store::Store;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Early morning, so no slot of `today()` is in the past.
    fn morning() -> NaiveDateTime {
        today().and_time(hm(8, 0))
    }

    fn corte() -> Service {
        Service::new("Corte Clásico", ServiceCategory::Cortes, 15_000, 45)
    }

    fn juan() -> Member {
        Member::new("Juan Pérez", "Master Barber")
    }

    fn wizard_with(service: &Service, member: &Member) -> BookingWizard {
        let mut w = BookingWizard::new(SchedulePolicy::default());
        w.set_services(vec![service.clone()]);
        w.set_staff(vec![member.clone()]);
        w
    }

    /// Drive a wizard to the date/time step with slots loaded for `today()`.
    fn at_date_time(service: &Service, member: &Member, booked: Vec<Appointment>) -> BookingWizard {
        let mut w = wizard_with(service, member);
        w.select_service(service.id).unwrap();
        w.next().unwrap();
        w.select_professional(member.id).unwrap();
        w.next().unwrap();
        w.select_date(today(), today()).unwrap();
        let req = w.slot_request().unwrap();
        assert_eq!(w.receive_slots(req, Ok(booked), morning()), SlotDelivery::Applied);
        w
    }

    fn customer() -> CustomerData {
        CustomerData {
            name: "Julián Riedinger".into(),
            phone: "1122334455".into(),
            email: "julian@example.com".into(),
            notes: None,
        }
    }

    struct Unreachable;

    #[async_trait]
    impl AppointmentRepository for Unreachable {
        async fn get(&self, _id: Ulid) -> Result<Option<Appointment>, StoreError> {
            Err(StoreError::ReadFailed("offline".into()))
        }
        async fn appointments_for_barber_on(
            &self,
            _barber_id: Ulid,
            _day: NaiveDate,
        ) -> Result<Vec<Appointment>, StoreError> {
            Err(StoreError::ReadFailed("offline".into()))
        }
        async fn insert(&self, _new: NewAppointment) -> Result<Ulid, StoreError> {
            Err(StoreError::WriteFailed("offline".into()))
        }
        async fn book(&self, _new: NewAppointment) -> Result<Ulid, StoreError> {
            Err(StoreError::WriteFailed("offline".into()))
        }
        async fn update(&self, id: Ulid, _patch: AppointmentPatch) -> Result<Appointment, StoreError> {
            Err(StoreError::NotFound(id))
        }
        async fn delete(&self, id: Ulid) -> Result<(), StoreError> {
            Err(StoreError::NotFound(id))
        }
    }

    /// Reads fail until `failures` runs out, then see an empty schedule.
    struct FlakyReads {
        failures: AtomicUsize,
    }

    #[async_trait]
    impl AppointmentRepository for FlakyReads {
        async fn get(&self, _id: Ulid) -> Result<Option<Appointment>, StoreError> {
            Ok(None)
        }
        async fn appointments_for_barber_on(
            &self,
            _barber_id: Ulid,
            _day: NaiveDate,
        ) -> Result<Vec<Appointment>, StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::ReadFailed("connection reset".into()));
            }
            Ok(Vec::new())
        }
        async fn insert(&self, _new: NewAppointment) -> Result<Ulid, StoreError> {
            Ok(Ulid::new())
        }
        async fn book(&self, _new: NewAppointment) -> Result<Ulid, StoreError> {
            Ok(Ulid::new())
        }
        async fn update(&self, id: Ulid, _patch: AppointmentPatch) -> Result<Appointment, StoreError> {
            Err(StoreError::NotFound(id))
        }
        async fn delete(&self, _id: Ulid) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn test_journal_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("turnero_test_wizard");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn catalog_keeps_active_records_by_name() {
        let mut hidden = Service::new("Afeitado", ServiceCategory::Barba, 9_000, 30);
        hidden.active = false;
        let mut w = BookingWizard::new(SchedulePolicy::default());
        w.set_services(vec![
            Service::new("Perfilado de Barba", ServiceCategory::Barba, 12_000, 30),
            hidden.clone(),
            corte(),
        ]);
        let names: Vec<_> = w.services().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Corte Clásico", "Perfilado de Barba"]);
        assert_eq!(w.select_service(hidden.id), Err(ValidationError::UnknownService(hidden.id)));
    }

    #[test]
    fn forward_guards_require_fields() {
        let (service, member) = (corte(), juan());
        let mut w = wizard_with(&service, &member);

        assert_eq!(w.next(), Err(ValidationError::MissingService));
        w.select_service(service.id).unwrap();
        assert_eq!(w.next(), Ok(Step::Professional));

        assert_eq!(w.next(), Err(ValidationError::MissingProfessional));
        assert_eq!(w.step(), Step::Professional);
        w.select_professional(member.id).unwrap();
        assert_eq!(w.next(), Ok(Step::DateTime));

        assert_eq!(w.next(), Err(ValidationError::MissingDate));
    }

    #[test]
    fn date_without_time_cannot_advance() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());

        assert_eq!(w.next(), Err(ValidationError::MissingTime));
        assert_eq!(w.step(), Step::DateTime);
        w.select_time(hm(10, 0)).unwrap();
        assert_eq!(w.next(), Ok(Step::Summary));
    }

    #[test]
    fn selection_requires_matching_step() {
        let (service, member) = (corte(), juan());
        let mut w = wizard_with(&service, &member);
        assert_eq!(
            w.select_professional(member.id),
            Err(ValidationError::WrongStep {
                expected: Step::Professional,
                actual: Step::Service
            })
        );
        assert!(w.select_date(today(), today()).is_err());
    }

    #[test]
    fn back_then_forward_restores_state() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(12, 30)).unwrap();
        w.next().unwrap();

        let selection = w.selection().clone();
        let slots = w.slots().clone();

        assert_eq!(w.back(), Ok(Step::DateTime));
        assert_eq!(w.back(), Ok(Step::Professional));
        assert_eq!(w.back(), Ok(Step::Service));
        assert_eq!(w.back(), Err(ValidationError::CannotGoBack(Step::Service)));
        for _ in 0..3 {
            w.next().unwrap();
        }
        assert_eq!(w.step(), Step::Summary);
        assert_eq!(w.selection(), &selection);
        assert_eq!(w.slots(), &slots);
    }

    #[test]
    fn changing_professional_clears_time_but_reselecting_does_not() {
        let (service, member) = (corte(), juan());
        let other = Member::new("Carlos Rodríguez", "Barbero Senior");
        let mut w = at_date_time(&service, &member, Vec::new());
        w.set_staff(vec![member.clone(), other.clone()]);
        w.select_time(hm(11, 0)).unwrap();

        w.back().unwrap();
        w.select_professional(member.id).unwrap();
        assert_eq!(w.selection().time, Some(hm(11, 0)));
        assert!(matches!(w.slots(), SlotState::Ready(_)));

        w.select_professional(other.id).unwrap();
        assert_eq!(w.selection().time, None);
        assert_eq!(w.slots(), &SlotState::NotRequested);
        assert_eq!(w.selection().date, Some(today()));
    }

    #[test]
    fn date_limited_to_horizon() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        let last = today() + TimeDelta::days(13);
        w.select_date(last, today()).unwrap();
        let beyond = today() + TimeDelta::days(14);
        assert_eq!(w.select_date(beyond, today()), Err(ValidationError::DateOutOfRange(beyond)));
        let yesterday = today() - TimeDelta::days(1);
        assert!(w.select_date(yesterday, today()).is_err());
        assert_eq!(w.selection().date, Some(last));
    }

    #[test]
    fn time_must_be_a_loaded_slot() {
        let (service, member) = (corte(), juan());
        let existing = NewAppointment::for_service(&service, member.id, today().and_time(hm(11, 0)), "Ana")
            .with_id(Ulid::new());
        let mut w = at_date_time(&service, &member, vec![existing]);

        assert_eq!(w.select_time(hm(11, 0)), Err(ValidationError::SlotUnavailable(hm(11, 0))));
        assert_eq!(w.select_time(hm(10, 15)), Err(ValidationError::SlotUnavailable(hm(10, 15))));
        // 45 min ending at 11:45 → 12:00 is free, 11:30 is not
        assert!(w.select_time(hm(11, 30)).is_err());
        w.select_time(hm(12, 0)).unwrap();
        assert!(!w.slot_labels().contains(&"11:00".to_string()));
    }

    #[test]
    fn late_slot_result_is_discarded() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        let tomorrow = today() + TimeDelta::days(1);

        let old = w.slot_request().unwrap();
        w.select_date(tomorrow, today()).unwrap();
        let current = w.slot_request().unwrap();

        let busy = NewAppointment::for_service(&service, member.id, today().and_time(hm(10, 0)), "Ana")
            .with_id(Ulid::new());
        assert_eq!(w.receive_slots(old, Ok(vec![busy]), morning()), SlotDelivery::Stale);
        assert_eq!(w.slots(), &SlotState::Loading);

        assert_eq!(w.receive_slots(current, Ok(Vec::new()), morning()), SlotDelivery::Applied);
        assert_eq!(w.slot_labels().len(), 20);
    }

    #[test]
    fn fetch_error_is_recorded_and_retryable() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());

        let req = w.slot_request().unwrap();
        let failed = w.receive_slots(req, Err(StoreError::ReadFailed("timeout".into())), morning());
        assert_eq!(failed, SlotDelivery::Applied);
        assert!(matches!(w.slots(), SlotState::FetchError(_)));
        assert!(w.select_time(hm(10, 0)).is_err());

        let retry = w.slot_request().unwrap();
        w.receive_slots(retry, Ok(Vec::new()), morning());
        w.select_time(hm(10, 0)).unwrap();
    }

    #[tokio::test]
    async fn failed_read_is_recorded_and_retry_recovers() {
        let (service, member) = (corte(), juan());
        let repo = FlakyReads {
            failures: AtomicUsize::new(1),
        };
        let mut w = wizard_with(&service, &member);
        w.select_service(service.id).unwrap();
        w.next().unwrap();
        w.select_professional(member.id).unwrap();
        w.next().unwrap();
        w.select_date(today(), today()).unwrap();

        assert_eq!(w.load_slots(&repo, morning()).await, Ok(SlotDelivery::Applied));
        match w.slots() {
            SlotState::FetchError(e) => assert!(e.message.contains("connection reset"), "{e}"),
            other => panic!("expected a fetch error, got {other:?}"),
        }
        assert_eq!(w.select_time(hm(10, 0)), Err(ValidationError::SlotUnavailable(hm(10, 0))));
        assert_eq!(w.step(), Step::DateTime);

        assert_eq!(w.load_slots(&repo, morning()).await, Ok(SlotDelivery::Applied));
        assert_eq!(w.slot_labels().len(), 20);
        w.select_time(hm(10, 0)).unwrap();
        assert_eq!(w.next(), Ok(Step::Summary));
    }

    #[tokio::test]
    async fn unreachable_store_shows_fetch_error() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.load_slots(&Unreachable, morning()).await.unwrap();
        assert!(matches!(w.slots(), SlotState::FetchError(_)));
    }

    #[test]
    fn catalog_change_on_summary_steps_back() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(15, 0)).unwrap();
        assert_eq!(w.next(), Ok(Step::Summary));

        // A longer service no longer fits the loaded slots: pick a time again.
        let mut longer = service.clone();
        longer.duration = 60;
        w.set_services(vec![longer.clone()]);
        assert_eq!(w.step(), Step::DateTime);
        assert_eq!(w.selection().service_id, Some(service.id));
        assert_eq!(w.selection().time, None);
        assert_eq!(w.next(), Err(ValidationError::MissingTime));

        w.set_staff(Vec::new());
        assert_eq!(w.step(), Step::Professional);
        assert_eq!(w.selection().professional_id, None);

        w.set_services(Vec::new());
        assert_eq!(w.step(), Step::Service);
        assert_eq!(w.selection().service_id, None);
    }

    #[test]
    fn retired_professional_on_summary_steps_back() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(11, 0)).unwrap();
        w.next().unwrap();

        let mut retired = member.clone();
        retired.active = false;
        w.set_staff(vec![retired]);
        assert_eq!(w.step(), Step::Professional);
        assert_eq!(w.selection().date, Some(today()));
        assert_eq!(w.selection().time, None);
    }

    #[tokio::test]
    async fn taken_time_on_summary_steps_back() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(15, 0)).unwrap();
        w.next().unwrap();

        let taken = NewAppointment::for_service(&service, member.id, today().and_time(hm(15, 0)), "Ana")
            .with_id(Ulid::new());
        let req = w.slot_request().unwrap();
        w.receive_slots(req, Ok(vec![taken]), morning());
        assert_eq!(w.step(), Step::DateTime);
        assert_eq!(w.selection().time, None);

        let err = w.confirm(&Unreachable, customer()).await.unwrap_err();
        assert_eq!(
            err,
            BookingError::Validation(ValidationError::WrongStep {
                expected: Step::Summary,
                actual: Step::DateTime
            })
        );
    }

    #[test]
    fn refreshed_slots_drop_a_taken_time() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(15, 0)).unwrap();

        let taken = NewAppointment::for_service(&service, member.id, today().and_time(hm(15, 0)), "Ana")
            .with_id(Ulid::new());
        let req = w.slot_request().unwrap();
        w.receive_slots(req, Ok(vec![taken]), morning());
        assert_eq!(w.selection().time, None);
    }

    #[test]
    fn past_slots_hidden_for_today() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        let req = w.slot_request().unwrap();
        w.receive_slots(req, Ok(Vec::new()), today().and_time(hm(15, 10)));
        assert_eq!(w.slot_labels().first().map(String::as_str), Some("15:30"));
    }

    #[test]
    fn service_retired_mid_flow_is_deselected() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(10, 0)).unwrap();

        let mut retired = service.clone();
        retired.active = false;
        w.set_services(vec![retired]);
        assert_eq!(w.selection().service_id, None);
        assert_eq!(w.selection().time, None);
    }

    #[tokio::test]
    async fn confirm_validates_contact_data() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(10, 0)).unwrap();
        w.next().unwrap();

        let mut missing_email = customer();
        missing_email.email = "  ".into();
        let err = w.confirm(&Unreachable, missing_email).await.unwrap_err();
        assert_eq!(err, BookingError::Validation(ValidationError::MissingContact("email")));
        assert_eq!(w.step(), Step::Summary);
    }

    #[tokio::test]
    async fn write_failure_keeps_summary() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.select_time(hm(10, 0)).unwrap();
        w.next().unwrap();
        let selection = w.selection().clone();

        let err = w.confirm(&Unreachable, customer()).await.unwrap_err();
        assert!(matches!(err, BookingError::Write(StoreError::WriteFailed(_))));
        assert_eq!(w.step(), Step::Summary);
        assert_eq!(w.selection(), &selection);
    }

    #[tokio::test]
    async fn confirm_books_pending_guest_appointment() {
        let store = Arc::new(Store::open(&test_journal_path("confirm.journal")).unwrap());
        let (service, member) = (corte(), juan());
        store.put_service(service.clone()).await.unwrap();
        store.put_member(member.clone()).await.unwrap();

        let mut w = wizard_with(&service, &member);
        w.select_service(service.id).unwrap();
        w.next().unwrap();
        w.select_professional(member.id).unwrap();
        w.next().unwrap();
        w.select_date(today(), today()).unwrap();
        w.load_slots(&store, morning()).await.unwrap();
        w.select_time(hm(18, 30)).unwrap();
        w.next().unwrap();

        let id = w
            .confirm(
                &store,
                CustomerData {
                    notes: Some("  ".into()),
                    ..customer()
                },
            )
            .await
            .unwrap();
        assert_eq!(w.step(), Step::Success);
        assert_eq!(w.booked_id(), Some(id));
        assert!(w.back().is_err());
        // A finished booking is not undone by later catalog changes.
        w.set_services(Vec::new());
        assert_eq!(w.step(), Step::Success);

        let appt = store.get_appointment(id).await.unwrap();
        assert_eq!(appt.status, AppointmentStatus::Pending);
        assert_eq!(appt.client, ClientRef::Guest);
        assert_eq!(appt.duration, 45);
        assert_eq!(appt.date, today().and_time(hm(18, 30)));
        assert_eq!(appt.notes, None);
    }

    #[tokio::test]
    async fn second_customer_gets_conflict() {
        let store = Arc::new(Store::open(&test_journal_path("confirm_conflict.journal")).unwrap());
        let (service, member) = (corte(), juan());

        let mut first = at_date_time(&service, &member, Vec::new());
        let mut second = BookingWizard::for_client(SchedulePolicy::default(), Ulid::new());
        second.set_services(vec![service.clone()]);
        second.set_staff(vec![member.clone()]);
        second.select_service(service.id).unwrap();
        second.next().unwrap();
        second.select_professional(member.id).unwrap();
        second.next().unwrap();
        second.select_date(today(), today()).unwrap();
        let req = second.slot_request().unwrap();
        second.receive_slots(req, Ok(Vec::new()), morning());

        for w in [&mut first, &mut second] {
            w.select_time(hm(16, 0)).unwrap();
            w.next().unwrap();
        }

        let won = first.confirm(&store, customer()).await.unwrap();
        let lost = second.confirm(&store, customer()).await.unwrap_err();
        assert_eq!(lost, BookingError::SlotConflict(won));
        assert_eq!(second.step(), Step::Summary);

        // After going back, reloading slots no longer offers the taken time.
        second.back().unwrap();
        second.load_slots(&store, morning()).await.unwrap();
        assert_eq!(second.selection().time, None);
        assert!(!second.slot_labels().contains(&"16:00".to_string()));
    }

    #[test]
    fn reset_starts_fresh() {
        let (service, member) = (corte(), juan());
        let mut w = at_date_time(&service, &member, Vec::new());
        w.reset();
        assert_eq!(w.step(), Step::Service);
        assert_eq!(w.selection(), &Selection::default());
        assert_eq!(w.services().len(), 1);
    }
}
