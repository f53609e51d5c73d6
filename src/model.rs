use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Whole minutes. Service and appointment durations are always expressed in minutes.
pub type Minutes = u32;

pub fn minutes(m: Minutes) -> TimeDelta {
    TimeDelta::minutes(i64::from(m))
}

/// Half-open wall-clock interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// The span occupied by something starting at `start` and lasting `duration` minutes.
    pub fn starting_at(start: NaiveDateTime, duration: Minutes) -> Self {
        Self::new(start, start + minutes(duration))
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Adjacent spans do not overlap: one may end exactly where the other starts.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    Cortes,
    Barba,
    Combos,
    Otros,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub category: ServiceCategory,
    /// Whole currency units.
    pub price: u64,
    pub duration: Minutes,
    pub description: Option<String>,
    pub active: bool,
}

impl Service {
    pub fn new(name: impl Into<String>, category: ServiceCategory, price: u64, duration: Minutes) -> Self {
        Self {
            id: Ulid::new(),
            name: name.into(),
            category,
            price,
            duration,
            description: None,
            active: true,
        }
    }
}

/// A professional who performs services. Scheduling conflicts are checked per member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Ulid,
    pub name: String,
    pub role: String,
    pub specialties: Vec<String>,
    /// 0.0 to 5.0.
    pub rating: f32,
    pub image: String,
    pub active: bool,
}

impl Member {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            name: name.into(),
            role: role.into(),
            specialties: Vec::new(),
            rating: 0.0,
            image: String::new(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub last_visit: Option<NaiveDateTime>,
    pub total_spent: u64,
    pub notes: Option<String>,
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    /// Whether an appointment in this status reserves the professional's time.
    pub fn occupies_schedule(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who an appointment was booked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientRef {
    /// Booked without an account.
    Guest,
    Registered(Ulid),
}

impl std::fmt::Display for ClientRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientRef::Guest => f.write_str("guest"),
            ClientRef::Registered(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub client: ClientRef,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub service_id: Ulid,
    pub barber_id: Ulid,
    pub date: NaiveDateTime,
    /// Copied from the service when the appointment was made.
    pub duration: Minutes,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn span(&self) -> Span {
        Span::starting_at(self.date, self.duration)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.date + minutes(self.duration)
    }

    pub fn occupies_schedule(&self) -> bool {
        self.status.occupies_schedule()
    }
}

/// An appointment before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub client: ClientRef,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub service_id: Ulid,
    pub barber_id: Ulid,
    pub date: NaiveDateTime,
    pub duration: Minutes,
    pub status: AppointmentStatus,
}

impl NewAppointment {
    /// A pending guest appointment whose duration is copied from `service`.
    pub fn for_service(
        service: &Service,
        barber_id: Ulid,
        date: NaiveDateTime,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            client: ClientRef::Guest,
            client_name: client_name.into(),
            client_phone: None,
            client_email: None,
            notes: None,
            service_id: service.id,
            barber_id,
            date,
            duration: service.duration,
            status: AppointmentStatus::Pending,
        }
    }

    pub fn span(&self) -> Span {
        Span::starting_at(self.date, self.duration)
    }

    pub fn with_id(self, id: Ulid) -> Appointment {
        Appointment {
            id,
            client: self.client,
            client_name: self.client_name,
            client_phone: self.client_phone,
            client_email: self.client_email,
            notes: self.notes,
            service_id: self.service_id,
            barber_id: self.barber_id,
            date: self.date,
            duration: self.duration,
            status: self.status,
        }
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentPatch {
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub service_id: Option<Ulid>,
    pub barber_id: Option<Ulid>,
    pub date: Option<NaiveDateTime>,
    pub duration: Option<Minutes>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn reschedule(barber_id: Ulid, date: NaiveDateTime) -> Self {
        Self {
            barber_id: Some(barber_id),
            date: Some(date),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, appt: &mut Appointment) {
        if let Some(v) = self.client_name {
            appt.client_name = v;
        }
        if let Some(v) = self.client_phone {
            appt.client_phone = Some(v);
        }
        if let Some(v) = self.client_email {
            appt.client_email = Some(v);
        }
        if let Some(v) = self.notes {
            appt.notes = Some(v);
        }
        if let Some(v) = self.service_id {
            appt.service_id = v;
        }
        if let Some(v) = self.barber_id {
            appt.barber_id = v;
        }
        if let Some(v) = self.date {
            appt.date = v;
        }
        if let Some(v) = self.duration {
            appt.duration = v;
        }
        if let Some(v) = self.status {
            appt.status = v;
        }
    }
}

// ── Journal events ───────────────────────────────────────────────

/// Which live collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Appointments,
    Services,
    Staff,
    Clients,
}

/// The event types, flat with no nesting. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ServiceSaved(Service),
    ServiceRemoved { id: Ulid },
    MemberSaved(Member),
    MemberRemoved { id: Ulid },
    ClientSaved(Client),
    ClientRemoved { id: Ulid },
    AppointmentCreated(Appointment),
    AppointmentUpdated {
        previous_barber: Ulid,
        appointment: Appointment,
    },
    AppointmentDeleted { id: Ulid, barber_id: Ulid },
}

impl Event {
    pub fn collection(&self) -> Collection {
        match self {
            Event::ServiceSaved(_) | Event::ServiceRemoved { .. } => Collection::Services,
            Event::MemberSaved(_) | Event::MemberRemoved { .. } => Collection::Staff,
            Event::ClientSaved(_) | Event::ClientRemoved { .. } => Collection::Clients,
            Event::AppointmentCreated(_)
            | Event::AppointmentUpdated { .. }
            | Event::AppointmentDeleted { .. } => Collection::Appointments,
        }
    }

    /// Id of the record the event touches.
    pub fn record_id(&self) -> Ulid {
        match self {
            Event::ServiceSaved(s) => s.id,
            Event::MemberSaved(m) => m.id,
            Event::ClientSaved(c) => c.id,
            Event::AppointmentCreated(a) | Event::AppointmentUpdated { appointment: a, .. } => a.id,
            Event::ServiceRemoved { id }
            | Event::MemberRemoved { id }
            | Event::ClientRemoved { id }
            | Event::AppointmentDeleted { id, .. } => *id,
        }
    }

    /// The appointment as it is after the event, if it still exists.
    pub fn appointment(&self) -> Option<&Appointment> {
        match self {
            Event::AppointmentCreated(a) | Event::AppointmentUpdated { appointment: a, .. } => Some(a),
            _ => None,
        }
    }
}
