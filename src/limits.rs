use crate::model::Minutes;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_CONTACT_LEN: usize = 254;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_DESCRIPTION_LEN: usize = 2_000;
pub const MAX_SPECIALTIES: usize = 32;

/// Longest single appointment or service.
pub const MAX_DURATION_MINUTES: Minutes = 12 * 60;

pub const MAX_RATING: f32 = 5.0;

pub const MAX_APPOINTMENTS_PER_BARBER: usize = 100_000;

/// Widest window a range query or live feed may ask for.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;
