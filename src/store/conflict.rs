use crate::limits::*;
use crate::model::*;

use super::schedule::Schedule;
use super::StoreError;

fn check_len(value: &str, max: usize, msg: &'static str) -> Result<(), StoreError> {
    if value.len() > max {
        return Err(StoreError::LimitExceeded(msg));
    }
    Ok(())
}

fn check_opt_len(value: Option<&String>, max: usize, msg: &'static str) -> Result<(), StoreError> {
    value.map_or(Ok(()), |v| check_len(v, max, msg))
}

/// Record-level rules every appointment write must satisfy, whichever path it takes.
pub(crate) fn validate_appointment(appt: &Appointment) -> Result<(), StoreError> {
    if appt.client_name.trim().is_empty() {
        return Err(StoreError::Invalid("client name is required"));
    }
    check_len(&appt.client_name, MAX_NAME_LEN, "client name too long")?;
    check_opt_len(appt.client_phone.as_ref(), MAX_CONTACT_LEN, "phone too long")?;
    check_opt_len(appt.client_email.as_ref(), MAX_CONTACT_LEN, "email too long")?;
    check_opt_len(appt.notes.as_ref(), MAX_NOTES_LEN, "notes too long")?;
    if appt.duration == 0 {
        return Err(StoreError::Invalid("duration must be positive"));
    }
    if appt.duration > MAX_DURATION_MINUTES {
        return Err(StoreError::LimitExceeded("appointment too long"));
    }
    Ok(())
}

pub(crate) fn validate_service(service: &Service) -> Result<(), StoreError> {
    if service.name.trim().is_empty() {
        return Err(StoreError::Invalid("service name is required"));
    }
    check_len(&service.name, MAX_NAME_LEN, "service name too long")?;
    check_opt_len(service.description.as_ref(), MAX_DESCRIPTION_LEN, "description too long")?;
    if service.duration == 0 {
        return Err(StoreError::Invalid("duration must be positive"));
    }
    if service.duration > MAX_DURATION_MINUTES {
        return Err(StoreError::LimitExceeded("service too long"));
    }
    Ok(())
}

pub(crate) fn validate_member(member: &Member) -> Result<(), StoreError> {
    if member.name.trim().is_empty() {
        return Err(StoreError::Invalid("member name is required"));
    }
    check_len(&member.name, MAX_NAME_LEN, "member name too long")?;
    check_len(&member.role, MAX_NAME_LEN, "role too long")?;
    if member.specialties.len() > MAX_SPECIALTIES {
        return Err(StoreError::LimitExceeded("too many specialties"));
    }
    if !(0.0..=MAX_RATING).contains(&member.rating) {
        return Err(StoreError::Invalid("rating must be between 0 and 5"));
    }
    Ok(())
}

pub(crate) fn validate_client(client: &Client) -> Result<(), StoreError> {
    if client.full_name.trim().is_empty() {
        return Err(StoreError::Invalid("client name is required"));
    }
    check_len(&client.full_name, MAX_NAME_LEN, "client name too long")?;
    check_len(&client.email, MAX_CONTACT_LEN, "email too long")?;
    check_len(&client.phone, MAX_CONTACT_LEN, "phone too long")?;
    check_opt_len(client.notes.as_ref(), MAX_NOTES_LEN, "notes too long")?;
    Ok(())
}

/// Reject `span` if it overlaps any appointment that holds the professional's time.
pub(crate) fn check_no_conflict(schedule: &Schedule, span: &Span) -> Result<(), StoreError> {
    match schedule.occupying(span).next() {
        Some(existing) => Err(StoreError::SlotConflict(existing.id)),
        None => Ok(()),
    }
}
