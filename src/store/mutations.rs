use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{APPOINTMENT_WRITES_TOTAL, BOOKINGS_TOTAL, CATALOG_WRITES_TOTAL};

use super::conflict::{check_no_conflict, validate_appointment, validate_client, validate_member, validate_service};
use super::{Store, StoreError};

fn count_catalog_write(collection: &'static str, op: &'static str) {
    metrics::counter!(CATALOG_WRITES_TOTAL, "collection" => collection, "op" => op).increment(1);
}

fn count_appointment_write(op: &'static str) {
    metrics::counter!(APPOINTMENT_WRITES_TOTAL, "op" => op).increment(1);
}

impl Store {
    // ── Catalog ──────────────────────────────────────────────

    /// Create or replace a service.
    pub async fn put_service(&self, service: Service) -> Result<(), StoreError> {
        validate_service(&service)?;
        let _gate = self.commit_gate.read().await;
        let _writes = self.service_writes.lock().await;
        self.persist_catalog(&Event::ServiceSaved(service)).await?;
        count_catalog_write("services", "put");
        Ok(())
    }

    /// Appointments keep pointing at a removed service; readers fall back to a placeholder.
    pub async fn remove_service(&self, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let _writes = self.service_writes.lock().await;
        if !self.services.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.persist_catalog(&Event::ServiceRemoved { id }).await?;
        count_catalog_write("services", "remove");
        Ok(())
    }

    pub async fn put_member(&self, member: Member) -> Result<(), StoreError> {
        validate_member(&member)?;
        let _gate = self.commit_gate.read().await;
        let _writes = self.staff_writes.lock().await;
        self.persist_catalog(&Event::MemberSaved(member)).await?;
        count_catalog_write("staff", "put");
        Ok(())
    }

    pub async fn remove_member(&self, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let _writes = self.staff_writes.lock().await;
        if !self.staff.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.persist_catalog(&Event::MemberRemoved { id }).await?;
        count_catalog_write("staff", "remove");
        Ok(())
    }

    pub async fn put_client(&self, client: Client) -> Result<(), StoreError> {
        validate_client(&client)?;
        let _gate = self.commit_gate.read().await;
        let _writes = self.client_writes.lock().await;
        self.persist_catalog(&Event::ClientSaved(client)).await?;
        count_catalog_write("clients", "put");
        Ok(())
    }

    pub async fn remove_client(&self, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let _writes = self.client_writes.lock().await;
        if !self.clients.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.persist_catalog(&Event::ClientRemoved { id }).await?;
        count_catalog_write("clients", "remove");
        Ok(())
    }

    // ── Appointments ─────────────────────────────────────────

    /// Store an appointment as given. Overlaps are not checked: this is the
    /// administrative path, which may double-book on purpose.
    pub async fn insert_appointment(&self, new: NewAppointment) -> Result<Ulid, StoreError> {
        let appt = new.with_id(Ulid::new());
        validate_appointment(&appt)?;
        let id = appt.id;

        let _gate = self.commit_gate.read().await;
        let schedule = self.schedule(appt.barber_id);
        let mut guard = schedule.write().await;
        if guard.len() >= MAX_APPOINTMENTS_PER_BARBER {
            return Err(StoreError::LimitExceeded("too many appointments for professional"));
        }
        self.persist_and_apply(&mut guard, &Event::AppointmentCreated(appt))
            .await?;
        count_appointment_write("insert");
        Ok(id)
    }

    /// Store an appointment only if its interval is still free.
    ///
    /// The overlap check and the insert happen under the professional's
    /// schedule lock, so of two bookings racing for the same time exactly one
    /// succeeds; the other gets [`StoreError::SlotConflict`].
    pub async fn book_appointment(&self, new: NewAppointment) -> Result<Ulid, StoreError> {
        let result = self.book_inner(new).await;
        let outcome = match &result {
            Ok(_) => "booked",
            Err(StoreError::SlotConflict(_)) => "conflict",
            Err(_) => "rejected",
        };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn book_inner(&self, new: NewAppointment) -> Result<Ulid, StoreError> {
        let appt = new.with_id(Ulid::new());
        validate_appointment(&appt)?;
        let id = appt.id;

        let _gate = self.commit_gate.read().await;
        let schedule = self.schedule(appt.barber_id);
        let mut guard = schedule.write().await;
        if guard.len() >= MAX_APPOINTMENTS_PER_BARBER {
            return Err(StoreError::LimitExceeded("too many appointments for professional"));
        }
        if appt.occupies_schedule() {
            check_no_conflict(&guard, &appt.span())?;
        }
        self.persist_and_apply(&mut guard, &Event::AppointmentCreated(appt))
            .await?;
        count_appointment_write("book");
        tracing::debug!(%id, "appointment booked");
        Ok(id)
    }

    /// Apply a partial update and return the appointment as stored.
    ///
    /// Moving to another professional locks both schedules in id order and
    /// journals a single event for the move.
    pub async fn update_appointment(
        &self,
        id: Ulid,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        let _gate = self.commit_gate.read().await;

        // The lookup can race another move of the same appointment; retry a few times.
        for _ in 0..3 {
            let current = self.barber_of(&id).ok_or(StoreError::NotFound(id))?;
            let target = patch.barber_id.unwrap_or(current);

            if target == current {
                let schedule = self.schedule(current);
                let mut guard = schedule.write().await;
                let Some(existing) = guard.get(id).cloned() else {
                    continue;
                };
                if patch.is_empty() {
                    return Ok(existing);
                }
                let mut updated = existing;
                patch.clone().apply(&mut updated);
                validate_appointment(&updated)?;
                let event = Event::AppointmentUpdated {
                    previous_barber: current,
                    appointment: updated.clone(),
                };
                self.persist_and_apply(&mut guard, &event).await?;
                count_appointment_write("update");
                return Ok(updated);
            }

            let from = self.schedule(current);
            let to = self.schedule(target);
            // Lock in id order so two opposite moves can't deadlock.
            let (mut from_guard, mut to_guard) = if current < target {
                let f = from.write().await;
                let t = to.write().await;
                (f, t)
            } else {
                let t = to.write().await;
                let f = from.write().await;
                (f, t)
            };
            let Some(existing) = from_guard.get(id).cloned() else {
                continue;
            };
            if to_guard.len() >= MAX_APPOINTMENTS_PER_BARBER {
                return Err(StoreError::LimitExceeded("too many appointments for professional"));
            }
            let mut updated = existing;
            patch.clone().apply(&mut updated);
            validate_appointment(&updated)?;
            let event = Event::AppointmentUpdated {
                previous_barber: current,
                appointment: updated.clone(),
            };
            self.persist_and_apply_pair(&mut from_guard, &mut to_guard, &event)
                .await?;
            count_appointment_write("move");
            return Ok(updated);
        }
        Err(StoreError::NotFound(id))
    }

    pub async fn delete_appointment(&self, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let (barber_id, mut guard) = self.resolve_appointment_write(&id).await?;
        let event = Event::AppointmentDeleted { id, barber_id };
        self.persist_and_apply(&mut guard, &event).await?;
        count_appointment_write("delete");
        Ok(())
    }
}
