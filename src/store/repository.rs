use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Appointment, AppointmentPatch, NewAppointment};

use super::{Store, StoreError};

/// The appointment operations the wizard and the agenda depend on.
///
/// Reads are fallible too: an implementation backed by a remote document
/// store reports transport failures as [`StoreError::ReadFailed`].
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError>;

    /// Appointments of any status whose interval intersects `day`, ascending by date.
    async fn appointments_for_barber_on(
        &self,
        barber_id: Ulid,
        day: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Administrative create. Overlaps are allowed.
    async fn insert(&self, new: NewAppointment) -> Result<Ulid, StoreError>;

    /// Create only if the interval is free, as one atomic step.
    async fn book(&self, new: NewAppointment) -> Result<Ulid, StoreError>;

    async fn update(&self, id: Ulid, patch: AppointmentPatch) -> Result<Appointment, StoreError>;

    async fn delete(&self, id: Ulid) -> Result<(), StoreError>;
}

#[async_trait]
impl AppointmentRepository for Store {
    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.get_appointment(id).await)
    }

    async fn appointments_for_barber_on(
        &self,
        barber_id: Ulid,
        day: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(Store::appointments_for_barber_on(self, barber_id, day).await)
    }

    async fn insert(&self, new: NewAppointment) -> Result<Ulid, StoreError> {
        self.insert_appointment(new).await
    }

    async fn book(&self, new: NewAppointment) -> Result<Ulid, StoreError> {
        self.book_appointment(new).await
    }

    async fn update(&self, id: Ulid, patch: AppointmentPatch) -> Result<Appointment, StoreError> {
        self.update_appointment(id, patch).await
    }

    async fn delete(&self, id: Ulid) -> Result<(), StoreError> {
        self.delete_appointment(id).await
    }
}

#[async_trait]
impl<R: AppointmentRepository + ?Sized> AppointmentRepository for Arc<R> {
    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        (**self).get(id).await
    }

    async fn appointments_for_barber_on(
        &self,
        barber_id: Ulid,
        day: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        (**self).appointments_for_barber_on(barber_id, day).await
    }

    async fn insert(&self, new: NewAppointment) -> Result<Ulid, StoreError> {
        (**self).insert(new).await
    }

    async fn book(&self, new: NewAppointment) -> Result<Ulid, StoreError> {
        (**self).book(new).await
    }

    async fn update(&self, id: Ulid, patch: AppointmentPatch) -> Result<Appointment, StoreError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: Ulid) -> Result<(), StoreError> {
        (**self).delete(id).await
    }
}
