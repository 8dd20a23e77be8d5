//! Appointment operations. Write-through under the default policy table.

use clinicache_core::{
    Appointment, AppointmentFilter, AppointmentStatus, ClinicResult, Domain, EntityId,
    EntityType, NewAppointment, TenantContext,
};
use clinicache_storage::ClinicStorage;

use crate::keys;
use crate::repository::{found, CachedRepository};

impl<S: ClinicStorage> CachedRepository<S> {
    pub async fn list_appointments(
        &self,
        ctx: &TenantContext,
        filter: &AppointmentFilter,
    ) -> ClinicResult<Vec<Appointment>> {
        self.read(
            Domain::Appointments,
            &keys::appointment_list(filter),
            ctx,
            || self.storage.list_appointments(ctx.tenant_id, filter),
        )
        .await
    }

    pub async fn get_appointment(
        &self,
        ctx: &TenantContext,
        id: EntityId,
    ) -> ClinicResult<Appointment> {
        self.read(Domain::Appointments, &keys::detail(id), ctx, || async move {
            let appointment = self.storage.get_appointment(ctx.tenant_id, id).await?;
            found(appointment, EntityType::Appointment, id)
        })
        .await
    }

    pub async fn create_appointment(
        &self,
        ctx: &TenantContext,
        new: &NewAppointment,
    ) -> ClinicResult<Appointment> {
        self.write(
            Domain::Appointments,
            ctx,
            "create_appointment",
            new,
            |new| self.storage.create_appointment(ctx.tenant_id, new),
            |appointment| keys::detail(appointment.id),
        )
        .await
    }

    pub async fn update_appointment_status(
        &self,
        ctx: &TenantContext,
        id: EntityId,
        status: AppointmentStatus,
    ) -> ClinicResult<Appointment> {
        self.write(
            Domain::Appointments,
            ctx,
            "update_appointment_status",
            status,
            |status| {
                self.storage
                    .update_appointment_status(ctx.tenant_id, id, status)
            },
            |appointment| keys::detail(appointment.id),
        )
        .await
    }

    pub async fn delete_appointment(
        &self,
        ctx: &TenantContext,
        id: EntityId,
    ) -> ClinicResult<bool> {
        self.write_direct(
            Domain::Appointments,
            keys::detail(id),
            ctx,
            "delete_appointment",
            self.storage.delete_appointment(ctx.tenant_id, id),
        )
        .await
    }
}
