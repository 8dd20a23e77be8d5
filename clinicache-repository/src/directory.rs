//! Clinic and staff directory.

use clinicache_core::{
    Clinic, ClinicError, ClinicResult, ClinicUpdate, Domain, StaffUser, StorageError,
    TenantContext,
};
use clinicache_storage::ClinicStorage;

use crate::keys;
use crate::repository::CachedRepository;

impl<S: ClinicStorage> CachedRepository<S> {
    pub async fn get_clinic(&self, ctx: &TenantContext) -> ClinicResult<Clinic> {
        self.read(Domain::Directory, keys::CLINIC, ctx, || async move {
            self.storage
                .get_clinic(ctx.tenant_id)
                .await?
                .ok_or(ClinicError::Storage(StorageError::ClinicNotRegistered {
                    tenant_id: ctx.tenant_id,
                }))
        })
        .await
    }

    pub async fn list_staff(&self, ctx: &TenantContext) -> ClinicResult<Vec<StaffUser>> {
        self.read(Domain::Directory, keys::STAFF, ctx, || {
            self.storage.list_staff(ctx.tenant_id)
        })
        .await
    }

    pub async fn update_clinic(
        &self,
        ctx: &TenantContext,
        update: &ClinicUpdate,
    ) -> ClinicResult<Clinic> {
        self.write(
            Domain::Directory,
            ctx,
            "update_clinic",
            update,
            |update| self.storage.update_clinic(ctx.tenant_id, update),
            |_| keys::CLINIC.to_string(),
        )
        .await
    }
}
