//! Medical record operations.

use clinicache_core::{
    ClinicResult, Domain, EntityId, EntityType, MedicalRecord, MedicalRecordFilter,
    NewMedicalRecord, TenantContext,
};
use clinicache_storage::ClinicStorage;

use crate::keys;
use crate::repository::{found, CachedRepository};

impl<S: ClinicStorage> CachedRepository<S> {
    pub async fn list_medical_records(
        &self,
        ctx: &TenantContext,
        filter: &MedicalRecordFilter,
    ) -> ClinicResult<Vec<MedicalRecord>> {
        self.read(Domain::MedicalRecords, &keys::list(filter), ctx, || {
            self.storage.list_medical_records(ctx.tenant_id, filter)
        })
        .await
    }

    pub async fn get_medical_record(
        &self,
        ctx: &TenantContext,
        id: EntityId,
    ) -> ClinicResult<MedicalRecord> {
        self.read(Domain::MedicalRecords, &keys::detail(id), ctx, || async move {
            let record = self.storage.get_medical_record(ctx.tenant_id, id).await?;
            found(record, EntityType::MedicalRecord, id)
        })
        .await
    }

    pub async fn create_medical_record(
        &self,
        ctx: &TenantContext,
        new: &NewMedicalRecord,
    ) -> ClinicResult<MedicalRecord> {
        self.write(
            Domain::MedicalRecords,
            ctx,
            "create_medical_record",
            new,
            |new| self.storage.create_medical_record(ctx.tenant_id, new),
            |record| keys::detail(record.id),
        )
        .await
    }
}
