//! A deliberately broken `ClinicStorage`.
//!
//! Contact and appointment reads ignore the tenant, the bug the isolation
//! harness exists to catch. Every other operation delegates unchanged.

use async_trait::async_trait;
use clinicache_core::{
    AnalyticsSummary, Appointment, AppointmentFilter, AppointmentStatus, Clinic, ClinicResult,
    ClinicUpdate, Contact, ContactFilter, ContactUpdate, Conversation, ConversationFilter,
    DateRange, EntityId, MedicalRecord, MedicalRecordFilter, NewAppointment, NewContact,
    NewConversation, NewMedicalRecord, StaffUser, TenantId, Timestamp,
};
use clinicache_storage::{ClinicStorage, InMemoryClinicStore};
use std::sync::Arc;

/// Store whose contact and appointment reads have lost their tenant filter.
#[derive(Debug, Clone)]
pub struct LeakyStore {
    inner: Arc<InMemoryClinicStore>,
}

impl LeakyStore {
    pub fn new(inner: Arc<InMemoryClinicStore>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<InMemoryClinicStore> {
        &self.inner
    }
}

#[async_trait]
impl ClinicStorage for LeakyStore {
    // === Leaking reads ===

    async fn list_contacts(
        &self,
        _tenant: TenantId,
        filter: &ContactFilter,
    ) -> ClinicResult<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self
            .inner
            .all_contacts()?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(contacts)
    }

    async fn get_contact(&self, _tenant: TenantId, id: EntityId) -> ClinicResult<Option<Contact>> {
        Ok(self.inner.all_contacts()?.into_iter().find(|c| c.id == id))
    }

    async fn list_appointments(
        &self,
        _tenant: TenantId,
        filter: &AppointmentFilter,
    ) -> ClinicResult<Vec<Appointment>> {
        let mut appointments: Vec<Appointment> = self
            .inner
            .all_appointments()?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();
        appointments.sort_by_key(|a| a.scheduled_at);
        Ok(appointments)
    }

    async fn get_appointment(
        &self,
        _tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<Appointment>> {
        Ok(self.inner.all_appointments()?.into_iter().find(|a| a.id == id))
    }

    // === Delegated ===

    async fn create_contact(&self, tenant: TenantId, new: &NewContact) -> ClinicResult<Contact> {
        self.inner.create_contact(tenant, new).await
    }

    async fn update_contact(
        &self,
        tenant: TenantId,
        id: EntityId,
        update: &ContactUpdate,
    ) -> ClinicResult<Contact> {
        self.inner.update_contact(tenant, id, update).await
    }

    async fn delete_contact(&self, tenant: TenantId, id: EntityId) -> ClinicResult<bool> {
        self.inner.delete_contact(tenant, id).await
    }

    async fn search_contacts_by_phone(
        &self,
        tenant: TenantId,
        phone: &str,
    ) -> ClinicResult<Vec<Contact>> {
        self.inner.search_contacts_by_phone(tenant, phone).await
    }

    async fn merge_contacts(
        &self,
        tenant: TenantId,
        primary: EntityId,
        duplicate: EntityId,
    ) -> ClinicResult<Contact> {
        self.inner.merge_contacts(tenant, primary, duplicate).await
    }

    async fn count_contacts(&self, tenant: TenantId) -> ClinicResult<u64> {
        self.inner.count_contacts(tenant).await
    }

    async fn create_appointment(
        &self,
        tenant: TenantId,
        new: &NewAppointment,
    ) -> ClinicResult<Appointment> {
        self.inner.create_appointment(tenant, new).await
    }

    async fn update_appointment_status(
        &self,
        tenant: TenantId,
        id: EntityId,
        status: AppointmentStatus,
    ) -> ClinicResult<Appointment> {
        self.inner.update_appointment_status(tenant, id, status).await
    }

    async fn delete_appointment(&self, tenant: TenantId, id: EntityId) -> ClinicResult<bool> {
        self.inner.delete_appointment(tenant, id).await
    }

    async fn list_upcoming_appointments(
        &self,
        tenant: TenantId,
        now: Timestamp,
        limit: usize,
    ) -> ClinicResult<Vec<Appointment>> {
        self.inner.list_upcoming_appointments(tenant, now, limit).await
    }

    async fn appointment_analytics(
        &self,
        tenant: TenantId,
        range: &DateRange,
    ) -> ClinicResult<AnalyticsSummary> {
        self.inner.appointment_analytics(tenant, range).await
    }

    async fn list_medical_records(
        &self,
        tenant: TenantId,
        filter: &MedicalRecordFilter,
    ) -> ClinicResult<Vec<MedicalRecord>> {
        self.inner.list_medical_records(tenant, filter).await
    }

    async fn get_medical_record(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<MedicalRecord>> {
        self.inner.get_medical_record(tenant, id).await
    }

    async fn create_medical_record(
        &self,
        tenant: TenantId,
        new: &NewMedicalRecord,
    ) -> ClinicResult<MedicalRecord> {
        self.inner.create_medical_record(tenant, new).await
    }

    async fn count_records_since(&self, tenant: TenantId, since: Timestamp) -> ClinicResult<u64> {
        self.inner.count_records_since(tenant, since).await
    }

    async fn list_conversations(
        &self,
        tenant: TenantId,
        filter: &ConversationFilter,
    ) -> ClinicResult<Vec<Conversation>> {
        self.inner.list_conversations(tenant, filter).await
    }

    async fn get_conversation(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<Conversation>> {
        self.inner.get_conversation(tenant, id).await
    }

    async fn create_conversation(
        &self,
        tenant: TenantId,
        new: &NewConversation,
    ) -> ClinicResult<Conversation> {
        self.inner.create_conversation(tenant, new).await
    }

    async fn record_message(
        &self,
        tenant: TenantId,
        id: EntityId,
        body: &str,
    ) -> ClinicResult<Conversation> {
        self.inner.record_message(tenant, id, body).await
    }

    async fn mark_conversation_read(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Conversation> {
        self.inner.mark_conversation_read(tenant, id).await
    }

    async fn count_open_conversations(&self, tenant: TenantId) -> ClinicResult<u64> {
        self.inner.count_open_conversations(tenant).await
    }

    async fn get_clinic(&self, tenant: TenantId) -> ClinicResult<Option<Clinic>> {
        self.inner.get_clinic(tenant).await
    }

    async fn update_clinic(
        &self,
        tenant: TenantId,
        update: &ClinicUpdate,
    ) -> ClinicResult<Clinic> {
        self.inner.update_clinic(tenant, update).await
    }

    async fn list_staff(&self, tenant: TenantId) -> ClinicResult<Vec<StaffUser>> {
        self.inner.list_staff(tenant).await
    }
}
