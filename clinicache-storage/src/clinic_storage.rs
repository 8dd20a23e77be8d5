//! Persistence collaborator contract.
//!
//! One method per business operation the cached repository wraps. Every
//! method takes the tenant explicitly and must only ever see or touch that
//! tenant's rows. The cache layer never talks to a database directly.

use ::async_trait::async_trait;
use clinicache_core::{
    AnalyticsSummary, Appointment, AppointmentFilter, AppointmentStatus, Clinic, ClinicResult,
    ClinicUpdate, Contact, ContactFilter, ContactUpdate, Conversation, ConversationFilter,
    DateRange, EntityId, MedicalRecord, MedicalRecordFilter, NewAppointment, NewContact,
    NewConversation, NewMedicalRecord, StaffUser, TenantId, Timestamp,
};

/// Async persistence trait for clinic data.
#[async_trait]
pub trait ClinicStorage: Send + Sync {
    // ========================================================================
    // CONTACT OPERATIONS
    // ========================================================================

    async fn list_contacts(
        &self,
        tenant: TenantId,
        filter: &ContactFilter,
    ) -> ClinicResult<Vec<Contact>>;

    async fn get_contact(&self, tenant: TenantId, id: EntityId) -> ClinicResult<Option<Contact>>;

    async fn create_contact(&self, tenant: TenantId, new: &NewContact) -> ClinicResult<Contact>;

    /// Fails with `StorageError::NotFound` for unknown ids.
    async fn update_contact(
        &self,
        tenant: TenantId,
        id: EntityId,
        update: &ContactUpdate,
    ) -> ClinicResult<Contact>;

    /// Returns whether a row was removed.
    async fn delete_contact(&self, tenant: TenantId, id: EntityId) -> ClinicResult<bool>;

    /// Exact match on the normalized phone number.
    async fn search_contacts_by_phone(
        &self,
        tenant: TenantId,
        phone: &str,
    ) -> ClinicResult<Vec<Contact>>;

    /// Fold `duplicate` into `primary`, re-pointing its appointments,
    /// records and conversations, then delete it.
    async fn merge_contacts(
        &self,
        tenant: TenantId,
        primary: EntityId,
        duplicate: EntityId,
    ) -> ClinicResult<Contact>;

    async fn count_contacts(&self, tenant: TenantId) -> ClinicResult<u64>;

    // ========================================================================
    // APPOINTMENT OPERATIONS
    // ========================================================================

    async fn list_appointments(
        &self,
        tenant: TenantId,
        filter: &AppointmentFilter,
    ) -> ClinicResult<Vec<Appointment>>;

    async fn get_appointment(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<Appointment>>;

    async fn create_appointment(
        &self,
        tenant: TenantId,
        new: &NewAppointment,
    ) -> ClinicResult<Appointment>;

    async fn update_appointment_status(
        &self,
        tenant: TenantId,
        id: EntityId,
        status: AppointmentStatus,
    ) -> ClinicResult<Appointment>;

    async fn delete_appointment(&self, tenant: TenantId, id: EntityId) -> ClinicResult<bool>;

    /// Active appointments scheduled at or after `now`, soonest first.
    async fn list_upcoming_appointments(
        &self,
        tenant: TenantId,
        now: Timestamp,
        limit: usize,
    ) -> ClinicResult<Vec<Appointment>>;

    async fn appointment_analytics(
        &self,
        tenant: TenantId,
        range: &DateRange,
    ) -> ClinicResult<AnalyticsSummary>;

    // ========================================================================
    // MEDICAL RECORD OPERATIONS
    // ========================================================================

    async fn list_medical_records(
        &self,
        tenant: TenantId,
        filter: &MedicalRecordFilter,
    ) -> ClinicResult<Vec<MedicalRecord>>;

    async fn get_medical_record(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<MedicalRecord>>;

    async fn create_medical_record(
        &self,
        tenant: TenantId,
        new: &NewMedicalRecord,
    ) -> ClinicResult<MedicalRecord>;

    async fn count_records_since(&self, tenant: TenantId, since: Timestamp) -> ClinicResult<u64>;

    // ========================================================================
    // CONVERSATION OPERATIONS
    // ========================================================================

    async fn list_conversations(
        &self,
        tenant: TenantId,
        filter: &ConversationFilter,
    ) -> ClinicResult<Vec<Conversation>>;

    async fn get_conversation(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<Conversation>>;

    async fn create_conversation(
        &self,
        tenant: TenantId,
        new: &NewConversation,
    ) -> ClinicResult<Conversation>;

    /// Append an inbound message: sets `last_message`, bumps unread, reopens.
    async fn record_message(
        &self,
        tenant: TenantId,
        id: EntityId,
        body: &str,
    ) -> ClinicResult<Conversation>;

    async fn mark_conversation_read(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Conversation>;

    async fn count_open_conversations(&self, tenant: TenantId) -> ClinicResult<u64>;

    // ========================================================================
    // DIRECTORY OPERATIONS
    // ========================================================================

    async fn get_clinic(&self, tenant: TenantId) -> ClinicResult<Option<Clinic>>;

    async fn update_clinic(&self, tenant: TenantId, update: &ClinicUpdate)
        -> ClinicResult<Clinic>;

    async fn list_staff(&self, tenant: TenantId) -> ClinicResult<Vec<StaffUser>>;
}
