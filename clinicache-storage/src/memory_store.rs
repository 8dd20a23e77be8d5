//! In-memory `ClinicStorage` implementation.
//!
//! Tenant-correct reference store used by tests, the isolation harness and
//! single-node demos. Every query filters on the tenant first.

use ::async_trait::async_trait;
use chrono::Utc;
use clinicache_core::{
    new_entity_id, AnalyticsSummary, Appointment, AppointmentFilter, AppointmentStatus, Clinic,
    ClinicResult, ClinicUpdate, Contact, ContactFilter, ContactUpdate, Conversation,
    ConversationFilter, DateRange, EntityId, EntityType, MedicalRecord, MedicalRecordFilter,
    NewAppointment, NewContact, NewConversation, NewMedicalRecord, StaffUser, StorageError,
    TenantId, Timestamp, ValidationError,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clinic_storage::ClinicStorage;

#[derive(Debug, Default)]
struct Tables {
    contacts: HashMap<EntityId, Contact>,
    appointments: HashMap<EntityId, Appointment>,
    records: HashMap<EntityId, MedicalRecord>,
    conversations: HashMap<EntityId, Conversation>,
    clinics: HashMap<TenantId, Clinic>,
    staff: Vec<StaffUser>,
}

/// In-memory clinic store.
#[derive(Debug, Default)]
pub struct InMemoryClinicStore {
    tables: RwLock<Tables>,
    calls: DashMap<&'static str, u64>,
}

fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn not_found(entity_type: EntityType, id: EntityId) -> StorageError {
    StorageError::NotFound { entity_type, id }
}

fn sort_newest_first<T>(items: &mut [T], key: impl Fn(&T) -> Timestamp) {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

impl InMemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }

    fn record_call(&self, operation: &'static str) {
        *self.calls.entry(operation).or_insert(0) += 1;
    }

    /// How many times `operation` reached the store.
    pub fn call_count(&self, operation: &str) -> u64 {
        self.calls.get(operation).map(|c| *c).unwrap_or(0)
    }

    pub fn reset_call_counts(&self) {
        self.calls.clear();
    }

    // ========================================================================
    // SEEDING
    // ========================================================================

    pub fn seed_clinic(&self, clinic: Clinic) -> ClinicResult<()> {
        self.write()?.clinics.insert(clinic.tenant_id, clinic);
        Ok(())
    }

    pub fn seed_staff(&self, user: StaffUser) -> ClinicResult<()> {
        self.write()?.staff.push(user);
        Ok(())
    }

    /// Insert a fully-formed contact, bypassing id assignment.
    pub fn seed_contact(&self, contact: Contact) -> ClinicResult<()> {
        self.write()?.contacts.insert(contact.id, contact);
        Ok(())
    }

    pub fn seed_appointment(&self, appointment: Appointment) -> ClinicResult<()> {
        self.write()?
            .appointments
            .insert(appointment.id, appointment);
        Ok(())
    }

    /// Every contact of every tenant, for test assertions.
    pub fn all_contacts(&self) -> ClinicResult<Vec<Contact>> {
        Ok(self.read()?.contacts.values().cloned().collect())
    }

    pub fn all_appointments(&self) -> ClinicResult<Vec<Appointment>> {
        Ok(self.read()?.appointments.values().cloned().collect())
    }
}

#[async_trait]
impl ClinicStorage for InMemoryClinicStore {
    // === Contact Operations ===

    async fn list_contacts(
        &self,
        tenant: TenantId,
        filter: &ContactFilter,
    ) -> ClinicResult<Vec<Contact>> {
        self.record_call("list_contacts");
        let tables = self.read()?;
        let mut contacts: Vec<Contact> = tables
            .contacts
            .values()
            .filter(|c| c.tenant_id == tenant && filter.matches(c))
            .cloned()
            .collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(contacts.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_contact(&self, tenant: TenantId, id: EntityId) -> ClinicResult<Option<Contact>> {
        self.record_call("get_contact");
        let tables = self.read()?;
        Ok(tables
            .contacts
            .get(&id)
            .filter(|c| c.tenant_id == tenant)
            .cloned())
    }

    async fn create_contact(&self, tenant: TenantId, new: &NewContact) -> ClinicResult<Contact> {
        self.record_call("create_contact");
        if new.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            }
            .into());
        }
        let now = Utc::now();
        let contact = Contact {
            id: new_entity_id(),
            tenant_id: tenant,
            name: new.name.trim().to_string(),
            phone: new.phone.clone(),
            email: new.email.clone(),
            tags: new.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        self.write()?.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn update_contact(
        &self,
        tenant: TenantId,
        id: EntityId,
        update: &ContactUpdate,
    ) -> ClinicResult<Contact> {
        self.record_call("update_contact");
        let mut tables = self.write()?;
        let contact = tables
            .contacts
            .get_mut(&id)
            .filter(|c| c.tenant_id == tenant)
            .ok_or_else(|| not_found(EntityType::Contact, id))?;
        update.apply(contact, Utc::now());
        Ok(contact.clone())
    }

    async fn delete_contact(&self, tenant: TenantId, id: EntityId) -> ClinicResult<bool> {
        self.record_call("delete_contact");
        let mut tables = self.write()?;
        let owned = tables
            .contacts
            .get(&id)
            .is_some_and(|c| c.tenant_id == tenant);
        if owned {
            tables.contacts.remove(&id);
        }
        Ok(owned)
    }

    async fn search_contacts_by_phone(
        &self,
        tenant: TenantId,
        phone: &str,
    ) -> ClinicResult<Vec<Contact>> {
        self.record_call("search_contacts_by_phone");
        let wanted = normalize_phone(phone);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.read()?;
        Ok(tables
            .contacts
            .values()
            .filter(|c| c.tenant_id == tenant && normalize_phone(&c.phone) == wanted)
            .cloned()
            .collect())
    }

    async fn merge_contacts(
        &self,
        tenant: TenantId,
        primary: EntityId,
        duplicate: EntityId,
    ) -> ClinicResult<Contact> {
        self.record_call("merge_contacts");
        if primary == duplicate {
            return Err(ValidationError::InvalidValue {
                field: "duplicate".to_string(),
                reason: "cannot merge a contact into itself".to_string(),
            }
            .into());
        }
        let mut tables = self.write()?;
        let dup = tables
            .contacts
            .get(&duplicate)
            .filter(|c| c.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| not_found(EntityType::Contact, duplicate))?;
        if !tables
            .contacts
            .get(&primary)
            .is_some_and(|c| c.tenant_id == tenant)
        {
            return Err(not_found(EntityType::Contact, primary).into());
        }

        for appointment in tables.appointments.values_mut() {
            if appointment.tenant_id == tenant && appointment.contact_id == duplicate {
                appointment.contact_id = primary;
            }
        }
        for record in tables.records.values_mut() {
            if record.tenant_id == tenant && record.contact_id == duplicate {
                record.contact_id = primary;
            }
        }
        for conversation in tables.conversations.values_mut() {
            if conversation.tenant_id == tenant && conversation.contact_id == duplicate {
                conversation.contact_id = primary;
            }
        }
        tables.contacts.remove(&duplicate);

        let merged = tables
            .contacts
            .get_mut(&primary)
            .ok_or_else(|| not_found(EntityType::Contact, primary))?;
        if merged.email.is_none() {
            merged.email = dup.email;
        }
        for tag in dup.tags {
            if !merged.tags.contains(&tag) {
                merged.tags.push(tag);
            }
        }
        merged.updated_at = Utc::now();
        Ok(merged.clone())
    }

    async fn count_contacts(&self, tenant: TenantId) -> ClinicResult<u64> {
        self.record_call("count_contacts");
        let tables = self.read()?;
        Ok(tables.contacts.values().filter(|c| c.tenant_id == tenant).count() as u64)
    }

    // === Appointment Operations ===

    async fn list_appointments(
        &self,
        tenant: TenantId,
        filter: &AppointmentFilter,
    ) -> ClinicResult<Vec<Appointment>> {
        self.record_call("list_appointments");
        let tables = self.read()?;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.tenant_id == tenant && filter.matches(a))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.scheduled_at, a.id));
        Ok(appointments)
    }

    async fn get_appointment(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<Appointment>> {
        self.record_call("get_appointment");
        let tables = self.read()?;
        Ok(tables
            .appointments
            .get(&id)
            .filter(|a| a.tenant_id == tenant)
            .cloned())
    }

    async fn create_appointment(
        &self,
        tenant: TenantId,
        new: &NewAppointment,
    ) -> ClinicResult<Appointment> {
        self.record_call("create_appointment");
        if new.duration_minutes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration_minutes".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }
        let mut tables = self.write()?;
        if !tables
            .contacts
            .get(&new.contact_id)
            .is_some_and(|c| c.tenant_id == tenant)
        {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Appointment,
                reason: format!("unknown contact {}", new.contact_id),
            }
            .into());
        }
        let now = Utc::now();
        let appointment = Appointment {
            id: new_entity_id(),
            tenant_id: tenant,
            contact_id: new.contact_id,
            practitioner_id: new.practitioner_id.clone(),
            scheduled_at: new.scheduled_at,
            duration_minutes: new.duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes: new.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        tables
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment_status(
        &self,
        tenant: TenantId,
        id: EntityId,
        status: AppointmentStatus,
    ) -> ClinicResult<Appointment> {
        self.record_call("update_appointment_status");
        let mut tables = self.write()?;
        let appointment = tables
            .appointments
            .get_mut(&id)
            .filter(|a| a.tenant_id == tenant)
            .ok_or_else(|| not_found(EntityType::Appointment, id))?;
        appointment.status = status;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn delete_appointment(&self, tenant: TenantId, id: EntityId) -> ClinicResult<bool> {
        self.record_call("delete_appointment");
        let mut tables = self.write()?;
        let owned = tables
            .appointments
            .get(&id)
            .is_some_and(|a| a.tenant_id == tenant);
        if owned {
            tables.appointments.remove(&id);
        }
        Ok(owned)
    }

    async fn list_upcoming_appointments(
        &self,
        tenant: TenantId,
        now: Timestamp,
        limit: usize,
    ) -> ClinicResult<Vec<Appointment>> {
        self.record_call("list_upcoming_appointments");
        let tables = self.read()?;
        let mut upcoming: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.tenant_id == tenant && a.status.is_active() && a.scheduled_at >= now)
            .cloned()
            .collect();
        upcoming.sort_by_key(|a| (a.scheduled_at, a.id));
        upcoming.truncate(limit);
        Ok(upcoming)
    }

    async fn appointment_analytics(
        &self,
        tenant: TenantId,
        range: &DateRange,
    ) -> ClinicResult<AnalyticsSummary> {
        self.record_call("appointment_analytics");
        let tables = self.read()?;
        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        let mut total = 0u64;
        for appointment in tables.appointments.values().filter(|a| {
            a.tenant_id == tenant && range.contains(a.scheduled_at.date_naive())
        }) {
            total += 1;
            *by_status
                .entry(appointment.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        let no_shows = by_status
            .get(AppointmentStatus::NoShow.as_str())
            .copied()
            .unwrap_or(0);
        let no_show_rate = if total == 0 {
            0.0
        } else {
            no_shows as f64 / total as f64
        };
        Ok(AnalyticsSummary {
            tenant_id: tenant,
            from: range.from(),
            to: range.to(),
            total_appointments: total,
            by_status,
            no_show_rate,
        })
    }

    // === Medical Record Operations ===

    async fn list_medical_records(
        &self,
        tenant: TenantId,
        filter: &MedicalRecordFilter,
    ) -> ClinicResult<Vec<MedicalRecord>> {
        self.record_call("list_medical_records");
        let tables = self.read()?;
        let mut records: Vec<MedicalRecord> = tables
            .records
            .values()
            .filter(|r| r.tenant_id == tenant && filter.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut records, |r| r.created_at);
        Ok(records)
    }

    async fn get_medical_record(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<MedicalRecord>> {
        self.record_call("get_medical_record");
        let tables = self.read()?;
        Ok(tables
            .records
            .get(&id)
            .filter(|r| r.tenant_id == tenant)
            .cloned())
    }

    async fn create_medical_record(
        &self,
        tenant: TenantId,
        new: &NewMedicalRecord,
    ) -> ClinicResult<MedicalRecord> {
        self.record_call("create_medical_record");
        let mut tables = self.write()?;
        if !tables
            .contacts
            .get(&new.contact_id)
            .is_some_and(|c| c.tenant_id == tenant)
        {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::MedicalRecord,
                reason: format!("unknown contact {}", new.contact_id),
            }
            .into());
        }
        let record = MedicalRecord {
            id: new_entity_id(),
            tenant_id: tenant,
            contact_id: new.contact_id,
            author_id: new.author_id.clone(),
            record_type: new.record_type.clone(),
            summary: new.summary.clone(),
            created_at: Utc::now(),
        };
        tables.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn count_records_since(&self, tenant: TenantId, since: Timestamp) -> ClinicResult<u64> {
        self.record_call("count_records_since");
        let tables = self.read()?;
        Ok(tables
            .records
            .values()
            .filter(|r| r.tenant_id == tenant && r.created_at >= since)
            .count() as u64)
    }

    // === Conversation Operations ===

    async fn list_conversations(
        &self,
        tenant: TenantId,
        filter: &ConversationFilter,
    ) -> ClinicResult<Vec<Conversation>> {
        self.record_call("list_conversations");
        let tables = self.read()?;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.tenant_id == tenant && filter.matches(c))
            .cloned()
            .collect();
        sort_newest_first(&mut conversations, |c| c.updated_at);
        Ok(conversations)
    }

    async fn get_conversation(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Option<Conversation>> {
        self.record_call("get_conversation");
        let tables = self.read()?;
        Ok(tables
            .conversations
            .get(&id)
            .filter(|c| c.tenant_id == tenant)
            .cloned())
    }

    async fn create_conversation(
        &self,
        tenant: TenantId,
        new: &NewConversation,
    ) -> ClinicResult<Conversation> {
        self.record_call("create_conversation");
        let mut tables = self.write()?;
        if !tables
            .contacts
            .get(&new.contact_id)
            .is_some_and(|c| c.tenant_id == tenant)
        {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Conversation,
                reason: format!("unknown contact {}", new.contact_id),
            }
            .into());
        }
        let conversation = Conversation {
            id: new_entity_id(),
            tenant_id: tenant,
            contact_id: new.contact_id,
            channel: new.channel.clone(),
            last_message: None,
            unread_count: 0,
            open: true,
            updated_at: Utc::now(),
        };
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn record_message(
        &self,
        tenant: TenantId,
        id: EntityId,
        body: &str,
    ) -> ClinicResult<Conversation> {
        self.record_call("record_message");
        let mut tables = self.write()?;
        let conversation = tables
            .conversations
            .get_mut(&id)
            .filter(|c| c.tenant_id == tenant)
            .ok_or_else(|| not_found(EntityType::Conversation, id))?;
        conversation.last_message = Some(body.to_string());
        conversation.unread_count += 1;
        conversation.open = true;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    async fn mark_conversation_read(
        &self,
        tenant: TenantId,
        id: EntityId,
    ) -> ClinicResult<Conversation> {
        self.record_call("mark_conversation_read");
        let mut tables = self.write()?;
        let conversation = tables
            .conversations
            .get_mut(&id)
            .filter(|c| c.tenant_id == tenant)
            .ok_or_else(|| not_found(EntityType::Conversation, id))?;
        conversation.unread_count = 0;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    async fn count_open_conversations(&self, tenant: TenantId) -> ClinicResult<u64> {
        self.record_call("count_open_conversations");
        let tables = self.read()?;
        Ok(tables
            .conversations
            .values()
            .filter(|c| c.tenant_id == tenant && c.open)
            .count() as u64)
    }

    // === Directory Operations ===

    async fn get_clinic(&self, tenant: TenantId) -> ClinicResult<Option<Clinic>> {
        self.record_call("get_clinic");
        Ok(self.read()?.clinics.get(&tenant).cloned())
    }

    async fn update_clinic(
        &self,
        tenant: TenantId,
        update: &ClinicUpdate,
    ) -> ClinicResult<Clinic> {
        self.record_call("update_clinic");
        let mut tables = self.write()?;
        let clinic = tables
            .clinics
            .get_mut(&tenant)
            .ok_or(StorageError::ClinicNotRegistered { tenant_id: tenant })?;
        update.apply(clinic, Utc::now());
        Ok(clinic.clone())
    }

    async fn list_staff(&self, tenant: TenantId) -> ClinicResult<Vec<StaffUser>> {
        self.record_call("list_staff");
        let tables = self.read()?;
        let mut staff: Vec<StaffUser> = tables
            .staff
            .iter()
            .filter(|u| u.tenant_id == tenant)
            .cloned()
            .collect();
        staff.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(staff)
    }
}
