//! Clinic entities guarded by the cache.
//!
//! Every tenant-owned record carries its `tenant_id` so that any result can
//! be checked against the tenant that asked for it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tenant::{Role, TenantId};
use crate::{EntityId, Timestamp};

/// Records that belong to exactly one clinic.
pub trait TenantOwned {
    fn tenant_id(&self) -> TenantId;
}

macro_rules! tenant_owned {
    ($($ty:ty),* $(,)?) => {
        $(impl TenantOwned for $ty {
            fn tenant_id(&self) -> TenantId {
                self.tenant_id
            }
        })*
    };
}

// ============================================================================
// CONTACTS
// ============================================================================

/// A patient or prospective patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ContactUpdate {
    pub fn apply(&self, contact: &mut Contact, now: Timestamp) {
        if let Some(name) = &self.name {
            contact.name = name.clone();
        }
        if let Some(phone) = &self.phone {
            contact.phone = phone.clone();
        }
        if let Some(email) = &self.email {
            contact.email = Some(email.clone());
        }
        if let Some(tags) = &self.tags {
            contact.tags = tags.clone();
        }
        contact.updated_at = now;
    }
}

// ============================================================================
// APPOINTMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Still expected to happen.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub contact_id: EntityId,
    pub practitioner_id: Option<String>,
    pub scheduled_at: Timestamp,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub contact_id: EntityId,
    pub practitioner_id: Option<String>,
    pub scheduled_at: Timestamp,
    pub duration_minutes: u32,
    pub notes: Option<String>,
}

// ============================================================================
// MEDICAL RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub contact_id: EntityId,
    pub author_id: String,
    pub record_type: String,
    pub summary: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMedicalRecord {
    pub contact_id: EntityId,
    pub author_id: String,
    pub record_type: String,
    pub summary: String,
}

// ============================================================================
// CONVERSATIONS
// ============================================================================

/// Messaging thread with a contact (WhatsApp, SMS, email).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub contact_id: EntityId,
    pub channel: String,
    pub last_message: Option<String>,
    pub unread_count: u32,
    pub open: bool,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    pub contact_id: EntityId,
    pub channel: String,
}

// ============================================================================
// DIRECTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clinic {
    pub tenant_id: TenantId,
    pub name: String,
    pub timezone: String,
    pub phone: Option<String>,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicUpdate {
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub phone: Option<String>,
}

impl ClinicUpdate {
    pub fn apply(&self, clinic: &mut Clinic, now: Timestamp) {
        if let Some(name) = &self.name {
            clinic.name = name.clone();
        }
        if let Some(timezone) = &self.timezone {
            clinic.timezone = timezone.clone();
        }
        if let Some(phone) = &self.phone {
            clinic.phone = Some(phone.clone());
        }
        clinic.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffUser {
    pub id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub role: Role,
    pub active: bool,
}

// ============================================================================
// AGGREGATES
// ============================================================================

/// Dashboard aggregate, computed from several leaf reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub tenant_id: TenantId,
    pub total_contacts: u64,
    pub open_conversations: u64,
    pub records_last_30_days: u64,
    pub upcoming_appointments: Vec<Appointment>,
    pub generated_at: Timestamp,
}

/// Appointment analytics over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub tenant_id: TenantId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_appointments: u64,
    pub by_status: BTreeMap<String, u64>,
    pub no_show_rate: f64,
}

tenant_owned!(
    Contact,
    Appointment,
    MedicalRecord,
    Conversation,
    Clinic,
    StaffUser,
    DashboardMetrics,
    AnalyticsSummary,
);
