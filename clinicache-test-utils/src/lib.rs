//! Clinicache Test Utilities
//!
//! Shared test infrastructure for the Clinicache workspace:
//! - Proptest generators for tenants, domains, filters and entities
//! - Fixtures for engines, stores and registered clinics
//! - A tenant-filter-removing store and a recording event sink
//! - Custom assertions for tenant scoping and error shapes

mod leaky_store;

pub use leaky_store::LeakyStore;

pub use clinicache_core::{
    AppointmentStatus, CacheConfig, Clinic, ClinicError, ClinicResult, ConfigError, Contact,
    ContactFilter, DateRange, Domain, EntityType, NewAppointment, NewContact, Role, StaffUser,
    StorageError, TenantContext, TenantId, TenantOwned, Timestamp,
};
pub use clinicache_storage::{
    CacheEngine, ClinicStorage, EventSink, InMemoryCacheBackend, InMemoryClinicStore,
};

use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex};

// ============================================================================
// RECORDING EVENT SINK
// ============================================================================

/// One captured `EventSink::emit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub category: String,
    pub name: String,
    pub attributes: Value,
}

/// Event sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Events with the given name, oldest first.
    pub fn named(&self, name: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, category: &str, name: &str, attributes: Value) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedEvent {
                category: category.to_string(),
                name: name.to_string(),
                attributes,
            });
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Clinicache types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        (1u64..100_000).prop_filter_map("tenant ids are non-zero", |v| TenantId::new(v).ok())
    }

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Admin),
            Just(Role::Clinician),
            Just(Role::Receptionist),
            Just(Role::System),
        ]
    }

    pub fn arb_tenant_context() -> impl Strategy<Value = TenantContext> {
        (arb_tenant_id(), "[a-z]{3,10}", arb_role())
            .prop_map(|(tenant, user, role)| TenantContext::new(tenant, user, role))
    }

    pub fn arb_domain() -> impl Strategy<Value = Domain> {
        prop::sample::select(Domain::ALL.to_vec())
    }

    /// Identifiers as the repository shapes them: `detail:<id>`, `list:<sig>`, ...
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(:[a-z0-9_-]{1,12}){0,2}"
    }

    pub fn arb_appointment_status() -> impl Strategy<Value = AppointmentStatus> {
        prop_oneof![
            Just(AppointmentStatus::Scheduled),
            Just(AppointmentStatus::Confirmed),
            Just(AppointmentStatus::Completed),
            Just(AppointmentStatus::Cancelled),
            Just(AppointmentStatus::NoShow),
        ]
    }

    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z]{2,8}", 0..5)
    }

    pub fn arb_contact_filter() -> impl Strategy<Value = ContactFilter> {
        (
            prop::option::of("[a-z]{1,6}"),
            arb_tags(),
            prop::option::of(1u32..200),
            prop::option::of(0u32..500),
        )
            .prop_map(|(search, tags, limit, offset)| ContactFilter {
                search,
                tags,
                limit,
                offset,
            })
    }

    pub fn arb_new_contact() -> impl Strategy<Value = NewContact> {
        ("[A-Z][a-z]{2,10}", "[0-9]{10,12}", arb_tags()).prop_map(|(name, phone, tags)| {
            NewContact {
                name,
                phone: format!("+{phone}"),
                email: None,
                tags,
            }
        })
    }

    /// Timestamps between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_date_range() -> impl Strategy<Value = DateRange> {
        (arb_timestamp(), 0i64..90).prop_filter_map("valid range", |(start, days)| {
            let from = start.date_naive();
            let to = from + chrono::Duration::days(days);
            DateRange::new(from, to).ok()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    #[track_caller]
    pub fn tenant(id: u64) -> TenantId {
        TenantId::new(id).expect("fixture tenant ids are non-zero")
    }

    /// A clinician session for `tenant_id`.
    pub fn ctx(tenant_id: u64) -> TenantContext {
        TenantContext::new(tenant(tenant_id), format!("user-{tenant_id}"), Role::Clinician)
    }

    pub fn clinic(tenant_id: TenantId) -> Clinic {
        Clinic {
            tenant_id,
            name: format!("Clinic {tenant_id}"),
            timezone: "America/Sao_Paulo".to_string(),
            phone: Some("+551130000000".to_string()),
            updated_at: Utc::now(),
        }
    }

    pub fn staff_user(tenant_id: TenantId, name: &str, role: Role) -> StaffUser {
        StaffUser {
            id: format!("{}-{tenant_id}", name.to_lowercase()),
            tenant_id,
            name: name.to_string(),
            role,
            active: true,
        }
    }

    pub fn new_contact(name: &str, phone: &str) -> NewContact {
        NewContact {
            name: name.to_string(),
            phone: phone.to_string(),
            email: None,
            tags: vec![],
        }
    }

    pub fn new_appointment(contact_id: uuid::Uuid, scheduled_at: Timestamp) -> NewAppointment {
        NewAppointment {
            contact_id,
            practitioner_id: Some("dr-lima".to_string()),
            scheduled_at,
            duration_minutes: 30,
            notes: None,
        }
    }

    /// Store with a clinic and two staff members registered per tenant.
    pub fn registered_store(tenants: &[u64]) -> InMemoryClinicStore {
        let store = InMemoryClinicStore::new();
        for id in tenants {
            let t = tenant(*id);
            store.seed_clinic(clinic(t)).expect("seed clinic");
            store
                .seed_staff(staff_user(t, "Lima", Role::Clinician))
                .expect("seed staff");
            store
                .seed_staff(staff_user(t, "Souza", Role::Receptionist))
                .expect("seed staff");
        }
        store
    }

    /// Engine over a fresh in-memory backend with default policies.
    pub fn cache_engine() -> (Arc<InMemoryCacheBackend>, Arc<CacheEngine>) {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let engine = CacheEngine::new(backend.clone(), &CacheConfig::default())
            .expect("default cache config is valid");
        (backend, Arc::new(engine))
    }

    /// Engine whose events are captured.
    pub fn recording_cache_engine() -> (
        Arc<InMemoryCacheBackend>,
        Arc<CacheEngine>,
        Arc<RecordingEventSink>,
    ) {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let engine =
            CacheEngine::with_event_sink(backend.clone(), &CacheConfig::default(), sink.clone())
                .expect("default cache config is valid");
        (backend, Arc::new(engine), sink)
    }

    /// Engine over a backend that refuses every call.
    pub fn unavailable_cache_engine() -> (Arc<InMemoryCacheBackend>, Arc<CacheEngine>) {
        let (backend, engine) = cache_engine();
        backend.set_available(false);
        (backend, engine)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for tenant scoping and error shapes.

    use super::*;

    /// Assert that every item belongs to `tenant`.
    #[track_caller]
    pub fn assert_all_owned_by<T: TenantOwned + std::fmt::Debug>(items: &[T], tenant: TenantId) {
        for item in items {
            assert_eq!(
                item.tenant_id(),
                tenant,
                "item owned by another tenant: {item:?}"
            );
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &ClinicResult<T>, entity_type: EntityType) {
        match result {
            Err(ClinicError::Storage(StorageError::NotFound {
                entity_type: et, ..
            })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {entity_type:?}, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_tenant_required<T: std::fmt::Debug>(result: &ClinicResult<T>) {
        match result {
            Err(ClinicError::Config(ConfigError::TenantRequired { .. })) => {}
            other => panic!("Expected TenantRequired error, got: {other:?}"),
        }
    }

    /// Assert that every key embeds the tenant's token.
    #[track_caller]
    pub fn assert_keys_scoped(keys: &[String], tenant: TenantId) {
        let token = format!(":clinic_{tenant}:");
        for key in keys {
            assert!(key.contains(&token), "key {key} is not scoped to {tenant}");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
