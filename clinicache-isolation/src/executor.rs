//! Operation executors and tenant seeding.
//!
//! The harness drives an [`OperationExecutor`]. [`RepositoryExecutor`] maps
//! each [`TargetOperation`] onto a [`CachedRepository`] call and reports the
//! cache keys the engine actually touched during the call, so the validator
//! can check key scoping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use clinicache_core::{
    AppointmentFilter, ClinicError, ClinicResult, ConfigError, ContactFilter, ContactUpdate,
    ConversationFilter, DateRange, Domain, EntityId, MedicalRecordFilter, NewAppointment,
    NewContact, NewConversation, NewMedicalRecord, TenantContext, TenantId,
};
use clinicache_repository::CachedRepository;
use clinicache_storage::{trace_keys, ClinicStorage};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{TargetOperation, TestOperation};

/// What an executed operation returned.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// Serialized result, scanned for foreign tenant ids.
    pub payload: Value,
    /// Keys and invalidation patterns the operation sent to the cache
    /// backend, in order. Empty when it bypassed the cache.
    pub cache_keys: Vec<String>,
}

impl OperationOutcome {
    pub fn new(payload: Value, cache_keys: Vec<String>) -> Self {
        Self {
            payload,
            cache_keys,
        }
    }
}

/// Runs one harness operation under a tenant context.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &TenantContext,
        operation: &TestOperation,
    ) -> ClinicResult<OperationOutcome>;

    /// Cache hit rate observed for `tenant`, when the executor can see it.
    fn cache_hit_rate(&self, _tenant: TenantId) -> Option<f64> {
        None
    }
}

// ============================================================================
// SEEDING
// ============================================================================

/// Records created for one tenant before a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantSeed {
    pub contact_ids: Vec<EntityId>,
    pub appointment_ids: Vec<EntityId>,
    pub record_ids: Vec<EntityId>,
    pub conversation_ids: Vec<EntityId>,
    /// Phone of the first seeded contact.
    pub phone: String,
}

/// Seeded records by tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedIndex {
    seeds: BTreeMap<TenantId, TenantSeed>,
}

impl SeedIndex {
    pub fn get(&self, tenant: TenantId) -> Option<&TenantSeed> {
        self.seeds.get(&tenant)
    }

    /// Seed of some other tenant, the target of cross-tenant probes.
    pub fn foreign(&self, tenant: TenantId) -> Option<&TenantSeed> {
        self.seeds
            .iter()
            .find(|(id, _)| **id != tenant)
            .map(|(_, seed)| seed)
    }

    pub fn tenants(&self) -> impl Iterator<Item = TenantId> + '_ {
        self.seeds.keys().copied()
    }

    pub fn insert(&mut self, tenant: TenantId, seed: TenantSeed) {
        self.seeds.insert(tenant, seed);
    }
}

/// Create `per_tenant` contacts per tenant, each with an upcoming
/// appointment, a medical record and an open conversation.
pub async fn seed_tenants<S: ClinicStorage>(
    storage: &S,
    tenants: &[TenantId],
    per_tenant: usize,
) -> ClinicResult<SeedIndex> {
    let mut index = SeedIndex::default();
    let now = Utc::now();

    for tenant in tenants {
        let tenant = *tenant;
        let mut seed = TenantSeed::default();
        for n in 0..per_tenant {
            let phone = format!("+55119{:04}{:04}", tenant.get() % 10_000, n);
            let contact = storage
                .create_contact(
                    tenant,
                    &NewContact {
                        name: format!("Patient {n} of clinic {tenant}"),
                        phone: phone.clone(),
                        email: None,
                        tags: vec!["seeded".to_string()],
                    },
                )
                .await?;
            if seed.phone.is_empty() {
                seed.phone = phone;
            }

            let appointment = storage
                .create_appointment(
                    tenant,
                    &NewAppointment {
                        contact_id: contact.id,
                        practitioner_id: Some(format!("practitioner-{tenant}")),
                        scheduled_at: now + Duration::days(n as i64 + 1),
                        duration_minutes: 30,
                        notes: None,
                    },
                )
                .await?;
            let record = storage
                .create_medical_record(
                    tenant,
                    &NewMedicalRecord {
                        contact_id: contact.id,
                        author_id: format!("practitioner-{tenant}"),
                        record_type: "consultation".to_string(),
                        summary: format!("Routine visit {n}"),
                    },
                )
                .await?;
            let conversation = storage
                .create_conversation(
                    tenant,
                    &NewConversation {
                        contact_id: contact.id,
                        channel: "whatsapp".to_string(),
                    },
                )
                .await?;

            seed.contact_ids.push(contact.id);
            seed.appointment_ids.push(appointment.id);
            seed.record_ids.push(record.id);
            seed.conversation_ids.push(conversation.id);
        }
        debug!(tenant_id = %tenant, contacts = per_tenant, "tenant seeded");
        index.insert(tenant, seed);
    }

    Ok(index)
}

// ============================================================================
// REPOSITORY EXECUTOR
// ============================================================================

/// Executes harness operations against a cached repository.
pub struct RepositoryExecutor<S> {
    repo: CachedRepository<S>,
    seeds: SeedIndex,
    created: AtomicU64,
}

impl<S: ClinicStorage> RepositoryExecutor<S> {
    pub fn new(repo: CachedRepository<S>, seeds: SeedIndex) -> Self {
        Self {
            repo,
            seeds,
            created: AtomicU64::new(0),
        }
    }

    pub fn repository(&self) -> &CachedRepository<S> {
        &self.repo
    }

    pub fn seeds(&self) -> &SeedIndex {
        &self.seeds
    }

    fn own_seed(&self, ctx: &TenantContext) -> ClinicResult<&TenantSeed> {
        self.seeds.get(ctx.tenant_id).ok_or_else(|| {
            ClinicError::Config(ConfigError::InvalidValue {
                field: "tenant_id".to_string(),
                value: ctx.tenant_id.to_string(),
                reason: "tenant was not seeded".to_string(),
            })
        })
    }

    fn foreign_seed(&self, ctx: &TenantContext) -> ClinicResult<&TenantSeed> {
        self.seeds.foreign(ctx.tenant_id).ok_or_else(|| {
            ClinicError::Config(ConfigError::MissingRequired {
                field: "foreign tenant seed".to_string(),
            })
        })
    }
}

fn first(ids: &[EntityId], field: &str) -> ClinicResult<EntityId> {
    ids.first().copied().ok_or_else(|| {
        ClinicError::Config(ConfigError::MissingRequired {
            field: field.to_string(),
        })
    })
}

fn payload_str<'a>(operation: &'a TestOperation, field: &str) -> Option<&'a str> {
    operation
        .payload
        .as_ref()
        .and_then(|payload| payload.get(field))
        .and_then(Value::as_str)
}

fn to_payload<T: Serialize>(value: &T) -> ClinicResult<Value> {
    Ok(serde_json::to_value(value).map_err(clinicache_core::CacheError::from)?)
}

/// Window used by the analytics operation.
fn analytics_window() -> ClinicResult<DateRange> {
    let today = Utc::now().date_naive();
    Ok(DateRange::new(
        today - Duration::days(30),
        today + Duration::days(30),
    )?)
}

impl<S: ClinicStorage> RepositoryExecutor<S> {
    async fn dispatch(
        &self,
        ctx: &TenantContext,
        operation: &TestOperation,
    ) -> ClinicResult<Value> {
        let repo = &self.repo;
        match operation.target {
            TargetOperation::ListContacts => {
                to_payload(&repo.list_contacts(ctx, &ContactFilter::default()).await?)
            }
            TargetOperation::GetContact => {
                let id = first(&self.own_seed(ctx)?.contact_ids, "contact_ids")?;
                to_payload(&repo.get_contact(ctx, id).await?)
            }
            TargetOperation::SearchContactsByPhone => {
                let phone = match payload_str(operation, "phone") {
                    Some(phone) => phone.to_string(),
                    None => self.own_seed(ctx)?.phone.clone(),
                };
                to_payload(&repo.search_contacts_by_phone(ctx, &phone).await?)
            }
            TargetOperation::CreateContact => {
                let n = self.created.fetch_add(1, Ordering::Relaxed);
                let new = NewContact {
                    name: payload_str(operation, "name")
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Walk-in {n}")),
                    phone: payload_str(operation, "phone")
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("+55118{:08}", n % 100_000_000)),
                    email: None,
                    tags: vec!["harness".to_string()],
                };
                to_payload(&repo.create_contact(ctx, &new).await?)
            }
            TargetOperation::ListAppointments => {
                to_payload(&repo.list_appointments(ctx, &AppointmentFilter::default()).await?)
            }
            TargetOperation::GetAppointment => {
                let id = first(&self.own_seed(ctx)?.appointment_ids, "appointment_ids")?;
                to_payload(&repo.get_appointment(ctx, id).await?)
            }
            TargetOperation::ListMedicalRecords => to_payload(
                &repo
                    .list_medical_records(ctx, &MedicalRecordFilter::default())
                    .await?,
            ),
            TargetOperation::GetMedicalRecord => {
                let id = first(&self.own_seed(ctx)?.record_ids, "record_ids")?;
                to_payload(&repo.get_medical_record(ctx, id).await?)
            }
            TargetOperation::ListConversations => to_payload(
                &repo
                    .list_conversations(ctx, &ConversationFilter::default())
                    .await?,
            ),
            TargetOperation::GetClinic => to_payload(&repo.get_clinic(ctx).await?),
            TargetOperation::ListStaff => to_payload(&repo.list_staff(ctx).await?),
            TargetOperation::GetDashboard => to_payload(&repo.get_dashboard(ctx).await?),
            TargetOperation::GetAppointmentAnalytics => {
                let range = analytics_window()?;
                to_payload(&repo.get_appointment_analytics(ctx, &range).await?)
            }
            TargetOperation::GetForeignContact => {
                let id = first(&self.foreign_seed(ctx)?.contact_ids, "foreign contact_ids")?;
                to_payload(&repo.get_contact(ctx, id).await?)
            }
            TargetOperation::GetForeignAppointment => {
                let id = first(
                    &self.foreign_seed(ctx)?.appointment_ids,
                    "foreign appointment_ids",
                )?;
                to_payload(&repo.get_appointment(ctx, id).await?)
            }
            TargetOperation::GetForeignMedicalRecord => {
                let id = first(&self.foreign_seed(ctx)?.record_ids, "foreign record_ids")?;
                to_payload(&repo.get_medical_record(ctx, id).await?)
            }
            TargetOperation::UpdateForeignContact => {
                let id = first(&self.foreign_seed(ctx)?.contact_ids, "foreign contact_ids")?;
                let update = ContactUpdate {
                    name: Some(
                        payload_str(operation, "name")
                            .unwrap_or("Renamed by another clinic")
                            .to_string(),
                    ),
                    ..Default::default()
                };
                to_payload(&repo.update_contact(ctx, id, &update).await?)
            }
            TargetOperation::BulkInvalidateWithoutTenant => {
                let removed = repo.engine().bulk_invalidate(Domain::Contacts, None).await?;
                Ok(serde_json::json!({ "removed": removed }))
            }
        }
    }
}

#[async_trait]
impl<S: ClinicStorage> OperationExecutor for RepositoryExecutor<S> {
    async fn execute(
        &self,
        ctx: &TenantContext,
        operation: &TestOperation,
    ) -> ClinicResult<OperationOutcome> {
        let (payload, cache_keys) = trace_keys(self.dispatch(ctx, operation)).await;
        Ok(OperationOutcome::new(payload?, cache_keys))
    }

    fn cache_hit_rate(&self, tenant: TenantId) -> Option<f64> {
        let metrics = self.repo.engine().tenant_metrics(tenant);
        (metrics.hits + metrics.misses > 0).then_some(metrics.hit_rate)
    }
}
