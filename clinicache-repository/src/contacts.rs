//! Contact operations.

use clinicache_core::{
    ClinicResult, Contact, ContactFilter, ContactUpdate, Domain, EntityId, EntityType,
    NewContact, TenantContext,
};
use clinicache_storage::ClinicStorage;
use tokio::time::Instant;
use tracing::info;

use crate::keys;
use crate::repository::{found, CachedRepository};

/// Domains touched when two contacts are merged: the survivor inherits the
/// duplicate's appointments, records and conversations.
const MERGE_DOMAINS: [Domain; 5] = [
    Domain::Contacts,
    Domain::Appointments,
    Domain::MedicalRecords,
    Domain::Conversations,
    Domain::Dashboard,
];

impl<S: ClinicStorage> CachedRepository<S> {
    pub async fn list_contacts(
        &self,
        ctx: &TenantContext,
        filter: &ContactFilter,
    ) -> ClinicResult<Vec<Contact>> {
        self.read(Domain::Contacts, &keys::list(filter), ctx, || {
            self.storage.list_contacts(ctx.tenant_id, filter)
        })
        .await
    }

    /// Fails with `NotFound` for unknown ids and for other tenants' ids.
    pub async fn get_contact(&self, ctx: &TenantContext, id: EntityId) -> ClinicResult<Contact> {
        self.read(Domain::Contacts, &keys::detail(id), ctx, || async move {
            let contact = self.storage.get_contact(ctx.tenant_id, id).await?;
            found(contact, EntityType::Contact, id)
        })
        .await
    }

    pub async fn create_contact(
        &self,
        ctx: &TenantContext,
        new: &NewContact,
    ) -> ClinicResult<Contact> {
        self.write(
            Domain::Contacts,
            ctx,
            "create_contact",
            new,
            |new| self.storage.create_contact(ctx.tenant_id, new),
            |contact| keys::detail(contact.id),
        )
        .await
    }

    pub async fn update_contact(
        &self,
        ctx: &TenantContext,
        id: EntityId,
        update: &ContactUpdate,
    ) -> ClinicResult<Contact> {
        self.write(
            Domain::Contacts,
            ctx,
            "update_contact",
            update,
            |update| self.storage.update_contact(ctx.tenant_id, id, update),
            |contact| keys::detail(contact.id),
        )
        .await
    }

    pub async fn delete_contact(&self, ctx: &TenantContext, id: EntityId) -> ClinicResult<bool> {
        self.write_direct(
            Domain::Contacts,
            keys::detail(id),
            ctx,
            "delete_contact",
            self.storage.delete_contact(ctx.tenant_id, id),
        )
        .await
    }

    /// Uncached lookup.
    pub async fn search_contacts_by_phone(
        &self,
        ctx: &TenantContext,
        phone: &str,
    ) -> ClinicResult<Vec<Contact>> {
        self.storage
            .search_contacts_by_phone(ctx.tenant_id, phone)
            .await
    }

    /// Uncached write. Flushes the tenant's namespaces in every domain that
    /// references contacts.
    pub async fn merge_contacts(
        &self,
        ctx: &TenantContext,
        primary: EntityId,
        duplicate: EntityId,
    ) -> ClinicResult<Contact> {
        let started = Instant::now();
        let merged = self
            .storage
            .merge_contacts(ctx.tenant_id, primary, duplicate)
            .await?;

        let mut removed = 0;
        for domain in MERGE_DOMAINS {
            removed += self.engine.bulk_invalidate(domain, Some(ctx)).await?;
        }
        info!(
            tenant_id = %ctx.tenant_id,
            primary = %primary,
            duplicate = %duplicate,
            removed,
            "contacts merged"
        );
        self.record_write(Domain::Contacts, "merge_contacts", ctx, started);
        Ok(merged)
    }
}
