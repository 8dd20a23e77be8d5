//! Conversation operations.

use clinicache_core::{
    ClinicResult, Conversation, ConversationFilter, Domain, EntityId, EntityType,
    NewConversation, TenantContext,
};
use clinicache_storage::ClinicStorage;

use crate::keys;
use crate::repository::{found, CachedRepository};

impl<S: ClinicStorage> CachedRepository<S> {
    pub async fn list_conversations(
        &self,
        ctx: &TenantContext,
        filter: &ConversationFilter,
    ) -> ClinicResult<Vec<Conversation>> {
        self.read(Domain::Conversations, &keys::list(filter), ctx, || {
            self.storage.list_conversations(ctx.tenant_id, filter)
        })
        .await
    }

    pub async fn get_conversation(
        &self,
        ctx: &TenantContext,
        id: EntityId,
    ) -> ClinicResult<Conversation> {
        self.read(Domain::Conversations, &keys::detail(id), ctx, || async move {
            let conversation = self.storage.get_conversation(ctx.tenant_id, id).await?;
            found(conversation, EntityType::Conversation, id)
        })
        .await
    }

    pub async fn create_conversation(
        &self,
        ctx: &TenantContext,
        new: &NewConversation,
    ) -> ClinicResult<Conversation> {
        self.write(
            Domain::Conversations,
            ctx,
            "create_conversation",
            new,
            |new| self.storage.create_conversation(ctx.tenant_id, new),
            |conversation| keys::detail(conversation.id),
        )
        .await
    }

    /// Inbound message on a conversation.
    pub async fn record_message(
        &self,
        ctx: &TenantContext,
        id: EntityId,
        body: &str,
    ) -> ClinicResult<Conversation> {
        self.write(
            Domain::Conversations,
            ctx,
            "record_message",
            body,
            |body| self.storage.record_message(ctx.tenant_id, id, body),
            |conversation| keys::detail(conversation.id),
        )
        .await
    }

    /// Uncached write; still clears the conversation's cached views.
    pub async fn mark_conversation_read(
        &self,
        ctx: &TenantContext,
        id: EntityId,
    ) -> ClinicResult<Conversation> {
        self.write_direct(
            Domain::Conversations,
            keys::detail(id),
            ctx,
            "mark_conversation_read",
            self.storage.mark_conversation_read(ctx.tenant_id, id),
        )
        .await
    }
}
