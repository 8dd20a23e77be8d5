//! Aggregate reads: appointment analytics and the clinic dashboard.

use chrono::{Duration, Utc};
use clinicache_core::{
    AnalyticsSummary, Appointment, ClinicResult, DashboardMetrics, DateRange, Domain,
    TenantContext,
};
use clinicache_storage::ClinicStorage;
use tracing::debug;

use crate::keys;
use crate::repository::CachedRepository;

/// Upcoming appointments shown on the dashboard.
pub const DASHBOARD_UPCOMING_LIMIT: usize = 10;
/// Window for the dashboard's recent-records count.
pub const DASHBOARD_RECORD_WINDOW_DAYS: i64 = 30;

impl<S: ClinicStorage> CachedRepository<S> {
    pub async fn get_appointment_analytics(
        &self,
        ctx: &TenantContext,
        range: &DateRange,
    ) -> ClinicResult<AnalyticsSummary> {
        self.read(Domain::Analytics, &keys::range(range), ctx, || {
            self.storage.appointment_analytics(ctx.tenant_id, range)
        })
        .await
    }

    pub async fn get_dashboard(&self, ctx: &TenantContext) -> ClinicResult<DashboardMetrics> {
        self.read(Domain::Dashboard, keys::SUMMARY, ctx, || {
            self.compute_dashboard(ctx)
        })
        .await
    }

    /// Four storage reads in parallel. The upcoming appointments also warm
    /// the appointment detail cache.
    async fn compute_dashboard(&self, ctx: &TenantContext) -> ClinicResult<DashboardMetrics> {
        let tenant = ctx.tenant_id;
        let now = Utc::now();
        let since = now - Duration::days(DASHBOARD_RECORD_WINDOW_DAYS);

        let (total_contacts, open_conversations, records_last_30_days, upcoming) = tokio::try_join!(
            self.storage.count_contacts(tenant),
            self.storage.count_open_conversations(tenant),
            self.storage.count_records_since(tenant, since),
            self.storage
                .list_upcoming_appointments(tenant, now, DASHBOARD_UPCOMING_LIMIT),
        )?;

        let entries: Vec<(String, &Appointment)> = upcoming
            .iter()
            .map(|appointment| (keys::detail(appointment.id), appointment))
            .collect();
        let warmed = self
            .engine
            .warm_cache(Domain::Appointments, ctx, &entries)
            .await;
        debug!(tenant_id = %tenant, warmed, "dashboard computed");

        Ok(DashboardMetrics {
            tenant_id: tenant,
            total_contacts,
            open_conversations,
            records_last_30_days,
            upcoming_appointments: upcoming,
            generated_at: now,
        })
    }
}
