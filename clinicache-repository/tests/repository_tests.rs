//! Cached repository behavior over the in-memory store and cache backend.

use chrono::{Duration, NaiveDate, Utc};
use clinicache_core::{
    AppointmentFilter, AppointmentStatus, ClinicError, ClinicUpdate, ContactFilter,
    ContactUpdate, ConversationFilter, DateRange, EntityType, MedicalRecordFilter,
    NewConversation, NewMedicalRecord, StorageError,
};
use clinicache_repository::{keys, CachedRepository};
use clinicache_storage::{CacheEngine, InMemoryCacheBackend, InMemoryClinicStore};
use clinicache_test_utils::{assertions, fixtures};
use std::sync::Arc;

type Repo = CachedRepository<InMemoryClinicStore>;

fn setup(tenants: &[u64]) -> (Arc<InMemoryClinicStore>, Arc<InMemoryCacheBackend>, Repo) {
    let store = Arc::new(fixtures::registered_store(tenants));
    let (backend, engine) = fixtures::cache_engine();
    let repo = CachedRepository::new(store.clone(), engine);
    (store, backend, repo)
}

fn engine(repo: &Repo) -> &CacheEngine {
    repo.engine()
}

fn march() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_get_contact_is_served_from_cache_after_first_read() {
    let (store, _backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    let created = repo
        .create_contact(&ctx, &fixtures::new_contact("Ana", "+55 11 99999-0000"))
        .await
        .unwrap();
    store.reset_call_counts();

    let first = repo.get_contact(&ctx, created.id).await.unwrap();
    engine(&repo).flush_pending_writes().await;
    let second = repo.get_contact(&ctx, created.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.call_count("get_contact"), 1);
}

#[tokio::test]
async fn test_other_tenants_contact_is_not_found_and_not_cached() {
    let (store, backend, repo) = setup(&[1, 2]);
    let created = repo
        .create_contact(&fixtures::ctx(1), &fixtures::new_contact("Ana", "1"))
        .await
        .unwrap();
    store.reset_call_counts();

    let intruder = fixtures::ctx(2);
    for _ in 0..2 {
        let result = repo.get_contact(&intruder, created.id).await;
        assertions::assert_not_found(&result, EntityType::Contact);
        engine(&repo).flush_pending_writes().await;
    }
    assert_eq!(store.call_count("get_contact"), 2);
    assert!(backend
        .keys_matching("clinicache:contacts:clinic_2:*")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_update_contact_is_visible_on_next_read() {
    let (_store, _backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    let created = repo
        .create_contact(&ctx, &fixtures::new_contact("Ana", "1"))
        .await
        .unwrap();

    let listed = repo.list_contacts(&ctx, &ContactFilter::default()).await.unwrap();
    let fetched = repo.get_contact(&ctx, created.id).await.unwrap();
    engine(&repo).flush_pending_writes().await;
    assert_eq!(listed[0].name, "Ana");
    assert_eq!(fetched.name, "Ana");

    let update = ContactUpdate {
        name: Some("Ana Paula".to_string()),
        ..Default::default()
    };
    repo.update_contact(&ctx, created.id, &update).await.unwrap();

    let listed = repo.list_contacts(&ctx, &ContactFilter::default()).await.unwrap();
    let fetched = repo.get_contact(&ctx, created.id).await.unwrap();
    assert_eq!(listed[0].name, "Ana Paula");
    assert_eq!(fetched.name, "Ana Paula");
}

#[tokio::test]
async fn test_contact_write_clears_tenant_dashboard_only() {
    let (_store, backend, repo) = setup(&[1, 12]);
    for tenant in [1, 12] {
        repo.get_dashboard(&fixtures::ctx(tenant)).await.unwrap();
    }
    engine(&repo).flush_pending_writes().await;

    repo.create_contact(&fixtures::ctx(1), &fixtures::new_contact("Bia", "2"))
        .await
        .unwrap();

    assert!(backend.peek("clinicache:dashboard:clinic_1:summary").is_none());
    assert!(backend.peek("clinicache:dashboard:clinic_12:summary").is_some());
}

#[tokio::test]
async fn test_create_appointment_clears_appointment_and_dashboard_namespaces() {
    let (_store, backend, repo) = setup(&[3, 30]);
    let mut contacts = Vec::new();
    for tenant in [3, 30] {
        let ctx = fixtures::ctx(tenant);
        let contact = repo
            .create_contact(&ctx, &fixtures::new_contact("Caio", "3"))
            .await
            .unwrap();
        repo.get_dashboard(&ctx).await.unwrap();
        let range_only = AppointmentFilter {
            range: Some(march()),
            ..Default::default()
        };
        repo.list_appointments(&ctx, &range_only).await.unwrap();
        contacts.push(contact);
    }
    engine(&repo).flush_pending_writes().await;
    assert!(backend
        .peek("clinicache:appointments:clinic_3:range:2024-03-01:2024-03-31")
        .is_some());

    let ctx = fixtures::ctx(3);
    let created = repo
        .create_appointment(
            &ctx,
            &fixtures::new_appointment(contacts[0].id, Utc::now() + Duration::days(2)),
        )
        .await
        .unwrap();
    assert_eq!(created.status, AppointmentStatus::Scheduled);

    assert!(backend
        .keys_matching("clinicache:appointments:clinic_3:*")
        .unwrap()
        .is_empty());
    assert!(backend
        .keys_matching("clinicache:dashboard:clinic_3:*")
        .unwrap()
        .is_empty());
    assert_eq!(
        backend
            .keys_matching("clinicache:appointments:clinic_30:*")
            .unwrap()
            .len(),
        1
    );
    assert!(backend.peek("clinicache:dashboard:clinic_30:summary").is_some());

    // Read-your-writes through the facade.
    let fetched = repo.get_appointment(&ctx, created.id).await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_status_update_is_visible_immediately() {
    let (_store, _backend, repo) = setup(&[4]);
    let ctx = fixtures::ctx(4);
    let contact = repo
        .create_contact(&ctx, &fixtures::new_contact("Davi", "4"))
        .await
        .unwrap();
    let appointment = repo
        .create_appointment(
            &ctx,
            &fixtures::new_appointment(contact.id, Utc::now() + Duration::hours(3)),
        )
        .await
        .unwrap();
    repo.get_appointment(&ctx, appointment.id).await.unwrap();
    engine(&repo).flush_pending_writes().await;

    repo.update_appointment_status(&ctx, appointment.id, AppointmentStatus::Confirmed)
        .await
        .unwrap();
    let fetched = repo.get_appointment(&ctx, appointment.id).await.unwrap();
    assert_eq!(fetched.status, AppointmentStatus::Confirmed);

    assert!(repo.delete_appointment(&ctx, appointment.id).await.unwrap());
    let gone = repo.get_appointment(&ctx, appointment.id).await;
    assertions::assert_not_found(&gone, EntityType::Appointment);
}

#[tokio::test]
async fn test_dashboard_is_cached_and_warms_appointment_details() {
    let (store, backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    let contact = repo
        .create_contact(&ctx, &fixtures::new_contact("Eva", "5"))
        .await
        .unwrap();
    let mut upcoming = Vec::new();
    for hours in [5, 2] {
        upcoming.push(
            repo.create_appointment(
                &ctx,
                &fixtures::new_appointment(contact.id, Utc::now() + Duration::hours(hours)),
            )
            .await
            .unwrap(),
        );
    }
    store.reset_call_counts();

    let dashboard = repo.get_dashboard(&ctx).await.unwrap();
    assert_eq!(dashboard.total_contacts, 1);
    assert_eq!(dashboard.upcoming_appointments.len(), 2);
    assert_eq!(dashboard.upcoming_appointments[0].id, upcoming[1].id);

    let detail = format!("clinicache:appointments:clinic_1:{}", keys::detail(upcoming[0].id));
    assert!(backend.peek(&detail).is_some());

    engine(&repo).flush_pending_writes().await;
    let again = repo.get_dashboard(&ctx).await.unwrap();
    assert_eq!(again, dashboard);
    assert_eq!(store.call_count("count_contacts"), 1);

    repo.get_appointment(&ctx, upcoming[0].id).await.unwrap();
    assert_eq!(store.call_count("get_appointment"), 0);
}

#[tokio::test]
async fn test_merge_contacts_flushes_contact_views() {
    let (_store, backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    let primary = repo
        .create_contact(&ctx, &fixtures::new_contact("Fabio", "6"))
        .await
        .unwrap();
    let duplicate = repo
        .create_contact(&ctx, &fixtures::new_contact("Fabio S", "6"))
        .await
        .unwrap();
    repo.get_contact(&ctx, primary.id).await.unwrap();
    repo.get_contact(&ctx, duplicate.id).await.unwrap();
    repo.list_contacts(&ctx, &ContactFilter::default()).await.unwrap();
    engine(&repo).flush_pending_writes().await;
    assert_eq!(
        backend
            .keys_matching("clinicache:contacts:clinic_1:*")
            .unwrap()
            .len(),
        3
    );

    repo.merge_contacts(&ctx, primary.id, duplicate.id).await.unwrap();

    assert!(backend
        .keys_matching("clinicache:contacts:clinic_1:*")
        .unwrap()
        .is_empty());
    let gone = repo.get_contact(&ctx, duplicate.id).await;
    assertions::assert_not_found(&gone, EntityType::Contact);
    assert_eq!(
        repo.list_contacts(&ctx, &ContactFilter::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_phone_search_bypasses_cache() {
    let (store, backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    repo.create_contact(&ctx, &fixtures::new_contact("Gil", "+55 (11) 98888-7777"))
        .await
        .unwrap();
    store.reset_call_counts();

    for _ in 0..2 {
        let found = repo
            .search_contacts_by_phone(&ctx, "5511988887777")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
    engine(&repo).flush_pending_writes().await;
    assert_eq!(store.call_count("search_contacts_by_phone"), 2);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_medical_records_are_cached_before_return() {
    let (store, backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    let contact = repo
        .create_contact(&ctx, &fixtures::new_contact("Hugo", "7"))
        .await
        .unwrap();
    let record = repo
        .create_medical_record(
            &ctx,
            &NewMedicalRecord {
                contact_id: contact.id,
                author_id: "dr-lima".to_string(),
                record_type: "consultation".to_string(),
                summary: "Routine check".to_string(),
            },
        )
        .await
        .unwrap();
    store.reset_call_counts();

    let filter = MedicalRecordFilter::for_contact(contact.id);
    let records = repo.list_medical_records(&ctx, &filter).await.unwrap();
    assert_eq!(records, vec![record.clone()]);
    assert_eq!(
        backend
            .keys_matching("clinicache:medical_records:clinic_1:list:*")
            .unwrap()
            .len(),
        1
    );

    repo.list_medical_records(&ctx, &filter).await.unwrap();
    repo.get_medical_record(&ctx, record.id).await.unwrap();
    repo.get_medical_record(&ctx, record.id).await.unwrap();
    assert_eq!(store.call_count("list_medical_records"), 1);
    assert_eq!(store.call_count("get_medical_record"), 1);
}

#[tokio::test]
async fn test_conversation_writes_refresh_cached_views() {
    let (_store, _backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    let contact = repo
        .create_contact(&ctx, &fixtures::new_contact("Ines", "8"))
        .await
        .unwrap();
    let conversation = repo
        .create_conversation(
            &ctx,
            &NewConversation {
                contact_id: contact.id,
                channel: "whatsapp".to_string(),
            },
        )
        .await
        .unwrap();

    repo.record_message(&ctx, conversation.id, "Hi, can I move my visit?")
        .await
        .unwrap();
    let unread = ConversationFilter {
        unread_only: true,
        ..Default::default()
    };
    assert_eq!(repo.list_conversations(&ctx, &unread).await.unwrap().len(), 1);
    assert_eq!(
        repo.get_conversation(&ctx, conversation.id)
            .await
            .unwrap()
            .unread_count,
        1
    );
    engine(&repo).flush_pending_writes().await;

    repo.mark_conversation_read(&ctx, conversation.id).await.unwrap();
    assert!(repo.list_conversations(&ctx, &unread).await.unwrap().is_empty());
    assert_eq!(
        repo.get_conversation(&ctx, conversation.id)
            .await
            .unwrap()
            .unread_count,
        0
    );
}

#[tokio::test]
async fn test_directory_reads_and_update() {
    let (store, _backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    store.reset_call_counts();

    assert_eq!(repo.get_clinic(&ctx).await.unwrap().name, "Clinic 1");
    assert_eq!(repo.get_clinic(&ctx).await.unwrap().name, "Clinic 1");
    assert_eq!(store.call_count("get_clinic"), 1);

    let staff = repo.list_staff(&ctx).await.unwrap();
    assertions::assert_all_owned_by(&staff, ctx.tenant_id);

    let update = ClinicUpdate {
        name: Some("Clinica Sol".to_string()),
        ..Default::default()
    };
    repo.update_clinic(&ctx, &update).await.unwrap();
    assert_eq!(repo.get_clinic(&ctx).await.unwrap().name, "Clinica Sol");
}

#[tokio::test]
async fn test_unregistered_clinic_error_propagates() {
    let (_store, _backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(99);
    let expected = ClinicError::Storage(StorageError::ClinicNotRegistered {
        tenant_id: ctx.tenant_id,
    });

    assert_eq!(repo.get_clinic(&ctx).await.unwrap_err(), expected);
    assert_eq!(
        repo.update_clinic(&ctx, &ClinicUpdate::default())
            .await
            .unwrap_err(),
        expected
    );
}

#[tokio::test]
async fn test_analytics_cached_per_range() {
    let (store, backend, repo) = setup(&[1]);
    let ctx = fixtures::ctx(1);
    let april = DateRange::new(
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
    )
    .unwrap();

    repo.get_appointment_analytics(&ctx, &march()).await.unwrap();
    repo.get_appointment_analytics(&ctx, &april).await.unwrap();
    engine(&repo).flush_pending_writes().await;
    repo.get_appointment_analytics(&ctx, &march()).await.unwrap();

    assert_eq!(store.call_count("appointment_analytics"), 2);
    assert!(backend
        .peek("clinicache:analytics:clinic_1:range:2024-04-01:2024-04-30")
        .is_some());
}

#[tokio::test]
async fn test_appointment_writes_refresh_analytics() {
    let (_store, backend, repo) = setup(&[1, 2]);
    let today = Utc::now().date_naive();
    let window = DateRange::new(today - Duration::days(1), today + Duration::days(30)).unwrap();
    let ctx = fixtures::ctx(1);
    let other = fixtures::ctx(2);

    let before = repo.get_appointment_analytics(&ctx, &window).await.unwrap();
    repo.get_appointment_analytics(&other, &window).await.unwrap();
    engine(&repo).flush_pending_writes().await;
    assert_eq!(before.total_appointments, 0);

    let contact = repo
        .create_contact(&ctx, &fixtures::new_contact("Ana", "1"))
        .await
        .unwrap();
    let appointment = repo
        .create_appointment(
            &ctx,
            &fixtures::new_appointment(contact.id, Utc::now() + Duration::days(2)),
        )
        .await
        .unwrap();
    assert!(backend
        .keys_matching("clinicache:analytics:clinic_1:*")
        .unwrap()
        .is_empty());
    assert_eq!(
        backend
            .keys_matching("clinicache:analytics:clinic_2:*")
            .unwrap()
            .len(),
        1
    );

    let after = repo.get_appointment_analytics(&ctx, &window).await.unwrap();
    assert_eq!(after.total_appointments, 1);
    engine(&repo).flush_pending_writes().await;

    repo.update_appointment_status(&ctx, appointment.id, AppointmentStatus::NoShow)
        .await
        .unwrap();
    let after_status = repo.get_appointment_analytics(&ctx, &window).await.unwrap();
    assert_eq!(after_status.by_status.get("no_show"), Some(&1));
    engine(&repo).flush_pending_writes().await;

    assert!(repo.delete_appointment(&ctx, appointment.id).await.unwrap());
    let after_delete = repo.get_appointment_analytics(&ctx, &window).await.unwrap();
    assert_eq!(after_delete.total_appointments, 0);
}

#[tokio::test]
async fn test_writes_emit_repository_events() {
    let store = Arc::new(fixtures::registered_store(&[1]));
    let (_backend, engine, sink) = fixtures::recording_cache_engine();
    let repo = CachedRepository::new(store, engine);
    let ctx = fixtures::ctx(1);

    let contact = repo
        .create_contact(&ctx, &fixtures::new_contact("Joana", "9"))
        .await
        .unwrap();
    repo.delete_contact(&ctx, contact.id).await.unwrap();

    let writes = sink.named("write");
    let operations: Vec<&str> = writes
        .iter()
        .map(|e| e.attributes["operation"].as_str().unwrap())
        .collect();
    assert_eq!(operations, vec!["create_contact", "delete_contact"]);
    assert_eq!(writes[0].category, "repository");
    assert_eq!(writes[0].attributes["tenant_id"], 1);
}

#[tokio::test]
async fn test_cache_outage_serves_from_store() {
    let store = Arc::new(fixtures::registered_store(&[1]));
    let (_backend, engine) = fixtures::unavailable_cache_engine();
    let repo = CachedRepository::new(store, engine.clone());
    let ctx = fixtures::ctx(1);

    let contact = repo
        .create_contact(&ctx, &fixtures::new_contact("Leo", "10"))
        .await
        .unwrap();
    assert_eq!(repo.get_contact(&ctx, contact.id).await.unwrap(), contact);
    assert_eq!(repo.get_dashboard(&ctx).await.unwrap().total_contacts, 1);
    assert!(engine.metrics().errors > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tenants_only_see_their_own_rows() {
    let tenants: Vec<u64> = (1..=8).collect();
    let (_store, _backend, repo) = setup(&tenants);
    let repo = Arc::new(repo);

    let mut handles = Vec::new();
    for tenant in tenants {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let ctx = fixtures::ctx(tenant);
            repo.create_contact(&ctx, &fixtures::new_contact(&format!("P{tenant}"), "1"))
                .await
                .unwrap();
            for _ in 0..10 {
                let contacts = repo.list_contacts(&ctx, &ContactFilter::default()).await.unwrap();
                assertions::assert_all_owned_by(&contacts, ctx.tenant_id);
                let dashboard = repo.get_dashboard(&ctx).await.unwrap();
                assert_eq!(dashboard.tenant_id, ctx.tenant_id);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}
