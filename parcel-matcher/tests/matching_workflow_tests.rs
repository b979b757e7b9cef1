//! End-to-end matching against a file-backed database

mod helpers;

use chrono::{Duration, Utc};
use helpers::*;
use parcel_common::Coordinate;
use parcel_matcher::models::{MatchMethod, PhotoRecord, ProcessingStatus};

const LAT: f64 = 40.0381;
const LON: f64 = -76.3057;

fn center() -> Coordinate {
    Coordinate::new(LAT, LON)
}

#[tokio::test]
async fn test_photo_at_parcel_center_is_matched() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let provider = MockParcelProvider::serving(vec![fixture_parcel("39-011-002", center(), 0.0005)]);
    let orchestrator = create_test_orchestrator(&pool, provider.clone());

    let sibling = PhotoRecord::at(LAT, LON).with_batch("roll-1").with_altitude(120.0);
    let photo = PhotoRecord::at(LAT, LON)
        .with_batch("roll-1")
        .with_altitude(120.0)
        .with_captured_at(Utc::now() - Duration::hours(2));
    insert_photos(&pool, &[sibling, photo.clone()]).await.unwrap();

    let result = orchestrator.process_photo(photo.id).await.unwrap();
    assert_eq!(result.outcome.method(), MatchMethod::ParcelMatch);
    assert!(result.outcome.confidence().unwrap() >= 0.99);

    let stored = reload_photo(&pool, photo.id).await;
    assert_eq!(stored.processing_status, ProcessingStatus::Processed);
    assert_eq!(stored.property_id, result.outcome.property_id());
    let metadata = stored.match_metadata.unwrap();
    assert_eq!(metadata.method, MatchMethod::ParcelMatch);
    assert_eq!(metadata.parcel_number.as_deref(), Some("39-011-002"));
    assert_eq!(count_live_properties(&pool).await, 1);
}

#[tokio::test]
async fn test_photo_without_coordinates_never_reaches_provider() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let provider = MockParcelProvider::serving(vec![fixture_parcel("39-011-002", center(), 0.0005)]);
    let orchestrator = create_test_orchestrator(&pool, provider.clone());

    let photo = PhotoRecord::new(None, None);
    insert_photos(&pool, &[photo.clone()]).await.unwrap();

    let summary = orchestrator.process_pending_photos().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.by_method.get(&MatchMethod::NoCoordinates), Some(&1));
    assert_eq!(provider.calls(), 0);

    let stored = reload_photo(&pool, photo.id).await;
    assert_eq!(stored.processing_status, ProcessingStatus::Pending);
    assert!(stored.property_id.is_none());
}

#[tokio::test]
async fn test_off_center_photo_inside_parcel_is_low_confidence() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let provider = MockParcelProvider::serving(vec![fixture_parcel("39-011-002", center(), 0.0005)]);
    let orchestrator = create_test_orchestrator(&pool, provider);

    // ~33 m north of the reference point, still inside the boundary
    let photo = PhotoRecord::at(LAT + 0.0003, LON).with_captured_at(Utc::now());
    insert_photos(&pool, &[photo.clone()]).await.unwrap();

    let result = orchestrator.process_photo(photo.id).await.unwrap();
    assert_eq!(result.outcome.method(), MatchMethod::LowConfidence);
    assert!(result.outcome.confidence().unwrap() < 0.99);

    let stored = reload_photo(&pool, photo.id).await;
    assert_eq!(stored.processing_status, ProcessingStatus::Pending);
    assert!(stored.property_id.is_none());
    assert_eq!(count_live_properties(&pool).await, 0);
}

#[tokio::test]
async fn test_concurrent_photos_share_one_property() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let provider = MockParcelProvider::slow(
        vec![fixture_parcel("39-011-002", center(), 0.0005)],
        std::time::Duration::from_millis(20),
    );
    let orchestrator = create_test_orchestrator(&pool, provider);

    let first = PhotoRecord::at(LAT, LON);
    let second = PhotoRecord::at(LAT, LON);
    insert_photos(&pool, &[first.clone(), second.clone()]).await.unwrap();

    let (a, b) = tokio::join!(
        orchestrator.process_photo(first.id),
        orchestrator.process_photo(second.id)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.outcome.is_matched(), "unexpected {:?}", a.outcome);
    assert!(b.outcome.is_matched(), "unexpected {:?}", b.outcome);
    assert_eq!(a.outcome.property_id(), b.outcome.property_id());
    assert_eq!(count_live_properties(&pool).await, 1);
}

#[tokio::test]
async fn test_manual_assignment_survives_revalidation() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let provider = MockParcelProvider::serving(vec![fixture_parcel("39-011-002", center(), 0.0005)]);
    let orchestrator = create_test_orchestrator(&pool, provider);

    let matched = PhotoRecord::at(LAT, LON);
    // Far outside the parcel: never matched automatically
    let stray = PhotoRecord::at(LAT + 0.01, LON + 0.01);
    insert_photos(&pool, &[matched.clone(), stray.clone()]).await.unwrap();

    let property_id = orchestrator
        .process_photo(matched.id)
        .await
        .unwrap()
        .outcome
        .property_id()
        .expect("center photo should match");

    let manual = orchestrator
        .manually_assign_photo(stray.id, property_id)
        .await
        .unwrap();
    assert_eq!(manual.outcome.method(), MatchMethod::ManualAssignment);

    let summary = orchestrator.revalidate_photo_assignments().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.results[0].photo_id, matched.id);

    let stored = reload_photo(&pool, stray.id).await;
    assert_eq!(stored.property_id, Some(property_id));
    assert_eq!(stored.processing_status, ProcessingStatus::Processed);
    assert_eq!(stored.match_metadata.unwrap().method, MatchMethod::ManualAssignment);
}

#[tokio::test]
async fn test_cancelled_batch_reports_skipped_photos() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let provider = MockParcelProvider::serving(Vec::new());
    let orchestrator = create_test_orchestrator(&pool, provider.clone());

    let pending: Vec<PhotoRecord> = (0..3).map(|i| PhotoRecord::at(LAT + i as f64, LON)).collect();
    insert_photos(&pool, &pending).await.unwrap();

    orchestrator.cancellation_token().cancel();
    let summary = orchestrator.process_pending_photos().await.unwrap();
    assert_eq!(summary.total, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(provider.calls(), 0);
}
