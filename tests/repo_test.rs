mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};

use common::{form, ids, insert, setup_db};
use photo_catalog::db::{self, Db, PhotoQuery};
use photo_catalog::form::PhotoForm;
use photo_catalog::model::{Camera, FilmSimulation, SortBy, TAG_FAVS};

#[tokio::test]
async fn listing_orders_by_capture_time_and_hides_hidden() {
    let db = setup_db().await;
    insert(&db, form("aaaa0001", 1)).await;
    insert(&db, form("aaaa0002", 3)).await;
    insert(&db, form("aaaa0003", 2)).await;
    insert(
        &db,
        PhotoForm {
            hidden: Some("true".into()),
            ..form("aaaa0004", 4)
        },
    )
    .await;

    let photos = db::list_photos(&db, &PhotoQuery::new(), SortBy::TakenAt).await.unwrap();
    assert_eq!(ids(&photos), vec!["aaaa0002", "aaaa0003", "aaaa0001"]);

    let all = db::list_photos(&db, &PhotoQuery::new().include_hidden(), SortBy::TakenAt)
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].id, "aaaa0004");
    assert!(all[0].hidden);

    let page = db::list_photos(&db, &PhotoQuery::new().limit(1).offset(1), SortBy::TakenAt)
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["aaaa0003"]);
}

#[tokio::test]
async fn priority_order_sorts_nulls_last() {
    let db = setup_db().await;
    insert(&db, form("bbbb0001", 5)).await;
    insert(
        &db,
        PhotoForm {
            priority_order: Some("2".into()),
            ..form("bbbb0002", 1)
        },
    )
    .await;
    insert(
        &db,
        PhotoForm {
            priority_order: Some("1".into()),
            ..form("bbbb0003", 2)
        },
    )
    .await;
    insert(&db, form("bbbb0004", 6)).await;

    let photos = db::list_photos(&db, &PhotoQuery::new(), SortBy::Priority).await.unwrap();
    assert_eq!(ids(&photos), vec!["bbbb0003", "bbbb0002", "bbbb0004", "bbbb0001"]);
}

#[tokio::test]
async fn near_id_returns_previous_target_and_next() {
    let db = setup_db().await;
    for i in 1..=10u32 {
        insert(
            &db,
            PhotoForm {
                priority_order: Some(i.to_string()),
                ..form(&format!("photo{:03}", i), i)
            },
        )
        .await;
    }

    let window = db::photos_near_id(&db, "photo005", 3, SortBy::Priority).await.unwrap();
    assert_eq!(ids(&window), vec!["photo004", "photo005", "photo006"]);

    let first = db::photos_near_id(&db, "photo001", 2, SortBy::Priority).await.unwrap();
    assert_eq!(ids(&first), vec!["photo001", "photo002"]);

    let missing = db::photos_near_id(&db, "zzzzzzzz", 3, SortBy::Priority).await.unwrap();
    assert!(missing.is_empty());

    let err = db::photos_near_id(&db, "photo005", 0, SortBy::Priority).await.unwrap_err();
    assert_eq!(err.field(), Some("limit"));
}

#[tokio::test]
async fn camera_lookup_folds_case_spaces_and_hyphens() {
    let db = setup_db().await;
    insert(
        &db,
        PhotoForm {
            make: Some("fujifilm".into()),
            model: Some("X100-V".into()),
            film_simulation: Some("classic-chrome".into()),
            ..form("cccc0001", 1)
        },
    )
    .await;
    insert(
        &db,
        PhotoForm {
            make: Some("Canon".into()),
            model: Some("EOS R5".into()),
            ..form("cccc0002", 2)
        },
    )
    .await;

    let query = PhotoQuery::new().camera(Camera::new("Fujifilm", "X100V"));
    let photos = db::list_photos(&db, &query, SortBy::TakenAt).await.unwrap();
    assert_eq!(ids(&photos), vec!["cccc0001"]);

    let query = PhotoQuery::new().camera(Camera::new("CANON", "eos-r5"));
    assert_eq!(db::count_photos(&db, &query).await.unwrap(), 1);

    let cameras = db::unique_cameras(&db).await.unwrap();
    let keys: Vec<_> = cameras.iter().map(|c| c.camera_key.as_str()).collect();
    assert_eq!(keys, vec!["canon-eos-r5", "fujifilm-x100-v"]);

    let films = db::unique_film_simulations(&db).await.unwrap();
    assert_eq!(films.len(), 1);
    assert_eq!(films[0].simulation, FilmSimulation::ClassicChrome);
    assert_eq!(
        db::film_simulation_count(&db, FilmSimulation::ClassicChrome).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn rename_tag_rewrites_every_photo_in_place() {
    let db = setup_db().await;
    let tagged = [
        ("dddd0001", "a, x, b"),
        ("dddd0002", "x"),
        ("dddd0003", "c, x"),
        ("dddd0004", "a"),
    ];
    for (hour, (id, tags)) in tagged.iter().enumerate() {
        insert(
            &db,
            PhotoForm {
                tags: Some(tags.to_string()),
                ..form(id, hour as u32)
            },
        )
        .await;
    }

    let updated = db::rename_tag_globally(&db, "x", "y").await.unwrap();
    assert_eq!(updated, 3);
    assert_eq!(db::tag_count(&db, "x").await.unwrap(), 0);
    assert_eq!(db::tag_count(&db, "y").await.unwrap(), 3);

    let first = db::get_photo(&db, "dddd0001").await.unwrap().unwrap();
    assert_eq!(first.tags, vec!["a", "y", "b"]);
    let untouched = db::get_photo(&db, "dddd0004").await.unwrap().unwrap();
    assert_eq!(untouched.tags, vec!["a"]);
}

#[tokio::test]
async fn delete_tag_nulls_emptied_arrays() {
    let db = setup_db().await;
    insert(&db, PhotoForm { tags: Some("solo".into()), ..form("eeee0001", 1) }).await;
    insert(&db, PhotoForm { tags: Some("solo, keep".into()), ..form("eeee0002", 2) }).await;

    assert_eq!(db::delete_tag_globally(&db, "solo").await.unwrap(), 2);

    let emptied = db::get_photo(&db, "eeee0001").await.unwrap().unwrap();
    assert!(emptied.tags.is_empty());
    let raw: Option<String> = sqlx::query_scalar("SELECT tags FROM photos WHERE id = 'eeee0001'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(raw, None);

    let tags = db::unique_tags(&db).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag, "keep");
    assert_eq!(tags[0].count, 1);
}

#[tokio::test]
async fn round_trip_preserves_ratio_tags_and_capture_time() {
    let db = setup_db().await;
    let record = insert(
        &db,
        PhotoForm {
            aspect_ratio: Some("1.3333333333".into()),
            tags: Some("night, city".into()),
            favorite: Some("true".into()),
            iso: Some("".into()),
            f_number: Some("2.8".into()),
            ..form("ffff0001", 3)
        },
    )
    .await;

    let photo = db::get_photo(&db, &record.id).await.unwrap().unwrap();
    assert_eq!(photo.aspect_ratio, 1.333333);
    assert_eq!(photo.tags, vec!["night", "city", TAG_FAVS]);
    assert!(photo.is_favorite());
    assert_eq!(photo.iso, None);
    assert_eq!(photo.f_number, Some(2.8));
    assert_eq!(photo.taken, record.taken);
    assert_eq!(photo.taken.naive_string(), "2024-01-01 12:00:00");
    assert_eq!(photo.taken.offset().map(|o| o.local_minus_utc()), Some(9 * 3600));

    let form_view = PhotoForm::from_photo(&photo);
    assert_eq!(form_view.tags.as_deref(), Some("night, city"));
    assert_eq!(form_view.favorite.as_deref(), Some("true"));
    assert_eq!(form_view.into_record(false).unwrap(), photo_catalog::db::PhotoRecord::from(&photo));
}

#[tokio::test]
async fn update_replaces_columns_and_refreshes_updated_at() {
    let db = setup_db().await;
    let record = insert(&db, PhotoForm { title: Some("Before".into()), ..form("gggg0001", 1) }).await;
    let before = db::get_photo(&db, &record.id).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let mut changed = record.clone();
    changed.title = None;
    changed.priority_order = Some(0.0);
    assert_eq!(db::update_photo(&db, &changed).await.unwrap(), 1);

    let after = db::get_photo(&db, &record.id).await.unwrap().unwrap();
    assert_eq!(after.title, None);
    assert_eq!(after.priority_order, Some(0.0));
    assert!(after.updated_at > before.updated_at);
    assert_eq!(after.created_at, before.created_at);

    let mut missing = record;
    missing.id = "zzzz9999".into();
    assert_eq!(db::update_photo(&db, &missing).await.unwrap(), 0);
}

#[tokio::test]
async fn date_ranges_and_counts_follow_predicates() {
    let db = setup_db().await;
    insert(&db, PhotoForm { tags: Some("trip".into()), ..form("hhhh0001", 1) }).await;
    insert(&db, PhotoForm { tags: Some("trip".into()), ..form("hhhh0002", 5) }).await;
    insert(&db, PhotoForm { hidden: Some("true".into()), ..form("hhhh0003", 8) }).await;

    assert_eq!(db::photos_count(&db).await.unwrap(), 2);
    assert_eq!(db::photos_count_including_hidden(&db).await.unwrap(), 3);

    let range = db::tag_date_range(&db, "trip").await.unwrap();
    assert_eq!(range.start.as_deref(), Some("2024-01-01 10:00:00"));
    assert_eq!(range.end.as_deref(), Some("2024-01-01 14:00:00"));

    let empty = db::tag_date_range(&db, "nothing").await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn listing_a_missing_table_creates_it() {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let db = Db::new(pool, Duration::from_millis(10));

    let photos = db::list_photos(&db, &PhotoQuery::new(), SortBy::Priority).await.unwrap();
    assert!(photos.is_empty());

    insert(&db, form("iiii0001", 1)).await;
    assert_eq!(db::photos_count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn capture_bounds_and_creation_order() {
    let db = setup_db().await;
    insert(&db, form("date0001", 1)).await;
    insert(&db, form("date0002", 2)).await;
    insert(&db, form("date0003", 3)).await;

    let pivot = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
    let before = db::list_photos(&db, &PhotoQuery::new().taken_before(pivot), SortBy::TakenAt)
        .await
        .unwrap();
    assert_eq!(ids(&before), vec!["date0003"]);
    let after = db::list_photos(&db, &PhotoQuery::new().taken_after_inclusive(pivot), SortBy::TakenAt)
        .await
        .unwrap();
    assert_eq!(ids(&after), vec!["date0002", "date0001"]);

    for (id, created) in [
        ("date0001", "2024-06-03T00:00:00.000Z"),
        ("date0002", "2024-06-01T00:00:00.000Z"),
        ("date0003", "2024-06-02T00:00:00.000Z"),
    ] {
        sqlx::query("UPDATE photos SET created_at = ? WHERE id = ?")
            .bind(created)
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }
    let created = db::list_photos(&db, &PhotoQuery::new().sort_by(SortBy::CreatedAt), SortBy::Priority)
        .await
        .unwrap();
    assert_eq!(ids(&created), vec!["date0001", "date0003", "date0002"]);
}
