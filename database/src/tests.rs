#[cfg(test)]
mod tests {
    use crate::KeywordStore;
    use chrono::{Duration, TimeZone, Utc};
    use keyharvest_core::{CompetitionLevel, CoreError, DatabaseError, KeywordRecord, SeedKeyword};
    use std::env;

    async fn setup_test_db() -> KeywordStore {
        let db_path = env::temp_dir().join(format!("test_keyharvest_{}.db", uuid::Uuid::new_v4()));
        let db_url = format!("sqlite://{}", db_path.display());

        KeywordStore::open(&db_url)
            .await
            .expect("Failed to open test database")
    }

    fn record(text: &str, volume: u64) -> KeywordRecord {
        let mut record = KeywordRecord::new(text);
        record.volume = volume;
        record.competition_level = CompetitionLevel::Low;
        record.trend = 0.25;
        record.category = "gaming".to_string();
        record.seed_keyword = Some("cloud gaming".to_string());
        record
    }

    fn scored(text: &str, similarity: f64, score: f64) -> KeywordRecord {
        let mut record = record(text, 200);
        record.similarity = similarity;
        record.score = score;
        record
    }

    #[tokio::test]
    async fn test_database_connection_and_migrations() {
        let store = setup_test_db().await;
        // Migrations are idempotent
        store.run_migrations().await.expect("Second migration run failed");
        assert!(store.fetch_seed_keywords().await.unwrap().is_empty());
        store.close().await;
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_cache_round_trip_keeps_metadata() {
        let store = setup_test_db().await;
        let written = store
            .write_cache(&[record("cloud gaming pc", 300), record("cloud gaming free", 150)])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let cached = store.fetch_unexpired_cache(Duration::hours(24)).await.unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].text, "cloud gaming pc");
        assert_eq!(cached[0].volume, 300);
        assert_eq!(cached[0].competition_level, CompetitionLevel::Low);
        assert_eq!(cached[0].category, "gaming");
        assert_eq!(cached[0].seed_keyword.as_deref(), Some("cloud gaming"));
    }

    #[tokio::test]
    async fn test_write_cache_ignores_conflicts() {
        let store = setup_test_db().await;
        store.write_cache(&[record("cloud gaming pc", 300)]).await.unwrap();
        let written = store
            .write_cache(&[record("cloud gaming pc", 999), record("cloud gaming tv", 120)])
            .await
            .unwrap();
        assert_eq!(written, 1);

        let cached = store.fetch_unexpired_cache(Duration::hours(24)).await.unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].volume, 300);
    }

    #[tokio::test]
    async fn test_cache_ttl_boundary_is_inclusive() {
        let store = setup_test_db().await;
        let ttl = Duration::hours(24);
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();

        store
            .write_cache_at(&[record("exactly at boundary", 200)], now - ttl)
            .await
            .unwrap();
        store
            .write_cache_at(
                &[record("just expired", 200)],
                now - ttl - Duration::milliseconds(1),
            )
            .await
            .unwrap();
        store
            .write_cache_at(&[record("fresh entry", 200)], now - Duration::hours(1))
            .await
            .unwrap();

        let cached = store.fetch_unexpired_cache_at(ttl, now).await.unwrap();
        let texts: Vec<&str> = cached.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["exactly at boundary", "fresh entry"]);

        let pruned = store.prune_expired_cache_at(ttl, now).await.unwrap();
        assert_eq!(pruned, 1);
        // An expired text can be cached again after pruning
        let written = store
            .write_cache_at(&[record("just expired", 250)], now)
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_blacklist_retention_window() {
        let store = setup_test_db().await;
        let retention = Duration::days(90);
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();

        store.blacklist_at(&["Cloud Gaming PC "], now - retention).await.unwrap();
        store
            .blacklist_at(&["old term"], now - retention - Duration::seconds(1))
            .await
            .unwrap();
        store.blacklist_at(&["ai ethics course"], now).await.unwrap();

        let active = store.fetch_active_blacklist_at(retention, now).await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.contains("cloud gaming pc"));
        assert!(active.contains("ai ethics course"));
        assert!(!active.contains("old term"));
    }

    #[tokio::test]
    async fn test_blacklist_is_idempotent() {
        let store = setup_test_db().await;
        store.blacklist(&["rpg tips", "rpg tips", " "]).await.unwrap();
        store.blacklist(&["RPG tips"]).await.unwrap();

        let active = store.fetch_active_blacklist(Duration::days(90)).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_selection_rejects_blacklisted_terms() {
        let store = setup_test_db().await;
        let retention = Duration::days(90);
        store.blacklist(&["cloud gaming pc"]).await.unwrap();

        let result = store
            .persist_selection(
                &[scored("ai ethics course", 0.7, 0.6), scored("Cloud Gaming PC", 0.9, 0.8)],
                retention,
            )
            .await;
        match result {
            Err(CoreError::Database(DatabaseError::BlacklistedTerm { term })) => {
                assert_eq!(term, "cloud gaming pc")
            }
            other => panic!("expected blacklisted term error, got {:?}", other),
        }
        assert!(store.recent_selections(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_selection_skips_existing_texts() {
        let store = setup_test_db().await;
        let retention = Duration::days(90);
        let written = store
            .persist_selection(&[scored("cloud gaming pc", 0.9, 0.8)], retention)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let written = store
            .persist_selection(
                &[scored("cloud gaming pc", 0.9, 0.8), scored("ai ethics course", 0.7, 0.6)],
                retention,
            )
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_recent_selections_newest_first() {
        let store = setup_test_db().await;
        let retention = Duration::days(90);
        let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap();

        store
            .persist_selection_at(&[scored("older pick", 0.5, 0.4)], retention, earlier)
            .await
            .unwrap();
        store
            .persist_selection_at(
                &[scored("newer pick", 0.6, 0.5), scored("newest pick", 0.7, 0.6)],
                retention,
                later,
            )
            .await
            .unwrap();

        let recent = store.recent_selections(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "newest pick");
        assert_eq!(recent[1].text, "newer pick");
        assert_eq!(recent[0].created_at, later);
        assert!((recent[0].score - 0.6).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_seed_keywords() {
        let store = setup_test_db().await;
        assert!(store
            .add_seed_keyword(&SeedKeyword::new(" Cloud Gaming ", "gaming"))
            .await
            .unwrap());
        assert!(!store
            .add_seed_keyword(&SeedKeyword::new("cloud gaming", "lifestyle"))
            .await
            .unwrap());
        assert!(store
            .add_seed_keyword(&SeedKeyword::new("ai ethics", "ai_ethics"))
            .await
            .unwrap());

        let seeds = store.fetch_seed_keywords().await.unwrap();
        assert_eq!(
            seeds,
            vec![
                SeedKeyword::new("cloud gaming", "gaming"),
                SeedKeyword::new("ai ethics", "ai_ethics"),
            ]
        );

        let empty = store.add_seed_keyword(&SeedKeyword::new("   ", "gaming")).await;
        assert!(matches!(empty, Err(CoreError::InvalidInput { .. })));
    }
}
