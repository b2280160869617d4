use smartopen_core::{Candidate, UsageRecord, UsageSnapshot, recency_score};
use smartopen_rank::{
    CandidateEvent, CandidateSnapshot, HINT_LABEL, RankedKind, RankingOptions, RankingSession,
    SmartOpenService,
};
use smartopen_store::{SqliteUsageStore, UsageStore};
use tempfile::tempdir;

const NOW: i64 = 1_700_000_000_000;

fn universe(paths: &[&str]) -> Vec<Candidate> {
    paths.iter().map(Candidate::from_relative).collect()
}

#[test]
fn query_ranks_matching_files_above_non_matching_ones() {
    let options = RankingOptions::default();
    let usage = UsageSnapshot::new();
    let session = RankingSession::new(&options, &usage, None, NOW);
    let candidates = universe(&["src/foo.ts", "src/bar.ts", "test/foo.ts"]);

    let first = session.rank("foo", &candidates);
    let paths = first
        .iter()
        .map(|result| result.relative_path.as_str())
        .collect::<Vec<_>>();

    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&"src/foo.ts"));
    assert!(paths.contains(&"test/foo.ts"));
    assert!(!paths.contains(&"src/bar.ts"));

    for _ in 0..3 {
        assert_eq!(session.rank("foo", &candidates), first);
    }
}

#[test]
fn single_character_query_yields_one_hint_for_any_universe() {
    let options = RankingOptions::default();
    let usage = UsageSnapshot::new();
    let session = RankingSession::new(&options, &usage, None, NOW);

    let large = (0..500)
        .map(|index| Candidate::from_relative(format!("pkg/module_{index}.rs")))
        .collect::<Vec<_>>();

    for candidates in [Vec::new(), large] {
        let results = session.rank("m", &candidates);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, RankedKind::Hint);
        assert_eq!(results[0].label, HINT_LABEL);
    }
}

#[test]
fn identical_scores_sort_by_path_then_id() {
    let options = RankingOptions::default();
    let usage = UsageSnapshot::new();
    let session = RankingSession::new(&options, &usage, None, NOW);

    let candidates = vec![
        Candidate::new("id-9", "lib/beta/index.ts"),
        Candidate::new("id-2", "lib/acme/index.ts"),
        Candidate::new("id-1", "lib/acme/index.ts"),
    ];

    for _ in 0..3 {
        let results = session.rank("index", &candidates);
        let order = results
            .iter()
            .map(|result| result.id.as_deref().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["id-1", "id-2", "id-9"]);
        assert_eq!(results[0].scores.final_score, results[2].scores.final_score);
    }
}

#[test]
fn recency_is_one_at_zero_elapsed_and_decreases() {
    assert_eq!(recency_score(Some(NOW), NOW, 0.001), 1.0);

    let day = 86_400_000;
    let mut previous = 1.0;
    for days in [1, 10, 100, 1000] {
        let score = recency_score(Some(NOW - days * day), NOW, 0.001);
        assert!(score < previous);
        previous = score;
    }
}

#[test]
fn closeness_favors_neighbors_of_the_active_file() {
    let options = RankingOptions::default();
    let usage = UsageSnapshot::new();
    let candidates = universe(&["api/views/user.rs", "web/views/user.rs"]);

    let near_api = RankingSession::new(&options, &usage, Some("api/views/mod.rs"), NOW)
        .rank("user", &candidates);
    assert_eq!(near_api[0].relative_path, "api/views/user.rs");
    assert!(near_api[0].scores.close > near_api[1].scores.close);

    let near_web = RankingSession::new(&options, &usage, Some("web/views/mod.rs"), NOW)
        .rank("user", &candidates);
    assert_eq!(near_web[0].relative_path, "web/views/user.rs");
}

#[test]
fn heavy_usage_outranks_a_slightly_better_match() {
    let options = RankingOptions::default();
    let mut usage = UsageSnapshot::new();
    usage.insert(
        "docs/config_guide.md".to_owned(),
        UsageRecord {
            last_accessed: NOW - 60_000,
            access_count: 400,
        },
    );
    let session = RankingSession::new(&options, &usage, None, NOW);

    let results = session.rank(
        "config",
        &universe(&["config.rs", "docs/config_guide.md", "src/c_o_n_f_i_g.rs"]),
    );
    assert_eq!(results[0].relative_path, "docs/config_guide.md");

    let best_match = results
        .iter()
        .find(|result| result.relative_path == "config.rs")
        .expect("config.rs ranked");
    assert!(results[0].scores.raw < best_match.scores.raw);
}

#[test]
fn service_round_trip_through_sqlite_and_snapshot_events() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteUsageStore::open(temp.path()).expect("open store");
    let service = SmartOpenService::new(store, RankingOptions::default(), Default::default());

    let mut snapshot = CandidateSnapshot::from_candidates(universe(&["src/app.rs"]));
    assert!(snapshot.apply(CandidateEvent::Added(Candidate::from_relative("lib/app.rs"))));

    let before = service
        .rank("app", snapshot.candidates(), None, NOW)
        .expect("rank");
    assert_eq!(before[0].relative_path, "lib/app.rs");

    service
        .record_selection("src/app.rs", NOW)
        .expect("record selection");
    assert_eq!(
        service
            .store()
            .get("src/app.rs")
            .expect("get")
            .map(|record| record.access_count),
        Some(1)
    );

    let after = service
        .rank("app", snapshot.candidates(), None, NOW + 1_000)
        .expect("rank again");
    assert_eq!(after[0].relative_path, "src/app.rs");

    assert!(snapshot.apply(CandidateEvent::Removed("src/app.rs".to_owned())));
    let removed = service
        .rank("app", snapshot.candidates(), None, NOW + 2_000)
        .expect("rank after removal");
    assert_eq!(removed.len(), 1);
}
