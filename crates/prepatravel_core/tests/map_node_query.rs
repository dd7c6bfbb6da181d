use prepatravel_core::db::open_db_in_memory;
use prepatravel_core::{
    ManualClock, MapNode, MapNodePatch, MapNodeRepository, MapNodeService, NewMapNode,
    NodeCursor, NodeFilter, NumericRange, RepoResult, SqliteMapNodeRepository,
};
use rusqlite::Connection;
use std::sync::Arc;

fn seed(repo: &SqliteMapNodeRepository<'_, Arc<ManualClock>>, clock: &ManualClock) -> Vec<i64> {
    let inputs = [
        ("Cafe", 48.85, 2.35, "coffee"),
        ("Museum", 48.86, 2.33, "art"),
        ("Cafe", 41.90, 12.49, "espresso"),
        ("Park", 40.78, -73.96, "green"),
        ("Cafe", 40.73, -73.99, "coffee"),
    ];
    inputs
        .iter()
        .map(|(name, lat, lng, description)| {
            clock.advance(100);
            repo.create_node(&NewMapNode::new(*name, *lat, *lng, *description))
                .unwrap()
        })
        .collect()
}

fn with_repo(test: impl FnOnce(&SqliteMapNodeRepository<'_, Arc<ManualClock>>, &ManualClock, Vec<i64>)) {
    let conn: Connection = open_db_in_memory().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let repo = SqliteMapNodeRepository::with_clock(&conn, Arc::clone(&clock)).unwrap();
    let ids = seed(&repo, &*clock);
    test(&repo, &*clock, ids);
}

fn ids_of(results: impl Iterator<Item = RepoResult<MapNode>>) -> Vec<i64> {
    results.map(|node| node.unwrap().id).collect()
}

#[test]
fn name_query_returns_exact_matches_in_insertion_order() {
    with_repo(|repo, _, ids| {
        let found = ids_of(repo.query_nodes(NodeFilter::Name("Cafe".to_string())));
        assert_eq!(found, vec![ids[0], ids[2], ids[4]]);

        let none = ids_of(repo.query_nodes(NodeFilter::Name("cafe".to_string())));
        assert!(none.is_empty());
    });
}

#[test]
fn description_query_matches_exactly() {
    with_repo(|repo, _, ids| {
        let found = ids_of(repo.query_nodes(NodeFilter::Description("coffee".to_string())));
        assert_eq!(found, vec![ids[0], ids[4]]);
    });
}

#[test]
fn coordinate_range_query_orders_by_field() {
    with_repo(|repo, _, ids| {
        let west = ids_of(repo.query_nodes(NodeFilter::Lng(NumericRange::at_most(0.0))));
        // -73.99 sorts before -73.96.
        assert_eq!(west, vec![ids[4], ids[3]]);

        let europe = ids_of(repo.query_nodes(NodeFilter::Lat(NumericRange::between(41.0, 49.0))));
        assert_eq!(europe, vec![ids[2], ids[0], ids[1]]);
    });
}

#[test]
fn exact_numeric_match_uses_degenerate_range() {
    with_repo(|repo, _, ids| {
        let found = ids_of(repo.query_nodes(NodeFilter::Lat(NumericRange::exact(48.86))));
        assert_eq!(found, vec![ids[1]]);
    });
}

#[test]
fn time_range_queries_follow_timestamps() {
    with_repo(|repo, clock, ids| {
        let created = ids_of(repo.query_nodes(NodeFilter::CreatedAt(NumericRange::at_least(1_300))));
        assert_eq!(created, vec![ids[2], ids[3], ids[4]]);

        clock.advance(100);
        repo.update_node(ids[0], &MapNodePatch::default().description("closed"))
            .unwrap();

        let recent = ids_of(repo.query_nodes(NodeFilter::UpdatedAt(NumericRange::at_least(1_400))));
        assert_eq!(recent, vec![ids[3], ids[4], ids[0]]);
    });
}

#[test]
fn cursor_pages_through_ties_without_skipping_or_repeating() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(ManualClock::new(7_000));
    let repo = SqliteMapNodeRepository::with_clock(&conn, Arc::clone(&clock)).unwrap();

    let mut expected = Vec::new();
    for index in 0..10 {
        let lat = if index % 2 == 0 { 10.0 } else { 20.0 };
        expected.push((lat, repo.create_node(&NewMapNode::new("p", lat, 0.0, "")).unwrap()));
    }
    expected.sort_by(|left, right| left.0.total_cmp(&right.0).then(left.1.cmp(&right.1)));
    let expected: Vec<i64> = expected.into_iter().map(|(_, id)| id).collect();

    let cursor = NodeCursor::new(&repo, NodeFilter::Lat(NumericRange::default())).with_page_size(3);
    assert_eq!(ids_of(cursor), expected);

    // Every row shares created_at, so ordering falls back to id.
    let cursor = NodeCursor::new(&repo, NodeFilter::CreatedAt(NumericRange::exact(7_000)))
        .with_page_size(4);
    let mut by_id = expected.clone();
    by_id.sort_unstable();
    assert_eq!(ids_of(cursor), by_id);
}

#[test]
fn cursor_is_lazy_and_observes_later_deletes() {
    with_repo(|repo, _, ids| {
        let mut cursor = NodeCursor::new(repo, NodeFilter::All).with_page_size(2);

        assert_eq!(cursor.next().unwrap().unwrap().id, ids[0]);
        repo.create_node(&NewMapNode::new("Late", 0.0, 0.0, ""))
            .unwrap();
        repo.delete_node(ids[3]).unwrap();

        // The insert lands past the run's horizon; the delete is seen.
        let rest = ids_of(cursor.by_ref());
        assert_eq!(rest, vec![ids[1], ids[2], ids[4]]);
        assert!(cursor.next().is_none());
    });
}

#[test]
fn touching_every_node_by_updated_at_terminates() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let repo = SqliteMapNodeRepository::with_clock(&conn, Arc::clone(&clock)).unwrap();
    for index in 0..100 {
        clock.advance(1);
        repo.create_node(&NewMapNode::new(format!("n{index}"), 0.0, 0.0, ""))
            .unwrap();
    }

    let mut visited = Vec::new();
    let cursor = NodeCursor::new(&repo, NodeFilter::UpdatedAt(NumericRange::default()))
        .with_page_size(8)
        .take(1_000);
    for node in cursor {
        let node = node.unwrap();
        clock.advance(1);
        repo.update_node(node.id, &MapNodePatch::default().description("seen"))
            .unwrap();
        visited.push(node.id);
    }

    assert_eq!(visited.len(), 100);
    visited.sort_unstable();
    visited.dedup();
    assert_eq!(visited.len(), 100);
}

#[test]
fn inserting_while_iterating_all_terminates() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMapNodeRepository::try_new(&conn).unwrap();
    for index in 0..100 {
        repo.create_node(&NewMapNode::new(format!("n{index}"), 1.0, 2.0, ""))
            .unwrap();
    }

    let mut yielded = 0;
    for node in repo.query_nodes(NodeFilter::All).take(1_000) {
        let node = node.unwrap();
        repo.create_node(&node.to_new()).unwrap();
        yielded += 1;
    }

    assert_eq!(yielded, 100);
    assert_eq!(repo.count_nodes().unwrap(), 200);
}

#[test]
fn inserting_ties_while_iterating_sorted_filter_terminates() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMapNodeRepository::try_new(&conn).unwrap();
    for index in 0..20 {
        repo.create_node(&NewMapNode::new("p", f64::from(index % 4), 0.0, ""))
            .unwrap();
    }

    let cursor = NodeCursor::new(&repo, NodeFilter::Lat(NumericRange::default()))
        .with_page_size(3)
        .take(1_000);
    let mut yielded = 0;
    for node in cursor {
        repo.create_node(&node.unwrap().to_new()).unwrap();
        yielded += 1;
    }

    assert_eq!(yielded, 20);
}

#[test]
fn cursor_over_empty_match_yields_nothing() {
    with_repo(|repo, _, _| {
        let mut cursor = repo.query_nodes(NodeFilter::Name("Nowhere".to_string()));
        assert!(cursor.next().is_none());

        let id = repo
            .create_node(&NewMapNode::new("Nowhere", 0.0, 0.0, ""))
            .unwrap();
        cursor.restart();
        assert_eq!(ids_of(cursor), vec![id]);
    });
}

#[test]
fn restart_re_executes_against_current_state() {
    with_repo(|repo, _, ids| {
        let mut cursor = repo.query_nodes(NodeFilter::Name("Cafe".to_string()));
        assert_eq!(ids_of(cursor.by_ref()), vec![ids[0], ids[2], ids[4]]);

        repo.delete_node(ids[2]).unwrap();
        cursor.restart();
        assert_eq!(ids_of(cursor), vec![ids[0], ids[4]]);
    });
}

#[test]
fn cursor_surfaces_storage_errors_then_stops() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMapNodeRepository::try_new(&conn).unwrap();
    repo.create_node(&NewMapNode::new("x", 0.0, 0.0, "")).unwrap();
    conn.execute_batch("DROP TABLE map_nodes;").unwrap();

    let mut cursor = repo.query_nodes(NodeFilter::All);
    let first = cursor.next().unwrap();
    assert!(first.unwrap_err().is_storage_failure());
    assert!(cursor.next().is_none());
}

#[test]
fn service_exposes_lazy_queries() {
    let conn = open_db_in_memory().unwrap();
    let service = MapNodeService::new(SqliteMapNodeRepository::try_new(&conn).unwrap());
    let id = service.drop_pin("Harbour", -33.86, 151.21).unwrap();

    let found = ids_of(service.query_nodes(NodeFilter::Name("Harbour".to_string())));
    assert_eq!(found, vec![id]);
}
