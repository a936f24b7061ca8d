use proptest::prelude::*;
use std::collections::HashSet;
use warden_core::config::StoreConfig;
use warden_core::model::{Status, WorkItem};
use warden_core::store::Store;

const STATUSES: [Status; 5] = Status::ALL;

fn open_store(dir: &std::path::Path) -> Store {
    let store = Store::open(dir, StoreConfig::default());
    store.init().expect("init store");
    store
}

/// Up to eight items: (priority, status index) pairs.
fn arb_items() -> impl Strategy<Value = Vec<(u8, usize)>> {
    prop::collection::vec((0_u8..=4, 0_usize..STATUSES.len()), 1..8)
}

/// Blocking edges between item indexes; self edges are filtered by the test.
fn arb_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0_usize..8, 0_usize..8), 0..12)
}

fn populate(store: &Store, items: &[(u8, usize)], edges: &[(usize, usize)]) -> Vec<String> {
    let mut ids = Vec::new();
    for (n, (priority, status)) in items.iter().enumerate() {
        let mut item = WorkItem::new(format!("item {n}")).with_priority(*priority);
        item.created_by = Some("prop".into());
        let created = store.create(item).expect("create");
        if STATUSES[*status] != Status::Open {
            let mut changed = created.clone();
            changed.status = STATUSES[*status];
            store.update(changed, "prop").expect("update");
        }
        ids.push(created.id);
    }
    for (from, to) in edges {
        let (Some(from), Some(to)) = (ids.get(*from), ids.get(*to)) else {
            continue;
        };
        if from != to {
            store.add_dependency(from, to).expect("add dependency");
        }
    }
    ids
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(48))]

    #[test]
    fn ready_set_is_exactly_open_unblocked_items_by_priority(
        items in arb_items(),
        edges in arb_edges(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        populate(&store, &items, &edges);

        let all = store.list(&Default::default()).unwrap();
        let held: HashSet<&str> = all
            .iter()
            .filter(|item| !item.status.is_closed())
            .flat_map(|item| item.blocks.iter().map(String::as_str))
            .collect();
        let expected: HashSet<&str> = all
            .iter()
            .filter(|item| item.status == Status::Open && !held.contains(item.id.as_str()))
            .map(|item| item.id.as_str())
            .collect();

        let ready = store.list_ready(None).unwrap();
        let got: HashSet<&str> = ready.iter().map(|item| item.id.as_str()).collect();
        prop_assert_eq!(got, expected);
        prop_assert!(ready.windows(2).all(|pair| pair[0].priority <= pair[1].priority));
    }

    #[test]
    fn ids_are_unique(count in 1_usize..40) {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let mut seen = HashSet::new();
        for n in 0..count {
            let created = store.create(WorkItem::new(format!("item {n}"))).unwrap();
            prop_assert!(created.id.starts_with("wd-"));
            prop_assert!(seen.insert(created.id));
        }
    }

    #[test]
    fn history_only_grows(steps in prop::collection::vec(0_usize..STATUSES.len(), 1..10)) {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let mut current = store.create(WorkItem::new("audited")).unwrap();

        for step in steps {
            let before = current.history.clone();
            let mut next = current.clone();
            next.status = STATUSES[step];
            current = store.update(next, "prop").unwrap();

            prop_assert!(current.history.len() >= before.len());
            prop_assert_eq!(&current.history[..before.len()], &before[..]);
            prop_assert_eq!(current.closed_at.is_some(), current.status.is_closed());
        }
    }

    #[test]
    fn dependency_tree_terminates_on_any_graph(
        items in arb_items(),
        edges in arb_edges(),
        root in 0_usize..8,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let ids = populate(&store, &items, &edges);
        let root_id = &ids[root % ids.len()];

        let tree = store.dependency_tree(root_id).unwrap();
        prop_assert_eq!(&tree.root.id, root_id);
    }
}

#[test]
fn closing_last_blocker_releases_target() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    let a = store.create(WorkItem::new("a").with_priority(1)).unwrap();
    let b = store.create(WorkItem::new("b").with_priority(1)).unwrap();
    let target = store.create(WorkItem::new("target").with_priority(0)).unwrap();
    store.add_dependency(&a.id, &target.id).unwrap();
    store.add_dependency(&b.id, &target.id).unwrap();

    store.close(&a.id, "test", None).unwrap();
    let ready: Vec<String> = store.list_ready(None).unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ready, [b.id.clone()]);

    store.close(&b.id, "test", Some("done")).unwrap();
    let ready: Vec<String> = store.list_ready(None).unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ready, [target.id]);
}

#[test]
fn concurrent_creates_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(open_store(dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || {
                (0..10)
                    .map(|n| store.create(WorkItem::new(format!("t{t}-{n}"))).unwrap().id)
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let ids: Vec<String> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), 40);
    assert_eq!(store.list(&Default::default()).unwrap().len(), 40);
}

#[test]
fn separate_handles_on_one_directory_see_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let first = open_store(dir.path());
    let second = Store::open(dir.path(), StoreConfig::default());

    let created = first.create(WorkItem::new("shared")).unwrap();
    assert_eq!(second.get(&created.id).unwrap().title, "shared");
}
