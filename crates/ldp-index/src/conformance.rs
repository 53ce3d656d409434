//! Behavior every `MembershipIndex` backend must share.

use chrono::{DateTime, Duration, Utc};

use ldp_types::{Member, MemberType};

use crate::entry::{IndexQuery, SortOrder};
use crate::error::IndexError;
use crate::traits::MembershipIndex;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs)
}

fn member(id: &str, member_type: MemberType, secs: i64) -> Member {
    Member::new(id, member_type, at(secs))
}

pub(crate) fn run_all<F>(make: F)
where
    F: Fn() -> Box<dyn MembershipIndex>,
{
    partitions_lifecycle(make().as_ref());
    insert_requires_partition(make().as_ref());
    insert_rejects_duplicates(make().as_ref());
    remove_and_contains(make().as_ref());
    count_with_filter(make().as_ref());
    windows_over_a_large_partition(make().as_ref());
    sort_orders(make().as_ref());
    keyset_selects(make().as_ref());
    replace_rebuilds_atomically(make().as_ref());
    drop_removes_rows(make().as_ref());
}

fn partitions_lifecycle(index: &dyn MembershipIndex) {
    assert!(!index.has_partition("b").unwrap());
    index.create_partition("b").unwrap();
    index.create_partition("a").unwrap();
    assert!(matches!(
        index.create_partition("a"),
        Err(IndexError::PartitionExists(id)) if id == "a"
    ));
    assert_eq!(index.partitions().unwrap(), vec!["a".to_string(), "b".to_string()]);
    assert!(index.drop_partition("a").unwrap());
    assert!(!index.drop_partition("a").unwrap());
    assert_eq!(index.partitions().unwrap(), vec!["b".to_string()]);
}

fn insert_requires_partition(index: &dyn MembershipIndex) {
    let err = index
        .insert("missing", &member("m", MemberType::Resource, 0))
        .unwrap_err();
    assert!(matches!(err, IndexError::PartitionNotFound(id) if id == "missing"));
    assert!(matches!(
        index.count("missing", None),
        Err(IndexError::PartitionNotFound(_))
    ));
    assert!(matches!(
        index.select("missing", &IndexQuery::all()),
        Err(IndexError::PartitionNotFound(_))
    ));
    assert!(matches!(
        index.remove("missing", "m"),
        Err(IndexError::PartitionNotFound(_))
    ));
    assert!(!index.contains("missing", "m").unwrap());
}

fn insert_rejects_duplicates(index: &dyn MembershipIndex) {
    index.create_partition("c").unwrap();
    let first = index.insert("c", &member("m", MemberType::Resource, 1)).unwrap();
    assert_eq!(first.container_id, "c");
    assert_eq!(first.member_id, "m");
    assert_eq!(first.member_type, MemberType::Resource);
    assert_eq!(first.inserted_at, at(1));
    let err = index
        .insert("c", &member("m", MemberType::Binary, 2))
        .unwrap_err();
    assert!(matches!(
        err,
        IndexError::DuplicateEntry { container, member } if container == "c" && member == "m"
    ));
    assert_eq!(index.count("c", None).unwrap(), 1);

    // The same member may live in several containers.
    index.create_partition("d").unwrap();
    let second = index.insert("d", &member("m", MemberType::Resource, 3)).unwrap();
    assert!(second.seq > first.seq);
}

fn remove_and_contains(index: &dyn MembershipIndex) {
    index.create_partition("c").unwrap();
    index.insert("c", &member("x", MemberType::Resource, 0)).unwrap();
    assert!(index.contains("c", "x").unwrap());
    assert!(index.remove("c", "x").unwrap());
    assert!(!index.contains("c", "x").unwrap());
    assert!(!index.remove("c", "x").unwrap());
    // Re-adding after removal is allowed.
    index.insert("c", &member("x", MemberType::Resource, 1)).unwrap();
    assert!(index.contains("c", "x").unwrap());
}

fn count_with_filter(index: &dyn MembershipIndex) {
    index.create_partition("c").unwrap();
    assert_eq!(index.count("c", None).unwrap(), 0);
    index.insert("c", &member("r1", MemberType::Resource, 0)).unwrap();
    index.insert("c", &member("r2", MemberType::Resource, 0)).unwrap();
    index.insert("c", &member("k", MemberType::Container, 0)).unwrap();
    index.insert("c", &member("b.png", MemberType::Binary, 0)).unwrap();
    assert_eq!(index.count("c", None).unwrap(), 4);
    assert_eq!(index.count("c", Some(MemberType::Resource)).unwrap(), 2);
    assert_eq!(index.count("c", Some(MemberType::Container)).unwrap(), 1);
    assert_eq!(index.count("c", Some(MemberType::Binary)).unwrap(), 1);

    let binaries = index
        .select("c", &IndexQuery::all().of_type(MemberType::Binary))
        .unwrap();
    assert_eq!(binaries.len(), 1);
    assert_eq!(binaries[0].member_id, "b.png");
}

fn windows_over_a_large_partition(index: &dyn MembershipIndex) {
    index.create_partition("big").unwrap();
    for i in 0..1000 {
        index
            .insert("big", &member(&format!("m{i:04}"), MemberType::Resource, i))
            .unwrap();
    }
    assert_eq!(index.count("big", None).unwrap(), 1000);

    let tail = index.select("big", &IndexQuery::window(950, 100)).unwrap();
    assert_eq!(tail.len(), 50);
    assert_eq!(tail[0].member_id, "m0950");
    assert_eq!(tail[49].member_id, "m0999");

    assert_eq!(index.select("big", &IndexQuery::window(990, 100)).unwrap().len(), 10);
    assert!(index.select("big", &IndexQuery::window(1000, 100)).unwrap().is_empty());
    assert!(index.select("big", &IndexQuery::window(5000, 100)).unwrap().is_empty());

    let head = index.select("big", &IndexQuery::window(0, 3)).unwrap();
    let ids: Vec<&str> = head.iter().map(|e| e.member_id.as_str()).collect();
    assert_eq!(ids, ["m0000", "m0001", "m0002"]);

    let seqs: Vec<u64> = index
        .select("big", &IndexQuery::all())
        .unwrap()
        .iter()
        .map(|e| e.seq)
        .collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}

fn sort_orders(index: &dyn MembershipIndex) {
    index.create_partition("c").unwrap();
    index.insert("c", &member("b", MemberType::Resource, 10)).unwrap();
    index.insert("c", &member("c", MemberType::Resource, 30)).unwrap();
    index.insert("c", &member("a", MemberType::Resource, 20)).unwrap();
    // Same timestamp as "c": ties break on insertion sequence.
    index.insert("c", &member("d", MemberType::Resource, 30)).unwrap();

    let ids = |sort: SortOrder| -> Vec<String> {
        index
            .select("c", &IndexQuery::all().sorted(sort))
            .unwrap()
            .into_iter()
            .map(|e| e.member_id)
            .collect()
    };
    assert_eq!(ids(SortOrder::Insertion), ["b", "c", "a", "d"]);
    assert_eq!(ids(SortOrder::NewestFirst), ["d", "c", "a", "b"]);
    assert_eq!(ids(SortOrder::MemberId), ["a", "b", "c", "d"]);

    let second = index
        .select("c", &IndexQuery::window(1, 1).sorted(SortOrder::MemberId))
        .unwrap();
    assert_eq!(second[0].member_id, "b");
}

fn keyset_selects(index: &dyn MembershipIndex) {
    index.create_partition("c").unwrap();
    for i in 0..25 {
        let t = if i % 5 == 0 { MemberType::Container } else { MemberType::Resource };
        index.insert("c", &member(&format!("m{i:02}"), t, i)).unwrap();
    }

    let mut seen = Vec::new();
    let mut after = 0;
    loop {
        let batch = index.select_after("c", after, 7, None).unwrap();
        if batch.is_empty() {
            break;
        }
        assert!(batch.len() <= 7);
        after = batch.last().map(|e| e.seq).unwrap_or(after);
        seen.extend(batch.into_iter().map(|e| e.member_id));
    }
    assert_eq!(seen.len(), 25);
    assert_eq!(seen[0], "m00");
    assert_eq!(seen[24], "m24");

    // Rows removed ahead of the cursor are skipped, earlier ones do not shift it.
    let first = index.select_after("c", 0, 3, None).unwrap();
    index.remove("c", "m01").unwrap();
    index.remove("c", "m04").unwrap();
    let next = index.select_after("c", first[2].seq, 2, None).unwrap();
    let ids: Vec<&str> = next.iter().map(|e| e.member_id.as_str()).collect();
    assert_eq!(ids, ["m03", "m05"]);

    let containers = index
        .select_after("c", 0, 100, Some(MemberType::Container))
        .unwrap();
    assert_eq!(containers.len(), 5);
}

fn replace_rebuilds_atomically(index: &dyn MembershipIndex) {
    index.create_partition("c").unwrap();
    index.insert("c", &member("stale", MemberType::Resource, 0)).unwrap();

    let fresh = vec![
        member("one", MemberType::Resource, 1),
        member("two", MemberType::Container, 2),
    ];
    index.replace_partition("c", &fresh).unwrap();
    let ids: Vec<String> = index
        .select("c", &IndexQuery::all())
        .unwrap()
        .into_iter()
        .map(|e| e.member_id)
        .collect();
    assert_eq!(ids, ["one", "two"]);
    assert!(!index.contains("c", "stale").unwrap());

    // Creates the partition when missing.
    index.replace_partition("new", &fresh[..1]).unwrap();
    assert!(index.has_partition("new").unwrap());
    assert_eq!(index.count("new", None).unwrap(), 1);

    // A duplicate leaves the previous rows in place.
    let bad = vec![
        member("x", MemberType::Resource, 3),
        member("x", MemberType::Resource, 4),
    ];
    assert!(matches!(
        index.replace_partition("c", &bad),
        Err(IndexError::DuplicateEntry { .. })
    ));
    assert_eq!(index.count("c", None).unwrap(), 2);
    assert!(index.contains("c", "one").unwrap());
}

fn drop_removes_rows(index: &dyn MembershipIndex) {
    index.create_partition("c").unwrap();
    index.insert("c", &member("m", MemberType::Resource, 0)).unwrap();
    assert!(index.drop_partition("c").unwrap());
    assert!(!index.contains("c", "m").unwrap());
    index.create_partition("c").unwrap();
    assert_eq!(index.count("c", None).unwrap(), 0);
}
