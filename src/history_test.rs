use super::*;

type Stmt = Statement<u64, u64>;

#[test]
fn test_history_buckets() {
    let rviews = ReadViews::new(vec![7, 9]).unwrap();
    let mut history: KeyHistory<u64, u64> = KeyHistory::new(&rviews).unwrap();
    assert_eq!(history.num_buckets(), 3);

    // newest first: 12, 9, 8, 7, 5
    let stmts: Vec<Stmt> = vec![
        Statement::new_replace(1, 50, 12),
        Statement::new_upsert(1, 40, 9),
        Statement::new_replace(1, 30, 8),
        Statement::new_delete(1, 7),
        Statement::new_replace(1, 10, 5),
    ];
    for stmt in stmts.into_iter() {
        history.push(&rviews, stmt).unwrap();
    }

    assert_eq!(history.bucket_mut(0).len(), 1); // (9, inf] = 12
    assert_eq!(history.bucket_mut(1).len(), 2); // (7, 9] = 9, 8
    assert_eq!(history.bucket_mut(2).len(), 1); // (0, 7] = 7, the DELETE shadows 5
    assert!(!history.is_first_insert());

    let bucket = history.bucket_mut(1);
    assert!(bucket[0].is_upsert() && bucket[0].to_lsn() == 9);
    assert!(bucket[1].is_replace() && bucket[1].to_lsn() == 8);
}

#[test]
fn test_history_shadowing() {
    let rviews = ReadViews::new(vec![]).unwrap();
    let mut history: KeyHistory<u64, u64> = KeyHistory::new(&rviews).unwrap();

    history
        .push(&rviews, Statement::new_upsert(1, 4, 9))
        .unwrap();
    history
        .push(&rviews, Statement::new_replace(1, 3, 8))
        .unwrap();
    history
        .push(&rviews, Statement::new_replace(1, 2, 7))
        .unwrap();
    history
        .push(&rviews, Statement::new_insert(1, 1, 5))
        .unwrap();

    // the terminal REPLACE@8 absorbs everything older in its bucket
    assert_eq!(history.bucket_mut(0).len(), 2);
    // the shadowed INSERT still drives first-insert classification
    assert!(history.is_first_insert());
}

#[test]
fn test_history_reset() {
    let rviews = ReadViews::new(vec![5]).unwrap();
    let mut history: KeyHistory<u64, u64> = KeyHistory::new(&rviews).unwrap();

    history
        .push(&rviews, Statement::new_insert(1, 1, 3))
        .unwrap();
    history.set_pending(Some(
        Statement::new_replace(1, 1, 3).set_deferred_delete(),
    ));
    assert!(history.is_first_insert());
    assert!(history.as_pending().is_some());

    history.reset();
    assert_eq!(history.bucket_mut(0).len(), 0);
    assert_eq!(history.bucket_mut(1).len(), 0);
    assert!(!history.is_first_insert());
    assert!(history.as_pending().is_none());
    assert!(history.take_pending().is_none());
}
