use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;
use crate::Error;

type Stmt = Statement<u64, u64>;

fn boxed(stmts: Vec<Stmt>) -> SourceIter<'static, u64, u64> {
    Box::new(stmts.into_iter().map(Ok))
}

#[test]
fn test_merge_two_runs() {
    let run1 = vec![
        Statement::new_replace(1, 10, 8),
        Statement::new_replace(2, 20, 3),
    ];
    let run2 = vec![
        Statement::new_replace(1, 11, 5),
        Statement::new_delete(3, 9),
    ];

    let merge = MergeSource::new(vec![boxed(run1), boxed(run2)]).unwrap();
    let stmts: Vec<Stmt> = merge.map(|r| r.unwrap()).collect();
    assert_eq!(
        stmts,
        vec![
            Statement::new_replace(1, 10, 8),
            Statement::new_replace(1, 11, 5),
            Statement::new_replace(2, 20, 3),
            Statement::new_delete(3, 9),
        ]
    );
}

#[test]
fn test_merge_empty() {
    let merge: MergeSource<u64, u64> = MergeSource::new(vec![]).unwrap();
    assert_eq!(merge.count(), 0);

    let mut merge = MergeSource::new(vec![boxed(vec![]), boxed(vec![])]).unwrap();
    assert!(merge.next().is_none());
}

#[test]
fn test_merge_disorder() {
    // a run yielding keys out of order poisons the merger
    let run = vec![
        Statement::new_replace(2, 1, 5),
        Statement::new_replace(1, 1, 6),
    ];
    let mut merge = MergeSource::new(vec![boxed(run)]).unwrap();
    assert!(merge.next().unwrap().is_ok());
    assert!(matches!(merge.next(), Some(Err(Error::Invariant(_, _)))));
    assert!(merge.next().is_none());
}

#[test]
fn test_merge_duplicate_lsn() {
    let run1 = vec![Statement::new_replace(1, 1, 5)];
    let run2 = vec![Statement::new_replace(1, 2, 5)];
    let mut merge = MergeSource::new(vec![boxed(run1), boxed(run2)]).unwrap();
    assert!(merge.next().unwrap().is_ok());
    assert!(matches!(merge.next(), Some(Err(Error::Invariant(_, _)))));
    assert!(merge.next().is_none());
}

#[test]
fn test_merge_source_error() {
    let run: Vec<crate::Result<Stmt>> = vec![
        Ok(Statement::new_replace(1, 1, 5)),
        err_at!(SourceFail, msg: "read failed"),
    ];
    let mut merge = MergeSource::new(vec![Box::new(run.into_iter()) as SourceIter<u64, u64>])
        .unwrap();
    assert!(merge.next().unwrap().is_ok());
    assert!(matches!(merge.next(), Some(Err(Error::SourceFail(_, _)))));
    assert!(merge.next().is_none());
}

#[test]
fn test_merge_random() {
    let seed: u64 = random();
    println!("test_merge_random seed {}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _i in 0..64 {
        let n_stmts = rng.gen::<usize>() % 200;
        let n_sources = (rng.gen::<usize>() % 8) + 1;

        let mut lsn = 0;
        let mut stmts: Vec<Stmt> = vec![];
        for _ in 0..n_stmts {
            lsn += 1;
            let key = rng.gen::<u64>() % 32;
            stmts.push(Statement::new_replace(key, rng.gen(), lsn));
        }

        let mut runs: Vec<Vec<Stmt>> = vec![vec![]; n_sources];
        for stmt in stmts.iter() {
            runs[rng.gen::<usize>() % n_sources].push(stmt.clone());
        }
        let sources: Vec<SourceIter<u64, u64>> = runs
            .into_iter()
            .map(|mut run| {
                run.sort_by(|a, b| {
                    a.as_key()
                        .cmp(b.as_key())
                        .then(b.to_lsn().cmp(&a.to_lsn()))
                });
                boxed(run)
            })
            .collect();

        let merge = MergeSource::new(sources).unwrap();
        let merged: Vec<Stmt> = merge.map(|r| r.unwrap()).collect();
        assert_eq!(merged.len(), n_stmts);
        for w in merged.windows(2) {
            assert!(
                w[0].as_key() < w[1].as_key()
                    || (w[0].as_key() == w[1].as_key() && w[0].to_lsn() > w[1].to_lsn()),
                "seed {}",
                seed
            );
        }
    }
}
