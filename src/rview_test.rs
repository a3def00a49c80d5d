use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;
use crate::Error;

#[test]
fn test_rview_new() {
    let rviews = ReadViews::new(vec![]).unwrap();
    assert_eq!(rviews.len(), 1); // the frontier alone

    let rviews = ReadViews::new(vec![7, 9, 12]).unwrap();
    assert_eq!(rviews.len(), 4);

    assert!(matches!(
        ReadViews::new(vec![7, 7]),
        Err(Error::InvalidInput(_, _))
    ));
    assert!(matches!(
        ReadViews::new(vec![9, 7]),
        Err(Error::InvalidInput(_, _))
    ));
    assert!(matches!(
        ReadViews::new(vec![0, 7]),
        Err(Error::InvalidInput(_, _))
    ));
    assert!(matches!(
        ReadViews::new(vec![u64::MAX]),
        Err(Error::InvalidInput(_, _))
    ));
    assert!(matches!(
        ReadViews::new(vec![7, u64::MAX]),
        Err(Error::InvalidInput(_, _))
    ));
}

#[test]
fn test_bucket_of() {
    let rviews = ReadViews::new(vec![7, 9, 12]).unwrap();

    // bucket 0 is the frontier, index grows with age
    assert_eq!(rviews.bucket_of(1), 3);
    assert_eq!(rviews.bucket_of(7), 3);
    assert_eq!(rviews.bucket_of(8), 2);
    assert_eq!(rviews.bucket_of(9), 2);
    assert_eq!(rviews.bucket_of(10), 1);
    assert_eq!(rviews.bucket_of(12), 1);
    assert_eq!(rviews.bucket_of(13), 0);
    assert_eq!(rviews.bucket_of(u64::MAX), 0);

    let rviews = ReadViews::new(vec![]).unwrap();
    assert_eq!(rviews.bucket_of(1), 0);
    assert_eq!(rviews.bucket_of(u64::MAX), 0);
}

#[test]
fn test_bucket_of_random() {
    let seed: u64 = random();
    println!("test_bucket_of_random seed {}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _i in 0..100 {
        let mut views: Vec<u64> = (0..(rng.gen::<usize>() % 16))
            .map(|_| (rng.gen::<u64>() % 10_000) + 1)
            .collect();
        views.sort_unstable();
        views.dedup();
        let rviews = ReadViews::new(views.clone()).unwrap();
        assert_eq!(rviews.len(), views.len() + 1);

        for _j in 0..1000 {
            let lsn = (rng.gen::<u64>() % 11_000) + 1;
            // a statement belongs to the bucket of the smallest read
            // view at or above its lsn, brute force the count
            let expected = views.iter().filter(|v| **v >= lsn).count();
            assert_eq!(rviews.bucket_of(lsn), expected, "lsn {}", lsn);
        }
    }
}
