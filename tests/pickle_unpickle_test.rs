use bytes::Bytes;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use refpack::{pickle, unpickle, Duration, Either, PickleError, Pickler, Unpickler};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, LinkedList, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

fn round_trip<T: Pickler + Unpickler>(value: &T) -> T {
    let mut bytes = pickle(value).unwrap();
    let decoded = unpickle(&mut bytes).unwrap();
    assert!(bytes.is_empty(), "{} bytes left over", bytes.len());
    decoded
}

#[test]
fn test_primitives() {
    assert_eq!(round_trip(&()), ());
    assert_eq!(round_trip(&true), true);
    assert_eq!(round_trip(&false), false);
    assert_eq!(round_trip(&0xABu8), 0xAB);
    assert_eq!(round_trip(&-128i8), -128);
    assert_eq!(round_trip(&i16::MIN), i16::MIN);
    assert_eq!(round_trip(&u16::MAX), u16::MAX);
    assert_eq!(round_trip(&'a'), 'a');
    assert_eq!(round_trip(&'🦀'), '🦀');
    assert_eq!(round_trip(&f32::MIN_POSITIVE), f32::MIN_POSITIVE);
    assert_eq!(round_trip(&-1.5f64), -1.5);
}

#[test]
fn test_integers_at_coding_boundaries() {
    for v in [0, 127, 128, -1, 4095, 4096, -4096, (1 << 28) - 1, 1 << 28, i32::MIN, i32::MAX] {
        assert_eq!(round_trip(&v), v);
    }
    for v in [0i64, -1, i32::MAX as i64 + 1, i32::MIN as i64 - 1, i64::MIN, i64::MAX] {
        assert_eq!(round_trip(&v), v);
    }
    assert_eq!(round_trip(&u32::MAX), u32::MAX);
    assert_eq!(round_trip(&u64::MAX), u64::MAX);
    assert_eq!(round_trip(&usize::MAX), usize::MAX);
    assert_eq!(round_trip(&isize::MIN), isize::MIN);
    assert_eq!(round_trip(&i128::MIN), i128::MIN);
    assert_eq!(round_trip(&u128::MAX), u128::MAX);
    assert_eq!(round_trip(&0x0123_4567_89AB_CDEF_u128), 0x0123_4567_89AB_CDEF_u128);
}

#[test]
fn test_strings() {
    assert_eq!(round_trip(&String::new()), "");
    assert_eq!(round_trip(&"hello".to_string()), "hello");
    let long = "x".repeat(1000);
    assert_eq!(round_trip(&long), long);
    assert_eq!(round_trip(&"日本語".to_string()), "日本語");

    let mut bytes = pickle("borrowed").unwrap();
    let decoded: Box<str> = unpickle(&mut bytes).unwrap();
    assert_eq!(&*decoded, "borrowed");

    let rc: Rc<str> = Rc::from("shared");
    assert_eq!(round_trip(&rc), rc);
    let arc: Arc<str> = Arc::from("atomic");
    let mut bytes = pickle(&*arc).unwrap();
    let decoded: Arc<str> = unpickle(&mut bytes).unwrap();
    assert_eq!(decoded, arc);
}

#[test]
fn test_uuid_and_bytes() {
    let id = Uuid::new_v4();
    assert_eq!(round_trip(&id), id);
    assert_eq!(round_trip(&Uuid::nil()), Uuid::nil());

    let payload = Bytes::from_static(b"\x00\x01\x02binary");
    assert_eq!(round_trip(&payload), payload);
    assert_eq!(round_trip(&Bytes::new()), Bytes::new());
}

#[test]
fn test_durations() {
    for d in [
        Duration::ZERO,
        Duration::Finite(-42),
        Duration::Finite(i64::MAX),
        Duration::Inf,
        Duration::MinusInf,
        Duration::Undefined,
    ] {
        assert_eq!(round_trip(&d), d);
    }
    let std_duration = std::time::Duration::new(3, 500);
    assert_eq!(round_trip(&std_duration), std_duration);
}

#[test]
fn test_options_and_either() {
    assert_eq!(round_trip(&Some(5i32)), Some(5));
    assert_eq!(round_trip(&None::<i32>), None);
    assert_eq!(round_trip(&Some(None::<String>)), Some(None));
    assert_eq!(round_trip(&Some(Some("in".to_string()))), Some(Some("in".to_string())));

    let left: Either<i32, String> = Either::Left(7);
    let right: Either<i32, String> = Either::Right("seven".to_string());
    assert_eq!(round_trip(&left), left);
    assert_eq!(round_trip(&right), right);

    let ok: Result<u8, String> = Ok(1);
    let err: Result<u8, String> = Err("failed".to_string());
    assert_eq!(round_trip(&ok), ok);
    assert_eq!(round_trip(&err), err);
}

#[test]
fn test_sequences() {
    let v = vec![1u32, 2, 3];
    assert_eq!(round_trip(&v), v);
    assert_eq!(round_trip(&Vec::<u32>::new()), Vec::<u32>::new());

    let nested = vec![vec!["a".to_string()], vec![], vec!["b".to_string(), "a".to_string()]];
    assert_eq!(round_trip(&nested), nested);

    let deque: VecDeque<i64> = (0..10).collect();
    assert_eq!(round_trip(&deque), deque);

    let list: LinkedList<char> = "list".chars().collect();
    assert_eq!(round_trip(&list), list);

    let heap: BinaryHeap<i32> = vec![3, 1, 4, 1, 5].into();
    assert_eq!(round_trip(&heap).into_sorted_vec(), heap.into_sorted_vec());

    let boxed: Box<[u16]> = vec![10, 20].into_boxed_slice();
    assert_eq!(round_trip(&boxed), boxed);

    let array = [1.0f64, 2.0, 3.0];
    assert_eq!(round_trip(&array), array);
    let empty: [u8; 0] = [];
    assert_eq!(round_trip(&empty), empty);
}

#[test]
fn test_sets_and_maps() {
    let set: HashSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    assert_eq!(round_trip(&set), set);

    let ordered: BTreeSet<u64> = [5, 3, 9].into_iter().collect();
    assert_eq!(round_trip(&ordered), ordered);

    let mut map = HashMap::new();
    map.insert("one".to_string(), vec![1u8]);
    map.insert("two".to_string(), vec![2, 2]);
    assert_eq!(round_trip(&map), map);

    let mut tree = BTreeMap::new();
    tree.insert(1i32, Some("a".to_string()));
    tree.insert(2, None);
    assert_eq!(round_trip(&tree), tree);

    assert_eq!(round_trip(&HashMap::<u8, u8>::new()), HashMap::new());
}

#[test]
fn test_tuples_and_pointers() {
    let t = (1u8, "two".to_string(), 3.0f32);
    assert_eq!(round_trip(&t), t);
    let wide = (1u8, 2u16, 3u32, 4u64, 5i8, 6i16, 7i32, 8i64, 9u128, 10i128, 'k', true);
    assert_eq!(round_trip(&wide), wide);

    let boxed = Box::new(99i32);
    assert_eq!(round_trip(&boxed), boxed);
    let rc = Rc::new(vec![1, 2]);
    assert_eq!(round_trip(&rc), rc);
    let arc = Arc::new("arc".to_string());
    assert_eq!(round_trip(&arc), arc);
}

#[test]
fn test_failed_unpickle_leaves_reader_untouched() {
    let mut bytes = pickle(&"truncated".to_string()).unwrap();
    let mut short = bytes.split_to(bytes.len() - 1);
    let before = short.clone();
    let result: refpack::Result<String> = unpickle(&mut short);
    assert!(matches!(result, Err(PickleError::InsufficientData)));
    assert_eq!(short, before);
}

#[test]
fn test_narrowing_errors() {
    let mut bytes = pickle(&40_000i32).unwrap();
    assert!(matches!(unpickle::<i16>(&mut bytes), Err(PickleError::Decode(_))));

    let mut bytes = pickle(&0xD800i32).unwrap();
    assert!(matches!(unpickle::<char>(&mut bytes), Err(PickleError::Decode(_))));

    let mut bytes = pickle(&-1i64).unwrap();
    assert!(matches!(
        unpickle::<std::time::Duration>(&mut bytes),
        Err(PickleError::Decode(_))
    ));

    let mut bytes = pickle(&Duration::Inf).unwrap();
    assert!(matches!(
        unpickle::<std::time::Duration>(&mut bytes),
        Err(PickleError::Decode(_))
    ));
}

#[test]
fn test_array_length_mismatch() {
    let mut bytes = pickle(&vec![1i32, 2, 3]).unwrap();
    match unpickle::<[i32; 2]>(&mut bytes) {
        Err(PickleError::LengthMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 2);
            assert_eq!(actual, 3);
        }
        other => panic!("expected LengthMismatch, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn prop_int_round_trip(v in any::<i32>()) {
        prop_assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn prop_long_round_trip(v in any::<i64>()) {
        prop_assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn prop_strings_round_trip(v in proptest::collection::vec(".{0,40}", 0..8)) {
        prop_assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn prop_map_round_trip(m in proptest::collection::btree_map(any::<u16>(), any::<Option<u32>>(), 0..16)) {
        prop_assert_eq!(round_trip(&m), m);
    }
}
