use bytes::Bytes;
use pretty_assertions::assert_eq;
use refpack::{pickle, unpickle, EnumDecodeError, Pickle, PickleError, UnpickleState, Unpickle};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
struct Point {
    x: i32,
    y: i32,
}

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
struct Meters(u32);

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
struct Marker;

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
enum Shape {
    Circle(f64),
    Rect { w: u32, h: u32 },
    Empty,
}

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
struct Drawing {
    name: String,
    origin: Option<Point>,
    shapes: Vec<Shape>,
    layers: HashMap<String, Vec<Rc<Shape>>>,
}

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug, Default)]
struct Session {
    user: String,
    #[refpack(skip)]
    cached_token: Option<String>,
    hits: u64,
}

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
enum Event {
    Login {
        user: String,
        #[refpack(skip)]
        attempts: u8,
    },
    Message(String, #[refpack(skip)] u32, bool),
}

#[derive(Pickle)]
struct Wrapper<T> {
    inner: T,
    label: &'static str,
}

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
struct Pair<T> {
    left: T,
    right: T,
}

#[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
struct Tree {
    value: u32,
    children: Vec<Rc<Tree>>,
}

#[derive(Pickle, Unpickle, PartialEq, Debug)]
struct Link {
    id: u32,
    next: Option<Rc<Link>>,
}

static LINK_CLONES: AtomicUsize = AtomicUsize::new(0);

impl Clone for Link {
    fn clone(&self) -> Self {
        LINK_CLONES.fetch_add(1, Ordering::SeqCst);
        Link {
            id: self.id,
            next: self.next.clone(),
        }
    }
}

#[test]
fn test_struct_layout() {
    let bytes = pickle(&Point { x: 1, y: -1 }).unwrap();
    assert_eq!(bytes.as_ref(), &[0x00, 0x01, 0x90, 0x01]);
    assert_eq!(pickle(&Meters(5)).unwrap().as_ref(), &[0x00, 0x05]);
    assert_eq!(pickle(&Marker).unwrap().as_ref(), &[0x00]);
}

#[test]
fn test_enum_layout() {
    assert_eq!(pickle(&Shape::Empty).unwrap().as_ref(), &[0x03]);
    assert_eq!(
        pickle(&Shape::Rect { w: 1, h: 2 }).unwrap().as_ref(),
        &[0x02, 0x01, 0x02]
    );
    let mut expected = vec![0x01];
    expected.extend_from_slice(&2.5f64.to_le_bytes());
    assert_eq!(pickle(&Shape::Circle(2.5)).unwrap().as_ref(), expected.as_slice());
}

#[test]
fn test_struct_round_trip() {
    let mut layers = HashMap::new();
    layers.insert("bg".to_string(), vec![Rc::new(Shape::Empty)]);
    let drawing = Drawing {
        name: "sketch".to_string(),
        origin: Some(Point { x: 3, y: 4 }),
        shapes: vec![Shape::Circle(1.0), Shape::Rect { w: 2, h: 3 }, Shape::Empty],
        layers,
    };
    let mut bytes = pickle(&drawing).unwrap();
    let decoded: Drawing = unpickle(&mut bytes).unwrap();
    assert_eq!(decoded, drawing);

    let mut bytes = pickle(&Meters(7)).unwrap();
    assert_eq!(unpickle::<Meters>(&mut bytes).unwrap(), Meters(7));
    let mut bytes = pickle(&Marker).unwrap();
    assert_eq!(unpickle::<Marker>(&mut bytes).unwrap(), Marker);
}

#[test]
fn test_skipped_fields_default_on_unpickle() {
    let session = Session {
        user: "ada".to_string(),
        cached_token: Some("secret".to_string()),
        hits: 3,
    };
    let mut bytes = pickle(&session).unwrap();
    assert_eq!(bytes.as_ref(), &[0x00, 0x03, b'a', b'd', b'a', 0x03]);
    let decoded: Session = unpickle(&mut bytes).unwrap();
    assert_eq!(
        decoded,
        Session {
            cached_token: None,
            ..session
        }
    );

    let login = Event::Login {
        user: "bob".to_string(),
        attempts: 9,
    };
    let mut bytes = pickle(&login).unwrap();
    assert_eq!(
        unpickle::<Event>(&mut bytes).unwrap(),
        Event::Login {
            user: "bob".to_string(),
            attempts: 0
        }
    );

    let message = Event::Message("hi".to_string(), 42, true);
    let mut bytes = pickle(&message).unwrap();
    assert_eq!(bytes.as_ref(), &[0x02, 0x02, b'h', b'i', 0x01]);
    assert_eq!(
        unpickle::<Event>(&mut bytes).unwrap(),
        Event::Message("hi".to_string(), 0, true)
    );
}

#[test]
fn test_generic_struct() {
    let pair = Pair {
        left: vec![1u8],
        right: vec![2u8, 3],
    };
    let mut bytes = pickle(&pair).unwrap();
    assert_eq!(unpickle::<Pair<Vec<u8>>>(&mut bytes).unwrap(), pair);

    let wrapper = Wrapper {
        inner: 5u64,
        label: "five",
    };
    assert_eq!(
        pickle(&wrapper).unwrap().as_ref(),
        &[0x00, 0x05, 0x04, b'f', b'i', b'v', b'e']
    );
}

#[test]
fn test_shared_instances_use_back_references() {
    let leaf = Rc::new(Tree {
        value: 1,
        children: Vec::new(),
    });
    let root = Tree {
        value: 0,
        children: vec![leaf.clone(), leaf.clone(), leaf],
    };
    let bytes = pickle(&root).unwrap();
    // header, value, len 3, leaf (header, value, empty children), two back-references to the leaf
    assert_eq!(
        bytes.as_ref(),
        &[0x00, 0x00, 0x03, 0x00, 0x01, 0x00, 0x90, 0x02, 0x90, 0x02]
    );

    let mut state = UnpickleState::new(bytes);
    let decoded: Tree = state.unpickle().unwrap();
    assert_eq!(decoded, root);
    // leaf, children vec, root
    assert_eq!(state.identity_refs().len(), 4);
    assert!(Rc::ptr_eq(&decoded.children[0], &decoded.children[1]));
    assert!(Rc::ptr_eq(&decoded.children[0], &decoded.children[2]));
}

#[test]
fn test_rc_values_are_registered_without_copies() {
    let mut head: Option<Rc<Link>> = None;
    for id in 0..200 {
        head = Some(Rc::new(Link { id, next: head }));
    }
    let mut bytes = pickle(&head).unwrap();

    let before = LINK_CLONES.load(Ordering::SeqCst);
    let decoded: Option<Rc<Link>> = unpickle(&mut bytes).unwrap();
    assert_eq!(LINK_CLONES.load(Ordering::SeqCst), before);
    assert_eq!(decoded, head);
}

#[test]
fn test_same_instance_pickled_twice_in_one_session() {
    let point = Point { x: 10, y: 20 };
    let bytes = pickle(&(&point, &point)).unwrap();
    assert_eq!(bytes.as_ref(), &[0x00, 0x0A, 0x14, 0x90, 0x02]);
    let mut reader = bytes;
    let (a, b): (Point, Point) = unpickle(&mut reader).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_unknown_variant() {
    let mut reader = Bytes::from_static(&[0x09]);
    match unpickle::<Shape>(&mut reader) {
        Err(PickleError::EnumDecode(EnumDecodeError::UnknownVariant { index, enum_name })) => {
            assert_eq!(index, 8);
            assert_eq!(enum_name, "Shape");
        }
        other => panic!("expected UnknownVariant, got {:?}", other),
    }

    let mut reader = Bytes::from_static(&[0x00]);
    assert!(matches!(
        unpickle::<Shape>(&mut reader),
        Err(PickleError::InvalidCoding { .. })
    ));
}

#[test]
fn test_struct_header_must_be_zero() {
    let mut reader = Bytes::from_static(&[0x01, 0x00, 0x00]);
    assert!(matches!(
        unpickle::<Point>(&mut reader),
        Err(PickleError::InvalidCoding { .. })
    ));
}
