//! Unit tests for namespace assembly and operation lookup.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::rstest;

use super::*;
use crate::request::RequestBuilder;
use crate::session::Session;

fn noop(_call: &mut Invocation<'_>) -> Result<i64, DispatchError> {
    Ok(0)
}

fn op(name: &str, flags: OperationFlags) -> Descriptor {
    Descriptor::new(name, flags, noop)
}

fn needs_one_object(request: &Request) -> Result<(), DispatchError> {
    if request.objects().len() == 1 {
        Ok(())
    } else {
        Err(DispatchError::invalid_request("exactly one object"))
    }
}

fn sample() -> Arc<Namespace> {
    Namespace::builder("sample")
        .op_base(128)
        .operation(op("open", OperationFlags::CREATES))
        .operation(op("read", OperationFlags::empty()).with_check(needs_one_object))
        .operation(op("close", OperationFlags::DESTROYS))
        .build()
        .expect("valid namespace")
}

fn request(op: u32) -> Request {
    let bytes = RequestBuilder::new(1, op).build().expect("build");
    Request::parse(&bytes).expect("parse")
}

#[test]
fn destroying_operation_is_exclusive() {
    let descriptor = op("close", OperationFlags::DESTROYS);
    assert!(descriptor.destroys());
    assert!(descriptor.requires_exclusive());
    assert!(!descriptor.creates());
}

#[test]
fn built_namespace_is_unregistered_and_open() {
    let namespace = sample();
    assert_eq!(namespace.id(), None);
    assert!(!namespace.is_closed());
    assert_eq!(namespace.op_base(), 128);
    assert_eq!(namespace.op_count(), 3);
    assert!(namespace.table().is_empty());
    assert_eq!(namespace.table().capacity(), DEFAULT_HANDLE_CAPACITY);
}

#[test]
fn config_sets_handle_capacity() {
    let config = Config {
        handle_capacity: NonZeroU32::new(4).expect("non-zero capacity"),
        ..Config::default()
    };
    let namespace = Namespace::builder("small")
        .with_config(&config)
        .build()
        .expect("valid namespace");
    assert_eq!(namespace.table().capacity(), 4);
}

#[rstest]
#[case::below(127, None)]
#[case::first(128, Some("open"))]
#[case::last(130, Some("close"))]
#[case::past(131, None)]
fn descriptor_lookup_uses_absolute_codes(#[case] code: u32, #[case] expected: Option<&str>) {
    let namespace = sample();
    assert_eq!(namespace.descriptor(code).map(Descriptor::name), expected);
}

#[test]
fn resolve_rejects_codes_outside_the_block() {
    let namespace = sample();
    let error = namespace
        .resolve(&request(131))
        .expect_err("no such operation");
    assert_eq!(
        error,
        DispatchError::NoSuchOperation {
            namespace: 1,
            op: 131,
        }
    );
}

#[test]
fn resolve_runs_the_precondition() {
    let namespace = sample();
    let error = namespace
        .resolve(&request(129))
        .expect_err("read needs an object");
    assert!(matches!(error, DispatchError::InvalidRequest { .. }));
    assert!(namespace.resolve(&request(128)).is_ok());
}

fn refuse_shared(_request: &Request, objects: &[ObjectRef]) -> Result<(), DispatchError> {
    if objects.iter().all(ObjectRef::is_exclusive) {
        Ok(())
    } else {
        Err(DispatchError::invalid_request("objects must be held exclusively"))
    }
}

#[test]
fn argument_check_is_left_to_dispatch() {
    let namespace = Namespace::builder("checked")
        .operation(op("touch", OperationFlags::empty()).with_argument_check(refuse_shared))
        .build()
        .expect("valid namespace");
    let touch = namespace
        .resolve(&request(0))
        .expect("argument checks do not run at lookup");

    let session = Session::new();
    let created = namespace.table().create(&session, 1, 0).expect("create");
    let handle = created.handle();
    assert!(touch.check_arguments(&request(0), std::slice::from_ref(&created)).is_ok());
    namespace.table().release(created);

    let shared = namespace
        .table()
        .acquire(&session, handle, 1, false)
        .expect("shared");
    let error = touch
        .check_arguments(&request(0), std::slice::from_ref(&shared))
        .expect_err("shared use is refused");
    assert!(matches!(error, DispatchError::InvalidRequest { .. }));
    namespace.table().release(shared);
}

#[rstest]
#[case::empty_name(Namespace::builder(""), NamespaceError::EmptyName)]
#[case::zero_capacity(
    Namespace::builder("ns").handle_capacity(0),
    NamespaceError::ZeroHandleCapacity
)]
#[case::conflicting(
    Namespace::builder("ns").operation(op("both", OperationFlags::CREATES | OperationFlags::DESTROYS)),
    NamespaceError::ConflictingFlags { operation: String::from("both") }
)]
#[case::overflow(
    Namespace::builder("ns").op_base(u32::MAX).operation(op("a", OperationFlags::empty())),
    NamespaceError::OperationRangeOverflow { base: u32::MAX, count: 1 }
)]
fn invalid_namespaces_are_rejected(
    #[case] builder: NamespaceBuilder,
    #[case] expected: NamespaceError,
) {
    assert_eq!(builder.build().expect_err("invalid namespace"), expected);
}

#[test]
fn long_names_are_rejected() {
    let name = "n".repeat(MAX_NAME_LEN + 1);
    let error = Namespace::builder(name.clone())
        .build()
        .expect_err("name too long");
    assert_eq!(
        error,
        NamespaceError::NameTooLong {
            name,
            len: MAX_NAME_LEN + 1,
        }
    );
    assert!(
        Namespace::builder("n".repeat(MAX_NAME_LEN))
            .build()
            .is_ok()
    );
}

#[test]
fn operation_block_is_limited() {
    let builder = (0..=OP_RANGE).fold(Namespace::builder("big"), |builder, n| {
        builder.operation(op(&format!("op{n}"), OperationFlags::empty()))
    });
    assert_eq!(
        builder.build().expect_err("too many operations"),
        NamespaceError::TooManyOperations {
            count: usize::try_from(OP_RANGE).expect("fits") + 1,
        }
    );
}

#[test]
fn close_marks_namespace_closed() {
    let namespace = sample();
    namespace.close();
    assert!(namespace.is_closed());
}

#[test]
fn teardown_sees_every_live_object() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let namespace = Namespace::builder("files")
        .teardown(move |namespace, object| {
            assert_eq!(namespace.name(), "files");
            assert_eq!(object.type_tag, 3);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .expect("valid namespace");

    let session = Session::new();
    for context in 0..3 {
        let reference = namespace
            .table()
            .create(&session, 3, context)
            .expect("create");
        namespace.table().release(reference);
    }

    assert_eq!(namespace.teardown_all(), 3);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert!(namespace.table().is_empty());
    assert!(session.is_empty());
}

#[test]
fn session_enumerates_handles_with_namespace_names() {
    let namespace = sample();
    let session = Session::new();
    let reference = namespace
        .table()
        .create(&session, 9, 0)
        .expect("create");
    let handles = session.handles();
    assert_eq!(handles.len(), 1);
    let handle = handles.first().expect("one handle");
    assert_eq!(handle.namespace_name, "sample");
    assert_eq!(handle.namespace, None);
    assert_eq!(handle.handle, reference.handle());
    namespace.table().release(reference);
}
