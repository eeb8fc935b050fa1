//! Unit tests for dispatch error classification.

use rstest::rstest;

use super::*;

#[rstest]
#[case::invalid(DispatchError::invalid_request("bad"), ErrorKind::InvalidRequest, errno::EINVAL)]
#[case::namespace(DispatchError::NamespaceNotFound { namespace: 3 }, ErrorKind::NotFound, errno::ENOENT)]
#[case::closed(DispatchError::NamespaceClosed { namespace: 3 }, ErrorKind::NotFound, errno::ENODEV)]
#[case::handle(DispatchError::HandleNotFound { handle: 9 }, ErrorKind::NotFound, errno::ENOENT)]
#[case::type_tag(
    DispatchError::TypeMismatch { handle: 9, expected: 1, actual: 2 },
    ErrorKind::TypeMismatch,
    errno::ENOENT
)]
#[case::owner(DispatchError::OwnershipMismatch { handle: 9 }, ErrorKind::OwnershipMismatch, errno::ENOENT)]
#[case::busy(DispatchError::Busy { handle: 9 }, ErrorKind::Busy, errno::EBUSY)]
#[case::exhausted(
    DispatchError::ResourceExhausted { resource: "namespace table" },
    ErrorKind::ResourceExhausted,
    errno::ENOMEM
)]
#[case::no_op(DispatchError::NoSuchOperation { namespace: 1, op: 10 }, ErrorKind::NoSuchOperation, errno::ENOSYS)]
#[case::unsupported(DispatchError::unsupported("raw command"), ErrorKind::Unsupported, errno::ENOSYS)]
#[case::fault(DispatchError::fault("short buffer"), ErrorKind::Fault, errno::EFAULT)]
fn classifies_errors(#[case] error: DispatchError, #[case] kind: ErrorKind, #[case] code: i32) {
    assert_eq!(error.kind(), kind);
    assert_eq!(error.errno(), code);
}

#[test]
fn handler_status_is_passed_through() {
    let error = DispatchError::handler(-95, "provider refused");
    assert_eq!(error.kind(), ErrorKind::Handler);
    assert_eq!(error.errno(), -95);
    let message = error.to_string();
    assert!(message.contains("-95"), "expected status in message: {message}");
    assert!(
        message.contains("provider refused"),
        "expected detail in message: {message}"
    );
}

#[test]
fn type_mismatch_message_names_both_tags() {
    let error = DispatchError::TypeMismatch {
        handle: 4,
        expected: 7,
        actual: 8,
    };
    let message = error.to_string();
    assert!(message.contains("handle 4"), "missing handle: {message}");
    assert!(message.contains('7') && message.contains('8'), "missing tags: {message}");
}
