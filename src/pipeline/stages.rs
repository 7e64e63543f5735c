//! Built-in stage markers.
//!
//! A stage marker is a capability tag used purely for ordering: a contributor
//! lists the markers it satisfies, and constraints against a marker bind to
//! *any* contributor carrying that tag. The markers below anchor the
//! pipeline's canonical shape; hosts and contributors are free to introduce
//! their own marker types on top.

use crate::key::ServiceKey;

/// The start of the pipeline. Satisfied by the bootstrap contributor.
pub struct Begin;

/// Resolving the request URI to a handler.
pub struct UriMatching;

/// Invoking the selected operation.
pub struct OperationInvocation;

/// Acting on the operation's result.
pub struct OperationResultInvocation;

/// Writing the response entity.
pub struct ResponseCoding;

/// The end of the pipeline. Units tagged with `End` still run after a
/// failure, making this the conventional position for error reporting.
pub struct End;

/// Every marker the pipeline ships with. Constraints referencing these are
/// valid even when no contributor satisfies them yet.
pub fn built_in() -> Vec<ServiceKey> {
    vec![
        ServiceKey::of::<Begin>(),
        ServiceKey::of::<UriMatching>(),
        ServiceKey::of::<OperationInvocation>(),
        ServiceKey::of::<OperationResultInvocation>(),
        ServiceKey::of::<ResponseCoding>(),
        ServiceKey::of::<End>(),
    ]
}
