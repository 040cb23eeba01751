//! JSON Pointer (RFC 6901) helpers for error `source.pointer` values.
//!
//! All pointers produced by the pipeline point into the original request
//! document, rooted at the operations member.

use std::borrow::Cow;

use crate::model::ATOMIC_OPERATIONS;

/// Escapes a single pointer component: `~` becomes `~0`, `/` becomes `~1`.
pub fn escape_component(component: &str) -> Cow<'_, str> {
    if !component.contains('~') && !component.contains('/') {
        return Cow::Borrowed(component);
    }
    // Order matters: `~` must be escaped before `/` introduces new tildes
    Cow::Owned(component.replace('~', "~0").replace('/', "~1"))
}

/// Formats path components into a pointer string (`""` for the root).
pub fn format_pointer<I, S>(components: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut pointer = String::new();
    for component in components {
        pointer.push('/');
        pointer.push_str(&escape_component(component.as_ref()));
    }
    pointer
}

/// `/atomic:operations`
pub fn operations_pointer() -> String {
    format_pointer([ATOMIC_OPERATIONS])
}

/// `/atomic:operations/<index>` followed by `tail`.
pub fn operation_pointer<S: AsRef<str>>(index: usize, tail: &[S]) -> String {
    let mut pointer = format_pointer([ATOMIC_OPERATIONS, index.to_string().as_str()]);
    pointer.push_str(&format_pointer(tail));
    pointer
}
