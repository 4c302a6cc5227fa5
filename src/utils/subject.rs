//! URL path to NATS subject translation.
//!
//! REST-style hierarchical paths map onto dot-separated subjects:
//! `/orders/eu/created` becomes `orders.eu.created`.

/// Errors for subjects that cannot be published as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectError {
    #[error("Subject is empty")]
    Empty,

    #[error("Subject '{0}' contains a wildcard token")]
    Wildcard(String),
}

/// Convert a request path to a subject.
///
/// Empty segments are dropped, so leading, trailing and repeated slashes
/// are ignored. A path made only of slashes yields an empty subject.
/// Segments are kept as they appear on the wire, percent-encoding included.
pub fn path_to_subject(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Check that a subject names exactly one concrete subject.
///
/// Wildcard tokens (`*`, `>`) would turn a single publish into a
/// subscription pattern the broker refuses to publish on.
pub fn validate_subject(subject: &str) -> Result<(), SubjectError> {
    if subject.is_empty() {
        return Err(SubjectError::Empty);
    }
    if subject.split('.').any(|token| token == "*" || token == ">") {
        return Err(SubjectError::Wildcard(subject.to_string()));
    }
    Ok(())
}
