//! Subject key generation and handling.

/// A key that uniquely identifies a throttled subject.
///
/// The key is composed of the client identity and the operation (the matched
/// rule prefix), so each client gets an independent budget per operation.
/// The core treats it as opaque: it only needs hashing and equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectKey {
    /// Who is being throttled (e.g. a client IP or account id)
    pub client: String,
    /// What they are doing (the matched operation prefix)
    pub operation: String,
}

impl SubjectKey {
    /// Create a new subject key from a client identity and operation.
    pub fn new(client: &str, operation: &str) -> Self {
        Self {
            client: client.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.client, self.operation)
    }
}
