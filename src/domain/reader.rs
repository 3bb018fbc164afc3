//! Reader identity.
//!
//! A read is attributed either to a signed-in user or to an anonymous
//! client token, never both and never neither. The sum type makes the
//! invalid states unrepresentable; `as_columns` maps back to the pair of
//! nullable columns the fact table stores.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReaderId {
    User(Uuid),
    Client(String),
}

impl ReaderId {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            ReaderId::User(id) => Some(*id),
            ReaderId::Client(_) => None,
        }
    }

    /// Split into the `(user_id, client_id)` column pair.
    pub fn as_columns(&self) -> (Option<Uuid>, Option<&str>) {
        match self {
            ReaderId::User(id) => (Some(*id), None),
            ReaderId::Client(token) => (None, Some(token.as_str())),
        }
    }
}

impl std::fmt::Display for ReaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderId::User(id) => write!(f, "user:{id}"),
            ReaderId::Client(token) => write!(f, "client:{token}"),
        }
    }
}
