//! Method identities of the remote datastore service.

use std::fmt;

/// Fully qualified service name.
pub const SERVICE_NAME: &str = "google.datastore.v1.Datastore";

/// The unary methods of the datastore service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Lookup,
    RunQuery,
    Commit,
    BeginTransaction,
    Rollback,
    AllocateIds,
    ReserveIds,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Lookup,
        Method::RunQuery,
        Method::Commit,
        Method::BeginTransaction,
        Method::Rollback,
        Method::AllocateIds,
        Method::ReserveIds,
    ];

    /// Short method name, e.g. `Lookup`.
    pub fn name(&self) -> &'static str {
        match self {
            Method::Lookup => "Lookup",
            Method::RunQuery => "RunQuery",
            Method::Commit => "Commit",
            Method::BeginTransaction => "BeginTransaction",
            Method::Rollback => "Rollback",
            Method::AllocateIds => "AllocateIds",
            Method::ReserveIds => "ReserveIds",
        }
    }

    /// Wire name, e.g. `/google.datastore.v1.Datastore/Lookup`.
    pub fn full_name(&self) -> &'static str {
        match self {
            Method::Lookup => "/google.datastore.v1.Datastore/Lookup",
            Method::RunQuery => "/google.datastore.v1.Datastore/RunQuery",
            Method::Commit => "/google.datastore.v1.Datastore/Commit",
            Method::BeginTransaction => "/google.datastore.v1.Datastore/BeginTransaction",
            Method::Rollback => "/google.datastore.v1.Datastore/Rollback",
            Method::AllocateIds => "/google.datastore.v1.Datastore/AllocateIds",
            Method::ReserveIds => "/google.datastore.v1.Datastore/ReserveIds",
        }
    }

    /// Resolve a wire name. Names from other services yield `None`.
    pub fn from_full_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.full_name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_roundtrip() {
        for method in Method::ALL {
            assert_eq!(Method::from_full_name(method.full_name()), Some(method));
            assert_eq!(
                method.full_name(),
                format!("/{}/{}", SERVICE_NAME, method.name())
            );
        }
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(Method::from_full_name("Lookup"), None);
        assert_eq!(Method::from_full_name("/google.firestore.v1.Firestore/Commit"), None);
        assert_eq!(Method::from_full_name(""), None);
    }
}
