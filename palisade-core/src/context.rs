//! Tenant identity carried by a virtual connection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for the acting principal within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Create a new actor ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the actor ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! impl_id_from {
    ($id:ident) => {
        impl From<&str> for $id {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $id {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<uuid::Uuid> for $id {
            fn from(u: uuid::Uuid) -> Self {
                Self::new(u.to_string())
            }
        }

        impl From<i64> for $id {
            fn from(i: i64) -> Self {
                Self::new(i.to_string())
            }
        }

        impl From<i32> for $id {
            fn from(i: i32) -> Self {
                Self::new(i.to_string())
            }
        }
    };
}

impl_id_from!(TenantId);
impl_id_from!(ActorId);

/// Identity of one logical caller.
///
/// A context is bound to a [`VirtualConnection`](crate::VirtualConnection) at
/// construction and never changes afterwards; switching identity means
/// creating a new virtual connection. The database evaluates its row-level
/// security policies against the session variables this pair is written into,
/// so the context itself carries no policy logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// The tenant the caller belongs to.
    pub tenant_id: TenantId,
    /// The acting principal within that tenant.
    pub actor_id: ActorId,
}

impl TenantContext {
    /// Create a new tenant context.
    pub fn new(tenant_id: impl Into<TenantId>, actor_id: impl Into<ActorId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
        }
    }

    /// Get the tenant ID.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Get the actor ID.
    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant={} actor={}", self.tenant_id, self.actor_id)
    }
}
