//! Authorization of identities against capabilities.

use mplane_types::Capability;

pub trait Authorization: Send + Sync {
    /// True if `identity` may invoke `capability`.
    fn check(&self, capability: &Capability, identity: &str) -> bool;
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationOff;

impl Authorization for AuthorizationOff {
    fn check(&self, _capability: &Capability, _identity: &str) -> bool {
        true
    }
}
