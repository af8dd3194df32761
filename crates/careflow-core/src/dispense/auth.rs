//! Authorization seam for dispensing.

/// Capability required to hand out medications.
pub const PHARMACY_DISPENSE: &str = "pharmacy.dispense";

/// Answers capability checks for a staff member. The host application
/// plugs its role system in here.
pub trait Authorizer {
    /// Whether the current user may exercise `capability`.
    fn allows(&self, capability: &str) -> bool;
}

/// Authorizer backed by a fixed capability list.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    capabilities: Vec<String>,
}

impl StaticAuthorizer {
    /// Create an authorizer granting exactly these capabilities.
    pub fn new(capabilities: Vec<String>) -> Self {
        Self { capabilities }
    }

    /// Grant one more capability.
    pub fn grant(&mut self, capability: &str) {
        if !self.allows(capability) {
            self.capabilities.push(capability.to_string());
        }
    }
}

impl Authorizer for StaticAuthorizer {
    fn allows(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_authorizer_checks_list() {
        let auth = StaticAuthorizer::new(vec![PHARMACY_DISPENSE.into()]);
        assert!(auth.allows(PHARMACY_DISPENSE));
        assert!(!auth.allows("inventory.delete"));

        let empty = StaticAuthorizer::default();
        assert!(!empty.allows(PHARMACY_DISPENSE));
    }

    #[test]
    fn test_grant_is_idempotent() {
        let mut auth = StaticAuthorizer::default();
        auth.grant(PHARMACY_DISPENSE);
        auth.grant(PHARMACY_DISPENSE);
        assert!(auth.allows(PHARMACY_DISPENSE));
    }
}
