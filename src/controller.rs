//! Process-wide trust registry.
//!
//! The controller gates every privileged surface: which accounts may act
//! as keepers, which integration adapters are approved protocol-wide,
//! and which gardens exist. Mutations require the governance account;
//! there are no implicit globals.

use std::collections::BTreeSet;

use crate::domain::{AccountId, GardenId, IntegrationId};
use crate::error::AuthError;

/// Registry of valid gardens, keepers, and approved integrations.
#[derive(Debug, Clone)]
pub struct Controller {
    governance: AccountId,
    keepers: BTreeSet<AccountId>,
    approved_integrations: BTreeSet<IntegrationId>,
    gardens: Vec<GardenId>,
}

impl Controller {
    /// Create a controller owned by the given governance account.
    #[must_use]
    pub fn new(governance: AccountId) -> Self {
        Self {
            governance,
            keepers: BTreeSet::new(),
            approved_integrations: BTreeSet::new(),
            gardens: Vec::new(),
        }
    }

    #[must_use]
    pub fn governance(&self) -> &AccountId {
        &self.governance
    }

    /// Guard: `sender` must be the governance account.
    pub fn ensure_governance(&self, sender: &AccountId) -> Result<(), AuthError> {
        if sender != &self.governance {
            return Err(AuthError::UnauthorizedGovernance {
                account: sender.clone(),
            });
        }
        Ok(())
    }

    /// Guard: `sender` must be an authorized keeper.
    pub fn ensure_keeper(&self, sender: &AccountId) -> Result<(), AuthError> {
        if !self.keepers.contains(sender) {
            return Err(AuthError::UnauthorizedKeeper {
                account: sender.clone(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid_keeper(&self, account: &AccountId) -> bool {
        self.keepers.contains(account)
    }

    pub(crate) fn add_keeper(&mut self, keeper: AccountId) {
        self.keepers.insert(keeper);
    }

    pub(crate) fn remove_keeper(&mut self, keeper: &AccountId) {
        self.keepers.remove(keeper);
    }

    #[must_use]
    pub fn is_approved_integration(&self, integration: &IntegrationId) -> bool {
        self.approved_integrations.contains(integration)
    }

    pub(crate) fn approve_integration(&mut self, integration: IntegrationId) {
        self.approved_integrations.insert(integration);
    }

    pub(crate) fn revoke_integration(&mut self, integration: &IntegrationId) {
        self.approved_integrations.remove(integration);
    }

    /// All gardens in creation order.
    #[must_use]
    pub fn gardens(&self) -> &[GardenId] {
        &self.gardens
    }

    pub(crate) fn register_garden(&mut self, garden: GardenId) {
        self.gardens.push(garden);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeper_gate() {
        let mut controller = Controller::new(AccountId::from("gov"));
        let keeper = AccountId::from("keeper");

        assert!(controller.ensure_keeper(&keeper).is_err());
        controller.add_keeper(keeper.clone());
        assert!(controller.ensure_keeper(&keeper).is_ok());
        assert!(controller.is_valid_keeper(&keeper));

        controller.remove_keeper(&keeper);
        assert!(!controller.is_valid_keeper(&keeper));
    }

    #[test]
    fn governance_gate() {
        let controller = Controller::new(AccountId::from("gov"));
        assert!(controller.ensure_governance(&AccountId::from("gov")).is_ok());
        assert!(matches!(
            controller.ensure_governance(&AccountId::from("mallory")),
            Err(AuthError::UnauthorizedGovernance { .. })
        ));
    }

    #[test]
    fn integration_approval() {
        let mut controller = Controller::new(AccountId::from("gov"));
        let id = IntegrationId::from("vault");

        assert!(!controller.is_approved_integration(&id));
        controller.approve_integration(id.clone());
        assert!(controller.is_approved_integration(&id));
        controller.revoke_integration(&id);
        assert!(!controller.is_approved_integration(&id));
    }

    #[test]
    fn gardens_in_creation_order() {
        let mut controller = Controller::new(AccountId::from("gov"));
        controller.register_garden(GardenId::new(1));
        controller.register_garden(GardenId::new(2));
        assert_eq!(controller.gardens(), &[GardenId::new(1), GardenId::new(2)]);
    }
}
