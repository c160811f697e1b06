//! Pluggable read/write clearance policies.
//!
//! The entity manager calls both hooks before every read or write, so a
//! stricter policy can be swapped in without touching call sites.

use crate::context::TxContext;
use crate::error::{DataBlockError, DataBlockResult};
use crate::identity::CallerIdentity;
use std::collections::BTreeSet;

/// Clearance decisions for one resolved caller.
///
/// A denied clearance must be reported as `DataBlockError::Authorization`;
/// reads treat that variant as visitor mode rather than a failure.
pub trait AuthorizationPolicy {
    fn require_write_clearance(
        &self,
        ctx: &TxContext<'_>,
        caller: &CallerIdentity,
    ) -> DataBlockResult<()>;

    fn require_read_clearance(
        &self,
        ctx: &TxContext<'_>,
        caller: &CallerIdentity,
    ) -> DataBlockResult<()>;
}

/// Baseline policy: every caller holds read and write clearance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowAll;

impl AuthorizationPolicy for AllowAll {
    fn require_write_clearance(&self, _: &TxContext<'_>, _: &CallerIdentity) -> DataBlockResult<()> {
        Ok(())
    }

    fn require_read_clearance(&self, _: &TxContext<'_>, _: &CallerIdentity) -> DataBlockResult<()> {
        Ok(())
    }
}

/// Grants clearance per organization; everyone else is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationClearance {
    read: BTreeSet<String>,
    write: BTreeSet<String>,
}

impl OrganizationClearance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_read(mut self, organization: impl Into<String>) -> Self {
        self.read.insert(organization.into());
        self
    }

    pub fn grant_write(mut self, organization: impl Into<String>) -> Self {
        self.write.insert(organization.into());
        self
    }

    /// Grants both read and write clearance.
    pub fn grant_all(self, organization: &str) -> Self {
        self.grant_read(organization).grant_write(organization)
    }
}

impl AuthorizationPolicy for OrganizationClearance {
    fn require_write_clearance(
        &self,
        _: &TxContext<'_>,
        caller: &CallerIdentity,
    ) -> DataBlockResult<()> {
        if self.write.contains(&caller.organization) {
            Ok(())
        } else {
            Err(DataBlockError::authorization(format!(
                "organization {} holds no write clearance",
                caller.organization
            )))
        }
    }

    fn require_read_clearance(
        &self,
        _: &TxContext<'_>,
        caller: &CallerIdentity,
    ) -> DataBlockResult<()> {
        if self.read.contains(&caller.organization) {
            Ok(())
        } else {
            Err(DataBlockError::authorization(format!(
                "organization {} holds no read clearance",
                caller.organization
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AllowAll, AuthorizationPolicy, OrganizationClearance};
    use crate::context::{Proposal, TxContext};
    use crate::identity::CallerIdentity;
    use crate::ledger::{LedgerTransaction, MemoryLedger};

    fn caller(organization: &str) -> CallerIdentity {
        CallerIdentity {
            subject: "alice".to_string(),
            organization: organization.to_string(),
        }
    }

    #[test]
    fn clearance_is_granted_per_organization() {
        let ledger = MemoryLedger::new();
        let mut tx = LedgerTransaction::begin(&ledger);
        let proposal = Proposal::new();
        let ctx = TxContext::new(&proposal, &mut tx);
        let policy = OrganizationClearance::new()
            .grant_all("Org1MSP")
            .grant_read("Org2MSP");

        policy.require_write_clearance(&ctx, &caller("Org1MSP")).unwrap();
        policy.require_read_clearance(&ctx, &caller("Org2MSP")).unwrap();

        let err = policy
            .require_write_clearance(&ctx, &caller("Org2MSP"))
            .unwrap_err();
        assert_eq!(err.code(), "authorization");
        assert!(policy
            .require_read_clearance(&ctx, &caller("Org3MSP"))
            .is_err());
        AllowAll
            .require_read_clearance(&ctx, &caller("Org3MSP"))
            .unwrap();
    }
}
