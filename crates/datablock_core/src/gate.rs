//! Identity and authorization gate.
//!
//! # Responsibility
//! - Combine the identity capability and the clearance policy into the
//!   checks the entity manager runs before touching any partition.
//! - Decide between full and visitor reads.
//!
//! # Invariants
//! - Writers always pass identity, write clearance and same-organization
//!   checks, in that order, before any ledger access.
//! - Only an `Authorization` denial of read clearance degrades to visitor
//!   mode; identity or storage failures still propagate.

use crate::context::TxContext;
use crate::error::{DataBlockError, DataBlockResult};
use crate::identity::{CallerIdentity, IdentityProvider};
use crate::policy::AuthorizationPolicy;
use log::info;

/// How much of a data block a read may reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Private sections of the caller's own organization are returned.
    Full,
    /// Private sections are always redacted.
    Visitor,
}

/// Gate holding the identity capability and the clearance policy.
pub struct AccessGate<I, P> {
    identity: I,
    policy: P,
}

impl<I: IdentityProvider, P: AuthorizationPolicy> AccessGate<I, P> {
    pub fn new(identity: I, policy: P) -> Self {
        Self { identity, policy }
    }

    pub fn caller_identity(&self, ctx: &TxContext<'_>) -> DataBlockResult<CallerIdentity> {
        self.identity.caller_identity(ctx)
    }

    pub fn host_organization(&self) -> DataBlockResult<String> {
        self.identity.host_organization()
    }

    pub fn require_write_clearance(
        &self,
        ctx: &TxContext<'_>,
        caller: &CallerIdentity,
    ) -> DataBlockResult<()> {
        self.policy.require_write_clearance(ctx, caller)
    }

    pub fn require_read_clearance(
        &self,
        ctx: &TxContext<'_>,
        caller: &CallerIdentity,
    ) -> DataBlockResult<()> {
        self.policy.require_read_clearance(ctx, caller)
    }

    /// Resolves a caller allowed to write this node's partitions.
    pub fn authorize_writer(&self, ctx: &TxContext<'_>) -> DataBlockResult<CallerIdentity> {
        let caller = self.caller_identity(ctx)?;
        self.require_write_clearance(ctx, &caller)?;
        let host = self.host_organization()?;
        require_same_organization(&caller.organization, &host)?;
        Ok(caller)
    }

    /// Maps read clearance onto a read mode.
    pub fn read_mode(
        &self,
        ctx: &TxContext<'_>,
        caller: &CallerIdentity,
    ) -> DataBlockResult<ReadMode> {
        match self.require_read_clearance(ctx, caller) {
            Ok(()) => Ok(ReadMode::Full),
            Err(DataBlockError::Authorization(reason)) => {
                info!(
                    "event=read_mode module=gate status=ok mode=visitor tx_id={} org={} reason={}",
                    ctx.tx_id(),
                    caller.organization,
                    reason
                );
                Ok(ReadMode::Visitor)
            }
            Err(other) => Err(other),
        }
    }
}

/// Fails when a caller of `caller_org` tries to reach `host_org` private data.
pub fn require_same_organization(caller_org: &str, host_org: &str) -> DataBlockResult<()> {
    if caller_org == host_org {
        Ok(())
    } else {
        Err(DataBlockError::authorization(format!(
            "client from org {caller_org} is not authorized to access private data from an org {host_org} node"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{require_same_organization, AccessGate, ReadMode};
    use crate::context::{Proposal, TxContext};
    use crate::identity::{credential, CredentialIdentityProvider};
    use crate::ledger::{LedgerTransaction, MemoryLedger};
    use crate::policy::OrganizationClearance;

    fn gate() -> AccessGate<CredentialIdentityProvider, OrganizationClearance> {
        AccessGate::new(
            CredentialIdentityProvider::new("Org1MSP").unwrap(),
            OrganizationClearance::new()
                .grant_all("Org1MSP")
                .grant_write("Org2MSP"),
        )
    }

    #[test]
    fn same_organization_check() {
        require_same_organization("Org1MSP", "Org1MSP").unwrap();
        let err = require_same_organization("Org2MSP", "Org1MSP").unwrap_err();
        assert_eq!(err.code(), "authorization");
    }

    #[test]
    fn read_mode_degrades_without_clearance() {
        let gate = gate();
        let ledger = MemoryLedger::new();
        let mut tx = LedgerTransaction::begin(&ledger);
        let proposal = Proposal::new().with_creator(credential("Org2MSP", "bob").unwrap());
        let ctx = TxContext::new(&proposal, &mut tx);

        let caller = gate.caller_identity(&ctx).unwrap();
        assert_eq!(gate.read_mode(&ctx, &caller).unwrap(), ReadMode::Visitor);
    }

    #[test]
    fn writer_from_foreign_organization_is_rejected() {
        let gate = gate();
        let ledger = MemoryLedger::new();
        let mut tx = LedgerTransaction::begin(&ledger);
        let proposal = Proposal::new().with_creator(credential("Org2MSP", "bob").unwrap());
        let ctx = TxContext::new(&proposal, &mut tx);

        let err = gate.authorize_writer(&ctx).unwrap_err();
        assert!(err.to_string().contains("Org2MSP"));
    }

    #[test]
    fn writer_from_host_organization_is_resolved() {
        let gate = gate();
        let ledger = MemoryLedger::new();
        let mut tx = LedgerTransaction::begin(&ledger);
        let proposal = Proposal::new().with_creator(credential("Org1MSP", "alice").unwrap());
        let ctx = TxContext::new(&proposal, &mut tx);

        let caller = gate.authorize_writer(&ctx).unwrap();
        assert_eq!(caller.subject, "alice");
        assert_eq!(gate.read_mode(&ctx, &caller).unwrap(), ReadMode::Full);
    }
}
