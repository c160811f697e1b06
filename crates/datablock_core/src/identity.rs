//! Caller identity resolution.
//!
//! # Responsibility
//! - Decode the opaque credential attached to a proposal into
//!   `(subject, organization)`.
//! - Report the organization of the executing node.
//!
//! # Invariants
//! - A missing or malformed credential is always an `Identity` error.
//! - Organization ids match `^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$`, keeping
//!   derived partition names well-formed.

use crate::codec::{decode, encode};
use crate::context::TxContext;
use crate::error::{DataBlockError, DataBlockResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ORGANIZATION_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("valid organization id regex")
});

/// Authenticated caller of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Subject id, e.g. the certificate distinguished name.
    pub subject: String,
    /// Membership organization id.
    pub organization: String,
}

/// Identity capability consumed by the gate.
pub trait IdentityProvider {
    fn caller_identity(&self, ctx: &TxContext<'_>) -> DataBlockResult<CallerIdentity>;
    fn host_organization(&self) -> DataBlockResult<String>;
}

/// Wire form of a caller credential: organization plus base64 subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedIdentity {
    pub mspid: String,
    pub id: String,
}

impl SerializedIdentity {
    pub fn new(organization: impl Into<String>, subject: &str) -> Self {
        Self {
            mspid: organization.into(),
            id: STANDARD.encode(subject.as_bytes()),
        }
    }

    pub fn to_bytes(&self) -> DataBlockResult<Vec<u8>> {
        Ok(encode("creator", self)?)
    }

    /// Decodes and validates a credential.
    pub fn parse(bytes: &[u8]) -> DataBlockResult<CallerIdentity> {
        let wire: Self = decode("creator", bytes)
            .map_err(|err| DataBlockError::Identity(err.to_string()))?;
        validate_organization_id(&wire.mspid)?;

        let subject_bytes = STANDARD
            .decode(wire.id.as_bytes())
            .map_err(|err| DataBlockError::Identity(format!("subject is not base64: {err}")))?;
        let subject = String::from_utf8(subject_bytes)
            .map_err(|_| DataBlockError::Identity("subject is not UTF-8".to_string()))?;
        if subject.trim().is_empty() {
            return Err(DataBlockError::Identity("subject is empty".to_string()));
        }

        Ok(CallerIdentity {
            subject,
            organization: wire.mspid,
        })
    }
}

/// Builds the serialized credential for `subject` in `organization`.
pub fn credential(organization: &str, subject: &str) -> DataBlockResult<Vec<u8>> {
    SerializedIdentity::new(organization, subject).to_bytes()
}

/// Provider reading `SerializedIdentity` credentials on a node of a fixed
/// organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialIdentityProvider {
    host_organization: String,
}

impl CredentialIdentityProvider {
    pub fn new(host_organization: impl Into<String>) -> DataBlockResult<Self> {
        let host_organization = host_organization.into();
        validate_organization_id(&host_organization)?;
        Ok(Self { host_organization })
    }
}

impl IdentityProvider for CredentialIdentityProvider {
    fn caller_identity(&self, ctx: &TxContext<'_>) -> DataBlockResult<CallerIdentity> {
        let creator = ctx.creator().ok_or_else(|| {
            DataBlockError::Identity("no credential attached to transaction".to_string())
        })?;
        SerializedIdentity::parse(creator)
    }

    fn host_organization(&self) -> DataBlockResult<String> {
        Ok(self.host_organization.clone())
    }
}

/// Checks one organization id against the naming rule.
pub fn validate_organization_id(organization: &str) -> DataBlockResult<()> {
    if ORGANIZATION_ID_RE.is_match(organization) {
        Ok(())
    } else {
        Err(DataBlockError::Identity(format!(
            "organization id is invalid: `{organization}`"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{credential, CredentialIdentityProvider, IdentityProvider, SerializedIdentity};
    use crate::context::{Proposal, TxContext};
    use crate::error::DataBlockError;
    use crate::ledger::{LedgerTransaction, MemoryLedger};

    #[test]
    fn credential_roundtrips_subject_and_organization() {
        let bytes = credential("Org1MSP", "x509::CN=alice,OU=client").unwrap();
        let caller = SerializedIdentity::parse(&bytes).unwrap();
        assert_eq!(caller.subject, "x509::CN=alice,OU=client");
        assert_eq!(caller.organization, "Org1MSP");
    }

    #[test]
    fn malformed_credentials_are_identity_errors() {
        for raw in [
            &b"garbage"[..],
            &br#"{"mspid":"Org1MSP","id":"%%%"}"#[..],
            &br#"{"mspid":"","id":"YWxpY2U="}"#[..],
            &br#"{"mspid":"Org1MSP","id":""}"#[..],
        ] {
            let err = SerializedIdentity::parse(raw).unwrap_err();
            assert!(matches!(err, DataBlockError::Identity(_)), "raw={raw:?}");
        }
    }

    #[test]
    fn provider_requires_attached_credential() {
        let provider = CredentialIdentityProvider::new("Org1MSP").unwrap();
        let ledger = MemoryLedger::new();
        let mut tx = LedgerTransaction::begin(&ledger);
        let proposal = Proposal::new();
        let ctx = TxContext::new(&proposal, &mut tx);

        let err = provider.caller_identity(&ctx).unwrap_err();
        assert_eq!(err.code(), "identity");
        assert_eq!(provider.host_organization().unwrap(), "Org1MSP");
    }

    #[test]
    fn provider_rejects_invalid_host_organization() {
        assert!(CredentialIdentityProvider::new("org with spaces").is_err());
    }
}
