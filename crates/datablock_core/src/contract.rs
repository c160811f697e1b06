//! Contract entrypoints.
//!
//! # Responsibility
//! - Parse the tagged request `{"function": ..., "args": {...}}` once.
//! - Dispatch to the entity manager and encode results as JSON bytes.
//! - Map failures to a `{"code", "message"}` payload.
//!
//! # Invariants
//! - `submit` commits the request's writes only when it succeeds.
//! - `evaluate` never commits, whatever the request does.

use crate::codec::{decode, encode};
use crate::context::{Proposal, TxContext};
use crate::error::{DataBlockError, DataBlockResult};
use crate::identity::IdentityProvider;
use crate::ledger::{self, LedgerBackend, LedgerTransaction};
use crate::manager::DataBlockManager;
use crate::model::data_block::DataBlockInput;
use crate::policy::AuthorizationPolicy;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One contract request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "function",
    content = "args",
    rename_all = "snake_case",
    deny_unknown_fields
)]
pub enum ContractCall {
    Init {
        #[serde(default)]
        blocks: Vec<DataBlockInput>,
    },
    Register {
        blocks: Vec<DataBlockInput>,
    },
    Update {
        blocks: Vec<DataBlockInput>,
    },
    Remove {
        ids: Vec<String>,
    },
    Query {
        ids: Vec<String>,
    },
    QueryPrivate {
        organization: String,
        ids: Vec<String>,
    },
    QueryCollection {
        collection: String,
        ids: Vec<String>,
    },
    QueryAll,
    QueryByRange {
        /// `""` reads the public partition.
        #[serde(default)]
        collection: String,
        #[serde(default)]
        start: String,
        #[serde(default)]
        end: String,
        max: u32,
    },
}

impl ContractCall {
    /// Parses a request document.
    pub fn from_json(bytes: &[u8]) -> DataBlockResult<Self> {
        Ok(decode("request", bytes)?)
    }

    /// Entrypoint name, as it appears in the `function` tag.
    pub fn function(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Register { .. } => "register",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::Query { .. } => "query",
            Self::QueryPrivate { .. } => "query_private",
            Self::QueryCollection { .. } => "query_collection",
            Self::QueryAll => "query_all",
            Self::QueryByRange { .. } => "query_by_range",
        }
    }
}

/// Structured failure returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        encode("error", self).unwrap_or_else(|_| self.message.clone().into_bytes())
    }
}

impl From<&DataBlockError> for ErrorPayload {
    fn from(value: &DataBlockError) -> Self {
        Self {
            code: value.code().to_string(),
            message: value.to_string(),
        }
    }
}

impl Display for ErrorPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type ContractResponse = Result<Vec<u8>, ErrorPayload>;

/// Contract surface over one entity manager.
pub struct DataBlockContract<I, P> {
    manager: DataBlockManager<I, P>,
}

impl<I: IdentityProvider, P: AuthorizationPolicy> DataBlockContract<I, P> {
    pub fn new(manager: DataBlockManager<I, P>) -> Self {
        Self { manager }
    }

    /// Runs one call inside an existing transaction context.
    pub fn invoke(&self, ctx: &mut TxContext<'_>, call: ContractCall) -> DataBlockResult<Vec<u8>> {
        let manager = &self.manager;
        let bytes = match call {
            ContractCall::Init { blocks } => encode("response", &manager.init(ctx, blocks)?)?,
            ContractCall::Register { blocks } => {
                encode("response", &manager.register(ctx, blocks)?)?
            }
            ContractCall::Update { blocks } => encode("response", &manager.update(ctx, blocks)?)?,
            ContractCall::Remove { ids } => encode("response", &manager.remove(ctx, &ids)?)?,
            ContractCall::Query { ids } => encode("response", &manager.query(ctx, &ids)?)?,
            ContractCall::QueryPrivate { organization, ids } => encode(
                "response",
                &manager.query_private(ctx, &organization, &ids)?,
            )?,
            ContractCall::QueryCollection { collection, ids } => encode(
                "response",
                &manager.query_collection(ctx, &collection, &ids)?,
            )?,
            ContractCall::QueryAll => encode("response", &manager.query_all(ctx)?)?,
            ContractCall::QueryByRange {
                collection,
                start,
                end,
                max,
            } => {
                let page = if collection.is_empty() {
                    manager.query_by_range(ctx, &start, &end, max)?
                } else {
                    manager.query_collection_by_range(ctx, &collection, &start, &end, max)?
                };
                encode("response", &page)?
            }
        };
        Ok(bytes)
    }

    /// Runs one call as a committed transaction on `backend`.
    pub fn submit<B: LedgerBackend>(
        &self,
        backend: &mut B,
        proposal: &Proposal,
        call: ContractCall,
    ) -> ContractResponse {
        let function = call.function();
        let result = ledger::execute(backend, &proposal.tx_id, |tx| {
            let mut ctx = TxContext::new(proposal, tx);
            self.invoke(&mut ctx, call)
        });
        respond("submit", function, &proposal.tx_id, result)
    }

    /// Parses `request` and submits it.
    pub fn submit_json<B: LedgerBackend>(
        &self,
        backend: &mut B,
        proposal: &Proposal,
        request: &[u8],
    ) -> ContractResponse {
        match ContractCall::from_json(request) {
            Ok(call) => self.submit(backend, proposal, call),
            Err(err) => respond("submit", "unknown", &proposal.tx_id, Err(err)),
        }
    }

    /// Runs one call against committed state and discards its writes.
    pub fn evaluate<B: LedgerBackend>(
        &self,
        backend: &B,
        proposal: &Proposal,
        call: ContractCall,
    ) -> ContractResponse {
        let function = call.function();
        let mut tx = LedgerTransaction::begin(backend);
        let result = {
            let mut ctx = TxContext::new(proposal, &mut tx);
            self.invoke(&mut ctx, call)
        };
        respond("evaluate", function, &proposal.tx_id, result)
    }
}

fn respond(
    mode: &str,
    function: &str,
    tx_id: &str,
    result: DataBlockResult<Vec<u8>>,
) -> ContractResponse {
    match result {
        Ok(bytes) => {
            info!(
                "event={mode} module=contract status=ok function={function} tx_id={tx_id} bytes={}",
                bytes.len()
            );
            Ok(bytes)
        }
        Err(err) => {
            warn!(
                "event={mode} module=contract status=error function={function} tx_id={tx_id} error_code={}",
                err.code()
            );
            Err(ErrorPayload::from(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContractCall, ErrorPayload};
    use crate::error::DataBlockError;

    #[test]
    fn parses_tagged_requests() {
        let call = ContractCall::from_json(
            br#"{"function":"query_by_range","args":{"start":"a","end":"m","max":5}}"#,
        )
        .unwrap();
        assert_eq!(
            call,
            ContractCall::QueryByRange {
                collection: String::new(),
                start: "a".to_string(),
                end: "m".to_string(),
                max: 5
            }
        );
        assert_eq!(call.function(), "query_by_range");

        let call = ContractCall::from_json(br#"{"function":"query_all"}"#).unwrap();
        assert_eq!(call, ContractCall::QueryAll);
    }

    #[test]
    fn rejects_unknown_functions_and_missing_args() {
        for raw in [
            &br#"{"function":"drop_everything","args":{}}"#[..],
            &br#"{"function":"remove","args":{}}"#[..],
            &br#"{"function":"register","args":{"blocks":[{"id":"d1","ownerOrg":"Org9"}]}}"#[..],
        ] {
            let err = ContractCall::from_json(raw).unwrap_err();
            assert_eq!(err.code(), "invalid_input", "raw={raw:?}");
        }
    }

    #[test]
    fn error_payload_carries_code_and_message() {
        let payload = ErrorPayload::from(&DataBlockError::not_found("", "data1"));
        let value: serde_json::Value = serde_json::from_slice(&payload.to_bytes()).unwrap();
        assert_eq!(value["code"], "not_found");
        assert_eq!(
            value["message"],
            "data block does not exist in public partition: data1"
        );
    }
}
