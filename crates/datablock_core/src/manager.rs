//! Entity manager: multi-partition CRUD over data blocks.
//!
//! # Responsibility
//! - Keep the shared (public) half and the private half of each data block
//!   consistent across create/update/delete.
//! - Run the gate before every read/write and redact private sections the
//!   caller may not see.
//!
//! # Invariants
//! - Batches are fail-fast; the surrounding transaction commits nothing when
//!   any item fails.
//! - A batch naming the same id twice is rejected before any ledger access.
//! - Owner fields are written once from the authenticated caller; updates
//!   only refresh `modified_at`.
//! - Updates and deletes reach exactly the shared partitions recorded at
//!   registration, whatever the current request names.
//! - Private sections are redacted on read, never deleted by a read.
//! - The engine holds no locks: duplicate-create safety relies on the serial
//!   commit order provided by `ledger::execute`.

use crate::codec::{decode, encode};
use crate::config::{ConfigError, LedgerConfig};
use crate::context::{TxContext, TRANSIENT_COLLECTIONS, TRANSIENT_PRIVATE};
use crate::error::{DataBlockError, DataBlockResult};
use crate::gate::{require_same_organization, AccessGate, ReadMode};
use crate::guard::ExistenceGuard;
use crate::identity::{CallerIdentity, IdentityProvider};
use crate::model::data_block::{
    DataBlock, DataBlockInput, PreservedSection, PrivateRecord, PrivateSection, PublicRecord,
};
use crate::policy::AuthorizationPolicy;
use crate::store::PartitionStore;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// One page of a range query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePage {
    /// Data blocks in ascending id order, redacted per read mode.
    pub blocks: Vec<DataBlock>,
    /// Start key of the next page; `None` when the range is exhausted.
    pub bookmark: Option<String>,
}

/// Orchestrates data block reads and writes for one node.
pub struct DataBlockManager<I, P> {
    config: LedgerConfig,
    gate: AccessGate<I, P>,
}

impl<I: IdentityProvider, P: AuthorizationPolicy> DataBlockManager<I, P> {
    /// Creates a manager after validating `config`.
    pub fn new(config: LedgerConfig, identity: I, policy: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            gate: AccessGate::new(identity, policy),
        })
    }

    /// Bootstraps the ledger with optional seed blocks.
    ///
    /// An empty seed is a no-op; otherwise the seed is registered with
    /// `register` semantics.
    pub fn init(
        &self,
        ctx: &mut TxContext<'_>,
        seed: Vec<DataBlockInput>,
    ) -> DataBlockResult<Vec<String>> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let items = seed.len();
        let result = if seed.is_empty() {
            Ok(Vec::new())
        } else {
            self.register_batch(ctx, seed)
        };
        log_outcome("init", &tx_id, items, started_at, &result);
        result
    }

    /// Creates data blocks in the shared targets and the caller's private
    /// partition.
    ///
    /// Private sections come from the transient `private` entry, which must
    /// hold one section per input id.
    pub fn register(
        &self,
        ctx: &mut TxContext<'_>,
        inputs: Vec<DataBlockInput>,
    ) -> DataBlockResult<Vec<String>> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let items = inputs.len();
        let result = self.register_batch(ctx, inputs);
        log_outcome("register", &tx_id, items, started_at, &result);
        result
    }

    /// Replaces public sections of existing data blocks.
    ///
    /// Owner fields and `created_at` are kept; the private section is
    /// rewritten only when the transient `private` entry carries one. Every
    /// shared partition written at registration receives the new public
    /// record; a `collections` entry, when present, must name that same set.
    pub fn update(
        &self,
        ctx: &mut TxContext<'_>,
        inputs: Vec<DataBlockInput>,
    ) -> DataBlockResult<Vec<String>> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let items = inputs.len();
        let result = self.update_batch(ctx, inputs);
        log_outcome("update", &tx_id, items, started_at, &result);
        result
    }

    /// Deletes data blocks from the private partition and every shared
    /// partition recorded at registration.
    pub fn remove(&self, ctx: &mut TxContext<'_>, ids: &[String]) -> DataBlockResult<Vec<String>> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let result = self.remove_batch(ctx, ids);
        log_outcome("remove", &tx_id, ids.len(), started_at, &result);
        result
    }

    /// Reads data blocks from the public partition.
    ///
    /// Without read clearance every block is redacted instead of failing.
    pub fn query(&self, ctx: &mut TxContext<'_>, ids: &[String]) -> DataBlockResult<Vec<DataBlock>> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let public = self.config.public_partition.clone();
        let result = self.read_shared(ctx, &public, ids);
        log_outcome("query", &tx_id, ids.len(), started_at, &result);
        result
    }

    /// Reads full data blocks straight from one organization's private
    /// partition.
    ///
    /// Fails with `Authorization` before any ledger access unless the caller
    /// belongs to `organization`, runs on that organization's node, and holds
    /// read clearance.
    pub fn query_private(
        &self,
        ctx: &mut TxContext<'_>,
        organization: &str,
        ids: &[String],
    ) -> DataBlockResult<Vec<DataBlock>> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let result = self.read_private(ctx, organization, ids);
        log_outcome("query_private", &tx_id, ids.len(), started_at, &result);
        result
    }

    /// Reads data blocks from a named collection.
    ///
    /// `""` names the public partition; private partition names are routed
    /// through the `query_private` checks.
    pub fn query_collection(
        &self,
        ctx: &mut TxContext<'_>,
        collection: &str,
        ids: &[String],
    ) -> DataBlockResult<Vec<DataBlock>> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let result = match self.config.organization_of(collection) {
            Some(organization) => self.read_private(ctx, organization, ids),
            None => {
                let partition = self.resolve_shared(collection);
                self.read_shared(ctx, &partition, ids)
            }
        };
        log_outcome("query_collection", &tx_id, ids.len(), started_at, &result);
        result
    }

    /// First page of the whole public partition.
    pub fn query_all(&self, ctx: &mut TxContext<'_>) -> DataBlockResult<RangePage> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let result = self.read_range(ctx, "", "", "", self.config.default_page_size);
        log_outcome("query_all", &tx_id, 0, started_at, &result);
        result
    }

    /// Bounded page of public data blocks with ids in `[start, end)`.
    ///
    /// `max` must be positive and is capped at `max_page_size`.
    pub fn query_by_range(
        &self,
        ctx: &mut TxContext<'_>,
        start: &str,
        end: &str,
        max: u32,
    ) -> DataBlockResult<RangePage> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let result = self.read_range(ctx, "", start, end, max);
        log_outcome("query_by_range", &tx_id, 0, started_at, &result);
        result
    }

    /// `query_by_range` over a named collection.
    ///
    /// Private partition names get the `query_private` checks and return
    /// full blocks; other names are read like the public partition.
    pub fn query_collection_by_range(
        &self,
        ctx: &mut TxContext<'_>,
        collection: &str,
        start: &str,
        end: &str,
        max: u32,
    ) -> DataBlockResult<RangePage> {
        let started_at = Instant::now();
        let tx_id = ctx.tx_id().to_string();
        let result = self.read_range(ctx, collection, start, end, max);
        log_outcome("query_collection_by_range", &tx_id, 0, started_at, &result);
        result
    }

    fn register_batch(
        &self,
        ctx: &mut TxContext<'_>,
        inputs: Vec<DataBlockInput>,
    ) -> DataBlockResult<Vec<String>> {
        let caller = self.gate.authorize_writer(ctx)?;
        let shared = self
            .requested_collections(ctx)?
            .unwrap_or_else(|| vec![self.config.public_partition.clone()]);
        let private_partition = self.config.private_partition(&caller.organization);
        ctx.transient().require(TRANSIENT_PRIVATE)?;
        let mut private_sections = ctx.transient().private_sections()?.unwrap_or_default();

        validate_batch(&inputs)?;
        if let Some(missing) = inputs
            .iter()
            .find(|input| !private_sections.contains_key(&input.id))
        {
            return Err(DataBlockError::invalid_input(format!(
                "transient entry `{TRANSIENT_PRIVATE}` has no section for `{}`",
                missing.id
            )));
        }
        ensure_sections_match_batch(&private_sections, &inputs)?;

        let now = ctx.timestamp_ms();
        let mut store = ctx.store();
        let mut registered = Vec::with_capacity(inputs.len());
        for input in inputs {
            let private = private_sections.remove(&input.id).unwrap_or_default();
            let record = PrivateRecord {
                block: DataBlock {
                    public: input.into_public(),
                    preserved: PreservedSection::new(
                        caller.subject.as_str(),
                        caller.organization.as_str(),
                        now,
                    ),
                    private,
                },
                collections: shared.clone(),
            };
            create_block(&mut store, &private_partition, &record)?;
            registered.push(record.block.public.id);
        }
        Ok(registered)
    }

    fn update_batch(
        &self,
        ctx: &mut TxContext<'_>,
        inputs: Vec<DataBlockInput>,
    ) -> DataBlockResult<Vec<String>> {
        let caller = self.gate.authorize_writer(ctx)?;
        let requested = self.requested_collections(ctx)?;
        let private_partition = self.config.private_partition(&caller.organization);
        let mut private_sections: BTreeMap<String, PrivateSection> =
            ctx.transient().private_sections()?.unwrap_or_default();
        validate_batch(&inputs)?;
        ensure_sections_match_batch(&private_sections, &inputs)?;

        let now = ctx.timestamp_ms();
        let mut store = ctx.store();
        let mut updated = Vec::with_capacity(inputs.len());
        for input in inputs {
            let existing = self.load_owned_record(
                &store,
                &private_partition,
                requested.as_deref(),
                &caller,
                &input.id,
            )?;
            let private = private_sections
                .remove(&input.id)
                .unwrap_or(existing.block.private);
            let record = PrivateRecord {
                block: DataBlock {
                    public: input.into_public(),
                    preserved: existing.block.preserved.touched(now),
                    private,
                },
                collections: existing.collections,
            };
            overwrite_block(&mut store, &private_partition, &record)?;
            updated.push(record.block.public.id);
        }
        Ok(updated)
    }

    fn remove_batch(&self, ctx: &mut TxContext<'_>, ids: &[String]) -> DataBlockResult<Vec<String>> {
        let caller = self.gate.authorize_writer(ctx)?;
        let requested = self.requested_collections(ctx)?;
        let private_partition = self.config.private_partition(&caller.organization);
        ensure_unique_ids(ids.iter().map(String::as_str))?;

        let mut store = ctx.store();
        for id in ids {
            let existing = self.load_owned_record(
                &store,
                &private_partition,
                requested.as_deref(),
                &caller,
                id,
            )?;
            for partition in &existing.collections {
                store.delete(partition, id)?;
            }
            store.delete(&private_partition, id)?;
        }
        Ok(ids.to_vec())
    }

    /// Loads the caller organization's record for `id` and checks that every
    /// shared copy it lists is still present.
    ///
    /// Returns the record with `collections` filled in. Without a private
    /// record, a public record owned by another organization in the
    /// requested (or public) partitions turns `NotFound` into
    /// `Authorization`.
    fn load_owned_record(
        &self,
        store: &PartitionStore<'_>,
        private_partition: &str,
        requested: Option<&[String]>,
        caller: &CallerIdentity,
        id: &str,
    ) -> DataBlockResult<PrivateRecord> {
        let Some(bytes) = store.get(private_partition, id)? else {
            let public = [self.config.public_partition.clone()];
            for partition in requested.unwrap_or(&public[..]) {
                if let Some(bytes) = store.get(partition, id)? {
                    let record: PublicRecord = decode(id, &bytes)?;
                    require_owner(&record.preserved, caller, id)?;
                }
            }
            return Err(DataBlockError::not_found(private_partition, id));
        };

        let mut record: PrivateRecord = decode(id, &bytes)?;
        require_owner(&record.block.preserved, caller, id)?;
        if record.collections.is_empty() {
            record.collections = vec![self.config.public_partition.clone()];
        }
        if let Some(requested) = requested {
            let stored: BTreeSet<&String> = record.collections.iter().collect();
            if stored != requested.iter().collect::<BTreeSet<_>>() {
                return Err(DataBlockError::invalid_input(format!(
                    "transient entry `{TRANSIENT_COLLECTIONS}` must name the collections data block `{id}` was registered in"
                )));
            }
        }
        for partition in &record.collections {
            store.require_exists(partition, id)?;
        }
        Ok(record)
    }

    fn read_shared(
        &self,
        ctx: &mut TxContext<'_>,
        partition: &str,
        ids: &[String],
    ) -> DataBlockResult<Vec<DataBlock>> {
        let caller = self.gate.caller_identity(ctx)?;
        let mode = self.gate.read_mode(ctx, &caller)?;
        let host = self.gate.host_organization()?;

        let store = ctx.store();
        ids.iter()
            .map(|id| -> DataBlockResult<DataBlock> {
                let bytes = store.require_exists(partition, id)?;
                let record: PublicRecord = decode(id, &bytes)?;
                self.reveal(&store, record, mode, &caller, &host)
            })
            .collect()
    }

    fn read_private(
        &self,
        ctx: &mut TxContext<'_>,
        organization: &str,
        ids: &[String],
    ) -> DataBlockResult<Vec<DataBlock>> {
        self.authorize_private_read(ctx, organization)?;

        let partition = self.config.private_partition(organization);
        let store = ctx.store();
        ids.iter()
            .map(|id| -> DataBlockResult<DataBlock> {
                let bytes = store.require_exists(&partition, id)?;
                Ok(decode::<DataBlock>(id, &bytes)?)
            })
            .collect()
    }

    /// Caller must belong to `organization`, run on its node and hold read
    /// clearance. Checked before any ledger access.
    fn authorize_private_read(
        &self,
        ctx: &TxContext<'_>,
        organization: &str,
    ) -> DataBlockResult<()> {
        let caller = self.gate.caller_identity(ctx)?;
        if caller.organization != organization {
            return Err(DataBlockError::authorization(format!(
                "client from org {} may not read the private partition of org {organization}",
                caller.organization
            )));
        }
        let host = self.gate.host_organization()?;
        require_same_organization(&caller.organization, &host)?;
        self.gate.require_read_clearance(ctx, &caller)
    }

    fn read_range(
        &self,
        ctx: &mut TxContext<'_>,
        collection: &str,
        start: &str,
        end: &str,
        max: u32,
    ) -> DataBlockResult<RangePage> {
        if max == 0 {
            return Err(DataBlockError::invalid_input(
                "range query max must be greater than zero",
            ));
        }
        if !end.is_empty() && start > end {
            return Err(DataBlockError::invalid_input(format!(
                "range start `{start}` is after range end `{end}`"
            )));
        }
        let limit = usize::try_from(self.config.clamp_page_size(max)).unwrap_or(usize::MAX);

        if let Some(organization) = self.config.organization_of(collection) {
            self.authorize_private_read(ctx, organization)?;
            let store = ctx.store();
            let page = store.scan(collection, start, end, limit)?;
            let blocks = page
                .entries
                .into_iter()
                .map(|entry| -> DataBlockResult<DataBlock> {
                    Ok(decode::<DataBlock>(&entry.key, &entry.value)?)
                })
                .collect::<DataBlockResult<Vec<_>>>()?;
            return Ok(RangePage {
                blocks,
                bookmark: page.next_key,
            });
        }

        let partition = self.resolve_shared(collection);
        let caller = self.gate.caller_identity(ctx)?;
        let mode = self.gate.read_mode(ctx, &caller)?;
        let host = self.gate.host_organization()?;

        let store = ctx.store();
        let page = store.scan(&partition, start, end, limit)?;
        let blocks = page
            .entries
            .into_iter()
            .map(|entry| -> DataBlockResult<DataBlock> {
                let record: PublicRecord = decode(&entry.key, &entry.value)?;
                self.reveal(&store, record, mode, &caller, &host)
            })
            .collect::<DataBlockResult<Vec<_>>>()?;

        Ok(RangePage {
            blocks,
            bookmark: page.next_key,
        })
    }

    /// Completes a public record with its private section when allowed.
    ///
    /// Full mode reveals only blocks owned by the caller's organization, and
    /// only on that organization's node.
    fn reveal(
        &self,
        store: &PartitionStore<'_>,
        record: PublicRecord,
        mode: ReadMode,
        caller: &CallerIdentity,
        host: &str,
    ) -> DataBlockResult<DataBlock> {
        if mode == ReadMode::Visitor || record.preserved.owner_org != caller.organization {
            return Ok(record.redacted());
        }
        require_same_organization(&caller.organization, host)?;

        let partition = self.config.private_partition(&caller.organization);
        let id = record.public.id.clone();
        let bytes = store.require_exists(&partition, &id)?;
        let stored: DataBlock = decode(&id, &bytes)?;
        Ok(record.with_private(stored.private))
    }

    /// Decodes the `collections` entry into resolved shared partitions.
    ///
    /// The list must be non-empty, free of duplicates and of private
    /// partition names.
    fn requested_collections(&self, ctx: &TxContext<'_>) -> DataBlockResult<Option<Vec<String>>> {
        let Some(collections) = ctx.transient().collections()? else {
            return Ok(None);
        };
        if collections.is_empty() {
            return Err(DataBlockError::invalid_input(format!(
                "transient entry `{TRANSIENT_COLLECTIONS}` must name at least one collection"
            )));
        }
        let mut seen = BTreeSet::new();
        let mut shared = Vec::with_capacity(collections.len());
        for collection in collections {
            if self.config.organization_of(&collection).is_some() {
                return Err(DataBlockError::invalid_input(format!(
                    "collection `{collection}` is a private partition"
                )));
            }
            let partition = self.resolve_shared(&collection);
            if !seen.insert(partition.clone()) {
                return Err(DataBlockError::invalid_input(format!(
                    "collection `{collection}` is listed twice"
                )));
            }
            shared.push(partition);
        }
        Ok(Some(shared))
    }

    /// `""` stands for the configured public partition.
    fn resolve_shared(&self, collection: &str) -> String {
        if collection.is_empty() {
            self.config.public_partition.clone()
        } else {
            collection.to_string()
        }
    }
}

fn create_block(
    store: &mut PartitionStore<'_>,
    private_partition: &str,
    record: &PrivateRecord,
) -> DataBlockResult<()> {
    let id = record.block.id();
    let public_bytes = encode(id, &record.block.public_record())?;
    for partition in &record.collections {
        store.require_absent(partition, id)?;
        store.set(partition, id, public_bytes.clone())?;
    }
    store.require_absent(private_partition, id)?;
    store.set(private_partition, id, encode(id, record)?)
}

fn overwrite_block(
    store: &mut PartitionStore<'_>,
    private_partition: &str,
    record: &PrivateRecord,
) -> DataBlockResult<()> {
    let id = record.block.id();
    let public_bytes = encode(id, &record.block.public_record())?;
    for partition in &record.collections {
        store.set(partition, id, public_bytes.clone())?;
    }
    store.set(private_partition, id, encode(id, record)?)
}

fn require_owner(
    preserved: &PreservedSection,
    caller: &CallerIdentity,
    id: &str,
) -> DataBlockResult<()> {
    if preserved.owner_org == caller.organization {
        Ok(())
    } else {
        Err(DataBlockError::authorization(format!(
            "data block `{id}` is owned by org {}, not {}",
            preserved.owner_org, caller.organization
        )))
    }
}

fn validate_batch(inputs: &[DataBlockInput]) -> DataBlockResult<()> {
    ensure_unique_ids(inputs.iter().map(|input| input.id.as_str()))?;
    for input in inputs {
        input
            .validate()
            .map_err(|err| DataBlockError::invalid_input(err.to_string()))?;
    }
    Ok(())
}

/// Every private section must belong to an id in the batch.
fn ensure_sections_match_batch(
    sections: &BTreeMap<String, PrivateSection>,
    inputs: &[DataBlockInput],
) -> DataBlockResult<()> {
    let batch: BTreeSet<&str> = inputs.iter().map(|input| input.id.as_str()).collect();
    match sections.keys().find(|id| !batch.contains(id.as_str())) {
        Some(stray) => Err(DataBlockError::invalid_input(format!(
            "transient entry `{TRANSIENT_PRIVATE}` has a section for `{stray}`, which is not in this request"
        ))),
        None => Ok(()),
    }
}

fn ensure_unique_ids<'a>(ids: impl Iterator<Item = &'a str>) -> DataBlockResult<()> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(DataBlockError::invalid_input(format!(
                "data block id `{id}` appears more than once in one request"
            )));
        }
    }
    Ok(())
}

fn log_outcome<T>(
    operation: &str,
    tx_id: &str,
    items: usize,
    started_at: Instant,
    result: &DataBlockResult<T>,
) {
    match result {
        Ok(_) => info!(
            "event={operation} module=manager status=ok tx_id={tx_id} items={items} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={operation} module=manager status=error tx_id={tx_id} items={items} duration_ms={} error_code={} error={}",
            started_at.elapsed().as_millis(),
            err.code(),
            err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_sections_match_batch, ensure_unique_ids};
    use crate::model::data_block::{DataBlockInput, PrivateSection};
    use std::collections::BTreeMap;

    #[test]
    fn duplicate_ids_are_rejected() {
        assert!(ensure_unique_ids(["a", "b"].into_iter()).is_ok());
        let err = ensure_unique_ids(["a", "b", "a"].into_iter()).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(err.to_string().contains("`a`"));
    }

    #[test]
    fn sections_outside_the_batch_are_rejected() {
        let inputs = vec![DataBlockInput::new("a", "A")];
        let mut sections = BTreeMap::new();
        sections.insert("a".to_string(), PrivateSection::default());
        assert!(ensure_sections_match_batch(&sections, &inputs).is_ok());

        sections.insert("zz".to_string(), PrivateSection::default());
        let err = ensure_sections_match_batch(&sections, &inputs).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(err.to_string().contains("`zz`"));
    }
}
