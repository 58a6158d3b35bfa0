//! SyncEngine — read-through and write-through orchestration for one entity
//! kind.
//!
//! Reads serve local data immediately and reconcile with the network result
//! afterwards. Writes are optimistic-online: the remote call runs first, and
//! only an unreachable network (with fallback permitted) parks the mutation
//! locally for the retry scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::codec::{flag_to_int, normalize_fields, normalize_payload, payloads_equal};
use crate::error::Result;
use crate::remote::{FetchTarget, MutationRequest, RemoteTransport, ResourceRoute};
use crate::store::Store;
use crate::types::{is_synthetic_key, synthetic_key, Origin, StoreSchema, StoredRecord};

use super::types::{MutationOutcome, Partition, SubmitError, SubmitOptions, UpdateStyle};

pub struct SyncEngine {
    schema: StoreSchema,
    route: ResourceRoute,
    store: Store,
    transport: Arc<dyn RemoteTransport>,
    update_style: UpdateStyle,
}

impl SyncEngine {
    pub fn new(
        schema: StoreSchema,
        route: ResourceRoute,
        store: Store,
        transport: Arc<dyn RemoteTransport>,
        update_style: UpdateStyle,
    ) -> Self {
        Self {
            schema,
            route,
            store,
            transport,
            update_style,
        }
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Serve local data through `on_local`, then reconcile with the network
    /// and call `on_network` at most once.
    ///
    /// `on_local` fires before the first await, so the caller has an answer
    /// even if the network branch never settles. `on_network` is skipped
    /// when the filtered network result matches the known untouched set, and
    /// when an empty network result would overwrite non-empty local data.
    /// Without an available store this degrades to network-only: `on_local`
    /// is not called and results are not persisted.
    pub async fn fetch<L, N>(&self, target: FetchTarget, on_local: L, on_network: N)
    where
        L: FnOnce(Result<Vec<StoredRecord>>),
        N: FnOnce(Result<Vec<StoredRecord>>),
    {
        let local = if self.store.is_available() {
            let records = self.load_local(&target);
            let partition = Partition::split(records);
            on_local(Ok(partition.live()));
            Some(partition)
        } else {
            None
        };

        let fresh = match self.transport.fetch(&self.route, &target).await {
            Ok(values) => self.normalize_fetched(values),
            Err(e) => {
                on_network(Err(e.into()));
                return;
            }
        };

        let Some(partition) = local else {
            on_network(Ok(fresh));
            return;
        };

        let pending_keys = partition.pending_keys();
        let fresh: Vec<StoredRecord> = fresh
            .into_iter()
            .filter(|r| !pending_keys.contains(&r.key))
            .collect();

        // An empty server answer never wipes non-empty local data.
        if fresh.is_empty() && !partition.is_empty() {
            return;
        }

        if Self::matches_untouched(&fresh, &partition.untouched) {
            return;
        }

        self.store.save(&self.schema, fresh.clone());

        let mut merged = partition.pending_live();
        merged.extend(fresh);
        on_network(Ok(merged));
    }

    fn load_local(&self, target: &FetchTarget) -> Vec<StoredRecord> {
        match target {
            FetchTarget::All => self.store.all(&self.schema),
            FetchTarget::ById(id) => self.store.get(&self.schema, id).into_iter().collect(),
            FetchTarget::ByIndex { field, value } => {
                self.store
                    .by_index(&self.schema, field, value.as_str().into())
            }
        }
    }

    /// Normalize raw network payloads into synced records, dropping any
    /// without a usable primary key.
    fn normalize_fetched(&self, values: Vec<Value>) -> Vec<StoredRecord> {
        let mut records = Vec::with_capacity(values.len());
        for mut value in values {
            match normalize_payload(&mut value, &self.schema) {
                Some(key) => records.push(StoredRecord::synced(key, value)),
                None => log::warn!(
                    "store {}: dropping network record without \"{}\"",
                    self.schema.name,
                    self.schema.primary_key
                ),
            }
        }
        records
    }

    /// Per-key deep comparison of the filtered network result against the
    /// known untouched set.
    fn matches_untouched(fresh: &[StoredRecord], untouched: &[StoredRecord]) -> bool {
        if fresh.len() != untouched.len() {
            return false;
        }
        let by_key: HashMap<&str, &StoredRecord> =
            untouched.iter().map(|r| (r.key.as_str(), r)).collect();
        fresh.iter().all(|r| {
            by_key
                .get(r.key.as_str())
                .is_some_and(|known| payloads_equal(&r.data, &known.data))
        })
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Replay a mutation against the server, parking it locally when the
    /// network is unreachable and fallback is permitted.
    pub async fn submit(
        &self,
        request: MutationRequest,
        options: SubmitOptions,
    ) -> std::result::Result<MutationOutcome, SubmitError> {
        let can_fall_back = options.allow_fallback && self.store.is_available();

        // A delete of a record the server never saw cannot be honored
        // remotely; resolve it purely as local suppression of the unsent
        // create.
        if let MutationRequest::Delete { key } = &request {
            if is_synthetic_key(key) && can_fall_back {
                return Ok(self.park_locally(&request));
            }
        }

        match self.transport.submit(&self.route, &request).await {
            Ok(response) => Ok(self.apply_network_success(&request, response)),
            Err(e) if e.is_unreachable() && can_fall_back => {
                log::debug!(
                    "store {}: network unreachable, parking mutation locally",
                    self.schema.name
                );
                Ok(self.park_locally(&request))
            }
            Err(e) => Err(SubmitError::network(e)),
        }
    }

    /// The replay request for an edited-but-unsent record, per this engine's
    /// update style.
    pub fn update_request_for(&self, record: &StoredRecord) -> MutationRequest {
        match &self.update_style {
            UpdateStyle::Body => MutationRequest::Update {
                key: record.key.clone(),
                data: record.data.clone(),
            },
            UpdateStyle::QueryParam { field } => MutationRequest::UpdateQuery {
                key: record.key.clone(),
                field: field.clone(),
                value: record.data.get(field).map(flag_to_int).unwrap_or(0) != 0,
            },
        }
    }

    fn apply_network_success(
        &self,
        request: &MutationRequest,
        response: Option<Value>,
    ) -> MutationOutcome {
        if let MutationRequest::Delete { key } = request {
            self.store.delete(&self.schema, key);
            return MutationOutcome {
                record: None,
                origin: Origin::Network,
            };
        }

        // Server response fields win over the locally-known payload.
        let mut merged = self.base_payload(request);
        if let Some(Value::Object(fields)) = &response {
            if let Some(map) = merged.as_object_mut() {
                for (field, value) in fields {
                    map.insert(field.clone(), value.clone());
                }
            }
        }

        let Some(key) = normalize_payload(&mut merged, &self.schema) else {
            log::warn!(
                "store {}: server confirmed mutation without \"{}\", nothing stored",
                self.schema.name,
                self.schema.primary_key
            );
            return MutationOutcome {
                record: None,
                origin: Origin::Network,
            };
        };

        let record = StoredRecord::synced(key, merged);

        match request {
            MutationRequest::Create {
                local_key: Some(old_key),
                ..
            } if is_synthetic_key(old_key) => {
                self.store.rekey(&self.schema, &record, old_key);
            }
            _ => self.store.save(&self.schema, record.clone()),
        }

        MutationOutcome {
            record: Some(record),
            origin: Origin::Network,
        }
    }

    /// A one-field payload holding only the primary key.
    fn key_only_payload(&self, key: &str) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(self.schema.primary_key.clone(), Value::from(key));
        Value::Object(map)
    }

    /// Starting payload for the network-success merge: the caller's data,
    /// with the target key patched in where the request carries one.
    fn base_payload(&self, request: &MutationRequest) -> Value {
        match request {
            MutationRequest::Create { data, .. } => data.clone(),
            MutationRequest::Update { key, data } => {
                let mut data = data.clone();
                if let Some(map) = data.as_object_mut() {
                    map.entry(self.schema.primary_key.clone())
                        .or_insert_with(|| Value::from(key.clone()));
                }
                data
            }
            MutationRequest::UpdateQuery { key, field, value } => {
                let mut data = self
                    .store
                    .get(&self.schema, key)
                    .map(|r| r.data)
                    .unwrap_or_else(|| self.key_only_payload(key));
                if let Some(map) = data.as_object_mut() {
                    map.insert(field.clone(), Value::Bool(*value));
                }
                data
            }
            MutationRequest::Delete { key } => self.key_only_payload(key),
        }
    }

    /// The offline branch: record the mutation in the store as pending work
    /// for the retry scheduler. Never fails; store errors degrade to no-ops.
    fn park_locally(&self, request: &MutationRequest) -> MutationOutcome {
        let record = match request {
            MutationRequest::Create { data, local_key } => {
                let mut data = data.clone();
                normalize_fields(&mut data, &self.schema);
                let key = local_key
                    .clone()
                    .unwrap_or_else(|| synthetic_key(&data));
                StoredRecord::new_local(key, data)
            }

            MutationRequest::Update { key, data } => {
                let mut record = self.existing_or_edited_stub(key);
                if let (Some(map), Some(changes)) =
                    (record.data.as_object_mut(), data.as_object())
                {
                    for (field, value) in changes {
                        map.insert(field.clone(), value.clone());
                    }
                }
                normalize_fields(&mut record.data, &self.schema);
                record.is_posted = false;
                record.should_delete = false;
                record
            }

            MutationRequest::UpdateQuery { key, field, value } => {
                let mut record = self.existing_or_edited_stub(key);
                if let Some(map) = record.data.as_object_mut() {
                    map.insert(field.clone(), Value::Bool(*value));
                }
                normalize_fields(&mut record.data, &self.schema);
                record.is_posted = false;
                record.should_delete = false;
                record
            }

            MutationRequest::Delete { key } => {
                let mut record = self.existing_or_edited_stub(key);
                record.should_delete = true;
                record
            }
        };

        self.store.save(&self.schema, record.clone());
        MutationOutcome {
            record: Some(record),
            origin: Origin::Local,
        }
    }

    /// The stored record under `key`, or a stub for a record the server
    /// knows but the store has never seen (mutating a record that was never
    /// fetched while offline).
    fn existing_or_edited_stub(&self, key: &str) -> StoredRecord {
        self.store.get(&self.schema, key).unwrap_or_else(|| StoredRecord {
            key: key.to_string(),
            data: self.key_only_payload(key),
            is_on_server: true,
            is_posted: false,
            should_delete: false,
        })
    }
}
