//! Synchronization Engine
//!
//! Accepts incoming transaction headers, validates them against the schema,
//! the caller's role and the transaction definition, runs the pre and post
//! scripts, persists the header with its changes under the next per-dataset
//! header id, and fans changes back out to peer nodes projected through
//! their Role∩Module visibility.
//!
//! Everything in `apply_header` happens inside one store transaction: on any
//! rejection the transaction is dropped and the store is untouched.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::codec::BinaryRecord;
use crate::db::{repo, Store, StoreTxn};
use crate::models::{Change, Downloaded, Header, Node, Operation};
use crate::schema::{Context, Entity, Transaction};

use super::dataset_service::DatasetService;
use super::schema_service::SchemaService;
use super::script::{ScriptEnv, ScriptHost, ScriptRow};
use super::visibility;
use super::{script, ServiceError};

/// Result codes of a header application. Values are wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApplyCode {
    Success = 0,
    Approved = 1,
    SkipEntity = 9,
    EntityNotFound = 10,
    DuplicatedEntity = 110,
    NotValidIncomeData = 120,
    NotValidOperation = 130,
    EntityDefinition = 140,
    UserValidation = 150,
}

/// Stable 32-bit identity hash for the originating server, stamped into
/// every header this instance commits.
pub fn beehive_hash(owner: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in owner.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

pub struct SyncService {
    store: Arc<Store>,
    schemas: Arc<SchemaService>,
    datasets: Arc<DatasetService>,
    server_id: u32,
}

impl SyncService {
    pub fn new(
        store: Arc<Store>,
        schemas: Arc<SchemaService>,
        datasets: Arc<DatasetService>,
        server_id: u32,
    ) -> Self {
        Self {
            store,
            schemas,
            datasets,
            server_id,
        }
    }

    fn context_of(node: &Node) -> String {
        node.context.hyphenated().to_string()
    }

    /// Validate and persist an incoming transaction. All-or-nothing: any
    /// rejection code or error leaves the store exactly as it was.
    pub fn apply_header(&self, node: &Node, header: &mut Header) -> Result<ApplyCode, ServiceError> {
        let context = Self::context_of(node);
        let schema = self.schemas.load(&context, node.version)?;

        let (_, role) = self
            .datasets
            .member_role(&schema, node, header.id_dataset, &context)?;
        if !role.may_invoke(&header.transaction_name) {
            return Err(ServiceError::not_enough_rights(format!(
                "Role does not grant transaction {}.",
                header.transaction_name
            )));
        }

        let transaction = match schema.transaction_by_name(&header.transaction_name) {
            Some(transaction) => transaction,
            None => return Ok(ApplyCode::EntityDefinition),
        };

        let txn = self.store.begin();
        let mut dataset = match repo::read_dataset_by_id(&txn, header.id_dataset, &context)? {
            Some(dataset) => dataset,
            None => {
                return Err(ServiceError::not_exists(format!(
                    "Dataset {} was not found.",
                    header.id_dataset
                )))
            }
        };
        let id_header = dataset.id_header + 1;

        // Validate each change in arrival order. Key checks run against the
        // stored rows plus an overlay of the header's own earlier changes,
        // so nothing is written before the pre-script has approved.
        let mut overlay: KeyOverlay = KeyOverlay::new();
        for (index, change) in header.changes.iter_mut().enumerate() {
            change.id_dataset = dataset.id;
            change.id_header = id_header;
            change.id_change = (index + 1) as u16;

            let entity = match schema.entity_by_uuid(&change.entity_uuid) {
                Some(entity) => entity,
                None => return Ok(ApplyCode::EntityNotFound),
            };
            if let Some(code) = check_operation(transaction, entity, change)? {
                return Ok(code);
            }
            if let Some(code) = validate_data(entity, change)? {
                return Ok(code);
            }
            if let Some(code) = check_keys(&txn, &context, dataset.id, change, &mut overlay)? {
                return Ok(code);
            }
        }

        // Pre-script: read-only approval hook. A script failure counts as a
        // rejection, never as a server fault.
        let host = ScriptHost::new()?;
        let read_only = HookEnv::new(&txn, &schema, dataset.id, id_header, &context, false);
        match host.run(
            &format!("{}:pre", transaction.name),
            &transaction.pre,
            &read_only,
        ) {
            Ok(0) => {}
            Ok(verdict) => {
                debug!(
                    "Pre-script of {} rejected header with {}",
                    transaction.name, verdict
                );
                return Ok(ApplyCode::UserValidation);
            }
            Err(error) => {
                warn!("Pre-script of {} failed: {}", transaction.name, error);
                return Ok(ApplyCode::UserValidation);
            }
        }

        // Apply the validated changes to the entity storage.
        for change in &header.changes {
            apply_change(&txn, &context, dataset.id, change)?;
        }

        // Post-script: its writes join the header as synthesized changes.
        let writable = HookEnv::new(&txn, &schema, dataset.id, id_header, &context, true);
        writable
            .next_change
            .set((header.changes.len() + 1) as u16);
        if host
            .run(
                &format!("{}:post", transaction.name),
                &transaction.post,
                &writable,
            )
            .is_err()
        {
            return Ok(ApplyCode::UserValidation);
        }
        let transformed = writable.extra.into_inner();
        let code = if transformed.is_empty() {
            ApplyCode::Success
        } else {
            ApplyCode::Approved
        };
        header.changes.extend(transformed);

        header.id_header = id_header;
        header.transaction_uuid = transaction.uuid;
        header.node = self.server_id;
        header.id_node = node.id;
        header.status = 0;
        header.date = Utc::now();

        repo::save_header(&txn, header, &context)?;
        for change in &header.changes {
            repo::save_change(&txn, change, &context)?;
        }
        dataset.id_header = id_header;
        repo::save_dataset(&txn, &dataset, &context)?;
        txn.commit()?;

        debug!(
            "Committed header {} with {} changes on dataset {}",
            id_header,
            header.changes.len(),
            dataset.id
        );
        Ok(code)
    }

    /// Headers after both `since` and the node's delivery watermark.
    pub fn read_headers(
        &self,
        node: &Node,
        dataset_id: u32,
        since: u32,
    ) -> Result<Vec<Header>, ServiceError> {
        let context = Self::context_of(node);
        let schema = self.schemas.load(&context, node.version)?;
        self.datasets
            .member_role(&schema, node, dataset_id, &context)?;
        let mark = repo::read_watermark(self.store.as_ref(), &node.uuid, dataset_id, &context)?;
        let start = since.max(mark.id_header);
        Ok(repo::read_headers_from(
            self.store.as_ref(),
            dataset_id,
            start,
            &context,
        )?)
    }

    /// Changes of one header projected through the caller's Role∩Module.
    ///
    /// Entities outside the visible set are dropped; attributes outside it
    /// are stripped by re-encoding. A node pinned to an older schema version
    /// receives text-encoded rows keyed by attribute name, so fields it does
    /// not know can be skipped client-side.
    pub fn read_changes(
        &self,
        node: &Node,
        dataset_id: u32,
        header_id: u32,
    ) -> Result<Vec<Change>, ServiceError> {
        let context = Self::context_of(node);
        let schema = self.schemas.load(&context, 0)?;
        let (_, role) = self
            .datasets
            .member_role(&schema, node, dataset_id, &context)?;
        let visibility = visibility::effective(&schema, node, role);
        let as_text = node.version != 0 && node.version < schema.version;

        let mut projected = Vec::new();
        for mut change in repo::read_changes(self.store.as_ref(), dataset_id, header_id, &context)? {
            let entity = match schema.entity_by_uuid(&change.entity_uuid) {
                Some(entity) => entity,
                None => continue,
            };
            let visible = match visibility.entity(&change.entity_uuid) {
                Some(visible) => visible,
                None => continue,
            };
            project_change(&mut change, entity, visible, as_text)?;
            projected.push(change);
        }
        Ok(projected)
    }

    /// Record delivery progress for a node on a dataset.
    pub fn update_watermark(
        &self,
        node: &Node,
        dataset_id: u32,
        header_id: u32,
        cell: u32,
    ) -> Result<(), ServiceError> {
        let context = Self::context_of(node);
        repo::save_watermark(
            self.store.as_ref(),
            &node.uuid,
            dataset_id,
            Downloaded {
                id_header: header_id,
                id_cell: cell,
            },
            &context,
        )?;
        Ok(())
    }

    /// Last fully delivered `(header, change)` for a node on a dataset.
    pub fn read_watermark(&self, node: &Node, dataset_id: u32) -> Result<Downloaded, ServiceError> {
        let context = Self::context_of(node);
        Ok(repo::read_watermark(
            self.store.as_ref(),
            &node.uuid,
            dataset_id,
            &context,
        )?)
    }

}

/// Check the operation against the transaction's per-entity rules.
fn check_operation(
    transaction: &Transaction,
    entity: &Entity,
    change: &Change,
) -> Result<Option<ApplyCode>, ServiceError> {
    let rules = match transaction
        .entities
        .iter()
        .find(|te| te.entity == change.entity_uuid)
    {
        Some(rules) => rules,
        None => return Ok(Some(ApplyCode::NotValidOperation)),
    };
    let allowed = match change.operation {
        Operation::Insert => rules.add,
        Operation::Delete => rules.remove,
        Operation::Update => {
            let updatable: HashSet<u16> = rules.update.iter().copied().collect();
            let touched = BinaryRecord::decode(&change.new_data)?;
            touched.iter().all(|(id, _)| updatable.contains(id))
        }
    };
    if !allowed {
        warn!(
            "Operation {:?} on {} not allowed by transaction {}",
            change.operation, entity.name, transaction.name
        );
        return Ok(Some(ApplyCode::NotValidOperation));
    }
    Ok(None)
}

/// Validate the row image against attribute definitions and check
/// expressions.
fn validate_data(entity: &Entity, change: &Change) -> Result<Option<ApplyCode>, ServiceError> {
    if change.operation == Operation::Delete {
        return Ok(None);
    }
    let record = BinaryRecord::decode(&change.new_data)?;
    for (id, value) in record.iter() {
        let attribute = match entity.attribute(*id) {
            Some(attribute) => attribute,
            None => return Ok(Some(ApplyCode::NotValidIncomeData)),
        };
        if attribute.notnull && matches!(value, crate::codec::Value::Null) {
            return Ok(Some(ApplyCode::NotValidIncomeData));
        }
        if let Some(check) = &attribute.check {
            if !script::check_value(check, value)? {
                warn!(
                    "Check expression rejected {}.{}",
                    entity.name, attribute.name
                );
                return Ok(Some(ApplyCode::NotValidIncomeData));
            }
        }
    }
    Ok(None)
}

/// Presence of keys touched earlier in the same header, layered over the
/// stored rows during validation.
type KeyOverlay = HashMap<(uuid::Uuid, Vec<u8>), bool>;

/// Check a change's primary keys against the row store plus the overlay of
/// the header's earlier changes, recording its own effect in the overlay.
fn check_keys(
    txn: &StoreTxn<'_>,
    context: &str,
    dataset_id: u32,
    change: &Change,
    overlay: &mut KeyOverlay,
) -> Result<Option<ApplyCode>, ServiceError> {
    let exists = |overlay: &KeyOverlay, pk: &[u8]| -> Result<bool, ServiceError> {
        if let Some(present) = overlay.get(&(change.entity_uuid, pk.to_vec())) {
            return Ok(*present);
        }
        Ok(repo::get_row(txn, dataset_id, &change.entity_uuid, pk, context)?.is_some())
    };

    match change.operation {
        Operation::Insert => {
            if exists(overlay, &change.new_pk)? {
                return Ok(Some(ApplyCode::DuplicatedEntity));
            }
            overlay.insert((change.entity_uuid, change.new_pk.clone()), true);
        }
        Operation::Update => {
            if !exists(overlay, &change.old_pk)? {
                return Ok(Some(ApplyCode::EntityNotFound));
            }
            if change.old_pk != change.new_pk {
                if exists(overlay, &change.new_pk)? {
                    return Ok(Some(ApplyCode::DuplicatedEntity));
                }
                overlay.insert((change.entity_uuid, change.old_pk.clone()), false);
            }
            overlay.insert((change.entity_uuid, change.new_pk.clone()), true);
        }
        Operation::Delete => {
            if !exists(overlay, &change.old_pk)? {
                return Ok(Some(ApplyCode::EntityNotFound));
            }
            overlay.insert((change.entity_uuid, change.old_pk.clone()), false);
        }
    }
    Ok(None)
}

/// Apply one validated change to the entity row storage.
fn apply_change(
    txn: &StoreTxn<'_>,
    context: &str,
    dataset_id: u32,
    change: &Change,
) -> Result<(), ServiceError> {
    match change.operation {
        Operation::Insert => {
            repo::put_row(
                txn,
                dataset_id,
                &change.entity_uuid,
                &change.new_pk,
                &change.new_data,
                context,
            )?;
        }
        Operation::Update => {
            if change.old_pk != change.new_pk {
                repo::delete_row(txn, dataset_id, &change.entity_uuid, &change.old_pk, context)?;
            }
            repo::put_row(
                txn,
                dataset_id,
                &change.entity_uuid,
                &change.new_pk,
                &change.new_data,
                context,
            )?;
        }
        Operation::Delete => {
            repo::delete_row(txn, dataset_id, &change.entity_uuid, &change.old_pk, context)?;
        }
    }
    Ok(())
}

/// Strip invisible attributes; optionally transcode to the text form for
/// version-skewed receivers.
fn project_change(
    change: &mut Change,
    entity: &Entity,
    visible: &HashSet<u16>,
    as_text: bool,
) -> Result<(), ServiceError> {
    if !change.new_data.is_empty() {
        let record = BinaryRecord::decode(&change.new_data)?.project(visible);
        change.new_data = if as_text {
            record.to_text(&entity.attributes_id_to_name()).encode()?
        } else {
            record.encode()?
        };
    }
    if as_text {
        let key_names = entity.keys_id_to_name();
        if !change.new_pk.is_empty() {
            change.new_pk = BinaryRecord::decode(&change.new_pk)?
                .to_text(&key_names)
                .encode()?;
        }
        if !change.old_pk.is_empty() {
            change.old_pk = BinaryRecord::decode(&change.old_pk)?
                .to_text(&key_names)
                .encode()?;
        }
    }
    Ok(())
}

/// Entity API handed to the transaction hooks. The read-only flavor backs
/// the pre-script; writes there are logged and discarded.
struct HookEnv<'a> {
    txn: &'a StoreTxn<'a>,
    schema: &'a Context,
    dataset_id: u32,
    id_header: u32,
    context: &'a str,
    writable: bool,
    extra: RefCell<Vec<Change>>,
    next_change: Cell<u16>,
}

impl<'a> HookEnv<'a> {
    fn new(
        txn: &'a StoreTxn<'a>,
        schema: &'a Context,
        dataset_id: u32,
        id_header: u32,
        context: &'a str,
        writable: bool,
    ) -> Self {
        Self {
            txn,
            schema,
            dataset_id,
            id_header,
            context,
            writable,
            extra: RefCell::new(Vec::new()),
            next_change: Cell::new(1),
        }
    }

    fn entity(&self, name: &str) -> Result<&Entity, ServiceError> {
        self.schema
            .entity_by_name(name)
            .ok_or_else(|| ServiceError::entity_not_found(format!("Unknown entity {}.", name)))
    }

    /// Split a name-keyed script row into `(primary key, data)` records.
    fn encode_row(
        &self,
        entity: &Entity,
        row: &ScriptRow,
    ) -> Result<(BinaryRecord, BinaryRecord), ServiceError> {
        let keys = entity.keys_name_map();
        let attributes = entity.attributes_name_map();
        let mut pk = BinaryRecord::new();
        let mut data = BinaryRecord::new();
        for (name, value) in row {
            if let Some(id) = keys.get(name) {
                pk.insert(id, value.clone());
            } else if let Some(id) = attributes.get(name) {
                data.insert(id, value.clone());
            } else {
                warn!("Skipping field '{}.{}'.", entity.name, name);
            }
        }
        if pk.is_empty() {
            return Err(ServiceError::not_valid_income_data(format!(
                "Row for {} carries no key fields.",
                entity.name
            )));
        }
        Ok((pk, data))
    }

    fn push_change(&self, operation: Operation, entity: &Entity, new_pk: Vec<u8>, old_pk: Vec<u8>, new_data: Vec<u8>) {
        let id_change = self.next_change.get();
        self.next_change.set(id_change + 1);
        self.extra.borrow_mut().push(Change {
            id_dataset: self.dataset_id,
            id_header: self.id_header,
            id_change,
            operation,
            entity_uuid: entity.uuid,
            new_pk,
            old_pk,
            new_data,
        });
    }
}

impl ScriptEnv for HookEnv<'_> {
    fn read(&self, entity: &str, key: ScriptRow) -> Result<Option<ScriptRow>, ServiceError> {
        let entity = self.entity(entity)?;
        let (pk, _) = self.encode_row(entity, &key)?;
        let raw = match repo::get_row(
            self.txn,
            self.dataset_id,
            &entity.uuid,
            &pk.encode()?,
            self.context,
        )? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let record = BinaryRecord::decode(&raw)?;
        let names = entity.attributes_id_to_name();
        let mut row: ScriptRow = Vec::new();
        for (name, value) in key {
            row.push((name, value));
        }
        for (id, value) in record.iter() {
            if let Some(name) = names.get(id) {
                row.push((name.clone(), value.clone()));
            }
        }
        Ok(Some(row))
    }

    fn save(&self, entity: &str, row: ScriptRow) -> Result<i64, ServiceError> {
        if !self.writable {
            warn!("Ignoring save() from a validation script");
            return Ok(0);
        }
        let entity = self.entity(entity)?;
        let (pk, data) = self.encode_row(entity, &row)?;
        let pk_bytes = pk.encode()?;
        let data_bytes = data.encode()?;
        if repo::get_row(self.txn, self.dataset_id, &entity.uuid, &pk_bytes, self.context)?.is_some()
        {
            return Ok(0);
        }
        repo::put_row(
            self.txn,
            self.dataset_id,
            &entity.uuid,
            &pk_bytes,
            &data_bytes,
            self.context,
        )?;
        self.push_change(Operation::Insert, entity, pk_bytes, Vec::new(), data_bytes);
        Ok(1)
    }

    fn update(&self, entity: &str, row: ScriptRow) -> Result<i64, ServiceError> {
        if !self.writable {
            warn!("Ignoring update() from a validation script");
            return Ok(0);
        }
        let entity = self.entity(entity)?;
        let (pk, data) = self.encode_row(entity, &row)?;
        let pk_bytes = pk.encode()?;
        let data_bytes = data.encode()?;
        if repo::get_row(self.txn, self.dataset_id, &entity.uuid, &pk_bytes, self.context)?.is_none()
        {
            return Ok(0);
        }
        repo::put_row(
            self.txn,
            self.dataset_id,
            &entity.uuid,
            &pk_bytes,
            &data_bytes,
            self.context,
        )?;
        self.push_change(
            Operation::Update,
            entity,
            pk_bytes.clone(),
            pk_bytes,
            data_bytes,
        );
        Ok(1)
    }

    fn remove(&self, entity: &str, key: ScriptRow) -> Result<i64, ServiceError> {
        if !self.writable {
            warn!("Ignoring remove() from a validation script");
            return Ok(0);
        }
        let entity = self.entity(entity)?;
        let (pk, _) = self.encode_row(entity, &key)?;
        let pk_bytes = pk.encode()?;
        if repo::get_row(self.txn, self.dataset_id, &entity.uuid, &pk_bytes, self.context)?.is_none()
        {
            return Ok(0);
        }
        repo::delete_row(
            self.txn,
            self.dataset_id,
            &entity.uuid,
            &pk_bytes,
            self.context,
        )?;
        self.push_change(Operation::Delete, entity, Vec::new(), pk_bytes, Vec::new());
        Ok(1)
    }
}
