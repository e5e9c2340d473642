//! Binary protocol server: accept loop, session checks and opcode dispatch.
//!
//! Every message starts with an opcode byte. Messages other than `SignIn`
//! continue with the session credential (`u32` node id + 16 raw key bytes),
//! then the operation payload, then the CRC-16 trailer. Successful replies
//! are CRC-framed; failures are answered with a single bare reply-code byte
//! and the connection is closed, so framing never drifts.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Change, Header, Node, Operation};
use crate::services::{
    DatasetService, SchemaService, ServiceError, SessionRequest, SyncService, UserService,
};

use super::wire::{WireReader, WireWriter};

/// Protocol operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    SignIn = 1,
    SignOut = 2,
    AddDataset = 3,
    DeleteDataset = 4,
    ListDatasets = 5,
    PushDataset = 6,
    PopDataset = 7,
    PullDataset = 8,
    PutDataset = 9,
    LeaveDataset = 10,
    UpdateMember = 11,
    DeleteMember = 12,
    ReadMembers = 13,
    ReadPushes = 14,
    FullSync = 20,
    UpdateWatermark = 21,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::SignIn,
            2 => Self::SignOut,
            3 => Self::AddDataset,
            4 => Self::DeleteDataset,
            5 => Self::ListDatasets,
            6 => Self::PushDataset,
            7 => Self::PopDataset,
            8 => Self::PullDataset,
            9 => Self::PutDataset,
            10 => Self::LeaveDataset,
            11 => Self::UpdateMember,
            12 => Self::DeleteMember,
            13 => Self::ReadMembers,
            14 => Self::ReadPushes,
            20 => Self::FullSync,
            21 => Self::UpdateWatermark,
            _ => return None,
        })
    }
}

/// Protocol reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Success = 0,
    MessageTransmissionError = 1,
    NewContainerAvailable = 40,
    NewGroupAvailable = 50,
    NewElementAvailable = 51,
    DataNotFound = 99,
    UserNotFound = 100,
    NotEnoughRights = 110,
    InvalidSchema = 120,
    InternalError = 255,
}

/// Central error-to-reply translation for the binary protocol.
pub fn reply_code(error: &ServiceError) -> ReplyCode {
    match error {
        ServiceError::Transmission(_) => ReplyCode::MessageTransmissionError,
        ServiceError::Authentication(_) => ReplyCode::UserNotFound,
        ServiceError::NotEnoughRights(_) => ReplyCode::NotEnoughRights,
        ServiceError::EntityNotFound(_) | ServiceError::NotExists(_) => ReplyCode::DataNotFound,
        ServiceError::InvalidSchema(_)
        | ServiceError::InvalidRequest(_)
        | ServiceError::EntityDefinition(_)
        | ServiceError::DuplicatedEntity(_)
        | ServiceError::AlreadyExists(_)
        | ServiceError::NotValidIncomeData(_)
        | ServiceError::NotValidOperation(_)
        | ServiceError::UserValidation(_) => ReplyCode::InvalidSchema,
        ServiceError::Internal(_) | ServiceError::Storage(_) => ReplyCode::InternalError,
    }
}

/// Shared services handed to every connection task.
pub struct TcpState {
    pub users: Arc<UserService>,
    pub datasets: Arc<DatasetService>,
    pub schemas: Arc<SchemaService>,
    pub sync: Arc<SyncService>,
}

/// Bind and accept until the task is aborted. Bind failures propagate so
/// the binary can exit non-zero.
pub async fn run_tcp_server(state: Arc<TcpState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("TCP sync protocol listening on {}", addr);
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(error) = handle_connection(state, stream, peer).await {
                debug!("connection {} closed: {}", peer, error);
            }
        });
    }
}

type Reader = WireReader<OwnedReadHalf>;
type Writer = WireWriter<OwnedWriteHalf>;

async fn handle_connection(
    state: Arc<TcpState>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), ServiceError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = WireReader::new(read_half);
    let mut writer = WireWriter::new(write_half);

    while let Some(opcode) = reader.read_opcode().await? {
        reader.reset_crc();
        writer.reset_crc();
        let result = match Opcode::from_u8(opcode) {
            Some(opcode) => dispatch(&state, opcode, &mut reader, &mut writer).await,
            None => Err(ServiceError::Transmission(format!(
                "Unknown operation {}",
                opcode
            ))),
        };
        match result {
            Ok(()) => {
                writer.flush().await?;
            }
            Err(error) => {
                warn!("operation {} from {} failed: {}", opcode, peer, error);
                writer.write_raw_u8(reply_code(&error) as u8).await?;
                writer.flush().await?;
                break;
            }
        }
    }
    Ok(())
}

/// Read the session credential that precedes every authenticated payload.
async fn authenticate(state: &TcpState, reader: &mut Reader) -> Result<Node, ServiceError> {
    let id = reader.read_u32(0).await?;
    let key = reader.read_bytes(16).await?;
    state.users.authenticate_node(id, &key)
}

fn context_of(node: &Node) -> String {
    node.context.hyphenated().to_string()
}

async fn dispatch(
    state: &TcpState,
    opcode: Opcode,
    reader: &mut Reader,
    writer: &mut Writer,
) -> Result<(), ServiceError> {
    match opcode {
        Opcode::SignIn => sign_in(state, reader, writer).await,
        Opcode::SignOut => {
            let node = authenticate(state, reader).await?;
            reader.verify_checksum().await?;
            state.users.sign_out(&node)?;
            empty_reply(writer).await
        }
        Opcode::AddDataset => {
            let node = authenticate(state, reader).await?;
            let uuid = reader.read_uuid().await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            let dataset = state
                .datasets
                .add_dataset(&schema, &node.user, uuid, &context)?;
            writer.write_u8(ReplyCode::Success as u8).await?;
            writer.write_u32(dataset.id).await?;
            writer.write_checksum().await
        }
        Opcode::DeleteDataset => {
            let node = authenticate(state, reader).await?;
            let uuid = reader.read_uuid().await?;
            reader.verify_checksum().await?;
            state
                .datasets
                .remove_dataset(&node, &uuid, &context_of(&node))?;
            empty_reply(writer).await
        }
        Opcode::ListDatasets => {
            let node = authenticate(state, reader).await?;
            reader.verify_checksum().await?;
            let datasets = state
                .datasets
                .read_datasets(&node.user, &context_of(&node))?;
            writer.write_u8(ReplyCode::Success as u8).await?;
            writer.write_u32(datasets.len() as u32).await?;
            for dataset in &datasets {
                writer.write_uuid(&dataset.uuid).await?;
                writer.write_u32(dataset.id).await?;
                writer.write_u32(dataset.id_header).await?;
            }
            writer.write_checksum().await
        }
        Opcode::PushDataset => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_uuid().await?;
            let role = reader.read_uuid().await?;
            let until = reader.read_u64().await? as i64;
            let number = reader.read_u32(0).await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            let push = state
                .datasets
                .push_dataset(&schema, &node, &dataset, role, until, number, &context)?;
            writer.write_u8(ReplyCode::Success as u8).await?;
            writer.write_uuid(&push.uuid).await?;
            writer.write_checksum().await
        }
        Opcode::PopDataset => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_uuid().await?;
            let push = reader.read_uuid().await?;
            let name = reader.read_string().await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let dataset = state
                .datasets
                .pop_dataset(&node, &dataset, &push, &name, &context)?;
            writer.write_u8(ReplyCode::Success as u8).await?;
            writer.write_u32(dataset.id).await?;
            writer.write_u32(dataset.id_header).await?;
            writer.write_checksum().await
        }
        Opcode::PullDataset => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_uuid().await?;
            let push = reader.read_uuid().await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            state
                .datasets
                .pull_dataset(&schema, &node, &dataset, &push, &context)?;
            empty_reply(writer).await
        }
        Opcode::PutDataset => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_uuid().await?;
            let email = reader.read_string().await?;
            let name = reader.read_string().await?;
            let role = reader.read_uuid().await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            let member = state
                .datasets
                .put_dataset(&schema, &node, &dataset, &email, &name, role, &context)?;
            writer.write_u8(ReplyCode::Success as u8).await?;
            writer.write_uuid(&member).await?;
            writer.write_checksum().await
        }
        Opcode::LeaveDataset => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_uuid().await?;
            reader.verify_checksum().await?;
            state
                .datasets
                .leave_dataset(&node, &dataset, &context_of(&node))?;
            empty_reply(writer).await
        }
        Opcode::UpdateMember => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_uuid().await?;
            let user = reader.read_uuid().await?;
            let role = reader.read_uuid().await?;
            let name = reader.read_string().await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            state
                .datasets
                .update_member(&schema, &node, &dataset, &user, role, &name, &context)?;
            empty_reply(writer).await
        }
        Opcode::DeleteMember => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_uuid().await?;
            let user = reader.read_uuid().await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            state
                .datasets
                .remove_member(&schema, &node, &dataset, &user, &context)?;
            empty_reply(writer).await
        }
        Opcode::ReadMembers => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_u32(0).await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            let members = state
                .datasets
                .read_members(&schema, &node, dataset, &context)?;
            writer.write_u8(ReplyCode::Success as u8).await?;
            writer.write_u32(members.len() as u32).await?;
            for member in &members {
                writer.write_uuid(&member.id_user).await?;
                writer.write_uuid(&member.role).await?;
                writer.write_string(&member.name).await?;
                writer.write_string(&member.email).await?;
                writer.write_u8(member.status).await?;
            }
            writer.write_checksum().await
        }
        Opcode::ReadPushes => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_u32(0).await?;
            reader.verify_checksum().await?;
            let context = context_of(&node);
            let schema = state.schemas.load(&context, node.version)?;
            let pushes = state
                .datasets
                .read_pushes(&schema, &node, dataset, &context)?;
            writer.write_u8(ReplyCode::Success as u8).await?;
            writer.write_u32(pushes.len() as u32).await?;
            for push in &pushes {
                writer.write_uuid(&push.uuid).await?;
                writer.write_uuid(&push.role).await?;
                writer.write_u64(push.until as u64).await?;
                writer.write_u32(push.number).await?;
            }
            writer.write_checksum().await
        }
        Opcode::FullSync => full_sync(state, reader, writer).await,
        Opcode::UpdateWatermark => {
            let node = authenticate(state, reader).await?;
            let dataset = reader.read_u32(0).await?;
            let header = reader.read_u32(0).await?;
            let cell = reader.read_u32(0).await?;
            reader.verify_checksum().await?;
            state.sync.update_watermark(&node, dataset, header, cell)?;
            empty_reply(writer).await
        }
    }
}

async fn empty_reply(writer: &mut Writer) -> Result<(), ServiceError> {
    writer.write_u8(ReplyCode::Success as u8).await?;
    writer.write_checksum().await
}

async fn sign_in(
    state: &TcpState,
    reader: &mut Reader,
    writer: &mut Writer,
) -> Result<(), ServiceError> {
    let context = reader.read_uuid().await?;
    let auth_type = reader.read_u8().await?;
    let context = context.hyphenated().to_string();

    let (first, second) = match auth_type {
        0 => (reader.read_string().await?, reader.read_string().await?),
        1 => (reader.read_string().await?, String::new()),
        other => {
            return Err(ServiceError::Transmission(format!(
                "Unknown authentication type {}",
                other
            )))
        }
    };
    let module = reader.read_uuid().await?;
    let node_uuid = reader.read_uuid().await?;
    let node_key = reader.read_string().await?;
    let version = reader.read_u32(0).await?;
    reader.verify_checksum().await?;

    let request = SessionRequest {
        node_key,
        node_uuid,
        module,
        version,
    };
    let node = if auth_type == 0 {
        state.users.sign_in(&first, &second, &request, &context)?
    } else {
        state.users.sign_in_federated(&first, &request, &context)?
    };

    writer.write_u8(ReplyCode::Success as u8).await?;
    writer.write_u32(node.id).await?;
    writer.write_bytes(&node.key).await?;
    writer.write_checksum().await
}

/// Upload the client's pending headers, then stream back everything past
/// its watermark projected through its visibility. The client acknowledges
/// progress afterwards with `UpdateWatermark`.
async fn full_sync(
    state: &TcpState,
    reader: &mut Reader,
    writer: &mut Writer,
) -> Result<(), ServiceError> {
    let node = authenticate(state, reader).await?;
    let dataset = reader.read_u32(0).await?;
    let since = reader.read_u32(0).await?;

    let uploaded = reader.read_u32(1024).await?;
    let mut incoming: Vec<Header> = Vec::with_capacity(uploaded as usize);
    for _ in 0..uploaded {
        let transaction_name = reader.read_string().await?;
        let change_count = reader.read_u16(1024).await?;
        let mut changes = Vec::with_capacity(change_count as usize);
        for _ in 0..change_count {
            let operation = reader.read_u8().await?;
            let operation = Operation::from_tag(operation).ok_or_else(|| {
                ServiceError::NotValidOperation(format!("Unknown operation tag {}", operation))
            })?;
            let entity_uuid = reader.read_uuid().await?;
            let new_pk = reader.read_blob().await?;
            let old_pk = reader.read_blob().await?;
            let new_data = reader.read_blob().await?;
            changes.push(Change {
                id_dataset: dataset,
                id_header: 0,
                id_change: 0,
                operation,
                entity_uuid,
                new_pk,
                old_pk,
                new_data,
            });
        }
        incoming.push(Header {
            id_dataset: dataset,
            id_header: 0,
            transaction_name,
            transaction_uuid: Uuid::nil(),
            node: 0,
            id_node: node.id,
            status: 0,
            date: Utc::now(),
            changes,
        });
    }
    reader.verify_checksum().await?;

    let mut codes = Vec::with_capacity(incoming.len());
    for header in &mut incoming {
        let code = state.sync.apply_header(&node, header)?;
        codes.push(code as u8);
    }

    writer.write_u8(ReplyCode::Success as u8).await?;
    writer.write_u32(codes.len() as u32).await?;
    for code in &codes {
        writer.write_u8(*code).await?;
    }

    let outgoing = state.sync.read_headers(&node, dataset, since)?;
    writer.write_u32(outgoing.len() as u32).await?;
    for header in &outgoing {
        let changes = state.sync.read_changes(&node, dataset, header.id_header)?;
        writer.write_u32(header.id_header).await?;
        writer.write_uuid(&header.transaction_uuid).await?;
        writer.write_u16(changes.len() as u16).await?;
        for change in &changes {
            writer.write_u8(change.operation as u8).await?;
            writer.write_uuid(&change.entity_uuid).await?;
            writer.write_u16(change.id_change).await?;
            writer.write_blob(&change.new_pk).await?;
            writer.write_blob(&change.old_pk).await?;
            writer.write_blob(&change.new_data).await?;
        }
    }
    writer.write_checksum().await
}
