//! Wire framing and CRC tests.

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::wire::{crc16, update_crc16, WireReader, WireWriter};

#[test]
fn crc16_of_known_vector() {
    // CRC-16 with polynomial 0xA001 and initial value 0 over "123456789"
    // is the standard ARC check value.
    assert_eq!(crc16(0, b"123456789"), 0xBB3D);
}

#[test]
fn crc_accumulates_per_byte() {
    let mut crc = 0u16;
    for byte in b"beehive" {
        crc = update_crc16(crc, *byte);
    }
    assert_eq!(crc, crc16(0, b"beehive"));
}

#[tokio::test]
async fn primitives_round_trip_with_checksum() {
    let (client, server) = tokio::io::duplex(4096);
    let (_, client_write) = tokio::io::split(client);
    let (server_read, _) = tokio::io::split(server);

    let mut writer = WireWriter::new(client_write);
    writer.write_u8(7).await.unwrap();
    writer.write_u16(300).await.unwrap();
    writer.write_u32(70_000).await.unwrap();
    writer.write_u64(1 << 40).await.unwrap();
    writer.write_string("orders").await.unwrap();
    let uuid = Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap();
    writer.write_uuid(&uuid).await.unwrap();
    writer.write_checksum().await.unwrap();
    writer.flush().await.unwrap();

    let mut reader = WireReader::new(server_read);
    assert_eq!(reader.read_u8().await.unwrap(), 7);
    assert_eq!(reader.read_u16(0).await.unwrap(), 300);
    assert_eq!(reader.read_u32(0).await.unwrap(), 70_000);
    assert_eq!(reader.read_u64().await.unwrap(), 1 << 40);
    assert_eq!(reader.read_string().await.unwrap(), "orders");
    assert_eq!(reader.read_uuid().await.unwrap(), uuid);
    reader.verify_checksum().await.unwrap();
}

#[tokio::test]
async fn corrupted_checksum_is_a_transmission_error() {
    let (client, server) = tokio::io::duplex(4096);
    let (_, mut client_write) = tokio::io::split(client);
    let (server_read, _) = tokio::io::split(server);

    // Ten payload bytes followed by a checksum that disagrees.
    client_write
        .write_all(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A])
        .await
        .unwrap();
    client_write.write_all(&[0xDE, 0xAD]).await.unwrap();
    client_write.flush().await.unwrap();

    let mut reader = WireReader::new(server_read);
    for _ in 0..10 {
        reader.read_u8().await.unwrap();
    }
    let err = reader.verify_checksum().await.unwrap_err();
    assert!(err.to_string().contains("Checksum mismatch"), "{}", err);
    assert_eq!(
        super::reply_code(&err),
        super::ReplyCode::MessageTransmissionError
    );
}

#[tokio::test]
async fn oversized_fields_are_rejected() {
    let (client, server) = tokio::io::duplex(4096);
    let (_, mut client_write) = tokio::io::split(client);
    let (server_read, _) = tokio::io::split(server);

    client_write.write_all(&5000u16.to_be_bytes()).await.unwrap();
    client_write.flush().await.unwrap();

    let mut reader = WireReader::new(server_read);
    assert!(reader.read_u16(4096).await.is_err());
}

#[test]
fn unknown_opcodes_do_not_resolve() {
    assert_eq!(super::Opcode::from_u8(1), Some(super::Opcode::SignIn));
    assert_eq!(super::Opcode::from_u8(20), Some(super::Opcode::FullSync));
    assert_eq!(super::Opcode::from_u8(200), None);
}
