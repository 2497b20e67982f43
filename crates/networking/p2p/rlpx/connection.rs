use ethkit_common::types::Node;
use rand::rngs::OsRng;
use secp256k1::SecretKey;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpSocket, TcpStream},
};
use tokio_util::codec::Framed;

use super::{error::RLPxError, frame::RLPxCodec, handshake::Handshake, utils::log_peer_debug};

pub struct RLPxConnection;

impl RLPxConnection {
    /// Opens a TCP connection to `node`, runs the initiator handshake and returns the framed,
    /// encrypted stream.
    pub async fn connect(
        identity: &SecretKey,
        node: &Node,
    ) -> Result<Framed<TcpStream, RLPxCodec>, RLPxError> {
        let mut stream = tcp_stream(node).await?;

        let mut handshake = Handshake::new(&mut OsRng, *identity, node.id)?;
        let auth_packet = handshake.create_auth_message(&mut OsRng)?;
        stream.write_all(&auth_packet).await?;
        log_peer_debug(node, "Auth sent");

        let ack_packet = receive_ack(&mut stream).await?;
        let secrets = handshake.extract_secrets(&ack_packet)?;
        log_peer_debug(node, "Handshake completed");

        Ok(Framed::new(stream, RLPxCodec::new(secrets)?))
    }
}

async fn tcp_stream(node: &Node) -> Result<TcpStream, std::io::Error> {
    TcpSocket::new_v4()?.connect(node.tcp_addr()).await
}

/// Reads the size-prefixed ack packet, keeping the prefix since it is authenticated data.
async fn receive_ack(stream: &mut TcpStream) -> Result<Vec<u8>, RLPxError> {
    let mut size_data = [0u8; 2];
    stream.read_exact(&mut size_data).await?;
    let ack_size = u16::from_be_bytes(size_data) as usize;

    let mut ack_packet = vec![0u8; 2 + ack_size];
    ack_packet[..2].copy_from_slice(&size_data);
    stream.read_exact(&mut ack_packet[2..]).await?;
    Ok(ack_packet)
}
