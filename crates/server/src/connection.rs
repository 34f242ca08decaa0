use std::io::Cursor;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use cachenode_common::{ConnectionError, INITIAL_BUFFER_CAPACITY, ProtocolError};
use cachenode_protocol::Message;

/// Wrapper sobre TcpStream com buffer para leitura/escrita de mensagens em
/// linhas JSON. Pode ser dividido em metade de leitura e de escrita.
pub struct Connection {
    reader: MessageReader,
    writer: MessageWriter,
}

/// Metade de leitura: acumula bytes até ter uma linha completa.
pub struct MessageReader {
    stream: OwnedReadHalf,
    buffer: BytesMut,
}

/// Metade de escrita: uma mensagem por linha, com flush a cada mensagem.
pub struct MessageWriter {
    stream: BufWriter<OwnedWriteHalf>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: MessageReader {
                stream: read,
                buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            },
            writer: MessageWriter {
                stream: BufWriter::new(write),
            },
        }
    }

    pub async fn read_message(&mut self) -> Result<Option<Message>, ConnectionError> {
        self.reader.read_message().await
    }

    pub async fn write_message(&mut self, message: &Message) -> Result<(), ConnectionError> {
        self.writer.write_message(message).await
    }

    /// Separa as metades; bytes já lidos e não consumidos ficam no reader.
    pub fn into_split(self) -> (MessageReader, MessageWriter) {
        (self.reader, self.writer)
    }
}

impl MessageReader {
    /// Lê uma mensagem completa do stream. Retorna None no EOF.
    pub async fn read_message(&mut self) -> Result<Option<Message>, ConnectionError> {
        loop {
            if let Some(message) = self.parse_message()? {
                return Ok(Some(message));
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(ConnectionError::ConnectionReset);
            }
        }
    }

    fn parse_message(&mut self) -> Result<Option<Message>, ConnectionError> {
        loop {
            let mut cursor = Cursor::new(&self.buffer[..]);

            match Message::check(&mut cursor) {
                Ok(()) => {
                    let len = cursor.position() as usize;
                    cursor.set_position(0);
                    let parsed = Message::parse(&mut cursor);
                    self.buffer.advance(len);
                    match parsed? {
                        Some(message) => return Ok(Some(message)),
                        // linha em branco
                        None => continue,
                    }
                }
                Err(ProtocolError::Incomplete) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl MessageWriter {
    /// Escreve uma mensagem no stream.
    pub async fn write_message(&mut self, message: &Message) -> Result<(), ConnectionError> {
        let mut buf = BytesMut::new();
        message.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Envia FIN ao peer. Leituras do outro lado passam a ver EOF.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Connection::new(server), client)
    }

    #[tokio::test]
    async fn reads_messages_split_across_packets() {
        let (mut conn, mut client) = pair().await;

        client.write_all(b"{\"type\":\"get\",").await.unwrap();
        client.flush().await.unwrap();
        client
            .write_all(b"\"key\":\"a\"}\n\n{\"type\":\"ack\",\"success\":true}\n")
            .await
            .unwrap();

        assert_eq!(
            conn.read_message().await.unwrap(),
            Some(Message::Get { key: "a".into() })
        );
        assert_eq!(conn.read_message().await.unwrap(), Some(Message::ack(true)));
    }

    #[tokio::test]
    async fn eof_returns_none() {
        let (mut conn, client) = pair().await;
        drop(client);
        assert_eq!(conn.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_line_at_eof_is_reset() {
        let (mut conn, mut client) = pair().await;
        client.write_all(b"{\"type\":").await.unwrap();
        drop(client);
        assert!(matches!(
            conn.read_message().await,
            Err(ConnectionError::ConnectionReset)
        ));
    }

    #[tokio::test]
    async fn malformed_line_is_protocol_error() {
        let (mut conn, mut client) = pair().await;
        client.write_all(b"hello\n").await.unwrap();
        assert!(matches!(
            conn.read_message().await,
            Err(ConnectionError::Protocol(ProtocolError::InvalidJson(_)))
        ));
    }

    #[tokio::test]
    async fn write_then_read_over_socket() {
        let (conn, client) = pair().await;
        let (_, mut writer) = conn.into_split();
        let mut other = Connection::new(client);

        let message = Message::Set {
            key: "x".into(),
            value: json!([1, "two"]),
            ttl: 60,
            node_id: None,
        };
        writer.write_message(&message).await.unwrap();
        assert_eq!(other.read_message().await.unwrap(), Some(message));

        writer.shutdown().await.unwrap();
        assert_eq!(other.read_message().await.unwrap(), None);
    }
}
