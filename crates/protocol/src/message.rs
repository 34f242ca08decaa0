use std::io::Cursor;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cachenode_common::ProtocolError;

use crate::frame::{check_line, get_line};

/// Mensagem do protocolo: um objeto JSON por linha, discriminado por `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `node_id` presente indica uma escrita já replicada por outro nó.
    Set {
        key: String,
        value: Value,
        ttl: i64,
        node_id: Option<String>,
    },
    Get {
        key: String,
    },
    Delete {
        key: String,
        node_id: Option<String>,
    },
    Join {
        node_id: String,
    },
    /// A resposta a um `join` leva o id de quem aceitou.
    Ack {
        success: bool,
        node_id: Option<String>,
    },
    Response {
        value: Value,
        success: bool,
    },
    /// Tipo não reconhecido. O handler registra e ignora.
    Unknown {
        kind: String,
    },
}

/// Forma do objeto no fio, na escrita. Todos os campos exceto `type` são opcionais.
#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
}

/// Forma do objeto no fio, na leitura. Campos ausentes assumem o valor zero
/// (`ttl` = 0, `success` = false, `value` = null).
#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    ttl: Option<i64>,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    success: Option<bool>,
}

impl Message {
    pub fn ack(success: bool) -> Self {
        Message::Ack {
            success,
            node_id: None,
        }
    }

    /// `ack{success:true}` de resposta a um `join`, identificando o nó.
    pub fn join_ack(node_id: impl Into<String>) -> Self {
        Message::Ack {
            success: true,
            node_id: Some(node_id.into()),
        }
    }

    /// Nome do tipo como aparece no campo `type`.
    pub fn kind(&self) -> &str {
        match self {
            Message::Set { .. } => "set",
            Message::Get { .. } => "get",
            Message::Delete { .. } => "delete",
            Message::Join { .. } => "join",
            Message::Ack { .. } => "ack",
            Message::Response { .. } => "response",
            Message::Unknown { kind } => kind,
        }
    }

    /// `ack` e `response` são respostas a um request pendente na conexão.
    pub fn is_reply(&self) -> bool {
        matches!(self, Message::Ack { .. } | Message::Response { .. })
    }

    /// Verifica se uma mensagem completa (uma linha) está no buffer.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
        check_line(src)
    }

    /// Faz o parse da próxima linha do cursor.
    /// Retorna `None` para linhas em branco, que são ignoradas.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Option<Message>, ProtocolError> {
        let line = get_line(src)?;
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Message::decode(line).map(Some)
    }

    /// Decodifica um objeto JSON (sem o terminador de linha).
    pub fn decode(line: &[u8]) -> Result<Message, ProtocolError> {
        let text =
            std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))?;
        let wire: WireIn =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Message::try_from(wire)
    }

    /// Encoda a mensagem como uma linha JSON terminada em `\n`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let wire = self.to_wire();
        let encoded =
            serde_json::to_vec(&wire).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        dst.reserve(encoded.len() + 1);
        dst.put_slice(&encoded);
        dst.put_u8(b'\n');
        Ok(())
    }

    fn to_wire(&self) -> WireOut<'_> {
        let mut wire = WireOut {
            kind: self.kind(),
            key: None,
            value: None,
            ttl: None,
            node_id: None,
            success: None,
        };
        match self {
            Message::Set {
                key,
                value,
                ttl,
                node_id,
            } => {
                wire.key = Some(key.as_str());
                wire.value = Some(value);
                wire.ttl = Some(*ttl);
                wire.node_id = node_id.as_deref();
            }
            Message::Get { key } => wire.key = Some(key.as_str()),
            Message::Delete { key, node_id } => {
                wire.key = Some(key.as_str());
                wire.node_id = node_id.as_deref();
            }
            Message::Join { node_id } => wire.node_id = Some(node_id.as_str()),
            Message::Ack { success, node_id } => {
                wire.success = Some(*success);
                wire.node_id = node_id.as_deref();
            }
            Message::Response { value, success } => {
                if !value.is_null() {
                    wire.value = Some(value);
                }
                wire.success = Some(*success);
            }
            Message::Unknown { .. } => {}
        }
        wire
    }
}

impl TryFrom<WireIn> for Message {
    type Error = ProtocolError;

    fn try_from(wire: WireIn) -> Result<Self, Self::Error> {
        let message = match wire.kind.as_str() {
            "set" => Message::Set {
                key: required(wire.key, "set", "key")?,
                value: wire.value.unwrap_or(Value::Null),
                ttl: wire.ttl.unwrap_or(0),
                node_id: wire.node_id,
            },
            "get" => Message::Get {
                key: required(wire.key, "get", "key")?,
            },
            "delete" => Message::Delete {
                key: required(wire.key, "delete", "key")?,
                node_id: wire.node_id,
            },
            "join" => Message::Join {
                node_id: required(wire.node_id, "join", "node_id")?,
            },
            "ack" => Message::Ack {
                success: wire.success.unwrap_or(false),
                node_id: wire.node_id,
            },
            "response" => Message::Response {
                value: wire.value.unwrap_or(Value::Null),
                success: wire.success.unwrap_or(false),
            },
            _ => Message::Unknown { kind: wire.kind },
        };
        Ok(message)
    }
}

fn required(
    field: Option<String>,
    kind: &'static str,
    name: &'static str,
) -> Result<String, ProtocolError> {
    field.ok_or(ProtocolError::MissingField { kind, field: name })
}
