use std::io::{self, Write};

use anyhow::{Context, bail};
use bytes::{Buf, BytesMut};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cachenode_common::{DEFAULT_PORT, ProtocolError};
use cachenode_protocol::Message;

const DEFAULT_TTL: i64 = 60;

#[derive(Parser, Debug)]
#[command(name = "cachenode-cli", about = "Cliente para nós de cache")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Comando para executar diretamente (modo não interativo)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("falha ao conectar em {addr}"))?;
    let mut client = Client::new(stream);

    // Modo comando único (via argumentos)
    if !args.command.is_empty() {
        let message = parse_command(&args.command)?;
        let reply = client.execute(&message).await?;
        println!("{}", format_reply(&message, &reply));
        return Ok(());
    }

    println!("Conectado a {addr}");

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        print!("cache> ");
        io::stdout().flush()?;

        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break; // EOF
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let message = match parse_command(&tokenize(line)) {
            Ok(m) => m,
            Err(e) => {
                println!("(error) {e}");
                continue;
            }
        };

        match client.execute(&message).await {
            Ok(reply) => println!("{}", format_reply(&message, &reply)),
            Err(e) => {
                println!("(error) {e}");
                break;
            }
        }
    }

    Ok(())
}

struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Envia a mensagem e lê a resposta.
    async fn execute(&mut self, message: &Message) -> anyhow::Result<Message> {
        let mut buf = BytesMut::new();
        message.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> anyhow::Result<Message> {
        loop {
            let mut cursor = std::io::Cursor::new(&self.buffer[..]);
            match Message::check(&mut cursor) {
                Ok(()) => {
                    let len = cursor.position() as usize;
                    cursor.set_position(0);
                    let parsed = Message::parse(&mut cursor)?;
                    self.buffer.advance(len);
                    if let Some(reply) = parsed {
                        return Ok(reply);
                    }
                    continue;
                }
                Err(ProtocolError::Incomplete) => {}
                Err(e) => return Err(e.into()),
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                bail!("servidor fechou a conexão");
            }
        }
    }
}

/// Converte tokens (`SET k v [ttl]`, `GET k`, `DEL k`) em mensagem.
///
/// Não há `JOIN`: uma conexão registrada como peer passa a receber escritas
/// replicadas, que o cliente confundiria com respostas.
fn parse_command(tokens: &[String]) -> anyhow::Result<Message> {
    let Some((name, rest)) = tokens.split_first() else {
        bail!("comando vazio");
    };

    let message = match (name.to_ascii_uppercase().as_str(), rest) {
        ("SET", [key, value]) => Message::Set {
            key: key.clone(),
            value: parse_value(value),
            ttl: DEFAULT_TTL,
            node_id: None,
        },
        ("SET", [key, value, ttl]) => Message::Set {
            key: key.clone(),
            value: parse_value(value),
            ttl: ttl
                .parse()
                .with_context(|| format!("ttl inválido: '{ttl}'"))?,
            node_id: None,
        },
        ("GET", [key]) => Message::Get { key: key.clone() },
        ("DEL" | "DELETE", [key]) => Message::Delete {
            key: key.clone(),
            node_id: None,
        },
        ("SET", _) => bail!("uso: SET <key> <value> [ttl]"),
        ("GET" | "DEL" | "DELETE", _) => bail!("uso: {} <key>", name.to_ascii_uppercase()),
        _ => bail!("comando desconhecido: '{name}'"),
    };
    Ok(message)
}

/// Valores são JSON quando possível (`42`, `{"a":1}`); senão, string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Divide a linha em tokens; aspas simples ou duplas agrupam espaços.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => quote = Some(c),
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Formata a resposta para exibição humana.
fn format_reply(request: &Message, reply: &Message) -> String {
    match reply {
        Message::Ack { success: true, .. } => "OK".into(),
        Message::Ack { success: false, .. } => match request {
            Message::Set { .. } | Message::Delete { .. } => {
                "(error) aplicado localmente, replicação falhou".into()
            }
            _ => "(error) recusado".into(),
        },
        Message::Response { success: false, .. } => "(nil)".into(),
        Message::Response { value, .. } => value.to_string(),
        other => format!("(unexpected) {}", other.kind()),
    }
}
