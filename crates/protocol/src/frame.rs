use std::io::Cursor;

use cachenode_common::{MAX_LINE_SIZE, ProtocolError};

/// Verifica se uma linha completa (terminada em `\n`) está disponível no buffer
/// sem alocar. Em caso de sucesso o cursor fica posicionado após o `\n`.
pub fn check_line(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
    get_line(src).map(|_| ())
}

/// Lê uma linha a partir da posição atual do cursor, sem o terminador
/// (`\n` ou `\r\n`).
pub fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();
    let rest = &buf[start..];

    match rest.iter().position(|&b| b == b'\n') {
        Some(i) => {
            if i > MAX_LINE_SIZE {
                return Err(ProtocolError::LineTooLong(i));
            }
            src.set_position((start + i + 1) as u64);
            let line = &rest[..i];
            Ok(line.strip_suffix(b"\r").unwrap_or(line))
        }
        None if rest.len() > MAX_LINE_SIZE => Err(ProtocolError::LineTooLong(rest.len())),
        None => Err(ProtocolError::Incomplete),
    }
}
