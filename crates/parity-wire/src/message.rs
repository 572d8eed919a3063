//! OP_MSG framing.
//!
//! ```text
//! header   int32 messageLength | int32 requestID | int32 responseTo | int32 opCode (2013)
//! flags    uint32 flagBits
//! section  0x00 <BSON body>
//! section  0x01 int32 size | cstring identifier | BSON document*
//! checksum uint32 (only when flagBits bit 0 is set)
//! ```
//!
//! All integers are little-endian.

use std::io::{self, Read, Write};

use bson::{Bson, Document, RawDocumentBuf};

use crate::error::WireError;

pub const OP_MSG: i32 = 2013;
pub const HEADER_LEN: usize = 16;
pub const MAX_MESSAGE_SIZE: usize = 48 * 1024 * 1024;

const CHECKSUM_PRESENT: u32 = 1;
const MORE_TO_COME: u32 = 1 << 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub request_id: i32,
    pub response_to: i32,
    pub flags: u32,
    /// The kind-0 body section.
    pub body: Document,
    /// Kind-1 document sequences, `(identifier, documents)`.
    pub sequences: Vec<(String, Vec<Document>)>,
}

impl Message {
    pub fn new(request_id: i32, body: Document) -> Self {
        Self {
            request_id,
            response_to: 0,
            flags: 0,
            body,
            sequences: Vec::new(),
        }
    }

    /// Whether the sender expects no reply.
    pub fn more_to_come(&self) -> bool {
        self.flags & MORE_TO_COME != 0
    }

    /// The body with every document sequence folded in as an array field.
    pub fn into_command(self) -> Document {
        let mut body = self.body;
        for (identifier, docs) in self.sequences {
            body.insert(identifier, docs.into_iter().map(Bson::Document).collect::<Vec<_>>());
        }
        body
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let body = RawDocumentBuf::try_from(&self.body)?;

        let mut payload = Vec::with_capacity(body.as_bytes().len() + 5);
        // Checksums are never written.
        payload.extend_from_slice(&(self.flags & !CHECKSUM_PRESENT).to_le_bytes());
        payload.push(0);
        payload.extend_from_slice(body.as_bytes());

        for (identifier, docs) in &self.sequences {
            let mut section = Vec::new();
            section.extend_from_slice(identifier.as_bytes());
            section.push(0);
            for doc in docs {
                section.extend_from_slice(RawDocumentBuf::try_from(doc)?.as_bytes());
            }
            payload.push(1);
            payload.extend_from_slice(&length_prefix(section.len() + 4)?.to_le_bytes());
            payload.extend_from_slice(&section);
        }

        let total = HEADER_LEN + payload.len();
        if total > MAX_MESSAGE_SIZE {
            return Err(WireError::MessageTooLarge(total));
        }
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&length_prefix(total)?.to_le_bytes());
        out.extend_from_slice(&self.request_id.to_le_bytes());
        out.extend_from_slice(&self.response_to.to_le_bytes());
        out.extend_from_slice(&OP_MSG.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode everything after the 16-byte header.
    pub fn decode(request_id: i32, response_to: i32, payload: &[u8]) -> Result<Self, WireError> {
        let flags = u32::from_le_bytes(take::<4>(payload, 0)?);
        let end = if flags & CHECKSUM_PRESENT != 0 {
            payload
                .len()
                .checked_sub(4)
                .ok_or_else(|| WireError::Malformed("missing checksum".into()))?
        } else {
            payload.len()
        };

        let mut body = None;
        let mut sequences = Vec::new();
        let mut offset = 4;
        while offset < end {
            let kind = payload[offset];
            offset += 1;
            match kind {
                0 => {
                    let (doc, len) = read_document(&payload[..end], offset)?;
                    if body.replace(doc).is_some() {
                        return Err(WireError::Malformed("more than one body section".into()));
                    }
                    offset += len;
                }
                1 => {
                    let size = i32::from_le_bytes(take::<4>(&payload[..end], offset)?);
                    let size = usize::try_from(size)
                        .ok()
                        .filter(|s| *s >= 5 && offset + s <= end)
                        .ok_or(WireError::InvalidLength(i64::from(size)))?;
                    let section_end = offset + size;
                    let mut cursor = offset + 4;
                    let nul = payload[cursor..section_end]
                        .iter()
                        .position(|b| *b == 0)
                        .ok_or_else(|| WireError::Malformed("unterminated sequence identifier".into()))?;
                    let identifier = String::from_utf8(payload[cursor..cursor + nul].to_vec())
                        .map_err(|_| WireError::Malformed("sequence identifier is not UTF-8".into()))?;
                    cursor += nul + 1;
                    let mut docs = Vec::new();
                    while cursor < section_end {
                        let (doc, len) = read_document(&payload[..section_end], cursor)?;
                        docs.push(doc);
                        cursor += len;
                    }
                    sequences.push((identifier, docs));
                    offset = section_end;
                }
                other => {
                    return Err(WireError::Malformed(format!("unknown section kind {other}")));
                }
            }
        }

        let body = body.ok_or_else(|| WireError::Malformed("missing body section".into()))?;
        Ok(Self {
            request_id,
            response_to,
            flags,
            body,
            sequences,
        })
    }
}

fn length_prefix(len: usize) -> Result<i32, WireError> {
    i32::try_from(len).map_err(|_| WireError::MessageTooLarge(len))
}

fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], WireError> {
    buf.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| WireError::Malformed(format!("truncated at byte {offset}")))
}

fn read_document(buf: &[u8], offset: usize) -> Result<(Document, usize), WireError> {
    let len = i32::from_le_bytes(take::<4>(buf, offset)?);
    let len = usize::try_from(len)
        .ok()
        .filter(|n| *n >= 5 && offset + n <= buf.len())
        .ok_or(WireError::InvalidLength(i64::from(len)))?;
    let raw = RawDocumentBuf::from_bytes(buf[offset..offset + len].to_vec())?;
    let doc: Document = bson::deserialize_from_slice(raw.as_bytes())?;
    Ok((doc, len))
}

/// Read one message. Returns `Ok(None)` on a clean end of stream before
/// the header.
pub fn read_message(reader: &mut impl Read) -> Result<Option<Message>, WireError> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let request_id = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let response_to = i32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    let op_code = i32::from_le_bytes([header[12], header[13], header[14], header[15]]);

    let length = usize::try_from(length)
        .ok()
        .filter(|n| *n > HEADER_LEN + 4)
        .ok_or(WireError::InvalidLength(i64::from(length)))?;
    if length > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge(length));
    }
    if op_code != OP_MSG {
        return Err(WireError::UnsupportedOpCode(op_code));
    }

    let mut payload = vec![0u8; length - HEADER_LEN];
    reader.read_exact(&mut payload)?;
    Message::decode(request_id, response_to, &payload).map(Some)
}

pub fn write_message(writer: &mut impl Write, message: &Message) -> Result<(), WireError> {
    writer.write_all(&message.encode()?)?;
    writer.flush()?;
    Ok(())
}
