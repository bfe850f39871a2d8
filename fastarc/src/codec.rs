// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Length-prefixed transport encoding of ARC records.
//!
//! Layout (all integers big-endian):
//!
//! | field                   | encoding                       |
//! |-------------------------|--------------------------------|
//! | url                     | `u16` length + UTF-8 bytes     |
//! | ip address              | `u16` length + UTF-8 bytes     |
//! | content type            | `u16` length + UTF-8 bytes     |
//! | archive date            | `i64` milliseconds since epoch |
//! | declared content length | `i32`                          |
//! | payload                 | `i32` length + bytes           |

use std::io::{self, Read, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::DateTime;

use crate::error::{Error, Result};
use crate::record::{ArcHeader, ArcRecord, ARC_TRAILER_SLACK};


fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<usize> {
    let len = u16::try_from(value.len())
        .map_err(|_| Error::Codec(format!("string of {} bytes exceeds u16 length prefix", value.len())))?;
    writer.write_u16::<BigEndian>(len)?;
    writer.write_all(value.as_bytes())?;
    Ok(2 + value.len())
}

fn write_len<W: Write>(writer: &mut W, len: usize, what: &str) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| Error::Codec(format!("{what} of {len} exceeds i32 range")))?;
    writer.write_i32::<BigEndian>(len)?;
    Ok(())
}

/// Write a record in transport encoding.
///
/// Returns the number of bytes written.
pub fn encode_record<W: Write>(record: &ArcRecord, writer: &mut W) -> Result<usize> {
    let mut written = write_string(writer, record.url())?;
    written += write_string(writer, record.ip_address())?;
    written += write_string(writer, record.content_type())?;
    writer.write_i64::<BigEndian>(record.archive_date().timestamp_millis())?;
    write_len(writer, record.declared_content_length(), "declared content length")?;
    write_len(writer, record.payload().len(), "payload length")?;
    writer.write_all(record.payload())?;
    Ok(written + 8 + 4 + 4 + record.payload().len())
}

fn map_eof(err: io::Error, what: &str) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Codec(format!("input ended while reading {what}"))
    } else {
        Error::StreamFault(err)
    }
}

fn read_string<R: Read>(reader: &mut R, what: &str) -> Result<String> {
    let len = reader.read_u16::<BigEndian>().map_err(|e| map_eof(e, what))? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| map_eof(e, what))?;
    String::from_utf8(buf).map_err(|_| Error::Codec(format!("{what} is not valid UTF-8")))
}

fn read_len<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let len = reader.read_i32::<BigEndian>().map_err(|e| map_eof(e, what))?;
    usize::try_from(len).map_err(|_| Error::Codec(format!("negative {what}: {len}")))
}

/// Read a record in transport encoding.
///
/// A payload ending before its length prefix is satisfied fails with [`Error::ShortRead`].
pub fn decode_record<R: Read>(reader: &mut R) -> Result<ArcRecord> {
    let url = read_string(reader, "url")?;
    let ip_address = read_string(reader, "ip address")?;
    let content_type = read_string(reader, "content type")?;
    let millis = reader.read_i64::<BigEndian>().map_err(|e| map_eof(e, "archive date"))?;
    let archive_date = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Codec(format!("archive date {millis} out of range")))?;
    let content_length = read_len(reader, "declared content length")?;
    let payload_len = read_len(reader, "payload length")?;

    let mut payload = Vec::with_capacity(payload_len.min(1 << 20));
    reader.take(payload_len as u64).read_to_end(&mut payload)?;
    if payload.len() < payload_len {
        return Err(Error::ShortRead { expected: payload_len, found: payload.len() });
    }

    let header = ArcHeader { url, ip_address, archive_date, content_type, content_length };
    let mut record = ArcRecord::from_parts(header, payload);
    record.set_extended(payload_len > content_length.saturating_add(ARC_TRAILER_SLACK));
    Ok(record)
}

impl ArcRecord {
    /// Serialize into transport encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.payload().len() + self.url().len() + 64);
        encode_record(self, &mut buf)?;
        Ok(buf)
    }

    /// Deserialize from transport encoding.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        decode_record(&mut bytes)
    }
}
