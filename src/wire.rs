//! The remote wire protocol.
//!
//! Records travel between the remote publisher handler and the remote
//! receiver as multipart messages over TCP. A message is a frame count
//! followed by length-prefixed frames:
//!
//! * Record: frame 1 is the ASCII topic `level/<N>/` with `N` the numeric
//!   level; frame 2 is the packed, native-byte-order header; frames 3..6
//!   are file, function, logger name and message, each NUL-terminated with
//!   lengths matching the header.
//! * Exit: frame 1 is `.ctrl/exit`, frame 2 the program name.
//! * Config query: frame 1 is `URLs?`; the reply is a single frame holding
//!   a JSON list of the URLs the publisher is bound to.
//!
//! Malformed input is reported as a `Protocol` error and never panics.

use crate::{
    error::{oe_proto_err, proto_err, Result, ResultExt},
    level::Level,
    record::Record,
};
use std::{
    convert::TryInto,
    io::{Read, Write},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Topic prefix of record messages.
pub const RECORD_TOPIC_PREFIX: &str = "level/";
/// Topic of the exit control message.
pub const EXIT_TOPIC: &str = ".ctrl/exit";
/// Config query: ask a publisher for its bound URLs.
pub const URLS_QUERY: &str = "URLs?";
/// Handshake frame a subscriber sends right after connecting.
pub const SUBSCRIBE_HELLO: &str = "sub";

/// Packed header length in bytes.
pub const HEADER_LEN: usize = 46;

const MAX_FRAMES: u8 = 8;
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Strips the `tcp://` scheme off a URL, yielding the `host:port`
/// authority.
pub fn tcp_authority(url: &str) -> Result<&str> {
    match url.strip_prefix("tcp://") {
        Some(authority) if !authority.is_empty() => Ok(authority),
        _ => crate::error::bad_cfg(format!("unsupported URL '{}', expected tcp://host:port", url)),
    }
}

/// Writes one multipart message.
pub fn write_frames(writer: &mut impl Write, frames: &[&[u8]]) -> Result<()> {
    debug_assert!(frames.len() <= MAX_FRAMES as usize);
    writer.write_all(&[frames.len() as u8])?;
    for frame in frames {
        writer.write_all(&(frame.len() as u32).to_ne_bytes())?;
        writer.write_all(frame)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads one multipart message. `Ok(None)` signals a clean end of stream
/// (the peer closed between messages).
pub fn read_frames(reader: &mut impl Read) -> Result<Option<Vec<Vec<u8>>>> {
    let mut count = [0u8; 1];
    match reader.read_exact(&mut count) {
        Ok(()) => {}
        Err(ref error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error.into()),
    }
    read_frames_after_count(reader, count[0]).map(Some)
}

/// Reads the body of a multipart message whose frame count byte has
/// already been consumed.
pub fn read_frames_after_count(reader: &mut impl Read, count: u8) -> Result<Vec<Vec<u8>>> {
    if count == 0 || count > MAX_FRAMES {
        return proto_err(format!("unreasonable frame count {}", count));
    }
    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut len = [0u8; 4];
        reader.read_exact(&mut len)?;
        let len = u32::from_ne_bytes(len);
        if len > MAX_FRAME_LEN {
            return proto_err(format!("unreasonable frame length {}", len));
        }
        let mut frame = vec![0u8; len as usize];
        reader.read_exact(&mut frame)?;
        frames.push(frame);
    }
    Ok(frames)
}

fn pack_header(record: &Record) -> Vec<u8> {
    let since_epoch = record
        .timestamp()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&(record.level() as u32).to_ne_bytes());
    header.extend_from_slice(&(since_epoch.as_secs() as i64).to_ne_bytes());
    header.extend_from_slice(&since_epoch.subsec_nanos().to_ne_bytes());
    header.extend_from_slice(&record.pid().to_ne_bytes());
    header.extend_from_slice(&record.tid().to_ne_bytes());
    header.extend_from_slice(&record.thread_rank().to_ne_bytes());
    header.extend_from_slice(&record.line().to_ne_bytes());
    // Lengths include the trailing NUL.
    header.extend_from_slice(&(record.file().len() as u32 + 1).to_ne_bytes());
    header.extend_from_slice(&(record.func().len() as u32 + 1).to_ne_bytes());
    header.extend_from_slice(&(record.logger().len() as u32 + 1).to_ne_bytes());
    header.extend_from_slice(&(record.payload().len() as u32 + 1).to_ne_bytes());
    header
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() + 1);
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    bytes
}

/// Encodes a record into its wire frames.
pub fn encode_record(record: &Record) -> Vec<Vec<u8>> {
    vec![
        format!("{}{}/", RECORD_TOPIC_PREFIX, record.level() as u32).into_bytes(),
        pack_header(record),
        nul_terminated(record.file()),
        nul_terminated(record.func()),
        nul_terminated(record.logger()),
        nul_terminated(record.payload()),
    ]
}

/// Encodes the exit control message.
pub fn encode_exit(progname: &str) -> Vec<Vec<u8>> {
    vec![
        EXIT_TOPIC.as_bytes().to_vec(),
        progname.as_bytes().to_vec(),
    ]
}

fn unpack_str(frame: &[u8], expected_len: u32, what: &str) -> Result<String> {
    if frame.len() as u32 != expected_len {
        return proto_err(format!(
            "{} frame is {} bytes, header says {}",
            what,
            frame.len(),
            expected_len
        ));
    }
    match frame.split_last() {
        Some((0, body)) => Ok(std::str::from_utf8(body)?.to_string()),
        _ => proto_err(format!("{} frame is not NUL-terminated", what)),
    }
}

fn read_u32(header: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(header[offset..offset + 4].try_into().unwrap())
}

/// Decodes the frames of a record message (topic included).
pub fn decode_record(frames: &[Vec<u8>]) -> Result<Record> {
    if frames.len() != 6 {
        return proto_err(format!("record message has {} frames, expected 6", frames.len()));
    }
    let topic = std::str::from_utf8(&frames[0])?;
    if !topic.starts_with(RECORD_TOPIC_PREFIX) {
        return proto_err(format!("unexpected topic '{}'", topic));
    }
    let header = &frames[1];
    if header.len() != HEADER_LEN {
        return proto_err(format!(
            "record header is {} bytes, expected {}",
            header.len(),
            HEADER_LEN
        ));
    }

    let level = Level::from_int(u64::from(read_u32(header, 0)))
        .context(crate::error::ErrorKind::Protocol(
            "record header carries an invalid level".to_string(),
        ))?;
    let sec = i64::from_ne_bytes(header[4..12].try_into().unwrap());
    let nsec = read_u32(header, 12);
    let pid = read_u32(header, 16);
    let tid = read_u32(header, 20);
    let rank = u16::from_ne_bytes(header[24..26].try_into().unwrap());
    let line = read_u32(header, 26);
    let file_len = read_u32(header, 30);
    let func_len = read_u32(header, 34);
    let logger_len = read_u32(header, 38);
    let msg_len = read_u32(header, 42);

    let topic_level: u64 = topic
        .get(RECORD_TOPIC_PREFIX.len()..)
        .and_then(|rest| rest.strip_suffix('/'))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(oe_proto_err(format!("malformed topic '{}'", topic)))?;
    if topic_level != level as u64 {
        return proto_err(format!(
            "topic level {} does not match header level {}",
            topic_level, level as u64
        ));
    }

    let timestamp = UNIX_EPOCH + Duration::new(sec.max(0) as u64, nsec);
    Ok(Record::new(
        unpack_str(&frames[4], logger_len, "logger name")?,
        unpack_str(&frames[5], msg_len, "message")?,
        level,
        timestamp,
        pid,
        tid,
        rank,
        unpack_str(&frames[2], file_len, "file name")?,
        unpack_str(&frames[3], func_len, "function name")?,
        line,
    ))
}

/// Encodes the reply to a `URLs?` query.
pub fn encode_urls_reply(urls: &[String]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(urls)?)
}

/// Decodes the reply to a `URLs?` query.
pub fn decode_urls_reply(frame: &[u8]) -> Result<Vec<String>> {
    Ok(serde_json::from_slice(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Record {
        Record::new(
            "net.tls",
            "handshake done",
            Level::Debug,
            UNIX_EPOCH + Duration::new(1_600_000_000, 123_456_789),
            42,
            43,
            7,
            "tls.rs",
            "net::tls",
            321,
        )
    }

    #[test]
    fn frames_round_trip_over_a_stream() {
        let mut buffer = vec![];
        let frames = encode_record(&sample());
        let borrowed: Vec<&[u8]> = frames.iter().map(|f| f.as_slice()).collect();
        write_frames(&mut buffer, &borrowed).unwrap();

        let mut cursor = Cursor::new(buffer);
        let read = read_frames(&mut cursor).unwrap().unwrap();
        assert_eq!(read, frames);
        assert!(read_frames(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn record_round_trip() {
        let record = sample();
        let decoded = decode_record(&encode_record(&record)).unwrap();
        assert_eq!(decoded.logger(), "net.tls");
        assert_eq!(decoded.payload(), "handshake done");
        assert_eq!(decoded.level(), Level::Debug);
        assert_eq!(decoded.timestamp(), record.timestamp());
        assert_eq!(decoded.pid(), 42);
        assert_eq!(decoded.tid(), 43);
        assert_eq!(decoded.thread_rank(), 7);
        assert_eq!(decoded.file(), "tls.rs");
        assert_eq!(decoded.func(), "net::tls");
        assert_eq!(decoded.line(), 321);
    }

    #[test]
    fn topic_carries_numeric_level() {
        let frames = encode_record(&sample());
        assert_eq!(frames[0], b"level/8/".to_vec());
    }

    #[test]
    fn header_and_payload_lengths_include_nul() {
        let frames = encode_record(&sample());
        // "handshake done" is 14 bytes + NUL.
        assert_eq!(frames[5].len(), 15);
        assert_eq!(*frames[5].last().unwrap(), 0);
    }

    #[test]
    fn tampered_messages_are_protocol_errors() {
        let mut frames = encode_record(&sample());
        frames[5].pop();
        assert!(decode_record(&frames).is_err());

        let mut frames = encode_record(&sample());
        frames[1][0] = 99;
        assert!(decode_record(&frames).is_err());

        let frames = vec![b"level/8/".to_vec()];
        assert!(decode_record(&frames).is_err());
    }

    #[test]
    fn exit_message_shape() {
        let frames = encode_exit("prog");
        assert_eq!(frames[0], EXIT_TOPIC.as_bytes().to_vec());
        assert_eq!(frames[1], b"prog".to_vec());
    }

    #[test]
    fn urls_reply_round_trip() {
        let urls = vec!["tcp://127.0.0.1:9000".to_string()];
        let reply = encode_urls_reply(&urls).unwrap();
        assert_eq!(decode_urls_reply(&reply).unwrap(), urls);
    }

    #[test]
    fn authority_parsing() {
        assert_eq!(tcp_authority("tcp://127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert!(tcp_authority("ipc:///tmp/x").is_err());
        assert!(tcp_authority("tcp://").is_err());
    }
}
