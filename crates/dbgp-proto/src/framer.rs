//! DBGP transport framing.
//!
//! The engine writes `<length>\0<xml-document>\0` records. The IDE answers
//! with a single command line terminated by one NUL byte.

use crate::error::FramingError;

/// Default upper bound for a single inbound packet (16 MiB).
pub const DEFAULT_MAX_PACKET_LEN: usize = 16 * 1024 * 1024;

/// Longest accepted length field; enough digits for any `usize`.
const MAX_LENGTH_DIGITS: usize = 20;

/// Frame an XML document the way the engine puts it on the wire.
pub fn frame_packet(xml: &str) -> Vec<u8> {
    let header = xml.len().to_string();
    let mut buf = Vec::with_capacity(header.len() + xml.len() + 2);
    buf.extend_from_slice(header.as_bytes());
    buf.push(0);
    buf.extend_from_slice(xml.as_bytes());
    buf.push(0);
    buf
}

/// Terminate an outbound command line with its NUL byte.
pub fn encode_command(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    buf
}

/// Incremental splitter for the engine's length-prefixed packet stream.
///
/// Each session owns its own framer; partial records stay buffered until
/// the rest of the record arrives, so the produced packets do not depend
/// on how the stream was chunked.
#[derive(Debug)]
pub struct PacketFramer {
    buffer: Vec<u8>,
    max_packet_len: usize,
}

impl PacketFramer {
    /// Create a framer with [`DEFAULT_MAX_PACKET_LEN`].
    pub fn new() -> Self {
        Self::with_max_packet_len(DEFAULT_MAX_PACKET_LEN)
    }

    /// Create a framer that rejects packets longer than `max_packet_len`.
    pub fn with_max_packet_len(max_packet_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_packet_len,
        }
    }

    /// Number of bytes waiting for the rest of their record.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append `chunk` and return every record it completes, in order.
    ///
    /// An error ends the batch and discards whatever was buffered;
    /// records completed before the faulty one are still returned.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String, FramingError>> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        loop {
            match self.next_record() {
                Ok(Some(packet)) => out.push(Ok(packet)),
                Ok(None) => break,
                Err(e) => {
                    self.buffer.clear();
                    out.push(Err(e));
                    break;
                }
            }
        }
        out
    }

    /// Extract one complete record from the front of the buffer.
    fn next_record(&mut self) -> Result<Option<String>, FramingError> {
        let Some(len_end) = self.buffer.iter().position(|&b| b == 0) else {
            // Still reading the length field.
            if self.buffer.len() > MAX_LENGTH_DIGITS
                || !self.buffer.iter().all(u8::is_ascii_digit)
            {
                return Err(FramingError::InvalidLength(
                    String::from_utf8_lossy(&self.buffer).into_owned(),
                ));
            }
            return Ok(None);
        };

        let announced = parse_length(&self.buffer[..len_end])?;
        if announced > self.max_packet_len {
            return Err(FramingError::TooLarge {
                announced,
                limit: self.max_packet_len,
            });
        }

        let data_start = len_end + 1;
        let data_end = data_start + announced;
        let available_end = self.buffer.len().min(data_end);

        // XML never contains NUL, so one inside the announced region means
        // the record is shorter than its length field claims.
        if let Some(actual) = self.buffer[data_start..available_end]
            .iter()
            .position(|&b| b == 0)
        {
            return Err(FramingError::LengthMismatch { announced, actual });
        }

        if self.buffer.len() <= data_end {
            return Ok(None);
        }
        if self.buffer[data_end] != 0 {
            return Err(FramingError::MissingTerminator { announced });
        }

        let data: Vec<u8> = self.buffer.drain(..=data_end).collect();
        let text = std::str::from_utf8(&data[data_start..data_end])
            .map_err(|_| FramingError::Encoding)?;

        if !is_xml_document(text) {
            return Err(FramingError::NotXml);
        }
        Ok(Some(text.to_string()))
    }
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_length(field: &[u8]) -> Result<usize, FramingError> {
    let invalid = || FramingError::InvalidLength(String::from_utf8_lossy(field).into_owned());
    if field.is_empty() || field.len() > MAX_LENGTH_DIGITS || !field.iter().all(u8::is_ascii_digit)
    {
        return Err(invalid());
    }
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(invalid)
}

/// True when the first non-whitespace content is an XML declaration.
fn is_xml_document(text: &str) -> bool {
    text.trim_start()
        .strip_prefix("<?xml")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '?'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: &str = r#"<?xml version="1.0" encoding="iso-8859-1"?>
<init xmlns="urn:debugger_protocol_v1" language="PHP" idekey="xdebug" protocol_version="1.0"/>"#;
    const RESPONSE: &str = r#"<?xml version="1.0" encoding="iso-8859-1"?>
<response xmlns="urn:debugger_protocol_v1" command="run" transaction_id="t-1" status="break" reason="ok"/>"#;

    fn ok_packets(results: Vec<Result<String, FramingError>>) -> Vec<String> {
        results
            .into_iter()
            .map(|r| r.expect("unexpected framing error"))
            .collect()
    }

    #[test]
    fn frame_packet_prefixes_byte_length() {
        let framed = frame_packet("<?xml?><a/>");
        assert_eq!(framed, b"11\0<?xml?><a/>\0".to_vec());
    }

    #[test]
    fn encode_command_appends_single_nul() {
        assert_eq!(encode_command("run -i t-1"), b"run -i t-1\0".to_vec());
    }

    #[test]
    fn framer_single_complete_record() {
        let mut framer = PacketFramer::new();
        let packets = ok_packets(framer.feed(&frame_packet(INIT)));
        assert_eq!(packets, vec![INIT.to_string()]);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn framer_record_split_in_two_pieces() {
        let mut framer = PacketFramer::new();
        assert!(framer.feed(b"11\0<?xml?").is_empty());
        let packets = ok_packets(framer.feed(b"></a>\0"));
        assert_eq!(packets, vec!["<?xml?></a>".to_string()]);
    }

    #[test]
    fn framer_split_right_after_length_field() {
        let mut framer = PacketFramer::new();
        assert!(framer.feed(b"11\0").is_empty());
        let packets = ok_packets(framer.feed(b"<?xml?></a>\0"));
        assert_eq!(packets, vec!["<?xml?></a>".to_string()]);
    }

    #[test]
    fn framer_multiple_records_in_one_chunk() {
        let mut stream = frame_packet(INIT);
        stream.extend_from_slice(&frame_packet(RESPONSE));

        let mut framer = PacketFramer::new();
        let packets = ok_packets(framer.feed(&stream));
        assert_eq!(packets, vec![INIT.to_string(), RESPONSE.to_string()]);
    }

    #[test]
    fn framer_output_independent_of_split_point() {
        let mut stream = frame_packet(INIT);
        stream.extend_from_slice(&frame_packet(RESPONSE));

        let expected = vec![INIT.to_string(), RESPONSE.to_string()];
        for split in 0..=stream.len() {
            let mut framer = PacketFramer::new();
            let mut packets = ok_packets(framer.feed(&stream[..split]));
            packets.extend(ok_packets(framer.feed(&stream[split..])));
            assert_eq!(packets, expected, "split at byte {split}");
        }
    }

    #[test]
    fn framer_byte_at_a_time() {
        let stream = frame_packet(RESPONSE);
        let mut framer = PacketFramer::new();
        let mut packets = Vec::new();
        for byte in &stream {
            packets.extend(ok_packets(framer.feed(std::slice::from_ref(byte))));
        }
        assert_eq!(packets, vec![RESPONSE.to_string()]);
    }

    #[test]
    fn framer_length_counts_bytes_not_chars() {
        let xml = "<?xml version=\"1.0\"?><a>\u{e9}\u{e9}</a>";
        let mut framer = PacketFramer::new();
        let packets = ok_packets(framer.feed(&frame_packet(xml)));
        assert_eq!(packets, vec![xml.to_string()]);
    }

    #[test]
    fn framer_short_data_is_length_mismatch() {
        let mut framer = PacketFramer::new();
        let results = framer.feed(b"13\0<?xml?></a>\0");
        assert_eq!(
            results,
            vec![Err(FramingError::LengthMismatch {
                announced: 13,
                actual: 11
            })]
        );
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn framer_long_data_is_missing_terminator() {
        let mut framer = PacketFramer::new();
        let results = framer.feed(b"5\0<?xml?></a>\0");
        assert_eq!(
            results,
            vec![Err(FramingError::MissingTerminator { announced: 5 })]
        );
    }

    #[test]
    fn framer_rejects_non_xml_payload() {
        let mut framer = PacketFramer::new();
        let results = framer.feed(b"5\0hello\0");
        assert_eq!(results, vec![Err(FramingError::NotXml)]);
    }

    #[test]
    fn framer_accepts_leading_whitespace_before_declaration() {
        let xml = "\n  <?xml version=\"1.0\"?><a/>";
        let mut framer = PacketFramer::new();
        assert_eq!(ok_packets(framer.feed(&frame_packet(xml))), vec![xml.to_string()]);
    }

    #[test]
    fn framer_rejects_invalid_length_field() {
        let mut framer = PacketFramer::new();
        let results = framer.feed(b"abc\0<?xml?>\0");
        assert!(matches!(results[..], [Err(FramingError::InvalidLength(_))]));

        let mut framer = PacketFramer::new();
        let results = framer.feed(b"\0<?xml?>\0");
        assert!(matches!(results[..], [Err(FramingError::InvalidLength(_))]));
    }

    #[test]
    fn framer_rejects_garbage_before_terminator_arrives() {
        let mut framer = PacketFramer::new();
        let results = framer.feed(b"12x");
        assert!(matches!(results[..], [Err(FramingError::InvalidLength(_))]));
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn framer_enforces_packet_limit() {
        let mut framer = PacketFramer::with_max_packet_len(8);
        let results = framer.feed(&frame_packet("<?xml?><a/>"));
        assert_eq!(
            results,
            vec![Err(FramingError::TooLarge {
                announced: 11,
                limit: 8
            })]
        );
    }

    #[test]
    fn framer_recovers_after_error() {
        let mut framer = PacketFramer::new();
        let results = framer.feed(b"13\0<?xml?></a>\0");
        assert!(results[0].is_err());

        let packets = ok_packets(framer.feed(&frame_packet(INIT)));
        assert_eq!(packets, vec![INIT.to_string()]);
    }

    #[test]
    fn framer_keeps_records_before_the_faulty_one() {
        let mut stream = frame_packet(INIT);
        stream.extend_from_slice(b"4\0nope\0");
        stream.extend_from_slice(&frame_packet(RESPONSE));

        let mut framer = PacketFramer::new();
        let results = framer.feed(&stream);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Ok(INIT.to_string()));
        assert_eq!(results[1], Err(FramingError::NotXml));
        assert_eq!(framer.buffered_len(), 0);
    }
}
