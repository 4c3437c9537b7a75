use http::status::StatusCode;
use mime::Mime;

use std::option::Option;
use std::string::String;
use std::vec::Vec;


/// A typed payload fetched from storage or a remote source, before it is
/// wrapped into a sendable stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub content_type: Mime,
    pub data: Vec<u8>,
}

impl DataSource {
    pub fn new(content_type: Mime, data: Vec<u8>) -> DataSource {
        DataSource { content_type, data }
    }
}

/// A lazily-consumed response body. Produced by exactly one service handler,
/// consumed by exactly one response sender, then discarded.
pub trait DataStream: Send + std::fmt::Debug {
    fn http_status(&self) -> StatusCode;

    fn content_type(&self) -> Option<Mime>;

    fn length(&self) -> usize;

    /// Copies the next portion of the body into `buffer`, returning the
    /// number of bytes written. Returns 0 once the stream is exhausted.
    fn read(&mut self, buffer: &mut [u8]) -> usize;

    fn eof(&self) -> bool;
}

/// An eagerly-materialised text message, used for capability documents,
/// JSON status payloads and serialised exception reports.
#[derive(Debug)]
pub struct MessageDataStream {
    message: Vec<u8>,
    content_type: Mime,
    status: StatusCode,
    position: usize,
}

impl MessageDataStream {
    pub fn new(message: String, content_type: Mime, status: StatusCode) -> MessageDataStream {
        MessageDataStream {
            message: message.into_bytes(),
            content_type,
            status,
            position: 0,
        }
    }

    pub fn ok_json(message: String) -> MessageDataStream {
        Self::new(message, mime::APPLICATION_JSON, StatusCode::OK)
    }

    pub fn ok_xml(message: String) -> MessageDataStream {
        Self::new(message, mime::TEXT_XML, StatusCode::OK)
    }
}

impl DataStream for MessageDataStream {
    fn http_status(&self) -> StatusCode {
        self.status
    }

    fn content_type(&self) -> Option<Mime> {
        Some(self.content_type.clone())
    }

    fn length(&self) -> usize {
        self.message.len()
    }

    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let remaining = self.message.len() - self.position;
        let copied = std::cmp::min(remaining, buffer.len());
        buffer[..copied].copy_from_slice(&self.message[self.position..self.position + copied]);
        self.position += copied;
        return copied;
    }

    fn eof(&self) -> bool {
        self.position >= self.message.len()
    }
}

/// The explicit empty response: a status and nothing else.
#[derive(Debug)]
pub struct EmptyResponseDataStream;

impl DataStream for EmptyResponseDataStream {
    fn http_status(&self) -> StatusCode {
        StatusCode::NO_CONTENT
    }

    fn content_type(&self) -> Option<Mime> {
        return None;
    }

    fn length(&self) -> usize {
        0
    }

    fn read(&mut self, _buffer: &mut [u8]) -> usize {
        0
    }

    fn eof(&self) -> bool {
        true
    }
}

/// Wraps a fetched `DataSource` into a stream, e.g. a tile read from storage
/// or a cascaded feature-info document.
#[derive(Debug)]
pub struct SourceDataStream {
    source: DataSource,
    status: StatusCode,
    position: usize,
}

impl SourceDataStream {
    pub fn new(source: DataSource) -> SourceDataStream {
        SourceDataStream {
            source,
            status: StatusCode::OK,
            position: 0,
        }
    }
}

impl DataStream for SourceDataStream {
    fn http_status(&self) -> StatusCode {
        self.status
    }

    fn content_type(&self) -> Option<Mime> {
        Some(self.source.content_type.clone())
    }

    fn length(&self) -> usize {
        self.source.data.len()
    }

    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let remaining = self.source.data.len() - self.position;
        let copied = std::cmp::min(remaining, buffer.len());
        buffer[..copied].copy_from_slice(&self.source.data[self.position..self.position + copied]);
        self.position += copied;
        return copied;
    }

    fn eof(&self) -> bool {
        self.position >= self.source.data.len()
    }
}

/// Drains a stream into a byte vector. The stream is consumed.
pub fn drain(stream: &mut dyn DataStream) -> Vec<u8> {
    let mut body = Vec::with_capacity(stream.length());
    let mut buffer = [0u8; 4096];
    loop {
        let read = stream.read(&mut buffer);
        if read == 0 {
            break;
        }
        body.extend_from_slice(&buffer[..read]);
    }
    return body;
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;

    #[test]
    fn test_message_stream_reads_in_chunks() -> Result<(), Box<dyn Error>> {
        let mut stream = MessageDataStream::ok_json(String::from("0123456789"));
        let mut buffer = [0u8; 4];
        assert_eq!(4, stream.read(&mut buffer), "First chunk size incorrect");
        assert_eq!(b"0123", &buffer, "First chunk content incorrect");
        assert!(!stream.eof(), "Premature EOF");
        assert_eq!(4, stream.read(&mut buffer), "Second chunk size incorrect");
        assert_eq!(2, stream.read(&mut buffer), "Final chunk size incorrect");
        assert_eq!(b"89", &buffer[..2], "Final chunk content incorrect");
        assert_eq!(0, stream.read(&mut buffer), "Read past EOF returned data");
        assert!(stream.eof(), "EOF not reached");
        Ok(())
    }

    #[test]
    fn test_empty_response_has_no_body_and_no_type() -> Result<(), Box<dyn Error>> {
        let mut stream = EmptyResponseDataStream;
        assert_eq!(StatusCode::NO_CONTENT, stream.http_status(), "Wrong status");
        assert_eq!(None, stream.content_type(), "Empty response must carry no type");
        assert_eq!(0, stream.length(), "Empty response must carry no length");
        let mut buffer = [0u8; 8];
        assert_eq!(0, stream.read(&mut buffer), "Empty response produced bytes");
        assert!(stream.eof(), "Empty response is always at EOF");
        Ok(())
    }

    #[test]
    fn test_source_stream_preserves_payload_and_type() -> Result<(), Box<dyn Error>> {
        let source = DataSource::new(mime::IMAGE_PNG, vec![0x89, 0x50, 0x4e, 0x47]);
        let mut stream = SourceDataStream::new(source);
        assert_eq!(StatusCode::OK, stream.http_status(), "Wrong status");
        assert_eq!(Some(mime::IMAGE_PNG), stream.content_type(), "Wrong content type");
        assert_eq!(vec![0x89, 0x50, 0x4e, 0x47], drain(&mut stream), "Payload altered");
        Ok(())
    }
}
