use crate::schema::request::Request;
use crate::schema::response::DataStream;

use http::method::Method;
use thiserror::Error;

use std::io::{BufRead, Read, Write};
use std::option::Option;
use std::result::Result;
use std::string::String;


const MAX_BODY_LEN: usize = 8 << 20;

#[derive(Debug, Error)]
pub enum HttpReadError {
    #[error("IO error while reading the request")]
    Io(#[from] std::io::Error),
    #[error("Malformed request line: {0}")]
    BadRequestLine(String),
    #[error("Unsupported HTTP method: {0}")]
    BadMethod(String),
    #[error("Malformed header line: {0}")]
    BadHeader(String),
    #[error("Request body exceeds the accepted size")]
    BodyTooLarge,
}

/// Reads one HTTP/1.1 request from the connection and decodes it into a
/// `Request`. Headers other than Content-Length are ignored; the dispatch
/// engine works from the request line and body alone.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Request, HttpReadError> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| HttpReadError::BadRequestLine(request_line.trim().to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| HttpReadError::BadRequestLine(request_line.trim().to_string()))?
        .to_string();
    if parts.next().is_none() {
        return Err(HttpReadError::BadRequestLine(request_line.trim().to_string()));
    }
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| HttpReadError::BadMethod(method.to_string()))?;

    let mut content_length: usize = 0;
    loop {
        let mut header_line = String::new();
        reader.read_line(&mut header_line)?;
        let header_line = header_line.trim_end();
        if header_line.is_empty() {
            break;
        }
        let (name, value) = match header_line.find(':') {
            Some(index) => (&header_line[..index], header_line[index + 1..].trim()),
            None => return Err(HttpReadError::BadHeader(header_line.to_string())),
        };
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse::<usize>()
                .map_err(|_| HttpReadError::BadHeader(header_line.to_string()))?;
        }
    }
    if content_length > MAX_BODY_LEN {
        return Err(HttpReadError::BodyTooLarge);
    }

    let body = if content_length > 0 {
        let mut buffer = vec![0u8; content_length];
        reader.read_exact(&mut buffer)?;
        Some(String::from_utf8_lossy(&buffer).into_owned())
    } else {
        None
    };
    return Ok(Request::new(method, &target, body));
}

/// Copies a response stream onto the connection: status line, the headers
/// the stream mandates, then the body. The stream is consumed.
pub fn write_response<W: Write>(
    writer: &mut W,
    stream: &mut dyn DataStream,
) -> Result<usize, std::io::Error> {
    let status = stream.http_status();
    write!(
        writer,
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("No Reason"),
    )?;
    let content_type = stream.content_type();
    if let Some(content_type) = &content_type {
        write!(writer, "Content-Type: {}\r\n", content_type)?;
        write!(
            writer,
            "Content-Disposition: filename=\"{}\"\r\n",
            default_filename(content_type.essence_str()),
        )?;
    }
    write!(writer, "Content-Length: {}\r\n", stream.length())?;
    write!(writer, "Connection: close\r\n\r\n")?;

    let mut written = 0;
    let mut buffer = [0u8; 1 << 16];
    loop {
        let read = stream.read(&mut buffer);
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read])?;
        written += read;
    }
    writer.flush()?;
    return Ok(written);
}

/// Default download name per content type, kept for parity with the usual
/// OGC front ends.
pub fn default_filename(essence: &str) -> &'static str {
    match essence {
        "image/tiff" | "image/geotiff" => "image.tif",
        "image/jpeg" => "image.jpg",
        "image/png" => "image.png",
        "text/plain" => "message.txt",
        "text/xml" => "message.xml",
        "application/xml" => "file.xml",
        "application/json" => "file.json",
        "application/x-protobuf" => "file.pbf",
        _ => "file",
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::request::{RequestType, ServiceType};
    use crate::schema::response::MessageDataStream;

    use std::error::Error;
    use std::io::Cursor;

    #[test]
    fn test_read_get_request_with_query() -> Result<(), Box<dyn Error>> {
        let raw = b"GET /wms?SERVICE=WMS&REQUEST=GetCapabilities HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let mut reader = Cursor::new(raw.to_vec());
        let request = read_request(&mut reader)?;
        assert_eq!(Method::GET, request.method, "Wrong method");
        assert_eq!("/wms", request.path, "Wrong path");
        assert_eq!(Some("WMS"), request.get_query_param("service"), "Query lost");
        assert_eq!(ServiceType::Missing, request.service_type, "Routing must not happen here");
        assert_eq!(RequestType::Missing, request.request_type, "Routing must not happen here");
        Ok(())
    }

    #[test]
    fn test_read_post_request_with_body() -> Result<(), Box<dyn Error>> {
        let body = "{\"title\": \"Roads\"}";
        let raw = format!(
            "POST /admin/layers/roads HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body,
        );
        let mut reader = Cursor::new(raw.into_bytes());
        let request = read_request(&mut reader)?;
        assert_eq!(Method::POST, request.method, "Wrong method");
        assert_eq!(Some(String::from(body)), request.body, "Body lost");
        Ok(())
    }

    #[test]
    fn test_malformed_request_line_is_rejected() -> Result<(), Box<dyn Error>> {
        let mut reader = Cursor::new(b"NONSENSE\r\n\r\n".to_vec());
        assert!(read_request(&mut reader).is_err(), "Malformed request line accepted");
        Ok(())
    }

    #[test]
    fn test_write_response_emits_headers_and_body() -> Result<(), Box<dyn Error>> {
        let mut stream = MessageDataStream::ok_json(String::from("{\"answer\": 42}"));
        let mut sink = Vec::new();
        let written = write_response(&mut sink, &mut stream)?;
        let text = String::from_utf8(sink)?;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "Wrong status line");
        assert!(text.contains("Content-Type: application/json"), "Missing content type");
        assert!(text.contains("Content-Length: 14"), "Missing content length");
        assert!(text.contains("filename=\"file.json\""), "Missing disposition");
        assert!(text.ends_with("{\"answer\": 42}"), "Missing body");
        assert_eq!(14, written, "Wrong written byte count");
        Ok(())
    }

    #[test]
    fn test_write_empty_response_has_no_type_header() -> Result<(), Box<dyn Error>> {
        let mut stream = crate::schema::response::EmptyResponseDataStream;
        let mut sink = Vec::new();
        write_response(&mut sink, &mut stream)?;
        let text = String::from_utf8(sink)?;
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"), "Wrong status line");
        assert!(!text.contains("Content-Type"), "Empty response must carry no type");
        assert!(text.contains("Content-Length: 0"), "Missing zero content length");
        Ok(())
    }
}
