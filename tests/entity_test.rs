use nethttp::base::neterror::NetError;
use nethttp::http::entity::{
    read_to_end, ByteEntity, HttpEntity, MultipartEntity, StringEntity, UrlEncodedEntity, XmlDomEntity,
    XmlElement,
};
use std::io::Write;

#[test]
fn test_string_entity_length_and_type() {
    let mut entity = StringEntity::new("hello world").unwrap();
    assert_eq!(entity.content_length(), 11);
    assert_eq!(entity.content_type(), "text/plain; charset=ISO-8859-1");
    assert_eq!(read_to_end(&mut entity, 4).unwrap(), b"hello world");
    assert!(!entity.has_next_data().unwrap());
    assert_eq!(entity.next_data(4), Err(NetError::InvalidState));
}

#[test]
fn test_string_entity_charset_limits() {
    assert!(StringEntity::with_type("caf\u{e9}", "text/plain", "ISO-8859-1").is_ok());
    assert_eq!(
        StringEntity::with_type("caf\u{e9}", "text/plain", "US-ASCII").err(),
        Some(NetError::InvalidArgument)
    );
    assert_eq!(
        StringEntity::with_type("x", "text/plain", "KOI8-R").err(),
        Some(NetError::InvalidArgument)
    );
}

#[test]
fn test_url_encoded_entity() {
    let mut entity = UrlEncodedEntity::new();
    entity.add_parameter("q", "rust lang").unwrap();
    entity.add_parameter("page", "2&3").unwrap();
    assert_eq!(entity.content_type(), "application/x-www-form-urlencoded");

    let body = read_to_end(&mut entity, 3).unwrap();
    assert_eq!(body, b"q=rust+lang&page=2%263");
    assert_eq!(entity.add_parameter("late", "x"), Err(NetError::InvalidState));
}

#[test]
fn test_multipart_with_file_part() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"file contents").unwrap();

    let mut entity = MultipartEntity::with_boundary("XyZ").unwrap();
    entity.add_string_part("title", "report").unwrap();
    entity
        .add_file_part("upload", file.path().to_str().unwrap())
        .unwrap();
    assert_eq!(entity.content_type(), "multipart/form-data; boundary=XyZ");

    let declared = entity.content_length();
    let body = String::from_utf8(read_to_end(&mut entity, 5).unwrap()).unwrap();
    assert_eq!(body.len() as i64, declared);
    assert!(body.starts_with("--XyZ\r\nContent-Disposition: form-data; name=\"title\""));
    assert!(body.contains("\r\n\r\nreport\r\n"));
    assert!(body.contains("Content-Type: application/octet-stream"));
    assert!(body.contains("file contents"));
    assert!(body.ends_with("--XyZ--\r\n"));
}

#[test]
fn test_multipart_missing_file() {
    let mut entity = MultipartEntity::new();
    assert!(entity
        .add_file_part("upload", "/definitely/not/here.bin")
        .is_err());
}

#[test]
fn test_xml_entity() {
    let root = XmlElement::new("note").child(XmlElement::new("to").text("Tove"));
    let mut entity = XmlDomEntity::new(&root).unwrap();
    let body = String::from_utf8(read_to_end(&mut entity, 16).unwrap()).unwrap();
    assert!(body.ends_with("<note><to>Tove</to></note>"));
}

#[test]
fn test_byte_entity_as_trait_object() {
    let mut boxed: Box<dyn HttpEntity> = Box::new(ByteEntity::new(&b"\x00\x01\x02"[..], "application/octet-stream"));
    assert_eq!(boxed.content_length(), 3);
    assert_eq!(read_to_end(boxed.as_mut(), 1).unwrap(), vec![0, 1, 2]);
}
