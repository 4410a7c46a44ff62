use nethttp::base::neterror::NetError;
use nethttp::http::HttpHeader;

#[test]
fn test_insertion_order_preserved() {
    let mut h = HttpHeader::new();
    h.add_field("Accept", "text/html").unwrap();
    h.add_field("X-Trace", "1").unwrap();
    h.add_field("Accept", "application/json").unwrap();

    assert_eq!(h.field_names(), vec!["Accept", "X-Trace"]);
    assert_eq!(
        h.field_values("Accept").unwrap(),
        vec!["text/html", "application/json"]
    );
    assert_eq!(h.len(), 3);
}

#[test]
fn test_duplicate_pair_rejected() {
    let mut h = HttpHeader::new();
    h.add_field("Accept", "text/html").unwrap();
    assert_eq!(h.add_field("Accept", "text/html"), Err(NetError::AlreadyExists));
    assert_eq!(h.len(), 1);
}

#[test]
fn test_names_are_case_sensitive() {
    let mut h = HttpHeader::new();
    h.add_field("Accept", "a").unwrap();
    h.add_field("accept", "a").unwrap();
    assert_eq!(h.field_names().len(), 2);
    assert!(h.contains_ignore_case("ACCEPT"));
}

#[test]
fn test_raw_header_parses_back() {
    let mut h = HttpHeader::new();
    h.add_field("Host", "example.com").unwrap();
    h.add_field("Accept", "*/*").unwrap();
    h.add_field("Accept", "text/plain").unwrap();

    let raw = h.raw_header().unwrap();
    assert_eq!(
        raw,
        "Host: example.com\r\nAccept: */*\r\nAccept: text/plain\r\n"
    );
    assert_eq!(HttpHeader::parse(&raw).unwrap(), h);
}

#[test]
fn test_raw_header_of_empty_store() {
    assert_eq!(HttpHeader::new().raw_header(), Err(NetError::InvalidHeader));
}

#[test]
fn test_remove_missing() {
    let mut h = HttpHeader::new();
    assert_eq!(h.remove_field("X-Missing"), Err(NetError::NotFound));
    h.add_field("X-A", "1").unwrap();
    assert_eq!(h.remove_field_value("X-A", "2"), Err(NetError::NotFound));
    h.remove_field_value("X-A", "1").unwrap();
    assert!(h.is_empty());
}

#[test]
fn test_invalid_name_and_value() {
    let mut h = HttpHeader::new();
    assert_eq!(h.add_field("Bad Name", "v"), Err(NetError::InvalidArgument));
    assert_eq!(h.add_field("X-A", "line\r\nbreak"), Err(NetError::InvalidArgument));
    assert_eq!(h.field_values("X-A"), Err(NetError::NotFound));
}

#[test]
fn test_surrounding_whitespace_rejected_so_raw_form_parses_back() {
    let mut h = HttpHeader::new();
    assert_eq!(h.add_field("X-A", " padded"), Err(NetError::InvalidArgument));
    assert_eq!(h.add_field("X-A", "padded "), Err(NetError::InvalidArgument));

    h.add_field("X-A", "padded").unwrap();
    h.add_field("X-B", "inner  space").unwrap();
    let back = HttpHeader::parse(&h.raw_header().unwrap()).unwrap();
    assert_eq!(back, h);
    assert_eq!(back.field_values("X-B").unwrap(), vec!["inner  space"]);
}
