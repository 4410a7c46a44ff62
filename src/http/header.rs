//! Ordered multimap of HTTP header fields.
//!
//! Field names keep the casing they were added with and are compared
//! case-sensitively by the public operations, so `Accept` and `accept`
//! are distinct entries. Names are kept in first-insertion order and each
//! name holds its values in insertion order. The engine itself looks
//! fields up case-insensitively through the `*_ignore_case` helpers.

use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeader {
    fields: Vec<(String, Vec<String>)>,
}

impl HttpHeader {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Adds a `name: value` pair.
    ///
    /// Fails with `InvalidArgument` if the name is not a valid token or the
    /// value contains control characters or starts or ends with whitespace,
    /// and with `AlreadyExists` if the exact pair is already present.
    pub fn add_field(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        validate_name(name)?;
        validate_value(value)?;

        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => {
                if values.iter().any(|v| v == value) {
                    return Err(NetError::AlreadyExists);
                }
                values.push(value.to_string());
            }
            None => self
                .fields
                .push((name.to_string(), vec![value.to_string()])),
        }
        Ok(())
    }

    /// Removes every value stored under `name`.
    pub fn remove_field(&mut self, name: &str) -> Result<(), NetError> {
        validate_name(name)?;
        let before = self.fields.len();
        self.fields.retain(|(n, _)| n != name);
        if self.fields.len() == before {
            return Err(NetError::NotFound);
        }
        Ok(())
    }

    /// Removes one `name: value` pair. The name disappears with its last value.
    pub fn remove_field_value(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        validate_name(name)?;
        let idx = self
            .fields
            .iter()
            .position(|(n, _)| n == name)
            .ok_or(NetError::NotFound)?;

        let values = &mut self.fields[idx].1;
        let pos = values
            .iter()
            .position(|v| v == value)
            .ok_or(NetError::NotFound)?;
        values.remove(pos);
        if values.is_empty() {
            self.fields.remove(idx);
        }
        Ok(())
    }

    pub fn remove_all(&mut self) {
        self.fields.clear();
    }

    /// Distinct field names in first-insertion order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Values stored under `name`, in insertion order.
    pub fn field_values(&self, name: &str) -> Result<Vec<&str>, NetError> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.iter().map(String::as_str).collect())
            .ok_or(NetError::NotFound)
    }

    /// Number of `name: value` pairs.
    pub fn len(&self) -> usize {
        self.fields.iter().map(|(_, values)| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All pairs, grouped by name in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(n, values)| values.iter().map(move |v| (n.as_str(), v.as_str())))
    }

    /// Serializes as `Name: value\r\n` lines.
    pub fn raw_header(&self) -> Result<String, NetError> {
        if self.is_empty() {
            return Err(NetError::InvalidHeader);
        }
        let mut out = String::new();
        for (name, value) in self.iter() {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        Ok(out)
    }

    /// Parses `Name: value` lines produced by [`raw_header`](Self::raw_header).
    ///
    /// Lines may end in `\r\n` or `\n`; empty lines are skipped.
    pub fn parse(raw: &str) -> Result<Self, NetError> {
        let mut header = HttpHeader::new();
        for line in raw.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or(NetError::InvalidHeader)?;
            header
                .add_field(name, value.trim_matches(OWS))
                .map_err(|e| match e {
                    NetError::AlreadyExists => e,
                    _ => NetError::InvalidHeader,
                })?;
        }
        Ok(header)
    }

    /// Appends a pair received from the network. Repeated pairs are kept,
    /// since a server may legitimately send the same field twice.
    pub(crate) fn append_received(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => values.push(value.to_string()),
            None => self
                .fields
                .push((name.to_string(), vec![value.to_string()])),
        }
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// First value of `name`, compared case-insensitively.
    pub fn first_value_ignore_case(&self, name: &str) -> Option<&str> {
        self.values_ignore_case(name).next()
    }

    /// Every value of every field whose name matches case-insensitively.
    pub fn values_ignore_case<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + 'n
    where
        'a: 'n,
    {
        self.fields
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values.iter().map(String::as_str))
    }

    /// Drops every field whose name matches case-insensitively.
    pub(crate) fn remove_ignore_case(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }
}

/// Optional whitespace around a field value (RFC 7230 §3.2.3).
const OWS: &[char] = &[' ', '\t'];

/// RFC 7230 field values carry no surrounding whitespace; allowing it would
/// make [`HttpHeader::raw_header`] output parse back to a different value.
fn validate_value(value: &str) -> Result<(), NetError> {
    if value.starts_with(OWS) || value.ends_with(OWS) {
        return Err(NetError::InvalidArgument);
    }
    HeaderValue::from_str(value).map_err(|_| NetError::InvalidArgument)?;
    Ok(())
}

fn validate_name(name: &str) -> Result<(), NetError> {
    if name.is_empty() {
        return Err(NetError::InvalidArgument);
    }
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| NetError::InvalidArgument)?;
    Ok(())
}
