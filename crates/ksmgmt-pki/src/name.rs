//! Distinguished name encoding
//!
//! Turns textual names such as `CN=Alice, O=Cryptable, C=BE` into DER
//! encoded X.501 names. The text lists the most specific RDN first, the
//! encoded sequence starts with the least specific one (RFC 4514).

use der::{
    asn1::{Ia5StringRef, ObjectIdentifier, PrintableStringRef, SetOfVec, Utf8StringRef},
    Any, Encode, Tag, Tagged,
};
use x509_cert::{
    attr::AttributeTypeAndValue,
    name::{Name, RdnSequence, RelativeDistinguishedName},
};

use crate::error::{codes, BackendError, BackendResult};

pub const CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
pub const SURNAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.4");
pub const SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
pub const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
pub const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
pub const STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
pub const STREET: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
pub const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
pub const ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
pub const TITLE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.12");
pub const GIVEN_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.42");
pub const EMAIL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");
pub const DOMAIN_COMPONENT: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.25");

/// Keyword ↔ OID table, first keyword is the one used for display
const KEYWORDS: &[(&str, ObjectIdentifier)] = &[
    ("CN", CN),
    ("SN", SURNAME),
    ("SERIALNUMBER", SERIAL_NUMBER),
    ("C", COUNTRY),
    ("L", LOCALITY),
    ("ST", STATE),
    ("S", STATE),
    ("STREET", STREET),
    ("O", ORGANIZATION),
    ("OU", ORGANIZATIONAL_UNIT),
    ("T", TITLE),
    ("TITLE", TITLE),
    ("G", GIVEN_NAME),
    ("GN", GIVEN_NAME),
    ("E", EMAIL),
    ("EMAIL", EMAIL),
    ("DC", DOMAIN_COMPONENT),
];

/// How directory strings are represented in the encoded name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStringMode {
    /// UTF8String for every directory string
    Utf8,
    /// PrintableString where the value allows it
    Printable,
}

/// Encodes a textual name into a DER directory name
pub trait NameEncoder: Send + Sync {
    fn encode(&self, name: &str, mode: NameStringMode) -> BackendResult<Vec<u8>>;
}

/// RFC 4514 style name encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct X509NameEncoder;

impl NameEncoder for X509NameEncoder {
    fn encode(&self, name: &str, mode: NameStringMode) -> BackendResult<Vec<u8>> {
        let parsed = parse_name(name, mode)?;
        parsed
            .to_der()
            .map_err(|e| BackendError::bad_encode(format!("Failed to encode name: {}", e)))
    }
}

fn invalid(message: impl Into<String>) -> BackendError {
    BackendError::new(codes::CRYPT_E_INVALID_X500_STRING, message)
}

/// Parse a textual name into an X.501 [`Name`]
pub fn parse_name(name: &str, mode: NameStringMode) -> BackendResult<Name> {
    let rdns = split_unquoted(name, &[',', ';'])?;
    if rdns.iter().all(|rdn| rdn.trim().is_empty()) {
        return Err(invalid("Empty distinguished name"));
    }

    let mut sequence = Vec::with_capacity(rdns.len());
    for rdn in rdns {
        let mut set = SetOfVec::new();
        for atv in split_unquoted(&rdn, &['+'])? {
            let atv = parse_attribute(&atv, mode)?;
            set.insert(atv)
                .map_err(|e| invalid(format!("Failed to add attribute: {}", e)))?;
        }
        sequence.push(RelativeDistinguishedName(set));
    }

    // text order is most specific first
    sequence.reverse();
    Ok(RdnSequence(sequence))
}

/// Render a name back into `CN=..., O=...` text
pub fn format_name(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .map(|rdn| {
            rdn.0
                .iter()
                .map(format_attribute)
                .collect::<Vec<_>>()
                .join(" + ")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_attribute(atv: &AttributeTypeAndValue) -> String {
    let keyword = KEYWORDS
        .iter()
        .find(|(_, oid)| *oid == atv.oid)
        .map(|(keyword, _)| keyword.to_string())
        .unwrap_or_else(|| format!("OID.{}", atv.oid));

    let value = attribute_value(&atv.value).unwrap_or_else(|| hex::encode(atv.value.value()));
    let needs_quotes = value.is_empty()
        || value.starts_with(' ')
        || value.ends_with(' ')
        || value.contains([',', ';', '+', '"', '=', '\\', '<', '>', '#']);
    if needs_quotes {
        format!("{}=\"{}\"", keyword, value.replace('"', "\"\""))
    } else {
        format!("{}={}", keyword, value)
    }
}

fn attribute_value(value: &Any) -> Option<String> {
    if let Ok(s) = Utf8StringRef::try_from(value) {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = PrintableStringRef::try_from(value) {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = Ia5StringRef::try_from(value) {
        return Some(s.as_str().to_string());
    }
    None
}

fn parse_attribute(text: &str, mode: NameStringMode) -> BackendResult<AttributeTypeAndValue> {
    let (key, raw_value) = text
        .split_once('=')
        .ok_or_else(|| invalid(format!("Missing '=' in attribute '{}'", text.trim())))?;

    let oid = attribute_oid(key.trim())?;
    let value = unquote(raw_value.trim())?;

    Ok(AttributeTypeAndValue {
        oid,
        value: encode_value(oid, &value, mode)?,
    })
}

fn attribute_oid(key: &str) -> BackendResult<ObjectIdentifier> {
    if key.is_empty() {
        return Err(invalid("Empty attribute type"));
    }

    let upper = key.to_ascii_uppercase();
    if let Some((_, oid)) = KEYWORDS.iter().find(|(keyword, _)| *keyword == upper) {
        return Ok(*oid);
    }

    let dotted = upper.strip_prefix("OID.").unwrap_or(&upper);
    if dotted.starts_with(|c: char| c.is_ascii_digit()) {
        return ObjectIdentifier::new(dotted)
            .map_err(|e| invalid(format!("Invalid attribute OID '{}': {}", key, e)));
    }

    Err(invalid(format!("Unknown attribute type '{}'", key)))
}

fn encode_value(oid: ObjectIdentifier, value: &str, mode: NameStringMode) -> BackendResult<Any> {
    let encoded = if oid == COUNTRY || oid == SERIAL_NUMBER {
        let printable = PrintableStringRef::new(value)
            .map_err(|_| invalid(format!("Value '{}' is not a printable string", value)))?;
        Any::encode_from(&printable)
    } else if oid == EMAIL || oid == DOMAIN_COMPONENT {
        let ia5 = Ia5StringRef::new(value)
            .map_err(|_| invalid(format!("Value '{}' is not an IA5 string", value)))?;
        Any::encode_from(&ia5)
    } else {
        match (mode, PrintableStringRef::new(value)) {
            (NameStringMode::Printable, Ok(printable)) => Any::encode_from(&printable),
            _ => {
                let utf8 = Utf8StringRef::new(value)
                    .map_err(|e| invalid(format!("Invalid UTF-8 value: {}", e)))?;
                Any::encode_from(&utf8)
            }
        }
    };

    encoded.map_err(|e| BackendError::bad_encode(format!("Failed to encode value: {}", e)))
}

/// Split on separators that are not inside quotes or escaped
fn split_unquoted(text: &str, separators: &[char]) -> BackendResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                let escaped = chars
                    .next()
                    .ok_or_else(|| invalid("Dangling escape at end of name"))?;
                current.push(escaped);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if !in_quotes && separators.contains(&c) => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(invalid("Unterminated quoted value"));
    }
    parts.push(current);
    Ok(parts)
}

/// Strip quotes and resolve escapes of a single attribute value
fn unquote(value: &str) -> BackendResult<String> {
    let mut out = String::with_capacity(value.len());

    if let Some(inner) = value.strip_prefix('"') {
        let inner = inner
            .strip_suffix('"')
            .ok_or_else(|| invalid(format!("Unterminated quoted value '{}'", value)))?;
        // "" inside quotes stands for a single quote character
        let mut chars = inner.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    out.push('"');
                }
                '\\' => out.push(chars.next().unwrap_or('\\')),
                c => out.push(c),
            }
        }
        return Ok(out);
    }

    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(
                chars
                    .next()
                    .ok_or_else(|| invalid("Dangling escape in value"))?,
            ),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// DER tag of the first value of `oid` in `name`
pub fn value_tag(name: &Name, oid: ObjectIdentifier) -> Option<Tag> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == oid)
        .map(|atv| atv.value.tag())
}

#[cfg(test)]
mod tests {
    use der::Decode;

    use super::*;

    #[test]
    fn test_roundtrip_text() {
        let name = parse_name("CN=Alice, O=Cryptable, C=BE", NameStringMode::Utf8).unwrap();
        assert_eq!(format_name(&name), "CN=Alice, O=Cryptable, C=BE");

        // encoded order is reversed
        assert_eq!(name.0.len(), 3);
        assert_eq!(name.0[0].0.get(0).unwrap().oid, COUNTRY);
        assert_eq!(name.0[2].0.get(0).unwrap().oid, CN);
    }

    #[test]
    fn test_string_modes() {
        let utf8 = parse_name("CN=Alice, C=BE", NameStringMode::Utf8).unwrap();
        assert_eq!(value_tag(&utf8, CN), Some(Tag::Utf8String));
        assert_eq!(value_tag(&utf8, COUNTRY), Some(Tag::PrintableString));

        let printable = parse_name("CN=Alice, C=BE", NameStringMode::Printable).unwrap();
        assert_eq!(value_tag(&printable, CN), Some(Tag::PrintableString));

        // non-printable characters fall back to UTF8String
        let fallback = parse_name("CN=Zoë", NameStringMode::Printable).unwrap();
        assert_eq!(value_tag(&fallback, CN), Some(Tag::Utf8String));
        assert_eq!(format_name(&fallback), "CN=Zoë");
    }

    #[test]
    fn test_encodings_differ_between_modes() {
        let encoder = X509NameEncoder;
        let utf8 = encoder.encode("CN=Test CA", NameStringMode::Utf8).unwrap();
        let printable = encoder.encode("CN=Test CA", NameStringMode::Printable).unwrap();
        assert_ne!(utf8, printable);
        assert_eq!(
            format_name(&Name::from_der(&utf8).unwrap()),
            format_name(&Name::from_der(&printable).unwrap())
        );
    }

    #[test]
    fn test_quotes_escapes_and_multivalue() {
        let name = parse_name(
            r#"CN="Doe, John" + SERIALNUMBER=1234, OU=R\+D, O=ACME"#,
            NameStringMode::Utf8,
        )
        .unwrap();
        assert_eq!(name.0.len(), 3);
        assert_eq!(name.0[2].0.len(), 2);

        let text = format_name(&name);
        assert!(text.contains("CN=\"Doe, John\""));
        assert!(text.contains("SERIALNUMBER=1234"));
        assert!(text.contains("OU=\"R+D\""));
    }

    #[test]
    fn test_keywords_and_oids() {
        let name = parse_name(
            "E=alice@example.com, DC=example, S=Antwerp, OID.2.5.4.12=Engineer, 2.5.4.42=Alice",
            NameStringMode::Utf8,
        )
        .unwrap();
        assert_eq!(value_tag(&name, EMAIL), Some(Tag::Ia5String));
        assert_eq!(value_tag(&name, STATE), Some(Tag::Utf8String));
        assert!(format_name(&name).contains("T=Engineer"));
        assert!(format_name(&name).contains("G=Alice"));
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["", "   ", "CN", "XX=1", "CN=\"open", "CN=a\\", "C=Zoë", "=value"] {
            let err = parse_name(bad, NameStringMode::Utf8).unwrap_err();
            assert_eq!(err.code, codes::CRYPT_E_INVALID_X500_STRING, "input {bad:?}");
        }
    }
}
