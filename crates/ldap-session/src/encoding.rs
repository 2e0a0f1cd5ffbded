//! Encoding bridge between the caller-facing and wire text encodings.
//!
//! Two directions: *incoming* converts API values to the directory's wire
//! encoding, *outgoing* is the mirror. Text values are encoded towards the
//! target side; byte values are first decoded from their source side. When
//! both sides use the same encoding, or the source side has no encoding
//! configured, byte values pass through untouched.

use encoding_rs::Encoding;

use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::DirValue;

/// Attribute names whose values are never run through the bridge when
/// normalizing search results.
pub const BINARY_ATTRIBUTES: &[&str] = &["objectguid", "jpegphoto"];

/// Key suffix marking an attribute's values as binary on insert/modify.
pub(crate) const BINARY_SUFFIX: &str = ";binary";

/// Whether a result attribute is exempt from outgoing conversion.
pub(crate) fn is_binary_attribute(name: &str) -> bool {
    BINARY_ATTRIBUTES
        .iter()
        .any(|binary| name.eq_ignore_ascii_case(binary))
}

/// Converts values between the API encoding and the directory encoding.
#[derive(Clone, Copy)]
pub struct EncodingBridge {
    api: Option<&'static Encoding>,
    directory: Option<&'static Encoding>,
}

impl std::fmt::Debug for EncodingBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodingBridge")
            .field("api", &self.api.map(Encoding::name))
            .field("directory", &self.directory.map(Encoding::name))
            .finish()
    }
}

impl EncodingBridge {
    /// Build a bridge from encoding labels; `None` disables conversion on
    /// that side.
    pub fn new(api: Option<&str>, directory: Option<&str>) -> DirectoryResult<Self> {
        Ok(Self {
            api: resolve_label(api)?,
            directory: resolve_label(directory)?,
        })
    }

    /// Convert an API-side value to its wire form.
    pub fn incoming(&self, value: DirValue) -> DirectoryResult<DirValue> {
        convert(value, self.api, self.directory)
    }

    /// Convert a wire-side value to its API form.
    pub fn outgoing(&self, value: DirValue) -> DirectoryResult<DirValue> {
        convert(value, self.directory, self.api)
    }

    /// Convert an API-side string (a DN or a filter) to its wire form,
    /// which must remain valid UTF-8 for the protocol primitives.
    pub fn incoming_str(&self, value: &str) -> DirectoryResult<String> {
        match self.incoming(DirValue::Text(value.to_string()))? {
            DirValue::Text(s) => Ok(s),
            DirValue::Bytes(bytes) => String::from_utf8(bytes).map_err(|_| {
                DirectoryError::encoding(format!(
                    "wire form of {value:?} is not valid UTF-8"
                ))
            }),
        }
    }

    /// The wire bytes of a value that lives on the API side. Used when
    /// comparing request values against current record values.
    pub fn wire_bytes(&self, value: &DirValue) -> DirectoryResult<Vec<u8>> {
        Ok(self.incoming(value.clone())?.into_bytes())
    }
}

fn resolve_label(label: Option<&str>) -> DirectoryResult<Option<&'static Encoding>> {
    match label {
        None => Ok(None),
        Some(label) => Encoding::for_label(label.as_bytes())
            .map(Some)
            .ok_or_else(|| {
                DirectoryError::invalid_configuration(format!(
                    "unknown encoding label: {label}"
                ))
            }),
    }
}

fn convert(
    value: DirValue,
    from: Option<&'static Encoding>,
    to: Option<&'static Encoding>,
) -> DirectoryResult<DirValue> {
    match value {
        DirValue::Text(text) => match to {
            Some(target) => Ok(DirValue::Bytes(encode(target, &text)?)),
            None => Ok(DirValue::Text(text)),
        },
        DirValue::Bytes(bytes) => {
            if from == to {
                return Ok(DirValue::Bytes(bytes));
            }
            // Without a source encoding the bytes are opaque.
            let Some(source) = from else {
                return Ok(DirValue::Bytes(bytes));
            };
            let text = decode(source, &bytes)?;
            match to {
                Some(target) => Ok(DirValue::Bytes(encode(target, &text)?)),
                None => Ok(DirValue::Text(text)),
            }
        }
    }
}

fn encode(encoding: &'static Encoding, text: &str) -> DirectoryResult<Vec<u8>> {
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(DirectoryError::encoding(format!(
            "value {text:?} is not representable in {}",
            encoding.name()
        )));
    }
    Ok(bytes.into_owned())
}

fn decode(encoding: &'static Encoding, bytes: &[u8]) -> DirectoryResult<String> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(DirectoryError::encoding(format!(
            "byte value is not valid {}",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(api: Option<&str>, directory: Option<&str>) -> EncodingBridge {
        EncodingBridge::new(api, directory).unwrap()
    }

    #[test]
    fn identical_encodings_pass_bytes_through() {
        let bridge = bridge(Some("utf-8"), Some("utf-8"));
        let value = DirValue::Bytes("Übermäßig".as_bytes().to_vec());
        assert_eq!(bridge.incoming(value.clone()).unwrap(), value);
        assert_eq!(bridge.outgoing(value.clone()).unwrap(), value);
    }

    #[test]
    fn text_is_encoded_towards_the_target_side() {
        let bridge = bridge(None, Some("utf-8"));
        assert_eq!(
            bridge.incoming(DirValue::from("Üben")).unwrap(),
            DirValue::Bytes("Üben".as_bytes().to_vec())
        );
        // No API encoding: outgoing text stays text.
        assert_eq!(
            bridge.outgoing(DirValue::from("Üben")).unwrap(),
            DirValue::from("Üben")
        );
    }

    #[test]
    fn bytes_cross_the_bridge_both_ways() {
        let bridge = bridge(Some("iso-8859-15"), Some("utf-8"));
        let api_side = DirValue::Bytes(vec![0xDC, 0x62, 0x65, 0x6E]); // "Üben" in latin-9
        let wire_side = DirValue::Bytes("Üben".as_bytes().to_vec());

        let incoming = bridge.incoming(api_side.clone()).unwrap();
        assert_eq!(incoming, wire_side);
        let round_tripped = bridge.outgoing(incoming).unwrap();
        assert_eq!(round_tripped, api_side);
    }

    #[test]
    fn missing_source_encoding_leaves_bytes_opaque() {
        let bridge = bridge(None, Some("utf-8"));
        let value = DirValue::Bytes(vec![0xFF, 0xFE]);
        assert_eq!(bridge.incoming(value.clone()).unwrap(), value);
    }

    #[test]
    fn wire_bytes_decode_back_to_text_without_api_encoding() {
        let bridge = bridge(None, Some("utf-8"));
        let value = DirValue::Bytes("Üben".as_bytes().to_vec());
        assert_eq!(bridge.outgoing(value).unwrap(), DirValue::from("Üben"));
    }

    #[test]
    fn strict_decode_failure() {
        let bridge = bridge(Some("utf-8"), Some("iso-8859-15"));
        let err = bridge
            .incoming(DirValue::Bytes(vec![0xC3, 0x28]))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Encoding { .. }));
    }

    #[test]
    fn incoming_str_requires_utf8_wire_form() {
        let bridge = bridge(None, Some("utf-8"));
        assert_eq!(bridge.incoming_str("cn=Üben").unwrap(), "cn=Üben");

        let latin = EncodingBridge::new(None, Some("iso-8859-15")).unwrap();
        assert!(latin.incoming_str("cn=Üben").is_err());
    }

    #[test]
    fn unknown_label_is_a_configuration_error() {
        assert!(matches!(
            EncodingBridge::new(Some("not-a-charset"), None),
            Err(DirectoryError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn binary_attribute_names() {
        assert!(is_binary_attribute("objectGUID"));
        assert!(is_binary_attribute("jpegPhoto"));
        assert!(!is_binary_attribute("cn"));
    }
}
