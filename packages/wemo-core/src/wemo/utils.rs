use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::protocol_constants::INSIGHT_CURRENT_POWER_FIELD;

// ─────────────────────────────────────────────────────────────────────────────
// XML Parsing Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts text content from the first occurrence of an XML element.
///
/// Searches for an element by its local name (ignoring namespace prefixes)
/// and returns its decoded text content.
///
/// # Example
/// ```ignore
/// let xml = r#"<u:BinaryState>1</u:BinaryState>"#;
/// assert_eq!(extract_xml_text(xml, "BinaryState"), Some("1".to_string()));
/// ```
pub fn extract_xml_text(xml: &str, element_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let target_bytes = element_name.as_bytes();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == target_bytes => {
                if let Ok(text) = reader.read_text(e.name()) {
                    let decoded = html_escape::decode_html_entities(&text);
                    return Some(decoded.trim().to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    None
}

/// Escapes XML special characters for embedding in XML content.
///
/// Used for SOAP arguments.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ─────────────────────────────────────────────────────────────────────────────
// WeMo Value Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a `BinaryState` value.
///
/// Firmware may append `|`-separated extras (e.g. `1|1539185184|0|0`); only
/// the leading integer matters. Insight switches report `8` when on but idle.
/// Returns None for non-numeric values such as `Error`.
pub fn parse_binary_state(value: &str) -> Option<u8> {
    value.split('|').next()?.trim().parse().ok()
}

/// Extracts the instantaneous power reading (milliwatts) from an
/// `InsightParams` value.
///
/// ```ignore
/// let mw = parse_insight_power_mw("8|1539185184|0|0|0|1209600|0|45000|0|0|0");
/// assert_eq!(mw, Some(45000));
/// ```
pub fn parse_insight_power_mw(value: &str) -> Option<u64> {
    value
        .split('|')
        .nth(INSIGHT_CURRENT_POWER_FIELD)?
        .trim()
        .parse()
        .ok()
}
