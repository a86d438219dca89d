//! PlantUML server client
//!
//! The server addresses a diagram by its source, deflated and written in
//! PlantUML's own base64 alphabet.

use base64::alphabet::Alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::time::Duration;

use super::{RenderError, Renderer};
use crate::config::AppConfig;
use crate::models::DiagramSyntax;

const PLANTUML_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

const PLANTUML: Alphabet = match Alphabet::new(PLANTUML_ALPHABET) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("invalid PlantUML alphabet"),
};

const PLANTUML_BASE64: GeneralPurpose = GeneralPurpose::new(
    &PLANTUML,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Upper bound on an SVG response
const MAX_SVG_BYTES: u64 = 16 * 1024 * 1024;

/// Encodes diagram source the way PlantUML servers expect it in URLs
pub fn encode_plantuml(source: &str) -> Result<String, RenderError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(source.as_bytes())
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    let deflated = encoder
        .finish()
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(encode64(&deflated))
}

fn encode64(bytes: &[u8]) -> String {
    let mut out = PLANTUML_BASE64.encode(bytes);
    // Servers expect whole quads, filled with the alphabet's zero digit
    while out.len() % 4 != 0 {
        out.push('0');
    }
    out
}

/// Fetches SVG renderings from a PlantUML server
#[derive(Debug, Clone)]
pub struct RenderClient {
    server: String,
    agent: ureq::Agent,
}

impl RenderClient {
    pub fn new(server: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            server: server.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.plantuml_server, config.render_timeout())
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// URL of the SVG rendering of `source`
    pub fn svg_url(&self, source: &str) -> Result<String, RenderError> {
        match DiagramSyntax::detect(source) {
            DiagramSyntax::PlantUml => {}
            other => return Err(RenderError::Unsupported(other)),
        }
        if source.trim().is_empty() {
            return Err(RenderError::Empty);
        }
        Ok(format!("{}/svg/{}", self.server, encode_plantuml(source)?))
    }
}

impl Renderer for RenderClient {
    fn render_svg(&self, source: &str) -> Result<Vec<u8>, RenderError> {
        let url = self.svg_url(source)?;
        log::debug!("Fetching {}", url);

        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            // PlantUML answers syntax errors with an error image and a 400
            Err(ureq::Error::Status(code, _)) => return Err(RenderError::Status(code)),
            Err(e) => return Err(RenderError::Transport(e.to_string())),
        };

        let mut svg = Vec::new();
        response
            .into_reader()
            .take(MAX_SVG_BYTES)
            .read_to_end(&mut svg)
            .map_err(|e| RenderError::Transport(e.to_string()))?;
        Ok(svg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;

    fn decode64(text: &str) -> Vec<u8> {
        PLANTUML_BASE64.decode(text).unwrap()
    }

    #[test]
    fn test_encode64_alphabet() {
        assert_eq!(encode64(b"Man"), "JM5k");
        assert_eq!(encode64(&[0, 0, 0]), "0000");
        assert_eq!(encode64(&[0xFF, 0xFF, 0xFF]), "____");
        assert_eq!(encode64(&[0xFF]), "_m00");
        assert_eq!(encode64(&[0xFF, 0xFF]).len(), 4);
        for len in 0..64usize {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 37) as u8).collect();
            let encoded = encode64(&bytes);
            assert_eq!(encoded.len(), len.div_ceil(3) * 4);
            assert_eq!(&decode64(&encoded)[..len], bytes.as_slice());
        }
    }

    #[test]
    fn test_encoded_source_inflates_back() {
        let source = "@startuml\nAlice -> Bob : hello\n@enduml\n";
        let encoded = encode_plantuml(source).unwrap();
        assert!(encoded
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));

        // Trailing pad bytes are ignored once the deflate stream ends
        let mut inflated = String::new();
        DeflateDecoder::new(decode64(&encoded).as_slice())
            .read_to_string(&mut inflated)
            .unwrap();
        assert_eq!(inflated, source);
    }

    #[test]
    fn test_svg_url() {
        let client = RenderClient::new("http://localhost:8080/plantuml/", Duration::from_secs(1));
        let url = client.svg_url("@startuml\nA -> B\n@enduml").unwrap();
        assert!(url.starts_with("http://localhost:8080/plantuml/svg/"));
    }

    #[test]
    fn test_mermaid_is_unsupported() {
        let client = RenderClient::new("http://localhost:8080", Duration::from_secs(1));
        assert_eq!(
            client.svg_url("graph TD\n  A --> B"),
            Err(RenderError::Unsupported(DiagramSyntax::Mermaid))
        );
        assert_eq!(
            client.render_svg("sequenceDiagram\n  A->>B: hi"),
            Err(RenderError::Unsupported(DiagramSyntax::Mermaid))
        );
    }

    #[test]
    fn test_blank_source_is_empty() {
        let client = RenderClient::new("http://localhost:8080", Duration::from_secs(1));
        assert_eq!(client.svg_url("  \n"), Err(RenderError::Empty));
    }
}
