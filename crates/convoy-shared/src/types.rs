use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    PARTICIPANT_ID_PREFIX, PARTICIPANT_ID_RANDOM_LEN, SESSION_CODE_LEN, SESSION_CODE_MAX_LEN,
};
use crate::error::DecodeError;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

// Participant identity = opaque per-device string, persisted by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generate a fresh device identity (`user_` + 9 base-36 chars).
    pub fn generate() -> Self {
        Self(format!(
            "{PARTICIPANT_ID_PREFIX}{}",
            random_base36(PARTICIPANT_ID_RANDOM_LEN)
        ))
    }

    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(DecodeError::InvalidParticipantId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short human-typed session code, always upper-case alphanumeric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Generate a random 4-character code for a newly hosted session.
    pub fn generate() -> Self {
        Self(random_base36(SESSION_CODE_LEN).to_ascii_uppercase())
    }

    /// Normalise a typed code: trimmed and upper-cased.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let code = raw.trim().to_ascii_uppercase();
        let valid = !code.is_empty()
            && code.len() <= SESSION_CODE_MAX_LEN
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(DecodeError::InvalidSessionCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionCode {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for SessionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-generated annotation identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AnnotationId(pub Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the fixed participant palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteColor {
    pub name: &'static str,
    pub hex: &'static str,
}

/// The fixed, ordered palette colours are assigned from on join.
pub const PALETTE: [PaletteColor; 10] = [
    PaletteColor { name: "Neon Blue", hex: "#3b82f6" },
    PaletteColor { name: "Neon Green", hex: "#10b981" },
    PaletteColor { name: "Hot Pink", hex: "#ec4899" },
    PaletteColor { name: "Amber", hex: "#f59e0b" },
    PaletteColor { name: "Purple", hex: "#a855f7" },
    PaletteColor { name: "Red", hex: "#ef4444" },
    PaletteColor { name: "Cyan", hex: "#06b6d4" },
    PaletteColor { name: "Lime", hex: "#84cc16" },
    PaletteColor { name: "Orange", hex: "#f97316" },
    PaletteColor { name: "Rose", hex: "#f43f5e" },
];

/// A participant colour as a lower-case `#rrggbb` string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let hex = raw.trim().to_ascii_lowercase();
        let valid = hex.len() == 7
            && hex.starts_with('#')
            && hex[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(DecodeError::InvalidColor(raw.to_string()));
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the palette entry, if this colour is part of the palette.
    pub fn palette_name(&self) -> Option<&'static str> {
        PALETTE.iter().find(|c| c.hex == self.0).map(|c| c.name)
    }
}

impl From<&PaletteColor> for Color {
    fn from(c: &PaletteColor) -> Self {
        Self(c.hex.to_string())
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::from(&PALETTE[0])
    }
}

impl TryFrom<String> for Color {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_session_code_shape() {
        let code = SessionCode::generate();
        assert_eq!(code.as_str().len(), SESSION_CODE_LEN);
        assert!(code
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_session_code_is_normalised() {
        let code = SessionCode::parse("  ab1x ").unwrap();
        assert_eq!(code.as_str(), "AB1X");
    }

    #[test]
    fn test_session_code_rejects_garbage() {
        assert!(SessionCode::parse("").is_err());
        assert!(SessionCode::parse("AB/CD").is_err());
        assert!(SessionCode::parse(&"A".repeat(13)).is_err());
    }

    #[test]
    fn test_generated_participant_id() {
        let id = ParticipantId::generate();
        assert!(id.as_str().starts_with("user_"));
        assert_eq!(id.as_str().len(), 5 + 9);
        assert_ne!(id, ParticipantId::generate());
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("#A855F7").unwrap().as_str(), "#a855f7");
        assert_eq!(
            Color::parse("#a855f7").unwrap().palette_name(),
            Some("Purple")
        );
        assert!(Color::parse("a855f7").is_err());
        assert!(Color::parse("#xyz123").is_err());
    }

    #[test]
    fn test_palette_is_distinct() {
        for (i, a) in PALETTE.iter().enumerate() {
            for b in &PALETTE[i + 1..] {
                assert_ne!(a.hex, b.hex);
            }
        }
    }

    #[test]
    fn test_malformed_color_fails_to_deserialize() {
        let result: Result<Color, _> = serde_json::from_str("\"red\"");
        assert!(result.is_err());
    }
}
