//! Key-name translation table (§6 of the specification).
//!
//! A `sendKeys` element is either literal text (sent verbatim, UTF-8
//! encoded) or the name of a named special, which translates to a fixed
//! byte sequence.

use crate::errors::EngineError;

/// One element of a `SendKeys` command: either literal text or a named
/// special key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyElement {
    Text(String),
    Named(String),
}

impl KeyElement {
    /// Build a `sendKeys` element from a wire-format string: a bare
    /// recognized token (`Enter`, `C-c`, ...) becomes `Named`, anything
    /// else is sent as literal text. This is the tmux-`send-keys`-style
    /// convention the wire shim relies on since the JSON array carries
    /// plain strings with no separate tag distinguishing the two kinds.
    pub fn from_wire(raw: String) -> KeyElement {
        if translate_named(&raw).is_some() {
            KeyElement::Named(raw)
        } else {
            KeyElement::Text(raw)
        }
    }

    /// Translate this element to the bytes that should be written to the
    /// PTY master. Literal text passes through UTF-8 encoded; named
    /// specials are looked up in the fixed table below.
    pub fn translate(&self) -> Result<Vec<u8>, EngineError> {
        match self {
            KeyElement::Text(s) => Ok(s.as_bytes().to_vec()),
            KeyElement::Named(name) => translate_named(name)
                .ok_or_else(|| EngineError::BadKey(name.clone())),
        }
    }
}

fn translate_named(name: &str) -> Option<Vec<u8>> {
    let bytes: &[u8] = match name {
        "Enter" | "Return" => b"\r",
        "Tab" => b"\t",
        "Backspace" => b"\x7f",
        "Escape" => b"\x1b",
        "Space" => b" ",
        "Up" => b"\x1b[A",
        "Down" => b"\x1b[B",
        "Right" => b"\x1b[C",
        "Left" => b"\x1b[D",
        "Home" => b"\x1b[H",
        "End" => b"\x1b[F",
        "PageUp" => b"\x1b[5~",
        "PageDown" => b"\x1b[6~",
        "F1" => b"\x1bOP",
        "F2" => b"\x1bOQ",
        "F3" => b"\x1bOR",
        "F4" => b"\x1bOS",
        "F5" => b"\x1b[15~",
        "F6" => b"\x1b[17~",
        "F7" => b"\x1b[18~",
        "F8" => b"\x1b[19~",
        "F9" => b"\x1b[20~",
        "F10" => b"\x1b[21~",
        "F11" => b"\x1b[23~",
        "F12" => b"\x1b[24~",
        _ => {
            if let Some(ch) = name.strip_prefix("C-") {
                let mut chars = ch.chars();
                let c = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                let lower = c.to_ascii_lowercase();
                if !lower.is_ascii_lowercase() {
                    return None;
                }
                let byte = (lower as u8) & 0x1f;
                return Some(vec![byte]);
            }
            return None;
        }
    };
    Some(bytes.to_vec())
}

/// Translate a full `SendKeys` sequence, returning the concatenated bytes
/// and validating every element before writing anything (so a single bad
/// key rejects the whole command rather than partially injecting input).
pub fn translate_sequence(elements: &[KeyElement]) -> Result<Vec<u8>, EngineError> {
    let mut out = Vec::new();
    for element in elements {
        out.extend(element.translate()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_text_passes_through() {
        let el = KeyElement::Text("hi".into());
        assert_eq!(el.translate().unwrap(), b"hi");
    }

    #[test]
    fn named_specials_translate() {
        assert_eq!(KeyElement::Named("Enter".into()).translate().unwrap(), b"\r");
        assert_eq!(KeyElement::Named("Return".into()).translate().unwrap(), b"\r");
        assert_eq!(KeyElement::Named("Tab".into()).translate().unwrap(), b"\t");
        assert_eq!(
            KeyElement::Named("Escape".into()).translate().unwrap(),
            b"\x1b"
        );
        assert_eq!(
            KeyElement::Named("Up".into()).translate().unwrap(),
            b"\x1b[A"
        );
        assert_eq!(
            KeyElement::Named("PageDown".into()).translate().unwrap(),
            b"\x1b[6~"
        );
    }

    #[test]
    fn control_chars_mask_to_0x1f() {
        assert_eq!(KeyElement::Named("C-c".into()).translate().unwrap(), vec![3]);
        assert_eq!(KeyElement::Named("C-a".into()).translate().unwrap(), vec![1]);
    }

    #[test]
    fn from_wire_recognizes_named_tokens_and_falls_back_to_text() {
        assert_eq!(KeyElement::from_wire("Enter".into()), KeyElement::Named("Enter".into()));
        assert_eq!(KeyElement::from_wire("C-c".into()), KeyElement::Named("C-c".into()));
        assert_eq!(KeyElement::from_wire("hello".into()), KeyElement::Text("hello".into()));
    }

    #[test]
    fn bad_key_is_rejected() {
        let err = KeyElement::Named("NoSuchKey".into()).translate().unwrap_err();
        assert!(matches!(err, EngineError::BadKey(_)));
    }

    #[test]
    fn translate_sequence_sums_lengths() {
        let seq = vec![
            KeyElement::Text("hi".into()),
            KeyElement::Named("Enter".into()),
        ];
        let bytes = translate_sequence(&seq).unwrap();
        assert_eq!(bytes.len(), 2 + 1);
        assert_eq!(bytes, b"hi\r");
    }

    #[test]
    fn translate_sequence_rejects_whole_batch_on_bad_key() {
        let seq = vec![
            KeyElement::Text("hi".into()),
            KeyElement::Named("Bogus".into()),
        ];
        assert!(translate_sequence(&seq).is_err());
    }
}
