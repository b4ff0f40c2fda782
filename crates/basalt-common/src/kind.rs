//! Node kinds of the XML document model.

use serde::{Deserialize, Serialize};

/// Kind of a node record.
///
/// The kind is stored in the lowest three bits of byte 0 of every record and
/// decides how the remaining fields of the record are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    Document = 0,
    Element = 1,
    Text = 2,
    Attribute = 3,
    Comment = 4,
    ProcessingInstruction = 5,
}

impl NodeKind {
    /// Decodes a kind from the low three bits of a record byte.
    ///
    /// The codes 6 and 7 are never written; they decode as `Document` so that
    /// decoding stays total.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => NodeKind::Element,
            2 => NodeKind::Text,
            3 => NodeKind::Attribute,
            4 => NodeKind::Comment,
            5 => NodeKind::ProcessingInstruction,
            _ => NodeKind::Document,
        }
    }

    /// Returns the three-bit code of this kind.
    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Returns true if records of this kind carry a subtree size.
    #[inline]
    pub fn has_size(&self) -> bool {
        matches!(self, NodeKind::Document | NodeKind::Element)
    }

    /// Returns true if records of this kind reference the text store.
    #[inline]
    pub fn has_text(&self) -> bool {
        !matches!(self, NodeKind::Element)
    }

    /// Returns true for text, comment and processing-instruction nodes.
    #[inline]
    pub fn is_text_like(&self) -> bool {
        matches!(
            self,
            NodeKind::Text | NodeKind::Comment | NodeKind::ProcessingInstruction
        )
    }

    /// Returns true if records of this kind carry a name id.
    #[inline]
    pub fn has_name(&self) -> bool {
        matches!(self, NodeKind::Element | NodeKind::Attribute)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Document => "document-node",
            NodeKind::Element => "element",
            NodeKind::Text => "text",
            NodeKind::Attribute => "attribute",
            NodeKind::Comment => "comment",
            NodeKind::ProcessingInstruction => "processing-instruction",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [NodeKind; 6] = [
        NodeKind::Document,
        NodeKind::Element,
        NodeKind::Text,
        NodeKind::Attribute,
        NodeKind::Comment,
        NodeKind::ProcessingInstruction,
    ];

    #[test]
    fn test_repr_u8_values() {
        assert_eq!(NodeKind::Document as u8, 0);
        assert_eq!(NodeKind::Element as u8, 1);
        assert_eq!(NodeKind::Text as u8, 2);
        assert_eq!(NodeKind::Attribute as u8, 3);
        assert_eq!(NodeKind::Comment as u8, 4);
        assert_eq!(NodeKind::ProcessingInstruction as u8, 5);
    }

    #[test]
    fn test_from_bits_ignores_high_bits() {
        for kind in ALL {
            assert_eq!(NodeKind::from_bits(kind.code()), kind);
            assert_eq!(NodeKind::from_bits(kind.code() | 0xF8), kind);
        }
    }

    #[test]
    fn test_from_bits_unused_codes() {
        assert_eq!(NodeKind::from_bits(6), NodeKind::Document);
        assert_eq!(NodeKind::from_bits(7), NodeKind::Document);
    }

    #[test]
    fn test_has_size() {
        assert!(NodeKind::Document.has_size());
        assert!(NodeKind::Element.has_size());
        assert!(!NodeKind::Text.has_size());
        assert!(!NodeKind::Attribute.has_size());
    }

    #[test]
    fn test_text_like() {
        assert!(NodeKind::Text.is_text_like());
        assert!(NodeKind::Comment.is_text_like());
        assert!(NodeKind::ProcessingInstruction.is_text_like());
        assert!(!NodeKind::Attribute.is_text_like());
        assert!(!NodeKind::Document.is_text_like());
    }

    #[test]
    fn test_has_text_and_name() {
        assert!(NodeKind::Attribute.has_text());
        assert!(NodeKind::Document.has_text());
        assert!(!NodeKind::Element.has_text());
        assert!(NodeKind::Attribute.has_name());
        assert!(!NodeKind::ProcessingInstruction.has_name());
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeKind::Element.to_string(), "element");
        assert_eq!(
            NodeKind::ProcessingInstruction.to_string(),
            "processing-instruction"
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        for kind in ALL {
            let serialized = serde_json::to_string(&kind).unwrap();
            let deserialized: NodeKind = serde_json::from_str(&serialized).unwrap();
            assert_eq!(kind, deserialized);
        }
    }
}
