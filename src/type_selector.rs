//! Transfer type selection.
//!
//! `TransferType::Auto` resolves to `Textual` when the remote filename's
//! extension is recognized as text, and to `Binary` otherwise. The
//! extension-to-type lookup is pluggable: callers may supply their own
//! [`TextExtensionRecognizer`]; a reasonable default covering common text
//! formats ships for convenience.

/// The type a session or a single transfer is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    #[default]
    Auto,
    Textual,
    Binary,
}

/// The type actually sent in a `TYPE` command for one transfer, after
/// resolving `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveType {
    Textual,
    Binary,
}

impl EffectiveType {
    /// The `TYPE` command argument: `A` (ASCII) or `I` (image/binary).
    pub fn type_command_arg(self) -> &'static str {
        match self {
            Self::Textual => "A",
            Self::Binary => "I",
        }
    }
}

/// Recognizes whether a filename's extension denotes text content, for
/// resolving `TransferType::Auto`. `extension` is already lowercased and
/// has been confirmed non-empty and not the whole filename.
pub trait TextExtensionRecognizer: Send + Sync {
    fn is_textual_extension(&self, extension: &str) -> bool;
}

/// A small built-in table of common text extensions, used when no
/// caller-supplied recognizer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTextExtensionRecognizer;

impl TextExtensionRecognizer for DefaultTextExtensionRecognizer {
    fn is_textual_extension(&self, ext: &str) -> bool {
        matches!(
            ext,
            "txt" | "htm"
                | "html"
                | "xml"
                | "csv"
                | "log"
                | "ini"
                | "cfg"
                | "conf"
                | "md"
                | "json"
                | "yml"
                | "yaml"
                | "sh"
                | "bat"
                | "c"
                | "h"
                | "cpp"
                | "rs"
                | "py"
                | "java"
                | "js"
        )
    }
}

/// Extract a filename's extension: the characters after the last `.`,
/// required to be non-empty and not the whole filename (so a dotfile
/// like `.bashrc`, or a name with no dot at all, has no extension).
fn extension_of(filename: &str) -> Option<&str> {
    let dot = filename.rfind('.')?;
    if dot == 0 || dot == filename.len() - 1 {
        return None;
    }
    Some(&filename[dot + 1..])
}

/// Resolve `configured` to the type that should actually be sent in the
/// `TYPE` command ahead of a transfer of `filename`.
pub fn effective_type(
    configured: TransferType,
    filename: &str,
    recognizer: &dyn TextExtensionRecognizer,
) -> EffectiveType {
    match configured {
        TransferType::Textual => EffectiveType::Textual,
        TransferType::Binary => EffectiveType::Binary,
        TransferType::Auto => match extension_of(filename) {
            Some(ext) if recognizer.is_textual_extension(&ext.to_ascii_lowercase()) => {
                EffectiveType::Textual
            }
            _ => EffectiveType::Binary,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_picks_textual_for_recognized_extension() {
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Auto, "readme.txt", &recognizer),
            EffectiveType::Textual
        );
    }

    #[test]
    fn auto_picks_binary_for_unrecognized_extension() {
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Auto, "archive.zip", &recognizer),
            EffectiveType::Binary
        );
    }

    #[test]
    fn auto_picks_binary_for_no_extension() {
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Auto, "README", &recognizer),
            EffectiveType::Binary
        );
    }

    #[test]
    fn explicit_type_ignores_extension() {
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Binary, "readme.txt", &recognizer),
            EffectiveType::Binary
        );
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Auto, "README.TXT", &recognizer),
            EffectiveType::Textual
        );
    }

    #[test]
    fn dotfile_with_empty_prefix_has_no_extension() {
        // The text after the last '.' is the whole name minus the dot, but
        // the prefix before it is empty — that still doesn't count as an
        // extension, so a dotfile named after a recognized extension
        // stays binary.
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Auto, ".json", &recognizer),
            EffectiveType::Binary
        );
    }

    #[test]
    fn bare_name_matching_an_extension_has_no_extension() {
        // No dot at all: must not fall back to treating the whole name as
        // an extension.
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Auto, "json", &recognizer),
            EffectiveType::Binary
        );
    }

    #[test]
    fn trailing_dot_has_no_extension() {
        let recognizer = DefaultTextExtensionRecognizer;
        assert_eq!(
            effective_type(TransferType::Auto, "readme.", &recognizer),
            EffectiveType::Binary
        );
    }
}
