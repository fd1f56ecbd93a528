//! Common types used in `symreader`.

use std::fmt;
use std::str;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use uuid::Uuid;

/// Language GUID of C# documents.
pub const LANGUAGE_CSHARP: Uuid = uuid::uuid!("3f5162f8-07c6-11d3-9053-00c04fa302a1");
/// Language GUID of Visual Basic documents.
pub const LANGUAGE_VISUAL_BASIC: Uuid = uuid::uuid!("3a12d0b8-c26c-11d0-b442-00a0244a1dd2");
/// Language GUID of F# documents.
pub const LANGUAGE_FSHARP: Uuid = uuid::uuid!("ab4f38c9-b6e6-43ba-be3b-58080b2ccce3");

/// The language vendor reported for all documents.
pub const LANGUAGE_VENDOR_MICROSOFT: Uuid = uuid::uuid!("994b45c4-e6e9-11d2-903f-00c04fa302a1");
/// The document type reported for all documents.
pub const DOCUMENT_TYPE_TEXT: Uuid = uuid::uuid!("5a869d0b-6611-11d3-bd2a-0000f80849bd");

/// Checksum algorithm GUID for SHA-1 document hashes.
pub const HASH_ALGORITHM_SHA1: Uuid = uuid::uuid!("ff1816ec-aa5e-4d10-87f7-6f4963833460");
/// Checksum algorithm GUID for SHA-256 document hashes.
pub const HASH_ALGORITHM_SHA256: Uuid = uuid::uuid!("8829d00f-11b8-4213-878b-770e8597ac16");

/// An error returned for an invalid [`Language`](enum.Language.html).
#[derive(Debug)]
pub struct UnknownLanguageError;

impl fmt::Display for UnknownLanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown language")
    }
}

impl std::error::Error for UnknownLanguageError {}

/// A programming language declared in debugging information.
///
/// Portable PDB documents carry a language GUID. The well-known GUIDs of the .NET compilers are
/// mapped to a variant here, everything else is [`Language::Unknown`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u32)]
pub enum Language {
    #[default]
    Unknown = 0,
    CSharp = 1,
    VisualBasic = 2,
    FSharp = 3,
}

impl Language {
    /// Maps a document language GUID to a `Language`.
    ///
    /// # Examples
    ///
    /// ```
    /// use symreader_common::{Language, LANGUAGE_CSHARP};
    ///
    /// assert_eq!(Language::from_guid(LANGUAGE_CSHARP), Language::CSharp);
    /// ```
    pub fn from_guid(guid: Uuid) -> Language {
        match guid {
            LANGUAGE_CSHARP => Self::CSharp,
            LANGUAGE_VISUAL_BASIC => Self::VisualBasic,
            LANGUAGE_FSHARP => Self::FSharp,
            _ => Self::Unknown,
        }
    }

    /// The GUID written to Portable PDB documents for this language.
    ///
    /// [`Language::Unknown`] maps to the nil GUID.
    pub fn guid(self) -> Uuid {
        match self {
            Self::Unknown => Uuid::nil(),
            Self::CSharp => LANGUAGE_CSHARP,
            Self::VisualBasic => LANGUAGE_VISUAL_BASIC,
            Self::FSharp => LANGUAGE_FSHARP,
        }
    }

    /// Returns the name of the language.
    ///
    /// The name is always given in lower case without special characters or spaces, suitable for
    /// serialization and parsing. For a human readable name, use the `Display` implementation.
    pub fn name(self) -> &'static str {
        match self {
            Language::Unknown => "unknown",
            Language::CSharp => "csharp",
            Language::VisualBasic => "visualbasic",
            Language::FSharp => "fsharp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = match *self {
            Language::Unknown => "unknown",
            Language::CSharp => "C#",
            Language::VisualBasic => "Visual Basic",
            Language::FSharp => "F#",
        };

        f.write_str(formatted)
    }
}

impl str::FromStr for Language {
    type Err = UnknownLanguageError;

    fn from_str(string: &str) -> Result<Language, UnknownLanguageError> {
        Ok(match string {
            "unknown" => Language::Unknown,
            "csharp" => Language::CSharp,
            "visualbasic" => Language::VisualBasic,
            "fsharp" => Language::FSharp,
            _ => return Err(UnknownLanguageError),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_guid_mapping() {
        for lang in [Language::CSharp, Language::VisualBasic, Language::FSharp] {
            assert_eq!(Language::from_guid(lang.guid()), lang);
            assert_eq!(lang.name().parse::<Language>().unwrap(), lang);
        }
        assert_eq!(Language::from_guid(Uuid::nil()), Language::Unknown);
    }

    #[test]
    fn test_language_display() {
        assert_eq!(Language::CSharp.to_string(), "C#");
        assert_eq!(Language::Unknown.to_string(), "unknown");
    }
}
