//! Module file extensions as the host engine understands them.

use serde::Serialize;

/// Extension tag reported to the host with a resolved module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Extension {
    #[serde(rename = ".ts")]
    Ts,
    #[serde(rename = ".tsx")]
    Tsx,
    #[serde(rename = ".d.ts")]
    Dts,
    #[serde(rename = ".mts")]
    Mts,
    #[serde(rename = ".d.mts")]
    Dmts,
    #[serde(rename = ".cts")]
    Cts,
    #[serde(rename = ".d.cts")]
    Dcts,
    #[serde(rename = ".js")]
    Js,
    #[serde(rename = ".jsx")]
    Jsx,
    #[serde(rename = ".mjs")]
    Mjs,
    #[serde(rename = ".cjs")]
    Cjs,
    #[serde(rename = ".json")]
    Json,
}

/// Longest suffixes first so `.d.ts` wins over `.ts`.
const SUFFIXES: &[(&str, Extension)] = &[
    (".d.mts", Extension::Dmts),
    (".d.cts", Extension::Dcts),
    (".d.ts", Extension::Dts),
    (".json", Extension::Json),
    (".tsx", Extension::Tsx),
    (".jsx", Extension::Jsx),
    (".mts", Extension::Mts),
    (".cts", Extension::Cts),
    (".mjs", Extension::Mjs),
    (".cjs", Extension::Cjs),
    (".ts", Extension::Ts),
    (".js", Extension::Js),
];

impl Extension {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ts => ".ts",
            Self::Tsx => ".tsx",
            Self::Dts => ".d.ts",
            Self::Mts => ".mts",
            Self::Dmts => ".d.mts",
            Self::Cts => ".cts",
            Self::Dcts => ".d.cts",
            Self::Js => ".js",
            Self::Jsx => ".jsx",
            Self::Mjs => ".mjs",
            Self::Cjs => ".cjs",
            Self::Json => ".json",
        }
    }

    /// Recognize the extension at the end of a path or URL path.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(_, ext)| *ext)
    }

    #[must_use]
    pub fn is_declaration(self) -> bool {
        matches!(self, Self::Dts | Self::Dmts | Self::Dcts)
    }
}

/// The declaration suffix (`.d.ts`, `.d.mts`, `.d.cts`) of `path`, if any.
#[must_use]
pub fn declaration_suffix(path: &str) -> Option<&'static str> {
    Extension::from_path(path)
        .filter(|ext| ext.is_declaration())
        .map(Extension::as_str)
}

/// Whether `path` names a declaration file.
#[must_use]
pub fn is_declaration_path(path: &str) -> bool {
    declaration_suffix(path).is_some()
}
