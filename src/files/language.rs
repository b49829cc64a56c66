use serde::{Deserialize, Serialize};
use std::path::Path;

/// Source language guessed from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Java,
    Kotlin,
    C,
    Cpp,
    CSharp,
    Go,
    Rust,
    Ruby,
    Php,
    Swift,
    Html,
    Css,
    Sql,
    Shell,
    /// Archive members we keep but cannot classify (docs, configs, assets).
    Other,
}

const EXTENSIONS: &[(&str, Language)] = &[
    ("py", Language::Python),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("java", Language::Java),
    ("kt", Language::Kotlin),
    ("c", Language::C),
    ("h", Language::C),
    ("cpp", Language::Cpp),
    ("cc", Language::Cpp),
    ("hpp", Language::Cpp),
    ("cs", Language::CSharp),
    ("go", Language::Go),
    ("rs", Language::Rust),
    ("rb", Language::Ruby),
    ("php", Language::Php),
    ("swift", Language::Swift),
    ("html", Language::Html),
    ("htm", Language::Html),
    ("css", Language::Css),
    ("sql", Language::Sql),
    ("sh", Language::Shell),
];

impl Language {
    pub fn detect(path: &str) -> Language {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .and_then(|ext| {
                EXTENSIONS
                    .iter()
                    .find(|(known, _)| *known == ext)
                    .map(|(_, lang)| *lang)
            })
            .unwrap_or(Language::Other)
    }

    pub fn is_source(self) -> bool {
        self != Language::Other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Html => "html",
            Language::Css => "css",
            Language::Sql => "sql",
            Language::Shell => "shell",
            Language::Other => "other",
        }
    }

    /// Inverse of [`Language::as_str`]; unknown names map to `Other`.
    pub fn from_name(name: &str) -> Language {
        EXTENSIONS
            .iter()
            .map(|(_, lang)| *lang)
            .find(|lang| lang.as_str() == name)
            .unwrap_or(Language::Other)
    }
}
