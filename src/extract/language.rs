//! Language detection from file extensions and shebang lines

use std::path::Path;

/// Number of leading bytes inspected by [`is_probably_text`]
pub const BINARY_SNIFF_BYTES: usize = 4096;

/// Minimum share of printable bytes for a file to count as text
const TEXT_RATIO_THRESHOLD: f64 = 0.90;

/// Canonical language tag for a file extension (case-insensitive, without the dot)
pub fn language_for_extension(extension: &str) -> Option<&'static str> {
    let lang = match extension.to_lowercase().as_str() {
        "py" => "python",
        "pyi" => "python-stub",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascript-react",
        "ts" => "typescript",
        "tsx" => "typescript-react",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "scala" => "scala",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "cpp" | "cc" | "cxx" => "cpp",
        "c" => "c",
        "h" | "hpp" | "hh" | "hxx" => "cpp-header",

        "sh" | "bash" | "zsh" => "bash",
        "ps1" => "powershell",
        "fish" => "fish",

        "md" => "markdown",
        "rst" => "restructuredtext",
        "adoc" => "asciidoc",
        "txt" => "text",

        "json" => "json",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "env" => "dotenv",

        _ => return None,
    };
    Some(lang)
}

/// Language named by a `#!` interpreter line, e.g. `#!/usr/bin/env python3`
pub fn language_from_shebang(first_line: &str) -> Option<&'static str> {
    let interpreter = first_line.strip_prefix("#!")?.split_whitespace().last()?;
    let name = interpreter.rsplit('/').next()?;
    match name {
        "python" | "python3" => Some("python"),
        "node" => Some("javascript"),
        "bash" | "sh" | "zsh" => Some("bash"),
        "fish" => Some("fish"),
        _ => None,
    }
}

/// Detect a file's language by extension, falling back to its shebang line
pub fn detect_language(path: &Path, content: &str) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(language_for_extension)
        .or_else(|| language_from_shebang(content.lines().next().unwrap_or_default()))
        .map(str::to_string)
}

/// Heuristic binary detection on the leading bytes of a file
///
/// Empty input counts as text.
pub fn is_probably_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if sample.is_empty() {
        return true;
    }

    let printable = sample
        .iter()
        .filter(|&&b| (32..127).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'))
        .count();

    printable as f64 / sample.len() as f64 >= TEXT_RATIO_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_map() {
        assert_eq!(language_for_extension("py"), Some("python"));
        assert_eq!(language_for_extension("PY"), Some("python"));
        assert_eq!(language_for_extension("pyi"), Some("python-stub"));
        assert_eq!(language_for_extension("tsx"), Some("typescript-react"));
        assert_eq!(language_for_extension("hpp"), Some("cpp-header"));
        assert_eq!(language_for_extension("zsh"), Some("bash"));
        assert_eq!(language_for_extension("cfg"), Some("ini"));
        assert_eq!(language_for_extension("xyz"), None);
    }

    #[test]
    fn test_shebang() {
        assert_eq!(language_from_shebang("#!/usr/bin/env python3"), Some("python"));
        assert_eq!(language_from_shebang("#!/bin/sh"), Some("bash"));
        assert_eq!(language_from_shebang("#!/usr/bin/env node"), Some("javascript"));
        assert_eq!(language_from_shebang("#!/usr/bin/perl"), None);
        assert_eq!(language_from_shebang("#!"), None);
        assert_eq!(language_from_shebang("print('hi')"), None);
    }

    #[test]
    fn test_detect_language_prefers_extension() {
        let lang = detect_language(Path::new("tool.rs"), "#!/usr/bin/env python3\n");
        assert_eq!(lang.as_deref(), Some("rust"));
    }

    #[test]
    fn test_detect_language_falls_back_to_shebang() {
        let lang = detect_language(Path::new("bin/deploy"), "#!/bin/bash\necho hi\n");
        assert_eq!(lang.as_deref(), Some("bash"));
        assert_eq!(detect_language(Path::new("LICENSE"), "MIT License"), None);
    }

    #[test]
    fn test_is_probably_text() {
        assert!(is_probably_text(b""));
        assert!(is_probably_text(b"fn main() {\n\tprintln!(\"hi\");\r\n}\n"));
        assert!(!is_probably_text(&[0u8, 1, 2, 3, 255, 254, 0, 0]));

        // 5% control bytes stays under the threshold
        let mut mostly_text = vec![b'a'; 95];
        mostly_text.extend_from_slice(&[0u8; 5]);
        assert!(is_probably_text(&mostly_text));
    }

    #[test]
    fn test_only_leading_bytes_are_sniffed() {
        let mut bytes = vec![b'a'; BINARY_SNIFF_BYTES];
        bytes.extend(std::iter::repeat_n(0u8, BINARY_SNIFF_BYTES * 2));
        assert!(is_probably_text(&bytes));
    }
}
