//! Local destination names derived from source URIs.

use std::path::{Path, PathBuf};

/// Used when the URI path yields nothing usable.
pub const FALLBACK_NAME: &str = "download.bin";

const NAME_MAX: usize = 255;

/// Makes `name` safe as a single Linux path component: separators, NUL,
/// whitespace and control characters become `_` (runs collapsed), leading
/// and trailing dots or underscores go, and the result fits NAME_MAX bytes.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let unsafe_char = matches!(c, '\0' | '/' | '\\') || c.is_whitespace() || c.is_control();
        if unsafe_char {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// File name for the artifact behind `uri`. A playlist (`.m3u8`) becomes the
/// merged transport stream (`.ts`).
pub fn file_name_for(uri: &str) -> String {
    let last = url::Url::parse(uri).ok().and_then(|u| {
        u.path()
            .rsplit('/')
            .find(|s| !s.is_empty())
            .map(str::to_string)
    });
    let Some(last) = last else {
        return FALLBACK_NAME.to_string();
    };
    let name = match last.len().checked_sub(".m3u8".len()) {
        Some(i) if last.is_char_boundary(i) && last[i..].eq_ignore_ascii_case(".m3u8") => {
            format!("{}.ts", &last[..i])
        }
        _ => last,
    };
    let clean = sanitize(&name);
    if clean.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        clean
    }
}

/// Destination for `uri`: `output` itself when it names a file, otherwise a
/// derived name inside `output` (or the current directory).
pub fn destination_for(uri: &str, output: Option<&Path>) -> PathBuf {
    match output {
        Some(p) if !p.is_dir() => p.to_path_buf(),
        Some(dir) => dir.join(file_name_for(uri)),
        None => PathBuf::from(file_name_for(uri)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rules() {
        assert_eq!(sanitize("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize("  ..file name.txt.. "), "file_name.txt");
        assert_eq!(sanitize("x\0\0y"), "x_y");
        assert_eq!(sanitize(".."), "");
        assert_eq!(sanitize(&"é".repeat(200)).len(), 254);
    }

    #[test]
    fn names_from_uri_paths() {
        assert_eq!(file_name_for("https://example.com/a/debian-12.iso"), "debian-12.iso");
        assert_eq!(file_name_for("https://example.com/file.zip?token=abc"), "file.zip");
        assert_eq!(file_name_for("ftp://mirror.example.com/pub/dir/"), "dir");
        assert_eq!(file_name_for("https://example.com/"), FALLBACK_NAME);
        assert_eq!(file_name_for("not a uri"), FALLBACK_NAME);
    }

    #[test]
    fn playlists_become_ts() {
        assert_eq!(file_name_for("https://cdn.example.com/live/show.m3u8"), "show.ts");
        assert_eq!(file_name_for("https://cdn.example.com/live/SHOW.M3U8?t=1"), "SHOW.ts");
    }

    #[test]
    fn destination_in_directory_or_as_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            destination_for("https://example.com/a.bin", Some(dir.path())),
            dir.path().join("a.bin")
        );
        let file = dir.path().join("renamed.bin");
        assert_eq!(destination_for("https://example.com/a.bin", Some(&file)), file);
        assert_eq!(
            destination_for("https://example.com/a.bin", None),
            PathBuf::from("a.bin")
        );
    }
}
