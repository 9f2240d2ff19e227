use base64::Engine;
use itertools::Itertools;

/// A `data:[<mediatype>][;base64],<data>` uri, split into its parts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: Option<&'a str>,
    pub base64: bool,
    pub payload: &'a str,
}

impl<'a> DataUri<'a> {
    pub fn parse(uri: &'a str) -> Option<DataUri<'a>> {
        let rest = uri.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let base64 = header.ends_with(";base64");
        let mime_type = header.trim_end_matches(";base64");

        Some(DataUri {
            mime_type: (!mime_type.is_empty()).then_some(mime_type),
            base64,
            payload,
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.base64 {
            base64::engine::general_purpose::STANDARD.decode(self.payload)
        } else {
            Ok(self.payload.as_bytes().to_vec())
        }
    }
}

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

fn is_absolute(uri: &str) -> bool {
    uri.starts_with('/') || uri.contains("://") || uri.chars().nth(1) == Some(':')
}

/// Undoes every `%XX` escape. Escapes that are not two hex digits stay as written, decoded bytes that are not
/// valid utf-8 are replaced.
pub fn percent_decode(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%'
            && let Some(value) = bytes
                .get(index + 1..index + 3)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            decoded.push(value);
            index += 3;
        } else {
            decoded.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// The directory part of `path`, without the trailing separator.
pub fn parent_directory(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Resolves a document-relative uri into the path the stream provider (and the global texture cache) is keyed by.
/// `.` and `..` segments are collapsed, percent escapes are undone.
pub fn resolve_uri(base_directory: &str, uri: &str) -> String {
    let uri = percent_decode(uri).replace('\\', "/");
    let joined = if is_absolute(&uri) || base_directory.is_empty() {
        uri
    } else {
        format!("{}/{}", base_directory.trim_end_matches(['/', '\\']), uri)
    };

    let (prefix, path) = match joined.split_once("://") {
        Some((scheme, path)) => (format!("{}://", scheme), path.to_string()),
        None => (String::new(), joined),
    };

    let leading_slash = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." if segments.last().is_some_and(|last| *last != "..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!(
        "{}{}{}",
        prefix,
        if leading_slash { "/" } else { "" },
        segments.iter().join("/")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uris() {
        let uri = DataUri::parse("data:application/octet-stream;base64,AAEC").expect("valid data uri");
        assert_eq!(uri.mime_type, Some("application/octet-stream"));
        assert!(uri.base64);
        assert_eq!(uri.decode().expect("valid base64"), vec![0, 1, 2]);

        assert!(DataUri::parse("textures/a.png").is_none());
        assert!(DataUri::parse("data:;base64,!!!").expect("parses").decode().is_err());
    }

    #[test]
    fn relative_resolution() {
        assert_eq!(resolve_uri("models/duck", "textures/duck.png"), "models/duck/textures/duck.png");
        assert_eq!(resolve_uri("models/duck/", "../shared/./a.png"), "models/shared/a.png");
        assert_eq!(resolve_uri("", "a%20b.bin"), "a b.bin");
        assert_eq!(resolve_uri("models", "/abs/a.bin"), "/abs/a.bin");
        assert_eq!(resolve_uri("https://host/a", "../b.bin"), "https://host/b.bin");
        assert_eq!(parent_directory("models/duck/duck.gltf"), "models/duck");
        assert_eq!(parent_directory("duck.gltf"), "");
    }

    #[test]
    fn every_escape_is_decoded() {
        assert_eq!(resolve_uri("", "a%23b%2Cc.bin"), "a#b,c.bin");
        assert_eq!(resolve_uri("models", "caf%C3%A9.png"), "models/café.png");
        assert_eq!(resolve_uri("", "%2e%2e/up.bin"), "../up.bin");
        assert_eq!(percent_decode("100%zz%+1%4"), "100%zz%+1%4");
        assert_eq!(percent_decode("%FF"), "\u{FFFD}");
    }
}
