//! MIME type guessing from a file extension (spec.md §4.2, used to
//! fill the `mime_type` log field when the upstream response doesn't
//! carry a usable `Content-Type`).

use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MimeType {
    Html,
    Css,
    Javascript,
    Json,
    Xml,
    PlainText,
    Icon,
    Png,
    Jpeg,
    Gif,
    Svg,
    Pdf,
    Woff,
    Woff2,
    Ttf,
    Eot,
    OctetStream,
}

impl MimeType {
    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Html => "text/html; charset=utf-8",
            MimeType::Css => "text/css; charset=utf-8",
            MimeType::Javascript => "text/javascript; charset=utf-8",
            MimeType::Json => "application/json; charset=utf-8",
            MimeType::Xml => "application/xml; charset=utf-8",
            MimeType::PlainText => "text/plain; charset=utf-8",
            MimeType::Icon => "image/x-icon",
            MimeType::Png => "image/png",
            MimeType::Jpeg => "image/jpeg",
            MimeType::Gif => "image/gif",
            MimeType::Svg => "image/svg+xml",
            MimeType::Pdf => "application/pdf",
            MimeType::Woff => "font/woff",
            MimeType::Woff2 => "font/woff2",
            MimeType::Ttf => "font/ttf",
            MimeType::Eot => "application/vnd.ms-fontobject",
            MimeType::OctetStream => "application/octet-stream",
        }
    }
}

pub fn get_mime_type_enum(file_path: &Path) -> MimeType {
    let Some(extension) = file_path.extension().and_then(|s| s.to_str()) else {
        return MimeType::OctetStream;
    };
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => MimeType::Html,
        "css" => MimeType::Css,
        "js" => MimeType::Javascript,
        "json" => MimeType::Json,
        "xml" => MimeType::Xml,
        "txt" => MimeType::PlainText,
        "ico" => MimeType::Icon,
        "png" => MimeType::Png,
        "jpg" | "jpeg" => MimeType::Jpeg,
        "gif" => MimeType::Gif,
        "svg" => MimeType::Svg,
        "pdf" => MimeType::Pdf,
        "woff" => MimeType::Woff,
        "woff2" => MimeType::Woff2,
        "ttf" => MimeType::Ttf,
        "eot" => MimeType::Eot,
        _ => MimeType::OctetStream,
    }
}

pub fn get_mime_type(file_path: &str) -> &'static str {
    get_mime_type_enum(Path::new(file_path)).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_correctly() {
        assert_eq!(get_mime_type("a.html"), "text/html; charset=utf-8");
        assert_eq!(get_mime_type("a.PNG"), "image/png");
        assert_eq!(get_mime_type("a.jpeg"), "image/jpeg");
    }

    #[test]
    fn unknown_or_missing_extension_is_octet_stream() {
        assert_eq!(get_mime_type("a.xyz"), "application/octet-stream");
        assert_eq!(get_mime_type("noext"), "application/octet-stream");
    }
}
