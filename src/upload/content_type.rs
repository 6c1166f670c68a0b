use std::path::Path;

/// Best-effort MIME type from the file extension. Unknown or missing extensions
/// leave the content type unset.
pub fn guess(path: &Path) -> Option<String> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    // RFC 9239 type, whatever the MIME table version says.
    if let Some("js" | "mjs") = extension.as_deref() {
        return Some("text/javascript".to_owned());
    }
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_owned())
}
