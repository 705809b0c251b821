//! Avatar URL normalization.

/// Shown when a user's avatar is unknown.
pub const DEFAULT_AVATAR_URL: &str = "//static.hdslb.com/images/member/noface.gif";

/// Strips the `http:`/`https:` scheme so the URL follows the page's own
/// scheme, and asks the image CDN for a 48×48 thumbnail.
///
/// The default avatar is a static file the CDN can't resize, so it is
/// left alone.
pub fn process_avatar_url(url: &str) -> String {
    let url = url
        .strip_prefix("https:")
        .or_else(|| url.strip_prefix("http:"))
        .unwrap_or(url);
    if url.ends_with("noface.gif") {
        url.to_owned()
    } else {
        format!("{url}@48w_48h")
    }
}

/// Like [`process_avatar_url`], falling back to [`DEFAULT_AVATAR_URL`] for
/// empty input.
pub fn avatar_or_default(url: &str) -> String {
    if url.is_empty() {
        DEFAULT_AVATAR_URL.to_owned()
    } else {
        process_avatar_url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scheme_and_adds_size() {
        assert_eq!(
            process_avatar_url("https://i0.hdslb.com/bfs/face/a.jpg"),
            "//i0.hdslb.com/bfs/face/a.jpg@48w_48h"
        );
        assert_eq!(
            process_avatar_url("http://i0.hdslb.com/a.jpg"),
            "//i0.hdslb.com/a.jpg@48w_48h"
        );
    }

    #[test]
    fn test_default_avatar_untouched() {
        assert_eq!(
            process_avatar_url("http://static.hdslb.com/images/member/noface.gif"),
            DEFAULT_AVATAR_URL
        );
    }

    #[test]
    fn test_empty_falls_back() {
        assert_eq!(avatar_or_default(""), DEFAULT_AVATAR_URL);
    }
}
