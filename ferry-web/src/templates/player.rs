//! Video player page template

use super::html_escape;

/// Generates the player page for `stream_url`.
pub fn player_content(stream_url: &str) -> String {
    const PLAYER_TEMPLATE: &str = include_str!("../../templates/player.html");

    let title = if stream_url.is_empty() {
        "No stream selected"
    } else {
        "Ferry Player"
    };

    PLAYER_TEMPLATE
        .replace("{{ title }}", title)
        .replace("{{ stream_url }}", &html_escape(stream_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_embeds_stream_url() {
        let page = player_content("http://localhost:8000/stream/-100/5");
        assert!(page.contains("src=\"http://localhost:8000/stream/-100/5\""));
        assert!(page.contains("<title>Ferry Player</title>"));
    }

    #[test]
    fn test_player_escapes_stream_url() {
        let page = player_content("x\"><script>alert(1)</script>");
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("x&quot;&gt;&lt;script&gt;"));
    }

    #[test]
    fn test_player_without_stream() {
        let page = player_content("");
        assert!(page.contains("No stream selected"));
        assert!(!page.contains("{{"));
    }
}
