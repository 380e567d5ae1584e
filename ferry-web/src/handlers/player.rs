//! Browser player page

use axum::extract::Query;
use axum::response::Html;
use serde::Deserialize;

use crate::templates::player_content;

/// Query parameters of `GET /player`
#[derive(Debug, Deserialize)]
pub struct PlayerQuery {
    /// Stream URL to play
    pub stream: Option<String>,
}

/// Serves the HTML player for the given stream URL.
pub async fn player_page(Query(query): Query<PlayerQuery>) -> Html<String> {
    Html(player_content(query.stream.as_deref().unwrap_or_default()))
}
