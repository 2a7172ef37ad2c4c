mod list;

use axum::{routing::get, Router};

use crate::AppState;

pub use list::{list_matches, MatchSummary};

pub fn router() -> Router<AppState> {
    Router::new().route("/matches", get(list::list))
}
