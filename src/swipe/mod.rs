mod feed;
mod interest;

use axum::{routing::get, Router};

use crate::AppState;

pub use feed::{list_candidates, FeedFilter};
pub use interest::{record_interest, SwipeOutcome};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/swipe", get(feed::feed).post(interest::swipe))
        .route("/swipe-options", get(feed::feed))
}
