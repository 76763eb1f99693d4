//! Forward pagination walking: each step's `page`/`limit` are rewritten from
//! the previous envelope's discovered pagination metadata, and the walk
//! stops once the server reports there is nothing left.

use axum::{Router, extract::Query, routing::get};
use ironclad::{
    paged::{Direction, Paginator},
    request::RequestCore,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct Page {
    page: Option<u64>,
    limit: Option<u64>,
}

async fn items_handler(Query(q): Query<Page>) -> axum::Json<serde_json::Value> {
    let page = q.page.unwrap_or(1);
    let limit = q.limit.unwrap_or(10);
    let total = 25u64;
    let start = (page - 1) * limit;
    let items: Vec<u64> = (start..(start + limit).min(total)).collect();
    axum::Json(json!({
        "items": items,
        "page": page,
        "limit": limit,
        "total": total,
    }))
}

#[test_log::test(tokio::test)]
async fn walks_forward_until_total_is_exhausted() {
    let router = Router::new().route("/items", get(items_handler));
    let server = ironclad::test_util::spawn(router).await;

    let start = RequestCore::new(reqwest::Client::new(), server.base_url.clone())
        .endpoint("items")
        .param("page", 1)
        .param("limit", 10)
        .max_retries(0);

    let mut stream = Paginator::walk_paginate(start, Direction::Forward, 10);

    let mut pages = Vec::new();
    while let Some(envelope) = futures::StreamExt::next(&mut stream).await {
        let envelope = envelope.unwrap();
        assert!(envelope.ok);
        pages.push(envelope.json.get("items").unwrap().as_array().unwrap().len());
    }

    // 25 items at 10/page: three pages of 10, 10, 5.
    assert_eq!(pages, vec![10, 10, 5]);
}

#[test_log::test(tokio::test)]
async fn walk_stops_immediately_when_max_is_zero() {
    let router = Router::new().route("/items", get(items_handler));
    let server = ironclad::test_util::spawn(router).await;

    let start = RequestCore::new(reqwest::Client::new(), server.base_url.clone())
        .endpoint("items")
        .param("page", 1)
        .param("limit", 10)
        .max_retries(0);

    let mut stream = Paginator::walk_paginate(start, Direction::Forward, 0);
    assert!(futures::StreamExt::next(&mut stream).await.is_none());
}
