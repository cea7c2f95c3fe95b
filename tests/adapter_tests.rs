use axum::{
    Json, Router,
    extract::{Path, Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use keyscout::cache::CacheService;
use keyscout::clients::{
    AdapterDeps, AdapterError, AmazonAdapter, EbayAdapter, EtsyAdapter, FixedEstimator,
    GumroadAdapter, PlatformAdapter, ShopifyAdapter,
};
use keyscout::config::{AmazonConfig, EbayConfig, EtsyConfig, GumroadConfig, ShopifyConfig};
use keyscout::domain::Platform;
use serde_json::{Value, json};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
struct MockMarket {
    listing_calls: Arc<AtomicUsize>,
    token_calls: Arc<AtomicUsize>,
    reject_token: bool,
    /// Every page after the first answers 500.
    fail_after_first_page: bool,
    /// Query keys of each Amazon request, in arrival order.
    amazon_requests: Arc<Mutex<Vec<Vec<String>>>>,
    /// Amazon search index that answers 500.
    failing_index: Option<&'static str>,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn deps() -> AdapterDeps {
    AdapterDeps {
        http: reqwest::Client::new(),
        cache: CacheService::in_memory(),
        estimator: Arc::new(FixedEstimator::default()),
    }
}

async fn etsy_listings(
    State(market): State<MockMarket>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("etsy-key") {
        return (StatusCode::FORBIDDEN, "missing api key").into_response();
    }
    market.listing_calls.fetch_add(1, Ordering::SeqCst);

    let limit: usize = params["limit"].parse().unwrap();
    let offset: usize = params["offset"].parse().unwrap();
    if market.fail_after_first_page && offset > 0 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }

    // 120 listings in total, so the second full-size page comes back short.
    let results: Vec<Value> = (offset..(offset + limit).min(120))
        .map(|i| {
            json!({
                "listing_id": i + 1,
                "title": format!("Printable Planner Page {i}"),
                "price": { "amount": 1500, "divisor": 100 },
                "tags": ["printable planner"],
                "views": 200,
                "num_favorers": 4
            })
        })
        .collect();

    Json(json!({ "count": 120, "results": results })).into_response()
}

fn etsy_config(base_url: String) -> EtsyConfig {
    EtsyConfig {
        api_key: "etsy-key".to_string(),
        base_url,
        rate_limit_ms: 0,
        ..EtsyConfig::default()
    }
}

#[tokio::test]
async fn etsy_paginates_until_a_short_page() {
    let market = MockMarket::default();
    let router = Router::new()
        .route("/application/listings/active", get(etsy_listings))
        .with_state(market.clone());
    let base = serve(router).await;

    let adapter = EtsyAdapter::new(etsy_config(base), deps());
    let records = adapter.search("printable planner", 150).await.unwrap();

    assert_eq!(records.len(), 120);
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 2);
    assert!(records.iter().all(|r| r.platform == Platform::Etsy));
    assert!(records.iter().all(|r| r.difficulty.value() <= 100));
    assert!(records.iter().all(|r| r.id.starts_with("etsy-")));
}

#[tokio::test]
async fn etsy_search_results_are_cached() {
    let market = MockMarket::default();
    let router = Router::new()
        .route("/application/listings/active", get(etsy_listings))
        .with_state(market.clone());
    let base = serve(router).await;

    let adapter = EtsyAdapter::new(etsy_config(base), deps());
    let first = adapter.search("printable planner", 10).await.unwrap();
    let second = adapter.search("Printable  Planner", 10).await.unwrap();

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn etsy_rejected_key_yields_empty_results() {
    let market = MockMarket::default();
    let router = Router::new()
        .route("/application/listings/active", get(etsy_listings))
        .with_state(market.clone());
    let base = serve(router).await;

    let config = EtsyConfig {
        api_key: "wrong-key".to_string(),
        ..etsy_config(base)
    };
    let adapter = EtsyAdapter::new(config, deps());
    let records = adapter.search("printable planner", 10).await.unwrap();

    assert!(records.is_empty());
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 0);
}

async fn ebay_token(State(market): State<MockMarket>) -> Response {
    market.token_calls.fetch_add(1, Ordering::SeqCst);
    if market.reject_token {
        return (StatusCode::UNAUTHORIZED, r#"{"error":"invalid_client"}"#).into_response();
    }
    Json(json!({
        "access_token": "token-123",
        "expires_in": 7200,
        "token_type": "Application Access Token"
    }))
    .into_response()
}

async fn ebay_search(State(market): State<MockMarket>, headers: HeaderMap) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer token-123") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    market.listing_calls.fetch_add(1, Ordering::SeqCst);

    Json(json!({
        "total": 2,
        "itemSummaries": [
            {
                "itemId": "v1|1|0",
                "title": "Vintage Brass Lamp",
                "price": { "value": "45.00", "currency": "USD" },
                "categories": [{ "categoryId": "20000", "categoryName": "Home & Garden" }]
            },
            {
                "itemId": "v1|2|0",
                "title": "Vintage Desk Lamp",
                "price": { "value": "120.00", "currency": "USD" },
                "bidCount": 8
            }
        ]
    }))
    .into_response()
}

fn ebay_router(market: &MockMarket) -> Router {
    Router::new()
        .route("/identity/v1/oauth2/token", post(ebay_token))
        .route("/buy/browse/v1/item_summary/search", get(ebay_search))
        .with_state(market.clone())
}

fn ebay_config(base_url: String) -> EbayConfig {
    EbayConfig {
        app_id: "app".to_string(),
        cert_id: "cert".to_string(),
        base_url,
        rate_limit_ms: 0,
        ..EbayConfig::default()
    }
}

#[tokio::test]
async fn ebay_fetches_a_token_then_searches() {
    let market = MockMarket::default();
    let base = serve(ebay_router(&market)).await;

    let adapter = EbayAdapter::new(ebay_config(base), deps());
    let records = adapter.search("vintage lamp", 10).await.unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.platform == Platform::Ebay));
    assert_eq!(market.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 1);

    // The token is reused until it nears expiry.
    adapter.search("brass lamp", 10).await.unwrap();
    assert_eq!(market.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ebay_rejected_credentials_are_an_auth_error() {
    let market = MockMarket {
        reject_token: true,
        ..MockMarket::default()
    };
    let base = serve(ebay_router(&market)).await;

    let adapter = EbayAdapter::new(ebay_config(base), deps());
    let err = adapter.search("vintage lamp", 10).await.unwrap_err();

    assert!(matches!(
        err,
        AdapterError::Auth {
            platform: Platform::Ebay,
            ..
        }
    ));
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn etsy_failed_page_keeps_earlier_results() {
    let market = MockMarket {
        fail_after_first_page: true,
        ..MockMarket::default()
    };
    let router = Router::new()
        .route("/application/listings/active", get(etsy_listings))
        .with_state(market.clone());
    let base = serve(router).await;

    let adapter = EtsyAdapter::new(etsy_config(base), deps());
    let records = adapter.search("printable planner", 150).await.unwrap();

    assert_eq!(records.len(), 100);
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 2);
}

async fn etsy_categories(headers: HeaderMap) -> Response {
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("etsy-key") {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!({
        "count": 1,
        "results": [{
            "category_id": 1,
            "name": "Paper & Party Supplies",
            "category_path": ["Paper & Party Supplies"],
            "children": [{ "category_id": 2, "name": "Paper", "category_path": ["Paper & Party Supplies", "Paper"] }]
        }]
    }))
    .into_response()
}

async fn etsy_shop_listings(
    State(market): State<MockMarket>,
    Path(shop_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    market.listing_calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(params["includes"], "Images");
    let limit: usize = params["limit"].parse().unwrap();

    let results: Vec<Value> = (0..limit)
        .map(|i| json!({ "listing_id": 500 + i, "title": format!("{shop_id} Sticker Sheet {i}") }))
        .collect();
    Json(json!({ "count": limit, "results": results })).into_response()
}

#[tokio::test]
async fn etsy_catalogue_lookups_are_cached() {
    let market = MockMarket::default();
    let router = Router::new()
        .route("/application/shops/active/categories", get(etsy_categories))
        .route(
            "/application/shops/{shop_id}/listings/active",
            get(etsy_shop_listings),
        )
        .with_state(market.clone());
    let base = serve(router).await;

    let deps = deps();
    let cache = deps.cache.clone();
    let adapter = EtsyAdapter::new(etsy_config(base), deps);

    let categories = adapter.categories().await.unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[1].name, "Paper");
    assert!(cache.exists("etsy:categories").await);

    let listings = adapter.group_listings("papershop", 3).await.unwrap();
    assert_eq!(listings.len(), 3);
    assert_eq!(listings[0].id, "etsy-500");
    adapter.group_listings("papershop", 3).await.unwrap();
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 1);
    assert!(cache.exists("etsy:shop:papershop:3").await);
}

async fn shopify_products(
    State(market): State<MockMarket>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if headers
        .get("x-shopify-access-token")
        .and_then(|v| v.to_str().ok())
        != Some("shpat-token")
    {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    market.listing_calls.fetch_add(1, Ordering::SeqCst);

    let limit: usize = params["limit"].parse().unwrap();
    let page: usize = params["page"].parse().unwrap();
    if market.fail_after_first_page && page > 1 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }

    let products: Vec<Value> = (0..limit)
        .map(|i| {
            json!({
                "id": page * 1000 + i,
                "title": format!("Logo Template {i}"),
                "product_type": "Digital",
                "tags": "logo, branding",
                "variants": [{ "price": "25.00" }]
            })
        })
        .collect();
    Json(json!({ "products": products })).into_response()
}

async fn shopify_collections() -> Response {
    Json(json!({
        "collections": [
            { "id": 841_564_295, "handle": "branding", "title": "Branding Kits" },
            { "id": 395_646_240, "handle": "stickers", "title": "" }
        ]
    }))
    .into_response()
}

async fn shopify_product(Path(file): Path<String>) -> Response {
    if file != "8.json" {
        return (StatusCode::NOT_FOUND, r#"{"errors":"Not Found"}"#).into_response();
    }
    Json(json!({
        "product": {
            "id": 8,
            "title": "Wedding Invitation Suite",
            "tags": "wedding, invitation",
            "variants": [{ "price": "12.50" }]
        }
    }))
    .into_response()
}

fn shopify_router(market: &MockMarket) -> Router {
    Router::new()
        .route("/products.json", get(shopify_products))
        .route("/collections.json", get(shopify_collections))
        .route("/products/{file}", get(shopify_product))
        .with_state(market.clone())
}

fn shopify_config(base_url: String) -> ShopifyConfig {
    ShopifyConfig {
        access_token: "shpat-token".to_string(),
        base_url: Some(base_url),
        rate_limit_ms: 0,
        ..ShopifyConfig::default()
    }
}

#[tokio::test]
async fn shopify_failed_page_keeps_earlier_results() {
    let market = MockMarket {
        fail_after_first_page: true,
        ..MockMarket::default()
    };
    let base = serve(shopify_router(&market)).await;

    let adapter = ShopifyAdapter::new(shopify_config(base), deps());
    let records = adapter.search("logo", 300).await.unwrap();

    assert_eq!(records.len(), 250);
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 2);
    assert!(records.iter().all(|r| r.platform == Platform::Shopify));
}

#[tokio::test]
async fn shopify_collections_and_products() {
    let market = MockMarket::default();
    let base = serve(shopify_router(&market)).await;
    let adapter = ShopifyAdapter::new(shopify_config(base), deps());

    let collections = adapter.categories().await.unwrap();
    let names: Vec<&str> = collections.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Branding Kits", "stickers"]);

    let product = adapter.item_details("8").await.unwrap().unwrap();
    assert_eq!(product.title, "Wedding Invitation Suite");
    assert_eq!(product.price, Some(12.5));

    assert!(adapter.item_details("9").await.unwrap().is_none());
}

async fn gumroad_products(
    State(market): State<MockMarket>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer gum-token") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    market.listing_calls.fetch_add(1, Ordering::SeqCst);

    let limit: usize = params["limit"].parse().unwrap();
    let page: usize = params["page"].parse().unwrap();

    // Every page is full, so only the page cap ends the loop.
    let products: Vec<Value> = (0..limit)
        .map(|i| {
            json!({
                "id": format!("p{page}-{i}"),
                "name": format!("Notion Template {page}-{i}"),
                "price": 9.0,
                "tags": ["notion template"]
            })
        })
        .collect();
    Json(json!({ "success": true, "products": products })).into_response()
}

#[tokio::test]
async fn gumroad_stops_at_the_page_cap() {
    let market = MockMarket::default();
    let router = Router::new()
        .route("/products", get(gumroad_products))
        .with_state(market.clone());
    let base = serve(router).await;

    let config = GumroadConfig {
        access_token: "gum-token".to_string(),
        base_url: base,
        rate_limit_ms: 0,
        ..GumroadConfig::default()
    };
    let adapter = GumroadAdapter::new(config, deps());
    let records = adapter.search("notion template", 1000).await.unwrap();

    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 10);
    assert_eq!(records.len(), 500);
}

type HmacSha256 = Hmac<Sha256>;

/// Checks the request signature the way the Product Advertising API does.
fn signature_is_valid(host: &str, raw_query: &str) -> bool {
    let Some((canonical, signature)) = raw_query.rsplit_once("&Signature=") else {
        return false;
    };
    let Ok(signature) = urlencoding::decode(signature) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(b"SECRET").unwrap();
    mac.update(format!("GET\n{host}\n/onca/xml\n{canonical}").as_bytes());
    BASE64.encode(mac.finalize().into_bytes()) == signature
}

async fn amazon_item_search(
    State(market): State<MockMarket>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let raw = raw.unwrap_or_default();
    let keys: Vec<String> = url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, _)| k.into_owned())
        .collect();
    market.amazon_requests.lock().unwrap().push(keys);

    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !signature_is_valid(host, &raw) {
        return (StatusCode::FORBIDDEN, "<Error><Code>SignatureDoesNotMatch</Code></Error>")
            .into_response();
    }

    let index = params["SearchIndex"].as_str();
    if market.failing_index == Some(index) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "<Error/>").into_response();
    }

    let body = format!(
        r#"<?xml version="1.0"?>
<ItemSearchResponse xmlns="http://webservices.amazon.com/AWSECommerceService/2013-08-01">
  <Items>
    <Item>
      <ASIN>{index}-1</ASIN>
      <SalesRank>4200</SalesRank>
      <ItemAttributes><Title>Undated Weekly Planner</Title><ProductGroup>{index}</ProductGroup></ItemAttributes>
    </Item>
  </Items>
</ItemSearchResponse>"#
    );
    ([("content-type", "text/xml")], body).into_response()
}

fn amazon_config(base_url: String) -> AmazonConfig {
    AmazonConfig {
        access_key: "AKID".to_string(),
        secret_key: "SECRET".to_string(),
        associate_tag: "keyscout-20".to_string(),
        base_url: Some(base_url),
        rate_limit_ms: 0,
        ..AmazonConfig::default()
    }
}

#[tokio::test]
async fn amazon_requests_are_signed() {
    let market = MockMarket::default();
    let router = Router::new()
        .route("/onca/xml", get(amazon_item_search))
        .with_state(market.clone());
    let base = serve(router).await;

    let adapter = AmazonAdapter::new(amazon_config(base), deps());
    let records = adapter.search("planner", 6).await.unwrap();

    let requests = market.amazon_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 6);
    for keys in &requests {
        assert!(keys.iter().any(|k| k == "Signature"), "{keys:?}");
        assert!(keys.iter().any(|k| k == "Timestamp"));
    }
    // Every index answered, so every signature checked out.
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.term == "planner"));
}

#[tokio::test]
async fn amazon_failed_index_is_skipped() {
    let market = MockMarket {
        failing_index: Some("Software"),
        ..MockMarket::default()
    };
    let router = Router::new()
        .route("/onca/xml", get(amazon_item_search))
        .with_state(market.clone());
    let base = serve(router).await;

    let adapter = AmazonAdapter::new(amazon_config(base), deps());
    let records = adapter.search("planner", 6).await.unwrap();

    assert_eq!(market.amazon_requests.lock().unwrap().len(), 6);
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.id != "amazon-Software-1"));
    assert!(records.iter().any(|r| r.id == "amazon-Electronics-1"));
}

#[tokio::test]
async fn ebay_token_request_is_throttled() {
    let market = MockMarket::default();
    let base = serve(ebay_router(&market)).await;

    let config = EbayConfig {
        rate_limit_ms: 300,
        ..ebay_config(base)
    };
    let adapter = EbayAdapter::new(config, deps());

    let started = Instant::now();
    adapter.search("vintage lamp", 10).await.unwrap();

    // Token and search page are two calls, one interval apart.
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(market.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(market.listing_calls.load(Ordering::SeqCst), 1);
}

async fn ebay_item(headers: HeaderMap, Path(item_id): Path<String>) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer token-123") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if item_id != "v1|1|0" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "itemId": "v1|1|0",
        "title": "Vintage Brass Lamp",
        "price": { "value": "45.00", "currency": "USD" },
        "categories": [{ "categoryId": "20000", "categoryName": "Home & Garden" }]
    }))
    .into_response()
}

async fn ebay_category_tree() -> Response {
    Json(json!({
        "categories": [
            { "categoryId": "20081", "categoryName": "Antiques" },
            { "categoryId": "550", "categoryName": "Art" }
        ]
    }))
    .into_response()
}

#[tokio::test]
async fn ebay_item_and_category_lookups() {
    let market = MockMarket::default();
    let router = ebay_router(&market)
        .route("/buy/browse/v1/item/{item_id}", get(ebay_item))
        .route("/commerce/taxonomy/v1/category_tree/0", get(ebay_category_tree));
    let base = serve(router).await;

    let adapter = EbayAdapter::new(ebay_config(base), deps());

    let item = adapter.item_details("v1|1|0").await.unwrap().unwrap();
    assert_eq!(item.title, "Vintage Brass Lamp");
    assert_eq!(item.category.as_deref(), Some("Home & Garden"));
    assert_eq!(item.keyword.unwrap().id, "ebay-v1|1|0");

    assert!(adapter.item_details("v1|2|0").await.unwrap().is_none());

    let categories = adapter.categories().await.unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].name, "Antiques");
    assert_eq!(market.token_calls.load(Ordering::SeqCst), 1);
}
