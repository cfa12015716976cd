#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use lethex::config::{BackendConfig, PriceConfig, ResolvedConfig};
use lethex::market_data::providers::CoinGeckoPriceSource;
use lethex::market_data::PriceService;
use lethex::models::TokenDescriptor;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn btc_eth_tokens() -> Vec<TokenDescriptor> {
    vec![
        TokenDescriptor::new("BTC", "Bitcoin", "bitcoin"),
        TokenDescriptor::new("ETH", "Ethereum", "ethereum"),
    ]
}

/// Serve `body` from `/simple/price` for every request.
pub async fn mount_prices(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub fn price_service(server: &MockServer) -> PriceService {
    let source = CoinGeckoPriceSource::new().with_base_url(server.uri());
    PriceService::new(Arc::new(source))
}

/// Config pointing at a mock price server, with static tokens and no backend.
pub fn config_for(server: &MockServer, session_dir: &Path) -> ResolvedConfig {
    ResolvedConfig {
        config_path: session_dir.join("lethex.toml"),
        session_dir: session_dir.to_path_buf(),
        holder_key: "lethex_holder".to_string(),
        prices: PriceConfig {
            api_base_url: server.uri(),
            poll_interval: std::time::Duration::from_millis(50),
            ..PriceConfig::default()
        },
        backend: BackendConfig::default(),
        tokens: btc_eth_tokens(),
    }
}
