//! Price catalog, gate assembly and the application router.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::routing::{get, post};
use paygate::amount::MoneyAmount;
use paygate::registry::{FacilitatorBinding, PaymentRequirementTemplate, RouteRegistry};
use paygate::{ConfigurationError, InMemoryNonceStore, PaymentGate};
use paygate_http::facilitator::FacilitatorClient;
use paygate_http::server::PaymentGateLayer;
use url::Url;

use crate::config::{RailConfig, ServerConfig};
use crate::error::StartupError;
use crate::handlers;

/// Which settlement rail a route charges on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rail {
    /// The EIP-155 network, payee and facilitator.
    Evm,
    /// The Solana network, payee and facilitator.
    Solana,
}

/// A paid route of the demo catalog.
#[derive(Debug, Clone)]
pub struct PricedRoute {
    /// HTTP method.
    pub method: Method,
    /// Route path.
    pub path: &'static str,
    /// USDC price, e.g. `"$0.001"`.
    pub price: &'static str,
    /// Rail settling the route.
    pub rail: Rail,
    /// What the route sells.
    pub description: &'static str,
}

/// Every paid route the server exposes.
pub const PRICED_ROUTES: [PricedRoute; 4] = [
    PricedRoute {
        method: Method::GET,
        path: "/weather",
        price: "$0.001",
        rail: Rail::Evm,
        description: "Current weather for a city",
    },
    PricedRoute {
        method: Method::POST,
        path: "/images/generations",
        price: "$0.02",
        rail: Rail::Evm,
        description: "Generate an image from a text prompt",
    },
    PricedRoute {
        method: Method::POST,
        path: "/compute",
        price: "$0.05",
        rail: Rail::Solana,
        description: "Summary statistics over a list of numbers",
    },
    PricedRoute {
        method: Method::POST,
        path: "/agent/tasks",
        price: "$0.10",
        rail: Rail::Solana,
        description: "Queue a task for an autonomous agent",
    },
];

/// Binding names, as they appear in logs and in the catalog.
const EVM_BINDING: &str = "evm";
const SOLANA_BINDING: &str = "solana";

/// Builds the gate for [`PRICED_ROUTES`]: one facilitator per rail, every
/// route bound to its rail's facilitator, and an in-memory nonce store.
///
/// # Errors
///
/// Returns [`StartupError`] if a price, payee or facilitator is invalid.
pub fn build_gate(config: &ServerConfig) -> Result<PaymentGate, StartupError> {
    let headers = facilitator_headers(config.facilitator_api_key.as_deref())?;
    let mut builder = RouteRegistry::builder();
    let evm = builder.facilitator(binding(EVM_BINDING, &config.evm, &headers)?)?;
    let solana = builder.facilitator(binding(SOLANA_BINDING, &config.solana, &headers)?)?;

    for route in &PRICED_ROUTES {
        let (rail, id) = match route.rail {
            Rail::Evm => (&config.evm, evm),
            Rail::Solana => (&config.solana, solana),
        };
        let invalid_price = |source| ConfigurationError::InvalidPrice {
            route: route.path.to_owned(),
            source,
        };
        let price: MoneyAmount = route.price.parse().map_err(invalid_price)?;
        let template = PaymentRequirementTemplate::usdc(rail.network, rail.pay_to.clone(), price)
            .map_err(invalid_price)?
            .with_description(route.description);
        builder.register(route.method.clone(), route.path, template, id)?;
    }

    let registry = builder.build();
    tracing::info!(
        routes = registry.len(),
        evm = %config.evm.network,
        solana = %config.solana.network,
        "payment routes registered"
    );
    Ok(PaymentGate::new(
        Arc::new(registry),
        Arc::new(InMemoryNonceStore::new()),
    ))
}

fn binding(
    name: &'static str,
    rail: &RailConfig,
    headers: &HeaderMap,
) -> Result<FacilitatorBinding, StartupError> {
    let client = FacilitatorClient::try_from(rail.facilitator_url.as_str())
        .map_err(|source| StartupError::FacilitatorClient { name, source })?
        .with_headers(headers.clone())
        .with_timeout(Duration::from_secs(
            PaymentRequirementTemplate::DEFAULT_MAX_TIMEOUT_SECONDS,
        ));
    Ok(FacilitatorBinding::new(
        name,
        rail.facilitator_url.clone(),
        rail.network,
        Arc::new(client),
    ))
}

fn facilitator_headers(api_key: Option<&str>) -> Result<HeaderMap, StartupError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(StartupError::ApiKey)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// The application router: free catalog and health routes, the paid routes,
/// and the payment layer in front of all of them.
pub fn app(gate: PaymentGate, base_url: Option<Url>) -> Router {
    let mut layer = PaymentGateLayer::new(gate.clone());
    if let Some(base_url) = base_url {
        layer = layer.with_base_url(base_url);
    }
    Router::new()
        .route("/", get(handlers::catalog))
        .route("/health", get(handlers::health))
        .route("/weather", get(handlers::weather))
        .route("/images/generations", post(handlers::generate_image))
        .route("/compute", post(handlers::compute))
        .route("/agent/tasks", post(handlers::agent_task))
        .layer(layer)
        .with_state(gate)
}
