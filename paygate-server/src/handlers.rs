//! Business handlers.
//!
//! None of these know how payment works. Paid handlers read the outcome
//! through [`PaymentStatus`] and echo the settlement receipt back in their
//! body; the gate has already attached it as `X-PAYMENT-RESPONSE`.

use axum::Json;
use axum::extract::{Query, State};
use paygate::PaymentGate;
use paygate::proto::SettlementReceipt;
use paygate_http::server::PaymentStatus;
use serde::{Deserialize, Serialize};

use crate::error::HandlerError;

/// Health check endpoint.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// One entry of the price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// HTTP method.
    pub method: String,
    /// Route path.
    pub path: String,
    /// Settlement network.
    pub network: String,
    /// Price in the asset's smallest unit.
    pub max_amount_required: String,
    /// Asset address.
    pub asset: String,
    /// Payee.
    pub pay_to: String,
    /// What the route sells.
    pub description: String,
    /// Facilitator binding settling the route.
    pub facilitator: String,
}

/// Lists every paid route with its price.
pub async fn catalog(State(gate): State<PaymentGate>) -> Json<Vec<CatalogEntry>> {
    let mut entries: Vec<CatalogEntry> = gate
        .registry()
        .routes()
        .map(|route| {
            let template = route.template();
            CatalogEntry {
                method: route.key().method().to_string(),
                path: route.key().path().to_owned(),
                network: template.network.to_string(),
                max_amount_required: template.price.to_string(),
                asset: template.asset.clone(),
                pay_to: template.pay_to.clone(),
                description: template.description.clone(),
                facilitator: route.binding().name().to_owned(),
            }
        })
        .collect();
    entries.sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
    Json(entries)
}

/// Query of [`weather`].
#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    city: Option<String>,
}

/// Body of [`weather`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    city: String,
    conditions: &'static str,
    temperature_celsius: i32,
    receipt: Option<SettlementReceipt>,
}

const CONDITIONS: [&str; 4] = ["sunny", "cloudy", "rain", "snow"];

/// Current weather for `?city=`, defaulting to a fixed city.
pub async fn weather(status: PaymentStatus, Query(query): Query<WeatherQuery>) -> Json<Forecast> {
    let city = query
        .city
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "San Francisco".to_owned());
    let hash = seed(&city);
    Json(Forecast {
        conditions: CONDITIONS[usize::from(hash.to_le_bytes()[0] % 4)],
        temperature_celsius: i32::try_from(hash % 35).unwrap_or_default() - 5,
        city,
        receipt: status.receipt().cloned(),
    })
}

/// Body accepted by [`generate_image`].
#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    prompt: String,
    #[serde(default = "default_size")]
    size: String,
}

fn default_size() -> String {
    "512x512".to_owned()
}

/// Body of [`generate_image`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    prompt: String,
    size: String,
    url: String,
    receipt: Option<SettlementReceipt>,
}

const SIZES: [&str; 3] = ["256x256", "512x512", "1024x1024"];

/// Pretends to render `prompt` and returns where the image lives.
///
/// # Errors
///
/// Rejects an empty prompt or an unsupported size.
pub async fn generate_image(
    status: PaymentStatus,
    Json(request): Json<ImageRequest>,
) -> Result<Json<GeneratedImage>, HandlerError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(HandlerError::InvalidInput("prompt must not be empty"));
    }
    if !SIZES.contains(&request.size.as_str()) {
        return Err(HandlerError::InvalidInput(
            "size must be 256x256, 512x512 or 1024x1024",
        ));
    }
    Ok(Json(GeneratedImage {
        url: format!("https://images.paygate.dev/{:016x}.png", seed(prompt)),
        prompt: prompt.to_owned(),
        size: request.size,
        receipt: status.receipt().cloned(),
    }))
}

/// Body accepted by [`compute`].
#[derive(Debug, Deserialize)]
pub struct ComputeRequest {
    values: Vec<f64>,
}

/// Body of [`compute`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResult {
    count: usize,
    sum: f64,
    mean: f64,
    min: f64,
    max: f64,
    receipt: Option<SettlementReceipt>,
}

/// Summary statistics over a list of numbers.
///
/// # Errors
///
/// Rejects an empty list or non-finite values.
pub async fn compute(
    status: PaymentStatus,
    Json(request): Json<ComputeRequest>,
) -> Result<Json<ComputeResult>, HandlerError> {
    let values = request.values;
    if values.is_empty() {
        return Err(HandlerError::InvalidInput("values must not be empty"));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(HandlerError::InvalidInput("values must be finite"));
    }
    let sum: f64 = values.iter().sum();
    Ok(Json(ComputeResult {
        count: values.len(),
        sum,
        mean: sum / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        receipt: status.receipt().cloned(),
    }))
}

/// Body accepted by [`agent_task`].
#[derive(Debug, Deserialize)]
pub struct AgentTaskRequest {
    task: String,
}

/// Body of [`agent_task`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    task_id: String,
    task: String,
    state: &'static str,
    receipt: Option<SettlementReceipt>,
}

/// Queues a task for an agent. The task id is derived from the settlement
/// transaction, so one payment maps to one task.
///
/// # Errors
///
/// Rejects an empty task.
pub async fn agent_task(
    status: PaymentStatus,
    Json(request): Json<AgentTaskRequest>,
) -> Result<Json<AgentTask>, HandlerError> {
    let task = request.task.trim();
    if task.is_empty() {
        return Err(HandlerError::InvalidInput("task must not be empty"));
    }
    let receipt = status.receipt().cloned();
    let task_id = receipt
        .as_ref()
        .map_or_else(|| seed(task), |r| seed(&r.transaction));
    Ok(Json(AgentTask {
        task_id: format!("task-{task_id:016x}"),
        task: task.to_owned(),
        state: "queued",
        receipt,
    }))
}

// FNV-1a, stable across runs.
fn seed(input: &str) -> u64 {
    input.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
