//! Building 402 challenges.

use http::uri::Authority;
use url::Url;

use crate::error::PaymentError;
use crate::proto::{ErrorReason, PaymentRequired, X402Version1};
use crate::registry::PaymentRequirementTemplate;

/// Turns a route's template into the body of a 402 response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeBuilder;

impl ChallengeBuilder {
    /// A challenge offering exactly one way to pay for `resource_url`.
    #[must_use]
    pub fn build(
        template: &PaymentRequirementTemplate,
        resource_url: &str,
        reason: ErrorReason,
        message: impl Into<String>,
    ) -> PaymentRequired {
        PaymentRequired {
            x402_version: X402Version1,
            error: message.into(),
            reason,
            accepts: vec![template.requirements(resource_url)],
        }
    }

    /// A challenge explaining why `error` denied the request.
    #[must_use]
    pub fn for_denial(
        template: &PaymentRequirementTemplate,
        resource_url: &str,
        error: &PaymentError,
    ) -> PaymentRequired {
        Self::build(template, resource_url, error.reason(), error.to_string())
    }
}

/// The absolute URL a request is paying for.
///
/// With a configured `base`, its scheme, authority and path prefix are kept
/// and the request path and query are appended. Without one, the request's
/// `Host` is used over plain `http`, falling back to `localhost` when it is
/// absent, unparsable or carries userinfo.
#[must_use]
pub fn resource_url(
    base: Option<&Url>,
    host: Option<&str>,
    path: &str,
    query: Option<&str>,
) -> String {
    if let Some(base) = base {
        let mut url = base.clone();
        let prefix = base.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{path}"));
        url.set_query(query);
        return url.to_string();
    }
    let host = host
        .filter(|h| !h.contains('@'))
        .and_then(|h| h.parse::<Authority>().ok())
        .map_or_else(|| "localhost".to_owned(), |a| a.to_string());
    #[cfg(feature = "telemetry")]
    tracing::warn!("public base URL is not configured; using http://{host} as resource origin");
    match query {
        Some(query) => format!("http://{host}{path}?{query}"),
        None => format!("http://{host}{path}"),
    }
}
