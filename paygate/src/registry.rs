//! Which routes cost money, how much, and who settles them.
//!
//! A [`RouteRegistry`] is assembled once at startup through
//! [`RouteRegistryBuilder`] and is read-only afterwards. Every invariant is
//! checked while building: a registry that exists is a valid one.
//!
//! ```ignore
//! let mut builder = RouteRegistry::builder();
//! let evm = builder.facilitator(FacilitatorBinding::new("evm", url, Network::BaseSepolia, client))?;
//! let price = "$0.001".parse::<MoneyAmount>()?;
//! builder.register(
//!     Method::GET,
//!     "/weather",
//!     PaymentRequirementTemplate::usdc(Network::BaseSepolia, pay_to, price)?,
//!     evm,
//! )?;
//! let registry = builder.build();
//! ```

use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::amount::{AmountError, MoneyAmount, TokenAmount};
use crate::error::ConfigurationError;
use crate::facilitator::Facilitator;
use crate::networks::Network;
use crate::proto::{PaymentRequirements, Scheme};

/// What a protected route charges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequirementTemplate {
    /// Payment scheme.
    pub scheme: Scheme,
    /// Settlement network.
    pub network: Network,
    /// Token contract or mint address.
    pub asset: String,
    /// Recipient address.
    pub pay_to: String,
    /// Price in the asset's smallest unit.
    pub price: TokenAmount,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// Upper bound for verify and settle, in seconds.
    pub max_timeout_seconds: u64,
}

impl PaymentRequirementTemplate {
    /// Default verify/settle deadline.
    pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 60;

    /// A template charging `price` of the network's USDC deployment.
    #[must_use]
    pub fn new(network: Network, pay_to: impl Into<String>, price: TokenAmount) -> Self {
        Self {
            scheme: Scheme::Exact,
            network,
            asset: network.usdc().address.to_owned(),
            pay_to: pay_to.into(),
            price,
            description: String::new(),
            mime_type: "application/json".to_owned(),
            max_timeout_seconds: Self::DEFAULT_MAX_TIMEOUT_SECONDS,
        }
    }

    /// A USDC template priced in money terms, e.g. `"$0.001"`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] if the price has more precision than USDC.
    pub fn usdc(
        network: Network,
        pay_to: impl Into<String>,
        price: MoneyAmount,
    ) -> Result<Self, AmountError> {
        let units = price.to_token_amount(network.usdc().decimals)?;
        Ok(Self::new(network, pay_to, units))
    }

    /// Charges a different asset.
    #[must_use]
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = asset.into();
        self
    }

    /// Sets the description shown to payers.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the MIME type of the resource.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Sets the verify/settle deadline.
    #[must_use]
    pub const fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Verify/settle deadline as a [`Duration`].
    #[must_use]
    pub const fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_seconds)
    }

    /// Checks the template's invariants. `route` names it in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] on a zero price, an invalid payee, an
    /// empty asset or a zero timeout.
    pub fn validate(&self, route: &str) -> Result<(), ConfigurationError> {
        if self.price.is_zero() {
            return Err(ConfigurationError::InvalidPrice {
                route: route.to_owned(),
                source: AmountError::NotPositive(self.price.to_string()),
            });
        }
        self.network
            .family()
            .canonical_address(&self.pay_to)
            .map_err(|source| ConfigurationError::InvalidPayTo {
                route: route.to_owned(),
                source,
            })?;
        if self.asset.trim().is_empty() {
            return Err(ConfigurationError::InvalidTemplate {
                route: route.to_owned(),
                detail: "asset must not be empty",
            });
        }
        if self.max_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidTemplate {
                route: route.to_owned(),
                detail: "maxTimeoutSeconds must be positive",
            });
        }
        Ok(())
    }

    /// The wire requirement for a concrete resource URL.
    #[must_use]
    pub fn requirements(&self, resource: impl Into<String>) -> PaymentRequirements {
        PaymentRequirements {
            scheme: self.scheme,
            network: self.network,
            max_amount_required: self.price,
            resource: resource.into(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            pay_to: self.pay_to.clone(),
            max_timeout_seconds: self.max_timeout_seconds,
            asset: self.asset.clone(),
        }
    }
}

/// A facilitator and the network it settles on.
#[derive(Clone)]
pub struct FacilitatorBinding {
    name: String,
    url: Url,
    network: Network,
    facilitator: Arc<dyn Facilitator>,
}

impl FacilitatorBinding {
    /// Binds `facilitator`, reachable at `url`, to `network`.
    pub fn new(
        name: impl Into<String>,
        url: Url,
        network: Network,
        facilitator: Arc<dyn Facilitator>,
    ) -> Self {
        Self {
            name: name.into(),
            url,
            network,
            facilitator,
        }
    }

    /// Binding name, used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Facilitator base URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Network this facilitator settles on.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }

    /// The facilitator itself.
    #[must_use]
    pub fn facilitator(&self) -> &dyn Facilitator {
        self.facilitator.as_ref()
    }
}

impl fmt::Debug for FacilitatorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacilitatorBinding")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

/// Handle to a binding added to a [`RouteRegistryBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(usize);

/// Registry key: HTTP method and normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    method: Method,
    path: String,
}

impl RouteKey {
    /// Builds a key, dropping any query string and a single trailing slash.
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: normalize_path(path).to_owned(),
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Normalized path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn normalize_path(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// A protected route with everything needed to charge for it.
#[derive(Debug)]
pub struct ProtectedRoute {
    key: RouteKey,
    template: PaymentRequirementTemplate,
    binding: Arc<FacilitatorBinding>,
}

impl ProtectedRoute {
    /// Method and path.
    #[must_use]
    pub const fn key(&self) -> &RouteKey {
        &self.key
    }

    /// What the route charges.
    #[must_use]
    pub const fn template(&self) -> &PaymentRequirementTemplate {
        &self.template
    }

    /// Who settles it.
    #[must_use]
    pub fn binding(&self) -> &FacilitatorBinding {
        &self.binding
    }
}

/// Immutable table of protected routes.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<RouteKey, Arc<ProtectedRoute>>,
    bindings: Vec<Arc<FacilitatorBinding>>,
}

impl RouteRegistry {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> RouteRegistryBuilder {
        RouteRegistryBuilder::default()
    }

    /// Finds the protected route for a request, or `None` for free routes.
    ///
    /// `HEAD` falls back to the `GET` route of the same path.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Option<Arc<ProtectedRoute>> {
        let key = RouteKey::new(method.clone(), path);
        if let Some(route) = self.routes.get(&key) {
            return Some(Arc::clone(route));
        }
        if *method == Method::HEAD {
            let get = RouteKey {
                method: Method::GET,
                path: key.path,
            };
            return self.routes.get(&get).map(Arc::clone);
        }
        None
    }

    /// All protected routes, in no particular order.
    pub fn routes(&self) -> impl Iterator<Item = &ProtectedRoute> {
        self.routes.values().map(AsRef::as_ref)
    }

    /// All facilitator bindings, in registration order.
    pub fn bindings(&self) -> impl Iterator<Item = &FacilitatorBinding> {
        self.bindings.iter().map(AsRef::as_ref)
    }

    /// Routes settled by the binding named `binding`.
    #[must_use]
    pub fn routes_of(&self, binding: &str) -> Vec<&RouteKey> {
        self.routes
            .values()
            .filter(|route| route.binding.name == binding)
            .map(|route| &route.key)
            .collect()
    }

    /// Number of protected routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if nothing is protected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Collects bindings and routes, validating each as it is added.
#[derive(Debug, Default)]
pub struct RouteRegistryBuilder {
    routes: HashMap<RouteKey, Arc<ProtectedRoute>>,
    bindings: Vec<Arc<FacilitatorBinding>>,
}

impl RouteRegistryBuilder {
    /// Adds a facilitator binding.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateBinding`] if the name is taken.
    pub fn facilitator(
        &mut self,
        binding: FacilitatorBinding,
    ) -> Result<BindingId, ConfigurationError> {
        if self.bindings.iter().any(|b| b.name == binding.name) {
            return Err(ConfigurationError::DuplicateBinding(binding.name));
        }
        self.bindings.push(Arc::new(binding));
        Ok(BindingId(self.bindings.len() - 1))
    }

    /// Protects `method path` with `template`, settled by `binding`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the path is not absolute, the route
    /// is already registered, the template is invalid, or the template's
    /// network is not the binding's.
    pub fn register(
        &mut self,
        method: Method,
        path: &str,
        template: PaymentRequirementTemplate,
        binding: BindingId,
    ) -> Result<(), ConfigurationError> {
        if !path.starts_with('/') {
            return Err(ConfigurationError::InvalidPath(path.to_owned()));
        }
        let binding = self
            .bindings
            .get(binding.0)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownBinding(format!("#{}", binding.0)))?;
        let key = RouteKey::new(method, path);
        if let Some(existing) = self.routes.get(&key) {
            return Err(if existing.binding.name == binding.name {
                ConfigurationError::DuplicateRoute {
                    route: key,
                    binding: binding.name.clone(),
                }
            } else {
                ConfigurationError::RouteConflict {
                    route: key,
                    existing: existing.binding.name.clone(),
                    attempted: binding.name.clone(),
                }
            });
        }
        template.validate(&key.to_string())?;
        if template.network != binding.network {
            return Err(ConfigurationError::NetworkMismatch {
                route: key,
                template: template.network,
                binding: binding.name.clone(),
                facilitator: binding.network,
            });
        }
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            route = %key,
            facilitator = %binding.name,
            network = %template.network,
            price = %template.price,
            "registered protected route"
        );
        let route = ProtectedRoute {
            key: key.clone(),
            template,
            binding,
        };
        self.routes.insert(key, Arc::new(route));
        Ok(())
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> RouteRegistry {
        #[cfg(feature = "telemetry")]
        for binding in &self.bindings {
            if !self.routes.values().any(|r| Arc::ptr_eq(&r.binding, binding)) {
                tracing::warn!(facilitator = %binding.name, "facilitator binding owns no routes");
            }
        }
        RouteRegistry {
            routes: self.routes,
            bindings: self.bindings,
        }
    }
}
