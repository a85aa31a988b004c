//! HTTP header names used by x402 v1.

/// Payment authorization header (client → server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Settlement receipt header (server → client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// CORS header listing response headers browsers may read.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
