//! Fixed Catalogs
//!
//! Static data the simulators draw from: endpoints, database tables and their
//! query templates, status-code distributions, failure reasons, exceptions.
//! The values are cosmetic; the shapes are what downstream dashboards key on.

use crate::rng::RandomSource;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Endpoints
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 4] = [Self::Get, Self::Post, Self::Put, Self::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    pub path: &'static str,
}

impl EndpointDescriptor {
    pub const fn new(method: HttpMethod, path: &'static str) -> Self {
        Self { method, path }
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

pub const API_PATHS: [&str; 8] = [
    "/api/users",
    "/api/users/123",
    "/api/orders",
    "/api/orders/456",
    "/api/products",
    "/api/products/789",
    "/api/health",
    "/api/metrics",
];

/// Every method crossed with every path
pub static ENDPOINTS: Lazy<Vec<EndpointDescriptor>> = Lazy::new(|| {
    API_PATHS
        .into_iter()
        .flat_map(|path| {
            HttpMethod::ALL
                .into_iter()
                .map(move |method| EndpointDescriptor::new(method, path))
        })
        .collect()
});

pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (compatible; API-Client/1.0)",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
    "okhttp/4.12.0",
    "Go-http-client/1.1",
];

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DbOperation {
    Select,
    Insert,
    Update,
    Delete,
}

impl DbOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for DbOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation mix of a simulated request; SELECT dominates
pub const DB_OPERATION_WEIGHTS: [(DbOperation, u32); 4] = [
    (DbOperation::Select, 60),
    (DbOperation::Insert, 20),
    (DbOperation::Update, 15),
    (DbOperation::Delete, 5),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySpeed {
    Fast,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Orders,
    Products,
    Payments,
    UserAnalytics,
    AuditLogs,
}

/// Target tables; the two analytical tables are rare and slow
pub const TABLE_WEIGHTS: [(Table, u32); 6] = [
    (Table::Users, 40),
    (Table::Orders, 30),
    (Table::Products, 13),
    (Table::Payments, 10),
    (Table::UserAnalytics, 1),
    (Table::AuditLogs, 1),
];

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Orders => "orders",
            Self::Products => "products",
            Self::Payments => "payments",
            Self::UserAnalytics => "user_analytics",
            Self::AuditLogs => "audit_logs",
        }
    }

    pub fn speed(&self) -> QuerySpeed {
        match self {
            Self::UserAnalytics | Self::AuditLogs => QuerySpeed::Slow,
            _ => QuerySpeed::Fast,
        }
    }

    /// Query text for `op` against this table
    pub fn query<R: RandomSource>(&self, op: DbOperation, rng: &mut R) -> String {
        match self {
            Self::Users => format!(
                "{} * FROM users WHERE status = 'active' AND created_at > NOW() - INTERVAL 30 DAY",
                op
            ),
            Self::Orders => format!(
                "{} * FROM orders WHERE order_status IN ('pending', 'completed') ORDER BY created_at DESC",
                op
            ),
            Self::Products => format!(
                "{} * FROM products WHERE category_id = {} AND in_stock = true",
                op,
                rng.between(1, 10)
            ),
            Self::Payments => format!(
                "{} * FROM payments WHERE payment_status = 'completed' AND amount > 10.00",
                op
            ),
            Self::UserAnalytics => format!(
                "{} COUNT(*) FROM user_analytics WHERE event_date >= CURDATE() - INTERVAL 7 DAY GROUP BY user_segment",
                op
            ),
            Self::AuditLogs => format!(
                "{} * FROM audit_logs WHERE action_type = 'user_login' AND created_at >= NOW() - INTERVAL 1 HOUR",
                op
            ),
        }
    }

    /// Affected rows: a table-specific range for reads, one row for writes
    pub fn rows_affected<R: RandomSource>(&self, op: DbOperation, rng: &mut R) -> u64 {
        if op != DbOperation::Select {
            return 1;
        }
        let (low, high) = match self {
            Self::Users => (10, 509),
            Self::Orders => (50, 1049),
            Self::Products => (20, 219),
            Self::Payments => (30, 329),
            Self::UserAnalytics => (5, 14),
            Self::AuditLogs => (10, 59),
        };
        rng.between(low, high)
    }
}

pub const DB_FAILURE_REASONS: [&str; 7] = [
    "Connection timeout",
    "Deadlock detected",
    "Table locked",
    "Constraint violation",
    "Query execution timeout",
    "Index not found",
    "Disk space insufficient",
];

// ============================================================================
// Responses
// ============================================================================

pub const NORMAL_STATUS_WEIGHTS: [(u16, u32); 6] =
    [(200, 65), (201, 15), (400, 4), (401, 4), (404, 6), (500, 6)];

/// Shifted toward 4xx/5xx while a traffic spike is active
pub const SPIKE_STATUS_WEIGHTS: [(u16, u32); 6] =
    [(200, 45), (201, 10), (400, 10), (401, 5), (404, 10), (500, 20)];

pub const SERVER_ERROR_REASON: &str = "Internal Server Error";

/// Fabricated runtime failures: (exception name, message)
pub const EXCEPTIONS: [(&str, &str); 15] = [
    ("NullReferenceError", "attempted to read field 'id' of a null record"),
    ("NullReferenceError", "user session resolved to null"),
    ("KeyError", "missing key 'customer_id' in request context"),
    ("IndexOutOfRangeError", "index 12 out of range for list of length 12"),
    ("TypeMismatchError", "expected integer for 'quantity', got string"),
    ("SerializationError", "unexpected end of JSON input at line 1 column 214"),
    ("DeserializationError", "unknown variant 'shipped_partial' for order status"),
    ("StackOverflowError", "maximum call depth exceeded in price resolver"),
    ("ArithmeticError", "division by zero while computing discount ratio"),
    ("IllegalStateError", "order already finalized"),
    ("ConcurrentModificationError", "cart modified during checkout iteration"),
    ("TimeoutError", "upstream inventory call exceeded 5000ms"),
    ("ConnectionResetError", "connection reset by peer while reading response"),
    ("OutOfMemoryError", "failed to allocate 268435456 bytes for report buffer"),
    ("AssertionError", "invariant violated: payment total < 0"),
];

pub const SOURCE_FILES: [&str; 10] = [
    "src/controllers/user_controller.rs",
    "src/services/product_service.rs",
    "src/middleware/auth.rs",
    "src/db/query_helper.rs",
    "src/routes/api.rs",
    "src/models/user.rs",
    "src/validators/request.rs",
    "src/config/database.rs",
    "src/helpers/response.rs",
    "src/middleware/error_handler.rs",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_endpoint_catalog_is_full_product() {
        assert_eq!(ENDPOINTS.len(), HttpMethod::ALL.len() * API_PATHS.len());
        let unique: HashSet<_> = ENDPOINTS.iter().collect();
        assert_eq!(unique.len(), ENDPOINTS.len());
        assert!(ENDPOINTS.contains(&EndpointDescriptor::new(HttpMethod::Get, "/api/health")));
    }

    fn error_share(weights: &[(u16, u32)]) -> u32 {
        weights
            .iter()
            .filter(|(status, _)| *status >= 400)
            .map(|(_, weight)| *weight)
            .sum()
    }

    #[test]
    fn test_distributions_sum_to_100() {
        assert_eq!(DB_OPERATION_WEIGHTS.iter().map(|(_, w)| *w).sum::<u32>(), 100);
        assert_eq!(NORMAL_STATUS_WEIGHTS.iter().map(|(_, w)| *w).sum::<u32>(), 100);
        assert_eq!(SPIKE_STATUS_WEIGHTS.iter().map(|(_, w)| *w).sum::<u32>(), 100);
    }

    #[test]
    fn test_spike_weights_favor_errors() {
        assert!(error_share(&SPIKE_STATUS_WEIGHTS) > error_share(&NORMAL_STATUS_WEIGHTS));
    }

    #[test]
    fn test_slow_tables() {
        let slow: Vec<_> = TABLE_WEIGHTS
            .iter()
            .filter(|(t, _)| t.speed() == QuerySpeed::Slow)
            .map(|(t, _)| t.name())
            .collect();
        assert_eq!(slow, vec!["user_analytics", "audit_logs"]);
    }
}
