//! Tenant-scoped cache key system for multi-tenant isolation.
//!
//! The key insight is that `CacheKey`'s private inner struct makes an
//! unscoped key UNREPRESENTABLE. You cannot build a key without naming the
//! tenant, and every rendered key and pattern carries the tenant token.

use clinicache_core::{Domain, TenantId};
use std::fmt;

/// Separator between key segments.
const SEPARATOR: char = ':';

/// Literal in front of the tenant id inside a key.
const TENANT_MARKER: &str = "clinic_";

/// A cache key that is scoped to a specific tenant.
///
/// # Format
///
/// `<namespace>:<domain-prefix>:clinic_<tenant>:<identifier>`
///
/// The namespace and domain prefix never contain `:`; the tenant segment is
/// always followed by `:`. The identifier is everything after the third
/// separator and may itself contain `:` (e.g. `range:2024-03-01:2024-03-31`).
/// This makes rendering injective: distinct keys render to distinct strings,
/// and `clinic_1:` can never be a prefix of a tenant 12 key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Private inner data - cannot be constructed externally
    inner: CacheKeyInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    namespace: String,
    domain: Domain,
    tenant_id: TenantId,
    identifier: String,
}

impl CacheKey {
    /// Create a new tenant-scoped cache key.
    ///
    /// This is the ONLY way to construct a `CacheKey`.
    pub fn new(
        namespace: impl Into<String>,
        domain: Domain,
        tenant_id: TenantId,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            inner: CacheKeyInner {
                namespace: namespace.into(),
                domain,
                tenant_id,
                identifier: identifier.into(),
            },
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn domain(&self) -> Domain {
        self.inner.domain
    }

    pub fn tenant_id(&self) -> TenantId {
        self.inner.tenant_id
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    /// Render the key as stored in the backend.
    pub fn render(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            Self::tenant_namespace(self.namespace(), self.domain(), self.tenant_id()),
            self.identifier()
        )
    }

    /// Parse a rendered key.
    ///
    /// Returns `None` if:
    /// - There are fewer than four segments
    /// - The domain prefix is unknown
    /// - The tenant segment is not `clinic_<positive integer>`
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(4, SEPARATOR);
        let namespace = parts.next()?;
        let prefix = parts.next()?;
        let tenant = parts.next()?;
        let identifier = parts.next()?;

        if namespace.is_empty() {
            return None;
        }
        let domain = Domain::ALL.iter().copied().find(|d| d.prefix() == prefix)?;
        let digits = tenant.strip_prefix(TENANT_MARKER)?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let tenant_id = TenantId::new(digits.parse().ok()?).ok()?;

        let key = Self::new(namespace, domain, tenant_id, identifier);
        // Reject non-canonical tenant spellings such as `clinic_007`.
        (key.render() == raw).then_some(key)
    }

    /// Token every key of `tenant_id` contains: `:clinic_<tenant>:`.
    pub fn tenant_token(tenant_id: TenantId) -> String {
        format!("{SEPARATOR}{TENANT_MARKER}{tenant_id}{SEPARATOR}")
    }

    /// Glob pattern matching every key of a tenant within a domain.
    ///
    /// The trailing separator before `*` keeps tenant 1 from matching
    /// tenant 12.
    pub fn tenant_pattern(namespace: &str, domain: Domain, tenant_id: TenantId) -> String {
        Self::identifier_pattern(namespace, domain, tenant_id, "*")
    }

    /// Glob pattern over identifiers of a tenant within a domain,
    /// e.g. `list:*`.
    pub fn identifier_pattern(
        namespace: &str,
        domain: Domain,
        tenant_id: TenantId,
        identifier_glob: &str,
    ) -> String {
        format!(
            "{}{SEPARATOR}{identifier_glob}",
            Self::tenant_namespace(namespace, domain, tenant_id)
        )
    }

    fn tenant_namespace(namespace: &str, domain: Domain, tenant_id: TenantId) -> String {
        format!(
            "{namespace}{SEPARATOR}{}{SEPARATOR}{TENANT_MARKER}{tenant_id}",
            domain.prefix()
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
