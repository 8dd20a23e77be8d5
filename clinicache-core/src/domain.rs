//! Per-domain cache policies.
//!
//! Every business data domain has exactly one `DomainPolicy`. The table is
//! built once (defaults plus configured ttl overrides) and frozen inside the
//! cache engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Business data domain with its own cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Contacts,
    Appointments,
    MedicalRecords,
    Analytics,
    Conversations,
    /// Clinic and staff directory.
    Directory,
    /// Aggregate views, flushed by fan-out from the leaf domains.
    Dashboard,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Contacts,
        Domain::Appointments,
        Domain::MedicalRecords,
        Domain::Analytics,
        Domain::Conversations,
        Domain::Directory,
        Domain::Dashboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Contacts => "contacts",
            Domain::Appointments => "appointments",
            Domain::MedicalRecords => "medical_records",
            Domain::Analytics => "analytics",
            Domain::Conversations => "conversations",
            Domain::Directory => "directory",
            Domain::Dashboard => "dashboard",
        }
    }

    /// Key prefix. Never contains `:` or glob metacharacters.
    pub fn prefix(&self) -> &'static str {
        self.as_str()
    }

    fn index(&self) -> usize {
        match self {
            Domain::Contacts => 0,
            Domain::Appointments => 1,
            Domain::MedicalRecords => 2,
            Domain::Analytics => 3,
            Domain::Conversations => 4,
            Domain::Directory => 5,
            Domain::Dashboard => 6,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "domain".to_string(),
                value: s.to_string(),
                reason: "unknown cache domain".to_string(),
            })
    }
}

/// Consistency strategy applied to a domain's reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Miss populates the cache on a detached task.
    CacheAside,
    /// Writes go to the store, then to the cache, then fan out.
    WriteThrough,
    /// Miss populates the cache before returning.
    ReadThrough,
}

/// Cache policy for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPolicy {
    pub domain: Domain,
    pub ttl_secs: u64,
    pub strategy: CacheStrategy,
    /// Domains whose tenant namespace is flushed when this domain mutates.
    pub fan_out: Vec<Domain>,
}

impl DomainPolicy {
    pub fn new(domain: Domain, ttl_secs: u64, strategy: CacheStrategy) -> Self {
        Self {
            domain,
            ttl_secs,
            strategy,
            fan_out: Vec::new(),
        }
    }

    pub fn with_fan_out(mut self, targets: impl IntoIterator<Item = Domain>) -> Self {
        self.fan_out = targets.into_iter().collect();
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn prefix(&self) -> &'static str {
        self.domain.prefix()
    }
}

/// Immutable table holding exactly one policy per domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: [DomainPolicy; 7],
}

impl Default for PolicyTable {
    fn default() -> Self {
        use CacheStrategy::*;
        use Domain::*;

        Self {
            policies: [
                DomainPolicy::new(Contacts, 300, CacheAside).with_fan_out([Dashboard]),
                DomainPolicy::new(Appointments, 120, WriteThrough)
                    .with_fan_out([Appointments, Analytics, Dashboard]),
                DomainPolicy::new(MedicalRecords, 600, ReadThrough).with_fan_out([Dashboard]),
                DomainPolicy::new(Analytics, 900, CacheAside),
                DomainPolicy::new(Conversations, 60, CacheAside).with_fan_out([Dashboard]),
                DomainPolicy::new(Directory, 1800, ReadThrough),
                DomainPolicy::new(Dashboard, 600, CacheAside),
            ],
        }
    }
}

impl PolicyTable {
    /// Default table with per-domain ttl overrides applied.
    pub fn with_ttl_overrides<'a>(
        overrides: impl IntoIterator<Item = (&'a Domain, &'a u64)>,
    ) -> Self {
        let mut table = Self::default();
        for (domain, ttl) in overrides {
            table.policies[domain.index()].ttl_secs = *ttl;
        }
        table
    }

    pub fn get(&self, domain: Domain) -> &DomainPolicy {
        &self.policies[domain.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainPolicy> {
        self.policies.iter()
    }
}
