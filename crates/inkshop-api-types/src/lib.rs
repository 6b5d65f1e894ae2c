//! Wire types shared by the inkshop server, its operator CLI and client-side cache sync.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cacheable catalog domain.
///
/// `All` is a wildcard: bumping it invalidates every concrete type at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Products,
    Artists,
    #[serde(rename = "galeria", alias = "gallery")]
    Gallery,
    Categories,
    All,
}

impl ResourceType {
    /// Every concrete (non-wildcard) resource type.
    pub const CONCRETE: [ResourceType; 4] = [
        ResourceType::Products,
        ResourceType::Artists,
        ResourceType::Gallery,
        ResourceType::Categories,
    ];

    /// All five variants, wildcard last.
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Products,
        ResourceType::Artists,
        ResourceType::Gallery,
        ResourceType::Categories,
        ResourceType::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Products => "products",
            ResourceType::Artists => "artists",
            ResourceType::Gallery => "galeria",
            ResourceType::Categories => "categories",
            ResourceType::All => "all",
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, ResourceType::All)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResourceType(pub String);

impl fmt::Display for UnknownResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resource type `{}`", self.0)
    }
}

impl std::error::Error for UnknownResourceType {}

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "products" => Ok(ResourceType::Products),
            "artists" => Ok(ResourceType::Artists),
            "galeria" | "gallery" => Ok(ResourceType::Gallery),
            "categories" => Ok(ResourceType::Categories),
            "all" => Ok(ResourceType::All),
            other => Err(UnknownResourceType(other.to_string())),
        }
    }
}

/// Body of `POST /api/cache/invalidate`.
///
/// Both fields accept any JSON value so a wrongly typed secret is still
/// answered with 401 rather than a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidateRequest {
    #[serde(rename = "type", default)]
    pub resource: Option<Value>,
    #[serde(default)]
    pub secret: Option<Value>,
}

impl InvalidateRequest {
    pub fn new(resource: ResourceType, secret: impl Into<String>) -> Self {
        Self {
            resource: Some(Value::String(resource.as_str().to_string())),
            secret: Some(Value::String(secret.into())),
        }
    }

    /// The secret, when it was sent as a JSON string.
    pub fn secret_str(&self) -> Option<&str> {
        self.secret.as_ref().and_then(Value::as_str)
    }
}

/// Successful invalidation acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub success: bool,
    #[serde(rename = "type")]
    pub resource: ResourceType,
    pub timestamp: u64,
}

/// Snapshot of the server's invalidation clock, one instant per resource type
/// in milliseconds since the Unix epoch. Missing keys read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySnapshot {
    pub products: u64,
    pub artists: u64,
    pub galeria: u64,
    pub categories: u64,
    pub all: u64,
}

impl RegistrySnapshot {
    pub fn get(&self, resource: ResourceType) -> u64 {
        match resource {
            ResourceType::Products => self.products,
            ResourceType::Artists => self.artists,
            ResourceType::Gallery => self.galeria,
            ResourceType::Categories => self.categories,
            ResourceType::All => self.all,
        }
    }

    pub fn set(&mut self, resource: ResourceType, instant: u64) {
        let slot = match resource {
            ResourceType::Products => &mut self.products,
            ResourceType::Artists => &mut self.artists,
            ResourceType::Gallery => &mut self.galeria,
            ResourceType::Categories => &mut self.categories,
            ResourceType::All => &mut self.all,
        };
        *slot = instant;
    }

    /// Element-wise maximum. Used as a watermark so an older reading never rolls back a newer one.
    pub fn merge_max(&self, other: &RegistrySnapshot) -> RegistrySnapshot {
        let mut merged = *self;
        for resource in ResourceType::ALL {
            merged.set(resource, self.get(resource).max(other.get(resource)));
        }
        merged
    }
}

/// Error body returned by every JSON endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
