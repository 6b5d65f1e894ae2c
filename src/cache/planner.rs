//! Revalidation plan generation.
//!
//! Maps an invalidated resource type to the rendered paths and cache tags a
//! downstream page renderer has to regenerate.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::keys::ResourceType;

/// Paths and tags to regenerate after an invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevalidationPlan {
    pub resource: Option<ResourceType>,
    pub paths: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl RevalidationPlan {
    /// Build the plan for `resource`. The wildcard is the union of every concrete plan.
    pub fn for_resource(resource: ResourceType) -> Self {
        let mut plan = Self {
            resource: Some(resource),
            ..Self::default()
        };
        match resource {
            ResourceType::Products => {
                plan.path("/productos")
                    .path("/")
                    .path("/detailproducts/[slug]")
                    .tag("productos");
            }
            ResourceType::Artists => {
                plan.path("/equipo").tag("tatuadores");
            }
            ResourceType::Gallery => {
                plan.path("/galeria").tag("galeria");
            }
            ResourceType::Categories => {
                plan.path("/productos").tag("categorias");
            }
            ResourceType::All => {
                for concrete in ResourceType::CONCRETE {
                    plan.merge(Self::for_resource(concrete));
                }
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.tags.is_empty()
    }

    fn path(&mut self, path: &str) -> &mut Self {
        self.paths.insert(path.to_string());
        self
    }

    fn tag(&mut self, tag: &str) -> &mut Self {
        self.tags.insert(tag.to_string());
        self
    }

    fn merge(&mut self, other: RevalidationPlan) {
        self.paths.extend(other.paths);
        self.tags.extend(other.tags);
    }
}

impl fmt::Display for RevalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RevalidationPlan {{ resource: {}, paths: {}, tags: {} }}",
            self.resource.map(|r| r.as_str()).unwrap_or("-"),
            self.paths.len(),
            self.tags.len(),
        )
    }
}
