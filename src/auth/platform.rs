use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles a caller may hold across the whole marketplace, as opposed to roles
/// derived from a single load, payment or team.
pub const PLATFORM_ROLES: [&str; 4] = ["shipper", "carrier", "admin", "system"];

/// The marketplace itself. Platform-wide permissions such as creating loads and
/// running sweeps are checked against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Platform {
    id: Uuid,
}

impl Platform {
    pub fn marketplace() -> Self {
        Self { id: Uuid::nil() }
    }

    pub fn recognizes(&self, role: &str) -> bool {
        PLATFORM_ROLES.contains(&role)
    }
}

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder()
            .name("Platform")
            .add_attribute_getter("id", |recv: &Platform| recv.id.clone())
            .add_method("recognizes", |recv: &Platform, role: String| recv.recognizes(&role))
            .add_class_method("marketplace", Platform::marketplace)
    }

    fn get_polar_class() -> oso::Class {
        let builder = Platform::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_marketplace_roles_are_recognized() {
        let platform = Platform::marketplace();

        for role in PLATFORM_ROLES {
            assert!(platform.recognizes(role));
        }
        assert!(!platform.recognizes("superuser"));
        assert!(!platform.recognizes("Admin"));
    }
}
