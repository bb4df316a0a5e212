//! Business logic services

pub mod catalogue;
pub mod circulation;
pub mod users;

use crate::{config::AuthConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalogue: catalogue::CatalogueService,
    pub circulation: circulation::CirculationService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig) -> Self {
        Self {
            users: users::UsersService::new(repository.clone(), auth_config),
            catalogue: catalogue::CatalogueService::new(repository.clone()),
            circulation: circulation::CirculationService::new(repository.clone()),
            repository,
        }
    }

    /// Probe database connectivity (readiness check)
    pub async fn ready(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
