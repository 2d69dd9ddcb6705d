pub mod artifacts;
pub mod connection;
pub mod repositories;
pub mod schema;

pub use artifacts::{ArtifactDigest, ArtifactError, ArtifactManifest, ArtifactWriter};
pub use connection::{connect_artifact, DbPool};
pub use repositories::{
    InMemoryRuleTableRepository, RepositoryError, RuleTableRepository, SqlRuleTableRepository,
};
