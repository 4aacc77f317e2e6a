//! PostgreSQL-backed collaborators of the ranking pass.

mod content_repo;
mod interaction_repo;

pub use content_repo::PgContentRepository;
pub use interaction_repo::PgInteractionRepository;
