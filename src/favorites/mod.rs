//! Favorited product and seller ids shared across contexts.

mod registry;

pub use registry::FavoritesRegistry;
