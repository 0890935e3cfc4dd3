//! Entity and relation resolution.

mod merger;
mod normalize;

pub use merger::{
    DropReason, DroppedRelation, EntityResolver, MergeConfig, Resolution, TypeConflict,
};
pub use normalize::{normalization_key, normalize_predicate};
