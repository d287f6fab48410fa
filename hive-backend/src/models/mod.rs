mod chat;
mod feature;
mod pod;
mod repository;
mod session;
mod swarm;
mod task;
mod user;
mod voice_signature;
mod workspace;

pub use chat::*;
pub use feature::*;
pub use pod::*;
pub use repository::*;
pub use session::*;
pub use swarm::*;
pub use task::*;
pub use user::*;
pub use voice_signature::*;
pub use workspace::*;

use serde::{Deserialize, Deserializer};

/// Distinguish an explicit `null` (Some(None)) from an absent field (None)
/// in partial update requests.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
