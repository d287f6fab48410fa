pub mod encryption;
pub mod signature;

pub use encryption::{CryptoError, EncryptedData, EncryptionService};
pub use signature::{compute_signature, verify_signature};

/// Field names used when sealing stored secrets
pub mod fields {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const SWARM_API_KEY: &str = "swarm_api_key";
    pub const POOL_API_KEY: &str = "pool_api_key";
    pub const STAKWORK_API_KEY: &str = "stakwork_api_key";
}
