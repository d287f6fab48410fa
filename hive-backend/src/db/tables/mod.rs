//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod accounts;           // accounts (+ encrypted secret rotation)
mod auth;               // auth_sessions
mod chat_messages;      // chat_messages, artifacts
mod features;           // features
mod members;            // workspace_members
mod pods;               // pods
mod repositories;       // repositories
mod swarms;             // swarms
mod tasks;              // tasks
mod users;              // users
mod voice_signatures;   // voice_signatures
mod webhook_deliveries; // webhook_deliveries
mod workspaces;         // workspaces

pub use accounts::GITHUB_PROVIDER;
pub use members::MemberWithUser;
pub use swarms::SwarmSecrets;
