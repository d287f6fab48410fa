mod sqlite;
mod tables;

pub use sqlite::{format_ts, now_ts, Database};
pub(crate) use sqlite::{new_id, parse_enum, parse_json, parse_opt_ts, parse_ts};
pub use tables::{MemberWithUser, SwarmSecrets, GITHUB_PROVIDER};
