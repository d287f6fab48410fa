pub mod session_auth;
pub mod workspace_access;

pub use session_auth::{extract_token, require_api_token, require_user, SESSION_COOKIE};
pub use workspace_access::{
    require_resource_workspace, require_workspace, resolve_workspace_access, AccessError, Permission,
    WorkspaceAccess,
};
