use restohub_auth::{Principal, Session};

/// Principal resolved from the request's session. Inserted by `require_auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub Principal);

/// Live session backing the request. Inserted by `require_auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSession(pub Session);
