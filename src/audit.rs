use tracing::warn;
use uuid::Uuid;

use crate::catalog::AccessLogEntry;
use crate::store::Catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Preview,
    Import,
    List,
    View,
    Relate,
    AiQuery,
    Create,
    Update,
    Forget,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::Preview => "PREVIEW",
            AccessAction::Import => "IMPORT",
            AccessAction::List => "LIST",
            AccessAction::View => "VIEW",
            AccessAction::Relate => "RELATE",
            AccessAction::AiQuery => "AI_QUERY",
            AccessAction::Create => "CREATE",
            AccessAction::Update => "UPDATE",
            AccessAction::Forget => "FORGET",
        }
    }
}

/// Writes one access log entry, fire and forget: a failed write is logged
/// and swallowed so auditing never blocks the operation being audited.
pub async fn record_access(
    catalog: &dyn Catalog,
    user_id: Uuid,
    action: AccessAction,
    resource: &str,
    details: Option<String>,
) {
    let entry = AccessLogEntry::new(user_id, action.as_str(), resource, details);
    if let Err(err) = catalog.record_access(&entry).await {
        warn!(
            "access log write failed ({} on {}): {}",
            action.as_str(),
            resource,
            err
        );
    }
}
