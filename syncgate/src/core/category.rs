//! Endpoint category resolution
//!
//! Rate limits apply to coarse groups of related routes rather than to every
//! route independently. The resolver maps a request path onto one of a
//! closed set of categories using a static route table; anything it does not
//! recognize lands in [`EndpointCategory::Other`], which carries the
//! conservative default quota. Unknown routes are never unlimited.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse grouping of sync API routes sharing one quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointCategory {
    /// PIN request/verify, token refresh, logout
    Auth,
    /// Workspace CRUD and conversion
    Workspace,
    /// File records within a workspace
    File,
    /// Annotations within a workspace
    Annotation,
    /// Workspace membership management
    Member,
    /// File location registry
    Location,
    /// Anything not in the route table
    Other,
}

/// Route shapes served by the sync API. Segments in braces match any
/// non-empty path segment.
const ROUTE_TABLE: &[(&str, EndpointCategory)] = &[
    // Auth endpoints
    ("/auth/request-pin", EndpointCategory::Auth),
    ("/auth/verify-pin", EndpointCategory::Auth),
    ("/auth/refresh", EndpointCategory::Auth),
    ("/auth/logout", EndpointCategory::Auth),
    // Workspace endpoints
    ("/workspaces", EndpointCategory::Workspace),
    ("/workspaces/{workspace_id}", EndpointCategory::Workspace),
    (
        "/workspaces/{workspace_id}/convert-to-shared",
        EndpointCategory::Workspace,
    ),
    // Membership endpoints
    ("/workspaces/{workspace_id}/members", EndpointCategory::Member),
    (
        "/workspaces/{workspace_id}/members/{email}",
        EndpointCategory::Member,
    ),
    // File endpoints
    ("/workspaces/{workspace_id}/files", EndpointCategory::File),
    (
        "/workspaces/{workspace_id}/files/{file_hash}",
        EndpointCategory::File,
    ),
    // Annotation endpoints
    (
        "/workspaces/{workspace_id}/annotations",
        EndpointCategory::Annotation,
    ),
    (
        "/workspaces/{workspace_id}/annotations/{annotation_id}",
        EndpointCategory::Annotation,
    ),
    // File locations
    ("/file-locations", EndpointCategory::Location),
    ("/file-locations/all", EndpointCategory::Location),
];

impl EndpointCategory {
    /// Resolve a request path to its rate-limit category.
    ///
    /// Matching is deterministic: exact routes first, then segment-wise
    /// comparison where `{param}` segments accept any value. The HTTP method
    /// never changes the category of a route family, so the path alone
    /// decides.
    pub fn resolve(path: &str) -> EndpointCategory {
        for (pattern, category) in ROUTE_TABLE {
            if path == *pattern || segments_match(pattern, path) {
                return *category;
            }
        }
        EndpointCategory::Other
    }

    /// Stable identifier used in counter keys, logs, and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointCategory::Auth => "auth",
            EndpointCategory::Workspace => "workspace",
            EndpointCategory::File => "file",
            EndpointCategory::Annotation => "annotation",
            EndpointCategory::Member => "member",
            EndpointCategory::Location => "location",
            EndpointCategory::Other => "other",
        }
    }

    /// User-facing label for deny messages.
    pub fn label(&self) -> &'static str {
        match self {
            EndpointCategory::Auth => "authentication",
            EndpointCategory::Workspace => "workspace",
            EndpointCategory::File => "file",
            EndpointCategory::Annotation => "annotation",
            EndpointCategory::Member => "member",
            EndpointCategory::Location => "file location",
            EndpointCategory::Other => "API",
        }
    }
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn segments_match(pattern: &str, path: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    pattern.len() == path.len()
        && pattern
            .iter()
            .zip(&path)
            .all(|(pat, seg)| pat.starts_with('{') || pat == seg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_routes() {
        assert_eq!(
            EndpointCategory::resolve("/auth/request-pin"),
            EndpointCategory::Auth
        );
        assert_eq!(
            EndpointCategory::resolve("/workspaces"),
            EndpointCategory::Workspace
        );
        assert_eq!(
            EndpointCategory::resolve("/file-locations/all"),
            EndpointCategory::Location
        );
    }

    #[test]
    fn test_parameterized_routes() {
        assert_eq!(
            EndpointCategory::resolve("/workspaces/ws_123"),
            EndpointCategory::Workspace
        );
        assert_eq!(
            EndpointCategory::resolve("/workspaces/ws_123/files"),
            EndpointCategory::File
        );
        assert_eq!(
            EndpointCategory::resolve("/workspaces/ws_123/files/deadbeef"),
            EndpointCategory::File
        );
        assert_eq!(
            EndpointCategory::resolve("/workspaces/ws_123/annotations/a-9"),
            EndpointCategory::Annotation
        );
        assert_eq!(
            EndpointCategory::resolve("/workspaces/ws_123/members/a@b.example"),
            EndpointCategory::Member
        );
        assert_eq!(
            EndpointCategory::resolve("/workspaces/ws_123/convert-to-shared"),
            EndpointCategory::Workspace
        );
    }

    #[test]
    fn test_unknown_routes_are_other() {
        assert_eq!(EndpointCategory::resolve("/"), EndpointCategory::Other);
        assert_eq!(EndpointCategory::resolve("/admin"), EndpointCategory::Other);
        assert_eq!(
            EndpointCategory::resolve("/workspaces/ws_123/files/a/b"),
            EndpointCategory::Other
        );
        assert_eq!(
            EndpointCategory::resolve("/auth/impersonate"),
            EndpointCategory::Other
        );
    }

    #[test]
    fn test_empty_segments_collapse() {
        // "//workspaces//files" normalizes to two segments, so it matches
        // the "/workspaces/{workspace_id}" shape rather than the file routes
        assert_eq!(
            EndpointCategory::resolve("/workspaces//files"),
            EndpointCategory::Workspace
        );
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(EndpointCategory::Auth.as_str(), "auth");
        assert_eq!(EndpointCategory::Auth.label(), "authentication");
        assert_eq!(EndpointCategory::Other.label(), "API");
    }
}
