//! Category listing and creation calls.

use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;

use super::session::Session;
use super::{ApiCall, ApiError, PwgClient};

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    /// Comma-separated ancestor ids, root first, self included.
    #[serde(default)]
    pub uppercats: String,
    /// Child categories; only populated by the tree listing.
    #[serde(default, rename = "categories")]
    pub children: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct FlatListing {
    #[serde(default)]
    categories: Vec<Category>,
}

/// Album visibility for newly created categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Privacy {
    Public,
    Private,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
        }
    }
}

/// Fetch every category as a flat list with ancestor chains.
pub fn fetch_flat(client: &PwgClient, session: &Session) -> Result<Vec<Category>, ApiError> {
    let call = ApiCall::get("pwg.categories.getList")
        .query("recursive", "true")
        .query("tree_output", "false");
    let response = client.execute(&call, Some(session.require_cookie()?))?;
    let listing: FlatListing = serde_json::from_value(response.result)?;
    Ok(listing.categories)
}

/// Fetch the category forest with children nested under each node.
pub fn fetch_tree(client: &PwgClient, session: &Session) -> Result<Vec<Category>, ApiError> {
    let call = ApiCall::get("pwg.categories.getList")
        .query("recursive", "true")
        .query("tree_output", "true");
    let response = client.execute(&call, Some(session.require_cookie()?))?;
    let forest: Vec<Category> = serde_json::from_value(response.result)?;
    Ok(forest)
}

/// Create a category and return its new id. `parent` of `None` creates a
/// top-level category.
pub fn add(
    client: &PwgClient,
    session: &Session,
    name: &str,
    parent: Option<u64>,
    privacy: Option<Privacy>,
) -> Result<u64, ApiError> {
    let mut call = ApiCall::post("pwg.categories.add").form("name", name);
    if let Some(parent) = parent {
        call = call.form("parent", parent.to_string());
    }
    if let Some(privacy) = privacy {
        call = call.form("status", privacy.as_str());
    }

    let response = client.execute(&call, Some(session.require_cookie()?))?;
    response
        .result
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiError::Protocol("category creation returned no id".to_string()))
}
