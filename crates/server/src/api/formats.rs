//! Supported conversion listing.

use axum::{
    extract::{Query, State},
    Json,
};
use filemorph_core::{Format, FormatFamily};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FormatsQuery {
    /// Restrict the listing to one source format.
    pub source: Option<String>,
}

/// A format as shown to users.
#[derive(Debug, Serialize)]
pub struct FormatInfo {
    pub format: Format,
    pub display_name: &'static str,
    pub family: FormatFamily,
}

impl From<Format> for FormatInfo {
    fn from(format: Format) -> Self {
        Self {
            format,
            display_name: format.display_name(),
            family: format.family(),
        }
    }
}

/// Conversion options for one source format.
#[derive(Debug, Serialize)]
pub struct SourceTargets {
    pub source: FormatInfo,
    pub targets: Vec<FormatInfo>,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub sources: Vec<SourceTargets>,
}

/// Lists what each source format can be converted into.
pub async fn list_formats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatsQuery>,
) -> Result<Json<FormatsResponse>, ApiError> {
    let orchestrator = state.orchestrator();

    let sources = match query.source.as_deref() {
        Some(name) => {
            let source: Format = name
                .parse()
                .map_err(|_| ApiError::invalid_request(format!("Unknown format: {}", name)))?;
            vec![source]
        }
        None => orchestrator.registry().sources(),
    };

    let sources = sources
        .into_iter()
        .map(|source| SourceTargets {
            source: source.into(),
            targets: orchestrator
                .supported_targets(source)
                .into_iter()
                .map(FormatInfo::from)
                .collect(),
        })
        .collect();

    Ok(Json(FormatsResponse { sources }))
}
