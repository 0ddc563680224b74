use anyhow::{anyhow, Context};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use metrics::counter;
use serde::Deserialize;
use tracing::instrument;

use crate::access::{self, Purpose};
use crate::api::{self, AppState};
use crate::archive;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::files::{self, FileAccessError};
use crate::robots::RobotWithReports;

#[derive(Debug, Deserialize)]
struct MaintenanceFileQuery {
    robot_folder: String,
    filename: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(maintenance_overview))
        .route("/download", get(download_maintenance_file))
        .route(
            "/:robot_folder/reports/all",
            get(download_maintenance_archive),
        )
}

/// Maintenance listing for the whole fleet. Robots without a
/// maintenance directory list as empty; a non-directory at the
/// maintenance path is a storage inconsistency and fails the sweep.
#[instrument(skip(state, user), fields(username = %user.username))]
async fn maintenance_overview(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<RobotWithReports>>, ApiError> {
    access::authorize_maintenance(&user)?;

    let robots = state.store.list_robots().await?;
    let mut overview = Vec::with_capacity(robots.len());
    for robot in robots {
        let dir = state
            .resolver
            .purpose_dir(&robot.robot_folder, Purpose::Maintenance);
        let reports = match files::list_files(&dir) {
            Ok(names) => names,
            Err(FileAccessError::NotFound) => Vec::new(),
            Err(FileAccessError::NotADirectory) => {
                return Err(ApiError::Internal(anyhow!(
                    "unexpected non-directory at the maintenance path of robot {}",
                    robot.robot_folder
                )));
            }
            Err(e) => {
                return Err(ApiError::Internal(anyhow::Error::new(e).context(format!(
                    "Failed to list maintenance files for robot {}",
                    robot.robot_folder
                ))));
            }
        };
        overview.push(RobotWithReports {
            robot_folder: robot.robot_folder,
            reports,
        });
    }

    Ok(Json(overview))
}

#[instrument(skip(state, user), fields(username = %user.username))]
async fn download_maintenance_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<MaintenanceFileQuery>,
) -> Result<Response, ApiError> {
    access::authorize_maintenance(&user)?;

    let path = state.resolver.resolve_file(
        &query.robot_folder,
        Purpose::Maintenance,
        &query.filename,
    )?;

    let response = api::file_attachment(&path, &query.filename).await?;
    counter!("reports.downloads.served").increment(1);
    Ok(response)
}

#[instrument(skip(state, user), fields(username = %user.username))]
async fn download_maintenance_archive(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(robot_folder): Path<String>,
) -> Result<Response, ApiError> {
    access::authorize_maintenance(&user)?;

    let dir = state
        .resolver
        .resolve_dir(&robot_folder, Purpose::Maintenance)?;

    let bytes = tokio::task::spawn_blocking(move || archive::build_zip(&dir))
        .await
        .context("Archive task failed")??;

    counter!("reports.archives.built").increment(1);
    Ok(api::zip_attachment(
        bytes,
        &Purpose::Maintenance.archive_name(&robot_folder),
    ))
}
