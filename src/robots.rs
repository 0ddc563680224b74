use anyhow::Context;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::instrument;

use crate::access::{self, Purpose};
use crate::api::{self, AppState};
use crate::archive;
use crate::auth::{AuthUser, Role};
use crate::error::ApiError;
use crate::files::{self, FileAccessError, FileResolver};
use crate::liveness;

/// One robot and its current report listing.
#[derive(Debug, Serialize)]
pub struct RobotWithReports {
    pub robot_folder: String,
    pub reports: Vec<String>,
}

/// One robot's heartbeat snapshot.
#[derive(Debug, Serialize)]
pub struct RobotStatus {
    pub robot_folder: String,
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tree", get(robots_tree))
        .route("/status", get(robots_status))
        .route("/:robot_folder/reports", get(list_reports))
        // Static segment wins over the filename route below
        .route("/:robot_folder/reports/all", get(download_report_archive))
        .route("/:robot_folder/reports/:filename", get(download_report))
}

/// Overview of every robot the caller may see, with report listings.
/// A robot whose reports path is missing or not a directory lists as
/// empty.
#[instrument(skip(state, user), fields(username = %user.username))]
async fn robots_tree(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<RobotWithReports>>, ApiError> {
    let robots = if user.role == Role::Superuser {
        state.store.list_robots().await?
    } else {
        state.store.robots_linked_to(user.id).await?
    };

    let mut tree = Vec::with_capacity(robots.len());
    for robot in robots {
        let reports = overview_listing(&state.resolver, &robot.robot_folder)?;
        tree.push(RobotWithReports {
            robot_folder: robot.robot_folder,
            reports,
        });
    }

    Ok(Json(tree))
}

fn overview_listing(resolver: &FileResolver, robot_folder: &str) -> Result<Vec<String>, ApiError> {
    let dir = resolver.purpose_dir(robot_folder, Purpose::Reports);
    match files::list_files(&dir) {
        Ok(names) => Ok(names),
        // A stray plain file at the reports path counts as no reports
        Err(FileAccessError::NotFound | FileAccessError::NotADirectory) => Ok(Vec::new()),
        Err(e) => Err(ApiError::Internal(anyhow::Error::new(e).context(format!(
            "Failed to list reports for robot {robot_folder}"
        )))),
    }
}

/// Heartbeat status of every robot the caller may see. Maintenance
/// techs and superusers see the whole fleet.
#[instrument(skip(state, user), fields(username = %user.username))]
async fn robots_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<RobotStatus>>, ApiError> {
    let robots = if matches!(user.role, Role::Maintenance | Role::Superuser) {
        state.store.list_robots().await?
    } else {
        state.store.robots_linked_to(user.id).await?
    };

    // One instant for the whole sweep
    let now = Utc::now();
    let statuses = robots
        .into_iter()
        .map(|robot| {
            let status = liveness::probe(state.resolver.root(), &robot.robot_folder, now);
            RobotStatus {
                robot_folder: robot.robot_folder,
                is_active: status.is_active,
                last_seen: status.last_seen,
            }
        })
        .collect();

    Ok(Json(statuses))
}

#[instrument(skip(state, user), fields(username = %user.username))]
async fn list_reports(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(robot_folder): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let robot = access::authorize_reports(&state.store, &user, &robot_folder).await?;
    let dir = state.resolver.resolve_dir(&robot.robot_folder, Purpose::Reports)?;
    let names = files::list_files(&dir)?;
    Ok(Json(names))
}

#[instrument(skip(state, user), fields(username = %user.username))]
async fn download_report(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((robot_folder, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let robot = access::authorize_reports(&state.store, &user, &robot_folder).await?;
    let path = state
        .resolver
        .resolve_file(&robot.robot_folder, Purpose::Reports, &filename)?;

    let response = api::file_attachment(&path, &filename).await?;
    counter!("reports.downloads.served").increment(1);
    Ok(response)
}

#[instrument(skip(state, user), fields(username = %user.username))]
async fn download_report_archive(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(robot_folder): Path<String>,
) -> Result<Response, ApiError> {
    let robot = access::authorize_reports(&state.store, &user, &robot_folder).await?;
    let dir = state.resolver.resolve_dir(&robot.robot_folder, Purpose::Reports)?;

    let bytes = tokio::task::spawn_blocking(move || archive::build_zip(&dir))
        .await
        .context("Archive task failed")??;

    counter!("reports.archives.built").increment(1);
    Ok(api::zip_attachment(
        bytes,
        &Purpose::Reports.archive_name(&robot.robot_folder),
    ))
}
