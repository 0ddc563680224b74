use crate::auth::Role;
use crate::error::ApiError;
use crate::store::{DirectoryStore, RobotRecord, UserRecord};

/// Access-scope discriminator. Decides which permission rule applies
/// and which subdirectory of a robot folder is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Reports,
    Maintenance,
}

impl Purpose {
    /// Subdirectory of a robot folder this purpose addresses.
    pub fn subdir(&self) -> &'static str {
        match self {
            Purpose::Reports => "DownloadUserData",
            Purpose::Maintenance => "maintenance",
        }
    }

    /// Suggested attachment name for a whole-directory archive.
    pub fn archive_name(&self, robot_folder: &str) -> String {
        match self {
            Purpose::Reports => format!("{robot_folder}_reports.zip"),
            Purpose::Maintenance => format!("{robot_folder}_maintenance_reports.zip"),
        }
    }
}

/// Permission predicate: may `role`, holding `has_link` for the target
/// robot, access files of the given purpose?
///
/// Reports need an ownership link unless the caller is a superuser.
/// Maintenance access is role-wide and ignores per-robot links.
pub fn permits(role: Role, has_link: bool, purpose: Purpose) -> bool {
    match purpose {
        Purpose::Reports => role == Role::Superuser || has_link,
        Purpose::Maintenance => matches!(role, Role::Maintenance | Role::Superuser),
    }
}

/// Authorize report access to one robot.
///
/// Robot existence is checked first, so an unknown robot is not-found
/// for every caller and never surfaces as a permission error.
pub async fn authorize_reports(
    store: &DirectoryStore,
    user: &UserRecord,
    robot_folder: &str,
) -> Result<RobotRecord, ApiError> {
    let robot = match store.robot_by_folder(robot_folder).await? {
        Some(robot) => robot,
        None => return Err(ApiError::NotFound("robot not found".to_string())),
    };

    let has_link =
        user.role == Role::Superuser || store.link_exists(user.id, robot.id).await?;

    if !permits(user.role, has_link, Purpose::Reports) {
        return Err(ApiError::Forbidden(
            "access to this robot is not allowed".to_string(),
        ));
    }

    Ok(robot)
}

/// Authorize access to maintenance files of any robot.
pub fn authorize_maintenance(user: &UserRecord) -> Result<(), ApiError> {
    if !permits(user.role, false, Purpose::Maintenance) {
        return Err(ApiError::Forbidden("maintenance role required".to_string()));
    }
    Ok(())
}
