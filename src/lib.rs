//! Report Distribution Service
//!
//! Role-gated HTTP backend for distributing per-robot report files.
//! Authenticated users fetch the reports of robots linked to them,
//! maintenance technicians fetch maintenance files for the whole fleet,
//! and superusers see everything. Report files live in a directory tree
//! keyed by robot folder; a heartbeat sentinel file per robot drives the
//! liveness endpoint.
//!
//! ## Features
//!
//! - **Bearer Authentication**: JWT tokens issued after bcrypt-verified
//!   logins, re-checked against the user table on every request
//! - **Ownership-Scoped Access**: per-robot links for report access,
//!   role-wide access for maintenance files
//! - **File Distribution**: directory listings, streamed single-file
//!   downloads, and on-the-fly ZIP archives
//! - **Heartbeat Liveness**: per-robot active/inactive status from the
//!   mtime of a sentinel file
//! - **Traversal Defense**: lexical validation plus canonical ancestry
//!   checks on every filesystem resolution
//!
//! ## Architecture
//!
//! ```text
//! HTTP Request               PostgreSQL               Data Root
//! ┌──────────────┐          ┌──────────────┐         ┌──────────────────┐
//! │ Bearer       │          │ users        │         │ {robot_folder}/  │
//! │ Requests     │          │ robots       │         │  DownloadUserData│
//! └──────────────┘          │ user_robots  │         │  maintenance/    │
//!        │                  └──────────────┘         │  script/         │
//!        ▼                         ▲                 │    last_seen.txt │
//! ┌──────────────┐                 │                 └──────────────────┘
//! │ Authenticator│─────────────────┤                          ▲
//! └──────────────┘                 │                          │
//!        │                         │                          │
//!        ▼                         │                          │
//! ┌──────────────┐                 │                          │
//! │ Access Guard │─────────────────┘                          │
//! └──────────────┘                                            │
//!        │                                                    │
//!        ▼                                                    │
//! ┌──────────────┐          ┌──────────────┐                  │
//! │ File         │          │ Listing      │                  │
//! │ Resolver     │─────────▶│ Download     │──────────────────┘
//! └──────────────┘          │ Archive      │
//!                           │ Liveness     │
//!                           └──────────────┘
//! ```

pub mod access;
pub mod api;
pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod liveness;
pub mod maintenance;
pub mod robots;
pub mod store;

pub use access::{authorize_maintenance, authorize_reports, permits, Purpose};
pub use api::{create_router, start_api_server, AppState};
pub use auth::{AuthUser, Role};
pub use config::Config;
pub use error::ApiError;
pub use files::{FileAccessError, FileResolver};
pub use liveness::LivenessStatus;
pub use store::{DirectoryStore, RobotRecord, UserRecord};
