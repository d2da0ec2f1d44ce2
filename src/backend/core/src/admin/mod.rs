//! Admin console operations.
//!
//! This module provides:
//! - **Service**: user, session and organization management behind the gate
//! - **Requests**: input payloads and their validation
//! - **Slugs**: organization slug derivation
//!
//! # Usage
//!
//! ```rust,ignore
//! use bastion_core::admin::{AdminService, BanUser};
//! use bastion_core::store::InMemoryStore;
//!
//! let service = AdminService::new(Arc::new(InMemoryStore::new()));
//! let banned = service
//!     .ban_user(Some(&caller), &target_id, BanUser { reason: "spam".into(), expires_in_days: Some(7) })
//!     .await?;
//! ```

pub mod requests;
pub mod service;
pub mod slug;

pub use requests::{BanUser, CreateOrganization, CreateUser, SetRole, UpdateOrganization, UpdateUser};
pub use service::AdminService;
pub use slug::{is_valid_slug, slugify};
