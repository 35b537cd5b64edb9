#![allow(clippy::pedantic)]
#![allow(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod jar;
pub mod report;
pub mod session;
pub mod stack;
pub mod storage;

pub use crate::api::{AuthApi, HttpAuthApi};
pub use crate::client::{ApiRequest, ApiResponse, ClientConfig, HttpClient, ReqwestClient};
pub use crate::coordinator::{RefreshCoordinator, SessionControl};
pub use crate::error::{ApiError, StorageError};
pub use crate::jar::CredentialJar;
pub use crate::report::{ErrorReporter, TracingReporter};
pub use crate::session::{Session, SessionStore};
pub use crate::stack::SessionStack;
pub use crate::storage::{FileStorage, MemoryStorage, SessionStorage, StateStorage};
