mod client;
mod pagination;
mod pipeline;
mod user;
mod workflow;

pub use client::{ApiVersion, CircleCiClient, API_ENDPOINT};
pub use pagination::{ListIterator, PageCursor};
pub use pipeline::{Pipeline, PipelineListIter};
pub use user::User;
pub use workflow::{filter_by, filter_by_name, Workflow, WorkflowListIter, WorkflowStatus};
