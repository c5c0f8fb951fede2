//! Concrete stages, registered in the fixed order from §6: wake-check,
//! platform-compatibility, permission, LLM-request, reply.

pub mod llm_request;
pub mod permission;
pub mod platform_compat;
pub mod reply;
pub mod wake_checker;

pub use llm_request::LlmRequestStage;
pub use permission::PermissionStage;
pub use platform_compat::PlatformCompatStage;
pub use reply::ReplyStage;
pub use wake_checker::WakeCheckerStage;
