mod admin;
mod conversation;
mod msg;
mod user;

pub(crate) use admin::AdminService;
pub use admin::ImpersonateUser;
pub(crate) use conversation::ConversationService;
pub use conversation::{ConversationSummary, CreateConversation};
pub(crate) use msg::MsgService;
pub use msg::{CreateMessage, ListMessageOption, PollOption};
pub(crate) use user::UserService;
