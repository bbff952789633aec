pub mod swipes;
pub mod profiles;
pub mod chats;

pub use swipes::SwipeStore;
pub use profiles::ProfileStore;
pub use chats::ChatStore;
