pub mod conversations;
pub mod health;
pub mod mentions;
pub mod messages;
pub mod sync;
