pub mod player;
pub mod recorder;
pub mod session;

pub use player::PlayerController;
pub use recorder::RecorderController;
pub use session::{SessionCoordinator, SessionSettings};
